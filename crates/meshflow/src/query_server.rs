use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use meshflow_core::config::NamespaceRule;
use meshflow_core::filter::{DependencyFilter, FlowFilter, TimeWindow};
use meshflow_core::query::{AnalyzeRequest, FlowRequest, OperationStatsRequest};
use meshflow_ingest::{Collector, analyze_trace};
use meshflow_store::Store;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UnixListener};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::protocol::{ApiRequest, ApiResponse};

/// Everything a query surface needs; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub collector: Collector,
    pub rules: Arc<Vec<NamespaceRule>>,
}

pub async fn run_query_server(
    state: AppState,
    uds_path: PathBuf,
    tcp_addr: SocketAddr,
) -> anyhow::Result<()> {
    if let Some(parent) = uds_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("create uds parent dir")?;
    }

    if tokio::fs::metadata(&uds_path).await.is_ok() {
        let _ = tokio::fs::remove_file(&uds_path).await;
    }

    let uds_listener = UnixListener::bind(&uds_path).context("bind UDS query listener")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(&uds_path).await?.permissions();
        perms.set_mode(0o600);
        tokio::fs::set_permissions(&uds_path, perms).await?;
    }
    let tcp_listener = TcpListener::bind(tcp_addr)
        .await
        .context("bind TCP query listener")?;

    let uds_task = tokio::spawn(run_uds_loop(uds_listener, state.clone()));
    let tcp_task = tokio::spawn(run_tcp_loop(tcp_listener, state));

    tokio::select! {
        res = uds_task => {
            res??;
        }
        res = tcp_task => {
            res??;
        }
    }

    Ok(())
}

async fn run_uds_loop(listener: UnixListener, state: AppState) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_stream(BufReader::new(stream), state).await {
                tracing::warn!(error = ?err, "uds client request failed");
            }
        });
    }
}

async fn run_tcp_loop(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_stream(BufReader::new(stream), state).await {
                tracing::warn!(error = ?err, "tcp client request failed");
            }
        });
    }
}

/// Serves newline-delimited requests until the client hangs up.
async fn handle_stream<T>(mut stream: BufReader<T>, state: AppState) -> anyhow::Result<()>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if stream.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let response = match serde_json::from_str::<ApiRequest>(&line) {
            Ok(req) => handle_request(req, &state).await,
            Err(e) => ApiResponse::Error(format!("invalid request: {e}")),
        };
        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        stream.get_mut().write_all(&payload).await?;
        stream.get_mut().flush().await?;
    }
}

pub async fn handle_request(req: ApiRequest, state: &AppState) -> ApiResponse {
    let store = &state.store;
    match req {
        ApiRequest::Flow(r) => match store.get_flow_graph(&r) {
            Some(flow) => ApiResponse::Flow(Box::new(flow)),
            None => ApiResponse::NotFound(format!("no flow for trace {}", r.trace_id)),
        },
        ApiRequest::Flows(filter) => ApiResponse::Flows(store.get_flow_graphs(&filter)),
        ApiRequest::Dependencies(filter) => {
            ApiResponse::Dependencies(store.get_service_dependencies(&filter))
        }
        ApiRequest::OperationStats(r) => match store.get_operation_stats(&r) {
            Some(stats) => ApiResponse::OperationStats(stats),
            None => ApiResponse::NotFound(format!("no flows for operation {}", r.operation_name)),
        },
        ApiRequest::Analyze(r) => match analyze_trace(store, &r.payload, &state.rules) {
            Some(flow) => ApiResponse::Flow(Box::new(flow)),
            None => ApiResponse::NotFound("trace payload is not analyzable".to_string()),
        },
        ApiRequest::Collect(r) => {
            ApiResponse::Collection(state.collector.collect_now(r.namespace.as_deref()).await)
        }
        ApiRequest::Collector => ApiResponse::Collector(state.collector.status()),
        ApiRequest::Status => ApiResponse::Status(store.stats()),
        ApiRequest::Clear => {
            store.clear();
            ApiResponse::Cleared
        }
    }
}

pub async fn run_query_http_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .context("bind HTTP query listener")?;
    axum::serve(listener, http_router(state))
        .await
        .context("query HTTP server")?;
    Ok(())
}

pub fn http_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/flows", get(http_flows))
        .route("/v1/flows/{trace_id}", get(http_flow))
        .route("/v1/dependencies", get(http_dependencies))
        .route("/v1/operations/{name}/stats", get(http_operation_stats))
        .route("/v1/analyze", post(http_analyze))
        .route("/v1/collect", post(http_collect))
        .route("/v1/collector", get(http_collector))
        .route("/v1/status", get(http_status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct FlowsParams {
    operation: Option<String>,
    namespace: Option<String>,
    environment: Option<String>,
    since: Option<String>,
    until: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct WindowParams {
    since: Option<String>,
    until: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DependencyParams {
    namespace: Option<String>,
    service: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CollectParams {
    namespace: Option<String>,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn http_flows(State(state): State<AppState>, Query(p): Query<FlowsParams>) -> Response {
    let window = match TimeWindow::parse(p.since.as_deref(), p.until.as_deref()) {
        Ok(w) => w,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let defaults = FlowFilter::default();
    let filter = FlowFilter {
        operation_name: p.operation,
        namespace: p.namespace,
        environment: p.environment,
        window,
        limit: p.limit.unwrap_or(defaults.limit),
    };
    Json(state.store.get_flow_graphs(&filter)).into_response()
}

async fn http_flow(State(state): State<AppState>, Path(trace_id): Path<String>) -> Response {
    match state.store.get_flow_graph(&FlowRequest {
        trace_id: trace_id.clone(),
    }) {
        Some(flow) => Json(flow).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("no flow for trace {trace_id}"),
        ),
    }
}

async fn http_dependencies(
    State(state): State<AppState>,
    Query(p): Query<DependencyParams>,
) -> Response {
    let filter = DependencyFilter {
        namespace: p.namespace,
        service_name: p.service,
    };
    Json(state.store.get_service_dependencies(&filter)).into_response()
}

async fn http_operation_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(p): Query<WindowParams>,
) -> Response {
    let window = match TimeWindow::parse(p.since.as_deref(), p.until.as_deref()) {
        Ok(w) => w,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    match state.store.get_operation_stats(&OperationStatsRequest {
        operation_name: name.clone(),
        window,
    }) {
        Some(stats) => Json(stats).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("no flows for operation {name}"),
        ),
    }
}

async fn http_analyze(State(state): State<AppState>, Json(req): Json<AnalyzeRequest>) -> Response {
    match analyze_trace(&state.store, &req.payload, &state.rules) {
        Some(flow) => Json(flow).into_response(),
        None => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "trace payload is not analyzable".to_string(),
        ),
    }
}

async fn http_collect(State(state): State<AppState>, Query(p): Query<CollectParams>) -> Response {
    let report = state.collector.collect_now(p.namespace.as_deref()).await;
    let status = if report.started {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    (status, Json(report)).into_response()
}

async fn http_collector(State(state): State<AppState>) -> Response {
    Json(state.collector.status()).into_response()
}

async fn http_status(State(state): State<AppState>) -> Response {
    Json(state.store.stats()).into_response()
}
