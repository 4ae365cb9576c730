use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use meshflow_core::config::BackendKind;
use meshflow_core::filter::{FlowFilter, NamespaceAllowList};
use meshflow_ingest::{Backend, Collector, CollectorOptions};
use meshflow_store::Store;
use serde_json::Value;

const CCS_TRACE: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
const DBAAS_TRACE: &str = "0af7651916cd43dd8448eb211c80319c";

#[derive(Clone)]
struct MockJaeger {
    traces: Arc<Vec<Value>>,
    delay: Duration,
    failing_service: Option<&'static str>,
}

async fn jaeger_services(State(mock): State<MockJaeger>) -> Json<Value> {
    tokio::time::sleep(mock.delay).await;
    Json(serde_json::json!({"data": ["api", "worker"]}))
}

async fn jaeger_traces(
    State(mock): State<MockJaeger>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if mock.failing_service.is_some()
        && params.get("service").map(String::as_str) == mock.failing_service
    {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(testkit::jaeger_data(mock.traces.as_ref().clone())).into_response()
}

async fn serve(app: Router) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn mock_jaeger(traces: Vec<Value>, delay: Duration) -> anyhow::Result<String> {
    mock_jaeger_with(MockJaeger {
        traces: Arc::new(traces),
        delay,
        failing_service: None,
    })
    .await
}

async fn mock_jaeger_with(mock: MockJaeger) -> anyhow::Result<String> {
    let app = Router::new()
        .route("/api/services", get(jaeger_services))
        .route("/api/traces", get(jaeger_traces))
        .with_state(mock);
    serve(app).await
}

async fn tempo_search() -> Json<Value> {
    Json(testkit::tempo_search(&[CCS_TRACE, DBAAS_TRACE, "ffffffffffffffffffffffffffffffff"]))
}

async fn tempo_trace(Path(id): Path<String>) -> impl IntoResponse {
    let namespace = match id.as_str() {
        CCS_TRACE => "ccs",
        DBAAS_TRACE => "dbaas",
        _ => return StatusCode::NOT_FOUND.into_response(),
    };
    (
        [(header::CONTENT_TYPE, "application/protobuf")],
        testkit::tempo_trace_bytes(&id, namespace),
    )
        .into_response()
}

async fn mock_tempo() -> anyhow::Result<String> {
    let app = Router::new()
        .route("/api/search", get(tempo_search))
        .route("/api/traces/{id}", get(tempo_trace));
    serve(app).await
}

fn collector(kind: BackendKind, url: &str, store: &Store, namespaces: &[&str]) -> anyhow::Result<Collector> {
    let backend = Backend::new(kind, url, Duration::from_secs(5))?;
    Ok(Collector::new(
        store.clone(),
        backend,
        CollectorOptions {
            enabled: true,
            interval: Duration::from_secs(60),
            lookback: Duration::from_secs(300),
            trace_limit: 20,
            allow_list: NamespaceAllowList::new(namespaces),
            namespace_rules: Vec::new(),
        },
    ))
}

fn both_traces() -> Vec<Value> {
    vec![
        testkit::jaeger_trace(CCS_TRACE, "ccs"),
        testkit::jaeger_trace(DBAAS_TRACE, "dbaas"),
    ]
}

#[tokio::test]
async fn empty_allow_list_collects_every_namespace() -> anyhow::Result<()> {
    let url = mock_jaeger(both_traces(), Duration::ZERO).await?;
    let store = Store::default();
    let collector = collector(BackendKind::Jaeger, &url, &store, &[])?;

    let report = collector.collect_now(None).await;
    assert!(report.started);
    assert!(report.error.is_none());
    // Both services return the same traces; duplicates collapse by trace id.
    assert_eq!(report.traces_seen, 2);
    assert_eq!(report.flows_recorded, 2);

    let stats = store.stats();
    assert_eq!(stats.flows, 2);
    assert_eq!(stats.dependency_edges, 2);
    Ok(())
}

#[tokio::test]
async fn allow_list_skips_other_namespaces() -> anyhow::Result<()> {
    let url = mock_jaeger(
        vec![testkit::jaeger_trace(DBAAS_TRACE, "dbaas")],
        Duration::ZERO,
    )
    .await?;
    let store = Store::default();
    let collector = collector(BackendKind::Jaeger, &url, &store, &["ccs"])?;

    let report = collector.collect_now(None).await;
    assert_eq!(report.traces_seen, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.flows_recorded, 0);
    assert_eq!(store.stats().flows, 0);
    assert_eq!(store.stats().dependency_edges, 0);
    Ok(())
}

#[tokio::test]
async fn allow_list_admits_default_namespace_traces() -> anyhow::Result<()> {
    let url = mock_jaeger(
        vec![testkit::jaeger_trace(CCS_TRACE, "default")],
        Duration::ZERO,
    )
    .await?;
    let store = Store::default();
    let collector = collector(BackendKind::Jaeger, &url, &store, &["ccs"])?;

    let report = collector.collect_now(None).await;
    assert_eq!(report.flows_recorded, 1);
    Ok(())
}

#[tokio::test]
async fn failing_service_does_not_discard_other_services() -> anyhow::Result<()> {
    let url = mock_jaeger_with(MockJaeger {
        traces: Arc::new(both_traces()),
        delay: Duration::ZERO,
        failing_service: Some("worker"),
    })
    .await?;
    let store = Store::default();
    let collector = collector(BackendKind::Jaeger, &url, &store, &[])?;

    let report = collector.collect_now(None).await;
    assert!(report.error.is_none());
    assert_eq!(report.traces_seen, 2);
    assert_eq!(report.flows_recorded, 2);
    assert_eq!(store.stats().flows, 2);
    Ok(())
}

#[tokio::test]
async fn overlapping_trigger_is_dropped() -> anyhow::Result<()> {
    let url = mock_jaeger(both_traces(), Duration::from_millis(500)).await?;
    let store = Store::default();
    let collector = collector(BackendKind::Jaeger, &url, &store, &[])?;

    let running = collector.clone();
    let first = tokio::spawn(async move { running.collect_now(None).await });
    while !collector.is_collecting() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = collector.collect_now(None).await;
    assert!(!second.started);
    assert_eq!(second.flows_recorded, 0);

    let first = first.await?;
    assert!(first.started);
    assert_eq!(first.flows_recorded, 2);
    assert_eq!(collector.status().cycles, 1);
    Ok(())
}

#[tokio::test]
async fn scoped_collection_keeps_only_that_namespace() -> anyhow::Result<()> {
    let url = mock_jaeger(both_traces(), Duration::ZERO).await?;
    let store = Store::default();
    let collector = collector(BackendKind::Jaeger, &url, &store, &[])?;

    let report = collector.collect_now(Some("DBAAS")).await;
    assert_eq!(report.flows_recorded, 1);

    let flows = store.get_flow_graphs(&FlowFilter::default());
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].trace_id, DBAAS_TRACE);
    Ok(())
}

#[tokio::test]
async fn tempo_backend_fetches_trace_details() -> anyhow::Result<()> {
    let url = mock_tempo().await?;
    let store = Store::default();
    let collector = collector(BackendKind::Tempo, &url, &store, &["ccs"])?;

    let report = collector.collect_now(None).await;
    assert!(report.error.is_none());
    assert_eq!(report.traces_seen, 2);
    assert_eq!(report.flows_recorded, 1);
    assert_eq!(report.skipped, 1);

    let flows = store.get_flow_graphs(&FlowFilter::default());
    assert_eq!(flows[0].trace_id, CCS_TRACE);
    assert!(flows[0].edges.contains_key("ccs/api->ccs/worker"));
    Ok(())
}

#[tokio::test]
async fn spawned_timer_collects_and_aborts() -> anyhow::Result<()> {
    let url = mock_jaeger(both_traces(), Duration::ZERO).await?;
    let store = Store::default();
    let collector = collector(BackendKind::Jaeger, &url, &store, &[])?;

    let handle = collector
        .spawn()
        .ok_or_else(|| anyhow::anyhow!("collector disabled"))?;
    for _ in 0..200 {
        if store.stats().flows == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.abort();
    assert_eq!(store.stats().flows, 2);
    Ok(())
}
