mod client;
mod output;
mod protocol;
mod query_server;
mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use meshflow_core::config::{BackendKind, Config, parse_list, parse_namespace_rules};
use meshflow_core::filter::{DependencyFilter, FlowFilter, TimeWindow};
use meshflow_core::query::{
    AnalyzeRequest, CollectRequest, FlowRequest, OperationStatsRequest, TracePayload,
};
use meshflow_core::time::parse_duration_str;
use meshflow_ingest::{Backend, Collector, CollectorOptions};
use meshflow_store::{Store, StoreOptions};

use crate::client::QueryClient;
use crate::output::{
    print_collection_human, print_collector_human, print_dependencies_human, print_flow_human,
    print_flows_human, print_operation_stats_human, print_status_human,
};
use crate::protocol::{ApiRequest, ApiResponse};
use crate::query_server::AppState;
use crate::telemetry::{LogFormat, init_cli_tracing, init_run_tracing, shutdown_tracing};

const RETENTION_PERIOD: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "meshflow")]
#[command(about = "Service flow graphs and dependency health from distributed traces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    uds: Option<PathBuf>,

    #[arg(long, global = true)]
    addr: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PayloadFormat {
    Jaeger,
    Tempo,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the collector and query servers")]
    Run {
        #[arg(long, help = "Serve queries only; never poll the tracing backend")]
        no_collector: bool,
        #[arg(long)]
        backend: Option<BackendKind>,
        #[arg(long)]
        backend_url: Option<String>,
        #[arg(long, help = "Comma-separated namespace allow-list")]
        namespaces: Option<String>,
        #[arg(long, help = "Service-name inference rules, e.g. ccs-=ccs,db=dbaas")]
        namespace_rules: Option<String>,
        #[arg(long, help = "Collection period, e.g. 30s")]
        collect_interval: Option<String>,
        #[arg(long)]
        max_flows: Option<usize>,
        #[arg(long)]
        query_tcp_addr: Option<String>,
        #[arg(long)]
        query_http_addr: Option<String>,
        #[arg(long)]
        query_uds_path: Option<PathBuf>,
    },
    #[command(about = "Show the flow graph of one trace")]
    Flow { trace_id: String },
    #[command(about = "List flows, newest first")]
    Flows {
        #[arg(long)]
        operation: Option<String>,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        environment: Option<String>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    #[command(about = "Show the cluster service dependency graph")]
    Deps {
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        service: Option<String>,
    },
    #[command(about = "Aggregate statistics for one operation")]
    OpStats {
        operation: String,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
    },
    #[command(about = "Analyze a trace payload file and record its flow")]
    Analyze {
        file: PathBuf,
        #[arg(long, value_enum, default_value = "jaeger")]
        format: PayloadFormat,
    },
    #[command(about = "Run one collection cycle now")]
    Collect {
        #[arg(long)]
        namespace: Option<String>,
    },
    #[command(about = "Show collector state")]
    Collector,
    #[command(about = "Show store counts")]
    Status,
    #[command(about = "Drop every cached flow and dependency edge")]
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let request = match cli.command {
        Commands::Run {
            no_collector,
            backend,
            backend_url,
            namespaces,
            namespace_rules,
            collect_interval,
            max_flows,
            query_tcp_addr,
            query_http_addr,
            query_uds_path,
        } => {
            let mut cfg = Config::load().context("load config")?;
            if no_collector {
                cfg.collector_enabled = false;
            }
            if let Some(v) = backend {
                cfg.backend = v;
            }
            if let Some(v) = backend_url {
                cfg.backend_url = v.trim_end_matches('/').to_string();
            }
            if let Some(v) = namespaces {
                cfg.namespaces = parse_list(&v);
            }
            if let Some(v) = namespace_rules {
                cfg.namespace_rules = parse_namespace_rules(&v)?;
            }
            if let Some(v) = collect_interval {
                cfg.collect_interval = parse_duration_str(&v)?;
            }
            if let Some(v) = max_flows {
                cfg.max_flows = v;
            }
            if let Some(v) = query_tcp_addr {
                cfg.query_tcp_addr = v;
            }
            if let Some(v) = query_http_addr {
                cfg.query_http_addr = v;
            }
            if let Some(v) = query_uds_path {
                cfg.uds_path = v;
            }
            return run_server(cfg).await;
        }
        Commands::Flow { trace_id } => ApiRequest::Flow(FlowRequest { trace_id }),
        Commands::Flows {
            operation,
            namespace,
            environment,
            since,
            until,
            limit,
        } => ApiRequest::Flows(FlowFilter {
            operation_name: operation,
            namespace,
            environment,
            window: TimeWindow::parse(since.as_deref(), until.as_deref())?,
            limit,
        }),
        Commands::Deps { namespace, service } => ApiRequest::Dependencies(DependencyFilter {
            namespace,
            service_name: service,
        }),
        Commands::OpStats {
            operation,
            since,
            until,
        } => ApiRequest::OperationStats(OperationStatsRequest {
            operation_name: operation,
            window: TimeWindow::parse(since.as_deref(), until.as_deref())?,
        }),
        Commands::Analyze { file, format } => {
            init_cli_tracing();
            let mut client = QueryClient::connect(cli.uds, cli.addr).await?;
            for payload in read_payloads(&file, format)? {
                let response = client
                    .request(ApiRequest::Analyze(AnalyzeRequest { payload }))
                    .await?;
                print_response(response, cli.json)?;
            }
            return Ok(());
        }
        Commands::Collect { namespace } => ApiRequest::Collect(CollectRequest { namespace }),
        Commands::Collector => ApiRequest::Collector,
        Commands::Status => ApiRequest::Status,
        Commands::Clear => ApiRequest::Clear,
    };

    init_cli_tracing();
    let mut client = QueryClient::connect(cli.uds, cli.addr).await?;
    let response = client.request(request).await?;
    print_response(response, cli.json)
}

/// A Jaeger file may hold one trace or a query API `{"data": [...]}` envelope.
/// A Tempo file holds raw OTLP protobuf bytes.
fn read_payloads(file: &Path, format: PayloadFormat) -> anyhow::Result<Vec<TracePayload>> {
    let bytes =
        std::fs::read(file).with_context(|| format!("read trace file {}", file.display()))?;
    match format {
        PayloadFormat::Tempo => Ok(vec![TracePayload::Tempo {
            protobuf_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
        }]),
        PayloadFormat::Jaeger => {
            let value: serde_json::Value =
                serde_json::from_slice(&bytes).context("parse jaeger trace json")?;
            let traces = match value.get("data").and_then(|d| d.as_array()) {
                Some(items) => items.clone(),
                None => vec![value],
            };
            Ok(traces
                .into_iter()
                .map(|trace| TracePayload::Jaeger { trace })
                .collect())
        }
    }
}

async fn run_server(cfg: Config) -> anyhow::Result<()> {
    init_run_tracing(LogFormat::from_env());

    let store = Store::new(StoreOptions {
        max_flows: cfg.max_flows,
    });
    let backend = Backend::new(cfg.backend, &cfg.backend_url, cfg.request_timeout)
        .context("build tracing backend client")?;
    let collector = Collector::new(
        store.clone(),
        backend,
        CollectorOptions::from_config(&cfg),
    );
    let state = AppState {
        store: store.clone(),
        collector: collector.clone(),
        rules: Arc::new(cfg.namespace_rules.clone()),
    };

    eprintln!("meshflow run");
    eprintln!(
        "  backend: {} {}{}",
        cfg.backend,
        cfg.backend_url,
        if cfg.collector_enabled { "" } else { " (collector off)" }
    );
    eprintln!("  query uds: {}", cfg.uds_path.display());
    eprintln!("  query tcp: {}", cfg.query_tcp_addr);
    eprintln!("  query http: {}", cfg.query_http_addr);

    let query_task = tokio::spawn(query_server::run_query_server(
        state.clone(),
        cfg.uds_path.clone(),
        cfg.query_tcp_addr.parse().context("parse query tcp addr")?,
    ));
    let query_http_task = tokio::spawn(query_server::run_query_http_server(
        state,
        cfg.query_http_addr
            .parse()
            .context("parse query http addr")?,
    ));
    let collector_task = collector.spawn();

    let retention_task = tokio::spawn({
        let store = store.clone();
        let ttl = cfg.retention_ttl;
        async move {
            let mut interval = tokio::time::interval(RETENTION_PERIOD);
            loop {
                interval.tick().await;
                if let Err(err) = store.run_retention(ttl) {
                    tracing::warn!(error = ?err, "retention task failed");
                }
            }
        }
    });

    let result = tokio::select! {
        res = query_task => res.context("query server task").and_then(|r| r),
        res = query_http_task => res.context("query http task").and_then(|r| r),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            Ok(())
        }
    };

    if let Some(task) = collector_task {
        task.abort();
    }
    retention_task.abort();
    let _ = tokio::fs::remove_file(&cfg.uds_path).await;
    shutdown_tracing();
    result
}

fn print_response(response: ApiResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response {
        ApiResponse::Flow(v) => print_flow_human(&v),
        ApiResponse::Flows(v) => print_flows_human(&v),
        ApiResponse::Dependencies(v) => print_dependencies_human(&v),
        ApiResponse::OperationStats(v) => print_operation_stats_human(&v),
        ApiResponse::Collection(v) => print_collection_human(&v),
        ApiResponse::Collector(v) => print_collector_human(&v),
        ApiResponse::Status(v) => print_status_human(&v),
        ApiResponse::Cleared => println!("store cleared"),
        ApiResponse::NotFound(e) => eprintln!("not found: {e}"),
        ApiResponse::Error(e) => eprintln!("error: {e}"),
    }
    Ok(())
}
