use chrono::SecondsFormat;
use meshflow_core::model::flow::FlowGraph;
use meshflow_core::query::{
    CollectionReport, CollectorStatus, DependencyGraph, OperationStats, StoreStats,
};
use meshflow_core::time::nanos_to_dt;
use owo_colors::OwoColorize;

pub fn print_flow_human(flow: &FlowGraph) {
    let status = if flow.has_errors() {
        "ERROR".red().to_string()
    } else {
        "OK".green().to_string()
    };
    println!(
        "FLOW {} op={} {} duration={:.1}ms spans={} errors={}",
        flow.trace_id,
        flow.operation_name.cyan(),
        status,
        flow.duration_ms(),
        flow.metadata.total_spans,
        flow.metadata.error_count
    );
    if let Some(event) = &flow.ui_event {
        println!("ui_event={event}");
    }

    println!("nodes:");
    for node in flow.nodes.values() {
        let m = &node.metrics;
        println!(
            "  {} requests={} errors={} avg={:.1}ms p50={:.1}ms p95={:.1}ms p99={:.1}ms",
            node.id.bold(),
            m.request_count,
            m.error_count,
            m.avg_latency_ms,
            m.p50_latency_ms,
            m.p95_latency_ms,
            m.p99_latency_ms
        );
    }

    if !flow.edges.is_empty() {
        println!("edges:");
        for edge in flow.edges.values() {
            println!(
                "  {} -> {} calls={} errors={} avg={:.1}ms",
                edge.source,
                edge.target,
                edge.call_count,
                error_count(edge.error_count),
                edge.avg_latency_ms()
            );
        }
    }

    println!("timeline:");
    for step in &flow.span_sequence {
        let offset_ms = step.start_time.saturating_sub(flow.start_time) as f64 / 1_000_000.0;
        let status = if step.status == "error" {
            step.status.red().to_string()
        } else {
            step.status.green().to_string()
        };
        println!(
            "  +{offset_ms:>8.1}ms {} {} {:.1}ms {}",
            step.node,
            step.operation_name,
            step.duration as f64 / 1_000_000.0,
            status
        );
    }
}

pub fn print_flows_human(flows: &[FlowGraph]) {
    for flow in flows {
        let started = nanos_to_dt(flow.start_time).to_rfc3339_opts(SecondsFormat::Millis, true);
        let marker = if flow.has_errors() {
            "ERR".red().to_string()
        } else {
            "ok".green().to_string()
        };
        println!(
            "{started} {} {marker} {} {:.1}ms nodes={} edges={}",
            flow.trace_id,
            flow.operation_name,
            flow.duration_ms(),
            flow.nodes.len(),
            flow.edges.len()
        );
    }
    println!("-- {} flows --", flows.len());
}

pub fn print_dependencies_human(graph: &DependencyGraph) {
    for edge in &graph.edges {
        println!(
            "{} -> {} calls={} errors={} error_rate={:.1}% avg={:.1}ms last_seen={}",
            edge.source.cyan(),
            edge.target.cyan(),
            edge.call_count,
            error_count(edge.error_count),
            edge.error_rate * 100.0,
            edge.avg_latency_ms,
            edge.last_seen.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }
    println!(
        "-- {} services, {} edges --",
        graph.nodes.len(),
        graph.edges.len()
    );
}

pub fn print_operation_stats_human(stats: &OperationStats) {
    println!(
        "OPERATION {} requests={} success={} errors={} error_rate={:.1}%",
        stats.operation_name.cyan(),
        stats.total_requests,
        stats.success_count,
        error_count(stats.error_count as u64),
        stats.error_rate * 100.0
    );
    println!(
        "latency avg={:.1}ms p50={:.1}ms p95={:.1}ms p99={:.1}ms",
        stats.latency.avg_ms, stats.latency.p50_ms, stats.latency.p95_ms, stats.latency.p99_ms
    );
    for svc in &stats.services {
        println!(
            "  {} requests={} errors={}",
            svc.node,
            svc.request_count,
            error_count(svc.error_count)
        );
    }
}

pub fn print_collection_human(report: &CollectionReport) {
    if !report.started {
        println!("{}", "collection already in progress".yellow());
        return;
    }
    println!(
        "collected traces={} recorded={} skipped={}",
        report.traces_seen, report.flows_recorded, report.skipped
    );
    if let Some(err) = &report.error {
        println!("{} {err}", "backend error:".red());
    }
}

pub fn print_collector_human(status: &CollectorStatus) {
    let state = if !status.enabled {
        "disabled".bright_black().to_string()
    } else if status.collecting {
        "collecting".yellow().to_string()
    } else {
        "idle".green().to_string()
    };
    println!("collector: {state}");
    println!("  backend: {} {}", status.backend, status.backend_url);
    println!(
        "  interval: {}  lookback: {}",
        humantime::format_duration(status.interval),
        humantime::format_duration(status.lookback)
    );
    let namespaces = if status.namespaces.is_empty() {
        "(all)".to_string()
    } else {
        status.namespaces.join(",")
    };
    println!("  namespaces: {namespaces}");
    println!("  cycles: {}", status.cycles);
    if let Some(at) = status.last_run {
        println!(
            "  last_run: {}",
            at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }
    if let Some(err) = &status.last_error {
        println!("  last_error: {}", err.red());
    }
}

pub fn print_status_human(stats: &StoreStats) {
    println!("flows: {}", stats.flows);
    println!("dependency_edges: {}", stats.dependency_edges);
    let fmt = |ts: Option<chrono::DateTime<chrono::Utc>>| {
        ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| "-".to_string())
    };
    println!("oldest_flow: {}", fmt(stats.oldest_flow));
    println!("newest_flow: {}", fmt(stats.newest_flow));
}

fn error_count(n: u64) -> String {
    if n > 0 {
        n.red().to_string()
    } else {
        n.to_string()
    }
}
