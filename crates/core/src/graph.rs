use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::Utc;
use indexmap::IndexMap;

use crate::model::flow::{
    FlowEdge, FlowGraph, FlowMetadata, FlowNode, NodeMetrics, SequenceStep, edge_id, flow_id,
};
use crate::model::span::Span;
use crate::stats::summarize;

/// Reconstructs the service graph of one trace.
///
/// Nodes are keyed `namespace/service`; an edge is recorded for every
/// parent/child pair whose spans resolve to different nodes. Spans sharing a
/// `span_id` are counted once. Returns `None` for an empty trace.
pub fn build_flow_graph(
    trace_id: &str,
    spans: &[Span],
    operation_name: &str,
    ui_event: Option<&str>,
) -> Option<FlowGraph> {
    let mut seen = HashSet::new();
    let spans = spans
        .iter()
        .filter(|s| seen.insert(s.span_id.as_str()))
        .collect::<Vec<_>>();
    if spans.is_empty() {
        return None;
    }

    let mut nodes: IndexMap<String, FlowNode> = IndexMap::new();
    let mut by_span_id: HashMap<&str, &Span> = HashMap::with_capacity(spans.len());

    for &span in &spans {
        by_span_id.insert(span.span_id.as_str(), span);

        let id = span.node_id();
        let node = nodes.entry(id.clone()).or_insert_with(|| FlowNode {
            id,
            namespace: span.attributes.namespace.clone(),
            service: span.attributes.service_name.clone(),
            pods: Vec::new(),
            metrics: NodeMetrics::default(),
        });

        if let Some(pod) = &span.attributes.pod_name
            && !node.pods.contains(pod)
        {
            node.pods.push(pod.clone());
        }

        let metrics = &mut node.metrics;
        metrics.request_count += 1;
        if span.is_error() {
            metrics.error_count += 1;
        }
        metrics.total_latency = metrics.total_latency.saturating_add(span.duration);
        metrics.latencies.push(span.duration);
    }

    let mut edges: IndexMap<String, FlowEdge> = IndexMap::new();
    for span in &spans {
        let Some(parent_id) = span.parent_span_id.as_deref() else {
            continue;
        };
        let Some(parent) = by_span_id.get(parent_id) else {
            continue;
        };

        let source = parent.node_id();
        let target = span.node_id();
        if source == target {
            continue;
        }

        let id = edge_id(&source, &target);
        let edge = edges.entry(id.clone()).or_insert_with(|| FlowEdge {
            id,
            source,
            target,
            call_count: 0,
            error_count: 0,
            total_latency: 0,
        });
        edge.call_count += 1;
        if span.is_error() {
            edge.error_count += 1;
        }
        edge.total_latency = edge.total_latency.saturating_add(span.duration);
    }

    for node in nodes.values_mut() {
        let summary = summarize(&node.metrics.latencies);
        node.metrics.avg_latency_ms = summary.avg_ms;
        node.metrics.p50_latency_ms = summary.p50_ms;
        node.metrics.p95_latency_ms = summary.p95_ms;
        node.metrics.p99_latency_ms = summary.p99_ms;
    }

    let timed = spans.iter().filter(|s| s.start_time > 0);
    let start_time = timed.clone().map(|s| s.start_time).min().unwrap_or(0);
    let end_time = timed.clone().map(|s| s.end_time()).max().unwrap_or(0);

    let mut span_sequence = timed
        .map(|s| SequenceStep {
            span_id: s.span_id.clone(),
            parent_span_id: s.parent_span_id.clone(),
            operation_name: s.operation_name.clone(),
            node: s.node_id(),
            namespace: s.attributes.namespace.clone(),
            service: s.attributes.service_name.clone(),
            pod_name: s.attributes.pod_name.clone(),
            start_time: s.start_time,
            duration: s.duration,
            status: s.status.label().to_string(),
        })
        .collect::<Vec<_>>();
    span_sequence.sort_by_key(|step| step.start_time);

    let metadata = build_metadata(&nodes, spans.len());
    let environment = spans
        .iter()
        .find_map(|s| s.attributes.environment.clone());

    Some(FlowGraph {
        flow_id: flow_id(trace_id),
        trace_id: trace_id.to_string(),
        operation_name: operation_name.to_string(),
        ui_event: ui_event.map(str::to_string),
        environment,
        start_time,
        end_time,
        duration: end_time.saturating_sub(start_time),
        span_sequence,
        nodes,
        edges,
        metadata,
        created_at: Utc::now(),
    })
}

fn build_metadata(nodes: &IndexMap<String, FlowNode>, total_spans: usize) -> FlowMetadata {
    let mut services: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut error_count = 0;
    for node in nodes.values() {
        services
            .entry(node.namespace.clone())
            .or_default()
            .insert(node.service.clone());
        error_count += node.metrics.error_count;
    }

    FlowMetadata {
        namespaces: services.keys().cloned().collect(),
        services_by_namespace: services
            .into_iter()
            .map(|(ns, svcs)| (ns, svcs.into_iter().collect()))
            .collect(),
        total_spans,
        error_count,
    }
}
