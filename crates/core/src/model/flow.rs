use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::span::nanos_to_ms;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeMetrics {
    pub request_count: u64,
    pub error_count: u64,
    /// Sum of span durations in nanoseconds.
    pub total_latency: u64,
    /// Raw span durations in nanoseconds, in span order.
    pub latencies: Vec<u64>,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowNode {
    pub id: String,
    pub namespace: String,
    pub service: String,
    pub pods: Vec<String>,
    pub metrics: NodeMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub call_count: u64,
    pub error_count: u64,
    pub total_latency: u64,
}

impl FlowEdge {
    pub fn avg_latency_ms(&self) -> f64 {
        if self.call_count == 0 {
            return 0.0;
        }
        nanos_to_ms(self.total_latency) / self.call_count as f64
    }

    pub fn error_rate(&self) -> f64 {
        if self.call_count == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.call_count as f64
    }
}

/// One entry of the chronological timeline of a flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequenceStep {
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub operation_name: String,
    pub node: String,
    pub namespace: String,
    pub service: String,
    pub pod_name: Option<String>,
    pub start_time: u64,
    pub duration: u64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FlowMetadata {
    pub namespaces: Vec<String>,
    pub services_by_namespace: BTreeMap<String, Vec<String>>,
    pub total_spans: usize,
    pub error_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowGraph {
    pub flow_id: String,
    pub trace_id: String,
    pub operation_name: String,
    pub ui_event: Option<String>,
    pub environment: Option<String>,
    pub start_time: u64,
    pub end_time: u64,
    pub duration: u64,
    pub span_sequence: Vec<SequenceStep>,
    pub nodes: IndexMap<String, FlowNode>,
    pub edges: IndexMap<String, FlowEdge>,
    pub metadata: FlowMetadata,
    pub created_at: DateTime<Utc>,
}

impl FlowGraph {
    pub fn duration_ms(&self) -> f64 {
        nanos_to_ms(self.duration)
    }

    pub fn has_errors(&self) -> bool {
        self.nodes.values().any(|n| n.metrics.error_count > 0)
    }

    pub fn touches_namespace(&self, namespace: &str) -> bool {
        self.nodes
            .values()
            .any(|n| n.namespace.eq_ignore_ascii_case(namespace))
    }
}

pub fn flow_id(trace_id: &str) -> String {
    format!("flow_{trace_id}")
}

pub fn edge_id(source: &str, target: &str) -> String {
    format!("{source}->{target}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_rates_are_zero_without_calls() {
        let edge = FlowEdge {
            id: edge_id("a/x", "a/y"),
            source: "a/x".into(),
            target: "a/y".into(),
            call_count: 0,
            error_count: 0,
            total_latency: 0,
        };
        assert_eq!(edge.error_rate(), 0.0);
        assert_eq!(edge.avg_latency_ms(), 0.0);
        assert_eq!(edge.id, "a/x->a/y");
    }
}
