use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BackendKind;
use crate::filter::TimeWindow;
use crate::stats::LatencySummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRequest {
    pub trace_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyNode {
    pub id: String,
    pub namespace: String,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdgeView {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_namespace: String,
    pub source_service: String,
    pub target_namespace: String,
    pub target_service: String,
    pub call_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DependencyGraph {
    pub nodes: Vec<DependencyNode>,
    pub edges: Vec<DependencyEdgeView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStatsRequest {
    pub operation_name: String,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceBreakdown {
    pub node: String,
    pub namespace: String,
    pub service: String,
    pub request_count: u64,
    pub error_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStats {
    pub operation_name: String,
    pub total_requests: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub error_rate: f64,
    pub latency: LatencySummary,
    pub services: Vec<ServiceBreakdown>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreStats {
    pub flows: usize,
    pub dependency_edges: usize,
    pub oldest_flow: Option<DateTime<Utc>>,
    pub newest_flow: Option<DateTime<Utc>>,
}

/// A raw trace as fetched from a backend, handed to the analyze entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum TracePayload {
    /// One element of a Jaeger query API `data` array.
    Jaeger { trace: serde_json::Value },
    /// A Tempo trace-by-id response encoded as OTLP protobuf.
    Tempo { protobuf_base64: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub payload: TracePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectRequest {
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CollectionReport {
    /// False when another cycle was already running and this trigger was dropped.
    pub started: bool,
    pub traces_seen: usize,
    pub flows_recorded: usize,
    pub skipped: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorStatus {
    pub enabled: bool,
    pub collecting: bool,
    pub interval: Duration,
    pub lookback: Duration,
    pub backend: BackendKind,
    pub backend_url: String,
    pub namespaces: Vec<String>,
    pub cycles: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
