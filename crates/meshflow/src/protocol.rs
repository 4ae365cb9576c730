use meshflow_core::filter::{DependencyFilter, FlowFilter};
use meshflow_core::model::flow::FlowGraph;
use meshflow_core::query::{
    AnalyzeRequest, CollectRequest, CollectionReport, CollectorStatus, DependencyGraph,
    FlowRequest, OperationStats, OperationStatsRequest, StoreStats,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiRequest {
    Flow(FlowRequest),
    Flows(FlowFilter),
    Dependencies(DependencyFilter),
    OperationStats(OperationStatsRequest),
    Analyze(AnalyzeRequest),
    Collect(CollectRequest),
    Collector,
    Status,
    Clear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ApiResponse {
    Flow(Box<FlowGraph>),
    Flows(Vec<FlowGraph>),
    Dependencies(DependencyGraph),
    OperationStats(OperationStats),
    Collection(CollectionReport),
    Collector(CollectorStatus),
    Status(StoreStats),
    Cleared,
    NotFound(String),
    Error(String),
}
