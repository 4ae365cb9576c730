use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use meshflow_core::config::NamespaceRule;
use meshflow_core::graph::build_flow_graph;
use meshflow_core::model::flow::FlowGraph;
use meshflow_core::query::TracePayload;
use meshflow_store::Store;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use prost::Message;
use tracing::debug;

use crate::normalize::{NormalizedTrace, normalize_jaeger_value, normalize_otlp};

/// Normalizes an already-fetched payload into traces. Undecodable payloads
/// yield no traces.
pub fn normalize_payload(payload: &TracePayload, rules: &[NamespaceRule]) -> Vec<NormalizedTrace> {
    match payload {
        TracePayload::Jaeger { trace } => normalize_jaeger_value(trace, rules).into_iter().collect(),
        TracePayload::Tempo { protobuf_base64 } => {
            let bytes = match STANDARD.decode(protobuf_base64.trim()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(error = %e, "analyze payload is not valid base64");
                    return Vec::new();
                }
            };
            match TracesData::decode(bytes.as_slice()) {
                Ok(data) => normalize_otlp(&data, rules),
                Err(e) => {
                    debug!(error = %e, "analyze payload is not OTLP trace data");
                    Vec::new()
                }
            }
        }
    }
}

/// Normalizes, builds and records every trace in `payload`, returning the
/// first resulting flow. `None` means nothing in the payload was analyzable.
pub fn analyze_trace(
    store: &Store,
    payload: &TracePayload,
    rules: &[NamespaceRule],
) -> Option<FlowGraph> {
    let mut first = None;
    for trace in normalize_payload(payload, rules) {
        let Some(flow) = build_flow_graph(
            &trace.trace_id,
            &trace.spans,
            &trace.operation_name,
            trace.ui_event.as_deref(),
        ) else {
            continue;
        };
        if first.is_none() {
            first = Some(flow.clone());
        }
        store.record_flow(flow);
    }
    first
}
