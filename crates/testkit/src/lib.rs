use chrono::{TimeZone, Utc};
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::status::StatusCode;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, Status, TracesData};
use prost::Message;
use serde_json::{Value as Json, json};

/// 2026-02-01T00:00:00Z in microseconds.
pub fn base_micros() -> u64 {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0)
        .unwrap()
        .timestamp_micros() as u64
}

/// One Jaeger query API trace: `{namespace}/api` calls `{namespace}/worker`,
/// which fails. The api span lasts 100ms and the worker 50ms.
pub fn jaeger_trace(trace_id: &str, namespace: &str) -> Json {
    let start = base_micros();
    json!({
        "traceID": trace_id,
        "spans": [
            {
                "traceID": trace_id,
                "spanID": "00000000000000a1",
                "operationName": "GET /v1/orders",
                "references": [],
                "startTime": start,
                "duration": 100_000,
                "tags": [
                    {"key": "ui.event", "type": "string", "value": "checkout-click"},
                    {"key": "deployment.environment", "type": "string", "value": "staging"}
                ],
                "processID": "p1"
            },
            {
                "traceID": trace_id,
                "spanID": "00000000000000b2",
                "operationName": "process order",
                "references": [
                    {"refType": "CHILD_OF", "traceID": trace_id, "spanID": "00000000000000a1"}
                ],
                "startTime": start + 20_000,
                "duration": 50_000,
                "tags": [
                    {"key": "error", "type": "bool", "value": true}
                ],
                "processID": "p2"
            }
        ],
        "processes": {
            "p1": {
                "serviceName": "api",
                "tags": [
                    {"key": "k8s.namespace.name", "type": "string", "value": namespace},
                    {"key": "k8s.pod.name", "type": "string", "value": "api-7d9f-1"}
                ]
            },
            "p2": {
                "serviceName": "worker",
                "tags": [
                    {"key": "k8s.namespace.name", "type": "string", "value": namespace}
                ]
            }
        }
    })
}

pub fn jaeger_data(items: Vec<Json>) -> Json {
    json!({ "data": items })
}

/// Tempo search response listing the given trace ids.
pub fn tempo_search(trace_ids: &[&str]) -> Json {
    let traces = trace_ids
        .iter()
        .map(|id| json!({"traceID": id, "rootServiceName": "api"}))
        .collect::<Vec<_>>();
    json!({ "traces": traces })
}

/// Same shape as [`jaeger_trace`], as OTLP `TracesData`. `trace_id` must be
/// 32 hex characters.
pub fn tempo_trace(trace_id: &str, namespace: &str) -> TracesData {
    let trace_bytes = hex_bytes(trace_id);
    let start = base_micros() * 1_000;

    let api = Span {
        trace_id: trace_bytes.clone(),
        span_id: vec![0xa1; 8],
        name: "GET /v1/orders".into(),
        start_time_unix_nano: start,
        end_time_unix_nano: start + 100_000_000,
        attributes: vec![kv("ui.event", "checkout-click")],
        ..Default::default()
    };
    let worker = Span {
        trace_id: trace_bytes,
        span_id: vec![0xb2; 8],
        parent_span_id: vec![0xa1; 8],
        name: "process order".into(),
        start_time_unix_nano: start + 20_000_000,
        end_time_unix_nano: start + 70_000_000,
        status: Some(Status {
            message: "boom".into(),
            code: StatusCode::Error as i32,
        }),
        ..Default::default()
    };

    TracesData {
        resource_spans: vec![
            resource_spans("api", namespace, api),
            resource_spans("worker", namespace, worker),
        ],
    }
}

pub fn tempo_trace_bytes(trace_id: &str, namespace: &str) -> Vec<u8> {
    tempo_trace(trace_id, namespace).encode_to_vec()
}

fn resource_spans(service: &str, namespace: &str, span: Span) -> ResourceSpans {
    ResourceSpans {
        resource: Some(Resource {
            attributes: vec![
                kv("service.name", service),
                kv("k8s.namespace.name", namespace),
            ],
            dropped_attributes_count: 0,
            entity_refs: vec![],
        }),
        scope_spans: vec![ScopeSpans {
            scope: None,
            spans: vec![span],
            schema_url: String::new(),
        }],
        schema_url: String::new(),
    }
}

pub fn kv(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.into(),
        value: Some(AnyValue {
            value: Some(Value::StringValue(value.into())),
        }),
    }
}

fn hex_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}
