use std::collections::HashMap;

use meshflow_core::config::NamespaceRule;
use meshflow_core::ids::hex_encode;
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue};
use opentelemetry_proto::tonic::trace::v1::TracesData;
use opentelemetry_proto::tonic::trace::v1::status::StatusCode;

use super::{Attributes, NormalizedTrace, RawSpan, assemble, canonical_trace_id, into_span};

/// Normalizes OTLP trace data, grouping spans by trace id in the order the
/// traces first appear.
pub fn normalize_otlp(data: &TracesData, rules: &[NamespaceRule]) -> Vec<NormalizedTrace> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<_>> = HashMap::new();

    for resource_spans in &data.resource_spans {
        let resource_attrs = resource_spans
            .resource
            .as_ref()
            .map(|r| kv_to_map(&r.attributes))
            .unwrap_or_default();

        for span in resource_spans.scope_spans.iter().flat_map(|s| &s.spans) {
            let Some(trace_id) = hex_encode(&span.trace_id).and_then(|t| canonical_trace_id(&t))
            else {
                continue;
            };
            let Some(span_id) = hex_encode(&span.span_id) else {
                continue;
            };

            let error = span
                .status
                .as_ref()
                .is_some_and(|s| s.code == StatusCode::Error as i32);
            let raw = RawSpan {
                span_id,
                parent_span_id: hex_encode(&span.parent_span_id),
                operation_name: span.name.clone(),
                start_time: span.start_time_unix_nano,
                duration: span_duration(span.start_time_unix_nano, span.end_time_unix_nano),
                error,
                span_attrs: kv_to_map(&span.attributes),
                resource_attrs: resource_attrs.clone(),
                fallback_service: None,
            };
            let span = into_span(&trace_id, raw, rules);

            grouped
                .entry(trace_id.clone())
                .or_insert_with(|| {
                    order.push(trace_id);
                    Vec::new()
                })
                .push(span);
        }
    }

    order
        .into_iter()
        .filter_map(|id| {
            let spans = grouped.remove(&id)?;
            assemble(id, spans)
        })
        .collect()
}

/// Zero unless both timestamps are set and ordered.
fn span_duration(start: u64, end: u64) -> u64 {
    if start == 0 || end < start {
        return 0;
    }
    end - start
}

fn kv_to_map(attrs: &[KeyValue]) -> Attributes {
    attrs
        .iter()
        .map(|kv| (kv.key.clone(), any_value_to_string(kv.value.as_ref())))
        .collect()
}

fn any_value_to_string(value: Option<&AnyValue>) -> String {
    value
        .and_then(|v| v.value.as_ref())
        .map(|v| match v {
            Value::StringValue(s) => s.clone(),
            Value::BoolValue(b) => b.to_string(),
            Value::IntValue(i) => i.to_string(),
            Value::DoubleValue(d) => d.to_string(),
            Value::BytesValue(b) => String::from_utf8_lossy(b).to_string(),
            _ => "<complex>".to_string(),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use meshflow_core::model::span::SpanStatus;
    use opentelemetry_proto::tonic::trace::v1::Span as OtlpSpan;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans};

    use super::*;

    const TRACE: &str = "0af7651916cd43dd8448eb211c80319c";

    #[test]
    fn normalizes_sample_trace() {
        let traces = normalize_otlp(&testkit::tempo_trace(TRACE, "dbaas"), &[]);
        assert_eq!(traces.len(), 1);

        let trace = &traces[0];
        assert_eq!(trace.trace_id, TRACE);
        assert_eq!(trace.operation_name, "GET /v1/orders");
        assert_eq!(trace.ui_event.as_deref(), Some("checkout-click"));
        assert_eq!(trace.namespace(), "dbaas");

        let worker = &trace.spans[1];
        assert_eq!(worker.span_id, "b2b2b2b2b2b2b2b2");
        assert_eq!(worker.parent_span_id.as_deref(), Some("a1a1a1a1a1a1a1a1"));
        assert_eq!(worker.status, SpanStatus::Error);
        assert_eq!(worker.duration, 50_000_000);
        assert_eq!(worker.node_id(), "dbaas/worker");
    }

    #[test]
    fn groups_spans_by_trace() {
        let span = |trace: u8, id: u8| OtlpSpan {
            trace_id: vec![trace; 16],
            span_id: vec![id; 8],
            name: format!("op-{trace}"),
            ..Default::default()
        };
        let data = TracesData {
            resource_spans: vec![ResourceSpans {
                resource: None,
                scope_spans: vec![ScopeSpans {
                    scope: None,
                    spans: vec![span(2, 1), span(1, 2), span(2, 3), span(0, 0)],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        };

        let traces = normalize_otlp(&data, &[]);
        assert_eq!(traces.len(), 3);
        assert_eq!(traces[0].trace_id, "02020202020202020202020202020202");
        assert_eq!(traces[0].spans.len(), 2);
        assert_eq!(traces[1].operation_name, "op-1");
        assert_eq!(traces[0].spans[0].attributes.service_name, "unknown");
    }

    #[test]
    fn missing_timestamps_yield_zero_duration() {
        let span = |id: u8, start: u64, end: u64| OtlpSpan {
            trace_id: vec![7; 16],
            span_id: vec![id; 8],
            start_time_unix_nano: start,
            end_time_unix_nano: end,
            ..Default::default()
        };
        let now = testkit::base_micros() * 1_000;
        let data = TracesData {
            resource_spans: vec![ResourceSpans {
                resource: None,
                scope_spans: vec![ScopeSpans {
                    scope: None,
                    spans: vec![
                        span(1, 0, now),
                        span(2, now, 0),
                        span(3, now + 10, now),
                        span(4, now, now + 25),
                    ],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        };

        let traces = normalize_otlp(&data, &[]);
        let durations = traces[0].spans.iter().map(|s| s.duration).collect::<Vec<_>>();
        assert_eq!(durations, vec![0, 0, 0, 25]);
    }

    #[test]
    fn empty_ids_are_skipped() {
        let data = TracesData {
            resource_spans: vec![ResourceSpans {
                resource: None,
                scope_spans: vec![ScopeSpans {
                    scope: None,
                    spans: vec![OtlpSpan::default()],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        };
        assert!(normalize_otlp(&data, &[]).is_empty());
    }
}
