use std::collections::HashMap;

use meshflow_core::config::NamespaceRule;
use serde::Deserialize;

use super::{Attributes, NormalizedTrace, RawSpan, assemble, canonical_trace_id, into_span};

/// Envelope of every Jaeger query API response.
#[derive(Debug, Deserialize)]
#[serde(bound = "T: Deserialize<'de>")]
pub struct JaegerResponse<T> {
    #[serde(default = "Vec::new", deserialize_with = "null_as_empty")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JaegerTrace {
    #[serde(rename = "traceID", default)]
    pub trace_id: String,
    /// Spans that fail to decode are dropped individually.
    #[serde(default, deserialize_with = "lenient_spans")]
    pub spans: Vec<JaegerSpan>,
    #[serde(default)]
    pub processes: HashMap<String, JaegerProcess>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JaegerSpan {
    #[serde(rename = "spanID")]
    pub span_id: String,
    #[serde(default)]
    pub operation_name: String,
    #[serde(default)]
    pub references: Vec<JaegerReference>,
    /// Microseconds since the epoch.
    #[serde(default)]
    pub start_time: u64,
    /// Microseconds.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub tags: Vec<JaegerTag>,
    #[serde(rename = "processID", default)]
    pub process_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JaegerReference {
    #[serde(default)]
    pub ref_type: String,
    #[serde(rename = "spanID", default)]
    pub span_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JaegerTag {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JaegerProcess {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub tags: Vec<JaegerTag>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_spans<'de, D>(deserializer: D) -> Result<Vec<JaegerSpan>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<JaegerSpan>(value) {
            Ok(span) => Some(span),
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed jaeger span");
                None
            }
        })
        .collect())
}

/// Normalizes one element of a Jaeger `data` array; `None` when the value is
/// not a trace or carries no spans.
pub fn normalize_jaeger_value(
    value: &serde_json::Value,
    rules: &[NamespaceRule],
) -> Option<NormalizedTrace> {
    match serde_json::from_value::<JaegerTrace>(value.clone()) {
        Ok(trace) => normalize_jaeger(&trace, rules),
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed jaeger trace");
            None
        }
    }
}

pub fn normalize_jaeger(trace: &JaegerTrace, rules: &[NamespaceRule]) -> Option<NormalizedTrace> {
    let trace_id = canonical_trace_id(&trace.trace_id)?;

    let spans = trace
        .spans
        .iter()
        .filter(|s| !s.span_id.is_empty())
        .map(|span| {
            let process = trace.processes.get(&span.process_id);
            let span_attrs = tags_to_map(&span.tags);
            let raw = RawSpan {
                span_id: span.span_id.to_ascii_lowercase(),
                parent_span_id: parent_of(span),
                operation_name: span.operation_name.clone(),
                start_time: span.start_time.saturating_mul(1_000),
                duration: span.duration.saturating_mul(1_000),
                error: is_error(&span_attrs),
                resource_attrs: process.map(|p| tags_to_map(&p.tags)).unwrap_or_default(),
                fallback_service: process.map(|p| p.service_name.clone()),
                span_attrs,
            };
            into_span(&trace_id, raw, rules)
        })
        .collect::<Vec<_>>();

    assemble(trace_id, spans)
}

fn parent_of(span: &JaegerSpan) -> Option<String> {
    let mut refs = span.references.iter().filter(|r| !r.span_id.is_empty());
    refs.clone()
        .find(|r| r.ref_type.eq_ignore_ascii_case("CHILD_OF"))
        .or_else(|| refs.next())
        .map(|r| r.span_id.to_ascii_lowercase())
}

fn is_error(tags: &Attributes) -> bool {
    tags.get("error").is_some_and(|v| v.eq_ignore_ascii_case("true"))
        || tags
            .get("otel.status_code")
            .is_some_and(|v| v.eq_ignore_ascii_case("ERROR"))
}

fn tags_to_map(tags: &[JaegerTag]) -> Attributes {
    tags.iter()
        .map(|tag| {
            let value = match &tag.value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (tag.key.clone(), value)
        })
        .collect()
}
