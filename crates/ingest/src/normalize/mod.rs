//! Conversion of backend trace payloads into canonical [`Span`]s.
//!
//! Each wire format has its own module that flattens the payload into
//! [`RawSpan`]s; attribute resolution and namespace inference are shared.

pub mod jaeger;
pub mod otlp;

use std::collections::BTreeMap;

use meshflow_core::config::NamespaceRule;
use meshflow_core::ids::TraceId;
use meshflow_core::model::span::{DEFAULT_NAMESPACE, Span, SpanAttributes, SpanStatus};

pub use jaeger::{JaegerTrace, normalize_jaeger, normalize_jaeger_value};
pub use otlp::normalize_otlp;

pub const SERVICE_KEYS: &[&str] = &["service.name", "service", "app"];
pub const NAMESPACE_KEYS: &[&str] = &[
    "k8s.namespace.name",
    "service.namespace",
    "namespace",
    "kubernetes.namespace",
];
pub const POD_KEYS: &[&str] = &["k8s.pod.name", "pod.name", "pod", "hostname"];
pub const ENVIRONMENT_KEYS: &[&str] = &[
    "deployment.environment",
    "deployment.environment.name",
    "env",
];
pub const UI_EVENT_KEYS: &[&str] = &["ui.event", "ui_event", "user.action"];

const UNKNOWN: &str = "unknown";

pub type Attributes = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTrace {
    pub trace_id: String,
    pub spans: Vec<Span>,
    pub operation_name: String,
    pub ui_event: Option<String>,
}

impl NormalizedTrace {
    /// First non-default namespace carried by any span, else `default`.
    pub fn namespace(&self) -> &str {
        self.spans
            .iter()
            .map(|s| s.attributes.namespace.as_str())
            .find(|ns| !ns.is_empty() && !ns.eq_ignore_ascii_case(DEFAULT_NAMESPACE))
            .unwrap_or(DEFAULT_NAMESPACE)
    }
}

/// A span flattened out of its wire format, before alias resolution.
#[derive(Debug, Default)]
pub(crate) struct RawSpan {
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub operation_name: String,
    pub start_time: u64,
    pub duration: u64,
    pub error: bool,
    pub span_attrs: Attributes,
    pub resource_attrs: Attributes,
    pub fallback_service: Option<String>,
}

/// Returns the first non-empty value for any of `keys`, searching `layers` in
/// order and the aliases in order within each layer.
pub fn resolve<'a>(keys: &[&str], layers: &[&'a Attributes]) -> Option<&'a str> {
    layers.iter().copied().find_map(|layer| {
        keys.iter()
            .filter_map(|key| layer.get(*key))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    })
}

pub fn infer_namespace(service: &str, rules: &[NamespaceRule]) -> String {
    let service = service.to_ascii_lowercase();
    rules
        .iter()
        .find(|rule| {
            !rule.pattern.is_empty() && service.contains(&rule.pattern.to_ascii_lowercase())
        })
        .map(|rule| rule.namespace.clone())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
}

pub(crate) fn into_span(trace_id: &str, raw: RawSpan, rules: &[NamespaceRule]) -> Span {
    let layers = [&raw.span_attrs, &raw.resource_attrs];

    let service_name = resolve(SERVICE_KEYS, &layers)
        .map(str::to_string)
        .or_else(|| raw.fallback_service.clone().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let namespace = resolve(NAMESPACE_KEYS, &layers)
        .map(str::to_string)
        .unwrap_or_else(|| infer_namespace(&service_name, rules));
    let pod_name = resolve(POD_KEYS, &layers).map(str::to_string);
    let environment = resolve(ENVIRONMENT_KEYS, &layers).map(str::to_string);
    let ui_event = resolve(UI_EVENT_KEYS, &layers).map(str::to_string);

    let mut tags = raw.resource_attrs;
    tags.extend(raw.span_attrs);

    Span {
        trace_id: trace_id.to_string(),
        span_id: raw.span_id,
        parent_span_id: raw.parent_span_id.filter(|p| !p.is_empty()),
        operation_name: raw.operation_name,
        start_time: raw.start_time,
        duration: raw.duration,
        status: if raw.error {
            SpanStatus::Error
        } else {
            SpanStatus::Ok
        },
        attributes: SpanAttributes {
            service_name,
            namespace,
            pod_name,
            environment,
            ui_event,
            tags,
        },
    }
}

/// Canonical trace id for keying: lowercased, short ids padded. Ids that are
/// not hex are kept lowercased as-is.
pub(crate) fn canonical_trace_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(
        TraceId::parse(raw)
            .map(TraceId::into_string)
            .unwrap_or_else(|_| raw.to_ascii_lowercase()),
    )
}

pub(crate) fn assemble(trace_id: String, spans: Vec<Span>) -> Option<NormalizedTrace> {
    let first = spans.first()?;
    let operation_name = Some(first.operation_name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string();
    let ui_event = first.attributes.ui_event.clone();

    Some(NormalizedTrace {
        trace_id,
        spans,
        operation_name,
        ui_event,
    })
}
