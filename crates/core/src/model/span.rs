use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    #[default]
    Ok,
    Error,
}

impl SpanStatus {
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "success",
            Self::Error => "error",
        }
    }
}

/// Attributes every canonical span carries, whatever backend it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SpanAttributes {
    pub service_name: String,
    pub namespace: String,
    pub pod_name: Option<String>,
    pub environment: Option<String>,
    pub ui_event: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// Canonical span. Timing is in nanoseconds; a `start_time` of zero means the
/// backend did not report one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub operation_name: String,
    pub start_time: u64,
    pub duration: u64,
    pub status: SpanStatus,
    pub attributes: SpanAttributes,
}

impl Span {
    pub fn node_id(&self) -> String {
        node_id(&self.attributes.namespace, &self.attributes.service_name)
    }

    pub fn end_time(&self) -> u64 {
        self.start_time.saturating_add(self.duration)
    }

    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }
}

pub fn node_id(namespace: &str, service: &str) -> String {
    format!("{namespace}/{service}")
}

pub fn nanos_to_ms(nanos: u64) -> f64 {
    nanos as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_joins_namespace_and_service() {
        let span = Span {
            trace_id: "t1".into(),
            span_id: "s1".into(),
            parent_span_id: None,
            operation_name: "GET /".into(),
            start_time: 1_000,
            duration: 2_500_000,
            status: SpanStatus::Error,
            attributes: SpanAttributes {
                service_name: "api".into(),
                namespace: "ccs".into(),
                ..SpanAttributes::default()
            },
        };
        assert_eq!(span.node_id(), "ccs/api");
        assert_eq!(span.end_time(), 2_501_000);
        assert!(span.is_error());
    }
}
