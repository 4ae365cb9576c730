use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::flow::edge_id;
use crate::model::span::nanos_to_ms;

/// Cross-trace record of every `source -> target` call ever observed.
/// Counters only grow while the edge is retained.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    pub call_count: u64,
    pub error_count: u64,
    pub total_latency: u64,
    pub last_seen: DateTime<Utc>,
}

impl DependencyEdge {
    pub fn new(source: &str, target: &str, now: DateTime<Utc>) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            call_count: 0,
            error_count: 0,
            total_latency: 0,
            last_seen: now,
        }
    }

    pub fn key(&self) -> String {
        edge_id(&self.source, &self.target)
    }

    pub fn source_namespace(&self) -> &str {
        split_node(&self.source).0
    }

    pub fn target_namespace(&self) -> &str {
        split_node(&self.target).0
    }

    pub fn source_service(&self) -> &str {
        split_node(&self.source).1
    }

    pub fn target_service(&self) -> &str {
        split_node(&self.target).1
    }

    pub fn error_rate(&self) -> f64 {
        if self.call_count == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.call_count as f64
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.call_count == 0 {
            return 0.0;
        }
        nanos_to_ms(self.total_latency) / self.call_count as f64
    }
}

/// Splits a `namespace/service` node id. Service names may themselves contain
/// slashes, so only the first separator counts.
pub fn split_node(node: &str) -> (&str, &str) {
    node.split_once('/').unwrap_or(("", node))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_node_parts() {
        let edge = DependencyEdge::new("ccs/api", "dbaas/pg/primary", Utc::now());
        assert_eq!(edge.source_namespace(), "ccs");
        assert_eq!(edge.source_service(), "api");
        assert_eq!(edge.target_namespace(), "dbaas");
        assert_eq!(edge.target_service(), "pg/primary");
        assert_eq!(edge.key(), "ccs/api->dbaas/pg/primary");
    }

    #[test]
    fn empty_edge_has_zero_rates() {
        let edge = DependencyEdge::new("a/x", "a/y", Utc::now());
        assert_eq!(edge.error_rate(), 0.0);
        assert_eq!(edge.avg_latency_ms(), 0.0);
    }
}
