use chrono::{DateTime, Utc};
use meshflow_core::model::dependency::DependencyEdge;
use meshflow_core::model::flow::{FlowEdge, FlowGraph};

use crate::Store;

impl Store {
    /// Stores a flow keyed by its trace id. A repeated trace id replaces the
    /// previous graph and counts as the newest insertion.
    pub fn put(&self, flow: FlowGraph) {
        let max_flows = self.options().max_flows;
        let mut flows = self.flows();
        flows.shift_remove(&flow.trace_id);
        flows.insert(flow.trace_id.clone(), flow);

        if max_flows > 0 && flows.len() > max_flows {
            let excess = flows.len() - max_flows;
            flows.drain(..excess);
            tracing::debug!(evicted = excess, "flow cap reached, evicted oldest flows");
        }
    }

    /// Stores the flow and folds its edges into the cluster dependency map.
    pub fn record_flow(&self, flow: FlowGraph) {
        let edges = flow.edges.values().cloned().collect::<Vec<_>>();
        self.put(flow);
        self.fold_edges(&edges, Utc::now());
    }

    pub fn fold_edges(&self, edges: &[FlowEdge], now: DateTime<Utc>) {
        if edges.is_empty() {
            return;
        }

        let mut deps = self.edges();
        for edge in edges {
            let record = deps
                .entry(edge.id.clone())
                .or_insert_with(|| DependencyEdge::new(&edge.source, &edge.target, now));
            record.call_count += edge.call_count;
            record.error_count += edge.error_count;
            record.total_latency = record.total_latency.saturating_add(edge.total_latency);
            record.last_seen = now;
        }
    }
}
