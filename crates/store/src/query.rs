use std::cmp::Reverse;

use indexmap::IndexMap;
use meshflow_core::filter::{DependencyFilter, FlowFilter};
use meshflow_core::ids::TraceId;
use meshflow_core::model::dependency::DependencyEdge;
use meshflow_core::model::flow::FlowGraph;
use meshflow_core::query::{
    DependencyEdgeView, DependencyGraph, DependencyNode, FlowRequest, OperationStats,
    OperationStatsRequest, ServiceBreakdown,
};
use meshflow_core::stats::summarize;

use crate::Store;

impl Store {
    pub fn get_flow_graph(&self, req: &FlowRequest) -> Option<FlowGraph> {
        let flows = self.flows();
        if let Some(flow) = flows.get(&req.trace_id) {
            return Some(flow.clone());
        }
        let normalized = TraceId::parse(&req.trace_id).ok()?;
        flows.get(normalized.as_str()).cloned()
    }

    pub fn list_all(&self) -> Vec<FlowGraph> {
        self.flows().values().cloned().collect()
    }

    /// Flows matching every set filter, newest first. A `limit` of zero
    /// returns all matches.
    pub fn get_flow_graphs(&self, filter: &FlowFilter) -> Vec<FlowGraph> {
        let mut out = self
            .flows()
            .values()
            .filter(|flow| matches_flow(flow, filter))
            .cloned()
            .collect::<Vec<_>>();

        out.sort_by_key(|f| Reverse(f.start_time));
        if filter.limit > 0 {
            out.truncate(filter.limit);
        }
        out
    }

    pub fn get_service_dependencies(&self, filter: &DependencyFilter) -> DependencyGraph {
        let edges = self
            .edges()
            .values()
            .filter(|edge| matches_dependency(edge, filter))
            .cloned()
            .collect::<Vec<_>>();

        let mut nodes: IndexMap<String, DependencyNode> = IndexMap::new();
        let mut views = Vec::with_capacity(edges.len());
        for edge in edges {
            for (id, namespace, service) in [
                (&edge.source, edge.source_namespace(), edge.source_service()),
                (&edge.target, edge.target_namespace(), edge.target_service()),
            ] {
                nodes
                    .entry(id.clone())
                    .or_insert_with(|| DependencyNode {
                        id: id.clone(),
                        namespace: namespace.to_string(),
                        service: service.to_string(),
                    });
            }
            views.push(edge_view(&edge));
        }

        DependencyGraph {
            nodes: nodes.into_values().collect(),
            edges: views,
        }
    }

    pub fn get_operation_stats(&self, req: &OperationStatsRequest) -> Option<OperationStats> {
        let flows = self.get_flow_graphs(&FlowFilter {
            operation_name: Some(req.operation_name.clone()),
            window: req.window.clone(),
            limit: 0,
            ..FlowFilter::default()
        });
        if flows.is_empty() {
            return None;
        }

        let total_requests = flows.len();
        let error_count = flows.iter().filter(|f| f.has_errors()).count();
        let mut latencies = Vec::new();
        let mut services: IndexMap<String, ServiceBreakdown> = IndexMap::new();
        for node in flows.iter().flat_map(|f| f.nodes.values()) {
            latencies.extend_from_slice(&node.metrics.latencies);
            let entry = services
                .entry(node.id.clone())
                .or_insert_with(|| ServiceBreakdown {
                    node: node.id.clone(),
                    namespace: node.namespace.clone(),
                    service: node.service.clone(),
                    request_count: 0,
                    error_count: 0,
                });
            entry.request_count += node.metrics.request_count;
            entry.error_count += node.metrics.error_count;
        }

        let mut services = services.into_values().collect::<Vec<_>>();
        services.sort_by(|a, b| {
            b.request_count
                .cmp(&a.request_count)
                .then_with(|| a.node.cmp(&b.node))
        });

        Some(OperationStats {
            operation_name: req.operation_name.clone(),
            total_requests,
            success_count: total_requests - error_count,
            error_count,
            error_rate: error_count as f64 / total_requests as f64,
            latency: summarize(&latencies),
            services,
        })
    }
}

fn matches_flow(flow: &FlowGraph, filter: &FlowFilter) -> bool {
    if let Some(op) = &filter.operation_name
        && &flow.operation_name != op
    {
        return false;
    }
    if let Some(ns) = &filter.namespace
        && !flow.touches_namespace(ns)
    {
        return false;
    }
    if let Some(env) = &filter.environment
        && !flow
            .environment
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case(env))
    {
        return false;
    }
    filter.window.contains_range(flow.start_time, flow.end_time)
}

fn matches_dependency(edge: &DependencyEdge, filter: &DependencyFilter) -> bool {
    if let Some(ns) = &filter.namespace
        && !edge.source_namespace().eq_ignore_ascii_case(ns)
        && !edge.target_namespace().eq_ignore_ascii_case(ns)
    {
        return false;
    }
    if let Some(svc) = &filter.service_name
        && edge.source_service() != svc
        && edge.target_service() != svc
    {
        return false;
    }
    true
}

fn edge_view(edge: &DependencyEdge) -> DependencyEdgeView {
    DependencyEdgeView {
        id: edge.key(),
        source: edge.source.clone(),
        target: edge.target.clone(),
        source_namespace: edge.source_namespace().to_string(),
        source_service: edge.source_service().to_string(),
        target_namespace: edge.target_namespace().to_string(),
        target_service: edge.target_service().to_string(),
        call_count: edge.call_count,
        error_count: edge.error_count,
        error_rate: edge.error_rate(),
        avg_latency_ms: edge.avg_latency_ms(),
        last_seen: edge.last_seen,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use meshflow_core::filter::{DependencyFilter, FlowFilter, TimeWindow};
    use meshflow_core::graph::build_flow_graph;
    use meshflow_core::model::flow::FlowEdge;
    use meshflow_core::query::{FlowRequest, OperationStatsRequest};
    use meshflow_core::time::dt_to_nanos;

    use crate::Store;
    use crate::db::testing::{SpanSpec, flow, flow_with, span};

    #[test]
    fn missing_flow_is_none() {
        let store = Store::default();
        store.record_flow(flow("4bf92f3577b34da6a3ce929d0e0e4736"));
        assert!(
            store
                .get_flow_graph(&FlowRequest {
                    trace_id: "nope".into()
                })
                .is_none()
        );
        assert!(
            store
                .get_flow_graph(&FlowRequest {
                    trace_id: "4BF92F3577B34DA6A3CE929D0E0E4736".into()
                })
                .is_some()
        );
    }

    #[test]
    fn namespace_filter_is_case_insensitive() {
        let store = Store::default();
        store.record_flow(flow_with("t1", "op", 1_000, "CCS"));
        store.record_flow(flow_with("t2", "op", 2_000, "dbaas"));

        let flows = store.get_flow_graphs(&FlowFilter {
            namespace: Some("ccs".into()),
            ..FlowFilter::default()
        });
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].trace_id, "t1");
    }

    #[test]
    fn flows_sort_newest_first_and_filter_by_operation() {
        let store = Store::default();
        store.record_flow(flow_with("t1", "checkout", 1_000, "ccs"));
        store.record_flow(flow_with("t2", "checkout", 9_000, "ccs"));
        store.record_flow(flow_with("t3", "login", 5_000, "ccs"));

        let flows = store.get_flow_graphs(&FlowFilter {
            operation_name: Some("checkout".into()),
            ..FlowFilter::default()
        });
        let ids = flows.iter().map(|f| f.trace_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["t2", "t1"]);

        let limited = store.get_flow_graphs(&FlowFilter {
            limit: 1,
            ..FlowFilter::default()
        });
        assert_eq!(limited[0].trace_id, "t2");
    }

    #[test]
    fn flows_filter_by_time_window() {
        let store = Store::default();
        let base = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let early = dt_to_nanos(base);
        let late = dt_to_nanos(base + chrono::Duration::hours(1));
        store.record_flow(flow_with("early", "op", early, "ccs"));
        store.record_flow(flow_with("late", "op", late, "ccs"));

        let flows = store.get_flow_graphs(&FlowFilter {
            window: TimeWindow {
                since: Some(base + chrono::Duration::minutes(30)),
                until: None,
            },
            ..FlowFilter::default()
        });
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].trace_id, "late");
    }

    #[test]
    fn flows_filter_by_environment() {
        let store = Store::default();
        let mut spans = vec![span(SpanSpec {
            id: "1",
            parent: None,
            ns: "ccs",
            svc: "api",
            start: 10,
            dur: 10,
            error: false,
        })];
        spans[0].attributes.environment = Some("staging".into());
        store.record_flow(build_flow_graph("t1", &spans, "op", None).unwrap());
        store.record_flow(flow("t2"));

        let flows = store.get_flow_graphs(&FlowFilter {
            environment: Some("Staging".into()),
            ..FlowFilter::default()
        });
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].trace_id, "t1");
    }

    #[test]
    fn dependencies_report_rates_and_filter() {
        let store = Store::default();
        store.record_flow(flow_with("t1", "op", 1_000, "ccs"));
        store.record_flow(flow_with("t2", "op", 1_000, "dbaas"));

        let all = store.get_service_dependencies(&DependencyFilter::default());
        assert_eq!(all.edges.len(), 2);
        assert_eq!(all.nodes.len(), 4);
        let ccs = all
            .edges
            .iter()
            .find(|e| e.id == "ccs/api->ccs/worker")
            .unwrap();
        assert_eq!(ccs.call_count, 1);
        assert_eq!(ccs.error_rate, 1.0);
        assert_eq!(ccs.avg_latency_ms, 50.0);

        let scoped = store.get_service_dependencies(&DependencyFilter {
            namespace: Some("DBAAS".into()),
            service_name: None,
        });
        assert_eq!(scoped.edges.len(), 1);
        assert_eq!(scoped.edges[0].source_namespace, "dbaas");

        let by_service = store.get_service_dependencies(&DependencyFilter {
            namespace: None,
            service_name: Some("worker".into()),
        });
        assert_eq!(by_service.edges.len(), 2);
    }

    #[test]
    fn dependencies_with_zero_calls_report_zero_rates() {
        let store = Store::default();
        store.fold_edges(
            &[FlowEdge {
                id: "a/x->a/y".into(),
                source: "a/x".into(),
                target: "a/y".into(),
                call_count: 0,
                error_count: 0,
                total_latency: 0,
            }],
            Utc::now(),
        );
        let deps = store.get_service_dependencies(&DependencyFilter::default());
        assert_eq!(deps.edges[0].error_rate, 0.0);
        assert_eq!(deps.edges[0].avg_latency_ms, 0.0);
        assert!(!deps.edges[0].error_rate.is_nan());
    }

    #[test]
    fn operation_stats_pool_all_nodes() -> anyhow::Result<()> {
        let store = Store::default();
        store.record_flow(flow_with("t1", "checkout", 1_000, "ccs"));
        let ok_spans = vec![span(SpanSpec {
            id: "1",
            parent: None,
            ns: "ccs",
            svc: "api",
            start: 5_000,
            dur: 20_000_000,
            error: false,
        })];
        store.record_flow(
            build_flow_graph("t2", &ok_spans, "checkout", None)
                .ok_or_else(|| anyhow::anyhow!("empty flow"))?,
        );

        let stats = store
            .get_operation_stats(&OperationStatsRequest {
                operation_name: "checkout".into(),
                window: TimeWindow::all(),
            })
            .ok_or_else(|| anyhow::anyhow!("no stats"))?;

        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.error_rate, 0.5);
        assert_eq!(stats.latency.p50_ms, 50.0);
        assert_eq!(stats.latency.p99_ms, 100.0);
        assert_eq!(stats.services[0].node, "ccs/api");
        assert_eq!(stats.services[0].request_count, 2);
        assert_eq!(stats.services[1].error_count, 1);
        Ok(())
    }

    #[test]
    fn operation_stats_unknown_operation_is_none() {
        let store = Store::default();
        store.record_flow(flow("t1"));
        assert!(
            store
                .get_operation_stats(&OperationStatsRequest {
                    operation_name: "missing".into(),
                    window: TimeWindow::all(),
                })
                .is_none()
        );
    }
}
