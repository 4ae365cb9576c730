use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use meshflow_core::model::dependency::DependencyEdge;
use meshflow_core::model::flow::FlowGraph;
use meshflow_core::query::StoreStats;

pub(crate) type FlowMap = IndexMap<String, FlowGraph>;
pub(crate) type EdgeMap = IndexMap<String, DependencyEdge>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Upper bound on cached flow graphs; zero disables the cap.
    pub max_flows: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { max_flows: 5_000 }
    }
}

/// Process-wide cache of flow graphs keyed by trace id and of cumulative
/// service-to-service edges keyed by `source->target`. Both maps keep
/// insertion order. Clones share the same maps.
#[derive(Clone)]
pub struct Store {
    flows: Arc<Mutex<FlowMap>>,
    edges: Arc<Mutex<EdgeMap>>,
    options: StoreOptions,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl Store {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            flows: Arc::new(Mutex::new(IndexMap::new())),
            edges: Arc::new(Mutex::new(IndexMap::new())),
            options,
        }
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    pub(crate) fn flows(&self) -> MutexGuard<'_, FlowMap> {
        self.flows.lock().expect("store mutex poisoned")
    }

    pub(crate) fn edges(&self) -> MutexGuard<'_, EdgeMap> {
        self.edges.lock().expect("store mutex poisoned")
    }

    pub fn stats(&self) -> StoreStats {
        let (flows, oldest_flow, newest_flow) = {
            let flows = self.flows();
            (
                flows.len(),
                flows.values().map(|f| f.created_at).min(),
                flows.values().map(|f| f.created_at).max(),
            )
        };
        let dependency_edges = self.edges().len();

        StoreStats {
            flows,
            dependency_edges,
            oldest_flow,
            newest_flow,
        }
    }

    /// Wipes both maps.
    pub fn clear(&self) {
        self.flows().clear();
        self.edges().clear();
        tracing::info!("store cleared");
    }
}
