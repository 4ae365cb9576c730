use std::time::Duration;

use chrono::{DateTime, Utc};
use meshflow_core::error::{MeshflowError, Result};

use crate::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pruned {
    pub flows: usize,
    pub edges: usize,
}

impl Store {
    pub fn run_retention(&self, ttl: Duration) -> Result<Pruned> {
        let pruned = self.prune_ttl(ttl)?;
        if pruned.flows > 0 || pruned.edges > 0 {
            tracing::debug!(
                flows = pruned.flows,
                edges = pruned.edges,
                "retention pruned store"
            );
        }
        Ok(pruned)
    }

    /// Drops flows created before `now - ttl` and edges not seen since then.
    /// A zero ttl keeps everything.
    pub fn prune_ttl(&self, ttl: Duration) -> Result<Pruned> {
        if ttl.is_zero() {
            return Ok(Pruned::default());
        }
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl)
                .map_err(|e| MeshflowError::Internal(format!("ttl conversion failed: {e}")))?;
        Ok(self.prune_before(cutoff))
    }

    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Pruned {
        let flows = {
            let mut flows = self.flows();
            let before = flows.len();
            flows.retain(|_, flow| flow.created_at >= cutoff);
            before - flows.len()
        };
        let edges = {
            let mut edges = self.edges();
            let before = edges.len();
            edges.retain(|_, edge| edge.last_seen >= cutoff);
            before - edges.len()
        };
        Pruned { flows, edges }
    }
}
