//! Reachability queries against the authoritative edge state
//!
//! The resolver keeps nothing between calls. Each query reads the edge
//! table once inside a single snapshot and walks a [`ChildrenMap`].

use super::graph::ChildrenMap;
use crate::error::Result;
use crate::storage::{EdgeFilter, Storage, Transaction};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Stateless hierarchy resolver
#[derive(Clone)]
pub struct HierarchyResolver {
    storage: Arc<dyn Storage>,
}

impl HierarchyResolver {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Load the full parent -> children map in one bulk read
    pub async fn load_adjacency(&self) -> Result<ChildrenMap> {
        let mut tx = self.storage.begin_read().await?;
        Self::load_adjacency_in(tx.as_mut()).await
    }

    /// Same as [`load_adjacency`](Self::load_adjacency) inside an open unit
    pub async fn load_adjacency_in(tx: &mut dyn Transaction) -> Result<ChildrenMap> {
        let edges = tx.fetch_edges(&EdgeFilter::All).await?;
        debug!("Loaded {} edges", edges.len());
        Ok(ChildrenMap::from_edges(edges))
    }

    /// Would adding `parent -> child` create a cycle?
    pub async fn detect_cycle(&self, parent: &str, child: &str) -> Result<bool> {
        if parent == child {
            return Ok(true);
        }
        let adjacency = self.load_adjacency().await?;
        Ok(adjacency.detect_cycle(parent, child))
    }

    /// Items reachable below `name`
    pub async fn descendants(&self, name: &str) -> Result<HashSet<String>> {
        let adjacency = self.load_adjacency().await?;
        let found = adjacency.descendants(name);
        debug!("'{}' has {} descendants", name, found.len());
        Ok(found)
    }
}
