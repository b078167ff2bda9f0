//! Manager façade
//!
//! Owns the storage handle, the default-role set and the change signal, and
//! hands out the stores and query components built on them.

use crate::aggregator::PermissionAggregator;
use crate::assignments::AssignmentStore;
use crate::config::RbacConfig;
use crate::edges::EdgeStore;
use crate::error::Result;
use crate::hierarchy::{ChildrenMap, HierarchyResolver};
use crate::items::ItemStore;
use crate::signal::ChangeSignal;
use crate::storage::{EdgeFilter, InMemoryStorage, ItemFilter, Storage};
use crate::types::{HierarchySnapshot, ItemRecord};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Clone)]
pub struct RbacManager {
    storage: Arc<dyn Storage>,
    changes: ChangeSignal,
    items: ItemStore,
    edges: EdgeStore,
    assignments: AssignmentStore,
    hierarchy: HierarchyResolver,
    aggregator: PermissionAggregator,
}

impl RbacManager {
    pub fn new(storage: Arc<dyn Storage>, config: &RbacConfig) -> Self {
        let changes = ChangeSignal::new();
        Self {
            items: ItemStore::new(storage.clone(), changes.clone()),
            edges: EdgeStore::new(storage.clone(), changes.clone()),
            assignments: AssignmentStore::new(storage.clone(), changes.clone()),
            hierarchy: HierarchyResolver::new(storage.clone()),
            aggregator: PermissionAggregator::new(storage.clone(), config.default_roles.clone()),
            storage,
            changes,
        }
    }

    /// Manager over a fresh in-memory store
    pub fn in_memory(config: &RbacConfig) -> Self {
        Self::new(Arc::new(InMemoryStorage::new()), config)
    }

    /// Open the store named by `config`
    ///
    /// With a database section this connects to PostgreSQL and applies
    /// pending migrations; without one it falls back to memory.
    pub async fn connect(config: &RbacConfig) -> Result<Self> {
        config.validate()?;

        match &config.database {
            #[cfg(feature = "postgres")]
            Some(database) => {
                let storage = crate::storage::PostgresStorage::new(database).await?;
                storage.run_migrations().await?;
                Ok(Self::new(Arc::new(storage), config))
            }
            #[cfg(not(feature = "postgres"))]
            Some(_) => Err(crate::error::RbacError::Storage(
                "PostgreSQL support is not compiled in".to_string(),
            )),
            None => {
                info!("No database configured, using in-memory storage");
                Ok(Self::in_memory(config))
            }
        }
    }

    pub fn items(&self) -> &ItemStore {
        &self.items
    }

    pub fn edges(&self) -> &EdgeStore {
        &self.edges
    }

    pub fn assignments(&self) -> &AssignmentStore {
        &self.assignments
    }

    pub fn hierarchy(&self) -> &HierarchyResolver {
        &self.hierarchy
    }

    pub fn aggregator(&self) -> &PermissionAggregator {
        &self.aggregator
    }

    /// Every item with its direct parents, plus every rule
    ///
    /// Read in one snapshot. A cycle in the stored edges is logged, not
    /// rejected: the data is returned as it is.
    pub async fn load(&self) -> Result<HierarchySnapshot> {
        let mut tx = self.storage.begin_read().await?;
        let items = tx.fetch_items(&ItemFilter::all()).await?;
        let edges = tx.fetch_edges(&EdgeFilter::All).await?;
        let rules = tx.fetch_rules().await?;

        let mut snapshot = HierarchySnapshot {
            items: items
                .into_iter()
                .map(|item| {
                    let name = item.name.clone();
                    (name, ItemRecord { item, parents: Vec::new() })
                })
                .collect(),
            rules: rules.into_iter().map(|rule| (rule.name.clone(), rule)).collect(),
        };

        let adjacency = ChildrenMap::from_edges(edges.iter().cloned());
        if let Some(cycle) = adjacency.find_cycle() {
            warn!("Stored hierarchy contains a cycle: {}", cycle.join(" -> "));
        }

        for edge in edges {
            if let Some(record) = snapshot.items.get_mut(&edge.child) {
                record.parents.push(edge.parent);
            }
        }
        for record in snapshot.items.values_mut() {
            record.parents.sort();
        }

        info!(
            "Loaded {} items, {} edges, {} rules",
            snapshot.items.len(),
            adjacency.edge_count(),
            snapshot.rules.len()
        );
        Ok(snapshot)
    }

    /// Receiver whose value is bumped after every committed mutation
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.changes.generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Edge, Item, Rule};

    #[tokio::test]
    async fn test_load_snapshot() {
        let manager = RbacManager::in_memory(&RbacConfig::default());
        let items = manager.items();
        items
            .create_rule(Rule::new("isAuthor", "AuthorRule", serde_json::json!({})))
            .await
            .unwrap();
        items.create(Item::role("admin")).await.unwrap();
        items.create(Item::role("author")).await.unwrap();
        items
            .create(Item::permission("updateOwnPost").with_rule("isAuthor"))
            .await
            .unwrap();
        manager.edges().add_edge("admin", "updateOwnPost").await.unwrap();
        manager.edges().add_edge("author", "updateOwnPost").await.unwrap();

        let snapshot = manager.load().await.unwrap();
        assert_eq!(snapshot.items.len(), 3);
        assert_eq!(snapshot.parents_of("updateOwnPost"), ["admin", "author"]);
        assert!(snapshot.parents_of("admin").is_empty());
        assert!(snapshot.rules.contains_key("isAuthor"));
    }

    #[tokio::test]
    async fn test_load_tolerates_stored_cycle() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut tx = storage.begin().await.unwrap();
        for name in ["a", "b"] {
            tx.insert_item(&Item::role(name)).await.unwrap();
        }
        tx.insert_edge(&Edge::new("a", "b")).await.unwrap();
        tx.insert_edge(&Edge::new("b", "a")).await.unwrap();
        tx.commit().await.unwrap();

        let manager = RbacManager::new(storage, &RbacConfig::default());
        let snapshot = manager.load().await.unwrap();
        assert_eq!(snapshot.parents_of("a"), ["b"]);
    }

    #[tokio::test]
    async fn test_subscribe_sees_mutations() {
        let manager = RbacManager::in_memory(&RbacConfig::default());
        let mut rx = manager.subscribe();

        manager.items().create(Item::role("admin")).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);

        manager.assignments().assign("admin", "alice").await.unwrap();
        assert_eq!(manager.generation(), 2);
    }

    #[tokio::test]
    async fn test_connect_without_database() {
        let config = RbacConfig::default().with_default_roles(["guest"]);
        let manager = RbacManager::connect(&config).await.unwrap();

        let roles = manager.aggregator().roles_for_user("alice").await.unwrap();
        assert!(roles.contains_key("guest"));
    }
}
