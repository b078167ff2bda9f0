//! Parent -> child edges
//!
//! `add_edge` validates and inserts in one unit. The edge table is locked
//! before the adjacency is read, so two concurrent inserts cannot each pass
//! the cycle check and together close a loop.

use crate::error::{EdgeViolation, RbacError, Result};
use crate::hierarchy::HierarchyResolver;
use crate::signal::ChangeSignal;
use crate::storage::{EdgeFilter, Storage, Transaction};
use crate::types::{Edge, Item, ItemKind};
use std::sync::Arc;
use tracing::{debug, info};

/// Hierarchy edge store
#[derive(Clone)]
pub struct EdgeStore {
    storage: Arc<dyn Storage>,
    changes: ChangeSignal,
}

impl EdgeStore {
    pub fn new(storage: Arc<dyn Storage>, changes: ChangeSignal) -> Self {
        Self { storage, changes }
    }

    /// Make `child` a direct child of `parent`
    ///
    /// Checks run in this order: both items exist, no self reference, no
    /// role under a permission, no cycle, no duplicate.
    ///
    /// # Errors
    ///
    /// - `NotFound` if either item is missing
    /// - `InvalidEdge` for a self reference or a permission parent of a role
    /// - `CycleDetected` if `parent` is already reachable from `child`
    /// - `DuplicateKey` if the edge exists
    pub async fn add_edge(&self, parent: &str, child: &str) -> Result<()> {
        let mut tx = self.storage.begin().await?;
        tx.lock_edges().await?;
        validate_edge(tx.as_mut(), parent, child).await?;

        if tx
            .fetch_edges(&EdgeFilter::pair(parent, child))
            .await?
            .is_empty()
        {
            tx.insert_edge(&Edge::new(parent, child)).await?;
        } else {
            return Err(RbacError::DuplicateKey {
                entity: "Edge",
                key: format!("{} -> {}", parent, child),
            });
        }
        self.changes.commit(tx).await?;

        info!("Added '{}' as a child of '{}'", child, parent);
        Ok(())
    }

    /// Would [`add_edge`](Self::add_edge) accept this pair right now?
    ///
    /// An edge that already exists counts as addable.
    pub async fn can_add_edge(&self, parent: &str, child: &str) -> Result<bool> {
        let mut tx = self.storage.begin_read().await?;
        match validate_edge(tx.as_mut(), parent, child).await {
            Ok(()) => Ok(true),
            Err(err @ RbacError::Storage(_)) => Err(err),
            Err(err) => {
                debug!("'{}' -> '{}' rejected: {}", parent, child, err);
                Ok(false)
            }
        }
    }

    /// Remove one edge; `false` if it did not exist
    pub async fn remove_edge(&self, parent: &str, child: &str) -> Result<bool> {
        let mut tx = self.storage.begin().await?;
        let removed = tx.delete_edges(&EdgeFilter::pair(parent, child)).await?;
        if removed == 0 {
            return Ok(false);
        }
        self.changes.commit(tx).await?;

        info!("Removed '{}' from the children of '{}'", child, parent);
        Ok(true)
    }

    /// Remove every edge out of `parent`; `false` if there were none
    pub async fn remove_all_edges_from(&self, parent: &str) -> Result<bool> {
        let mut tx = self.storage.begin().await?;
        let removed = tx.delete_edges(&EdgeFilter::Parent(parent.to_string())).await?;
        if removed == 0 {
            return Ok(false);
        }
        self.changes.commit(tx).await?;

        info!("Removed {} children of '{}'", removed, parent);
        Ok(true)
    }

    pub async fn has_edge(&self, parent: &str, child: &str) -> Result<bool> {
        let mut tx = self.storage.begin_read().await?;
        Ok(!tx.fetch_edges(&EdgeFilter::pair(parent, child)).await?.is_empty())
    }
}

/// Every check `add_edge` applies before the duplicate test
async fn validate_edge(tx: &mut dyn Transaction, parent: &str, child: &str) -> Result<()> {
    let parent_item = fetch_existing(tx, parent).await?;
    let child_item = fetch_existing(tx, child).await?;

    if parent == child {
        return Err(invalid(parent, child, EdgeViolation::SelfReference));
    }
    if parent_item.kind == ItemKind::Permission && child_item.kind == ItemKind::Role {
        return Err(invalid(parent, child, EdgeViolation::PermissionAboveRole));
    }

    let adjacency = HierarchyResolver::load_adjacency_in(tx).await?;
    if adjacency.detect_cycle(parent, child) {
        return Err(RbacError::CycleDetected {
            parent: parent.to_string(),
            child: child.to_string(),
        });
    }
    Ok(())
}

async fn fetch_existing(tx: &mut dyn Transaction, name: &str) -> Result<Item> {
    tx.fetch_item(name)
        .await?
        .ok_or_else(|| RbacError::item_not_found(name))
}

fn invalid(parent: &str, child: &str, violation: EdgeViolation) -> RbacError {
    RbacError::InvalidEdge {
        parent: parent.to_string(),
        child: child.to_string(),
        violation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    async fn edge_store(items: Vec<Item>) -> EdgeStore {
        let storage = Arc::new(InMemoryStorage::new());
        let mut tx = storage.begin().await.unwrap();
        for item in &items {
            tx.insert_item(item).await.unwrap();
        }
        tx.commit().await.unwrap();
        EdgeStore::new(storage, ChangeSignal::new())
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let store = edge_store(vec![Item::role("author"), Item::permission("createPost")]).await;

        store.add_edge("author", "createPost").await.unwrap();
        assert!(store.has_edge("author", "createPost").await.unwrap());

        assert!(store.remove_edge("author", "createPost").await.unwrap());
        assert!(!store.remove_edge("author", "createPost").await.unwrap());
        assert!(!store.has_edge("author", "createPost").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let store = edge_store(vec![Item::role("author")]).await;
        let err = store.add_edge("author", "ghost").await.unwrap_err();
        assert!(err.is_not_found());
        let err = store.add_edge("ghost", "author").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_self_reference() {
        let store = edge_store(vec![Item::role("admin")]).await;
        let err = store.add_edge("admin", "admin").await.unwrap_err();
        assert!(err.is_self_reference());
        assert!(!store.can_add_edge("admin", "admin").await.unwrap());
    }

    #[tokio::test]
    async fn test_role_under_permission() {
        let store = edge_store(vec![Item::role("author"), Item::permission("createPost")]).await;
        let err = store.add_edge("createPost", "author").await.unwrap_err();
        assert!(matches!(
            err,
            RbacError::InvalidEdge {
                violation: EdgeViolation::PermissionAboveRole,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_permission_under_permission_allowed() {
        let store = edge_store(vec![
            Item::permission("updatePost"),
            Item::permission("updateOwnPost"),
        ])
        .await;
        store.add_edge("updateOwnPost", "updatePost").await.unwrap();
    }

    #[tokio::test]
    async fn test_cycle_rejected() {
        let store = edge_store(vec![Item::role("a"), Item::role("b"), Item::role("c")]).await;
        store.add_edge("a", "b").await.unwrap();
        store.add_edge("b", "c").await.unwrap();

        let err = store.add_edge("c", "a").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot add 'a' as a child of 'c'. A loop has been detected."
        );
        assert!(!store.can_add_edge("c", "a").await.unwrap());
        assert!(!store.has_edge("c", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_edge() {
        let store = edge_store(vec![Item::role("a"), Item::role("b")]).await;
        store.add_edge("a", "b").await.unwrap();

        let err = store.add_edge("a", "b").await.unwrap_err();
        assert!(matches!(err, RbacError::DuplicateKey { entity: "Edge", .. }));
        assert!(store.can_add_edge("a", "b").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_all_edges_from() {
        let store = edge_store(vec![
            Item::role("author"),
            Item::permission("createPost"),
            Item::permission("updatePost"),
        ])
        .await;
        assert!(!store.remove_all_edges_from("author").await.unwrap());

        store.add_edge("author", "createPost").await.unwrap();
        store.add_edge("author", "updatePost").await.unwrap();
        assert!(store.remove_all_edges_from("author").await.unwrap());
        assert!(!store.has_edge("author", "updatePost").await.unwrap());
    }

    #[tokio::test]
    async fn test_idempotent_remove_does_not_signal() {
        let store = edge_store(vec![Item::role("a"), Item::role("b")]).await;
        store.add_edge("a", "b").await.unwrap();
        let generation = store.changes.generation();

        store.remove_edge("b", "a").await.unwrap();
        assert_eq!(store.changes.generation(), generation);
    }
}
