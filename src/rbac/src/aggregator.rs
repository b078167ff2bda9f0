//! Effective roles and permissions
//!
//! Every query runs inside one read-only unit so the assignments, edges and
//! items it combines come from the same snapshot.

use crate::error::{RbacError, Result};
use crate::hierarchy::HierarchyResolver;
use crate::storage::{AssignmentFilter, ItemFilter, Storage, Transaction};
use crate::types::{Item, ItemKind};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Items keyed by name
pub type ItemMap = BTreeMap<String, Item>;

#[derive(Clone)]
pub struct PermissionAggregator {
    storage: Arc<dyn Storage>,
    default_roles: Arc<[String]>,
}

impl PermissionAggregator {
    pub fn new(storage: Arc<dyn Storage>, default_roles: Vec<String>) -> Self {
        Self {
            storage,
            default_roles: default_roles.into(),
        }
    }

    pub fn default_roles(&self) -> &[String] {
        &self.default_roles
    }

    /// Roles assigned directly to `username`, plus the default roles
    pub async fn roles_for_user(&self, username: &str) -> Result<ItemMap> {
        let mut roles = ItemMap::new();
        if username.is_empty() && self.default_roles.is_empty() {
            return Ok(roles);
        }

        let mut tx = self.storage.begin_read().await?;
        if !username.is_empty() {
            let filter = ItemFilter::all().kind(ItemKind::Role).assigned_to(username);
            roles.extend(into_map(tx.fetch_items(&filter).await?));
        }

        let missing: Vec<&String> = self
            .default_roles
            .iter()
            .filter(|name| !roles.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            let stored = tx
                .fetch_items(
                    &ItemFilter::all()
                        .kind(ItemKind::Role)
                        .names(missing.iter().map(|s| s.as_str())),
                )
                .await?;
            roles.extend(into_map(stored));
        }

        for name in self.default_roles.iter() {
            roles
                .entry(name.clone())
                .or_insert_with(|| Item::role(name.clone()));
        }

        debug!("User '{}' holds {} roles", username, roles.len());
        Ok(roles)
    }

    /// Permissions assigned to `username` or reachable below anything assigned
    pub async fn permissions_for_user(&self, username: &str) -> Result<ItemMap> {
        if username.is_empty() {
            return Ok(ItemMap::new());
        }

        let mut tx = self.storage.begin_read().await?;
        let assigned: Vec<String> = tx
            .fetch_assignments(&AssignmentFilter::User(username.to_string()))
            .await?
            .into_iter()
            .map(|a| a.item_name)
            .collect();
        if assigned.is_empty() {
            return Ok(ItemMap::new());
        }

        let adjacency = HierarchyResolver::load_adjacency_in(tx.as_mut()).await?;
        let mut reachable = adjacency.descendants_of_all(assigned.iter().map(String::as_str));
        reachable.extend(assigned);

        let permissions = fetch_permissions(tx.as_mut(), reachable).await?;
        debug!("User '{}' holds {} permissions", username, permissions.len());
        Ok(permissions)
    }

    /// Permissions reachable below `name`
    pub async fn permissions_under_role(&self, name: &str) -> Result<ItemMap> {
        let mut tx = self.storage.begin_read().await?;
        if tx.fetch_item(name).await?.is_none() {
            return Err(RbacError::item_not_found(name));
        }

        let adjacency = HierarchyResolver::load_adjacency_in(tx.as_mut()).await?;
        fetch_permissions(tx.as_mut(), adjacency.descendants(name)).await
    }

    /// The role `name` itself plus every role below it
    pub async fn roles_under_role(&self, name: &str) -> Result<ItemMap> {
        let mut tx = self.storage.begin_read().await?;
        let role = match tx.fetch_item(name).await? {
            Some(item) if item.is_role() => item,
            _ => {
                return Err(RbacError::NotFound {
                    entity: "Role",
                    name: name.to_string(),
                })
            }
        };

        let adjacency = HierarchyResolver::load_adjacency_in(tx.as_mut()).await?;
        let below = adjacency.descendants(name);

        let mut roles = if below.is_empty() {
            ItemMap::new()
        } else {
            let filter = ItemFilter::all().kind(ItemKind::Role).names(below);
            into_map(tx.fetch_items(&filter).await?)
        };
        roles.insert(role.name.clone(), role);
        Ok(roles)
    }

    /// Users holding `item_name` by direct assignment, sorted
    pub async fn usernames_for_item(&self, item_name: &str) -> Result<Vec<String>> {
        if item_name.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.storage.begin_read().await?;
        let mut usernames: Vec<String> = tx
            .fetch_assignments(&AssignmentFilter::Item(item_name.to_string()))
            .await?
            .into_iter()
            .map(|a| a.username)
            .collect();
        usernames.sort();
        usernames.dedup();
        Ok(usernames)
    }
}

async fn fetch_permissions(tx: &mut dyn Transaction, names: HashSet<String>) -> Result<ItemMap> {
    if names.is_empty() {
        return Ok(ItemMap::new());
    }
    let filter = ItemFilter::all().kind(ItemKind::Permission).names(names);
    Ok(into_map(tx.fetch_items(&filter).await?))
}

fn into_map(items: Vec<Item>) -> ItemMap {
    items.into_iter().map(|item| (item.name.clone(), item)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::types::{Assignment, Edge};
    use async_trait::async_trait;

    /// Fails every unit so a test can prove no lookup happened
    struct UnreachableStorage;

    #[async_trait]
    impl Storage for UnreachableStorage {
        async fn begin(&self) -> Result<Box<dyn Transaction>> {
            Err(RbacError::Storage("storage must not be touched".to_string()))
        }

        async fn begin_read(&self) -> Result<Box<dyn Transaction>> {
            Err(RbacError::Storage("storage must not be touched".to_string()))
        }
    }

    /// reader -> readPost, author -> reader, author -> createPost
    async fn blog_storage() -> Arc<InMemoryStorage> {
        let storage = Arc::new(InMemoryStorage::new());
        let mut tx = storage.begin().await.unwrap();
        for item in [
            Item::role("reader"),
            Item::role("author"),
            Item::permission("readPost"),
            Item::permission("createPost"),
        ] {
            tx.insert_item(&item).await.unwrap();
        }
        for edge in [
            Edge::new("reader", "readPost"),
            Edge::new("author", "reader"),
            Edge::new("author", "createPost"),
        ] {
            tx.insert_edge(&edge).await.unwrap();
        }
        for assignment in [Assignment::new("reader", "alice"), Assignment::new("author", "bob")] {
            tx.insert_assignment(&assignment).await.unwrap();
        }
        tx.commit().await.unwrap();
        storage
    }

    fn keys(map: &ItemMap) -> Vec<&str> {
        map.keys().map(String::as_str).collect()
    }

    #[tokio::test]
    async fn test_empty_username_skips_storage() {
        let aggregator = PermissionAggregator::new(Arc::new(UnreachableStorage), vec![]);
        assert!(aggregator.permissions_for_user("").await.unwrap().is_empty());
        assert!(aggregator.usernames_for_item("").await.unwrap().is_empty());
        assert!(aggregator.roles_for_user("").await.unwrap().is_empty());

        // Non-empty input does reach storage.
        assert!(aggregator.permissions_for_user("alice").await.is_err());
    }

    #[tokio::test]
    async fn test_permissions_for_user() {
        let aggregator = PermissionAggregator::new(blog_storage().await, vec![]);

        let alice = aggregator.permissions_for_user("alice").await.unwrap();
        assert_eq!(keys(&alice), vec!["readPost"]);

        let bob = aggregator.permissions_for_user("bob").await.unwrap();
        assert_eq!(keys(&bob), vec!["createPost", "readPost"]);

        assert!(aggregator.permissions_for_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_direct_permission_assignment() {
        let storage = blog_storage().await;
        let mut tx = storage.begin().await.unwrap();
        tx.insert_assignment(&Assignment::new("createPost", "carol"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let aggregator = PermissionAggregator::new(storage, vec![]);
        let carol = aggregator.permissions_for_user("carol").await.unwrap();
        assert_eq!(keys(&carol), vec!["createPost"]);
    }

    #[tokio::test]
    async fn test_roles_for_user_merges_defaults() {
        let aggregator =
            PermissionAggregator::new(blog_storage().await, vec!["guest".to_string(), "reader".to_string()]);

        let bob = aggregator.roles_for_user("bob").await.unwrap();
        assert_eq!(keys(&bob), vec!["author", "guest", "reader"]);
        assert_eq!(bob["guest"], Item::role("guest"));

        let nobody = aggregator.roles_for_user("nobody").await.unwrap();
        assert_eq!(keys(&nobody), vec!["guest", "reader"]);
    }

    #[tokio::test]
    async fn test_anonymous_roles_use_stored_defaults() {
        let storage = blog_storage().await;
        let mut tx = storage.begin().await.unwrap();
        tx.update_item(&Item::role("reader").with_description("Can read posts"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let aggregator =
            PermissionAggregator::new(storage, vec!["guest".to_string(), "reader".to_string()]);
        let anonymous = aggregator.roles_for_user("").await.unwrap();
        assert_eq!(keys(&anonymous), vec!["guest", "reader"]);
        assert_eq!(anonymous["reader"].description.as_deref(), Some("Can read posts"));
        assert_eq!(anonymous["guest"], Item::role("guest"));

        // Same records as for a named user without assignments.
        assert_eq!(anonymous, aggregator.roles_for_user("nobody").await.unwrap());
    }

    #[tokio::test]
    async fn test_roles_for_user_excludes_inherited() {
        let aggregator = PermissionAggregator::new(blog_storage().await, vec![]);
        let bob = aggregator.roles_for_user("bob").await.unwrap();
        assert_eq!(keys(&bob), vec!["author"]);
    }

    #[tokio::test]
    async fn test_under_role_views() {
        let aggregator = PermissionAggregator::new(blog_storage().await, vec![]);

        let permissions = aggregator.permissions_under_role("author").await.unwrap();
        assert_eq!(keys(&permissions), vec!["createPost", "readPost"]);

        let roles = aggregator.roles_under_role("author").await.unwrap();
        assert_eq!(keys(&roles), vec!["author", "reader"]);
        let roles = aggregator.roles_under_role("reader").await.unwrap();
        assert_eq!(keys(&roles), vec!["reader"]);

        assert!(aggregator.roles_under_role("readPost").await.unwrap_err().is_not_found());
        assert!(aggregator.permissions_under_role("ghost").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_usernames_for_item_is_direct_only() {
        let aggregator = PermissionAggregator::new(blog_storage().await, vec![]);
        assert_eq!(aggregator.usernames_for_item("reader").await.unwrap(), vec!["alice"]);
        assert_eq!(aggregator.usernames_for_item("author").await.unwrap(), vec!["bob"]);
        assert!(aggregator.usernames_for_item("ghost").await.unwrap().is_empty());
    }
}
