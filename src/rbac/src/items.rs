//! Item and rule records
//!
//! Renames and removals are a single atomic unit each: the referencing
//! edges, assignments and rule links move (or go) together with the row.

use crate::error::{EdgeViolation, RbacError, Result};
use crate::signal::ChangeSignal;
use crate::storage::{AssignmentFilter, EdgeFilter, ItemFilter, Storage, Transaction};
use crate::types::{Item, ItemKind, Rule};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// What an item removal took with it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReport {
    pub items: u64,
    pub edges: u64,
    pub assignments: u64,
}

/// CRUD over items and rules
#[derive(Clone)]
pub struct ItemStore {
    storage: Arc<dyn Storage>,
    changes: ChangeSignal,
}

impl ItemStore {
    pub fn new(storage: Arc<dyn Storage>, changes: ChangeSignal) -> Self {
        Self { storage, changes }
    }

    /// Add a new item
    ///
    /// # Errors
    ///
    /// - `DuplicateKey` if any item already has the name
    /// - `NotFound` if `rule_name` names a missing rule
    pub async fn create(&self, item: Item) -> Result<()> {
        let mut tx = self.storage.begin().await?;

        if tx.fetch_item(&item.name).await?.is_some() {
            return Err(RbacError::DuplicateKey {
                entity: "Item",
                key: item.name,
            });
        }
        ensure_rule(tx.as_mut(), item.rule_name.as_deref()).await?;

        tx.insert_item(&item).await?;
        self.changes.commit(tx).await?;

        info!("Created {} '{}'", item.kind, item.name);
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Item> {
        let mut tx = self.storage.begin_read().await?;
        tx.fetch_item(name)
            .await?
            .ok_or_else(|| RbacError::item_not_found(name))
    }

    /// All items of one kind
    pub async fn list(&self, kind: ItemKind) -> Result<Vec<Item>> {
        let mut tx = self.storage.begin_read().await?;
        tx.fetch_items(&ItemFilter::all().kind(kind)).await
    }

    /// Direct children of an item
    pub async fn children(&self, name: &str) -> Result<Vec<Item>> {
        let mut tx = self.storage.begin_read().await?;
        if tx.fetch_item(name).await?.is_none() {
            return Err(RbacError::item_not_found(name));
        }

        let edges = tx.fetch_edges(&EdgeFilter::Parent(name.to_string())).await?;
        if edges.is_empty() {
            return Ok(Vec::new());
        }
        tx.fetch_items(&ItemFilter::all().names(edges.into_iter().map(|e| e.child)))
            .await
    }

    /// Update the item called `old_name`, renaming it when `item.name` differs
    ///
    /// A rename moves every edge and assignment from the old name to the new
    /// one in the same unit.
    pub async fn update(&self, old_name: &str, item: Item) -> Result<()> {
        let mut tx = self.storage.begin().await?;

        let current = tx
            .fetch_item(old_name)
            .await?
            .ok_or_else(|| RbacError::item_not_found(old_name))?;
        ensure_rule(tx.as_mut(), item.rule_name.as_deref()).await?;
        if current.kind != item.kind || item.name != old_name {
            // Edge checks and renames must not interleave with add_edge.
            tx.lock_edges().await?;
        }
        if current.kind != item.kind {
            check_kind_change(tx.as_mut(), old_name, &item).await?;
        }

        if item.name == old_name {
            tx.update_item(&item).await?;
            self.changes.commit(tx).await?;
            info!("Updated {} '{}'", item.kind, item.name);
            return Ok(());
        }

        if tx.fetch_item(&item.name).await?.is_some() {
            return Err(RbacError::DuplicateKey {
                entity: "Item",
                key: item.name,
            });
        }

        tx.insert_item(&item).await?;
        let edges = tx.rename_edge_endpoint(old_name, &item.name).await?;
        let assignments = tx.rename_assignment_item(old_name, &item.name).await?;
        tx.delete_items(&ItemFilter::all().names([old_name])).await?;
        self.changes.commit(tx).await?;

        info!(
            "Renamed {} '{}' to '{}' ({} edges, {} assignments moved)",
            item.kind, old_name, item.name, edges, assignments
        );
        Ok(())
    }

    /// Remove an item with its edges and assignments
    pub async fn remove(&self, name: &str) -> Result<RemovalReport> {
        let mut tx = self.storage.begin().await?;
        if tx.fetch_item(name).await?.is_none() {
            return Err(RbacError::item_not_found(name));
        }

        let report = RemovalReport {
            edges: tx.delete_edges(&EdgeFilter::Touching(name.to_string())).await?,
            assignments: tx
                .delete_assignments(&AssignmentFilter::Item(name.to_string()))
                .await?,
            items: tx.delete_items(&ItemFilter::all().names([name])).await?,
        };
        self.changes.commit(tx).await?;

        info!(
            "Removed item '{}' ({} edges, {} assignments)",
            name, report.edges, report.assignments
        );
        Ok(report)
    }

    /// Remove every role or every permission
    pub async fn remove_all_of_kind(&self, kind: ItemKind) -> Result<RemovalReport> {
        let mut tx = self.storage.begin().await?;
        let report = RemovalReport {
            edges: tx.delete_edges(&EdgeFilter::TouchingKind(kind)).await?,
            assignments: tx.delete_assignments(&AssignmentFilter::ItemKind(kind)).await?,
            items: tx.delete_items(&ItemFilter::all().kind(kind)).await?,
        };
        if report.items == 0 {
            return Ok(report);
        }
        self.changes.commit(tx).await?;

        info!("Removed all {} items ({})", kind, report.items);
        Ok(report)
    }

    /// Clear assignments, edges, items and rules
    ///
    /// Returns `false` when there was nothing to remove.
    pub async fn remove_all(&self) -> Result<bool> {
        let mut tx = self.storage.begin().await?;
        let removed = tx.delete_assignments(&AssignmentFilter::All).await?
            + tx.delete_edges(&EdgeFilter::All).await?
            + tx.delete_items(&ItemFilter::all()).await?
            + tx.delete_all_rules().await?;
        if removed == 0 {
            return Ok(false);
        }
        self.changes.commit(tx).await?;

        info!("Removed all hierarchy data");
        Ok(true)
    }

    pub async fn create_rule(&self, rule: Rule) -> Result<()> {
        let mut tx = self.storage.begin().await?;
        if tx.fetch_rule(&rule.name).await?.is_some() {
            return Err(RbacError::DuplicateKey {
                entity: "Rule",
                key: rule.name,
            });
        }

        tx.insert_rule(&rule).await?;
        self.changes.commit(tx).await?;

        info!("Created rule '{}' ({})", rule.name, rule.type_name);
        Ok(())
    }

    pub async fn get_rule(&self, name: &str) -> Result<Rule> {
        let mut tx = self.storage.begin_read().await?;
        tx.fetch_rule(name)
            .await?
            .ok_or_else(|| RbacError::rule_not_found(name))
    }

    pub async fn list_rules(&self) -> Result<Vec<Rule>> {
        let mut tx = self.storage.begin_read().await?;
        tx.fetch_rules().await
    }

    /// Update the rule called `old_name`; a rename repoints guarded items
    pub async fn update_rule(&self, old_name: &str, rule: Rule) -> Result<()> {
        let mut tx = self.storage.begin().await?;
        if tx.fetch_rule(old_name).await?.is_none() {
            return Err(RbacError::rule_not_found(old_name));
        }

        if rule.name == old_name {
            tx.update_rule(&rule).await?;
            self.changes.commit(tx).await?;
            info!("Updated rule '{}'", rule.name);
            return Ok(());
        }

        if tx.fetch_rule(&rule.name).await?.is_some() {
            return Err(RbacError::DuplicateKey {
                entity: "Rule",
                key: rule.name,
            });
        }

        tx.insert_rule(&rule).await?;
        let moved = tx.set_rule_name(old_name, Some(&rule.name)).await?;
        tx.delete_rule(old_name).await?;
        self.changes.commit(tx).await?;

        info!(
            "Renamed rule '{}' to '{}' ({} items repointed)",
            old_name, rule.name, moved
        );
        Ok(())
    }

    /// Remove a rule; items it guarded revert to "always grants"
    ///
    /// Returns the number of detached items.
    pub async fn remove_rule(&self, name: &str) -> Result<u64> {
        let mut tx = self.storage.begin().await?;
        if tx.fetch_rule(name).await?.is_none() {
            return Err(RbacError::rule_not_found(name));
        }

        let detached = tx.set_rule_name(name, None).await?;
        tx.delete_rule(name).await?;
        self.changes.commit(tx).await?;

        info!("Removed rule '{}' ({} items detached)", name, detached);
        Ok(detached)
    }

    pub async fn remove_all_rules(&self) -> Result<u64> {
        let mut tx = self.storage.begin().await?;
        for rule in tx.fetch_rules().await? {
            tx.set_rule_name(&rule.name, None).await?;
        }
        let removed = tx.delete_all_rules().await?;
        if removed == 0 {
            return Ok(0);
        }
        self.changes.commit(tx).await?;

        info!("Removed all rules ({})", removed);
        Ok(removed)
    }
}

async fn ensure_rule(tx: &mut dyn Transaction, rule_name: Option<&str>) -> Result<()> {
    match rule_name {
        Some(rule) if tx.fetch_rule(rule).await?.is_none() => Err(RbacError::rule_not_found(rule)),
        _ => Ok(()),
    }
}

/// A kind change must not leave a permission above a role
async fn check_kind_change(tx: &mut dyn Transaction, old_name: &str, item: &Item) -> Result<()> {
    let edges = tx.fetch_edges(&EdgeFilter::Touching(old_name.to_string())).await?;
    debug!("Checking {} edges for kind change of '{}'", edges.len(), old_name);

    for edge in edges {
        let (other, item_is_parent) = if edge.parent == old_name {
            (&edge.child, true)
        } else {
            (&edge.parent, false)
        };
        let other_kind = match tx.fetch_item(other).await? {
            Some(other) => other.kind,
            None => continue,
        };

        let violates = match (item_is_parent, item.kind) {
            (true, ItemKind::Permission) => other_kind == ItemKind::Role,
            (false, ItemKind::Role) => other_kind == ItemKind::Permission,
            _ => false,
        };
        if violates {
            return Err(RbacError::InvalidEdge {
                parent: if item_is_parent { item.name.clone() } else { edge.parent.clone() },
                child: if item_is_parent { edge.child.clone() } else { item.name.clone() },
                violation: EdgeViolation::PermissionAboveRole,
            });
        }
    }
    Ok(())
}
