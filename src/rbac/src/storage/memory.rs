//! In-memory record store
//!
//! A write transaction holds the write lock for its whole lifetime and works
//! on a private copy of the tables, swapped in on commit. Read transactions
//! share the read lock. Uniqueness and referential integrity are enforced the
//! way the relational schema enforces them.

use super::{AssignmentFilter, EdgeFilter, ItemFilter, Storage, Transaction};
use crate::error::{RbacError, Result};
use crate::types::{Assignment, Edge, Item, ItemKind, Rule};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Debug, Clone, Default)]
struct Tables {
    items: BTreeMap<String, Item>,
    rules: BTreeMap<String, Rule>,
    edges: BTreeSet<Edge>,
    assignments: BTreeSet<Assignment>,
}

impl Tables {
    fn kind_of(&self, name: &str) -> Option<ItemKind> {
        self.items.get(name).map(|item| item.kind)
    }

    fn item_matches(&self, filter: &ItemFilter, item: &Item) -> bool {
        if !filter.matches_item(item) {
            return false;
        }
        match &filter.assigned_to {
            Some(username) => self
                .assignments
                .contains(&Assignment::new(item.name.clone(), username.clone())),
            None => true,
        }
    }

    fn edge_matches(&self, filter: &EdgeFilter, edge: &Edge) -> bool {
        match filter {
            EdgeFilter::All => true,
            EdgeFilter::Parent(name) => &edge.parent == name,
            EdgeFilter::Child(name) => &edge.child == name,
            EdgeFilter::Pair { parent, child } => &edge.parent == parent && &edge.child == child,
            EdgeFilter::Touching(name) => &edge.parent == name || &edge.child == name,
            EdgeFilter::TouchingKind(kind) => {
                self.kind_of(&edge.parent) == Some(*kind) || self.kind_of(&edge.child) == Some(*kind)
            }
        }
    }

    fn assignment_matches(&self, filter: &AssignmentFilter, assignment: &Assignment) -> bool {
        match filter {
            AssignmentFilter::All => true,
            AssignmentFilter::User(username) => &assignment.username == username,
            AssignmentFilter::Item(name) => &assignment.item_name == name,
            AssignmentFilter::Pair { item, username } => {
                &assignment.item_name == item && &assignment.username == username
            }
            AssignmentFilter::ItemKind(kind) => self.kind_of(&assignment.item_name) == Some(*kind),
        }
    }

    fn check_rule_reference(&self, item: &Item) -> Result<()> {
        match &item.rule_name {
            Some(rule) if !self.rules.contains_key(rule) => Err(foreign_key("rbac_item.rule_name", rule)),
            _ => Ok(()),
        }
    }

    fn check_item_reference(&self, column: &str, name: &str) -> Result<()> {
        if self.items.contains_key(name) {
            Ok(())
        } else {
            Err(foreign_key(column, name))
        }
    }
}

fn foreign_key(column: &str, value: &str) -> RbacError {
    RbacError::Storage(format!(
        "foreign key violation: {} references missing '{}'",
        column, value
    ))
}

/// In-memory store shared behind an `Arc`
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let guard = self.tables.clone().write_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction {
            snapshot: Snapshot::Write { guard, work },
        }))
    }

    async fn begin_read(&self) -> Result<Box<dyn Transaction>> {
        let guard = self.tables.clone().read_owned().await;
        Ok(Box::new(MemoryTransaction {
            snapshot: Snapshot::Read(guard),
        }))
    }
}

enum Snapshot {
    Read(OwnedRwLockReadGuard<Tables>),
    Write {
        guard: OwnedRwLockWriteGuard<Tables>,
        work: Tables,
    },
}

struct MemoryTransaction {
    snapshot: Snapshot,
}

impl MemoryTransaction {
    fn tables(&self) -> &Tables {
        match &self.snapshot {
            Snapshot::Read(guard) => &**guard,
            Snapshot::Write { work, .. } => work,
        }
    }

    fn tables_mut(&mut self) -> Result<&mut Tables> {
        match &mut self.snapshot {
            Snapshot::Read(_) => Err(RbacError::Storage(
                "cannot write in a read-only transaction".to_string(),
            )),
            Snapshot::Write { work, .. } => Ok(work),
        }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn fetch_item(&mut self, name: &str) -> Result<Option<Item>> {
        Ok(self.tables().items.get(name).cloned())
    }

    async fn fetch_items(&mut self, filter: &ItemFilter) -> Result<Vec<Item>> {
        let tables = self.tables();
        Ok(tables
            .items
            .values()
            .filter(|item| tables.item_matches(filter, item))
            .cloned()
            .collect())
    }

    async fn insert_item(&mut self, item: &Item) -> Result<()> {
        let tables = self.tables_mut()?;
        if tables.items.contains_key(&item.name) {
            return Err(RbacError::DuplicateKey {
                entity: "Item",
                key: item.name.clone(),
            });
        }
        tables.check_rule_reference(item)?;
        tables.items.insert(item.name.clone(), item.clone());
        Ok(())
    }

    async fn update_item(&mut self, item: &Item) -> Result<u64> {
        let tables = self.tables_mut()?;
        tables.check_rule_reference(item)?;
        match tables.items.get_mut(&item.name) {
            Some(stored) => {
                *stored = item.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_items(&mut self, filter: &ItemFilter) -> Result<u64> {
        let tables = self.tables_mut()?;
        let doomed: BTreeSet<String> = tables
            .items
            .values()
            .filter(|item| tables.item_matches(filter, item))
            .map(|item| item.name.clone())
            .collect();

        // ON DELETE CASCADE
        tables
            .edges
            .retain(|edge| !doomed.contains(&edge.parent) && !doomed.contains(&edge.child));
        tables
            .assignments
            .retain(|assignment| !doomed.contains(&assignment.item_name));
        tables.items.retain(|name, _| !doomed.contains(name));

        Ok(doomed.len() as u64)
    }

    async fn set_rule_name(&mut self, from: &str, to: Option<&str>) -> Result<u64> {
        let tables = self.tables_mut()?;
        if let Some(to) = to {
            if !tables.rules.contains_key(to) {
                return Err(foreign_key("rbac_item.rule_name", to));
            }
        }

        let mut changed = 0;
        for item in tables.items.values_mut() {
            if item.rule_name.as_deref() == Some(from) {
                item.rule_name = to.map(str::to_string);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn fetch_rule(&mut self, name: &str) -> Result<Option<Rule>> {
        Ok(self.tables().rules.get(name).cloned())
    }

    async fn fetch_rules(&mut self) -> Result<Vec<Rule>> {
        Ok(self.tables().rules.values().cloned().collect())
    }

    async fn insert_rule(&mut self, rule: &Rule) -> Result<()> {
        let tables = self.tables_mut()?;
        if tables.rules.contains_key(&rule.name) {
            return Err(RbacError::DuplicateKey {
                entity: "Rule",
                key: rule.name.clone(),
            });
        }
        tables.rules.insert(rule.name.clone(), rule.clone());
        Ok(())
    }

    async fn update_rule(&mut self, rule: &Rule) -> Result<u64> {
        let tables = self.tables_mut()?;
        match tables.rules.get_mut(&rule.name) {
            Some(stored) => {
                *stored = rule.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_rule(&mut self, name: &str) -> Result<u64> {
        let tables = self.tables_mut()?;
        if tables.rules.remove(name).is_none() {
            return Ok(0);
        }
        // ON DELETE SET NULL
        for item in tables.items.values_mut() {
            if item.rule_name.as_deref() == Some(name) {
                item.rule_name = None;
            }
        }
        Ok(1)
    }

    async fn delete_all_rules(&mut self) -> Result<u64> {
        let tables = self.tables_mut()?;
        let removed = tables.rules.len() as u64;
        tables.rules.clear();
        for item in tables.items.values_mut() {
            item.rule_name = None;
        }
        Ok(removed)
    }

    async fn fetch_edges(&mut self, filter: &EdgeFilter) -> Result<Vec<Edge>> {
        let tables = self.tables();
        Ok(tables
            .edges
            .iter()
            .filter(|edge| tables.edge_matches(filter, edge))
            .cloned()
            .collect())
    }

    async fn insert_edge(&mut self, edge: &Edge) -> Result<()> {
        let tables = self.tables_mut()?;
        tables.check_item_reference("rbac_item_child.parent_name", &edge.parent)?;
        tables.check_item_reference("rbac_item_child.child_name", &edge.child)?;
        if !tables.edges.insert(edge.clone()) {
            return Err(RbacError::DuplicateKey {
                entity: "Edge",
                key: format!("{} -> {}", edge.parent, edge.child),
            });
        }
        Ok(())
    }

    async fn delete_edges(&mut self, filter: &EdgeFilter) -> Result<u64> {
        let tables = self.tables_mut()?;
        let doomed: Vec<Edge> = tables
            .edges
            .iter()
            .filter(|edge| tables.edge_matches(filter, edge))
            .cloned()
            .collect();
        for edge in &doomed {
            tables.edges.remove(edge);
        }
        Ok(doomed.len() as u64)
    }

    async fn rename_edge_endpoint(&mut self, from: &str, to: &str) -> Result<u64> {
        let tables = self.tables_mut()?;
        let touched: Vec<Edge> = tables
            .edges
            .iter()
            .filter(|edge| edge.parent == from || edge.child == from)
            .cloned()
            .collect();
        if touched.is_empty() {
            return Ok(0);
        }
        tables.check_item_reference("rbac_item_child", to)?;

        for edge in &touched {
            tables.edges.remove(edge);
            let rename = |name: &str| if name == from { to.to_string() } else { name.to_string() };
            tables.edges.insert(Edge::new(rename(&edge.parent), rename(&edge.child)));
        }
        Ok(touched.len() as u64)
    }

    async fn lock_edges(&mut self) -> Result<()> {
        // The write guard already excludes every other transaction.
        self.tables_mut().map(|_| ())
    }

    async fn fetch_assignments(&mut self, filter: &AssignmentFilter) -> Result<Vec<Assignment>> {
        let tables = self.tables();
        Ok(tables
            .assignments
            .iter()
            .filter(|assignment| tables.assignment_matches(filter, assignment))
            .cloned()
            .collect())
    }

    async fn insert_assignment(&mut self, assignment: &Assignment) -> Result<()> {
        let tables = self.tables_mut()?;
        tables.check_item_reference("rbac_assignment.item_name", &assignment.item_name)?;
        if !tables.assignments.insert(assignment.clone()) {
            return Err(RbacError::DuplicateKey {
                entity: "Assignment",
                key: format!("{} / {}", assignment.item_name, assignment.username),
            });
        }
        Ok(())
    }

    async fn delete_assignments(&mut self, filter: &AssignmentFilter) -> Result<u64> {
        let tables = self.tables_mut()?;
        let doomed: Vec<Assignment> = tables
            .assignments
            .iter()
            .filter(|assignment| tables.assignment_matches(filter, assignment))
            .cloned()
            .collect();
        for assignment in &doomed {
            tables.assignments.remove(assignment);
        }
        Ok(doomed.len() as u64)
    }

    async fn rename_assignment_item(&mut self, from: &str, to: &str) -> Result<u64> {
        let tables = self.tables_mut()?;
        let touched: Vec<Assignment> = tables
            .assignments
            .iter()
            .filter(|assignment| assignment.item_name == from)
            .cloned()
            .collect();
        if touched.is_empty() {
            return Ok(0);
        }
        tables.check_item_reference("rbac_assignment.item_name", to)?;

        for assignment in &touched {
            tables.assignments.remove(assignment);
            tables
                .assignments
                .insert(Assignment::new(to, assignment.username.clone()));
        }
        Ok(touched.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if let Snapshot::Write { mut guard, work } = self.snapshot {
            *guard = work;
        }
        Ok(())
    }
}
