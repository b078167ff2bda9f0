//! Record store contract
//!
//! The hierarchy components never talk to a database directly. They open an
//! atomic unit with [`Storage::begin`] (read-write) or
//! [`Storage::begin_read`] (consistent read-only snapshot), issue record-level
//! operations on the returned [`Transaction`], and commit. Dropping a
//! transaction without committing rolls it back.

use crate::error::Result;
use crate::types::{Assignment, Edge, Item, ItemKind, Rule};
use async_trait::async_trait;

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;

/// Item selection; every populated predicate must hold
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    /// Kind equality
    pub kind: Option<ItemKind>,

    /// Name is one of the set (an empty set selects nothing)
    pub names: Option<Vec<String>>,

    /// An assignment row exists for this username
    pub assigned_to: Option<String>,
}

impl ItemFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: ItemKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn assigned_to(mut self, username: impl Into<String>) -> Self {
        self.assigned_to = Some(username.into());
        self
    }

    /// Evaluate the predicates that do not need a join
    pub(crate) fn matches_item(&self, item: &Item) -> bool {
        if let Some(kind) = self.kind {
            if item.kind != kind {
                return false;
            }
        }
        if let Some(names) = &self.names {
            if !names.iter().any(|n| n == &item.name) {
                return false;
            }
        }
        true
    }
}

/// Edge selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeFilter {
    All,
    Parent(String),
    Child(String),
    Pair { parent: String, child: String },
    /// Either endpoint equals the name
    Touching(String),
    /// Either endpoint is an item of the kind
    TouchingKind(ItemKind),
}

impl EdgeFilter {
    pub fn pair(parent: impl Into<String>, child: impl Into<String>) -> Self {
        EdgeFilter::Pair {
            parent: parent.into(),
            child: child.into(),
        }
    }
}

/// Assignment selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentFilter {
    All,
    User(String),
    Item(String),
    Pair { item: String, username: String },
    /// The assigned item is of the kind
    ItemKind(ItemKind),
}

impl AssignmentFilter {
    pub fn pair(item: impl Into<String>, username: impl Into<String>) -> Self {
        AssignmentFilter::Pair {
            item: item.into(),
            username: username.into(),
        }
    }
}

/// Backing record store
#[async_trait]
pub trait Storage: Send + Sync {
    /// Open a read-write atomic unit
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Open a read-only unit that sees one consistent snapshot
    async fn begin_read(&self) -> Result<Box<dyn Transaction>>;
}

/// One atomic unit of record operations
///
/// Counts returned by mutating calls are affected rows.
#[async_trait]
pub trait Transaction: Send {
    // Items

    async fn fetch_item(&mut self, name: &str) -> Result<Option<Item>>;

    async fn fetch_items(&mut self, filter: &ItemFilter) -> Result<Vec<Item>>;

    /// Fails with `DuplicateKey` when the name is taken
    async fn insert_item(&mut self, item: &Item) -> Result<()>;

    /// Overwrite every field except the name of the item called `item.name`
    async fn update_item(&mut self, item: &Item) -> Result<u64>;

    async fn delete_items(&mut self, filter: &ItemFilter) -> Result<u64>;

    /// Repoint (`Some`) or detach (`None`) every item guarded by `from`
    async fn set_rule_name(&mut self, from: &str, to: Option<&str>) -> Result<u64>;

    // Rules

    async fn fetch_rule(&mut self, name: &str) -> Result<Option<Rule>>;

    async fn fetch_rules(&mut self) -> Result<Vec<Rule>>;

    async fn insert_rule(&mut self, rule: &Rule) -> Result<()>;

    /// Overwrite type and payload of the rule called `rule.name`
    async fn update_rule(&mut self, rule: &Rule) -> Result<u64>;

    async fn delete_rule(&mut self, name: &str) -> Result<u64>;

    async fn delete_all_rules(&mut self) -> Result<u64>;

    // Edges

    async fn fetch_edges(&mut self, filter: &EdgeFilter) -> Result<Vec<Edge>>;

    async fn insert_edge(&mut self, edge: &Edge) -> Result<()>;

    async fn delete_edges(&mut self, filter: &EdgeFilter) -> Result<u64>;

    /// Replace `from` with `to` on both endpoints
    async fn rename_edge_endpoint(&mut self, from: &str, to: &str) -> Result<u64>;

    /// Block concurrent edge writers until this unit ends
    async fn lock_edges(&mut self) -> Result<()>;

    // Assignments

    async fn fetch_assignments(&mut self, filter: &AssignmentFilter) -> Result<Vec<Assignment>>;

    async fn insert_assignment(&mut self, assignment: &Assignment) -> Result<()>;

    async fn delete_assignments(&mut self, filter: &AssignmentFilter) -> Result<u64>;

    async fn rename_assignment_item(&mut self, from: &str, to: &str) -> Result<u64>;

    /// Make every change of this unit visible
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_filter_predicates() {
        let reader = Item::role("reader");
        let read_post = Item::permission("readPost");

        assert!(ItemFilter::all().matches_item(&reader));
        assert!(ItemFilter::all().kind(ItemKind::Role).matches_item(&reader));
        assert!(!ItemFilter::all().kind(ItemKind::Role).matches_item(&read_post));

        let names = ItemFilter::all().names(["readPost", "createPost"]);
        assert!(names.matches_item(&read_post));
        assert!(!names.matches_item(&reader));

        let empty = ItemFilter::all().names(Vec::<String>::new());
        assert!(!empty.matches_item(&reader));
    }
}
