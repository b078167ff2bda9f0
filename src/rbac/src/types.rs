//! Core hierarchy records
//!
//! Records reference each other by name only. Loading one never pulls in
//! the rest of the graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::RbacError;

/// Unique item name (shared namespace for roles and permissions)
pub type ItemName = String;

/// Unique rule name
pub type RuleName = String;

/// Kind of authorization item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A role: usually assigned to users and granted through children
    Role,
    /// A permission: a leaf-ish grant, never the parent of a role
    Permission,
}

impl ItemKind {
    /// Column value used by the record stores
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Role => "role",
            ItemKind::Permission => "permission",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "role" => Ok(ItemKind::Role),
            "permission" => Ok(ItemKind::Permission),
            other => Err(RbacError::Storage(format!("Unknown item type: {}", other))),
        }
    }
}

/// Authorization item (role or permission)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique, case-sensitive name
    pub name: ItemName,

    /// Role or permission
    #[serde(rename = "type")]
    pub kind: ItemKind,

    /// Optional free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Guard rule; `None` always grants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<RuleName>,

    /// Opaque caller-owned payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Item {
    /// Create an item of the given kind
    pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            rule_name: None,
            data: None,
        }
    }

    /// Create a role
    pub fn role(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Role)
    }

    /// Create a permission
    pub fn permission(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Permission)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_rule(mut self, rule_name: impl Into<String>) -> Self {
        self.rule_name = Some(rule_name.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn is_role(&self) -> bool {
        self.kind == ItemKind::Role
    }

    pub fn is_permission(&self) -> bool {
        self.kind == ItemKind::Permission
    }
}

/// Named guard stored as inert data
///
/// `type_name` selects the external implementation; `payload` is its
/// configuration and is never interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: RuleName,

    #[serde(rename = "typeName")]
    pub type_name: String,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            payload,
        }
    }
}

/// Directed parent -> child relation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub parent: ItemName,
    pub child: ItemName,
}

impl Edge {
    pub fn new(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
        }
    }
}

/// Binding of one item to one user identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assignment {
    pub item_name: ItemName,
    pub username: String,
}

impl Assignment {
    pub fn new(item_name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            username: username.into(),
        }
    }
}

/// Item together with the names of its direct parents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(flatten)]
    pub item: Item,

    pub parents: Vec<ItemName>,
}

/// Everything the external authorization manager needs to warm its cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchySnapshot {
    pub items: BTreeMap<ItemName, ItemRecord>,
    pub rules: BTreeMap<RuleName, Rule>,
}

impl HierarchySnapshot {
    /// Direct parent names of an item, empty when unknown
    pub fn parents_of(&self, name: &str) -> &[ItemName] {
        self.items
            .get(name)
            .map(|record| record.parents.as_slice())
            .unwrap_or(&[])
    }
}
