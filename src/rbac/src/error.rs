//! Error types for the role hierarchy store

use std::fmt;
use thiserror::Error;

/// Why an edge was rejected before any write was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeViolation {
    /// Parent and child are the same item
    SelfReference,

    /// A permission would become the parent of a role
    PermissionAboveRole,
}

impl fmt::Display for EdgeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeViolation::SelfReference => f.write_str("an item cannot be a child of itself"),
            EdgeViolation::PermissionAboveRole => {
                f.write_str("a role cannot be added as a child of a permission")
            }
        }
    }
}

/// Role hierarchy errors
#[derive(Debug, Error)]
pub enum RbacError {
    /// Referenced item, rule or assignment does not exist
    #[error("{entity} not found: {name}")]
    NotFound { entity: &'static str, name: String },

    /// Create with a key that is already in use
    #[error("{entity} already exists: {key}")]
    DuplicateKey { entity: &'static str, key: String },

    /// Structurally disallowed edge
    #[error("Cannot add '{child}' as a child of '{parent}': {violation}")]
    InvalidEdge {
        parent: String,
        child: String,
        violation: EdgeViolation,
    },

    /// Edge insertion would close a loop
    #[error("Cannot add '{child}' as a child of '{parent}'. A loop has been detected.")]
    CycleDetected { parent: String, child: String },

    /// Caller-supplied value or configuration is unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backing store unreachable or a constraint surfaced unexpectedly
    #[error("Storage error: {0}")]
    Storage(String),
}

impl RbacError {
    pub(crate) fn item_not_found(name: impl Into<String>) -> Self {
        RbacError::NotFound {
            entity: "Item",
            name: name.into(),
        }
    }

    pub(crate) fn rule_not_found(name: impl Into<String>) -> Self {
        RbacError::NotFound {
            entity: "Rule",
            name: name.into(),
        }
    }

    /// True for `NotFound` of any entity
    pub fn is_not_found(&self) -> bool {
        matches!(self, RbacError::NotFound { .. })
    }

    /// True when the edge was rejected because parent == child
    pub fn is_self_reference(&self) -> bool {
        matches!(
            self,
            RbacError::InvalidEdge {
                violation: EdgeViolation::SelfReference,
                ..
            }
        )
    }
}

/// Result type for hierarchy operations
pub type Result<T> = std::result::Result<T, RbacError>;
