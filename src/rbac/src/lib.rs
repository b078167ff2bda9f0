//! # CretoAI RBAC Hierarchy
//!
//! Persistence and resolution for a role-based access-control hierarchy:
//! roles and permissions joined by parent/child edges, optional guard rules
//! on items, and assignments of items to users.
//!
//! ## Features
//!
//! - **Cycle-free hierarchy** enforced atomically on every edge insertion
//! - **Effective permissions** from direct and inherited assignments
//! - **Rename cascades** that move edges and assignments with the item
//! - **PostgreSQL storage** via sqlx, or an in-memory store for tests
//! - **Change signal** for callers that cache a derived view
//!
//! ## Example
//!
//! ```rust
//! use cretoai_rbac::{Item, RbacConfig, RbacManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rbac = RbacManager::in_memory(&RbacConfig::default());
//!
//!     rbac.items().create(Item::role("reader")).await?;
//!     rbac.items().create(Item::permission("readPost")).await?;
//!     rbac.edges().add_edge("reader", "readPost").await?;
//!     rbac.assignments().assign("reader", "alice").await?;
//!
//!     let permissions = rbac.aggregator().permissions_for_user("alice").await?;
//!     assert!(permissions.contains_key("readPost"));
//!
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod assignments;
pub mod config;
pub mod edges;
pub mod error;
pub mod hierarchy;
pub mod items;
pub mod manager;
pub mod rules;
pub mod signal;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use aggregator::{ItemMap, PermissionAggregator};
pub use assignments::AssignmentStore;
pub use config::{DatabaseConfig, RbacConfig};
pub use edges::EdgeStore;
pub use error::{EdgeViolation, RbacError, Result};
pub use hierarchy::{ChildrenMap, HierarchyResolver};
pub use items::{ItemStore, RemovalReport};
pub use manager::RbacManager;
pub use rules::{Guard, RuleRegistry};
pub use signal::ChangeSignal;
pub use storage::{InMemoryStorage, Storage, Transaction};
pub use types::{Assignment, Edge, HierarchySnapshot, Item, ItemKind, ItemRecord, Rule};

#[cfg(feature = "postgres")]
pub use storage::PostgresStorage;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
