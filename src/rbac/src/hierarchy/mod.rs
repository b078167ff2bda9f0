//! Hierarchy resolution
//!
//! Provides the parent -> children adjacency, cycle detection ahead of edge
//! insertion, and descendant sets for permission aggregation.
//!
//! # Example
//!
//! ```rust
//! use cretoai_rbac::hierarchy::ChildrenMap;
//! use cretoai_rbac::Edge;
//!
//! let map = ChildrenMap::from_edges(vec![
//!     Edge::new("author", "reader"),
//!     Edge::new("reader", "readPost"),
//! ]);
//!
//! assert!(map.detect_cycle("readPost", "author"));
//! assert!(map.descendants("author").contains("readPost"));
//! ```

pub mod graph;
pub mod resolver;


pub use graph::ChildrenMap;
pub use resolver::HierarchyResolver;
