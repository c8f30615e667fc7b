//! Resource registry for projectfs.
//!
//! This crate mirrors a project folder as an in-memory tree of files and
//! folders and translates between resource keys and absolute paths.
//!
//! # Overview
//!
//! - **Parallel traversal** via jwalk/rayon
//! - **Generation-tagged handles** so stale resources never alias new ones
//! - **Whole-tree rescans**; the previous snapshot stays readable until dropped
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use projectfs_core::{NotificationHub, ProjectConfig};
//! use projectfs_registry::Registry;
//!
//! let config = Arc::new(ProjectConfig::new("/path/to/project"));
//! let mut registry = Registry::new(config, NotificationHub::new()).unwrap();
//! registry.rescan().unwrap();
//!
//! for (key, path) in registry.all_files() {
//!     println!("{key} -> {}", path.display());
//! }
//! ```

mod registry;
mod scanner;
mod tree;

pub use registry::Registry;
pub use scanner::ProjectScanner;
pub use tree::{
    Resource, ResourceId, ResourceKind, ResourceTree, ScanWarning, TreeStats, compare_siblings,
};

// Re-export core types for convenience
pub use projectfs_core::{ProjectConfig, ResourceError, ResourceKey};
