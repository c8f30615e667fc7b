//! Change monitoring for projectfs.
//!
//! Watches a project folder through `notify`, filters out editor and build
//! noise, announces each surviving change, and coalesces bursts into a single
//! debounced rescan request for the registry owner.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use projectfs_core::{NotificationHub, ProjectConfig};
//! use projectfs_monitor::ResourceMonitor;
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), projectfs_monitor::MonitorError> {
//! let config = Arc::new(ProjectConfig::new("/path/to/project"));
//! let (tx, mut rescans) = mpsc::unbounded_channel();
//! let mut monitor = ResourceMonitor::new(config, NotificationHub::new(), Arc::new(tx));
//! monitor.initialize()?;
//!
//! while rescans.recv().await.is_some() {
//!     // registry.rescan()
//! }
//! # Ok(())
//! # }
//! ```

mod debouncer;
mod error;
mod events;
mod monitor;

pub use debouncer::{Debouncer, RescanRequest, RescanSink};
pub use error::MonitorError;
pub use events::{EventRouter, ResourceChange};
pub use monitor::{MonitorState, ResourceMonitor};
