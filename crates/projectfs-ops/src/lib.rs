//! Undoable file operations for projectfs.
//!
//! This crate provides an async engine that creates, copies, moves and
//! deletes files and folders inside a project, keeping bounded undo and redo
//! stacks backed by a project-local trash.
//!
//! # Overview
//!
//! - **Validation first**: nothing touches the disk until the command is known to be legal
//! - **Soft delete** into `<metadata>/trash/<operation id>/…`, erased once the
//!   operation leaves both stacks
//! - **Batches** group several commands into one undo step
//! - **Companion data** files follow their resources through every command
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use projectfs_core::{NotificationHub, ProjectConfig, ResourceKey};
//! use projectfs_ops::OperationEngine;
//!
//! # async fn example() -> Result<(), projectfs_ops::OperationError> {
//! let config = Arc::new(ProjectConfig::new("/path/to/project"));
//! let mut engine = OperationEngine::new(config, NotificationHub::new())?;
//!
//! let key = ResourceKey::new("src/readme.md")?;
//! engine.create_file(&key, "# Notes").await?;
//! engine.undo().await?;
//! # Ok(())
//! # }
//! ```

mod companion;
mod engine;
mod error;
mod fsutil;
mod operation;
mod undo;

pub use companion::{CompanionData, SidecarCompanion};
pub use engine::{OperationEngine, TransferMode};
pub use error::OperationError;
pub use operation::{FileOperation, KeyChange};
pub use undo::{UndoEntry, UndoLog};
