//! Core types for projectfs.
//!
//! This crate provides the fundamental data structures shared by the
//! registry, the operation engine and the change monitor: resource keys,
//! project configuration, filtering rules and notifications.

mod config;
mod error;
mod filter;
mod key;
mod notification;

pub use config::{
    DEFAULT_DEBOUNCE_MS, DEFAULT_IGNORED_NAMES, DEFAULT_MAX_UNDO, DEFAULT_METADATA_FOLDER,
    DEFAULT_TEMP_PATTERNS, ProjectConfig, ProjectConfigBuilder,
};
pub use error::ResourceError;
pub use filter::{ResourceFilter, is_hidden_or_system};
pub use key::{KEY_SEPARATOR, ResourceKey, validate_segment};
pub use notification::{NOTIFICATION_CHANNEL_SIZE, NotificationHub, ResourceNotification};
