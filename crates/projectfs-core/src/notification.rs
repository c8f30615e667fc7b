//! In-process notifications published by the registry, engine and monitor.

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use tokio::sync::broadcast;

use crate::key::ResourceKey;

/// Default buffer size of the notification channel.
pub const NOTIFICATION_CHANNEL_SIZE: usize = 256;

/// A change that collaborators may react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ResourceNotification {
    /// The registry finished a rescan and its tree was replaced.
    RegistryUpdated,
    /// A resource appeared on disk (before resync).
    ResourceCreated { key: ResourceKey },
    /// A resource's content changed on disk (before resync).
    ResourceChanged { key: ResourceKey },
    /// A resource disappeared from disk (before resync).
    ResourceDeleted { key: ResourceKey },
    /// A resource was renamed by an external program (before resync).
    ResourceRenamed { from: ResourceKey, to: ResourceKey },
    /// A move performed by the engine changed a resource's key.
    ResourceKeyChanged {
        old_key: ResourceKey,
        new_key: ResourceKey,
    },
    /// The undo or redo stack changed.
    UndoStackChanged { can_undo: bool, can_redo: bool },
}

impl ResourceNotification {
    /// The primary key this notification is about, if any.
    pub fn key(&self) -> Option<&ResourceKey> {
        match self {
            Self::ResourceCreated { key }
            | Self::ResourceChanged { key }
            | Self::ResourceDeleted { key } => Some(key),
            Self::ResourceRenamed { to, .. } => Some(to),
            Self::ResourceKeyChanged { new_key, .. } => Some(new_key),
            Self::RegistryUpdated | Self::UndoStackChanged { .. } => None,
        }
    }
}

/// Fan-out point for [`ResourceNotification`]s.
///
/// Cloning the hub shares the same channel.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<ResourceNotification>,
}

impl NotificationHub {
    /// Create a hub with the default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(NOTIFICATION_CHANNEL_SIZE)
    }

    /// Create a hub with a custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to notifications published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceNotification> {
        self.tx.subscribe()
    }

    /// Publish a notification. Having no listeners is not an error.
    pub fn publish(&self, notification: ResourceNotification) {
        let _ = self.tx.send(notification);
    }

    /// Number of active subscribers.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}
