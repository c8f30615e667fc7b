//! Translating raw watcher events into resource changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::Event;
use notify::event::{EventKind, ModifyKind, RenameMode};

use projectfs_core::{
    ProjectConfig, ResourceError, ResourceFilter, ResourceKey, ResourceNotification,
};

/// A change to a resource that survived noise filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    Created(ResourceKey),
    Changed(ResourceKey),
    Deleted(ResourceKey),
    Renamed { from: ResourceKey, to: ResourceKey },
}

impl ResourceChange {
    /// Notifications announcing this change. A rename also reports the new
    /// key as changed, since its content may differ from what was cached.
    pub fn notifications(&self) -> Vec<ResourceNotification> {
        match self {
            Self::Created(key) => vec![ResourceNotification::ResourceCreated { key: key.clone() }],
            Self::Changed(key) => vec![ResourceNotification::ResourceChanged { key: key.clone() }],
            Self::Deleted(key) => vec![ResourceNotification::ResourceDeleted { key: key.clone() }],
            Self::Renamed { from, to } => vec![
                ResourceNotification::ResourceRenamed {
                    from: from.clone(),
                    to: to.clone(),
                },
                ResourceNotification::ResourceChanged { key: to.clone() },
            ],
        }
    }
}

/// First half of a rename waiting for its second half.
#[derive(Debug, Clone)]
struct PendingRename {
    path: PathBuf,
    tracker: Option<usize>,
}

/// Resolves watcher events against a project and drops the noise.
///
/// Backends report a rename as separate `From` and `To` halves, and inotify
/// follows them with a paired `Both` event carrying the same tracker. The
/// router holds the `From` half until its partner arrives so one rename is
/// reported once. A half that never finds a partner is a move out of or
/// into the project.
#[derive(Debug, Clone)]
pub struct EventRouter {
    config: Arc<ProjectConfig>,
    filter: ResourceFilter,
    pending: Option<PendingRename>,
    paired: Option<usize>,
}

impl EventRouter {
    /// Create a router for the configured project.
    pub fn new(config: Arc<ProjectConfig>) -> Result<Self, ResourceError> {
        let filter = ResourceFilter::from_config(&config)?;
        Ok(Self {
            config,
            filter,
            pending: None,
            paired: None,
        })
    }

    /// Resource changes described by one event. Empty if it was all noise
    /// or the first half of a rename.
    pub fn classify(&mut self, event: &Event) -> Vec<ResourceChange> {
        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => self.rename_from(event),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => self.rename_to(event),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
                if event.tracker().is_some() && self.paired == event.tracker() {
                    self.paired = None;
                    return Vec::new();
                }
                let mut changes = self.flush_pending();
                changes.extend(self.rename(&event.paths[0], &event.paths[1]));
                changes
            }
            _ => {
                let mut changes = self.flush_pending();
                changes.extend(self.classify_single(event));
                changes
            }
        }
    }

    /// Check if a rename half is waiting for its partner.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Give up waiting: a pending `From` half means the resource left the project.
    pub fn flush_pending(&mut self) -> Vec<ResourceChange> {
        self.pending
            .take()
            .and_then(|pending| self.key_for(&pending.path))
            .map(ResourceChange::Deleted)
            .into_iter()
            .collect()
    }

    /// Key for a path worth reporting, or `None` for noise and outside paths.
    pub fn key_for(&self, path: &Path) -> Option<ResourceKey> {
        let key = self.config.resolve_key(path).ok()?;
        if self.filter.is_noise(&key, path) {
            return None;
        }
        Some(key)
    }

    fn classify_single(&self, event: &Event) -> Vec<ResourceChange> {
        match event.kind {
            EventKind::Access(_) => Vec::new(),
            EventKind::Create(_) => self.each(event, ResourceChange::Created),
            EventKind::Remove(_) => self.each(event, ResourceChange::Deleted),
            // Backends that can't tell rename halves apart: whichever side still exists was created
            EventKind::Modify(ModifyKind::Name(_)) => event
                .paths
                .iter()
                .filter_map(|path| {
                    let key = self.key_for(path)?;
                    Some(if path.exists() {
                        ResourceChange::Created(key)
                    } else {
                        ResourceChange::Deleted(key)
                    })
                })
                .collect(),
            EventKind::Modify(_) | EventKind::Any | EventKind::Other => {
                self.each(event, ResourceChange::Changed)
            }
        }
    }

    fn rename_from(&mut self, event: &Event) -> Vec<ResourceChange> {
        let mut changes = self.flush_pending();
        let Some((first, rest)) = event.paths.split_first() else {
            return changes;
        };
        changes.extend(
            rest.iter()
                .filter_map(|path| self.key_for(path))
                .map(ResourceChange::Deleted),
        );
        self.pending = Some(PendingRename {
            path: first.clone(),
            tracker: event.tracker(),
        });
        changes
    }

    fn rename_to(&mut self, event: &Event) -> Vec<ResourceChange> {
        let Some(to) = event.paths.first() else {
            return self.flush_pending();
        };

        if let Some(from) = self.pending.take_if(|p| p.tracker == event.tracker()) {
            self.paired = event.tracker();
            return self.rename(&from.path, to);
        }

        let mut changes = self.flush_pending();
        for path in &event.paths {
            changes.extend(self.arrived(path));
        }
        changes
    }

    fn rename(&self, from: &Path, to: &Path) -> Vec<ResourceChange> {
        match self.key_for(from) {
            Some(from) => match self.key_for(to) {
                Some(to) => vec![ResourceChange::Renamed { from, to }],
                None => vec![ResourceChange::Deleted(from)],
            },
            None => self.arrived(to),
        }
    }

    /// Something was renamed onto `path` from a temp file or from outside the
    /// project. It may have replaced an existing resource, so report both.
    fn arrived(&self, path: &Path) -> Vec<ResourceChange> {
        match self.key_for(path) {
            Some(key) => vec![
                ResourceChange::Created(key.clone()),
                ResourceChange::Changed(key),
            ],
            None => Vec::new(),
        }
    }

    fn each(
        &self,
        event: &Event,
        change: fn(ResourceKey) -> ResourceChange,
    ) -> Vec<ResourceChange> {
        event
            .paths
            .iter()
            .filter_map(|path| self.key_for(path))
            .map(change)
            .collect()
    }
}
