//! Recorded file operations and how to reverse and replay them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use uuid::Uuid;

use projectfs_core::{ProjectConfig, ResourceKey};

use crate::companion::CompanionData;
use crate::error::OperationError;
use crate::fsutil;

/// A key rename caused by a move, as `(old, new)`.
pub type KeyChange = (ResourceKey, ResourceKey);

/// A completed operation carrying everything needed to undo and redo it.
///
/// `trash_id` names the folder under the trash root that holds this
/// operation's soft-deleted content. `created_parent` is the topmost folder
/// the operation had to create for its destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileOperation {
    /// A new file with initial content.
    CreateFile {
        key: ResourceKey,
        trash_id: Uuid,
        created_parent: Option<ResourceKey>,
    },
    /// A new, empty folder.
    CreateFolder {
        key: ResourceKey,
        trash_id: Uuid,
        created_parent: Option<ResourceKey>,
    },
    /// A file copied to a new key.
    CopyFile {
        from: ResourceKey,
        to: ResourceKey,
        trash_id: Uuid,
        created_parent: Option<ResourceKey>,
    },
    /// A folder copied recursively to a new key.
    CopyFolder {
        from: ResourceKey,
        to: ResourceKey,
        trash_id: Uuid,
        created_parent: Option<ResourceKey>,
    },
    /// A file moved or renamed.
    MoveFile {
        from: ResourceKey,
        to: ResourceKey,
        created_parent: Option<ResourceKey>,
    },
    /// A folder moved or renamed with everything inside it.
    MoveFolder {
        from: ResourceKey,
        to: ResourceKey,
        created_parent: Option<ResourceKey>,
    },
    /// A file moved to the trash.
    DeleteFile { key: ResourceKey, trash_id: Uuid },
    /// A folder moved to the trash, or removed directly if it was empty.
    DeleteFolder {
        key: ResourceKey,
        trash_id: Uuid,
        was_empty: bool,
    },
    /// Operations grouped into one undo step, in execution order.
    Batch { operations: Vec<FileOperation> },
}

impl FileOperation {
    /// Create a file and write `contents` to it.
    pub(crate) fn create_file(
        ctx: &OpContext,
        key: ResourceKey,
        contents: &[u8],
    ) -> Result<Self, OperationError> {
        ctx.check_vacant(&key)?;

        let path = ctx.path(&key);
        let created_parent = ctx.create_parents(&path)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| OperationError::io(&path, e))?;
        file.write_all(contents)
            .map_err(|e| OperationError::io(&path, e))?;

        Ok(Self::CreateFile {
            key,
            trash_id: Uuid::new_v4(),
            created_parent,
        })
    }

    /// Create an empty folder.
    pub(crate) fn create_folder(ctx: &OpContext, key: ResourceKey) -> Result<Self, OperationError> {
        ctx.check_vacant(&key)?;

        let path = ctx.path(&key);
        let created_parent = ctx.create_parents(&path)?;
        fs::create_dir(&path).map_err(|e| OperationError::io(&path, e))?;

        Ok(Self::CreateFolder {
            key,
            trash_id: Uuid::new_v4(),
            created_parent,
        })
    }

    /// Copy a file or folder to a new key.
    pub(crate) fn copy(
        ctx: &OpContext,
        from: ResourceKey,
        to: ResourceKey,
        folder: bool,
    ) -> Result<Self, OperationError> {
        ctx.check_transfer(&from, &to, folder)?;

        let created_parent = ctx.create_parents(&ctx.path(&to))?;
        ctx.duplicate(&from, &to)?;

        let trash_id = Uuid::new_v4();
        Ok(if folder {
            Self::CopyFolder {
                from,
                to,
                trash_id,
                created_parent,
            }
        } else {
            Self::CopyFile {
                from,
                to,
                trash_id,
                created_parent,
            }
        })
    }

    /// Move a file or folder to a new key.
    pub(crate) fn relocate(
        ctx: &OpContext,
        from: ResourceKey,
        to: ResourceKey,
        folder: bool,
    ) -> Result<(Self, Vec<KeyChange>), OperationError> {
        ctx.check_transfer(&from, &to, folder)?;

        let created_parent = ctx.create_parents(&ctx.path(&to))?;
        let changes = ctx.relocate(&from, &to)?;

        let operation = if folder {
            Self::MoveFolder {
                from,
                to,
                created_parent,
            }
        } else {
            Self::MoveFile {
                from,
                to,
                created_parent,
            }
        };
        Ok((operation, changes))
    }

    /// Soft-delete a file or folder.
    pub(crate) fn delete(
        ctx: &OpContext,
        key: ResourceKey,
        folder: bool,
    ) -> Result<Self, OperationError> {
        ctx.check_source(&key, folder)?;

        let trash_id = Uuid::new_v4();
        if !folder {
            ctx.soft_delete(&key, trash_id)?;
            return Ok(Self::DeleteFile { key, trash_id });
        }

        let was_empty = ctx.delete_folder(&key, trash_id)?;
        Ok(Self::DeleteFolder {
            key,
            trash_id,
            was_empty,
        })
    }

    /// Reverse this operation on disk.
    pub(crate) fn undo(&mut self, ctx: &OpContext) -> Result<Vec<KeyChange>, OperationError> {
        match self {
            Self::CreateFile {
                key,
                trash_id,
                created_parent,
            }
            | Self::CreateFolder {
                key,
                trash_id,
                created_parent,
            }
            | Self::CopyFile {
                to: key,
                trash_id,
                created_parent,
                ..
            }
            | Self::CopyFolder {
                to: key,
                trash_id,
                created_parent,
                ..
            } => {
                ctx.soft_delete(key, *trash_id)?;
                ctx.prune_created(created_parent.as_ref());
                Ok(Vec::new())
            }
            Self::MoveFile {
                from,
                to,
                created_parent,
            }
            | Self::MoveFolder {
                from,
                to,
                created_parent,
            } => {
                let changes = ctx.relocate(to, from)?;
                ctx.prune_created(created_parent.as_ref());
                Ok(changes)
            }
            Self::DeleteFile { key, trash_id }
            | Self::DeleteFolder {
                key,
                trash_id,
                was_empty: false,
            } => {
                ctx.restore(key, *trash_id)?;
                Ok(Vec::new())
            }
            Self::DeleteFolder {
                key,
                was_empty: true,
                ..
            } => {
                ctx.check_vacant(key)?;
                let path = ctx.path(key);
                fs::create_dir_all(&path).map_err(|e| OperationError::io(&path, e))?;
                Ok(Vec::new())
            }
            Self::Batch { operations } => {
                let mut changes = Vec::new();
                for operation in operations.iter_mut().rev() {
                    changes.extend(operation.undo(ctx)?);
                }
                Ok(changes)
            }
        }
    }

    /// Apply this operation again after an undo.
    pub(crate) fn redo(&mut self, ctx: &OpContext) -> Result<Vec<KeyChange>, OperationError> {
        match self {
            Self::CreateFile { key, trash_id, .. }
            | Self::CreateFolder { key, trash_id, .. }
            | Self::CopyFile {
                to: key, trash_id, ..
            }
            | Self::CopyFolder {
                to: key, trash_id, ..
            } => {
                ctx.restore(key, *trash_id)?;
                Ok(Vec::new())
            }
            Self::MoveFile { from, to, .. } | Self::MoveFolder { from, to, .. } => {
                ctx.relocate(from, to)
            }
            Self::DeleteFile { key, trash_id } => {
                ctx.check_source(key, false)?;
                ctx.soft_delete(key, *trash_id)?;
                Ok(Vec::new())
            }
            Self::DeleteFolder {
                key,
                trash_id,
                was_empty,
            } => {
                ctx.check_source(key, true)?;
                *was_empty = ctx.delete_folder(key, *trash_id)?;
                Ok(Vec::new())
            }
            Self::Batch { operations } => {
                let mut changes = Vec::new();
                for operation in operations.iter_mut() {
                    changes.extend(operation.redo(ctx)?);
                }
                Ok(changes)
            }
        }
    }

    /// Human-readable summary.
    pub fn description(&self) -> String {
        match self {
            Self::CreateFile { key, .. } => format!("Create file '{key}'"),
            Self::CreateFolder { key, .. } => format!("Create folder '{key}'"),
            Self::CopyFile { from, to, .. } => format!("Copy file '{from}' to '{to}'"),
            Self::CopyFolder { from, to, .. } => format!("Copy folder '{from}' to '{to}'"),
            Self::MoveFile { from, to, .. } => format!("Move file '{from}' to '{to}'"),
            Self::MoveFolder { from, to, .. } => format!("Move folder '{from}' to '{to}'"),
            Self::DeleteFile { key, .. } => format!("Delete file '{key}'"),
            Self::DeleteFolder { key, .. } => format!("Delete folder '{key}'"),
            Self::Batch { operations } => match operations.as_slice() {
                [single] => single.description(),
                _ => format!("{} operations", operations.len()),
            },
        }
    }

    /// Trash folders owned by this operation (and any it contains).
    pub fn trash_ids(&self) -> Vec<Uuid> {
        match self {
            Self::CreateFile { trash_id, .. }
            | Self::CreateFolder { trash_id, .. }
            | Self::CopyFile { trash_id, .. }
            | Self::CopyFolder { trash_id, .. }
            | Self::DeleteFile { trash_id, .. }
            | Self::DeleteFolder { trash_id, .. } => vec![*trash_id],
            Self::MoveFile { .. } | Self::MoveFolder { .. } => Vec::new(),
            Self::Batch { operations } => operations.iter().flat_map(Self::trash_ids).collect(),
        }
    }

    /// Operation name for logging.
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

/// Disk layout and collaborators shared by every operation.
#[derive(Debug, Clone)]
pub(crate) struct OpContext {
    root: PathBuf,
    metadata_root: PathBuf,
    trash_root: PathBuf,
    companion: Option<Arc<dyn CompanionData>>,
}

impl OpContext {
    pub(crate) fn new(config: &ProjectConfig) -> Self {
        Self {
            root: config.root.clone(),
            metadata_root: config.metadata_root(),
            trash_root: config.trash_root(),
            companion: None,
        }
    }

    pub(crate) fn set_companion(&mut self, companion: Arc<dyn CompanionData>) {
        self.companion = Some(companion);
    }

    fn path(&self, key: &ResourceKey) -> PathBuf {
        self.root.join(relative(key))
    }

    pub(crate) fn trash_dir(&self, id: Uuid) -> PathBuf {
        self.trash_root.join(id.to_string())
    }

    /// Erase one operation's trash folder. Errors are swallowed.
    pub(crate) fn erase_trash(&self, id: Uuid) {
        let dir = self.trash_dir(id);
        if !fsutil::exists(&dir) {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&dir) {
            tracing::debug!("failed to erase trash {}: {e}", dir.display());
        }
    }

    /// Remove the whole trash root, left over from an earlier session.
    pub(crate) fn purge_trash(&self) -> Result<(), OperationError> {
        if !fsutil::exists(&self.trash_root) {
            return Ok(());
        }
        tracing::debug!("purging stale trash at {}", self.trash_root.display());
        fs::remove_dir_all(&self.trash_root).map_err(|e| OperationError::io(&self.trash_root, e))
    }

    fn check_source(&self, key: &ResourceKey, folder: bool) -> Result<(), OperationError> {
        let path = self.path(key);
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OperationError::SourceMissing { key: key.clone() });
            }
            Err(e) => return Err(OperationError::io(&path, e)),
        };

        match (folder, metadata.is_dir(), metadata.is_file()) {
            (true, true, _) | (false, _, true) => Ok(()),
            (true, ..) => Err(OperationError::WrongKind {
                key: key.clone(),
                expected: "folder",
            }),
            (false, ..) => Err(OperationError::WrongKind {
                key: key.clone(),
                expected: "file",
            }),
        }
    }

    /// The destination must be absent and its nearest existing ancestor a folder.
    fn check_vacant(&self, key: &ResourceKey) -> Result<(), OperationError> {
        if fsutil::exists(&self.path(key)) {
            return Err(OperationError::DestinationExists { key: key.clone() });
        }

        let mut ancestor = key.parent();
        while let Some(current) = ancestor {
            match fs::metadata(self.path(&current)) {
                Ok(metadata) if metadata.is_dir() => return Ok(()),
                Ok(_) => return Err(OperationError::ParentNotFolder { key: key.clone() }),
                Err(_) => ancestor = current.parent(),
            }
        }
        Ok(())
    }

    fn check_transfer(
        &self,
        from: &ResourceKey,
        to: &ResourceKey,
        folder: bool,
    ) -> Result<(), OperationError> {
        self.check_source(from, folder)?;
        if folder && (to == from || to.is_descendant_of(from)) {
            return Err(OperationError::DestinationInsideSource {
                from: from.clone(),
                to: to.clone(),
            });
        }
        self.check_vacant(to)
    }

    fn create_parents(&self, path: &Path) -> Result<Option<ResourceKey>, OperationError> {
        let topmost = fsutil::create_parents(path).map_err(|e| OperationError::io(path, e))?;
        Ok(topmost.and_then(|dir| {
            let rel = dir.strip_prefix(&self.root).ok()?;
            join_relative(&ResourceKey::root(), rel)
        }))
    }

    fn prune_created(&self, created_parent: Option<&ResourceKey>) {
        if let Some(key) = created_parent {
            fsutil::remove_empty_tree(&self.path(key));
        }
    }

    /// Remove a folder directly if empty, otherwise soft-delete it.
    ///
    /// Returns whether the folder was empty.
    fn delete_folder(&self, key: &ResourceKey, trash_id: Uuid) -> Result<bool, OperationError> {
        let path = self.path(key);
        if fsutil::is_empty_dir(&path).map_err(|e| OperationError::io(&path, e))? {
            fs::remove_dir(&path).map_err(|e| OperationError::io(&path, e))?;
            return Ok(true);
        }
        self.soft_delete(key, trash_id)?;
        Ok(false)
    }

    /// Move a resource and its companions into the trash folder `trash_id`.
    fn soft_delete(&self, key: &ResourceKey, trash_id: Uuid) -> Result<(), OperationError> {
        let path = self.path(key);
        if !fsutil::exists(&path) {
            return Err(OperationError::SourceMissing { key: key.clone() });
        }

        let files = self.companion_keys(key, &path);
        self.stash(&relative(key), trash_id)?;
        for file in &files {
            if let Some(rel) = self.companion_rel(file) {
                self.stash_companion(&rel, trash_id);
            }
        }
        Ok(())
    }

    /// Bring a soft-deleted resource and its companions back from `trash_id`.
    fn restore(&self, key: &ResourceKey, trash_id: Uuid) -> Result<(), OperationError> {
        if fsutil::exists(&self.path(key)) {
            return Err(OperationError::DestinationExists { key: key.clone() });
        }

        self.unstash(&relative(key), trash_id)?;
        for file in self.companion_keys(key, &self.path(key)) {
            let Some(rel) = self.companion_rel(&file) else {
                continue;
            };
            if fsutil::exists(&self.trash_dir(trash_id).join(&rel)) {
                if let Err(e) = self.unstash(&rel, trash_id) {
                    tracing::warn!("failed to restore companion data for '{file}': {e}");
                }
            }
        }
        Ok(())
    }

    /// Move `from` to `to` with companions. Returns every key that changed.
    fn relocate(
        &self,
        from: &ResourceKey,
        to: &ResourceKey,
    ) -> Result<Vec<KeyChange>, OperationError> {
        let source = self.path(from);
        let destination = self.path(to);
        if !fsutil::exists(&source) {
            return Err(OperationError::SourceMissing { key: from.clone() });
        }
        if fsutil::exists(&destination) {
            return Err(OperationError::DestinationExists { key: to.clone() });
        }

        let mut changes = vec![(from.clone(), to.clone())];
        if source.is_dir() {
            let entries =
                fsutil::relative_entries(&source).map_err(|e| OperationError::io(&source, e))?;
            changes.extend(entries.iter().filter_map(|rel| {
                Some((join_relative(from, rel)?, join_relative(to, rel)?))
            }));
        }
        let files = self.companion_keys(from, &source);

        fsutil::move_path(&source, &destination)
            .map_err(|e| OperationError::io(&source, e))?;

        for file in &files {
            let Some(moved) = file.rebase(from, to) else {
                continue;
            };
            let (Some(old_rel), Some(new_rel)) =
                (self.companion_rel(file), self.companion_rel(&moved))
            else {
                continue;
            };
            let old_path = self.root.join(&old_rel);
            if !fsutil::exists(&old_path) {
                continue;
            }
            match fsutil::move_path(&old_path, &self.root.join(&new_rel)) {
                Ok(()) => self.prune_metadata(&old_path),
                Err(e) => tracing::warn!("failed to move companion data for '{file}': {e}"),
            }
        }

        Ok(changes)
    }

    /// Copy `from` to `to` with companions.
    fn duplicate(&self, from: &ResourceKey, to: &ResourceKey) -> Result<(), OperationError> {
        let source = self.path(from);
        let destination = self.path(to);
        fsutil::copy_path(&source, &destination).map_err(|e| OperationError::io(&source, e))?;

        for file in self.companion_keys(from, &source) {
            let Some(copied) = file.rebase(from, to) else {
                continue;
            };
            let (Some(old_rel), Some(new_rel)) =
                (self.companion_rel(&file), self.companion_rel(&copied))
            else {
                continue;
            };
            let old_path = self.root.join(&old_rel);
            if !fsutil::exists(&old_path) {
                continue;
            }
            let new_path = self.root.join(&new_rel);
            let result = fsutil::create_parents(&new_path)
                .and_then(|_| fsutil::copy_path(&old_path, &new_path));
            if let Err(e) = result {
                tracing::warn!("failed to copy companion data for '{file}': {e}");
            }
        }
        Ok(())
    }

    /// Keys of the files whose companions travel with `key`, looked up at `location`.
    fn companion_keys(&self, key: &ResourceKey, location: &Path) -> Vec<ResourceKey> {
        if self.companion.is_none() {
            return Vec::new();
        }
        if !location.is_dir() {
            return vec![key.clone()];
        }

        match fsutil::relative_files(location) {
            Ok(files) => files
                .iter()
                .filter_map(|rel| join_relative(key, rel))
                .collect(),
            Err(e) => {
                tracing::warn!("failed to list {}: {e}", location.display());
                Vec::new()
            }
        }
    }

    fn companion_rel(&self, key: &ResourceKey) -> Option<PathBuf> {
        self.companion.as_ref().map(|c| c.companion_path(key))
    }

    fn stash_companion(&self, rel: &Path, trash_id: Uuid) {
        let path = self.root.join(rel);
        if !fsutil::exists(&path) {
            return;
        }
        match self.stash(rel, trash_id) {
            Ok(()) => self.prune_metadata(&path),
            Err(e) => tracing::warn!("failed to trash companion data {}: {e}", rel.display()),
        }
    }

    fn stash(&self, rel: &Path, trash_id: Uuid) -> Result<(), OperationError> {
        let from = self.root.join(rel);
        let to = self.trash_dir(trash_id).join(rel);
        fsutil::move_path(&from, &to).map_err(|e| OperationError::io(&from, e))
    }

    fn unstash(&self, rel: &Path, trash_id: Uuid) -> Result<(), OperationError> {
        let from = self.trash_dir(trash_id).join(rel);
        if !fsutil::exists(&from) {
            return Err(OperationError::TrashMissing { path: from });
        }
        let to = self.root.join(rel);
        fsutil::move_path(&from, &to).map_err(|e| OperationError::io(&from, e))
    }

    /// Drop folders emptied inside the metadata folder.
    fn prune_metadata(&self, removed: &Path) {
        if let Some(parent) = removed.parent() {
            fsutil::prune_empty_ancestors(parent, &self.metadata_root);
        }
    }
}

/// Relative path of a key below the project root.
fn relative(key: &ResourceKey) -> PathBuf {
    key.segments().collect()
}

/// Append the components of a relative path to a key.
fn join_relative(key: &ResourceKey, rel: &Path) -> Option<ResourceKey> {
    rel.components()
        .try_fold(key.clone(), |acc, component| acc.join(component.as_os_str().to_str()?).ok())
}
