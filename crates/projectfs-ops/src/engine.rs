//! The operation engine: validated, undoable file commands.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::broadcast;
use uuid::Uuid;

use projectfs_core::{NotificationHub, ProjectConfig, ResourceKey, ResourceNotification};

use crate::companion::CompanionData;
use crate::error::OperationError;
use crate::operation::{FileOperation, KeyChange, OpContext};
use crate::undo::UndoLog;

/// Whether [`OperationEngine::transfer`] copies or moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    Copy,
    Move,
}

/// Executes file commands inside a project and keeps their undo history.
///
/// Every command validates before touching the disk, runs its I/O on a
/// blocking worker and records a [`FileOperation`]. The engine never updates
/// a registry; the change monitor sees the disk changes and triggers a rescan.
///
/// Commands take `&mut self`, so operations are serialized by construction.
#[derive(Debug)]
pub struct OperationEngine {
    config: Arc<ProjectConfig>,
    ctx: OpContext,
    undo_log: UndoLog,
    redo_log: UndoLog,
    batch: Option<Vec<FileOperation>>,
    hub: NotificationHub,
}

impl OperationEngine {
    /// Create an engine for a project.
    ///
    /// History only lives in memory, so trash left behind by an earlier
    /// session is unreachable and gets erased here.
    pub fn new(config: Arc<ProjectConfig>, hub: NotificationHub) -> Result<Self, OperationError> {
        let ctx = OpContext::new(&config);
        ctx.purge_trash()?;

        Ok(Self {
            undo_log: UndoLog::new(config.max_undo),
            redo_log: UndoLog::new(config.max_undo),
            config,
            ctx,
            batch: None,
            hub,
        })
    }

    /// Attach a companion-data mapping that follows resources through operations.
    pub fn with_companion(mut self, companion: Arc<dyn CompanionData>) -> Self {
        self.ctx.set_companion(companion);
        self
    }

    /// Project configuration.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Subscribe to the notifications this engine publishes.
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceNotification> {
        self.hub.subscribe()
    }

    /// Create a file with the given content.
    pub async fn create_file(
        &mut self,
        key: &ResourceKey,
        contents: impl Into<Vec<u8>>,
    ) -> Result<(), OperationError> {
        self.check_key(key)?;
        let key = key.clone();
        let contents = contents.into();

        let operation = self
            .run_blocking(move |ctx| FileOperation::create_file(ctx, key, &contents))
            .await?;
        self.record(operation, Vec::new()).await;
        Ok(())
    }

    /// Create an empty folder.
    pub async fn create_folder(&mut self, key: &ResourceKey) -> Result<(), OperationError> {
        self.check_key(key)?;
        let key = key.clone();

        let operation = self
            .run_blocking(move |ctx| FileOperation::create_folder(ctx, key))
            .await?;
        self.record(operation, Vec::new()).await;
        Ok(())
    }

    /// Copy a file to a new key.
    pub async fn copy_file(
        &mut self,
        from: &ResourceKey,
        to: &ResourceKey,
    ) -> Result<(), OperationError> {
        self.copy(from, to, false).await
    }

    /// Copy a folder and everything in it to a new key.
    pub async fn copy_folder(
        &mut self,
        from: &ResourceKey,
        to: &ResourceKey,
    ) -> Result<(), OperationError> {
        self.copy(from, to, true).await
    }

    /// Move or rename a file.
    pub async fn move_file(
        &mut self,
        from: &ResourceKey,
        to: &ResourceKey,
    ) -> Result<(), OperationError> {
        self.relocate(from, to, false).await
    }

    /// Move or rename a folder with everything in it.
    pub async fn move_folder(
        &mut self,
        from: &ResourceKey,
        to: &ResourceKey,
    ) -> Result<(), OperationError> {
        self.relocate(from, to, true).await
    }

    /// Soft-delete a file.
    pub async fn delete_file(&mut self, key: &ResourceKey) -> Result<(), OperationError> {
        self.delete(key, false).await
    }

    /// Soft-delete a folder. Empty folders are removed directly.
    pub async fn delete_folder(&mut self, key: &ResourceKey) -> Result<(), OperationError> {
        self.delete(key, true).await
    }

    /// Copy or move whatever lies at `source` to `destination`.
    ///
    /// Both paths must be inside the project. If `destination` is an existing
    /// folder the item is placed inside it under its own name. Returns the
    /// key the item ended up at.
    pub async fn transfer(
        &mut self,
        source: &Path,
        destination: &Path,
        mode: TransferMode,
    ) -> Result<ResourceKey, OperationError> {
        let from = self.config.resolve_key(source)?;
        let mut to = self.config.resolve_key(destination)?;
        self.check_key(&from)?;

        let source_path = self.config.resolve_path(&from);
        let metadata = std::fs::symlink_metadata(&source_path)
            .map_err(|_| OperationError::SourceMissing { key: from.clone() })?;
        if self.config.resolve_path(&to).is_dir() {
            to = to.join(from.name())?;
        }

        let folder = metadata.is_dir();
        match mode {
            TransferMode::Copy => self.copy(&from, &to, folder).await?,
            TransferMode::Move => self.relocate(&from, &to, folder).await?,
        }
        Ok(to)
    }

    /// Start grouping operations into a single undo step.
    ///
    /// Nested batches are not supported; a second begin is ignored.
    pub fn begin_batch(&mut self) {
        if self.batch.is_some() {
            tracing::warn!("batch already open; ignoring nested begin");
            return;
        }
        self.batch = Some(Vec::new());
    }

    /// Close the open batch and record it as one undo step.
    ///
    /// Operations already performed stay performed even if a later one in
    /// the batch failed. An empty batch records nothing.
    pub async fn commit_batch(&mut self) {
        let Some(operations) = self.batch.take() else {
            tracing::warn!("commit without an open batch");
            return;
        };
        if operations.is_empty() {
            tracing::debug!("empty batch, nothing to record");
            return;
        }

        tracing::debug!("committing batch of {} operations", operations.len());
        self.push_undo(FileOperation::Batch { operations }).await;
        self.publish_stack_changed();
    }

    /// Check if a batch is open.
    pub fn is_batch_open(&self) -> bool {
        self.batch.is_some()
    }

    /// Undo the most recent operation. Does nothing if there is none.
    ///
    /// If reversing fails the entry is dropped from history, but its trash
    /// is kept on disk.
    pub async fn undo(&mut self) -> Result<(), OperationError> {
        if self.batch.is_some() {
            return Err(OperationError::BatchOpen);
        }
        let Some(entry) = self.undo_log.pop() else {
            return Ok(());
        };
        let description = entry.description.clone();

        let result = self
            .run_blocking(move |ctx| {
                let mut entry = entry;
                let changes = entry.operation.undo(ctx)?;
                Ok((entry, changes))
            })
            .await;

        let outcome = match result {
            Ok((entry, changes)) => {
                tracing::debug!("undid: {description}");
                self.publish_key_changes(changes);
                if let Some(evicted) = self.redo_log.push(entry) {
                    self.erase([evicted.operation]).await;
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!("undo of '{description}' failed, dropping it: {err}");
                Err(err)
            }
        };
        self.publish_stack_changed();
        outcome
    }

    /// Redo the most recently undone operation. Does nothing if there is none.
    pub async fn redo(&mut self) -> Result<(), OperationError> {
        if self.batch.is_some() {
            return Err(OperationError::BatchOpen);
        }
        let Some(entry) = self.redo_log.pop() else {
            return Ok(());
        };
        let description = entry.description.clone();

        let result = self
            .run_blocking(move |ctx| {
                let mut entry = entry;
                let changes = entry.operation.redo(ctx)?;
                Ok((entry, changes))
            })
            .await;

        let outcome = match result {
            Ok((entry, changes)) => {
                tracing::debug!("redid: {description}");
                self.publish_key_changes(changes);
                if let Some(evicted) = self.undo_log.push(entry) {
                    self.erase([evicted.operation]).await;
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!("redo of '{description}' failed, dropping it: {err}");
                Err(err)
            }
        };
        self.publish_stack_changed();
        outcome
    }

    /// Check if there is anything to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo_log.is_empty()
    }

    /// Check if there is anything to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo_log.is_empty()
    }

    /// Description of the operation [`OperationEngine::undo`] would reverse.
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_log.peek().map(|entry| entry.description.as_str())
    }

    /// Description of the operation [`OperationEngine::redo`] would replay.
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_log.peek().map(|entry| entry.description.as_str())
    }

    /// Undo history, oldest first.
    pub fn undo_log(&self) -> &UndoLog {
        &self.undo_log
    }

    async fn copy(
        &mut self,
        from: &ResourceKey,
        to: &ResourceKey,
        folder: bool,
    ) -> Result<(), OperationError> {
        self.check_key(from)?;
        self.check_key(to)?;
        let (from, to) = (from.clone(), to.clone());

        let operation = self
            .run_blocking(move |ctx| FileOperation::copy(ctx, from, to, folder))
            .await?;
        self.record(operation, Vec::new()).await;
        Ok(())
    }

    async fn relocate(
        &mut self,
        from: &ResourceKey,
        to: &ResourceKey,
        folder: bool,
    ) -> Result<(), OperationError> {
        self.check_key(from)?;
        self.check_key(to)?;
        let (from, to) = (from.clone(), to.clone());

        let (operation, changes) = self
            .run_blocking(move |ctx| FileOperation::relocate(ctx, from, to, folder))
            .await?;
        self.record(operation, changes).await;
        Ok(())
    }

    async fn delete(&mut self, key: &ResourceKey, folder: bool) -> Result<(), OperationError> {
        self.check_key(key)?;
        let key = key.clone();

        let operation = self
            .run_blocking(move |ctx| FileOperation::delete(ctx, key, folder))
            .await?;
        self.record(operation, Vec::new()).await;
        Ok(())
    }

    /// Reject the root and anything inside the metadata folder.
    fn check_key(&self, key: &ResourceKey) -> Result<(), OperationError> {
        let Some(first) = key.segments().next() else {
            return Err(OperationError::ProjectRoot);
        };
        if first.eq_ignore_ascii_case(&self.config.metadata_folder) {
            return Err(OperationError::Reserved { key: key.clone() });
        }
        Ok(())
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, OperationError>
    where
        F: FnOnce(&OpContext) -> Result<T, OperationError> + Send + 'static,
        T: Send + 'static,
    {
        let ctx = self.ctx.clone();
        tokio::task::spawn_blocking(move || f(&ctx))
            .await
            .map_err(|e| OperationError::TaskFailed(e.to_string()))?
    }

    /// Push a performed operation onto the history and invalidate redo.
    async fn record(&mut self, operation: FileOperation, changes: Vec<KeyChange>) {
        tracing::debug!(kind = operation.kind(), "{}", operation.description());
        self.publish_key_changes(changes);

        let discarded = self.redo_log.drain();
        self.erase(discarded.into_iter().map(|entry| entry.operation))
            .await;

        match self.batch.as_mut() {
            Some(operations) => operations.push(operation),
            None => self.push_undo(operation).await,
        }
        self.publish_stack_changed();
    }

    async fn push_undo(&mut self, operation: FileOperation) {
        if let Some(evicted) = self.undo_log.record(operation) {
            tracing::debug!("evicting oldest undo entry: {}", evicted.description);
            self.erase([evicted.operation]).await;
        }
    }

    /// Erase the trash owned by operations leaving the history for good.
    async fn erase(&self, operations: impl IntoIterator<Item = FileOperation>) {
        let ids: Vec<Uuid> = operations
            .into_iter()
            .flat_map(|operation| operation.trash_ids())
            .collect();
        if ids.is_empty() {
            return;
        }

        let ctx = self.ctx.clone();
        let result = tokio::task::spawn_blocking(move || {
            for id in ids {
                ctx.erase_trash(id);
            }
        })
        .await;
        if let Err(e) = result {
            tracing::debug!("trash cleanup task failed: {e}");
        }
    }

    fn publish_key_changes(&self, changes: Vec<KeyChange>) {
        for (old_key, new_key) in changes {
            self.hub
                .publish(ResourceNotification::ResourceKeyChanged { old_key, new_key });
        }
    }

    fn publish_stack_changed(&self) {
        self.hub.publish(ResourceNotification::UndoStackChanged {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    fn engine_for(temp: &TempDir) -> OperationEngine {
        let config = Arc::new(ProjectConfig::new(temp.path()));
        OperationEngine::new(config, NotificationHub::new()).unwrap()
    }

    fn key(s: &str) -> ResourceKey {
        ResourceKey::new(s).unwrap()
    }

    #[test]
    fn test_transfer_mode_parse() {
        assert_eq!("copy".parse::<TransferMode>().unwrap(), TransferMode::Copy);
        assert_eq!("MOVE".parse::<TransferMode>().unwrap(), TransferMode::Move);
        assert_eq!(TransferMode::Move.to_string(), "move");
    }

    #[tokio::test]
    async fn test_rejects_root_and_metadata_keys() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine_for(&temp);

        assert!(matches!(
            engine.delete_folder(&ResourceKey::root()).await,
            Err(OperationError::ProjectRoot)
        ));
        assert!(matches!(
            engine.create_file(&key(".projectfs/x.txt"), "x").await,
            Err(OperationError::Reserved { .. })
        ));
        assert!(!engine.can_undo());
    }

    #[tokio::test]
    async fn test_validation_leaves_disk_untouched() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        fs::write(temp.path().join("b.txt"), "b").unwrap();
        let mut engine = engine_for(&temp);

        let err = engine.copy_file(&key("a.txt"), &key("b.txt")).await.unwrap_err();
        assert!(matches!(err, OperationError::DestinationExists { .. }));

        let err = engine
            .create_file(&key("a.txt/inner.txt"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::ParentNotFolder { .. }));

        let err = engine.move_folder(&key("a.txt"), &key("c")).await.unwrap_err();
        assert!(matches!(err, OperationError::WrongKind { .. }));

        let err = engine.delete_file(&key("missing.txt")).await.unwrap_err();
        assert!(matches!(err, OperationError::SourceMissing { .. }));

        assert_eq!(fs::read_to_string(temp.path().join("b.txt")).unwrap(), "b");
        assert!(!engine.can_undo());
    }

    #[tokio::test]
    async fn test_folder_into_itself() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("d")).unwrap();
        let mut engine = engine_for(&temp);

        let err = engine.copy_folder(&key("d"), &key("d/sub")).await.unwrap_err();
        assert!(matches!(err, OperationError::DestinationInsideSource { .. }));
    }

    #[tokio::test]
    async fn test_empty_folder_delete_and_undo() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("empty")).unwrap();
        let mut engine = engine_for(&temp);

        engine.delete_folder(&key("empty")).await.unwrap();
        assert!(!temp.path().join("empty").exists());
        assert!(!temp.path().join(".projectfs/trash").exists());

        engine.undo().await.unwrap();
        assert!(temp.path().join("empty").is_dir());
    }

    #[tokio::test]
    async fn test_undo_blocked_while_batch_open() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine_for(&temp);

        engine.begin_batch();
        engine.begin_batch();
        assert!(engine.is_batch_open());
        assert!(matches!(engine.undo().await, Err(OperationError::BatchOpen)));

        engine.commit_batch().await;
        assert!(!engine.is_batch_open());
        assert!(!engine.can_undo());

        // Commit without a batch is harmless
        engine.commit_batch().await;
    }
}
