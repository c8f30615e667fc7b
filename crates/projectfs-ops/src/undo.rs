//! Bounded undo and redo history.

use std::collections::VecDeque;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::operation::FileOperation;

/// One step of history: an operation plus when it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoEntry {
    /// Sequence number, unique within the log that recorded it.
    pub id: u64,
    /// When the operation was performed.
    pub timestamp: SystemTime,
    /// The performed operation, carrying what undo and redo need.
    pub operation: FileOperation,
    /// Cached [`FileOperation::description`].
    pub description: String,
}

impl UndoEntry {
    /// Wrap an operation performed just now.
    pub fn new(id: u64, operation: FileOperation) -> Self {
        Self {
            id,
            timestamp: SystemTime::now(),
            description: operation.description(),
            operation,
        }
    }
}

/// A stack of [`UndoEntry`] that forgets its oldest entry past `bound`.
///
/// The engine keeps two of these, one for undo and one for redo. Whatever
/// falls off the bottom is handed back so its trash can be erased.
#[derive(Debug)]
pub struct UndoLog {
    stack: VecDeque<UndoEntry>,
    bound: usize,
    serial: u64,
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new(projectfs_core::DEFAULT_MAX_UNDO)
    }
}

impl UndoLog {
    /// Create a log holding at most `bound` entries (at least one).
    pub fn new(bound: usize) -> Self {
        let bound = bound.max(1);
        Self {
            stack: VecDeque::with_capacity(bound.min(64)),
            bound,
            serial: 0,
        }
    }

    /// Record a freshly performed operation under a new sequence number.
    ///
    /// Returns the entry pushed out of the bottom, if any.
    pub fn record(&mut self, operation: FileOperation) -> Option<UndoEntry> {
        let entry = UndoEntry::new(self.serial, operation);
        self.serial += 1;
        self.push(entry)
    }

    /// Push an entry moving over from the other log.
    ///
    /// Returns the entry pushed out of the bottom, if any.
    pub fn push(&mut self, entry: UndoEntry) -> Option<UndoEntry> {
        self.stack.push_back(entry);
        if self.stack.len() > self.bound {
            self.stack.pop_front()
        } else {
            None
        }
    }

    /// Take the newest entry.
    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.stack.pop_back()
    }

    /// The newest entry.
    pub fn peek(&self) -> Option<&UndoEntry> {
        self.stack.back()
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Check if there is nothing to step through.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Empty the log, returning the entries oldest first.
    pub fn drain(&mut self) -> Vec<UndoEntry> {
        self.stack.drain(..).collect()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &UndoEntry> {
        self.stack.iter()
    }
}
