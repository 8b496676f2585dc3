#![deny(missing_docs)]
//! In-memory implementation of otcore's file-store protocol.
//!
//! Change logs live in a `HashMap` behind tokio locks; revision
//! watchers are woken through a per-file `Notify`. Nothing survives a
//! restart, which makes this the store of choice for tests and for
//! caret state (presence data a restart legitimately forgets).

use async_trait::async_trait;
use otcore::{DurationMs, FileHandle, FileStore, RevNum, StoreError, Timeouts};
use otcore::FileId;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};

/// In-memory file store.
pub struct MemoryFileStore {
    timeouts: Timeouts,
    files: Mutex<HashMap<FileId, Arc<MemoryFile>>>,
}

impl MemoryFileStore {
    /// Create an empty store with the stock timeout policy.
    pub fn new() -> Self {
        Self::with_timeouts(Timeouts::DEFAULT)
    }

    /// Create an empty store with an explicit timeout policy.
    pub fn with_timeouts(timeouts: Timeouts) -> Self {
        Self {
            timeouts,
            files: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn file(&self, id: &FileId) -> Result<Arc<dyn FileHandle>, StoreError> {
        let mut files = self.files.lock().await;
        let file = files
            .entry(id.clone())
            .or_insert_with(|| Arc::new(MemoryFile::new(id.clone(), self.timeouts)))
            .clone();
        Ok(file)
    }

    async fn exists(&self, id: &FileId) -> Result<bool, StoreError> {
        let files = self.files.lock().await;
        match files.get(id) {
            Some(file) => Ok(!file.changes.read().await.is_empty()),
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &FileId) -> Result<(), StoreError> {
        let removed = self.files.lock().await.remove(id);
        if let Some(file) = removed {
            file.changes.write().await.clear();
            file.notify.notify_waiters();
        }
        Ok(())
    }

    async fn rough_size(&self) -> Result<u64, StoreError> {
        let files = self.files.lock().await;
        let mut total = 0;
        for file in files.values() {
            total += file.changes.read().await.len() as u64;
        }
        Ok(total)
    }
}

/// One in-memory change log.
struct MemoryFile {
    id: FileId,
    timeouts: Timeouts,
    changes: RwLock<Vec<serde_json::Value>>,
    notify: Notify,
}

impl MemoryFile {
    fn new(id: FileId, timeouts: Timeouts) -> Self {
        Self {
            id,
            timeouts,
            changes: RwLock::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    fn current_of(changes: &[serde_json::Value]) -> Option<RevNum> {
        changes.len().checked_sub(1).map(|n| RevNum::new(n as u64))
    }
}

#[async_trait]
impl FileHandle for MemoryFile {
    fn id(&self) -> &FileId {
        &self.id
    }

    async fn exists(&self) -> Result<bool, StoreError> {
        Ok(!self.changes.read().await.is_empty())
    }

    async fn current_rev_num(
        &self,
        _timeout: Option<DurationMs>,
    ) -> Result<Option<RevNum>, StoreError> {
        Ok(Self::current_of(&self.changes.read().await))
    }

    async fn append_change(
        &self,
        rev_num: RevNum,
        change: serde_json::Value,
        _timeout: Option<DurationMs>,
    ) -> Result<bool, StoreError> {
        let mut changes = self.changes.write().await;
        let expected = RevNum::new(changes.len() as u64);
        if rev_num < expected {
            // Another writer appended this revision first.
            return Ok(false);
        }
        if rev_num > expected {
            return Err(StoreError::BadData(format!(
                "append of {rev_num} would leave a gap before {expected}"
            )));
        }
        changes.push(change);
        drop(changes);
        self.notify.notify_waiters();
        Ok(true)
    }

    async fn change_range(
        &self,
        revs: RangeInclusive<RevNum>,
        _timeout: Option<DurationMs>,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let changes = self.changes.read().await;
        let last = *revs.end();
        if last.value() >= changes.len() as u64 {
            return Err(StoreError::RevisionNotAvailable { rev_num: last });
        }
        let first = revs.start().value() as usize;
        Ok(changes[first..=last.value() as usize].to_vec())
    }

    async fn when_rev_num_is_not(
        &self,
        known: Option<RevNum>,
        timeout: Option<DurationMs>,
    ) -> Result<Option<RevNum>, StoreError> {
        let wait = self.timeouts.clamp(timeout);
        let deadline = tokio::time::sleep(wait.to_std());
        tokio::pin!(deadline);
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let current = Self::current_of(&self.changes.read().await);
            if current != known {
                return Ok(current);
            }
            tokio::select! {
                _ = notified => {}
                _ = &mut deadline => return Err(StoreError::TimedOut(wait)),
            }
        }
    }
}
