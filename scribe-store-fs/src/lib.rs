#![deny(missing_docs)]
//! Filesystem-backed implementation of otcore's file-store protocol.
//!
//! Each file id maps to a directory under the root (the id is
//! percent-encoded into a safe directory name). Each change is one
//! `<rev>.json` inside that directory, claimed with `create_new` so
//! that two writers racing on the same revision resolve atomically:
//! exactly one append wins, the other observes the lost race.
//!
//! Directory layout:
//! ```text
//! root/
//!   <encoded-file-id>/
//!     0.json
//!     1.json
//!     …
//! ```

use async_trait::async_trait;
use otcore::{DurationMs, FileHandle, FileId, FileStore, RevNum, StoreError, Timeouts};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify, RwLock};

/// Filesystem file store.
pub struct FsFileStore {
    root: PathBuf,
    timeouts: Timeouts,
    files: Mutex<HashMap<FileId, Arc<FsFile>>>,
}

impl FsFileStore {
    /// Create a store rooted at the given directory. The directory is
    /// created lazily on first append.
    pub fn new(root: &Path) -> Self {
        Self::with_timeouts(root, Timeouts::DEFAULT)
    }

    /// Create a store with an explicit timeout policy.
    pub fn with_timeouts(root: &Path, timeouts: Timeouts) -> Self {
        Self {
            root: root.to_path_buf(),
            timeouts,
            files: Mutex::new(HashMap::new()),
        }
    }

    fn dir_for(&self, id: &FileId) -> PathBuf {
        self.root.join(encode_file_id(id))
    }
}

/// Encode a file id into a safe directory name.
fn encode_file_id(id: &FileId) -> String {
    let mut encoded = String::new();
    for ch in id.as_str().chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => encoded.push(ch),
            _ => {
                for byte in ch.to_string().as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    encoded
}

/// Parse a change file name back into its revision number.
fn rev_of_entry(name: &str) -> Option<RevNum> {
    name.strip_suffix(".json")?.parse().ok().map(RevNum::new)
}

/// Scan a change directory for the highest stored revision.
async fn scan_current(dir: &Path) -> Result<Option<RevNum>, StoreError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(e)),
    };
    let mut current = None;
    while let Some(entry) = entries.next_entry().await.map_err(StoreError::io)? {
        if let Some(rev) = entry.file_name().to_str().and_then(rev_of_entry) {
            if current.is_none_or(|seen| rev > seen) {
                current = Some(rev);
            }
        }
    }
    Ok(current)
}

#[async_trait]
impl FileStore for FsFileStore {
    async fn file(&self, id: &FileId) -> Result<Arc<dyn FileHandle>, StoreError> {
        let mut files = self.files.lock().await;
        if let Some(file) = files.get(id) {
            return Ok(file.clone());
        }
        let dir = self.dir_for(id);
        let current = scan_current(&dir).await?;
        let file = Arc::new(FsFile {
            id: id.clone(),
            dir,
            timeouts: self.timeouts,
            current: RwLock::new(current),
            notify: Notify::new(),
        });
        files.insert(id.clone(), file.clone());
        Ok(file)
    }

    async fn exists(&self, id: &FileId) -> Result<bool, StoreError> {
        match tokio::fs::metadata(self.dir_for(id)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(e)),
        }
    }

    async fn remove(&self, id: &FileId) -> Result<(), StoreError> {
        let removed = self.files.lock().await.remove(id);
        match tokio::fs::remove_dir_all(self.dir_for(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(e)),
        }
        if let Some(file) = removed {
            *file.current.write().await = None;
            file.notify.notify_waiters();
        }
        Ok(())
    }

    async fn rough_size(&self) -> Result<u64, StoreError> {
        let mut dirs = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::io(e)),
        };
        let mut total = 0;
        while let Some(dir) = dirs.next_entry().await.map_err(StoreError::io)? {
            let mut entries = match tokio::fs::read_dir(dir.path()).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await.map_err(StoreError::io)? {
                if let Ok(meta) = entry.metadata().await {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }
}

/// One on-disk change log.
struct FsFile {
    id: FileId,
    dir: PathBuf,
    timeouts: Timeouts,
    /// Cached current revision. This process is the only writer, so
    /// the cache is authoritative after the open-time scan.
    current: RwLock<Option<RevNum>>,
    notify: Notify,
}

impl FsFile {
    fn change_path(&self, rev_num: RevNum) -> PathBuf {
        self.dir.join(format!("{}.json", rev_num.value()))
    }
}

#[async_trait]
impl FileHandle for FsFile {
    fn id(&self) -> &FileId {
        &self.id
    }

    async fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.current.read().await.is_some())
    }

    async fn current_rev_num(
        &self,
        _timeout: Option<DurationMs>,
    ) -> Result<Option<RevNum>, StoreError> {
        Ok(*self.current.read().await)
    }

    async fn append_change(
        &self,
        rev_num: RevNum,
        change: serde_json::Value,
        _timeout: Option<DurationMs>,
    ) -> Result<bool, StoreError> {
        let mut current = self.current.write().await;
        let expected = RevNum::after(*current);
        if rev_num < expected {
            return Ok(false);
        }
        if rev_num > expected {
            return Err(StoreError::BadData(format!(
                "append of {rev_num} would leave a gap before {expected}"
            )));
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(StoreError::io)?;
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.change_path(rev_num))
            .await
        {
            Ok(file) => file,
            // Another writer (or an earlier run) claimed this revision.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                *current = Some(rev_num);
                return Ok(false);
            }
            Err(e) => return Err(StoreError::io(e)),
        };
        let bytes =
            serde_json::to_vec_pretty(&change).map_err(|e| StoreError::BadData(e.to_string()))?;
        file.write_all(&bytes).await.map_err(StoreError::io)?;
        file.flush().await.map_err(StoreError::io)?;
        *current = Some(rev_num);
        drop(current);
        self.notify.notify_waiters();
        Ok(true)
    }

    async fn change_range(
        &self,
        revs: RangeInclusive<RevNum>,
        _timeout: Option<DurationMs>,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let mut changes = Vec::new();
        let mut rev = *revs.start();
        loop {
            if rev > *revs.end() {
                break;
            }
            let contents = match tokio::fs::read(self.change_path(rev)).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(StoreError::RevisionNotAvailable { rev_num: rev });
                }
                Err(e) => return Err(StoreError::io(e)),
            };
            let change = serde_json::from_slice(&contents)
                .map_err(|e| StoreError::BadData(format!("change {rev} of {}: {e}", self.id)))?;
            changes.push(change);
            rev = rev.next();
        }
        Ok(changes)
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
            let current = *self.current.read().await;
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
