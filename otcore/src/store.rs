//! The file-store protocol — how per-document change logs persist.
//!
//! A file is an append-only, ordered log of encoded changes plus a
//! pointer to the current revision. Changes cross this boundary as
//! encoded JSON values; the typed encode/decode happens in the layer
//! above, which also materializes snapshots from the log.
//!
//! Implementations:
//! - MemoryFileStore: HashMap-backed (testing, caret state)
//! - FsFileStore: one directory per file, one JSON file per change

use crate::error::StoreError;
use crate::id::FileId;
use crate::rev::RevNum;
use crate::time::DurationMs;
use async_trait::async_trait;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// A collection of append-only change-log files.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// The handle for a file id. Handles are created on demand and
    /// cached: concurrent calls for the same id observe the same
    /// handle, and getting a handle does not create the file on disk —
    /// use [`FileHandle::exists`] to probe.
    async fn file(&self, id: &FileId) -> Result<Arc<dyn FileHandle>, StoreError>;

    /// Whether the file has any stored state.
    async fn exists(&self, id: &FileId) -> Result<bool, StoreError>;

    /// Remove a file and its whole history. No-op when absent.
    async fn remove(&self, id: &FileId) -> Result<(), StoreError>;

    /// A rough measure of how much the store holds, for load
    /// assessment. Units are store-specific; only the configured
    /// heavy-load threshold gives them meaning.
    async fn rough_size(&self) -> Result<u64, StoreError>;
}

/// One append-only change log.
///
/// Revisions are dense: the change at revision `r` becomes visible
/// only through a successful append of revision `r = previous + 1`,
/// and once visible is never mutated or reordered.
#[async_trait]
pub trait FileHandle: Send + Sync {
    /// The file id this handle addresses.
    fn id(&self) -> &FileId;

    /// Whether the file has any stored state.
    async fn exists(&self) -> Result<bool, StoreError>;

    /// The current revision, or `None` before the first append.
    async fn current_rev_num(&self, timeout: Option<DurationMs>)
    -> Result<Option<RevNum>, StoreError>;

    /// Append the change producing `rev_num`. Returns `true` on
    /// success and `false` *only* when another writer appended a
    /// change with the same target revision first; all other failures
    /// are errors.
    async fn append_change(
        &self,
        rev_num: RevNum,
        change: serde_json::Value,
        timeout: Option<DurationMs>,
    ) -> Result<bool, StoreError>;

    /// The stored changes for an inclusive revision range, in order.
    /// Fails with [`StoreError::RevisionNotAvailable`] when any
    /// requested revision is not retained.
    async fn change_range(
        &self,
        revs: RangeInclusive<RevNum>,
        timeout: Option<DurationMs>,
    ) -> Result<Vec<serde_json::Value>, StoreError>;

    /// Block until the current revision is no longer `known`, then
    /// return the new current revision. Subscribers use this to await
    /// new revisions.
    async fn when_rev_num_is_not(
        &self,
        known: Option<RevNum>,
        timeout: Option<DurationMs>,
    ) -> Result<Option<RevNum>, StoreError>;
}

/// Timeout policy for blocking store operations.
///
/// Every blocking op accepts an optional millisecond timeout, clamped
/// into `[min, max]`; `None` means the configured max, but never
/// longer than one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Shortest accepted wait.
    pub min: DurationMs,
    /// Longest accepted wait, and the default.
    pub max: DurationMs,
}

impl Timeouts {
    /// The stock policy: 100 ms to 10 minutes.
    pub const DEFAULT: Self = Self {
        min: DurationMs::from_millis(100),
        max: DurationMs::from_secs(600),
    };

    /// Resolve a caller-supplied timeout against this policy.
    pub fn clamp(&self, timeout: Option<DurationMs>) -> DurationMs {
        let max = self.max.min(DurationMs::ONE_DAY);
        match timeout {
            None => max,
            Some(t) => t.clamp(self.min, max),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::DEFAULT
    }
}
