//! The per-document, per-flavor write coordinator.

use crate::error::DocError;
use otcore::{
    AuthorId, Change, Delta, DurationMs, FileHandle, Flavor, RevNum, Snapshot, StoreError, TimeMs,
};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// How many append attempts one update may make before giving up.
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: usize = 10;

/// Serializes all writes to one flavor of one document's change log
/// and materializes snapshots from it.
///
/// Exactly one update loop is in flight per control at a time; readers
/// work against immutable snapshot values captured before any write
/// and proceed in parallel.
pub struct DocControl<F: Flavor> {
    file: Arc<dyn FileHandle>,
    /// Latest materialized snapshot. May trail the log; always
    /// rebuildable from it.
    cache: RwLock<Snapshot<F>>,
    /// Admits one update loop at a time.
    write_gate: Mutex<()>,
    max_update_attempts: usize,
}

impl<F: Flavor> DocControl<F> {
    /// Open a control over a change log, bootstrapping revision 0
    /// (the initial empty change) when the log is empty.
    pub async fn open(file: Arc<dyn FileHandle>) -> Result<Arc<Self>, DocError> {
        Self::open_with(file, DEFAULT_MAX_UPDATE_ATTEMPTS).await
    }

    /// Open with an explicit retry cap.
    pub async fn open_with(
        file: Arc<dyn FileHandle>,
        max_update_attempts: usize,
    ) -> Result<Arc<Self>, DocError> {
        if file.current_rev_num(None).await?.is_none() {
            let initial = encode_change(&Change::<F>::initial())?;
            // A lost race means another opener bootstrapped first.
            let _ = file.append_change(RevNum::ZERO, initial, None).await?;
        }
        let control = Arc::new(Self {
            file,
            cache: RwLock::new(Snapshot::empty()),
            write_gate: Mutex::new(()),
            max_update_attempts,
        });
        let current = control.current_rev_num().await?;
        let snapshot = control.materialize(current).await?;
        *control.cache.write().await = snapshot;
        Ok(control)
    }

    /// The current revision of the log.
    pub async fn current_rev_num(&self) -> Result<RevNum, DocError> {
        match self.file.current_rev_num(None).await? {
            Some(rev) => Ok(rev),
            None => Err(DocError::Store(StoreError::BadData(format!(
                "change log {} lost its bootstrap change",
                self.file.id()
            )))),
        }
    }

    /// The snapshot at `rev_num`, or at the current revision.
    pub async fn snapshot(&self, rev_num: Option<RevNum>) -> Result<Snapshot<F>, DocError> {
        let cached = self.cache.read().await.clone();
        let target = match rev_num {
            Some(rev) => rev,
            None => self.current_rev_num().await?.max(cached.rev_num()),
        };
        if target == cached.rev_num() {
            return Ok(cached);
        }
        let snapshot = if target > cached.rev_num() {
            // Roll the cache forward over the newer changes.
            let changes = self
                .decode_range(cached.rev_num().next(), target)
                .await?;
            cached.compose_all(changes.iter())?
        } else {
            self.materialize(target).await?
        };
        if snapshot.rev_num() > cached.rev_num() {
            let mut cache = self.cache.write().await;
            if snapshot.rev_num() > cache.rev_num() {
                *cache = snapshot.clone();
            }
        }
        Ok(snapshot)
    }

    /// The core write protocol. Applies `delta` against `base_rev_num`;
    /// when the log has moved past the base, the delta is rebased over
    /// the intervening changes (the log side holds tie priority over
    /// work the client had not seen). Lost append races reload and
    /// retry, bounded by the attempt cap.
    pub async fn update(
        &self,
        base_rev_num: RevNum,
        delta: Delta<F>,
        author_id: Option<AuthorId>,
        timestamp: Option<TimeMs>,
    ) -> Result<Change<F>, DocError> {
        let _gate = self.write_gate.lock().await;
        let mut attempts = 0;
        loop {
            attempts += 1;
            if attempts > self.max_update_attempts {
                warn!(file = %self.file.id(), attempts, "update retry cap hit");
                return Err(DocError::Contention(self.max_update_attempts));
            }
            let current = self.current_rev_num().await?;
            if base_rev_num > current {
                return Err(otcore::OtError::BadUse(format!(
                    "base revision {base_rev_num} is ahead of current {current}"
                ))
                .into());
            }
            let to_apply = if base_rev_num == current {
                delta.clone()
            } else {
                let intervening = self.compose_range(base_rev_num.next(), current).await?;
                delta.rebase(&intervening)?
            };
            let change = Change::new(current.next(), to_apply, timestamp, author_id.clone());
            let encoded = encode_change(&change)?;
            if self.file.append_change(change.rev_num, encoded, None).await? {
                self.roll_cache(&change).await;
                return Ok(change);
            }
            debug!(file = %self.file.id(), rev = %change.rev_num, "append lost the race; retrying");
        }
    }

    /// Block until the log is past `base_rev_num`, then return every
    /// newer change composed into one synthetic change at the current
    /// revision.
    pub async fn delta_after(
        &self,
        base_rev_num: RevNum,
        timeout: Option<DurationMs>,
    ) -> Result<Change<F>, DocError> {
        let mut current = self.current_rev_num().await?;
        if base_rev_num > current {
            return Err(otcore::OtError::BadUse(format!(
                "base revision {base_rev_num} is ahead of current {current}"
            ))
            .into());
        }
        while current <= base_rev_num {
            current = match self
                .file
                .when_rev_num_is_not(Some(current), timeout)
                .await?
            {
                Some(rev) => rev,
                None => continue,
            };
        }
        let delta = self.compose_range(base_rev_num.next(), current).await?;
        Ok(Change::synthetic(current, delta))
    }

    /// Decode the stored changes for an inclusive revision range.
    async fn decode_range(
        &self,
        first: RevNum,
        last: RevNum,
    ) -> Result<Vec<Change<F>>, DocError> {
        let blobs = self.file.change_range(first..=last, None).await?;
        blobs.iter().map(|blob| decode_change(blob)).collect()
    }

    /// Compose a revision range's deltas into one delta.
    async fn compose_range(&self, first: RevNum, last: RevNum) -> Result<Delta<F>, DocError> {
        let changes = self.decode_range(first, last).await?;
        let mut composed = Delta::empty();
        for change in &changes {
            composed = composed.compose(&change.delta, false)?;
        }
        Ok(composed)
    }

    /// Rebuild the snapshot at `rev_num` from the log.
    async fn materialize(&self, rev_num: RevNum) -> Result<Snapshot<F>, DocError> {
        let changes = self.decode_range(RevNum::ZERO, rev_num).await?;
        Ok(Snapshot::empty().compose_all(changes.iter())?)
    }

    /// Advance the cache over a change we just appended.
    async fn roll_cache(&self, change: &Change<F>) {
        let mut cache = self.cache.write().await;
        if change.rev_num == cache.rev_num().next() {
            match cache.compose(change) {
                Ok(next) => *cache = next,
                Err(err) => {
                    // The log accepted a change the snapshot rejects;
                    // leave the cache behind and let readers rebuild.
                    warn!(file = %self.file.id(), %err, "snapshot cache fell behind");
                }
            }
        }
    }
}

fn encode_change<F: Flavor>(change: &Change<F>) -> Result<serde_json::Value, DocError> {
    serde_json::to_value(change)
        .map_err(|e| DocError::Store(StoreError::BadData(format!("unencodable change: {e}"))))
}

fn decode_change<F: Flavor>(blob: &serde_json::Value) -> Result<Change<F>, DocError> {
    serde_json::from_value(blob.clone())
        .map_err(|e| DocError::Store(StoreError::BadData(format!("undecodable change: {e}"))))
}
