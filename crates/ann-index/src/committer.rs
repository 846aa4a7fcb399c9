//! Commit: merge pending operations into the committed store.

use std::sync::atomic::Ordering;

use ann_types::AgentError;
use ann_vector::QueuedOperation;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{Agent, IndexState};

/// Counters for one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Inserts and updates written to the store
    pub inserted: usize,
    pub deleted: usize,
    /// Operations discarded because their vector had the wrong dimension
    pub dropped: usize,
    /// Deletes for ids that were never committed
    pub skipped: usize,
}

impl CommitStats {
    fn merge(&mut self, other: CommitStats) {
        self.inserted += other.inserted;
        self.deleted += other.deleted;
        self.dropped += other.dropped;
        self.skipped += other.skipped;
    }
}

impl Agent {
    /// Apply every pending operation to the store and id map.
    ///
    /// `pool_size` bounds how many operations are applied per store batch;
    /// 0 selects the configured default. Fails with `FailedPrecondition` when
    /// nothing is pending and with `Aborted` while a flush or another commit
    /// is running.
    pub fn commit(
        &self,
        cancel: &CancellationToken,
        pool_size: u32,
    ) -> Result<CommitStats, AgentError> {
        if self.queue.is_empty() {
            return Err(AgentError::UncommittedIndexNotFound);
        }
        let _commit = self.coordinator.try_begin_commit()?;

        let pending = self.queue.pending();
        if pending.is_empty() {
            return Err(AgentError::UncommittedIndexNotFound);
        }

        let batch = match pool_size {
            0 => self.config.default_pool_size,
            n => n,
        }
        .max(1) as usize;

        info!(uncommitted = pending.len(), batch, "Commit started");

        let mut stats = CommitStats::default();
        for chunk in pending.chunks(batch) {
            if cancel.is_cancelled() {
                info!(?stats, "Commit canceled");
                return Err(AgentError::Canceled);
            }

            let applied = {
                let mut state = self.state.write();
                let applied = apply(&mut state, chunk);
                // A failed chunk may still have removed entries
                self.generation.fetch_add(1, Ordering::SeqCst);
                applied?
            };
            stats.merge(applied);

            for queued in chunk {
                self.queue.retire(&queued.op.id, queued.seq);
            }
        }

        self.commit_count.fetch_add(1, Ordering::SeqCst);
        info!(
            inserted = stats.inserted,
            deleted = stats.deleted,
            dropped = stats.dropped,
            uncommitted = self.queue.len(),
            "Commit finished"
        );
        Ok(stats)
    }
}

/// Apply one chunk under the state write lock.
fn apply(state: &mut IndexState, chunk: &[QueuedOperation]) -> Result<CommitStats, AgentError> {
    let dimension = state.store.dimension();
    let mut stats = CommitStats::default();
    let mut upserts: Vec<(u64, &str, &[f32], i64)> = Vec::new();

    for queued in chunk {
        let op = &queued.op;
        match &op.vector {
            None => match state.idmap.remove(&op.id) {
                Some(entry) => {
                    state.store.remove(entry.handle).map_err(AgentError::internal)?;
                    stats.deleted += 1;
                }
                None => {
                    debug!(id = %op.id, "Delete target not committed, skipping");
                    stats.skipped += 1;
                }
            },
            Some(vector) if vector.len() != dimension => {
                warn!(
                    id = %op.id,
                    expected = dimension,
                    actual = vector.len(),
                    "Dropping operation with invalid dimension"
                );
                // The replaced vector goes too
                if let Some(entry) = state.idmap.remove(&op.id) {
                    state.store.remove(entry.handle).map_err(AgentError::internal)?;
                }
                stats.dropped += 1;
            }
            Some(vector) => {
                let handle = state.idmap.handle_for(&op.id);
                upserts.push((handle, op.id.as_str(), vector.as_slice(), op.timestamp));
            }
        }
    }

    if upserts.is_empty() {
        return Ok(stats);
    }

    let batch: Vec<(u64, &[f32])> = upserts.iter().map(|(h, _, v, _)| (*h, *v)).collect();
    if let Err(e) = state.store.add_batch(&batch) {
        // Replaced vectors may already be gone from the store
        let orphans: Vec<String> = state
            .idmap
            .entries()
            .into_iter()
            .filter(|(_, entry)| !state.store.contains(entry.handle))
            .map(|(id, _)| id)
            .collect();
        for id in orphans {
            state.idmap.remove(&id);
        }
        return Err(AgentError::internal(e));
    }

    for (handle, id, _, timestamp) in &upserts {
        state.idmap.insert(id, *handle, *timestamp);
    }
    stats.inserted = upserts.len();
    Ok(stats)
}
