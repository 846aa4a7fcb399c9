//! Pending-operation queue.
//!
//! Holds at most one not-yet-committed operation per object id. A later push
//! for the same id replaces the earlier one regardless of embedded
//! timestamps. Every push is stamped with an arrival sequence number so the
//! committer can retire exactly the operations it applied and leave newer
//! arrivals in place.

use std::sync::atomic::{AtomicU64, Ordering};

use ann_types::PendingOperation;
use dashmap::DashMap;

/// An operation together with its arrival sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOperation {
    pub seq: u64,
    pub op: PendingOperation,
}

/// Sharded map of pending operations keyed by object id.
#[derive(Debug, Default)]
pub struct VectorQueue {
    entries: DashMap<String, QueuedOperation>,
    next_seq: AtomicU64,
}

impl VectorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `op`, replacing any pending operation for the same id.
    /// Returns the arrival sequence number.
    pub fn push(&self, op: PendingOperation) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(op.id.clone(), QueuedOperation { seq, op });
        seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending operation for `id`, if any.
    pub fn peek(&self, id: &str) -> Option<PendingOperation> {
        self.entries.get(id).map(|entry| entry.op.clone())
    }

    /// Snapshot of all pending operations in arrival order.
    pub fn pending(&self) -> Vec<QueuedOperation> {
        let mut ops: Vec<QueuedOperation> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        ops.sort_by_key(|q| q.seq);
        ops
    }

    /// Remove the operation for `id` only if it is still the one pushed with
    /// `seq`. Returns true if it was removed.
    pub fn retire(&self, id: &str, seq: u64) -> bool {
        self.entries.remove_if(id, |_, queued| queued.seq == seq).is_some()
    }

    /// Remove and return every pending operation in arrival order.
    ///
    /// Callers must keep concurrent pushes out for the result to be a
    /// consistent cut of the queue.
    pub fn drain(&self) -> Vec<PendingOperation> {
        let drained = self.pending();
        for queued in &drained {
            self.retire(&queued.op.id, queued.seq);
        }
        drained.into_iter().map(|q| q.op).collect()
    }
}
