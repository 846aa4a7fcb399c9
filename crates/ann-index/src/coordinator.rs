//! Lifecycle coordinator.
//!
//! Owns the Indexing, Saving and Flushing flags and the three exclusion
//! domains built on them:
//!
//! - flush: global and exclusive. While held, mutations, searches, commits
//!   and saves fail fast with `Aborted`. Acquiring it waits for any running
//!   commit or save to finish.
//! - commit: self-exclusive. A second commit fails fast with `Aborted`.
//! - save: self-exclusive but coalescing. A second save waits for the one in
//!   flight and returns its result. A save also waits for a running commit
//!   before it starts.
//!
//! All acquisition goes through RAII guards that release on drop, so a
//! panicking commit or save never leaves a flag stuck.

use std::time::Duration;

use ann_types::AgentError;
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often blocked waiters re-check their cancellation token.
const WAIT_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Flags {
    flushing: bool,
    indexing: bool,
    saving: bool,
    /// Bumped every time a save finishes
    save_round: u64,
    last_save: Option<Result<(), AgentError>>,
}

/// Point-in-time view of the lifecycle flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub indexing: bool,
    pub saving: bool,
    pub flushing: bool,
}

/// Mutual-exclusion authority for commit, save and flush.
#[derive(Debug, Default)]
pub struct LifecycleCoordinator {
    flags: Mutex<Flags>,
    changed: Condvar,
    /// Held shared by every mutation, exclusively by flush
    mutations: RwLock<()>,
}

impl LifecycleCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        let flags = self.flags.lock();
        LifecycleSnapshot {
            indexing: flags.indexing,
            saving: flags.saving,
            flushing: flags.flushing,
        }
    }

    pub fn is_flushing(&self) -> bool {
        self.flags.lock().flushing
    }

    /// Admit one mutation. Fails fast while a flush is running.
    pub fn enter_mutation(&self) -> Result<MutationGuard<'_>, AgentError> {
        if self.is_flushing() {
            return Err(AgentError::FlushingInProgress);
        }
        self.mutations
            .try_read()
            .map(|gate| MutationGuard { _gate: gate })
            .ok_or(AgentError::FlushingInProgress)
    }

    /// Start a flush.
    ///
    /// Fails with `Aborted` if a flush is already running. Otherwise marks
    /// the agent as flushing, waits for any running commit or save, then
    /// blocks new mutations until the guard is dropped.
    pub fn try_begin_flush(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FlushGuard<'_>, AgentError> {
        {
            let mut flags = self.flags.lock();
            if flags.flushing {
                return Err(AgentError::FlushingInProgress);
            }
            flags.flushing = true;

            while flags.indexing || flags.saving {
                if cancel.is_cancelled() {
                    flags.flushing = false;
                    self.changed.notify_all();
                    return Err(AgentError::Canceled);
                }
                debug!(indexing = flags.indexing, saving = flags.saving, "flush waiting");
                self.changed.wait_for(&mut flags, WAIT_TICK);
            }
        }

        let gate = self.mutations.write();
        Ok(FlushGuard {
            coordinator: self,
            _gate: gate,
        })
    }

    /// Start a commit. Fails fast if a flush or another commit is running.
    pub fn try_begin_commit(&self) -> Result<CommitGuard<'_>, AgentError> {
        let mut flags = self.flags.lock();
        if flags.flushing {
            return Err(AgentError::FlushingInProgress);
        }
        if flags.indexing {
            return Err(AgentError::CommitInProgress);
        }
        flags.indexing = true;
        Ok(CommitGuard { coordinator: self })
    }

    /// Start or join a save.
    ///
    /// If a save is already running, waits for it and returns
    /// [`SaveTicket::Joined`] with its result. Otherwise waits for any
    /// running commit and returns [`SaveTicket::Leader`].
    pub fn begin_save(&self, cancel: &CancellationToken) -> Result<SaveTicket<'_>, AgentError> {
        let mut flags = self.flags.lock();
        loop {
            if flags.flushing {
                return Err(AgentError::FlushingInProgress);
            }
            if cancel.is_cancelled() {
                return Err(AgentError::Canceled);
            }

            if flags.saving {
                let round = flags.save_round;
                while flags.save_round == round {
                    if cancel.is_cancelled() {
                        return Err(AgentError::Canceled);
                    }
                    self.changed.wait_for(&mut flags, WAIT_TICK);
                }
                let result = flags.last_save.clone().unwrap_or(Ok(()));
                return Ok(SaveTicket::Joined(result));
            }

            if !flags.indexing {
                break;
            }
            debug!("save waiting for running commit");
            self.changed.wait_for(&mut flags, WAIT_TICK);
        }

        flags.saving = true;
        Ok(SaveTicket::Leader(SaveGuard {
            coordinator: self,
            result: None,
        }))
    }

    fn release(&self, update: impl FnOnce(&mut Flags)) {
        let mut flags = self.flags.lock();
        update(&mut flags);
        self.changed.notify_all();
    }
}

/// Shared admission for one mutation.
pub struct MutationGuard<'a> {
    _gate: RwLockReadGuard<'a, ()>,
}

/// Held for the duration of a flush.
pub struct FlushGuard<'a> {
    coordinator: &'a LifecycleCoordinator,
    _gate: RwLockWriteGuard<'a, ()>,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.release(|flags| flags.flushing = false);
    }
}

/// Held for the duration of a commit. `Indexing` is true while it lives.
pub struct CommitGuard<'a> {
    coordinator: &'a LifecycleCoordinator,
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.release(|flags| flags.indexing = false);
    }
}

/// Outcome of [`LifecycleCoordinator::begin_save`].
pub enum SaveTicket<'a> {
    /// This caller performs the save
    Leader(SaveGuard<'a>),
    /// Another save was in flight; this is its result
    Joined(Result<(), AgentError>),
}

/// Held by the saving caller. `Saving` is true while it lives.
pub struct SaveGuard<'a> {
    coordinator: &'a LifecycleCoordinator,
    result: Option<Result<(), AgentError>>,
}

impl SaveGuard<'_> {
    /// Publish the save result to joined waiters and release the lock.
    pub fn finish(mut self, result: Result<(), AgentError>) -> Result<(), AgentError> {
        self.result = Some(result.clone());
        result
    }
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        let result = self
            .result
            .take()
            .unwrap_or_else(|| Err(AgentError::Internal("save did not complete".to_string())));
        self.coordinator.release(|flags| {
            flags.saving = false;
            flags.save_round += 1;
            flags.last_save = Some(result);
        });
    }
}
