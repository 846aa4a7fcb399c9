//! Save: write the committed state to the snapshot directory.

use std::sync::atomic::Ordering;

use ann_types::{AgentError, ErrorKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::Agent;
use crate::coordinator::SaveTicket;
use crate::snapshot::SnapshotLayout;

impl Agent {
    /// Persist the committed state.
    ///
    /// A no-op in memory mode. A save requested while another is running
    /// waits for it and returns its result instead of writing again.
    pub fn save(&self, cancel: &CancellationToken) -> Result<(), AgentError> {
        let Some(layout) = &self.layout else {
            debug!("In-memory mode, skipping save");
            return Ok(());
        };

        match self.coordinator.begin_save(cancel)? {
            SaveTicket::Joined(result) => {
                debug!("Joined in-flight save");
                result
            }
            SaveTicket::Leader(guard) => {
                let result = self.write_snapshot(layout);
                guard.finish(result)
            }
        }
    }

    /// Commit, then save. An empty queue does not prevent the save.
    pub fn commit_and_save(
        &self,
        cancel: &CancellationToken,
        pool_size: u32,
    ) -> Result<(), AgentError> {
        match self.commit(cancel, pool_size) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::FailedPrecondition => {
                debug!("Nothing to commit, saving current index");
            }
            Err(e) => return Err(e),
        }
        self.save(cancel)
    }

    fn write_snapshot(&self, layout: &SnapshotLayout) -> Result<(), AgentError> {
        let state = self.state.read();
        let generation = self.generation.load(Ordering::SeqCst);
        if self.last_saved_generation.load(Ordering::SeqCst) == generation
            && SnapshotLayout::has_data(&layout.origin())
        {
            debug!(generation, "Committed state unchanged since last save, skipping write");
            return Ok(());
        }

        info!(copy_on_write = self.config.copy_on_write, "Save started");
        let written = layout
            .write(state.store.as_ref(), &state.idmap, self.config.copy_on_write)
            .map_err(AgentError::internal)?;
        drop(state);

        self.last_saved_generation.store(generation, Ordering::SeqCst);
        self.save_count.fetch_add(1, Ordering::SeqCst);
        info!(records = written, path = ?layout.origin(), "Save finished");
        Ok(())
    }
}
