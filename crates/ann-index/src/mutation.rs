//! Mutation acceptance: validate, check existence, queue.
//!
//! Nothing here touches the store directly. Accepted operations go into the
//! queue and become visible to similarity search after the next commit.

use ann_types::{
    resolve_timestamp, AgentError, ExistenceCheck, InsertConfig, InsertRequest, Location,
    PendingOperation, RemoveConfig, RemoveRequest, UpdateConfig, UpdateRequest, UpsertConfig,
    UpsertRequest, VectorRecord,
};
use tracing::debug;

use crate::agent::Agent;

/// Result of a multi-record mutation.
///
/// Records are processed independently; `locations` holds the accepted
/// ones and `error` joins every per-record failure.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub locations: Vec<Location>,
    pub error: Option<AgentError>,
}

impl BatchOutcome {
    fn collect<I>(results: I) -> Self
    where
        I: IntoIterator<Item = Result<Location, AgentError>>,
    {
        let mut locations = Vec::new();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(location) => locations.push(location),
                Err(e) => errors.push(e),
            }
        }
        Self {
            locations,
            error: AgentError::join(errors),
        }
    }

    /// All locations, or the joined error if any record failed.
    pub fn into_result(self) -> Result<Vec<Location>, AgentError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.locations),
        }
    }
}

impl Agent {
    fn validate_id(id: &str) -> Result<(), AgentError> {
        if id.is_empty() {
            return Err(AgentError::EmptyId);
        }
        Ok(())
    }

    fn validate_vector(&self, id: &str, vector: &[f32]) -> Result<(), AgentError> {
        if vector.len() != self.config.dimension {
            return Err(AgentError::InvalidDimension {
                id: id.to_string(),
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Queue an insert.
    ///
    /// With the strict existence check (the default) an id that is already
    /// committed or pending fails with `AlreadyExists`.
    pub fn insert(
        &self,
        id: &str,
        vector: Vec<f32>,
        config: &InsertConfig,
    ) -> Result<Location, AgentError> {
        Self::validate_id(id)?;
        self.validate_vector(id, &vector)?;
        let _gate = self.coordinator.enter_mutation()?;

        let check = ExistenceCheck::from_skip_flag(config.skip_strict_exist_check);
        if check == ExistenceCheck::Strict && self.exists_inner(id) {
            return Err(AgentError::AlreadyExists { id: id.to_string() });
        }

        let timestamp = resolve_timestamp(config.timestamp);
        self.queue
            .push(PendingOperation::insert(id, vector, timestamp, check));
        debug!(id, timestamp, "Insert queued");
        Ok(self.location(id))
    }

    /// Queue an update of an existing record.
    ///
    /// An absent id fails with `NotFound` unless the strict check is skipped,
    /// in which case the update becomes an insert. An identical vector fails
    /// with `AlreadyExists` unless `update_timestamp_if_exists` is set and
    /// the new timestamp is newer.
    pub fn update(
        &self,
        id: &str,
        vector: Vec<f32>,
        config: &UpdateConfig,
    ) -> Result<Location, AgentError> {
        Self::validate_id(id)?;
        self.validate_vector(id, &vector)?;
        let _gate = self.coordinator.enter_mutation()?;

        let check = ExistenceCheck::from_skip_flag(config.skip_strict_exist_check);
        let timestamp = resolve_timestamp(config.timestamp);
        let current = match self.get_object(id) {
            Ok(record) => Some(record),
            Err(AgentError::ObjectNotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let op = match current {
            None if check == ExistenceCheck::Strict => {
                return Err(AgentError::ObjectNotFound { id: id.to_string() });
            }
            None => PendingOperation::insert(id, vector, timestamp, check),
            Some(current) => {
                Self::check_changed(&current, &vector, timestamp, config.update_timestamp_if_exists)?;
                PendingOperation::update(id, vector, timestamp, check)
            }
        };

        self.queue.push(op);
        debug!(id, timestamp, "Update queued");
        Ok(self.location(id))
    }

    fn check_changed(
        current: &VectorRecord,
        vector: &[f32],
        timestamp: i64,
        update_timestamp_if_exists: bool,
    ) -> Result<(), AgentError> {
        if current.vector != vector {
            return Ok(());
        }
        if update_timestamp_if_exists && timestamp > current.timestamp {
            return Ok(());
        }
        Err(AgentError::AlreadyExists {
            id: current.id.clone(),
        })
    }

    /// Queue an update if the id is committed, otherwise an insert.
    ///
    /// A record that is only pending counts as absent, and so does a
    /// committed record with a pending delete.
    pub fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        config: &UpsertConfig,
    ) -> Result<Location, AgentError> {
        Self::validate_id(id)?;
        self.validate_vector(id, &vector)?;

        let pending_delete = self.queue.peek(id).is_some_and(|op| op.is_delete());
        let committed = !pending_delete && self.state.read().idmap.contains(id);

        if committed {
            self.update(
                id,
                vector,
                &UpdateConfig {
                    skip_strict_exist_check: true,
                    timestamp: config.timestamp,
                    update_timestamp_if_exists: false,
                },
            )
        } else {
            self.insert(
                id,
                vector,
                &InsertConfig {
                    skip_strict_exist_check: true,
                    timestamp: config.timestamp,
                },
            )
        }
    }

    /// Queue a delete.
    ///
    /// With the strict check an id that is neither committed nor pending
    /// fails with `NotFound`.
    pub fn remove(&self, id: &str, config: &RemoveConfig) -> Result<Location, AgentError> {
        Self::validate_id(id)?;
        let _gate = self.coordinator.enter_mutation()?;

        if !config.skip_strict_exist_check && !self.exists_inner(id) {
            return Err(AgentError::ObjectNotFound { id: id.to_string() });
        }

        let timestamp = resolve_timestamp(config.timestamp);
        self.queue.push(PendingOperation::delete(id, timestamp));
        debug!(id, timestamp, "Delete queued");
        Ok(self.location(id))
    }

    /// Change only the timestamp of a record.
    ///
    /// Without `force` the new timestamp must be newer than the current one.
    pub fn update_timestamp(
        &self,
        id: &str,
        timestamp: i64,
        force: bool,
    ) -> Result<Location, AgentError> {
        Self::validate_id(id)?;
        let _gate = self.coordinator.enter_mutation()?;

        let current = self.get_object(id)?;
        let timestamp = resolve_timestamp(timestamp);
        if !force && timestamp <= current.timestamp {
            return Err(AgentError::NewerTimestampExists {
                id: id.to_string(),
                current: current.timestamp,
                requested: timestamp,
            });
        }

        self.queue.push(PendingOperation::update(
            id,
            current.vector,
            timestamp,
            ExistenceCheck::Strict,
        ));
        debug!(id, timestamp, "Timestamp update queued");
        Ok(self.location(id))
    }

    pub fn multi_insert(&self, requests: Vec<InsertRequest>) -> BatchOutcome {
        BatchOutcome::collect(
            requests
                .into_iter()
                .map(|req| self.insert(&req.id, req.vector, &req.config)),
        )
    }

    pub fn multi_update(&self, requests: Vec<UpdateRequest>) -> BatchOutcome {
        BatchOutcome::collect(
            requests
                .into_iter()
                .map(|req| self.update(&req.id, req.vector, &req.config)),
        )
    }

    pub fn multi_upsert(&self, requests: Vec<UpsertRequest>) -> BatchOutcome {
        BatchOutcome::collect(
            requests
                .into_iter()
                .map(|req| self.upsert(&req.id, req.vector, &req.config)),
        )
    }

    pub fn multi_remove(&self, requests: Vec<RemoveRequest>) -> BatchOutcome {
        BatchOutcome::collect(
            requests
                .into_iter()
                .map(|req| self.remove(&req.id, &req.config)),
        )
    }
}
