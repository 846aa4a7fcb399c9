//! Agent RPC handlers.
//!
//! Every call into the agent may wait on lifecycle locks, so it runs on the
//! blocking pool. Lifecycle RPCs get a cancellation token that fires if the
//! client goes away. Searches honour the deadline in their config.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use ann_index::Agent;
use ann_scheduler::JobRegistry;
use ann_types::{AgentError, Neighbor, SearchConfig};
use futures::Stream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use crate::convert;
use crate::pb::{self, agent_server::Agent as AgentRpc};
use crate::status::to_status;

type SearchFn<Q> = fn(&Agent, &Q, &SearchConfig) -> Result<Vec<Neighbor>, AgentError>;

/// Run an agent call on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, AgentError>
where
    F: FnOnce() -> Result<T, AgentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AgentError::internal(format!("agent task failed: {}", e)))?
}

/// Bound `fut` by the request deadline, if any.
async fn within<T, Fut>(timeout: Option<Duration>, fut: Fut) -> Result<T, AgentError>
where
    Fut: Future<Output = Result<T, AgentError>>,
{
    let Some(timeout) = timeout else {
        return fut.await;
    };
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or(Err(AgentError::DeadlineExceeded))
}

fn search_vector(
    agent: &Agent,
    query: &Vec<f32>,
    config: &SearchConfig,
) -> Result<Vec<Neighbor>, AgentError> {
    agent.search(query, config)
}

fn linear_search_vector(
    agent: &Agent,
    query: &Vec<f32>,
    config: &SearchConfig,
) -> Result<Vec<Neighbor>, AgentError> {
    agent.linear_search(query, config)
}

fn search_id(
    agent: &Agent,
    id: &String,
    config: &SearchConfig,
) -> Result<Vec<Neighbor>, AgentError> {
    agent.search_by_id(id, config)
}

fn linear_search_id(
    agent: &Agent,
    id: &String,
    config: &SearchConfig,
) -> Result<Vec<Neighbor>, AgentError> {
    agent.linear_search_by_id(id, config)
}

/// gRPC front end for one [`Agent`].
pub struct AgentServiceImpl {
    agent: Arc<Agent>,
    registry: Option<Arc<JobRegistry>>,
}

impl AgentServiceImpl {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self {
            agent,
            registry: None,
        }
    }

    /// Expose the scheduler's job statuses through GetSchedulerStatus.
    pub fn with_registry(agent: Arc<Agent>, registry: Arc<JobRegistry>) -> Self {
        Self {
            agent,
            registry: Some(registry),
        }
    }

    async fn call<T, F>(&self, f: F) -> Result<T, Status>
    where
        F: FnOnce(&Agent) -> Result<T, AgentError> + Send + 'static,
        T: Send + 'static,
    {
        let agent = self.agent.clone();
        run_blocking(move || f(&agent)).await.map_err(to_status)
    }

    /// Lifecycle call that is canceled if the request future is dropped.
    async fn call_cancelable<T, F>(&self, f: F) -> Result<T, Status>
    where
        F: FnOnce(&Agent, &CancellationToken) -> Result<T, AgentError> + Send + 'static,
        T: Send + 'static,
    {
        let agent = self.agent.clone();
        let cancel = CancellationToken::new();
        let _on_drop = cancel.clone().drop_guard();
        run_blocking(move || f(&agent, &cancel))
            .await
            .map_err(to_status)
    }

    async fn single_search<Q>(
        &self,
        query: Q,
        config: SearchConfig,
        search: SearchFn<Q>,
    ) -> Result<pb::SearchResponse, Status>
    where
        Q: Send + 'static,
    {
        let agent = self.agent.clone();
        let timeout = config.timeout;
        let request_id = config.request_id.clone();
        let hits = within(timeout, run_blocking(move || search(&agent, &query, &config)))
            .await
            .map_err(to_status)?;
        Ok(convert::search_response(request_id, hits))
    }

    /// Run every query concurrently. Responses keep request order; any
    /// failure fails the whole call with all failures joined.
    async fn multi_search<Q>(
        &self,
        queries: Vec<(Q, SearchConfig)>,
        search: SearchFn<Q>,
    ) -> Result<pb::SearchResponses, Status>
    where
        Q: Send + 'static,
    {
        let total = queries.len();
        let mut tasks = JoinSet::new();
        for (index, (query, config)) in queries.into_iter().enumerate() {
            let agent = self.agent.clone();
            tasks.spawn(async move {
                let request_id = config.request_id.clone();
                let timeout = config.timeout;
                let result =
                    within(timeout, run_blocking(move || search(&agent, &query, &config))).await;
                (index, request_id, result)
            });
        }

        let mut responses: Vec<Option<pb::SearchResponse>> = vec![None; total];
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, request_id, Ok(hits))) => {
                    responses[index] = Some(convert::search_response(request_id, hits));
                }
                Ok((_, _, Err(e))) => errors.push(e),
                Err(e) => errors.push(AgentError::internal(format!("search task failed: {}", e))),
            }
        }

        if let Some(err) = AgentError::join(errors) {
            debug!(total, error = %err, "Multi search failed");
            return Err(to_status(err));
        }
        Ok(pb::SearchResponses {
            responses: responses.into_iter().flatten().collect(),
        })
    }
}

#[tonic::async_trait]
impl AgentRpc for AgentServiceImpl {
    async fn insert(
        &self,
        request: Request<pb::InsertRequest>,
    ) -> Result<Response<pb::Location>, Status> {
        let req = convert::insert_request(request.into_inner()).map_err(to_status)?;
        let location = self
            .call(move |agent| agent.insert(&req.id, req.vector, &req.config))
            .await?;
        Ok(Response::new(location.into()))
    }

    async fn multi_insert(
        &self,
        request: Request<pb::MultiInsertRequest>,
    ) -> Result<Response<pb::Locations>, Status> {
        let reqs =
            convert::batch(request.into_inner().requests, convert::insert_request).map_err(to_status)?;
        let locations = self
            .call(move |agent| agent.multi_insert(reqs).into_result())
            .await?;
        Ok(Response::new(convert::locations(locations)))
    }

    async fn update(
        &self,
        request: Request<pb::UpdateRequest>,
    ) -> Result<Response<pb::Location>, Status> {
        let req = convert::update_request(request.into_inner()).map_err(to_status)?;
        let location = self
            .call(move |agent| agent.update(&req.id, req.vector, &req.config))
            .await?;
        Ok(Response::new(location.into()))
    }

    async fn multi_update(
        &self,
        request: Request<pb::MultiUpdateRequest>,
    ) -> Result<Response<pb::Locations>, Status> {
        let reqs =
            convert::batch(request.into_inner().requests, convert::update_request).map_err(to_status)?;
        let locations = self
            .call(move |agent| agent.multi_update(reqs).into_result())
            .await?;
        Ok(Response::new(convert::locations(locations)))
    }

    async fn update_timestamp(
        &self,
        request: Request<pb::UpdateTimestampRequest>,
    ) -> Result<Response<pb::Location>, Status> {
        let req = request.into_inner();
        let location = self
            .call(move |agent| agent.update_timestamp(&req.id, req.timestamp, req.force))
            .await?;
        Ok(Response::new(location.into()))
    }

    async fn upsert(
        &self,
        request: Request<pb::UpsertRequest>,
    ) -> Result<Response<pb::Location>, Status> {
        let req = convert::upsert_request(request.into_inner()).map_err(to_status)?;
        let location = self
            .call(move |agent| agent.upsert(&req.id, req.vector, &req.config))
            .await?;
        Ok(Response::new(location.into()))
    }

    async fn multi_upsert(
        &self,
        request: Request<pb::MultiUpsertRequest>,
    ) -> Result<Response<pb::Locations>, Status> {
        let reqs =
            convert::batch(request.into_inner().requests, convert::upsert_request).map_err(to_status)?;
        let locations = self
            .call(move |agent| agent.multi_upsert(reqs).into_result())
            .await?;
        Ok(Response::new(convert::locations(locations)))
    }

    async fn remove(
        &self,
        request: Request<pb::RemoveRequest>,
    ) -> Result<Response<pb::Location>, Status> {
        let req = convert::remove_request(request.into_inner()).map_err(to_status)?;
        let location = self
            .call(move |agent| agent.remove(&req.id, &req.config))
            .await?;
        Ok(Response::new(location.into()))
    }

    async fn multi_remove(
        &self,
        request: Request<pb::MultiRemoveRequest>,
    ) -> Result<Response<pb::Locations>, Status> {
        let reqs =
            convert::batch(request.into_inner().requests, convert::remove_request).map_err(to_status)?;
        let locations = self
            .call(move |agent| agent.multi_remove(reqs).into_result())
            .await?;
        Ok(Response::new(convert::locations(locations)))
    }

    async fn remove_by_timestamp(
        &self,
        request: Request<pb::RemoveByTimestampRequest>,
    ) -> Result<Response<pb::Locations>, Status> {
        let predicates = request
            .into_inner()
            .timestamps
            .iter()
            .map(convert::timestamp_predicate)
            .collect::<Result<Vec<_>, _>>()
            .map_err(to_status)?;
        let locations = self
            .call(move |agent| agent.remove_by_timestamp(&predicates))
            .await?;
        info!(removed = locations.len(), "RemoveByTimestamp");
        Ok(Response::new(convert::locations(locations)))
    }

    async fn exists(
        &self,
        request: Request<pb::ObjectId>,
    ) -> Result<Response<pb::ObjectId>, Status> {
        let id = request.into_inner().id;
        if id.is_empty() {
            return Err(to_status(AgentError::EmptyId));
        }
        let found = id.clone();
        let exists = self.call(move |agent| Ok(agent.exists(&found))).await?;
        if !exists {
            return Err(to_status(AgentError::ObjectNotFound { id }));
        }
        Ok(Response::new(pb::ObjectId { id }))
    }

    async fn get_object(
        &self,
        request: Request<pb::ObjectId>,
    ) -> Result<Response<pb::ObjectVector>, Status> {
        let id = request.into_inner().id;
        let record = self.call(move |agent| agent.get_object(&id)).await?;
        Ok(Response::new(record.into()))
    }

    async fn get_object_meta(
        &self,
        request: Request<pb::ObjectId>,
    ) -> Result<Response<pb::ObjectMeta>, Status> {
        let id = request.into_inner().id;
        let meta = self.call(move |agent| agent.get_object_meta(&id)).await?;
        Ok(Response::new(meta.into()))
    }

    type StreamListObjectStream =
        Pin<Box<dyn Stream<Item = Result<pb::ObjectVector, Status>> + Send + 'static>>;

    async fn stream_list_object(
        &self,
        _request: Request<pb::ListObjectRequest>,
    ) -> Result<Response<Self::StreamListObjectStream>, Status> {
        let records = self.call(|agent| agent.list_objects()).await?;
        debug!(count = records.len(), "Streaming committed objects");
        let stream = futures::stream::iter(records.into_iter().map(|r| Ok(r.into())));
        Ok(Response::new(Box::pin(stream)))
    }

    async fn search(
        &self,
        request: Request<pb::SearchRequest>,
    ) -> Result<Response<pb::SearchResponse>, Status> {
        let req = request.into_inner();
        let config = convert::search_config(req.config);
        let response = self.single_search(req.vector, config, search_vector).await?;
        Ok(Response::new(response))
    }

    async fn linear_search(
        &self,
        request: Request<pb::SearchRequest>,
    ) -> Result<Response<pb::SearchResponse>, Status> {
        let req = request.into_inner();
        let config = convert::search_config(req.config);
        let response = self
            .single_search(req.vector, config, linear_search_vector)
            .await?;
        Ok(Response::new(response))
    }

    async fn search_by_id(
        &self,
        request: Request<pb::SearchByIdRequest>,
    ) -> Result<Response<pb::SearchResponse>, Status> {
        let req = request.into_inner();
        let config = convert::search_config(req.config);
        let response = self.single_search(req.id, config, search_id).await?;
        Ok(Response::new(response))
    }

    async fn linear_search_by_id(
        &self,
        request: Request<pb::SearchByIdRequest>,
    ) -> Result<Response<pb::SearchResponse>, Status> {
        let req = request.into_inner();
        let config = convert::search_config(req.config);
        let response = self.single_search(req.id, config, linear_search_id).await?;
        Ok(Response::new(response))
    }

    async fn multi_search(
        &self,
        request: Request<pb::MultiSearchRequest>,
    ) -> Result<Response<pb::SearchResponses>, Status> {
        let queries = request
            .into_inner()
            .requests
            .into_iter()
            .map(|r| (r.vector, convert::search_config(r.config)))
            .collect();
        let responses = self.multi_search(queries, search_vector).await?;
        Ok(Response::new(responses))
    }

    async fn multi_linear_search(
        &self,
        request: Request<pb::MultiSearchRequest>,
    ) -> Result<Response<pb::SearchResponses>, Status> {
        let queries = request
            .into_inner()
            .requests
            .into_iter()
            .map(|r| (r.vector, convert::search_config(r.config)))
            .collect();
        let responses = self.multi_search(queries, linear_search_vector).await?;
        Ok(Response::new(responses))
    }

    async fn multi_search_by_id(
        &self,
        request: Request<pb::MultiSearchByIdRequest>,
    ) -> Result<Response<pb::SearchResponses>, Status> {
        let queries = request
            .into_inner()
            .requests
            .into_iter()
            .map(|r| (r.id, convert::search_config(r.config)))
            .collect();
        let responses = self.multi_search(queries, search_id).await?;
        Ok(Response::new(responses))
    }

    async fn multi_linear_search_by_id(
        &self,
        request: Request<pb::MultiSearchByIdRequest>,
    ) -> Result<Response<pb::SearchResponses>, Status> {
        let queries = request
            .into_inner()
            .requests
            .into_iter()
            .map(|r| (r.id, convert::search_config(r.config)))
            .collect();
        let responses = self.multi_search(queries, linear_search_id).await?;
        Ok(Response::new(responses))
    }

    async fn create_index(
        &self,
        request: Request<pb::CreateIndexRequest>,
    ) -> Result<Response<pb::Empty>, Status> {
        let pool_size = request.into_inner().pool_size;
        let stats = self
            .call_cancelable(move |agent, cancel| agent.commit(cancel, pool_size))
            .await?;
        info!(
            inserted = stats.inserted,
            deleted = stats.deleted,
            dropped = stats.dropped,
            "CreateIndex"
        );
        Ok(Response::new(pb::Empty {}))
    }

    async fn save_index(
        &self,
        _request: Request<pb::Empty>,
    ) -> Result<Response<pb::Empty>, Status> {
        self.call_cancelable(|agent, cancel| agent.save(cancel))
            .await?;
        Ok(Response::new(pb::Empty {}))
    }

    async fn create_and_save_index(
        &self,
        request: Request<pb::CreateIndexRequest>,
    ) -> Result<Response<pb::Empty>, Status> {
        let pool_size = request.into_inner().pool_size;
        self.call_cancelable(move |agent, cancel| agent.commit_and_save(cancel, pool_size))
            .await?;
        Ok(Response::new(pb::Empty {}))
    }

    async fn flush(&self, _request: Request<pb::Empty>) -> Result<Response<pb::IndexCount>, Status> {
        let info = self
            .call_cancelable(|agent, cancel| agent.flush(cancel))
            .await?;
        info!("Flush");
        Ok(Response::new(info.into()))
    }

    async fn index_info(
        &self,
        _request: Request<pb::Empty>,
    ) -> Result<Response<pb::IndexCount>, Status> {
        Ok(Response::new(self.agent.index_info().into()))
    }

    async fn get_scheduler_status(
        &self,
        _request: Request<pb::Empty>,
    ) -> Result<Response<pb::SchedulerStatus>, Status> {
        let Some(registry) = &self.registry else {
            return Ok(Response::new(pb::SchedulerStatus {
                enabled: false,
                jobs: Vec::new(),
            }));
        };
        let jobs = registry
            .get_all_status()
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(Response::new(pb::SchedulerStatus {
            enabled: true,
            jobs,
        }))
    }
}
