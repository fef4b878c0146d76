use std::io;
use std::sync::Arc;

use log::debug;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::error::{CallKind, CollectError, UpstreamError};
use crate::gateway::AsyncGateway;
use crate::schema::Entity;
use crate::util;

use super::merge::bounded_merge;
use super::{Collected, CollectionEngine, ResultAggregator, RunParams, Strategy};

/// Cooperative scheduling over the non-blocking binding.
///
/// DESIGN:
/// - One current-thread runtime, owned by the engine and reused
///   across runs
/// - Entities are merged with at most `client_parallelism` in flight;
///   each entity's chunks with at most `chunk_parallelism`
/// - The calling thread blocks exactly once per run, on the whole
///   pipeline
///
/// The first error resolves both merges; pending calls are dropped.
///
/// NOTE:
/// Called from inside another tokio runtime, `collect` returns
/// `CollectError::NestedRuntime` instead of blocking.
pub struct ReactiveEngine {
    gateway: Arc<dyn AsyncGateway>,
    runtime: Runtime,
}

impl ReactiveEngine {
    pub fn new(gateway: Arc<dyn AsyncGateway>) -> io::Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .thread_name("reactive")
            .build()?;

        Ok(Self { gateway, runtime })
    }

    async fn collect_entity(
        &self,
        entity: &Entity,
        params: &RunParams,
        aggregator: &ResultAggregator,
    ) -> Result<(), UpstreamError> {
        let page = self
            .gateway
            .list_ids(&entity.code, params.date, params.delay)
            .await?;
        aggregator.increment_api_calls(CallKind::List);

        let chunks = util::chunk_ids(&page.ids, params.chunk_size);
        let chunk_count = chunks.len();

        bounded_merge(chunks, params.chunk_parallelism, move |chunk| async move {
            let batch = self
                .gateway
                .fetch_details(&entity.code, chunk, params.delay)
                .await?;
            aggregator.increment_api_calls(CallKind::Detail);
            aggregator.extend(batch.data);
            Ok::<(), UpstreamError>(())
        })
        .await?;

        debug!(
            "[{}] {}: {} ids in {} chunks",
            Strategy::Reactive,
            entity.code,
            page.ids.len(),
            chunk_count
        );
        Ok(())
    }
}

impl CollectionEngine for ReactiveEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Reactive
    }

    fn collect(&self, entities: &[Entity], params: &RunParams) -> Result<Collected, CollectError> {
        params.validate()?;
        if Handle::try_current().is_ok() {
            return Err(CollectError::NestedRuntime);
        }

        let aggregator = ResultAggregator::new();
        let sink = &aggregator;

        self.runtime.block_on(bounded_merge(
            entities,
            params.client_parallelism,
            move |entity| self.collect_entity(entity, params, sink),
        ))?;

        Ok(aggregator.drain())
    }
}
