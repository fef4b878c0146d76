use std::sync::Arc;

use log::debug;

use crate::error::{CallKind, CollectError};
use crate::gateway::BlockingGateway;
use crate::schema::Entity;
use crate::util;

use super::pool::WorkerPool;
use super::{Collected, CollectionEngine, ResultAggregator, RunParams, Strategy};

/// Two-tier bounded thread pools over the blocking binding.
///
/// DESIGN:
/// - Outer pool: `client_parallelism` workers, one entity per task
/// - Each entity task lists its ids, then runs its chunks on a fresh
///   inner pool of `chunk_parallelism` workers and waits for it
/// - Peak OS threads for upstream calls: client × chunk
///
/// Every pool is joined before its caller returns, including when a
/// task fails. The first failure stops both tiers from starting new
/// tasks; calls already in flight finish and their results are dropped.
pub struct PooledEngine {
    gateway: Arc<dyn BlockingGateway>,
}

impl PooledEngine {
    pub fn new(gateway: Arc<dyn BlockingGateway>) -> Self {
        Self { gateway }
    }

    fn collect_entity(
        &self,
        entity: &Entity,
        params: &RunParams,
        aggregator: &ResultAggregator,
    ) -> Result<(), CollectError> {
        let page = self
            .gateway
            .list_ids(&entity.code, params.date, params.delay)?;
        aggregator.increment_api_calls(CallKind::List);

        let chunks = util::chunk_ids(&page.ids, params.chunk_size);
        let chunk_count = chunks.len();

        let inner = WorkerPool::new("chunk-pool", params.chunk_parallelism)?;
        inner.try_for_each(chunks, |chunk| {
            let batch = self
                .gateway
                .fetch_details(&entity.code, chunk, params.delay)?;
            aggregator.increment_api_calls(CallKind::Detail);
            aggregator.extend(batch.data);
            Ok::<(), CollectError>(())
        })?;

        debug!(
            "[{}] {}: {} ids in {} chunks",
            Strategy::BoundedThreadPool,
            entity.code,
            page.ids.len(),
            chunk_count
        );
        Ok(())
    }
}

impl CollectionEngine for PooledEngine {
    fn strategy(&self) -> Strategy {
        Strategy::BoundedThreadPool
    }

    fn collect(&self, entities: &[Entity], params: &RunParams) -> Result<Collected, CollectError> {
        params.validate()?;
        let aggregator = ResultAggregator::new();

        let outer = WorkerPool::new("client-pool", params.client_parallelism)?;
        outer.try_for_each(entities.iter().collect::<Vec<_>>(), |entity| {
            self.collect_entity(entity, params, &aggregator)
        })?;

        Ok(aggregator.drain())
    }
}
