use std::sync::Arc;

use log::debug;

use crate::error::{CallKind, CollectError};
use crate::gateway::BlockingGateway;
use crate::schema::Entity;
use crate::util;

use super::{Collected, CollectionEngine, ResultAggregator, RunParams, Strategy};

/// One entity at a time, one chunk at a time, on the calling thread.
///
/// Parallelism limits are validated but otherwise unused.
pub struct SequentialEngine {
    gateway: Arc<dyn BlockingGateway>,
}

impl SequentialEngine {
    pub fn new(gateway: Arc<dyn BlockingGateway>) -> Self {
        Self { gateway }
    }
}

impl CollectionEngine for SequentialEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Sequential
    }

    fn collect(&self, entities: &[Entity], params: &RunParams) -> Result<Collected, CollectError> {
        params.validate()?;
        let aggregator = ResultAggregator::new();

        for entity in entities {
            let page = self
                .gateway
                .list_ids(&entity.code, params.date, params.delay)?;
            aggregator.increment_api_calls(CallKind::List);

            let chunks = util::chunk_ids(&page.ids, params.chunk_size);
            let chunk_count = chunks.len();

            for chunk in chunks {
                let batch = self
                    .gateway
                    .fetch_details(&entity.code, chunk, params.delay)?;
                aggregator.increment_api_calls(CallKind::Detail);
                aggregator.extend(batch.data);
            }

            debug!(
                "[{}] {}: {} ids in {} chunks",
                Strategy::Sequential,
                entity.code,
                page.ids.len(),
                chunk_count
            );
        }

        Ok(aggregator.drain())
    }
}
