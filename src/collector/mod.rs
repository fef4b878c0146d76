/// Collection engine module
///
/// This module groups all logic responsible for:
/// - Fanning out over entities, then over each entity's id chunks
/// - Bounding concurrency independently at both levels
/// - Funnelling every detail batch into one `ResultAggregator`
///
/// The three strategies are a closed set behind one capability
/// (`CollectionEngine`) and are selected per run by `Strategy`.
///
/// Design notes:
/// - Engines never persist; the runner hands the drained aggregate
///   to persistence once collection is complete
/// - Engines never retry; the first upstream error ends the run
pub mod aggregator;
pub mod merge;
pub mod pool;
pub mod pooled;
pub mod reactive;
pub mod runner;
pub mod sequential;

use std::fmt;
use std::io;
use std::time::Duration;

use chrono::NaiveDate;

use crate::error::{CollectError, ConfigurationError};
use crate::gateway::Gateways;
use crate::schema::Entity;

pub use aggregator::{Collected, ResultAggregator};
pub use pooled::PooledEngine;
pub use reactive::ReactiveEngine;
pub use runner::{Collector, RunOverrides};
pub use sequential::SequentialEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Strategy {
    Sequential,
    #[value(name = "pooled", alias = "bounded-thread-pool")]
    BoundedThreadPool,
    Reactive,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::Sequential,
        Strategy::BoundedThreadPool,
        Strategy::Reactive,
    ];

    /// Short tag used in log lines and CLI output.
    pub fn tag(&self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::BoundedThreadPool => "pooled",
            Strategy::Reactive => "reactive",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Parameters of one run, fixed for its whole duration.
#[derive(Debug, Clone, Copy)]
pub struct RunParams {
    pub date: NaiveDate,
    pub delay: Duration,
    pub client_parallelism: usize,
    pub chunk_parallelism: usize,
    pub chunk_size: usize,
}

impl RunParams {
    /// Every strategy validates the same way, including Sequential,
    /// which does not use the parallelism limits.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ConfigurationError::require_positive("client_parallelism", self.client_parallelism)?;
        ConfigurationError::require_positive("chunk_parallelism", self.chunk_parallelism)?;
        ConfigurationError::require_positive("chunk_size", self.chunk_size)?;
        Ok(())
    }
}

/// One execution strategy.
///
/// CONTRACT:
/// - Lists ids once per entity and fetches each chunk exactly once,
///   so `api_calls == Σ(1 + chunks)` on success
/// - Returns only after every worker, pool or branch it started has
///   finished or been cancelled
/// - On failure, returns the first error and discards everything
///   collected so far
pub trait CollectionEngine: Send + Sync {
    fn strategy(&self) -> Strategy;

    fn collect(&self, entities: &[Entity], params: &RunParams) -> Result<Collected, CollectError>;
}

/// The three engines over one pair of gateway bindings.
pub struct Engines {
    sequential: SequentialEngine,
    pooled: PooledEngine,
    reactive: ReactiveEngine,
}

impl Engines {
    /// Fails only if the reactive scheduler cannot be started.
    pub fn new(gateways: &Gateways) -> io::Result<Self> {
        Ok(Self {
            sequential: SequentialEngine::new(gateways.blocking.clone()),
            pooled: PooledEngine::new(gateways.blocking.clone()),
            reactive: ReactiveEngine::new(gateways.non_blocking.clone())?,
        })
    }

    pub fn get(&self, strategy: Strategy) -> &dyn CollectionEngine {
        match strategy {
            Strategy::Sequential => &self.sequential,
            Strategy::BoundedThreadPool => &self.pooled,
            Strategy::Reactive => &self.reactive,
        }
    }
}
