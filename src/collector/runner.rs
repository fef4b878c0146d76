use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use log::{error, info};

use crate::config::CollectorConfig;
use crate::directory::EntityDirectory;
use crate::error::{CollectError, PersistenceError};
use crate::gateway::Gateways;
use crate::metrics::METRICS;
use crate::persist::{self, BatchPersister};
use crate::schema::{CollectResult, Entity};
use crate::util;

use super::{Engines, RunParams, Strategy};

/// Per-run overrides of the configured delay and parallelism.
///
/// `None` keeps the configured value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOverrides {
    pub delay: Option<Duration>,
    pub client_parallelism: Option<usize>,
    pub chunk_parallelism: Option<usize>,
}

/// Entry point for a collection run.
///
/// Owns the three engines and the sink, and drives one run as:
/// directory -> engine -> save_all -> `CollectResult`.
///
/// This type does NOT:
/// - Retry failed runs
/// - Persist anything when collection fails
/// - Run two strategies concurrently (`compare` runs them in turn)
pub struct Collector {
    directory: Arc<dyn EntityDirectory>,
    engines: Engines,
    persister: Arc<dyn BatchPersister>,
    settings: CollectorConfig,
    default_delay: Duration,
}

impl Collector {
    /// Builds the engines over `gateways`.
    ///
    /// Fails on invalid chunk/batch settings or if the reactive
    /// scheduler cannot be started.
    pub fn new(
        directory: Arc<dyn EntityDirectory>,
        gateways: &Gateways,
        persister: Arc<dyn BatchPersister>,
        settings: CollectorConfig,
        default_delay: Duration,
    ) -> anyhow::Result<Self> {
        settings.validate()?;

        Ok(Self {
            directory,
            engines: Engines::new(gateways)?,
            persister,
            settings,
            default_delay,
        })
    }

    /// Runs one strategy end to end.
    ///
    /// On success every collected record has been persisted. On
    /// failure the first error is returned and no result is produced;
    /// an upstream failure leaves the sink untouched.
    pub fn run(
        &self,
        strategy: Strategy,
        date: NaiveDate,
        delay: Duration,
        client_parallelism: usize,
        chunk_parallelism: usize,
    ) -> Result<CollectResult, CollectError> {
        let params = RunParams {
            date,
            delay,
            client_parallelism,
            chunk_parallelism,
            chunk_size: self.settings.chunk_size,
        };
        params.validate()?;

        METRICS.runs_started.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let entities = self.directory.list_all();

        info!(
            "[{}] run start: date={} entities={} delay={}ms client_parallelism={} chunk_parallelism={}",
            strategy,
            date,
            entities.len(),
            delay.as_millis(),
            client_parallelism,
            chunk_parallelism
        );

        match self.execute(strategy, &entities, &params, started) {
            Ok(result) => {
                METRICS.runs_completed.fetch_add(1, Ordering::Relaxed);
                Ok(result)
            }
            Err(e) => {
                METRICS.runs_failed.fetch_add(1, Ordering::Relaxed);
                if matches!(e, CollectError::Upstream(_)) {
                    METRICS.upstream_errors.fetch_add(1, Ordering::Relaxed);
                }
                error!(
                    "[{}] run failed after {}ms: {}",
                    strategy,
                    util::elapsed_ms(started),
                    e
                );
                Err(e)
            }
        }
    }

    /// `run` with the configured values, each replaced by its override
    /// when one is given.
    pub fn run_with(
        &self,
        strategy: Strategy,
        date: NaiveDate,
        overrides: &RunOverrides,
    ) -> Result<CollectResult, CollectError> {
        self.run(
            strategy,
            date,
            overrides.delay.unwrap_or(self.default_delay),
            overrides
                .client_parallelism
                .unwrap_or(self.settings.client_parallelism),
            overrides
                .chunk_parallelism
                .unwrap_or(self.settings.chunk_parallelism),
        )
    }

    /// `run` with the configured delay and parallelism.
    pub fn run_with_defaults(
        &self,
        strategy: Strategy,
        date: NaiveDate,
    ) -> Result<CollectResult, CollectError> {
        self.run_with(strategy, date, &RunOverrides::default())
    }

    /// Runs every strategy in turn for the same date.
    ///
    /// Each run persists its own rows; stops at the first failing run.
    pub fn compare(
        &self,
        date: NaiveDate,
        delay: Duration,
    ) -> Result<Vec<(Strategy, CollectResult)>, CollectError> {
        Strategy::ALL
            .iter()
            .map(|&strategy| {
                self.run(
                    strategy,
                    date,
                    delay,
                    self.settings.client_parallelism,
                    self.settings.chunk_parallelism,
                )
                .map(|result| (strategy, result))
            })
            .collect()
    }

    /// Deletes everything the sink holds.
    pub fn clear(&self) -> Result<(), PersistenceError> {
        self.persister.clear()
    }

    fn execute(
        &self,
        strategy: Strategy,
        entities: &[Entity],
        params: &RunParams,
        started: Instant,
    ) -> Result<CollectResult, CollectError> {
        let collected = self.engines.get(strategy).collect(entities, params)?;
        let collect_ms = util::elapsed_ms(started);

        info!(
            "[{}] collected {} records with {} api calls in {}ms",
            strategy,
            collected.records.len(),
            collected.api_calls,
            collect_ms
        );

        let save_started = Instant::now();
        let saved = persist::save_all(
            self.persister.as_ref(),
            &collected.records,
            self.settings.batch_size,
        )?;
        let save_ms = util::elapsed_ms(save_started);
        let total_ms = util::elapsed_ms(started);

        info!(
            "[{}] done: records={} cost_lines={} batches={} api_calls={} collect={}ms save={}ms total={}ms",
            strategy,
            saved.records_written,
            saved.cost_lines_written,
            saved.batches,
            collected.api_calls,
            collect_ms,
            save_ms,
            total_ms
        );

        Ok(CollectResult {
            total_records_written: saved.records_written,
            total_cost_lines_written: saved.cost_lines_written,
            api_call_count: collected.api_calls,
            elapsed_millis: total_ms,
        })
    }
}
