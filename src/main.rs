use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use log::info;

use outbound_collector::collector::{Collector, RunOverrides, Strategy};
use outbound_collector::config::{Config, PersistenceBackend, UpstreamMode};
use outbound_collector::directory::StaticDirectory;
use outbound_collector::gateway::Gateways;
use outbound_collector::gateway::mock::IdCache;
use outbound_collector::metrics::METRICS;
use outbound_collector::persist::{BatchPersister, InMemoryPersister, RedisPersister};

#[derive(Parser, Debug)]
#[command(name = "outbound-collector")]
#[command(author, version, about = "Two-level bounded collection of outbound records")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "OUTBOUND_COLLECTOR_CONFIG", default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one strategy and persist the results
    Collect {
        #[arg(short, long, value_enum, default_value_t = Strategy::BoundedThreadPool)]
        strategy: Strategy,

        /// Date partition (YYYY-MM-DD), today if omitted
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Injected upstream delay in ms, configured default if omitted
        #[arg(long)]
        delay_ms: Option<u64>,

        #[arg(long)]
        client_parallelism: Option<usize>,

        #[arg(long)]
        chunk_parallelism: Option<usize>,
    },

    /// Run every strategy in turn for the same date
    Compare {
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Delete every persisted record and cost line (and the mock id cache)
    ClearData,
}

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Load configuration and initialise logging
// - Build the gateways, directory and sink from configuration
// - Dispatch the requested command and print its result
// - Print the metrics summary whether or not the command succeeded
//
// NOTE:
// `main` must stay synchronous: neither the blocking HTTP binding nor
// the reactive engine can run inside a tokio runtime.
//
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    let default_filter = if config.debug_log() { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let collector = build_collector(&config)?;

    let outcome = execute(cli.command, &config, &collector);
    println!("[METRICS] {}", METRICS.summary());
    outcome
}

fn execute(command: Command, config: &Config, collector: &Collector) -> anyhow::Result<()> {
    match command {
        Command::Collect {
            strategy,
            date,
            delay_ms,
            client_parallelism,
            chunk_parallelism,
        } => {
            let overrides = RunOverrides {
                delay: delay_ms.map(Duration::from_millis),
                client_parallelism,
                chunk_parallelism,
            };
            let result = collector.run_with(strategy, date.unwrap_or_else(today), &overrides)?;

            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Command::Compare { date, delay_ms } => {
            let results = collector.compare(
                date.unwrap_or_else(today),
                delay_ms.map_or(config.upstream.default_delay(), Duration::from_millis),
            )?;

            for (strategy, result) in results {
                println!(
                    "{:<12} records={} cost_lines={} api_calls={} elapsed={}ms",
                    strategy.tag(),
                    result.total_records_written,
                    result.total_cost_lines_written,
                    result.api_call_count,
                    result.elapsed_millis
                );
            }
        }

        Command::ClearData => {
            collector.clear()?;
            if config.upstream.mode == UpstreamMode::Mock {
                let cache = IdCache::shared();
                if !cache.is_empty() {
                    info!("Dropping {} cached mock id pages", cache.len());
                    cache.reset();
                }
            }
            info!("All persisted data cleared");
        }
    }

    Ok(())
}

fn build_collector(config: &Config) -> anyhow::Result<Collector> {
    let gateways = Gateways::from_config(config).context("failed to build upstream gateways")?;
    let directory = Arc::new(StaticDirectory::from_config(&config.entities));

    info!(
        "Upstream {} ({:?}), {} entities, {:?} persistence",
        config.upstream.base_url,
        config.upstream.mode,
        directory.len(),
        config.persistence.backend
    );

    Collector::new(
        directory,
        &gateways,
        build_persister(config)?,
        config.collector,
        config.upstream.default_delay(),
    )
}

fn build_persister(config: &Config) -> anyhow::Result<Arc<dyn BatchPersister>> {
    match config.persistence.backend {
        PersistenceBackend::Memory => Ok(Arc::new(InMemoryPersister::new())),
        PersistenceBackend::Redis => {
            let url = config
                .persistence
                .redis_url
                .as_deref()
                .context("persistence.redis_url is required for the redis backend")?;
            let persister = RedisPersister::connect(url, config.persistence.key_prefix.clone())
                .with_context(|| format!("failed to connect to redis at {url}"))?;
            Ok(Arc::new(persister))
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
