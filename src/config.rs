use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::error::ConfigurationError;
use crate::schema::Entity;

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// This is the top-level configuration structure loaded from
// `config.json` (or the path passed with `--config`).
//
// It defines:
// - How the upstream is reached (HTTP or in-process mock)
// - Chunk / batch sizes and default parallelism
// - Which entities participate
// - Where results are persisted
// - Optional debug configuration
//
// Every section has defaults, so `{}` is a valid config file.
//
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub collector: CollectorConfig,
    pub entities: EntitiesConfig,
    pub persistence: PersistenceConfig,
    pub mock: MockConfig,
    pub debug: Option<DebugConfig>,
}

impl Config {
    /// Reads and parses a JSON configuration file, then validates it.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let cfg: Config = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects non-positive sizes and limits before any run starts.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.collector.validate()?;

        ConfigurationError::require_positive(
            "upstream.max_in_memory_size",
            self.upstream.max_in_memory_size,
        )?;

        if let EntitiesConfig::Generate { generate } = self.entities {
            ConfigurationError::require_positive("entities.generate", generate)?;
        }

        if self.persistence.backend == PersistenceBackend::Redis
            && self.persistence.redis_url.is_none()
        {
            return Err(ConfigurationError::Missing {
                name: "persistence.redis_url",
                context: "persistence.backend is \"redis\"",
            });
        }

        self.mock.validate()
    }

    pub fn debug_log(&self) -> bool {
        self.debug.as_ref().is_some_and(|d| d.log.unwrap_or(false))
    }
}

// ------------------------------------------------------------
// Upstream configuration
// ------------------------------------------------------------
//
// Notes:
// - `mode = "mock"` serves both bindings from the in-process mock
//   upstream; no network is touched.
// - Timeouts apply per call; a call that exceeds them fails with
//   `UpstreamError::Timeout` instead of hanging.
// - `max_in_memory_size` caps the buffered response body of the
//   non-blocking binding.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub mode: UpstreamMode,

    /// Base URL, e.g. `http://localhost:8080/mock`
    pub base_url: String,

    /// Injected latency used when a run does not pass one explicitly
    pub default_delay_ms: u64,

    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,

    /// Maximum buffered response size (bytes) for the non-blocking binding
    pub max_in_memory_size: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            mode: UpstreamMode::Http,
            base_url: "http://localhost:8080/mock".into(),
            default_delay_ms: 0,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 30_000,
            max_in_memory_size: 16 * 1024 * 1024,
        }
    }
}

impl UpstreamConfig {
    pub fn default_delay(&self) -> Duration {
        Duration::from_millis(self.default_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamMode {
    Http,
    Mock,
}

// ------------------------------------------------------------
// Collector configuration
// ------------------------------------------------------------
//
// - `chunk_size`:        ids per detail call
// - `batch_size`:        records per persistence call
// - `*_parallelism`:     defaults for runs that do not pass limits
//
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct CollectorConfig {
    pub chunk_size: usize,
    pub batch_size: usize,
    pub client_parallelism: usize,
    pub chunk_parallelism: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            chunk_size: 99,
            batch_size: 1000,
            client_parallelism: 10,
            chunk_parallelism: 10,
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ConfigurationError::require_positive("collector.chunk_size", self.chunk_size)?;
        ConfigurationError::require_positive("collector.batch_size", self.batch_size)?;
        ConfigurationError::require_positive(
            "collector.client_parallelism",
            self.client_parallelism,
        )?;
        ConfigurationError::require_positive(
            "collector.chunk_parallelism",
            self.chunk_parallelism,
        )?;
        Ok(())
    }
}

// ------------------------------------------------------------
// Entities
// ------------------------------------------------------------
//
// Either `{ "generate": 200 }` (CLIENT-001 .. CLIENT-200) or an
// explicit `{ "list": [{ "code": ..., "display_name": ... }] }`.
//
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum EntitiesConfig {
    Generate { generate: usize },
    List { list: Vec<Entity> },
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        EntitiesConfig::Generate { generate: 200 }
    }
}

// ------------------------------------------------------------
// Persistence
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackend,

    /// e.g. `redis://127.0.0.1:6379/0`
    pub redis_url: Option<String>,

    /// Namespace for every key written by the redis backend
    pub key_prefix: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::Memory,
            redis_url: None,
            key_prefix: "outbound".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    Memory,
    Redis,
}

// ------------------------------------------------------------
// Mock upstream
// ------------------------------------------------------------
//
// Only read when `upstream.mode = "mock"`.
// `ids_per_entity` fixes the list size; setting `min_ids` and
// `max_ids` instead draws a size per (entity, date).
//
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct MockConfig {
    pub ids_per_entity: usize,
    pub min_ids: Option<usize>,
    pub max_ids: Option<usize>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            ids_per_entity: 100,
            min_ids: None,
            max_ids: None,
        }
    }
}

impl MockConfig {
    /// Inclusive id count range per (entity, date).
    pub fn id_range(&self) -> (usize, usize) {
        match (self.min_ids, self.max_ids) {
            (Some(min), Some(max)) => (min, max),
            _ => (self.ids_per_entity, self.ids_per_entity),
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let (min, max) = self.id_range();
        if min > max {
            return Err(ConfigurationError::InvalidRange {
                name: "mock.min_ids..mock.max_ids",
                min,
                max,
            });
        }
        Ok(())
    }
}

// ------------------------------------------------------------
// Debug configuration
// ------------------------------------------------------------
#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Lowers the default log filter to `debug`
    pub log: Option<bool>,
}
