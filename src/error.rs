//! Error taxonomy for a collection run.
//!
//! Every failure surfaced by the crate falls into one of three kinds:
//! - `UpstreamError`:      a list or detail call failed
//! - `PersistenceError`:   a bulk write to the sink failed
//! - `ConfigurationError`: a run was requested with invalid parameters
//!
//! `CollectError` wraps them for the run surface. No variant is retried
//! anywhere inside the crate.

use std::fmt;

use thiserror::Error;

/// Which upstream operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    List,
    Detail,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::List => f.write_str("list"),
            CallKind::Detail => f.write_str("detail"),
        }
    }
}

/// Which storage row kind a persistence failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Record,
    CostLine,
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKind::Record => f.write_str("record"),
            RowKind::CostLine => f.write_str("cost line"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{call} call for {entity} timed out")]
    Timeout { call: CallKind, entity: String },

    #[error("{call} call for {entity} failed: {source}")]
    Transport {
        call: CallKind,
        entity: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{call} call for {entity} returned HTTP {status}")]
    Status {
        call: CallKind,
        entity: String,
        status: u16,
    },

    #[error("{call} response for {entity} exceeds the {limit} byte buffer limit")]
    ResponseTooLarge {
        call: CallKind,
        entity: String,
        limit: usize,
    },

    #[error("{call} response for {entity} could not be decoded: {reason}")]
    Decode {
        call: CallKind,
        entity: String,
        reason: String,
    },

    #[error("{call} call for {entity} was rejected: {reason}")]
    Rejected {
        call: CallKind,
        entity: String,
        reason: String,
    },
}

impl UpstreamError {
    /// Maps a transport-level reqwest failure, folding timeouts into `Timeout`.
    pub fn from_reqwest(call: CallKind, entity: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return UpstreamError::Timeout {
                call,
                entity: entity.to_string(),
            };
        }

        if err.is_decode() {
            return UpstreamError::Decode {
                call,
                entity: entity.to_string(),
                reason: err.to_string(),
            };
        }

        UpstreamError::Transport {
            call,
            entity: entity.to_string(),
            source: err,
        }
    }

    pub fn call(&self) -> CallKind {
        match self {
            UpstreamError::Timeout { call, .. }
            | UpstreamError::Transport { call, .. }
            | UpstreamError::Status { call, .. }
            | UpstreamError::ResponseTooLarge { call, .. }
            | UpstreamError::Decode { call, .. }
            | UpstreamError::Rejected { call, .. } => *call,
        }
    }

    pub fn entity(&self) -> &str {
        match self {
            UpstreamError::Timeout { entity, .. }
            | UpstreamError::Transport { entity, .. }
            | UpstreamError::Status { entity, .. }
            | UpstreamError::ResponseTooLarge { entity, .. }
            | UpstreamError::Decode { entity, .. }
            | UpstreamError::Rejected { entity, .. } => entity,
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("bulk write of {rows} {kind} rows failed: {source}")]
    Redis {
        kind: RowKind,
        rows: usize,
        #[source]
        source: redis::RedisError,
    },

    #[error("failed to encode {kind} row: {source}")]
    Encode {
        kind: RowKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("bulk write of {rows} {kind} rows was rejected: {reason}")]
    Rejected {
        kind: RowKind,
        rows: usize,
        reason: String,
    },

    #[error("persistence backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: usize },

    #[error("{name} is required when {context}")]
    Missing {
        name: &'static str,
        context: &'static str,
    },

    #[error("invalid range for {name}: min {min} > max {max}")]
    InvalidRange {
        name: &'static str,
        min: usize,
        max: usize,
    },
}

impl ConfigurationError {
    /// Rejects zero for any size or concurrency limit.
    pub fn require_positive(name: &'static str, value: usize) -> Result<usize, Self> {
        if value == 0 {
            return Err(ConfigurationError::NonPositive { name, value });
        }
        Ok(value)
    }
}

/// First error observed by a run. A failed run returns no metrics.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The reactive engine was asked to block from inside a tokio
    /// runtime, where `block_on` would panic.
    #[error("reactive collection cannot block inside a running tokio runtime")]
    NestedRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_positive_rejects_zero() {
        assert_eq!(
            ConfigurationError::require_positive("chunk_size", 0),
            Err(ConfigurationError::NonPositive {
                name: "chunk_size",
                value: 0
            })
        );
        assert_eq!(ConfigurationError::require_positive("chunk_size", 99), Ok(99));
    }

    #[test]
    fn upstream_error_exposes_call_and_entity() {
        let err = UpstreamError::Status {
            call: CallKind::Detail,
            entity: "CLIENT-007".into(),
            status: 503,
        };
        assert_eq!(err.call(), CallKind::Detail);
        assert_eq!(err.entity(), "CLIENT-007");
        assert_eq!(err.to_string(), "detail call for CLIENT-007 returned HTTP 503");
    }
}
