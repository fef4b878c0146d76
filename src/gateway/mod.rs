//! Upstream gateway bindings and factory
//!
//! This module provides:
//! - The two call contracts the engine depends on (`BlockingGateway`,
//!   `AsyncGateway`)
//! - A factory that builds both bindings from configuration
//!
//! Both bindings expose the same two operations and must be
//! interchangeable from the engine's point of view. Neither retries.

pub mod http_async;
pub mod http_blocking;
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Url;

use crate::config::{Config, UpstreamMode};
use crate::error::UpstreamError;
use crate::schema::{DetailBatch, IdPage};

/// Blocking binding.
///
/// CONTRACT:
/// - A call occupies the calling thread for its full latency,
///   injected delay included
/// - Returns the materialized result or fails; never retries
/// - Must fail (not hang) once the configured timeout elapses
///
/// THREAD SAFETY:
/// - Shared by reference across every worker of a run
pub trait BlockingGateway: Send + Sync {
    /// Binding name used in log lines.
    fn name(&self) -> &'static str;

    fn list_ids(
        &self,
        entity: &str,
        date: NaiveDate,
        delay: Duration,
    ) -> Result<IdPage, UpstreamError>;

    fn fetch_details(
        &self,
        entity: &str,
        ids: &[String],
        delay: Duration,
    ) -> Result<DetailBatch, UpstreamError>;
}

/// Non-blocking binding.
///
/// CONTRACT:
/// - Each call is a single-completion future; no worker is held
///   while it is pending
/// - Completion order across concurrent calls is unspecified
/// - Dropping the future abandons the call and its result
#[async_trait::async_trait]
pub trait AsyncGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_ids(
        &self,
        entity: &str,
        date: NaiveDate,
        delay: Duration,
    ) -> Result<IdPage, UpstreamError>;

    async fn fetch_details(
        &self,
        entity: &str,
        ids: &[String],
        delay: Duration,
    ) -> Result<DetailBatch, UpstreamError>;
}

/// Both bindings for one upstream.
#[derive(Clone)]
pub struct Gateways {
    pub blocking: Arc<dyn BlockingGateway>,
    pub non_blocking: Arc<dyn AsyncGateway>,
}

impl Gateways {
    /// Builds both bindings for the configured upstream mode.
    ///
    /// - `http`: reqwest blocking + async clients sharing the same
    ///   base URL and timeouts
    /// - `mock`: one in-process mock serving both bindings
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        match cfg.upstream.mode {
            UpstreamMode::Http => Ok(Self {
                blocking: Arc::new(http_blocking::BlockingHttpGateway::new(&cfg.upstream)?),
                non_blocking: Arc::new(http_async::AsyncHttpGateway::new(&cfg.upstream)?),
            }),
            UpstreamMode::Mock => {
                let mock = Arc::new(mock::MockUpstream::from_config(&cfg.mock));
                Ok(Self::shared(mock))
            }
        }
    }

    /// One implementation serving both bindings.
    pub fn shared<G>(gateway: Arc<G>) -> Self
    where
        G: BlockingGateway + AsyncGateway + 'static,
    {
        Self {
            blocking: gateway.clone(),
            non_blocking: gateway,
        }
    }
}

/// Parses and checks the upstream base URL.
pub(crate) fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw)?;
    if url.cannot_be_a_base() {
        anyhow::bail!("upstream base_url {raw} cannot carry path segments");
    }
    Ok(url)
}

/// `{base}/{entity}/{leaf}` with the entity code escaped as one segment.
pub(crate) fn endpoint(base: &Url, entity: &str, leaf: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(entity).push(leaf);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_entity_and_leaf() {
        let base = parse_base_url("http://localhost:8080/mock").unwrap();
        assert_eq!(
            endpoint(&base, "CLIENT-001", "outbound-ids").as_str(),
            "http://localhost:8080/mock/CLIENT-001/outbound-ids"
        );

        let trailing = parse_base_url("http://localhost:8080/mock/").unwrap();
        assert_eq!(
            endpoint(&trailing, "CLIENT 9", "outbounds").as_str(),
            "http://localhost:8080/mock/CLIENT%209/outbounds"
        );
    }

    #[test]
    fn rejects_base_without_path() {
        assert!(parse_base_url("mailto:ops@example.com").is_err());
        assert!(parse_base_url("not a url").is_err());
    }
}
