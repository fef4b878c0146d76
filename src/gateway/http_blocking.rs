use std::time::Duration;

use chrono::NaiveDate;
use log::debug;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;

use crate::{
    config::UpstreamConfig,
    error::{CallKind, UpstreamError},
    schema::{DetailBatch, IdBatchRequest, IdPage},
    util,
};

use super::{BlockingGateway, endpoint, parse_base_url};

/// Blocking HTTP binding (reqwest::blocking)
///
/// Endpoints:
/// - GET  {base}/{entity}/outbound-ids?date=YYYY-MM-DD&delay=ms
/// - POST {base}/{entity}/outbounds?delay=ms   body: { "outboundIds": [...] }
///
/// Used by the Sequential and BoundedThreadPool strategies.
///
/// NOTE:
/// Must not be constructed or dropped on an async runtime thread;
/// reqwest's blocking client drives its own runtime internally.
pub struct BlockingHttpGateway {
    client: Client,
    base_url: Url,
}

impl BlockingHttpGateway {
    pub fn new(cfg: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(cfg.connect_timeout())
            .timeout(cfg.read_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: parse_base_url(&cfg.base_url)?,
        })
    }

    fn decode<T: DeserializeOwned>(
        call: CallKind,
        entity: &str,
        response: Response,
    ) -> Result<T, UpstreamError> {
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                call,
                entity: entity.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .map_err(|e| UpstreamError::from_reqwest(call, entity, e))
    }
}

impl BlockingGateway for BlockingHttpGateway {
    fn name(&self) -> &'static str {
        "http-blocking"
    }

    fn list_ids(
        &self,
        entity: &str,
        date: NaiveDate,
        delay: Duration,
    ) -> Result<IdPage, UpstreamError> {
        let mut url = endpoint(&self.base_url, entity, "outbound-ids");
        url.query_pairs_mut()
            .append_pair("date", &util::format_partition(date))
            .append_pair("delay", &util::delay_param(delay));

        debug!("[{}] list call: entity={} date={}", self.name(), entity, date);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| UpstreamError::from_reqwest(CallKind::List, entity, e))?;

        let page: IdPage = Self::decode(CallKind::List, entity, response)?;
        debug!("[{}] list response: entity={} count={}", self.name(), entity, page.total_count);
        Ok(page)
    }

    fn fetch_details(
        &self,
        entity: &str,
        ids: &[String],
        delay: Duration,
    ) -> Result<DetailBatch, UpstreamError> {
        let mut url = endpoint(&self.base_url, entity, "outbounds");
        url.query_pairs_mut()
            .append_pair("delay", &util::delay_param(delay));

        debug!("[{}] detail call: entity={} count={}", self.name(), entity, ids.len());

        let response = self
            .client
            .post(url)
            .json(&IdBatchRequest { ids })
            .send()
            .map_err(|e| UpstreamError::from_reqwest(CallKind::Detail, entity, e))?;

        Self::decode(CallKind::Detail, entity, response)
    }
}
