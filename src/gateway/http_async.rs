use std::time::Duration;

use chrono::NaiveDate;
use log::debug;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

use crate::{
    config::UpstreamConfig,
    error::{CallKind, UpstreamError},
    schema::{DetailBatch, IdBatchRequest, IdPage},
    util,
};

use super::{AsyncGateway, endpoint, parse_base_url};

/// Non-blocking HTTP binding (async reqwest)
///
/// Same endpoints as the blocking binding. Calls are multiplexed over
/// the runtime that polls them; no thread waits on an in-flight call.
///
/// BUFFERING:
/// - Response bodies are read chunk by chunk into memory
/// - A body larger than `max_in_memory_size` fails the call with
///   `UpstreamError::ResponseTooLarge` (checked against Content-Length
///   first, then against the bytes actually received)
pub struct AsyncHttpGateway {
    client: Client,
    base_url: Url,
    max_in_memory_size: usize,
}

impl AsyncHttpGateway {
    pub fn new(cfg: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(cfg.connect_timeout())
            .timeout(cfg.read_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: parse_base_url(&cfg.base_url)?,
            max_in_memory_size: cfg.max_in_memory_size,
        })
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        call: CallKind,
        entity: &str,
        mut response: Response,
    ) -> Result<T, UpstreamError> {
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                call,
                entity: entity.to_string(),
                status: status.as_u16(),
            });
        }

        let limit = self.max_in_memory_size;
        let too_large = || UpstreamError::ResponseTooLarge {
            call,
            entity: entity.to_string(),
            limit,
        };

        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| UpstreamError::from_reqwest(call, entity, e))?
        {
            if body.len() + chunk.len() > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode {
            call,
            entity: entity.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl AsyncGateway for AsyncHttpGateway {
    fn name(&self) -> &'static str {
        "http-async"
    }

    async fn list_ids(
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
            .await
            .map_err(|e| UpstreamError::from_reqwest(CallKind::List, entity, e))?;

        let page: IdPage = self.decode(CallKind::List, entity, response).await?;
        debug!("[{}] list response: entity={} count={}", self.name(), entity, page.total_count);
        Ok(page)
    }

    async fn fetch_details(
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
            .await
            .map_err(|e| UpstreamError::from_reqwest(CallKind::Detail, entity, e))?;

        let batch: DetailBatch = self.decode(CallKind::Detail, entity, response).await?;
        debug!("[{}] detail response: entity={} count={}", self.name(), entity, batch.data.len());
        Ok(batch)
    }
}
