//! In-process mock upstream
//!
//! Serves both gateway bindings without a network:
//! - list ids are `OB-{entity}-{yyyymmdd}-{index:06}`
//! - each detail gets a random order ref, status, ship time in the
//!   last 72 hours and 2-3 distinct cost lines
//!
//! Id lists are cached per (entity, date) so repeated runs see the same
//! ids. The cache is process-scoped state owned by this test double, not
//! by the engine; `IdCache::reset` is the only way to invalidate it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{Local, NaiveDate, TimeDelta};
use log::{debug, info};
use once_cell::sync::Lazy;
use rand::random_range;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;

use crate::config::MockConfig;
use crate::error::{CallKind, UpstreamError};
use crate::schema::{CostLine, CostType, DeliveryStatus, DetailBatch, DetailRecord, IdPage};
use crate::util;

use super::{AsyncGateway, BlockingGateway};

static SHARED_ID_CACHE: Lazy<Arc<IdCache>> = Lazy::new(|| Arc::new(IdCache::default()));

/// Id lists keyed by (entity code, date partition).
#[derive(Default)]
pub struct IdCache {
    pages: Mutex<HashMap<(String, NaiveDate), Arc<Vec<String>>>>,
}

impl IdCache {
    /// The process-wide cache used by `MockUpstream::new`.
    pub fn shared() -> Arc<IdCache> {
        SHARED_ID_CACHE.clone()
    }

    fn get_or_generate(
        &self,
        entity: &str,
        date: NaiveDate,
        generate: impl FnOnce() -> Vec<String>,
    ) -> Arc<Vec<String>> {
        let mut pages = self.pages.lock().unwrap_or_else(PoisonError::into_inner);
        pages
            .entry((entity.to_string(), date))
            .or_insert_with(|| Arc::new(generate()))
            .clone()
    }

    pub fn reset(&self) {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("Mock id cache cleared");
    }

    pub fn len(&self) -> usize {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
enum FailurePoint {
    List { entity: String },
    Detail { entity: String, id: String },
}

/// Mock upstream serving both bindings.
pub struct MockUpstream {
    cache: Arc<IdCache>,
    min_ids: usize,
    max_ids: usize,
    failures: Vec<FailurePoint>,
}

impl MockUpstream {
    /// Fixed `ids_per_entity`, backed by the process-wide cache.
    pub fn new(ids_per_entity: usize) -> Self {
        Self {
            cache: IdCache::shared(),
            min_ids: ids_per_entity,
            max_ids: ids_per_entity,
            failures: Vec::new(),
        }
    }

    /// Like `new`, but with a private cache.
    pub fn isolated(ids_per_entity: usize) -> Self {
        Self {
            cache: Arc::new(IdCache::default()),
            ..Self::new(ids_per_entity)
        }
    }

    pub fn from_config(cfg: &MockConfig) -> Self {
        let (min, max) = cfg.id_range();
        Self::new(min).with_id_range(min, max)
    }

    /// Draw each list size from `min..=max` (once per entity and date).
    pub fn with_id_range(mut self, min: usize, max: usize) -> Self {
        self.min_ids = min;
        self.max_ids = max.max(min);
        self
    }

    /// Every list call for `entity` fails.
    pub fn fail_list_for(mut self, entity: impl Into<String>) -> Self {
        self.failures.push(FailurePoint::List {
            entity: entity.into(),
        });
        self
    }

    /// The detail call for `entity` whose batch contains `id` fails.
    pub fn fail_detail_containing(
        mut self,
        entity: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        self.failures.push(FailurePoint::Detail {
            entity: entity.into(),
            id: id.into(),
        });
        self
    }

    pub fn cache(&self) -> &Arc<IdCache> {
        &self.cache
    }

    /// Id a generated list holds at 1-based `index`.
    pub fn id_for(entity: &str, date: NaiveDate, index: usize) -> String {
        format!("OB-{}-{}-{:06}", entity, util::compact_partition(date), index)
    }

    fn page(&self, entity: &str, date: NaiveDate) -> Result<IdPage, UpstreamError> {
        let list_fails = self
            .failures
            .iter()
            .any(|f| matches!(f, FailurePoint::List { entity: e } if e == entity));
        if list_fails {
            return Err(UpstreamError::Rejected {
                call: CallKind::List,
                entity: entity.to_string(),
                reason: "injected list failure".into(),
            });
        }

        let ids = self.cache.get_or_generate(entity, date, || {
            let count = if self.min_ids == self.max_ids {
                self.min_ids
            } else {
                random_range(self.min_ids..=self.max_ids)
            };
            (1..=count).map(|i| Self::id_for(entity, date, i)).collect()
        });

        debug!("[mock] list: entity={} date={} count={}", entity, date, ids.len());

        Ok(IdPage {
            entity_code: entity.to_string(),
            date_partition: date,
            total_count: ids.len(),
            ids: ids.as_ref().clone(),
        })
    }

    fn details(&self, entity: &str, ids: &[String]) -> Result<DetailBatch, UpstreamError> {
        let failing = self.failures.iter().find_map(|f| match f {
            FailurePoint::Detail { entity: e, id } if e == entity && ids.contains(id) => Some(id),
            _ => None,
        });
        if let Some(id) = failing {
            return Err(UpstreamError::Rejected {
                call: CallKind::Detail,
                entity: entity.to_string(),
                reason: format!("injected detail failure for batch containing {id}"),
            });
        }

        let data: Vec<DetailRecord> = ids.iter().map(|id| generate_detail(entity, id)).collect();

        debug!("[mock] details: entity={} requested={} returned={}", entity, ids.len(), data.len());

        Ok(DetailBatch { data })
    }
}

fn generate_detail(entity: &str, id: &str) -> DetailRecord {
    let now = Local::now().naive_local();

    DetailRecord {
        source_id: id.to_string(),
        entity_code: entity.to_string(),
        order_ref: format!("ORD-{}", random_range(100_000..1_000_000)),
        status: DeliveryStatus::ALL[random_range(0..DeliveryStatus::ALL.len())],
        shipped_at: now - TimeDelta::hours(random_range(1..72)),
        costs: generate_costs(),
    }
}

/// 2 or 3 cost lines, each of a distinct cost type.
fn generate_costs() -> Vec<CostLine> {
    let mut types = CostType::ALL;
    types.shuffle(&mut rand::rng());

    let count = random_range(2..=types.len());
    types[..count]
        .iter()
        .map(|cost_type| CostLine {
            cost_type: *cost_type,
            amount: Decimal::from(random_range(500_i64..10_000)),
        })
        .collect()
}

impl BlockingGateway for MockUpstream {
    fn name(&self) -> &'static str {
        "mock-blocking"
    }

    fn list_ids(
        &self,
        entity: &str,
        date: NaiveDate,
        delay: Duration,
    ) -> Result<IdPage, UpstreamError> {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.page(entity, date)
    }

    fn fetch_details(
        &self,
        entity: &str,
        ids: &[String],
        delay: Duration,
    ) -> Result<DetailBatch, UpstreamError> {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.details(entity, ids)
    }
}

#[async_trait::async_trait]
impl AsyncGateway for MockUpstream {
    fn name(&self) -> &'static str {
        "mock-async"
    }

    async fn list_ids(
        &self,
        entity: &str,
        date: NaiveDate,
        delay: Duration,
    ) -> Result<IdPage, UpstreamError> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.page(entity, date)
    }

    async fn fetch_details(
        &self,
        entity: &str,
        ids: &[String],
        delay: Duration,
    ) -> Result<DetailBatch, UpstreamError> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.details(entity, ids)
    }
}
