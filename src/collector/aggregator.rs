use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::CallKind;
use crate::metrics::METRICS;
use crate::schema::DetailRecord;

/// Fan-in point of a single run.
///
/// Every producer of the active strategy (the caller, pool workers at
/// both tiers, or reactive merge branches) appends here.
///
/// GUARANTEES:
/// - No append or call increment is lost under any interleaving
/// - `drain` consumes the aggregator, so it can only run once every
///   producer has released its reference
///
/// Records are append-only; ordering across producers is unspecified.
#[derive(Default)]
pub struct ResultAggregator {
    records: Mutex<Vec<DetailRecord>>,
    api_calls: AtomicUsize,
}

/// Everything a run collected, handed to persistence.
#[derive(Debug, Default)]
pub struct Collected {
    pub records: Vec<DetailRecord>,
    pub api_calls: usize,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: DetailRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        METRICS.records_collected.fetch_add(1, Ordering::Relaxed);
    }

    /// Appends a whole detail batch under one lock acquisition.
    pub fn extend(&self, batch: Vec<DetailRecord>) {
        let added = batch.len();
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(batch);
        METRICS.records_collected.fetch_add(added, Ordering::Relaxed);
    }

    /// Counts one completed upstream call. Returns the new run total.
    pub fn increment_api_calls(&self, call: CallKind) -> usize {
        match call {
            CallKind::List => METRICS.list_calls.fetch_add(1, Ordering::Relaxed),
            CallKind::Detail => METRICS.detail_calls.fetch_add(1, Ordering::Relaxed),
        };
        self.api_calls.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn drain(self) -> Collected {
        Collected {
            records: self
                .records
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
            api_calls: self.api_calls.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use chrono::NaiveDate;

    use super::*;
    use crate::schema::DeliveryStatus;

    fn record(entity: &str, id: usize) -> DetailRecord {
        DetailRecord {
            source_id: format!("OB-{id:06}"),
            entity_code: entity.to_string(),
            order_ref: "ORD-100000".into(),
            status: DeliveryStatus::Pending,
            shipped_at: NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            costs: Vec::new(),
        }
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        const WRITERS: usize = 16;
        const PER_WRITER: usize = 250;

        let aggregator = ResultAggregator::new();

        thread::scope(|scope| {
            for w in 0..WRITERS {
                let aggregator = &aggregator;
                scope.spawn(move || {
                    let entity = format!("E{w}");
                    for i in 0..PER_WRITER {
                        if i % 2 == 0 {
                            aggregator.append(record(&entity, i));
                        } else {
                            aggregator.extend(vec![record(&entity, i)]);
                        }
                        aggregator.increment_api_calls(CallKind::Detail);
                    }
                });
            }
        });

        let collected = aggregator.drain();
        assert_eq!(collected.records.len(), WRITERS * PER_WRITER);
        assert_eq!(collected.api_calls, WRITERS * PER_WRITER);

        let keys: HashSet<_> = collected
            .records
            .iter()
            .map(|r| (r.entity_code.clone(), r.source_id.clone()))
            .collect();
        assert_eq!(keys.len(), WRITERS * PER_WRITER);
    }

    #[test]
    fn increment_returns_running_total() {
        let aggregator = ResultAggregator::new();
        assert_eq!(aggregator.increment_api_calls(CallKind::List), 1);
        assert_eq!(aggregator.increment_api_calls(CallKind::Detail), 2);
        assert_eq!(aggregator.drain().api_calls, 2);
    }
}
