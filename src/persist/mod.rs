//! Batched persistence hand-off
//!
//! This module provides:
//! - The sink contract (`BatchPersister`)
//! - Row derivation from collected records
//! - The slicing loop that feeds the sink one batch at a time
//!
//! Persistence is not pipelined with collection: `save_all` runs only
//! after an engine has returned the complete aggregate.

pub mod memory;
pub mod redis;

use std::sync::atomic::Ordering;

use chrono::{Local, NaiveDateTime};
use log::{debug, error};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::metrics::METRICS;
use crate::schema::{CostType, DeliveryStatus, DetailRecord};

pub use memory::InMemoryPersister;
pub use self::redis::RedisPersister;

/// Durable sink for derived rows.
///
/// CONTRACT:
/// - Each insert call is all-or-nothing for its slice
/// - Returns the number of rows written
/// - Called sequentially, never concurrently, within one run
pub trait BatchPersister: Send + Sync {
    fn name(&self) -> &'static str;

    fn insert_records(&self, rows: &[RecordRow]) -> Result<usize, PersistenceError>;

    fn insert_cost_lines(&self, rows: &[CostLineRow]) -> Result<usize, PersistenceError>;

    /// Deletes everything the sink holds, cost lines before records.
    fn clear(&self) -> Result<(), PersistenceError>;
}

/// One persisted detail record.
///
/// `correlation_id` is minted when the row is derived and is never
/// used to deduplicate; two runs over the same ids write two rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordRow {
    pub correlation_id: Uuid,
    pub source_id: String,
    pub entity_code: String,
    pub order_ref: String,
    pub status: DeliveryStatus,
    pub shipped_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

/// One persisted cost line, linked to its record by `correlation_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostLineRow {
    pub correlation_id: Uuid,
    pub cost_type: CostType,
    pub amount: Decimal,
    pub created_at: NaiveDateTime,
}

/// Outcome of one `save_all` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub records_written: usize,
    pub cost_lines_written: usize,
    pub batches: usize,
}

/// Derives one record row per record and one cost-line row per cost
/// line, minting a fresh correlation id per record.
pub fn rows_for_slice(
    records: &[DetailRecord],
    created_at: NaiveDateTime,
) -> (Vec<RecordRow>, Vec<CostLineRow>) {
    let mut record_rows = Vec::with_capacity(records.len());
    let mut cost_rows = Vec::new();

    for record in records {
        let correlation_id = Uuid::new_v4();

        record_rows.push(RecordRow {
            correlation_id,
            source_id: record.source_id.clone(),
            entity_code: record.entity_code.clone(),
            order_ref: record.order_ref.clone(),
            status: record.status,
            shipped_at: record.shipped_at,
            created_at,
        });

        cost_rows.extend(record.costs.iter().map(|cost| CostLineRow {
            correlation_id,
            cost_type: cost.cost_type,
            amount: cost.amount,
            created_at,
        }));
    }

    (record_rows, cost_rows)
}

/// Writes `records` in consecutive slices of `batch_size`.
///
/// FAILURE:
/// - The first failing insert stops the loop
/// - Slices written before it stay written
///
/// `batch_size` must be positive; the runner validates it.
pub fn save_all(
    persister: &dyn BatchPersister,
    records: &[DetailRecord],
    batch_size: usize,
) -> Result<SaveSummary, PersistenceError> {
    let mut summary = SaveSummary::default();

    for (index, slice) in records.chunks(batch_size.max(1)).enumerate() {
        let (record_rows, cost_rows) = rows_for_slice(slice, Local::now().naive_local());

        let written = write_slice(persister, &record_rows, &cost_rows).inspect_err(|e| {
            METRICS.persist_errors.fetch_add(1, Ordering::Relaxed);
            error!("[{}] slice {} failed: {}", persister.name(), index, e);
        })?;

        summary.records_written += written.0;
        summary.cost_lines_written += written.1;
        summary.batches += 1;

        METRICS.batches_persisted.fetch_add(1, Ordering::Relaxed);
        METRICS
            .rows_written
            .fetch_add(written.0 + written.1, Ordering::Relaxed);

        debug!(
            "[{}] slice {}: {} records, {} cost lines",
            persister.name(),
            index,
            written.0,
            written.1
        );
    }

    Ok(summary)
}

fn write_slice(
    persister: &dyn BatchPersister,
    record_rows: &[RecordRow],
    cost_rows: &[CostLineRow],
) -> Result<(usize, usize), PersistenceError> {
    let records = persister.insert_records(record_rows)?;
    let cost_lines = if cost_rows.is_empty() {
        0
    } else {
        persister.insert_cost_lines(cost_rows)?
    };
    Ok((records, cost_lines))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::NaiveDate;

    use super::*;
    use crate::error::RowKind;
    use crate::schema::CostLine;

    fn record(i: usize, costs: usize) -> DetailRecord {
        DetailRecord {
            source_id: format!("OB-CLIENT-001-20260301-{i:06}"),
            entity_code: "CLIENT-001".into(),
            order_ref: format!("ORD-{:06}", 100000 + i),
            status: DeliveryStatus::Shipped,
            shipped_at: NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            costs: CostType::ALL
                .iter()
                .take(costs)
                .map(|t| CostLine {
                    cost_type: *t,
                    amount: Decimal::new(1500, 0),
                })
                .collect(),
        }
    }

    #[test]
    fn slices_follow_batch_size() {
        let persister = InMemoryPersister::new();
        let records: Vec<_> = (0..120).map(|i| record(i, 2)).collect();

        let summary = save_all(&persister, &records, 50).unwrap();

        assert_eq!(persister.record_batch_sizes(), vec![50, 50, 20]);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.records_written, 120);
        assert_eq!(summary.cost_lines_written, 240);
    }

    #[test]
    fn cost_lines_share_their_record_id() {
        let (records, costs) = rows_for_slice(
            &[record(1, 3), record(2, 1)],
            Local::now().naive_local(),
        );

        assert_eq!(records.len(), 2);
        assert_eq!(costs.len(), 4);
        assert!(costs[..3].iter().all(|c| c.correlation_id == records[0].correlation_id));
        assert_eq!(costs[3].correlation_id, records[1].correlation_id);
        assert_ne!(records[0].correlation_id, records[1].correlation_id);
    }

    #[test]
    fn repeated_saves_mint_new_ids() {
        let persister = InMemoryPersister::new();
        let records: Vec<_> = (0..10).map(|i| record(i, 0)).collect();

        save_all(&persister, &records, 4).unwrap();
        save_all(&persister, &records, 4).unwrap();

        let ids: HashSet<_> = persister
            .records()
            .iter()
            .map(|r| r.correlation_id)
            .collect();
        assert_eq!(ids.len(), 20);
        assert!(persister.cost_lines().is_empty());
    }

    #[test]
    fn failure_keeps_earlier_slices() {
        let persister = InMemoryPersister::new().failing_after(2);
        let records: Vec<_> = (0..120).map(|i| record(i, 1)).collect();

        let err = save_all(&persister, &records, 50).unwrap_err();

        assert!(matches!(err, PersistenceError::Rejected { rows: 20, .. }));
        assert_eq!(persister.records().len(), 100);
        assert_eq!(persister.cost_lines().len(), 100);
    }

    #[test]
    fn cost_line_failure_stops_after_its_records() {
        let persister = InMemoryPersister::new().failing_cost_lines_after(1);
        let records: Vec<_> = (0..120).map(|i| record(i, 2)).collect();

        let err = save_all(&persister, &records, 50).unwrap_err();

        assert!(matches!(
            err,
            PersistenceError::Rejected {
                kind: RowKind::CostLine,
                rows: 100,
                ..
            }
        ));
        // slice 2 wrote its records before its cost lines failed; slice 3 never ran
        assert_eq!(persister.record_batch_sizes(), vec![50, 50]);
        assert_eq!(persister.records().len(), 100);
        assert_eq!(persister.cost_lines().len(), 100);
    }

    #[test]
    fn empty_input_writes_nothing() {
        let persister = InMemoryPersister::new();
        let summary = save_all(&persister, &[], 10).unwrap();
        assert_eq!(summary, SaveSummary::default());
        assert!(persister.record_batch_sizes().is_empty());
    }
}
