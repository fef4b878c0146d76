use std::sync::{Mutex, PoisonError};

use log::info;

use crate::error::{PersistenceError, RowKind};

use super::{BatchPersister, CostLineRow, RecordRow};

#[derive(Default)]
struct Store {
    records: Vec<RecordRow>,
    cost_lines: Vec<CostLineRow>,
    record_batches: Vec<usize>,
    cost_line_batches: usize,
}

/// Process-local sink.
///
/// Each insert appends its whole slice under one lock, so a slice is
/// either fully visible or absent. Used for local runs and tests.
#[derive(Default)]
pub struct InMemoryPersister {
    store: Mutex<Store>,
    fail_after: Option<usize>,
    fail_cost_lines_after: Option<usize>,
}

impl InMemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every record slice after the first `batches` ones.
    pub fn failing_after(mut self, batches: usize) -> Self {
        self.fail_after = Some(batches);
        self
    }

    /// Rejects every cost-line slice after the first `batches` ones.
    pub fn failing_cost_lines_after(mut self, batches: usize) -> Self {
        self.fail_cost_lines_after = Some(batches);
        self
    }

    pub fn records(&self) -> Vec<RecordRow> {
        self.lock().records.clone()
    }

    pub fn cost_lines(&self) -> Vec<CostLineRow> {
        self.lock().cost_lines.clone()
    }

    /// Size of every record slice accepted so far, in call order.
    pub fn record_batch_sizes(&self) -> Vec<usize> {
        self.lock().record_batches.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BatchPersister for InMemoryPersister {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn insert_records(&self, rows: &[RecordRow]) -> Result<usize, PersistenceError> {
        let mut store = self.lock();

        if self
            .fail_after
            .is_some_and(|limit| store.record_batches.len() >= limit)
        {
            return Err(PersistenceError::Rejected {
                kind: RowKind::Record,
                rows: rows.len(),
                reason: "injected failure".into(),
            });
        }

        store.records.extend_from_slice(rows);
        store.record_batches.push(rows.len());
        Ok(rows.len())
    }

    fn insert_cost_lines(&self, rows: &[CostLineRow]) -> Result<usize, PersistenceError> {
        let mut store = self.lock();

        if self
            .fail_cost_lines_after
            .is_some_and(|limit| store.cost_line_batches >= limit)
        {
            return Err(PersistenceError::Rejected {
                kind: RowKind::CostLine,
                rows: rows.len(),
                reason: "injected failure".into(),
            });
        }

        store.cost_lines.extend_from_slice(rows);
        store.cost_line_batches += 1;
        Ok(rows.len())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        let mut store = self.lock();
        let (records, cost_lines) = (store.records.len(), store.cost_lines.len());

        store.cost_lines.clear();
        store.records.clear();
        store.record_batches.clear();
        store.cost_line_batches = 0;

        info!("[memory] cleared {} records and {} cost lines", records, cost_lines);
        Ok(())
    }
}
