use std::sync::{Mutex, PoisonError};

use ::redis::{Client, Connection, Pipeline};
use log::info;

use crate::error::{PersistenceError, RowKind};

use super::{BatchPersister, CostLineRow, RecordRow};

const RECORD_TABLE: &str = "outbound";
const COST_LINE_TABLE: &str = "outbound_cost";

/// Tables in the order `clear` empties them.
const CLEAR_ORDER: [(&str, RowKind); 2] = [
    (COST_LINE_TABLE, RowKind::CostLine),
    (RECORD_TABLE, RowKind::Record),
];

/// Key naming and command building, independent of a connection.
///
/// LAYOUT (with `prefix` = configured key prefix):
/// - `{prefix}:outbound:{correlation_id}`       hash, one per record
/// - `{prefix}:outbound_cost:{correlation_id}`  list of JSON cost lines
/// - `{prefix}:outbound:keys` / `{prefix}:outbound_cost:keys`
///   sets tracking every key written, used by `clear`
#[derive(Debug, Clone)]
struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    fn key(&self, table: &str, id: &str) -> String {
        format!("{}:{}:{}", self.prefix, table, id)
    }

    fn index(&self, table: &str) -> String {
        format!("{}:{}:keys", self.prefix, table)
    }

    /// MULTI, then one HSET and one SADD per row, then EXEC.
    fn records_pipeline(&self, rows: &[RecordRow]) -> Pipeline {
        let index = self.index(RECORD_TABLE);
        let mut pipe = ::redis::pipe();
        pipe.atomic();

        for row in rows {
            let key = self.key(RECORD_TABLE, &row.correlation_id.to_string());
            pipe.cmd("HSET")
                .arg(&key)
                .arg("source_id")
                .arg(&row.source_id)
                .arg("entity_code")
                .arg(&row.entity_code)
                .arg("order_ref")
                .arg(&row.order_ref)
                .arg("status")
                .arg(row.status.as_str())
                .arg("shipped_at")
                .arg(row.shipped_at.to_string())
                .arg("created_at")
                .arg(row.created_at.to_string())
                .ignore();
            pipe.cmd("SADD").arg(&index).arg(&key).ignore();
        }

        pipe
    }

    /// MULTI, then one RPUSH and one SADD per row, then EXEC.
    fn cost_lines_pipeline(&self, rows: &[CostLineRow]) -> Result<Pipeline, PersistenceError> {
        let index = self.index(COST_LINE_TABLE);
        let mut pipe = ::redis::pipe();
        pipe.atomic();

        for row in rows {
            let json = serde_json::to_string(row).map_err(|source| PersistenceError::Encode {
                kind: RowKind::CostLine,
                source,
            })?;
            let key = self.key(COST_LINE_TABLE, &row.correlation_id.to_string());
            pipe.cmd("RPUSH").arg(&key).arg(json).ignore();
            pipe.cmd("SADD").arg(&index).arg(&key).ignore();
        }

        Ok(pipe)
    }

    /// Deletes every tracked key of `table` and the tracking set.
    fn clear_pipeline(&self, table: &str, keys: &[String]) -> Pipeline {
        let mut pipe = ::redis::pipe();
        pipe.atomic();
        if !keys.is_empty() {
            pipe.cmd("DEL").arg(keys.to_vec()).ignore();
        }
        pipe.cmd("DEL").arg(self.index(table)).ignore();
        pipe
    }
}

/// Redis-backed sink.
///
/// Each insert is sent as one MULTI/EXEC transaction: the slice is
/// applied in one transaction, with no interleaving from other clients.
/// Redis does not roll back earlier commands if one fails at runtime.
pub struct RedisPersister {
    conn: Mutex<Connection>,
    layout: KeyLayout,
}

impl RedisPersister {
    pub fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, PersistenceError> {
        let client =
            Client::open(url).map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        let conn = client
            .get_connection()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;

        let prefix = prefix.into();
        info!("[redis] connected, key prefix {}", prefix);

        Ok(Self {
            conn: Mutex::new(conn),
            layout: KeyLayout { prefix },
        })
    }

    /// Key of the hash holding the record with `correlation_id`.
    pub fn record_key(&self, correlation_id: &str) -> String {
        self.layout.key(RECORD_TABLE, correlation_id)
    }

    /// Key of the list holding the cost lines of `correlation_id`.
    pub fn cost_line_key(&self, correlation_id: &str) -> String {
        self.layout.key(COST_LINE_TABLE, correlation_id)
    }

    fn execute(&self, pipe: &Pipeline, kind: RowKind, rows: usize) -> Result<(), PersistenceError> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        pipe.query::<()>(&mut *conn)
            .map_err(|source| PersistenceError::Redis { kind, rows, source })
    }

    fn clear_table(&self, table: &str, kind: RowKind) -> Result<usize, PersistenceError> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        let keys: Vec<String> = ::redis::cmd("SMEMBERS")
            .arg(self.layout.index(table))
            .query(&mut *conn)
            .map_err(|source| PersistenceError::Redis { kind, rows: 0, source })?;

        self.layout
            .clear_pipeline(table, &keys)
            .query::<()>(&mut *conn)
            .map_err(|source| PersistenceError::Redis {
                kind,
                rows: keys.len(),
                source,
            })?;

        Ok(keys.len())
    }
}

impl BatchPersister for RedisPersister {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn insert_records(&self, rows: &[RecordRow]) -> Result<usize, PersistenceError> {
        let pipe = self.layout.records_pipeline(rows);
        self.execute(&pipe, RowKind::Record, rows.len())?;
        Ok(rows.len())
    }

    fn insert_cost_lines(&self, rows: &[CostLineRow]) -> Result<usize, PersistenceError> {
        let pipe = self.layout.cost_lines_pipeline(rows)?;
        self.execute(&pipe, RowKind::CostLine, rows.len())?;
        Ok(rows.len())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        for (table, kind) in CLEAR_ORDER {
            let cleared = self.clear_table(table, kind)?;
            info!("[redis] cleared {} {} keys", cleared, kind);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::schema::{CostType, DeliveryStatus};

    fn layout() -> KeyLayout {
        KeyLayout {
            prefix: "test".into(),
        }
    }

    fn packed(pipe: &Pipeline) -> String {
        String::from_utf8_lossy(&pipe.get_packed_pipeline()).into_owned()
    }

    fn count(haystack: &str, command: &str) -> usize {
        haystack.matches(&format!("\r\n{command}\r\n")).count()
    }

    fn record(id: Uuid) -> RecordRow {
        let at = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        RecordRow {
            correlation_id: id,
            source_id: format!("OB-{id}"),
            entity_code: "CLIENT-001".into(),
            order_ref: "ORD-555555".into(),
            status: DeliveryStatus::Shipped,
            shipped_at: at,
            created_at: at,
        }
    }

    #[test]
    fn records_are_one_transaction_with_hash_and_index_per_row() {
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let rows: Vec<_> = ids.iter().copied().map(record).collect();

        let wire = packed(&layout().records_pipeline(&rows));

        assert!(wire.starts_with("*1\r\n$5\r\nMULTI\r\n"));
        assert!(wire.ends_with("*1\r\n$4\r\nEXEC\r\n"));
        assert_eq!(count(&wire, "MULTI"), 1);
        assert_eq!(count(&wire, "EXEC"), 1);
        assert_eq!(count(&wire, "HSET"), 3);
        assert_eq!(count(&wire, "SADD"), 3);
        assert_eq!(count(&wire, "test:outbound:keys"), 3);
        for id in ids {
            assert!(wire.contains(&format!("test:outbound:{id}")));
        }
        assert!(wire.contains("SHIPPED"));
    }

    #[test]
    fn cost_lines_are_json_lists_keyed_by_record() {
        let id = Uuid::new_v4();
        let at = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let rows = [
            CostLineRow {
                correlation_id: id,
                cost_type: CostType::Shipping,
                amount: Decimal::new(1500, 0),
                created_at: at,
            },
            CostLineRow {
                correlation_id: id,
                cost_type: CostType::Handling,
                amount: Decimal::new(700, 0),
                created_at: at,
            },
        ];

        let wire = packed(&layout().cost_lines_pipeline(&rows).unwrap());

        assert_eq!(count(&wire, "MULTI"), 1);
        assert_eq!(count(&wire, "EXEC"), 1);
        assert_eq!(count(&wire, "RPUSH"), 2);
        assert_eq!(count(&wire, "SADD"), 2);
        assert_eq!(count(&wire, &format!("test:outbound_cost:{id}")), 4);
        assert!(wire.contains("\"cost_type\":\"SHIPPING\""));
    }

    #[test]
    fn empty_slice_is_an_empty_transaction() {
        let wire = packed(&layout().records_pipeline(&[]));
        assert_eq!(count(&wire, "MULTI"), 1);
        assert_eq!(count(&wire, "EXEC"), 1);
        assert_eq!(count(&wire, "HSET"), 0);
    }

    #[test]
    fn clear_removes_cost_lines_before_records() {
        assert_eq!(CLEAR_ORDER[0].0, COST_LINE_TABLE);
        assert_eq!(CLEAR_ORDER[1].0, RECORD_TABLE);

        let keys = vec!["test:outbound_cost:a".to_string(), "test:outbound_cost:b".to_string()];
        let wire = packed(&layout().clear_pipeline(COST_LINE_TABLE, &keys));
        assert_eq!(count(&wire, "DEL"), 2);
        assert!(wire.contains("test:outbound_cost:a"));
        assert!(wire.contains("test:outbound_cost:keys"));

        let wire = packed(&layout().clear_pipeline(RECORD_TABLE, &[]));
        assert_eq!(count(&wire, "DEL"), 1);
    }

    #[test]
    fn unreachable_server_is_unavailable() {
        let err = RedisPersister::connect("redis://127.0.0.1:1/", "test")
            .err()
            .unwrap();
        assert!(matches!(err, PersistenceError::Unavailable(_)));
    }
}
