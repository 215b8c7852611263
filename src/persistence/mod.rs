// =============================================================================
// Signal persistence — SQLite audit trail and cross-session dedup
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::errors::SystemFault;
use crate::signal::SignalRecord;

/// A signal row as read back from storage.
#[derive(Debug, Clone)]
pub struct StoredSignal {
    pub id: i64,
    pub plan_id: String,
    pub state: String,
    pub protocol_version: String,
    pub timestamp: DateTime<Utc>,
    pub signal_json: String,
    pub signal_hash: String,
    pub delivery_attempts: i64,
    pub delivery_status: Option<String>,
}

/// SQLite-backed signal store. Connection access is serialized through a
/// mutex; `rusqlite::Connection` is `!Sync` and the engine calls in from a
/// single coordinator task per instance.
pub struct SignalStore {
    conn: Mutex<Connection>,
}

impl SignalStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, SystemFault> {
        let conn = Connection::open(path).map_err(|e| SystemFault::Persistence(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, SystemFault> {
        let conn = Connection::open_in_memory().map_err(|e| SystemFault::Persistence(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> Result<(), SystemFault> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plan_id TEXT NOT NULL,
                state TEXT NOT NULL,
                protocol_version TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                signal_data TEXT NOT NULL,
                signal_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                delivery_attempts INTEGER NOT NULL DEFAULT 0,
                last_delivery_attempt TEXT,
                delivery_status TEXT,
                UNIQUE(plan_id, state, timestamp)
            );
            CREATE INDEX IF NOT EXISTS idx_signals_plan_id ON signals(plan_id);
            CREATE INDEX IF NOT EXISTS idx_signals_state ON signals(state);
            CREATE INDEX IF NOT EXISTS idx_signals_created_at ON signals(created_at);
            CREATE INDEX IF NOT EXISTS idx_signals_hash ON signals(signal_hash);",
        )
        .map_err(|e| SystemFault::Persistence(e.to_string()))?;
        Ok(())
    }

    /// Insert a signal, ignoring the write if the `(plan_id, state,
    /// timestamp)` triple was already stored.
    /// Returns `true` if a new row was inserted.
    pub fn store_signal(&self, signal: &SignalRecord) -> Result<bool, SystemFault> {
        let conn = self.conn.lock();
        let body = serde_json::to_string(signal).map_err(|e| SystemFault::Persistence(e.to_string()))?;
        let hash = signal.idempotency_hash();
        let now = Utc::now().to_rfc3339();
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO signals
                    (plan_id, state, protocol_version, timestamp, signal_data, signal_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    signal.plan_id,
                    signal.state,
                    signal.protocol_version,
                    signal.timestamp.to_rfc3339(),
                    body,
                    hash,
                    now,
                ],
            )
            .map_err(|e| SystemFault::Persistence(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Whether this exact `(plan_id, state, timestamp)` was already persisted
    ///.
    pub fn is_duplicate(&self, plan_id: &str, state: &str, timestamp: DateTime<Utc>) -> Result<bool, SystemFault> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM signals WHERE plan_id = ?1 AND state = ?2 AND timestamp = ?3",
                params![plan_id, state, timestamp.to_rfc3339()],
                |row| row.get(0),
            )
            .map_err(|e| SystemFault::Persistence(e.to_string()))?;
        Ok(count > 0)
    }

    pub fn update_delivery_status(&self, signal_id: i64, status: &str) -> Result<(), SystemFault> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE signals SET
                delivery_attempts = delivery_attempts + 1,
                last_delivery_attempt = ?1,
                delivery_status = ?2
             WHERE id = ?3",
            params![now, status, signal_id],
        )
        .map_err(|e| SystemFault::Persistence(e.to_string()))?;
        Ok(())
    }

    pub fn signals_by_plan(&self, plan_id: &str) -> Result<Vec<StoredSignal>, SystemFault> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM signals WHERE plan_id = ?1 ORDER BY created_at")
            .map_err(|e| SystemFault::Persistence(e.to_string()))?;
        let rows = stmt
            .query_map(params![plan_id], row_to_stored_signal)
            .map_err(|e| SystemFault::Persistence(e.to_string()))?;
        collect_rows(rows)
    }

    pub fn signals_by_state(&self, state: &str, limit: i64) -> Result<Vec<StoredSignal>, SystemFault> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM signals WHERE state = ?1 ORDER BY created_at DESC LIMIT ?2")
            .map_err(|e| SystemFault::Persistence(e.to_string()))?;
        let rows = stmt
            .query_map(params![state, limit], row_to_stored_signal)
            .map_err(|e| SystemFault::Persistence(e.to_string()))?;
        collect_rows(rows)
    }

    pub fn signals_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<StoredSignal>, SystemFault> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM signals WHERE timestamp BETWEEN ?1 AND ?2 ORDER BY timestamp LIMIT ?3")
            .map_err(|e| SystemFault::Persistence(e.to_string()))?;
        let rows = stmt
            .query_map(params![start.to_rfc3339(), end.to_rfc3339(), limit], row_to_stored_signal)
            .map_err(|e| SystemFault::Persistence(e.to_string()))?;
        collect_rows(rows)
    }

    /// Delete signals whose `created_at` is older than `days` days ago.
    /// Returns the number of rows removed.
    pub fn cleanup_older_than(&self, days: i64) -> Result<usize, SystemFault> {
        let conn = self.conn.lock();
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let deleted = conn
            .execute("DELETE FROM signals WHERE created_at < ?1", params![cutoff])
            .map_err(|e| SystemFault::Persistence(e.to_string()))?;
        Ok(deleted)
    }
}

fn row_to_stored_signal(row: &rusqlite::Row) -> rusqlite::Result<StoredSignal> {
    let timestamp_str: String = row.get("timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    Ok(StoredSignal {
        id: row.get("id")?,
        plan_id: row.get("plan_id")?,
        state: row.get("state")?,
        protocol_version: row.get("protocol_version")?,
        timestamp,
        signal_json: row.get("signal_data")?,
        signal_hash: row.get("signal_hash")?,
        delivery_attempts: row.get("delivery_attempts")?,
        delivery_status: row.get("delivery_status")?,
    })
}

fn collect_rows(
    rows: rusqlite::MappedRows<impl FnMut(&rusqlite::Row) -> rusqlite::Result<StoredSignal>>,
) -> Result<Vec<StoredSignal>, SystemFault> {
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| SystemFault::Persistence(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{RuntimeFields, SignalMetrics};
    use chrono::TimeZone;

    fn ts(s: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(s, 0).unwrap()
    }

    fn signal(plan_id: &str, state: &str, t: i64) -> SignalRecord {
        SignalRecord {
            plan_id: plan_id.to_string(),
            state: state.to_string(),
            protocol_version: "breakout-v1".to_string(),
            runtime: RuntimeFields {
                armed_at: None,
                triggered_at: Some(ts(t)),
                break_ts: None,
                substate: "none".to_string(),
                invalid_reason: None,
            },
            timestamp: ts(t),
            last_price: 45000.0,
            metrics: SignalMetrics {
                rvol: Some(2.0),
                natr_pct: Some(1.0),
                atr: Some(50.0),
                pinbar: false,
                pinbar_type: None,
                ob_sweep_detected: false,
                ob_sweep_side: None,
                ob_imbalance_long: None,
                ob_imbalance_short: None,
            },
            strength_score: 65.0,
            entry_mode: Some("momentum".to_string()),
        }
    }

    #[test]
    fn store_and_detect_duplicate() {
        let store = SignalStore::open_in_memory().unwrap();
        let s = signal("p1", "triggered", 10);
        assert!(store.store_signal(&s).unwrap());
        assert!(store.is_duplicate("p1", "triggered", ts(10)).unwrap());
    }

    #[test]
    fn duplicate_insert_is_ignored_not_erroring() {
        let store = SignalStore::open_in_memory().unwrap();
        let s = signal("p1", "triggered", 10);
        assert!(store.store_signal(&s).unwrap());
        assert!(!store.store_signal(&s).unwrap());
        assert_eq!(store.signals_by_plan("p1").unwrap().len(), 1);
    }

    #[test]
    fn distinct_states_for_same_plan_both_stored() {
        let store = SignalStore::open_in_memory().unwrap();
        store.store_signal(&signal("p1", "armed", 5)).unwrap();
        store.store_signal(&signal("p1", "triggered", 10)).unwrap();
        assert_eq!(store.signals_by_plan("p1").unwrap().len(), 2);
    }

    #[test]
    fn update_delivery_status_increments_attempts() {
        let store = SignalStore::open_in_memory().unwrap();
        store.store_signal(&signal("p1", "triggered", 10)).unwrap();
        let row = &store.signals_by_plan("p1").unwrap()[0];
        store.update_delivery_status(row.id, "delivered").unwrap();
        let updated = &store.signals_by_plan("p1").unwrap()[0];
        assert_eq!(updated.delivery_attempts, 1);
        assert_eq!(updated.delivery_status.as_deref(), Some("delivered"));
    }

    #[test]
    fn cleanup_removes_nothing_when_all_recent() {
        let store = SignalStore::open_in_memory().unwrap();
        store.store_signal(&signal("p1", "triggered", 10)).unwrap();
        let deleted = store.cleanup_older_than(30).unwrap();
        assert_eq!(deleted, 0);
    }

    #[test]
    fn signals_by_state_filters_correctly() {
        let store = SignalStore::open_in_memory().unwrap();
        store.store_signal(&signal("p1", "armed", 5)).unwrap();
        store.store_signal(&signal("p2", "triggered", 10)).unwrap();
        let armed = store.signals_by_state("armed", 100).unwrap();
        assert_eq!(armed.len(), 1);
        assert_eq!(armed[0].plan_id, "p1");
    }
}
