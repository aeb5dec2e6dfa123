use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::normalize::NormalizedRecord;
use crate::session::RawCapture;

pub const DEFAULT_DB_PATH: &str = "data/tpe_moto.sqlite";
pub const CACHE_KEY: &str = "tp_moto_cache_v1";
pub const SNAPSHOT_VERSION: u32 = 1;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS snapshots (
            key       TEXT PRIMARY KEY,
            payload   TEXT NOT NULL,
            saved_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub normalized: Vec<NormalizedRecord>,
    pub raw: Vec<RawCapture>,
}

pub fn save_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
    let payload = serde_json::to_string(snapshot)?;
    conn.execute(
        "INSERT INTO snapshots (key, payload, saved_at) VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, saved_at = excluded.saved_at",
        rusqlite::params![CACHE_KEY, payload],
    )?;
    Ok(())
}

/// Stored snapshot, or `None` when absent, unreadable, or of another version.
pub fn load_snapshot(conn: &Connection) -> Result<Option<Snapshot>> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload FROM snapshots WHERE key = ?1",
            [CACHE_KEY],
            |row| row.get(0),
        )
        .optional()?;
    let Some(payload) = payload else {
        return Ok(None);
    };

    let value: serde_json::Value = match serde_json::from_str(&payload) {
        Ok(v) => v,
        Err(e) => {
            warn!("Ignoring unreadable snapshot: {}", e);
            return Ok(None);
        }
    };
    if value.get("version").and_then(|v| v.as_u64()) != Some(SNAPSHOT_VERSION as u64) {
        warn!("Ignoring snapshot with version {:?}", value.get("version"));
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(s) => Ok(Some(s)),
        Err(e) => {
            warn!("Ignoring malformed snapshot: {}", e);
            Ok(None)
        }
    }
}

pub fn clear_snapshot(conn: &Connection) -> Result<bool> {
    let n = conn.execute("DELETE FROM snapshots WHERE key = ?1", [CACHE_KEY])?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_record;
    use serde_json::json;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn sample_snapshot() -> Snapshot {
        let raw = json!({ "行政區": "北投區", "路段": "中央北路", "年份": "99年" });
        let raw = raw.as_object().unwrap().clone();
        Snapshot {
            version: SNAPSHOT_VERSION,
            timestamp: Utc::now(),
            normalized: vec![normalize_record("cat", "src", &raw)],
            raw: vec![RawCapture {
                id: "third-lane".into(),
                label: "cat".into(),
                source: "src".into(),
                rows: vec![raw],
            }],
        }
    }

    #[test]
    fn snapshot_round_trip() {
        let conn = memory_db();
        assert!(load_snapshot(&conn).unwrap().is_none());

        let snap = sample_snapshot();
        save_snapshot(&conn, &snap).unwrap();
        let loaded = load_snapshot(&conn).unwrap().unwrap();
        assert_eq!(loaded.normalized, snap.normalized);
        assert_eq!(loaded.raw[0].rows, snap.raw[0].rows);
        assert_eq!(loaded.timestamp, snap.timestamp);
    }

    #[test]
    fn overwrite_keeps_single_row() {
        let conn = memory_db();
        save_snapshot(&conn, &sample_snapshot()).unwrap();
        let mut second = sample_snapshot();
        second.normalized.clear();
        save_snapshot(&conn, &second).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 1);
        assert!(load_snapshot(&conn).unwrap().unwrap().normalized.is_empty());
    }

    #[test]
    fn other_versions_rejected() {
        let conn = memory_db();
        let mut snap = sample_snapshot();
        snap.version = 2;
        save_snapshot(&conn, &snap).unwrap();
        assert!(load_snapshot(&conn).unwrap().is_none());
    }

    #[test]
    fn garbage_payload_rejected() {
        let conn = memory_db();
        conn.execute(
            "INSERT INTO snapshots (key, payload) VALUES (?1, ?2)",
            rusqlite::params![CACHE_KEY, "{not json"],
        )
        .unwrap();
        assert!(load_snapshot(&conn).unwrap().is_none());
        assert!(clear_snapshot(&conn).unwrap());
        assert!(!clear_snapshot(&conn).unwrap());
    }
}
