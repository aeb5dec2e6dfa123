use anyhow::Result;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::datasets::DatasetSource;
use crate::db::{self, Snapshot, SNAPSHOT_VERSION};
use crate::error::LoadError;
use crate::fetch::{self, PageSource, Proxy};
use crate::normalize::{normalize_record, NormalizedRecord, RawRecord};

/// Raw rows of one dataset, kept for inspection and the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCapture {
    pub id: String,
    pub label: String,
    pub source: String,
    pub rows: Vec<RawRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Fetched,
    Cache,
}

/// Everything one load cycle produced. Built once, then only read.
#[derive(Debug, Clone)]
pub struct LoadSession {
    pub timestamp: DateTime<Utc>,
    pub records: Vec<NormalizedRecord>,
    pub raw: Vec<RawCapture>,
    pub origin: Origin,
    /// Ids of datasets whose fetch failed.
    pub failed: Vec<String>,
}

impl LoadSession {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        LoadSession {
            timestamp: snapshot.timestamp,
            records: snapshot.normalized,
            raw: snapshot.raw,
            origin: Origin::Cache,
            failed: Vec::new(),
        }
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            timestamp: self.timestamp,
            normalized: self.records.clone(),
            raw: self.raw.clone(),
        }
    }
}

/// Fetch and normalize every dataset in order. A failing dataset is logged
/// and skipped; the load fails only when nothing at all was loaded.
pub async fn load_all<S: PageSource>(
    source: &S,
    datasets: &[DatasetSource],
    proxy: Option<&Proxy>,
) -> Result<LoadSession, LoadError> {
    let pb = ProgressBar::new(datasets.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("=> "));
    }

    let mut records = Vec::new();
    let mut raw = Vec::new();
    let mut failed = Vec::new();
    let mut last_error = None;

    for ds in datasets {
        pb.set_message(ds.label);
        match fetch::fetch_all(source, ds.url, proxy).await {
            Ok(outcome) => {
                info!(
                    "Loaded {}: {} rows in {} pages (stop: {:?})",
                    ds.id,
                    outcome.rows.len(),
                    outcome.pages,
                    outcome.stop
                );
                records.extend(
                    outcome
                        .rows
                        .iter()
                        .map(|row| normalize_record(ds.label, ds.source_name, row)),
                );
                raw.push(RawCapture {
                    id: ds.id.to_string(),
                    label: ds.label.to_string(),
                    source: ds.source_name.to_string(),
                    rows: outcome.rows,
                });
            }
            Err(e) => {
                warn!("Fetch failed for {}: {}", ds.id, e);
                failed.push(ds.id.to_string());
                last_error = Some((ds.id, e));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if records.is_empty() {
        if let Some((dataset, source)) = last_error {
            return Err(LoadError::AllFailed {
                dataset: dataset.to_string(),
                source,
            });
        }
    }

    Ok(LoadSession {
        timestamp: Utc::now(),
        records,
        raw,
        origin: Origin::Fetched,
        failed,
    })
}

/// Serve the stored snapshot unless `refresh` is set or it is empty;
/// otherwise fetch everything and store the new snapshot.
pub async fn load_or_cached<S: PageSource>(
    conn: &Connection,
    source: &S,
    datasets: &[DatasetSource],
    proxy: Option<&Proxy>,
    refresh: bool,
) -> Result<LoadSession> {
    if !refresh {
        if let Some(snapshot) = db::load_snapshot(conn)? {
            if !snapshot.normalized.is_empty() {
                info!("Using cached snapshot from {}", snapshot.timestamp);
                return Ok(LoadSession::from_snapshot(snapshot));
            }
        }
    }

    let session = load_all(source, datasets, proxy).await?;
    db::save_snapshot(conn, &session.to_snapshot())?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use serde_json::{json, Value};
    use std::cell::Cell;

    const TEST_DATASETS: &[DatasetSource] = &[
        DatasetSource {
            id: "a",
            label: "甲類",
            url: "https://open.test/a?scope=resourceAquire",
            source_name: "甲來源",
        },
        DatasetSource {
            id: "b",
            label: "乙類",
            url: "https://open.test/b?scope=resourceAquire",
            source_name: "乙來源",
        },
    ];

    /// Dataset `a` serves two rows; `b` fails unless `b_ok`.
    struct TwoDatasets {
        a_ok: bool,
        b_ok: bool,
        calls: Cell<usize>,
    }

    impl TwoDatasets {
        fn new(a_ok: bool, b_ok: bool) -> Self {
            TwoDatasets { a_ok, b_ok, calls: Cell::new(0) }
        }
    }

    impl PageSource for TwoDatasets {
        async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
            self.calls.set(self.calls.get() + 1);
            let ok = if url.contains("/a?") { self.a_ok } else { self.b_ok };
            if !ok {
                return Err(FetchError::Network {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    url: url.to_string(),
                });
            }
            if url.contains("/a?") {
                Ok(json!({ "result": { "count": 2, "results": [
                    { "行政區": "中正區", "路段": "重慶南路一段", "年份": "100年" },
                    { "行政區": "萬華區", "路段": "艋舺大道", "年份": "96年" }
                ] } }))
            } else {
                Ok(json!({ "result": { "results": [
                    { "行政區別": "內湖", "路口": "成功路/民權東路", "備註": "2014年開放" }
                ] } }))
            }
        }
    }

    #[tokio::test]
    async fn loads_every_dataset() {
        let api = TwoDatasets::new(true, true);
        let session = load_all(&api, TEST_DATASETS, None).await.unwrap();
        assert_eq!(session.records.len(), 3);
        assert_eq!(session.raw.len(), 2);
        assert_eq!(session.raw[1].rows.len(), 1);
        assert_eq!(session.records[2].category, "乙類");
        assert_eq!(session.records[2].source, "乙來源");
        assert!(session.failed.is_empty());
        assert_eq!(session.origin, Origin::Fetched);
    }

    #[tokio::test]
    async fn one_failure_is_isolated() {
        let api = TwoDatasets::new(true, false);
        let session = load_all(&api, TEST_DATASETS, None).await.unwrap();
        assert_eq!(session.records.len(), 2);
        assert_eq!(session.failed, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn all_failures_surface_last_error() {
        let api = TwoDatasets::new(false, false);
        let err = load_all(&api, TEST_DATASETS, None).await.unwrap_err();
        let LoadError::AllFailed { dataset, source } = err;
        assert_eq!(dataset, "b");
        assert!(matches!(source, FetchError::Network { .. }));
    }

    #[tokio::test]
    async fn cache_skips_network() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();

        let api = TwoDatasets::new(true, true);
        let first = load_or_cached(&conn, &api, TEST_DATASETS, None, false).await.unwrap();
        assert_eq!(first.origin, Origin::Fetched);
        let calls = api.calls.get();

        let second = load_or_cached(&conn, &api, TEST_DATASETS, None, false).await.unwrap();
        assert_eq!(second.origin, Origin::Cache);
        assert_eq!(second.records, first.records);
        assert_eq!(api.calls.get(), calls);

        let third = load_or_cached(&conn, &api, TEST_DATASETS, None, true).await.unwrap();
        assert_eq!(third.origin, Origin::Fetched);
        assert!(api.calls.get() > calls);
    }

    #[tokio::test]
    async fn failed_load_keeps_old_snapshot() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        load_or_cached(&conn, &TwoDatasets::new(true, true), TEST_DATASETS, None, false)
            .await
            .unwrap();

        let res = load_or_cached(&conn, &TwoDatasets::new(false, false), TEST_DATASETS, None, true).await;
        assert!(res.is_err());
        assert_eq!(db::load_snapshot(&conn).unwrap().unwrap().normalized.len(), 3);
    }

    /// Dataset `a` answers with a truncated body, `b` with valid JSON.
    struct BrokenBody;

    impl PageSource for BrokenBody {
        async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
            if url.contains("/a?") {
                fetch::parse_body("{\"result\": {\"results\": [")
            } else {
                fetch::parse_body(r#"{"result": {"results": [{"行政區": "南港區", "路段": "研究院路"}]}}"#)
            }
        }
    }

    #[tokio::test]
    async fn malformed_json_is_isolated() {
        let session = load_all(&BrokenBody, TEST_DATASETS, None).await.unwrap();
        assert_eq!(session.failed, vec!["a".to_string()]);
        assert_eq!(session.records.len(), 1);
        assert_eq!(session.records[0].category, "乙類");
        assert_eq!(session.raw.len(), 1);
    }

    #[tokio::test]
    async fn malformed_json_everywhere_is_parse_error() {
        let single = &TEST_DATASETS[..1];
        let err = load_all(&BrokenBody, single, None).await.unwrap_err();
        let LoadError::AllFailed { dataset, source } = err;
        assert_eq!(dataset, "a");
        assert!(matches!(source, FetchError::Parse(_)));
    }
}
