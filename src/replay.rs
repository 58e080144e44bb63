//! Replay of saved call records.
//!
//! Reads call records from a local JSON file instead of the provider API.
//! The file may hold either a bare array of records or a saved `/cdrs`
//! response (`{"cdrs": [...], "pagination": {...}}`). Window bounds,
//! direction, numbers, queue, and the recording flag from the filter are
//! applied locally; records whose start stamp cannot be read are kept so
//! the sync run reports them as failures.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use cdr_sync_core::models::{parse_start_stamp, CallRecord};

use crate::traits::{CallFetcher, CallFilter, CallPage, Pagination};

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayFile {
    Records(Vec<CallRecord>),
    Response { cdrs: Vec<CallRecord> },
}

pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<CallRecord>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read replay file: {}", self.path.display()))?;
        let file: ReplayFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse replay file: {}", self.path.display()))?;
        Ok(match file {
            ReplayFile::Records(records) => records,
            ReplayFile::Response { cdrs } => cdrs,
        })
    }
}

fn matches(record: &CallRecord, filter: &CallFilter) -> bool {
    if let Some(start) = parse_start_stamp(&record.start_stamp) {
        if filter.from_time.is_some_and(|from| start < from) {
            return false;
        }
        if filter.to_time.is_some_and(|to| start > to) {
            return false;
        }
    }
    if let Some(direction) = &filter.direction {
        if record.direction.as_deref() != Some(direction.as_str()) {
            return false;
        }
    }
    if let Some(caller) = &filter.caller_number {
        if record.dialable_caller() != caller {
            return false;
        }
    }
    if let Some(dest) = &filter.destination_number {
        if record.dialable_destination() != dest {
            return false;
        }
    }
    if let Some(queue) = &filter.queue {
        if record.queue.as_deref() != Some(queue.as_str()) {
            return false;
        }
    }
    if let Some(present) = filter.recording_present {
        if record.has_recording() != present {
            return false;
        }
    }
    true
}

#[async_trait]
impl CallFetcher for FileFetcher {
    fn name(&self) -> &str {
        "replay"
    }

    async fn fetch_calls(&self, filter: &CallFilter) -> Result<CallPage> {
        let mut records: Vec<CallRecord> = self
            .load()?
            .into_iter()
            .filter(|r| matches(r, filter))
            .collect();
        let total = records.len() as u64;
        if filter.limit > 0 {
            records.truncate(filter.limit as usize);
        }
        Ok(CallPage {
            pagination: Pagination {
                page: 1,
                total_count: total,
                total_pages: 1,
                limit: filter.limit,
            },
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    fn write_file(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    const RECORDS: &str = r#"[
        {"call_uuid": "a", "caller_id_number": "05318865036", "destination_number": "05382752273",
         "start_stamp": "2024-11-05 09:00:00 +0000", "duration": "00:00:10", "result": "Cevaplandı",
         "recording_present": "false"},
        {"call_uuid": "b", "caller_id_number": "05318865036", "destination_number": "05382752274",
         "start_stamp": "2024-11-06 09:00:00 +0000", "duration": "00:00:20", "result": "Meşgul",
         "recording_present": true}
    ]"#;

    #[tokio::test]
    async fn reads_bare_array_and_applies_window() {
        let file = write_file(RECORDS);
        let fetcher = FileFetcher::new(file.path());

        let all = fetcher.fetch_calls(&CallFilter::default()).await.unwrap();
        assert_eq!(all.records.len(), 2);

        let filter = CallFilter {
            from_time: Some(Utc.with_ymd_and_hms(2024, 11, 6, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let page = fetcher.fetch_calls(&filter).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].uuid, "b");
        assert_eq!(page.pagination.total_count, 1);
    }

    #[tokio::test]
    async fn reads_saved_response_and_limits() {
        let file = write_file(&format!("{{\"cdrs\": {}, \"pagination\": {{}}}}", RECORDS));
        let fetcher = FileFetcher::new(file.path());

        let page = fetcher
            .fetch_calls(&CallFilter {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.pagination.total_count, 2);

        let recorded = fetcher
            .fetch_calls(&CallFilter {
                recording_present: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(recorded.records[0].uuid, "b");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let fetcher = FileFetcher::new("/nonexistent/calls.json");
        let err = fetcher.fetch_calls(&CallFilter::default()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read replay file"));
    }
}
