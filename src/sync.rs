//! Sync orchestration.
//!
//! One run fetches one batch of call records for a time window and drives
//! each record through the pipeline, strictly in order:
//!
//! ```text
//! record ─▶ resolve destination ─▶ duplicate check ─▶ write ─▶ link
//!              │ no contact            │ exists          │
//!              ▼                       ▼                 ▼
//!           skipped                 skipped        success / failed
//! ```
//!
//! A failure inside one record is caught at the record boundary, added to
//! [`SyncStats::errors`], and the run moves on. Only a failed fetch aborts
//! the run.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use cdr_sync_core::models::{CallRecord, SyncFailure, SyncStats};
use cdr_sync_core::notes::record_note;

use crate::client::CrmClient;
use crate::config::{Config, NoteMode};
use crate::engagement::{EngagementOutcome, EngagementParams};
use crate::progress::{NoProgress, SyncProgressEvent, SyncProgressReporter};
use crate::traits::{CallFetcher, CallFilter, RecordingLocator};

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub window_hours: i64,
    pub page_limit: u32,
    pub source_label: String,
    pub note_mode: NoteMode,
    /// Base for the fallback recording link `{base}/recording/{uuid}`.
    pub recording_base_url: String,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window_hours: config.sync.window_hours,
            page_limit: config.santral.page_limit,
            source_label: config.hubspot.source_label.clone(),
            note_mode: config.sync.note_mode,
            recording_base_url: config.santral.base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::minimal())
    }
}

/// How one record finished, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Written { contact_matched: bool, company_matched: bool },
    NoContact,
    Duplicate,
}

impl RecordOutcome {
    fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Written { .. } => "written",
            RecordOutcome::NoContact => "no contact",
            RecordOutcome::Duplicate => "duplicate",
        }
    }
}

pub struct SyncOrchestrator {
    client: CrmClient,
    fetcher: Arc<dyn CallFetcher>,
    recordings: Option<Arc<dyn RecordingLocator>>,
    settings: SyncSettings,
    progress: Box<dyn SyncProgressReporter>,
}

impl SyncOrchestrator {
    pub fn new(client: CrmClient, fetcher: Arc<dyn CallFetcher>, settings: SyncSettings) -> Self {
        Self {
            client,
            fetcher,
            recordings: None,
            settings,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_recordings(mut self, locator: Arc<dyn RecordingLocator>) -> Self {
        self.recordings = Some(locator);
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn SyncProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn client(&self) -> &CrmClient {
        &self.client
    }

    /// Sync the calls started between `start` and `end`.
    ///
    /// `end` defaults to now and `start` to `window_hours` before `end`.
    pub async fn run_sync(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<SyncStats> {
        let end = end.unwrap_or_else(Utc::now);
        let start = start.unwrap_or_else(|| end - Duration::hours(self.settings.window_hours));
        if start > end {
            bail!("sync window start {} is after end {}", start, end);
        }

        info!(
            source = self.fetcher.name(),
            from = %start,
            to = %end,
            limit = self.settings.page_limit,
            "fetching call records"
        );
        self.progress.report(SyncProgressEvent::Fetching {
            source: self.fetcher.name().to_string(),
        });

        let filter = CallFilter {
            from_time: Some(start),
            to_time: Some(end),
            limit: self.settings.page_limit,
            ..Default::default()
        };
        let page = self
            .fetcher
            .fetch_calls(&filter)
            .await
            .with_context(|| format!("failed to fetch call records from {}", self.fetcher.name()))?;

        Ok(self.sync_records(&page.records).await)
    }

    /// Drive `records` through the pipeline and return the run statistics.
    pub async fn sync_records(&self, records: &[CallRecord]) -> SyncStats {
        let mut stats = SyncStats {
            total: records.len() as u64,
            ..Default::default()
        };
        info!(total = stats.total, "processing call records");

        for record in records {
            stats.processed += 1;
            let outcome = match self.process_record(record).await {
                Ok(outcome) => {
                    match outcome {
                        RecordOutcome::Written {
                            contact_matched,
                            company_matched,
                        } => {
                            stats.success += 1;
                            stats.contact_matched += u64::from(contact_matched);
                            stats.company_matched += u64::from(company_matched);
                        }
                        RecordOutcome::NoContact | RecordOutcome::Duplicate => stats.skipped += 1,
                    }
                    outcome.label()
                }
                Err(e) => {
                    let error = format!("{:#}", e);
                    warn!(call_uuid = record.uuid.as_str(), error = error.as_str(), "record failed");
                    stats.failed += 1;
                    stats.errors.push(SyncFailure {
                        uuid: record.uuid.clone(),
                        number: record.dialable_destination().to_string(),
                        error,
                        timestamp: Utc::now(),
                    });
                    "failed"
                }
            };

            self.progress.report(SyncProgressEvent::Processing {
                source: self.fetcher.name().to_string(),
                n: stats.processed,
                total: stats.total,
                call_uuid: record.uuid.clone(),
                outcome,
            });
        }

        info!(
            total = stats.total,
            success = stats.success,
            skipped = stats.skipped,
            failed = stats.failed,
            success_rate = format!("{:.1}", stats.success_rate()).as_str(),
            match_rate = format!("{:.1}", stats.match_rate()).as_str(),
            "sync finished"
        );
        stats
    }

    async fn process_record(&self, record: &CallRecord) -> Result<RecordOutcome> {
        let destination = record.dialable_destination();

        let Some(contact) = self.client.resolver.find_contact_by_phone(destination).await? else {
            info!(call_uuid = record.uuid.as_str(), destination, "no contact, skipping");
            return Ok(RecordOutcome::NoContact);
        };

        if self.client.guard.has_existing_engagement(&record.uuid).await {
            info!(call_uuid = record.uuid.as_str(), "already synced, skipping");
            return Ok(RecordOutcome::Duplicate);
        }

        let notes = match self.settings.note_mode {
            NoteMode::Record => Some(record_note(&self.settings.source_label, record)),
            NoteMode::Synthesized => None,
        };
        let params = EngagementParams {
            contact_id: Some(contact.id),
            from_number: record.dialable_caller().to_string(),
            to_number: destination.to_string(),
            duration_secs: record.duration_secs()?,
            recording_url: self.recording_url(record).await,
            status_text: record.result.clone(),
            timestamp_ms: record.start_timestamp_ms()?,
            call_uuid: record.uuid.clone(),
            notes,
        };

        match self.client.writer.create_engagement(&params).await? {
            EngagementOutcome::Created(created) => Ok(RecordOutcome::Written {
                contact_matched: created.contact_id.is_some(),
                company_matched: created.company_id.is_some(),
            }),
            EngagementOutcome::Duplicate => Ok(RecordOutcome::Duplicate),
        }
    }

    // Only synthesized notes ask the locator; every other case, and a
    // locator failure, uses the provider's static recording path.
    async fn recording_url(&self, record: &CallRecord) -> String {
        if !record.has_recording() {
            return String::new();
        }
        if let (NoteMode::Synthesized, Some(locator)) = (self.settings.note_mode, &self.recordings) {
            match locator.recording_url(&record.uuid).await {
                Ok(url) => return url,
                Err(e) => warn!(
                    call_uuid = record.uuid.as_str(),
                    error = %format!("{:#}", e),
                    "recording lookup failed, using fallback link"
                ),
            }
        }
        format!("{}/recording/{}", self.settings.recording_base_url, record.uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientSettings;
    use crate::traits::CallPage;
    use async_trait::async_trait;
    use cdr_sync_core::crm::memory::InMemoryCrm;
    use cdr_sync_core::models::Contact;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingFetcher {
        records: Vec<CallRecord>,
        seen: Mutex<Vec<CallFilter>>,
    }

    #[async_trait]
    impl CallFetcher for RecordingFetcher {
        fn name(&self) -> &str {
            "test"
        }

        async fn fetch_calls(&self, filter: &CallFilter) -> Result<CallPage> {
            self.seen.lock().unwrap().push(filter.clone());
            Ok(CallPage {
                records: self.records.clone(),
                ..Default::default()
            })
        }
    }

    struct FixedLocator(Result<String, String>);

    #[async_trait]
    impl RecordingLocator for FixedLocator {
        async fn recording_url(&self, _call_uuid: &str) -> Result<String> {
            self.0.clone().map_err(anyhow::Error::msg)
        }
    }

    fn client(crm: Arc<InMemoryCrm>) -> CrmClient {
        let settings = ClientSettings {
            search_delay: std::time::Duration::ZERO,
            ..Default::default()
        };
        CrmClient::new(crm, &settings)
    }

    fn record(uuid: &str) -> CallRecord {
        CallRecord::new(
            uuid,
            "05318865036",
            "05382752273",
            "2024-11-05 11:34:51 +0300",
            "00:02:02",
            "Cevaplandı",
            true,
        )
    }

    #[tokio::test]
    async fn default_window_is_window_hours_back() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let orchestrator = SyncOrchestrator::new(
            client(Arc::new(InMemoryCrm::new())),
            fetcher.clone(),
            SyncSettings::default(),
        );

        let end = Utc::now();
        let stats = orchestrator.run_sync(None, Some(end)).await.unwrap();

        assert_eq!(stats.total, 0);
        let seen = fetcher.seen.lock().unwrap();
        assert_eq!(seen[0].to_time, Some(end));
        assert_eq!(seen[0].from_time, Some(end - Duration::hours(24)));
        assert_eq!(seen[0].limit, 100);
    }

    #[tokio::test]
    async fn inverted_window_is_rejected() {
        let orchestrator = SyncOrchestrator::new(
            client(Arc::new(InMemoryCrm::new())),
            Arc::new(RecordingFetcher::default()),
            SyncSettings::default(),
        );
        let now = Utc::now();
        assert!(orchestrator
            .run_sync(Some(now), Some(now - Duration::hours(1)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn record_note_and_fallback_recording_link() {
        let crm = Arc::new(InMemoryCrm::new());
        crm.add_contact(Contact {
            id: "7".into(),
            phone: Some("+905382752273".into()),
            ..Default::default()
        });
        let orchestrator = SyncOrchestrator::new(
            client(crm.clone()),
            Arc::new(RecordingFetcher::default()),
            SyncSettings::default(),
        )
        .with_recordings(Arc::new(FixedLocator(Ok("https://rec/x.mp3".into()))));

        let stats = orchestrator.sync_records(&[record("abc-1")]).await;

        assert_eq!(stats.success, 1);
        let props = &crm.calls()[0].props;
        assert!(props.body.starts_with("Santral Call Record"));
        assert_eq!(
            props.recording_url,
            "https://api.bulutsantralim.com/recording/abc-1"
        );
    }

    #[tokio::test]
    async fn synthesized_mode_asks_the_locator() {
        let crm = Arc::new(InMemoryCrm::new());
        crm.add_contact(Contact {
            id: "7".into(),
            phone: Some("+905382752273".into()),
            ..Default::default()
        });
        let settings = SyncSettings {
            note_mode: NoteMode::Synthesized,
            ..Default::default()
        };

        let ok = SyncOrchestrator::new(
            client(crm.clone()),
            Arc::new(RecordingFetcher::default()),
            settings.clone(),
        )
        .with_recordings(Arc::new(FixedLocator(Ok("https://rec/x.mp3".into()))));
        ok.sync_records(&[record("abc-1")]).await;

        let failing = SyncOrchestrator::new(
            client(crm.clone()),
            Arc::new(RecordingFetcher::default()),
            settings,
        )
        .with_recordings(Arc::new(FixedLocator(Err("rate limited".into()))));
        failing.sync_records(&[record("abc-2")]).await;

        let calls = crm.calls();
        assert!(calls[0].props.body.contains("• Recording: https://rec/x.mp3"));
        assert_eq!(
            calls[1].props.recording_url,
            "https://api.bulutsantralim.com/recording/abc-2"
        );
    }
}
