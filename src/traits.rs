//! Collaborator traits for the sync engine.
//!
//! The engine does not talk to the telephony provider itself. It pulls a
//! batch of call records through a [`CallFetcher`] and, optionally, asks a
//! [`RecordingLocator`] for recording links. The HTTP implementations live in
//! [`crate::santral`]; [`crate::replay`] reads records from a JSON file.
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌──────────┐
//! │ CallFetcher  │──▶│  SyncOrchestrator │──▶│  CrmApi  │
//! │ Santral/File │   │ resolve→guard→    │   │ HubSpot  │
//! └──────────────┘   │ write→associate   │   └──────────┘
//!                    └─────────┬─────────┘
//!                              ▼
//!                     RecordingLocator (optional)
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use cdr_sync_core::models::CallRecord;

/// Filter for one fetch. The window bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallFilter {
    pub from_time: Option<DateTime<Utc>>,
    pub to_time: Option<DateTime<Utc>>,
    pub limit: u32,
    pub page: Option<u32>,
    /// `inbound`, `outbound`, or `internal`.
    pub direction: Option<String>,
    pub caller_number: Option<String>,
    pub destination_number: Option<String>,
    pub queue: Option<String>,
    pub recording_present: Option<bool>,
    pub missed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub limit: u32,
}

/// One page of call records.
#[derive(Debug, Clone, Default)]
pub struct CallPage {
    pub records: Vec<CallRecord>,
    pub pagination: Pagination,
}

/// A source of call-detail records.
///
/// Implementations apply their own request-rate limiting and report an
/// over-limit request as an error; callers do not retry.
#[async_trait]
pub trait CallFetcher: Send + Sync {
    /// Short name for logs and progress output (e.g. `"santral"`).
    fn name(&self) -> &str;

    async fn fetch_calls(&self, filter: &CallFilter) -> Result<CallPage>;
}

/// Resolves a downloadable recording link for a call.
#[async_trait]
pub trait RecordingLocator: Send + Sync {
    async fn recording_url(&self, call_uuid: &str) -> Result<String>;
}
