//! Santral (Bulut Santralim) telephony API client.
//!
//! Two endpoints are used, both authenticated with a `key` query parameter:
//!
//! - `GET {base}/cdrs`: call-detail records for a time window, paginated.
//! - `GET {base}/cdrs/{uuid}`: one call-detail record.
//! - `POST {base}/recording_url/`: a downloadable link for one recording.
//!
//! All three share one [`RateLimiter`]; a request over the per-minute budget is
//! refused locally with [`RateLimited`](crate::rate_limit::RateLimited)
//! instead of being sent.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use cdr_sync_core::models::CallRecord;

use crate::config::SantralConfig;
use crate::rate_limit::RateLimiter;
use crate::traits::{CallFetcher, CallFilter, CallPage, Pagination, RecordingLocator};

#[derive(Debug, Deserialize)]
struct CdrResponse {
    #[serde(default)]
    cdrs: Vec<CallRecord>,
    #[serde(default)]
    pagination: Pagination,
}

// Single-record answers come bare, wrapped as `{"cdr": ...}`, or in the
// list shape of `/cdrs`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CallDetail {
    Wrapped { cdr: CallRecord },
    Listed { cdrs: Vec<CallRecord> },
    Bare(Box<CallRecord>),
}

pub struct SantralClient {
    client: Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
}

impl SantralClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        max_requests_per_minute: u32,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            limiter: RateLimiter::per_minute(max_requests_per_minute),
        })
    }

    pub fn from_config(config: &SantralConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            config.api_key()?,
            Duration::from_secs(config.timeout_secs),
            config.max_requests_per_minute,
        )
    }

    /// Fetch one call-detail record by UUID. `Ok(None)` when the provider
    /// does not know the call.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_call(&self, call_uuid: &str) -> Result<Option<CallRecord>> {
        self.limiter.try_acquire()?;

        let response = self
            .client
            .get(call_detail_url(&self.base_url, call_uuid))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .context("failed to reach Santral /cdrs/{uuid}")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(call_uuid, "call record not found");
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!(Self::read_error(response).await);
        }

        let body: Value = response
            .json()
            .await
            .context("invalid Santral /cdrs/{uuid} response")?;
        parse_call_detail(body, call_uuid)
    }

    async fn read_error(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("Santral API error {}: {}", status, body)
    }
}

/// Query parameters for `/cdrs`, without the key.
pub fn cdr_query(filter: &CallFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", filter.limit.max(1).to_string())];
    if let Some(from) = filter.from_time {
        query.push(("start_stamp_from", format_stamp(from)));
    }
    if let Some(to) = filter.to_time {
        query.push(("start_stamp_to", format_stamp(to)));
    }
    if let Some(present) = filter.recording_present {
        query.push(("recording_present", present.to_string()));
    }
    if let Some(direction) = &filter.direction {
        query.push(("direction", direction.clone()));
    }
    if let Some(caller) = &filter.caller_number {
        query.push(("caller_id_number", caller.clone()));
    }
    if let Some(missed) = filter.missed {
        query.push(("missed", missed.to_string()));
    }
    if let Some(dest) = &filter.destination_number {
        query.push(("destination_number", dest.clone()));
    }
    if let Some(queue) = &filter.queue {
        query.push(("queue", queue.clone()));
    }
    if let Some(page) = filter.page {
        query.push(("page", page.to_string()));
    }
    query
}

fn call_detail_url(base_url: &str, call_uuid: &str) -> String {
    format!("{}/cdrs/{}", base_url, urlencoding::encode(call_uuid))
}

fn parse_call_detail(body: Value, call_uuid: &str) -> Result<Option<CallRecord>> {
    if body.is_null() {
        return Ok(None);
    }
    let detail: CallDetail = serde_json::from_value(body)
        .with_context(|| format!("unrecognized call record for {}", call_uuid))?;
    let record = match detail {
        CallDetail::Wrapped { cdr } => Some(cdr),
        CallDetail::Listed { cdrs } => cdrs.into_iter().find(|r| r.uuid == call_uuid),
        CallDetail::Bare(record) => Some(*record),
    };
    Ok(record)
}

/// `2024-11-05T08:34:51 UTC`
fn format_stamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S UTC").to_string()
}

// The endpoint answers with the bare link, sometimes JSON-quoted and
// sometimes wrapped as `{"url": ...}`.
fn parse_recording_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    let url = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(map)) => map.get("url")?.as_str()?.to_string(),
        _ => trimmed.to_string(),
    };
    (url.starts_with("http://") || url.starts_with("https://")).then_some(url)
}

#[async_trait]
impl CallFetcher for SantralClient {
    fn name(&self) -> &str {
        "santral"
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_calls(&self, filter: &CallFilter) -> Result<CallPage> {
        self.limiter.try_acquire()?;

        let response = self
            .client
            .get(format!("{}/cdrs", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .query(&cdr_query(filter))
            .send()
            .await
            .context("failed to reach Santral /cdrs")?;

        if !response.status().is_success() {
            bail!(Self::read_error(response).await);
        }

        let body: CdrResponse = response
            .json()
            .await
            .context("invalid Santral /cdrs response")?;
        debug!(
            records = body.cdrs.len(),
            page = body.pagination.page,
            total = body.pagination.total_count,
            "call records fetched"
        );
        Ok(CallPage {
            records: body.cdrs,
            pagination: body.pagination,
        })
    }
}

#[async_trait]
impl RecordingLocator for SantralClient {
    #[instrument(level = "debug", skip(self))]
    async fn recording_url(&self, call_uuid: &str) -> Result<String> {
        self.limiter.try_acquire()?;

        let response = self
            .client
            .post(format!("{}/recording_url/", self.base_url))
            .query(&[("key", self.api_key.as_str()), ("call_uuid", call_uuid)])
            .header("Accept", "*/*")
            .send()
            .await
            .context("failed to reach Santral /recording_url")?;

        if !response.status().is_success() {
            bail!(Self::read_error(response).await);
        }

        let body = response.text().await?;
        match parse_recording_body(&body) {
            Some(url) => Ok(url),
            None => bail!("no recording link for call {}: {}", call_uuid, body.trim()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn query_carries_window_and_filters() {
        let filter = CallFilter {
            from_time: Some(Utc.with_ymd_and_hms(2024, 11, 5, 0, 0, 0).unwrap()),
            to_time: Some(Utc.with_ymd_and_hms(2024, 11, 5, 23, 59, 59).unwrap()),
            limit: 100,
            direction: Some("inbound".into()),
            missed: Some(false),
            ..Default::default()
        };
        let query = cdr_query(&filter);
        assert!(query.contains(&("limit", "100".to_string())));
        assert!(query.contains(&("start_stamp_from", "2024-11-05T00:00:00 UTC".to_string())));
        assert!(query.contains(&("start_stamp_to", "2024-11-05T23:59:59 UTC".to_string())));
        assert!(query.contains(&("direction", "inbound".to_string())));
        assert!(query.contains(&("missed", "false".to_string())));
        assert!(!query.iter().any(|(k, _)| *k == "page"));
    }

    #[test]
    fn recording_body_forms() {
        let url = "https://rec.example.com/a.mp3";
        assert_eq!(parse_recording_body(url).as_deref(), Some(url));
        assert_eq!(
            parse_recording_body(&format!("\"{}\"", url)).as_deref(),
            Some(url)
        );
        assert_eq!(
            parse_recording_body(&format!("{{\"url\":\"{}\"}}", url)).as_deref(),
            Some(url)
        );
        assert_eq!(parse_recording_body("{\"error\":\"not found\"}"), None);
    }

    #[test]
    fn call_detail_url_escapes_uuid() {
        assert_eq!(
            call_detail_url("https://api.example.com", "abc-1"),
            "https://api.example.com/cdrs/abc-1"
        );
        assert_eq!(
            call_detail_url("https://api.example.com", "a/b c"),
            "https://api.example.com/cdrs/a%2Fb%20c"
        );
    }

    #[test]
    fn call_detail_shapes() {
        let record = serde_json::json!({
            "call_uuid": "abc-1",
            "caller_id_number": "1002 (905318865036)",
            "destination_number": "05382752273",
            "start_stamp": "2024-11-05 11:34:51 +0300",
            "duration": "00:02:02",
            "result": "Cevaplandı",
            "recording_present": "true"
        });

        let bare = parse_call_detail(record.clone(), "abc-1").unwrap().unwrap();
        assert_eq!(bare.dialable_caller(), "1002");
        assert_eq!(bare.duration_secs().unwrap(), 122);

        let wrapped = parse_call_detail(serde_json::json!({ "cdr": record.clone() }), "abc-1")
            .unwrap()
            .unwrap();
        assert_eq!(wrapped.uuid, "abc-1");

        let listed = serde_json::json!({ "cdrs": [record], "pagination": { "total_count": 1 } });
        assert!(parse_call_detail(listed.clone(), "abc-1").unwrap().is_some());
        assert!(parse_call_detail(listed, "other").unwrap().is_none());

        assert!(parse_call_detail(Value::Null, "abc-1").unwrap().is_none());
        assert!(parse_call_detail(serde_json::json!({ "error": "boom" }), "abc-1").is_err());
    }

    #[test]
    fn cdr_response_parses() {
        let body: CdrResponse = serde_json::from_value(serde_json::json!({
            "cdrs": [{
                "call_uuid": "abc-1",
                "caller_id_number": "05318865036",
                "destination_number": "05382752273",
                "start_stamp": "2024-11-05 11:34:51 +0300",
                "duration": "00:02:02",
                "result": "Cevaplandı",
                "recording_present": "true"
            }],
            "pagination": { "page": 1, "total_count": 1, "total_pages": 1, "limit": 100 }
        }))
        .unwrap();
        assert_eq!(body.cdrs[0].uuid, "abc-1");
        assert!(body.cdrs[0].has_recording());
        assert_eq!(body.pagination.total_count, 1);
    }
}
