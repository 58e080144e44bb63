//! Call note rendering.
//!
//! Every note carries the provider call UUID on its own line. The CRM has no
//! other field correlating an engagement with the provider call, so the
//! duplicate check searches note bodies for that token.

use chrono::{DateTime, Utc};

use crate::models::CallRecord;
use crate::phone;

/// Inputs for a note synthesized at write time.
#[derive(Debug, Clone)]
pub struct CallNote<'a> {
    pub source_label: &'a str,
    pub call_uuid: &'a str,
    pub from_number: &'a str,
    pub to_number: &'a str,
    /// Contact display name, or the raw destination when no contact matched.
    pub counterpart: &'a str,
    pub company_name: Option<&'a str>,
    pub timestamp_ms: i64,
    pub duration_secs: u64,
    pub status_text: &'a str,
    pub recording_url: Option<&'a str>,
}

impl CallNote<'_> {
    pub fn render(&self) -> String {
        let callee = match self.company_name {
            Some(company) if !company.is_empty() => format!("{} ({})", self.counterpart, company),
            _ => self.counterpart.to_string(),
        };
        let recording = match self.recording_url {
            Some(url) if !url.is_empty() => format!("• Recording: {}", url),
            _ => "• No recording".to_string(),
        };
        format!(
            "{label} Call Details\n\
             \n\
             DETAILS\n\
             --------\n\
             • UUID: {uuid}\n\
             • Caller: {from}\n\
             • Callee: {callee}\n\
             • Recipient number: {to}\n\
             • Start: {start}\n\
             • Duration: {mins} minutes {secs} seconds\n\
             • Status: {status}\n\
             {recording}",
            label = self.source_label,
            uuid = self.call_uuid,
            from = phone::to_display_form(self.from_number),
            callee = callee,
            to = phone::to_display_form(self.to_number),
            start = format_timestamp_ms(self.timestamp_ms),
            mins = self.duration_secs / 60,
            secs = self.duration_secs % 60,
            status = self.status_text,
            recording = recording,
        )
    }
}

/// The note the sync run attaches, built from the record alone.
pub fn record_note(source_label: &str, record: &CallRecord) -> String {
    let queue = record
        .queue
        .as_deref()
        .filter(|q| !q.is_empty())
        .unwrap_or("none");
    let wait = record
        .queue_wait_seconds
        .as_deref()
        .filter(|w| !w.is_empty())
        .unwrap_or("0");
    let recording = if record.has_recording() {
        "• Recording available"
    } else {
        "• No recording"
    };
    format!(
        "{label} Call Record\n\
         \n\
         DETAILS\n\
         --------\n\
         • UUID: {uuid}\n\
         • Start: {start}\n\
         • Duration: {duration}\n\
         • Status: {status}\n\
         • Queue: {queue}\n\
         • Queue wait: {wait} seconds\n\
         {recording}",
        label = source_label,
        uuid = record.uuid,
        start = record.start_stamp,
        duration = record.duration,
        status = record.result,
        queue = queue,
        wait = wait,
        recording = recording,
    )
}

/// Return `notes` unchanged if it already mentions `call_uuid`, otherwise
/// append a UUID line.
pub fn ensure_uuid(notes: &str, call_uuid: &str) -> String {
    if notes.contains(call_uuid) {
        notes.to_string()
    } else {
        format!("{}\n• UUID: {}", notes.trim_end(), call_uuid)
    }
}

fn format_timestamp_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}
