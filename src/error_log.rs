//! Per-client diagnostic log of raised errors.
//!
//! Every error a CRM-facing component raises (or swallows, as the duplicate
//! guard does) is appended here with the method name, the input context,
//! and the upstream response body when the CRM sent one. The log lives as
//! long as the client that owns it and can be cleared on demand; clones
//! share the same entries, so the resolver, guard, and writer built from
//! one client report into one log.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use cdr_sync_core::crm::CrmError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub error: String,
    pub context: BTreeMap<String, String>,
    pub response: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Arc<Mutex<Vec<ErrorLogEntry>>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` raised by `method` with the given input context.
    pub fn record(&self, method: &str, error: &anyhow::Error, context: &[(&str, &str)]) {
        let response = error
            .chain()
            .find_map(|cause| cause.downcast_ref::<CrmError>())
            .and_then(|e| e.response_body())
            .map(str::to_string);
        let entry = ErrorLogEntry {
            timestamp: Utc::now(),
            method: method.to_string(),
            error: format!("{:#}", error),
            context: context
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            response,
        };
        tracing::error!(
            method = %entry.method,
            error = %entry.error,
            response = entry.response.as_deref().unwrap_or(""),
            "CRM operation failed"
        );
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn records_context_and_response() {
        let log = ErrorLog::new();
        let err: anyhow::Error = Err::<(), _>(CrmError::Api {
            status: 429,
            body: "{\"message\":\"rate limited\"}".into(),
        })
        .context("searching contacts")
        .unwrap_err();

        log.record("find_contact_by_phone", &err, &[("phone", "0538")]);

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].method, "find_contact_by_phone");
        assert_eq!(entries[0].context.get("phone").map(String::as_str), Some("0538"));
        assert_eq!(
            entries[0].response.as_deref(),
            Some("{\"message\":\"rate limited\"}")
        );
        assert!(entries[0].error.contains("searching contacts"));
    }

    #[test]
    fn clones_share_entries_and_clear() {
        let log = ErrorLog::new();
        let other = log.clone();
        other.record("x", &anyhow::anyhow!("boom"), &[]);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].response, None);
        log.clear();
        assert!(other.is_empty());
    }
}
