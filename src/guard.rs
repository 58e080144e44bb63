//! Duplicate-engagement check.
//!
//! A call engagement is keyed by the provider UUID embedded in its notes.
//! Before writing, the engine asks the CRM for any call whose body contains
//! that UUID as a token.
//!
//! The check fails open: when the search itself fails, the error is logged
//! and the call is treated as new. A CRM outage therefore risks a duplicate
//! engagement rather than a silently dropped call.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use cdr_sync_core::crm::CrmApi;
use cdr_sync_core::models::CallObject;

use crate::error_log::ErrorLog;

#[derive(Clone)]
pub struct DuplicateGuard {
    crm: Arc<dyn CrmApi>,
    log: ErrorLog,
}

impl DuplicateGuard {
    pub fn new(crm: Arc<dyn CrmApi>, log: ErrorLog) -> Self {
        Self { crm, log }
    }

    /// Whether an engagement for `call_uuid` already exists.
    ///
    /// Never errors: a failed search is logged and reported as `false`.
    pub async fn has_existing_engagement(&self, call_uuid: &str) -> bool {
        match self.find_engagement(call_uuid).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(
                    call_uuid,
                    error = %format!("{:#}", e),
                    "duplicate check failed, treating call as new"
                );
                self.log
                    .record("has_existing_engagement", &e, &[("call_uuid", call_uuid)]);
                false
            }
        }
    }

    /// The first engagement whose notes carry `call_uuid`.
    pub async fn find_engagement(&self, call_uuid: &str) -> Result<Option<CallObject>> {
        let calls = self
            .crm
            .search_calls_by_body(call_uuid)
            .await
            .with_context(|| format!("call search for '{}' failed", call_uuid))?;
        if !calls.is_empty() {
            debug!(call_uuid, matches = calls.len(), "existing engagement found");
        }
        Ok(calls.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdr_sync_core::crm::memory::{Endpoint, InMemoryCrm};
    use cdr_sync_core::models::{CallDirection, CallProperties, CallStatus};

    fn props(body: &str) -> CallProperties {
        CallProperties {
            direction: CallDirection::Inbound,
            duration_secs: 10,
            from_number: "+905318865036".into(),
            to_number: "+905382752273".into(),
            recording_url: String::new(),
            status: CallStatus::Completed,
            title: "Call".into(),
            timestamp_ms: 0,
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn finds_call_by_uuid_token() {
        let crm = Arc::new(InMemoryCrm::new());
        crm.create_call(&props("Santral Call Record\n• UUID: abc-1"))
            .await
            .unwrap();
        let guard = DuplicateGuard::new(crm, ErrorLog::new());

        assert!(guard.has_existing_engagement("abc-1").await);
        assert!(!guard.has_existing_engagement("abc").await);
    }

    #[tokio::test]
    async fn search_failure_fails_open() {
        let crm = Arc::new(InMemoryCrm::new());
        crm.fail(Endpoint::CallSearch);
        let log = ErrorLog::new();
        let guard = DuplicateGuard::new(crm, log.clone());

        assert!(!guard.has_existing_engagement("abc-1").await);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].method, "has_existing_engagement");
        assert!(log.entries()[0].response.is_some());
    }

    #[tokio::test]
    async fn find_engagement_propagates() {
        let crm = Arc::new(InMemoryCrm::new());
        crm.fail(Endpoint::CallSearch);
        let guard = DuplicateGuard::new(crm, ErrorLog::new());
        assert!(guard.find_engagement("abc-1").await.is_err());
    }
}
