//! Contact lookup by phone number.
//!
//! CRM contacts store phone numbers in whatever shape the user typed, and
//! the search API matches whole tokens. The resolver normalizes the raw
//! number once, then tries each lookup variant in turn (E.164, digits
//! without `+`, national digits, trunk-prefixed national) and returns the
//! first contact found. Each attempt is preceded by a fixed pause to keep
//! the run under the CRM's request-rate ceiling.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use cdr_sync_core::crm::CrmApi;
use cdr_sync_core::models::Contact;
use cdr_sync_core::phone;

use crate::error_log::ErrorLog;

#[derive(Clone)]
pub struct ContactResolver {
    crm: Arc<dyn CrmApi>,
    delay: Duration,
    log: ErrorLog,
}

impl ContactResolver {
    pub fn new(crm: Arc<dyn CrmApi>, delay: Duration, log: ErrorLog) -> Self {
        Self { crm, delay, log }
    }

    /// First contact matching any lookup variant of `raw`.
    ///
    /// An unparseable number is `Ok(None)` without touching the CRM. A failed
    /// search aborts the lookup: the error is recorded and returned, and the
    /// remaining variants are not tried.
    pub async fn find_contact_by_phone(&self, raw: &str) -> Result<Option<Contact>> {
        let normalized = match phone::normalize(raw) {
            Some(n) => n,
            None => {
                warn!(phone = raw, "cannot normalize phone number, skipping contact lookup");
                return Ok(None);
            }
        };

        let variants = normalized.lookup_variants();
        debug!(phone = raw, ?variants, "searching contacts");

        for variant in &variants {
            tokio::time::sleep(self.delay).await;

            let found = self
                .crm
                .search_contacts_by_phone(variant)
                .await
                .with_context(|| format!("contact search for '{}' failed", variant));

            match found {
                Ok(Some(contact)) => {
                    info!(
                        phone = raw,
                        variant = variant.as_str(),
                        contact_id = contact.id.as_str(),
                        "contact found"
                    );
                    return Ok(Some(contact));
                }
                Ok(None) => continue,
                Err(e) => {
                    self.log.record(
                        "find_contact_by_phone",
                        &e,
                        &[("phone", raw), ("variant", variant.as_str())],
                    );
                    return Err(e);
                }
            }
        }

        debug!(phone = raw, "no contact for any variant");
        Ok(None)
    }
}
