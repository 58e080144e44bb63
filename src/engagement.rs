//! Call engagement writer.
//!
//! Creates one CRM call engagement per provider call and links it to the
//! matched contact and that contact's company. The writer runs its own
//! duplicate check first, so it is safe to call more than once for the
//! same UUID.
//!
//! Association failures after a successful create are logged and reported
//! on the outcome; they do not undo or fail the create.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use cdr_sync_core::crm::CrmApi;
use cdr_sync_core::models::{CallDirection, CallProperties, Contact};
use cdr_sync_core::notes::{ensure_uuid, CallNote};
use cdr_sync_core::phone;
use cdr_sync_core::status::map_call_status;

use crate::associations::{AssociationPipeline, LinkOutcome};
use crate::error_log::ErrorLog;
use crate::guard::DuplicateGuard;
use crate::resolver::ContactResolver;

/// Inputs for one engagement.
#[derive(Debug, Clone, Default)]
pub struct EngagementParams {
    /// Skip the phone lookup and use this contact.
    pub contact_id: Option<String>,
    pub from_number: String,
    pub to_number: String,
    pub duration_secs: u64,
    /// Empty when the call has no recording link.
    pub recording_url: String,
    /// Provider status text, e.g. `"Cevaplandı"`.
    pub status_text: String,
    pub timestamp_ms: i64,
    pub call_uuid: String,
    /// Caller-supplied notes. A synthesized note is used when absent.
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedEngagement {
    pub call_id: String,
    pub contact_id: Option<String>,
    pub contact_name: Option<String>,
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    pub associations: Vec<LinkOutcome>,
    /// Set when the call was created but linking it failed.
    pub association_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngagementOutcome {
    Created(CreatedEngagement),
    /// An engagement for this UUID already exists; nothing was written.
    Duplicate,
}

impl EngagementOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EngagementOutcome::Created(_))
    }

    pub fn call_id(&self) -> Option<&str> {
        match self {
            EngagementOutcome::Created(c) => Some(&c.call_id),
            EngagementOutcome::Duplicate => None,
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            EngagementOutcome::Created(_) => None,
            EngagementOutcome::Duplicate => Some("duplicate"),
        }
    }
}

#[derive(Clone)]
pub struct EngagementWriter {
    crm: Arc<dyn CrmApi>,
    resolver: ContactResolver,
    guard: DuplicateGuard,
    associations: AssociationPipeline,
    source_label: String,
    log: ErrorLog,
}

impl EngagementWriter {
    pub fn new(
        crm: Arc<dyn CrmApi>,
        resolver: ContactResolver,
        guard: DuplicateGuard,
        associations: AssociationPipeline,
        source_label: impl Into<String>,
        log: ErrorLog,
    ) -> Self {
        Self {
            crm,
            resolver,
            guard,
            associations,
            source_label: source_label.into(),
            log,
        }
    }

    /// Create the engagement for `params.call_uuid` unless one exists.
    pub async fn create_engagement(&self, params: &EngagementParams) -> Result<EngagementOutcome> {
        match self.write(params).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.log.record(
                    "create_engagement",
                    &e,
                    &[
                        ("call_uuid", params.call_uuid.as_str()),
                        ("to_number", params.to_number.as_str()),
                        ("contact_id", params.contact_id.as_deref().unwrap_or("")),
                    ],
                );
                Err(e)
            }
        }
    }

    /// Replace the notes of the engagement carrying `call_uuid`.
    ///
    /// Returns `false` when no engagement exists or the update failed; the
    /// failure is logged.
    pub async fn update_engagement_notes(&self, call_uuid: &str, notes: &str) -> bool {
        match self.replace_notes(call_uuid, notes).await {
            Ok(updated) => updated,
            Err(e) => {
                self.log
                    .record("update_engagement_notes", &e, &[("call_uuid", call_uuid)]);
                false
            }
        }
    }

    async fn replace_notes(&self, call_uuid: &str, notes: &str) -> Result<bool> {
        let Some(call) = self.guard.find_engagement(call_uuid).await? else {
            warn!(call_uuid, "no engagement to update");
            return Ok(false);
        };
        self.crm
            .update_call_body(&call.id, &ensure_uuid(notes, call_uuid))
            .await
            .with_context(|| format!("failed to update notes of call {}", call.id))?;
        info!(call_uuid, call_id = call.id.as_str(), "engagement notes updated");
        Ok(true)
    }

    async fn write(&self, params: &EngagementParams) -> Result<EngagementOutcome> {
        if self.guard.has_existing_engagement(&params.call_uuid).await {
            info!(call_uuid = params.call_uuid.as_str(), "engagement already exists, skipping");
            return Ok(EngagementOutcome::Duplicate);
        }

        let contact = self.resolve_contact(params).await?;
        let company = match contact.as_ref().and_then(|c| c.company_id.as_deref()) {
            Some(id) => self
                .crm
                .get_company(id)
                .await
                .with_context(|| format!("failed to read company {}", id))?,
            None => None,
        };

        let contact_name = contact
            .as_ref()
            .map(Contact::display_name)
            .filter(|n| !n.is_empty());
        let company_name = company.as_ref().and_then(|c| c.name.clone());
        let counterpart = contact_name.as_deref().unwrap_or(&params.to_number);

        let body = match &params.notes {
            Some(notes) => ensure_uuid(notes, &params.call_uuid),
            None => CallNote {
                source_label: &self.source_label,
                call_uuid: &params.call_uuid,
                from_number: &params.from_number,
                to_number: &params.to_number,
                counterpart,
                company_name: company_name.as_deref(),
                timestamp_ms: params.timestamp_ms,
                duration_secs: params.duration_secs,
                status_text: &params.status_text,
                recording_url: Some(params.recording_url.as_str()),
            }
            .render(),
        };

        let props = CallProperties {
            direction: CallDirection::Inbound,
            duration_secs: params.duration_secs,
            from_number: display_or_raw(&params.from_number),
            to_number: display_or_raw(&params.to_number),
            recording_url: params.recording_url.clone(),
            status: map_call_status(&params.status_text),
            title: format!("Call with {} - {}", counterpart, self.source_label),
            timestamp_ms: params.timestamp_ms,
            body,
        };

        let call_id = self
            .crm
            .create_call(&props)
            .await
            .with_context(|| format!("failed to create call for {}", params.call_uuid))?;
        info!(
            call_uuid = params.call_uuid.as_str(),
            call_id = call_id.as_str(),
            status = props.status.as_str(),
            "call engagement created"
        );

        let contact_id = contact.as_ref().map(|c| c.id.clone());
        let company_id = company.as_ref().map(|c| c.id.clone());

        let (associations, association_error) = match self
            .associations
            .link_call(&call_id, contact_id.as_deref(), company_id.as_deref())
            .await
        {
            Ok(links) => {
                let outcomes = links.all();
                let error = self.report_failed_links(&call_id, &params.call_uuid, &outcomes);
                (outcomes, error)
            }
            Err(e) => {
                warn!(call_id = call_id.as_str(), error = %format!("{:#}", e), "linking call failed");
                self.log.record(
                    "link_call",
                    &e,
                    &[
                        ("call_id", call_id.as_str()),
                        ("call_uuid", params.call_uuid.as_str()),
                    ],
                );
                (Vec::new(), Some(format!("{:#}", e)))
            }
        };

        Ok(EngagementOutcome::Created(CreatedEngagement {
            call_id,
            contact_id,
            contact_name,
            company_id,
            company_name,
            associations,
            association_error,
        }))
    }

    // A batch tier can answer 2xx while marking single pairs as failed.
    fn report_failed_links(
        &self,
        call_id: &str,
        call_uuid: &str,
        outcomes: &[LinkOutcome],
    ) -> Option<String> {
        let failed: Vec<&LinkOutcome> = outcomes.iter().filter(|o| !o.is_success()).collect();
        if failed.is_empty() {
            return None;
        }
        for outcome in &failed {
            warn!(
                call_id,
                to_type = %outcome.to_type,
                to_id = outcome.to_id.as_str(),
                tier = outcome.tier.as_str(),
                "association reported as failed"
            );
            let err = anyhow!(
                "association of call {} with {} {} failed ({} tier)",
                call_id,
                outcome.to_type,
                outcome.to_id,
                outcome.tier.as_str()
            );
            self.log.record(
                "link_call",
                &err,
                &[
                    ("call_id", call_id),
                    ("call_uuid", call_uuid),
                    ("to_id", outcome.to_id.as_str()),
                ],
            );
        }
        let targets: Vec<String> = failed
            .iter()
            .map(|o| format!("{} {}", o.to_type, o.to_id))
            .collect();
        Some(format!("association failed for {}", targets.join(", ")))
    }

    // A supplied id is read directly; otherwise the destination number is
    // looked up and the hit re-read so its company association is present.
    async fn resolve_contact(&self, params: &EngagementParams) -> Result<Option<Contact>> {
        if let Some(id) = &params.contact_id {
            let contact = self
                .crm
                .get_contact(id)
                .await
                .with_context(|| format!("failed to read contact {}", id))?;
            if contact.is_none() {
                warn!(contact_id = id.as_str(), "supplied contact not found");
            }
            return Ok(contact);
        }

        let Some(found) = self.resolver.find_contact_by_phone(&params.to_number).await? else {
            return Ok(None);
        };
        let full = self
            .crm
            .get_contact(&found.id)
            .await
            .with_context(|| format!("failed to read contact {}", found.id))?;
        Ok(Some(full.unwrap_or(found)))
    }
}

fn display_or_raw(raw: &str) -> String {
    phone::normalize(raw)
        .map(|n| n.into_string())
        .unwrap_or_else(|| raw.to_string())
}
