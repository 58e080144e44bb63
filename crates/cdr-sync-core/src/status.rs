//! Provider call-result vocabulary and its mapping to CRM call statuses.
//!
//! The telephony provider reports the outcome of a call as free text in
//! Turkish. [`ProviderStatus::parse`] recognizes the known words and keeps
//! anything else as [`ProviderStatus::Other`]; [`ProviderStatus::crm_status`]
//! is the single place where provider outcomes become [`CallStatus`] values.

use crate::models::CallStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    /// "Başarılı"
    Successful,
    /// "Cevaplandı"
    Answered,
    /// "Meşgul"
    Busy,
    /// "Cevapsız"
    Unanswered,
    /// "Reddedildi"
    Rejected,
    /// "Başarısız"
    Unsuccessful,
    /// "Kuyrukta"
    Queued,
    /// "Çalıyor"
    Ringing,
    /// "Beklemede"
    OnHold,
    /// "Vazgeçildi"
    Abandoned,
    /// Any text the table does not know.
    Other(String),
}

impl ProviderStatus {
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "Başarılı" => ProviderStatus::Successful,
            "Cevaplandı" => ProviderStatus::Answered,
            "Meşgul" => ProviderStatus::Busy,
            "Cevapsız" => ProviderStatus::Unanswered,
            "Reddedildi" => ProviderStatus::Rejected,
            "Başarısız" => ProviderStatus::Unsuccessful,
            "Kuyrukta" => ProviderStatus::Queued,
            "Çalıyor" => ProviderStatus::Ringing,
            "Beklemede" => ProviderStatus::OnHold,
            "Vazgeçildi" => ProviderStatus::Abandoned,
            other => ProviderStatus::Other(other.to_string()),
        }
    }

    /// CRM status for this outcome. Unknown outcomes default to
    /// [`CallStatus::Completed`].
    pub fn crm_status(&self) -> CallStatus {
        match self {
            ProviderStatus::Successful | ProviderStatus::Answered => CallStatus::Completed,
            ProviderStatus::Busy => CallStatus::Busy,
            ProviderStatus::Unanswered => CallStatus::NoAnswer,
            ProviderStatus::Rejected | ProviderStatus::Unsuccessful => CallStatus::Failed,
            ProviderStatus::Queued => CallStatus::Queued,
            ProviderStatus::Ringing => CallStatus::Ringing,
            ProviderStatus::OnHold => CallStatus::Hold,
            ProviderStatus::Abandoned => CallStatus::Canceled,
            ProviderStatus::Other(_) => CallStatus::Completed,
        }
    }
}

/// Map provider result text straight to a CRM status.
pub fn map_call_status(text: &str) -> CallStatus {
    ProviderStatus::parse(text).crm_status()
}
