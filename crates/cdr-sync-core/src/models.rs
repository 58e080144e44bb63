//! Core data models used throughout cdr-sync.
//!
//! These types represent the call records pulled from the telephony
//! provider, the CRM entities they are matched against, the call
//! engagement written back, and the per-run statistics.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One call-detail record as returned by the provider's `/cdrs` endpoint.
///
/// Read-only snapshot; never mutated after deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallRecord {
    #[serde(rename = "call_uuid")]
    pub uuid: String,
    #[serde(rename = "caller_id_number", default)]
    pub caller_number: String,
    #[serde(default)]
    pub destination_number: String,
    #[serde(default)]
    pub start_stamp: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub result: String,
    #[serde(default, deserialize_with = "string_or_scalar")]
    pub recording_present: String,
    #[serde(default, deserialize_with = "opt_string_or_scalar")]
    pub queue: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_scalar")]
    pub queue_wait_seconds: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_id_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "opt_string_or_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub talk_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_stamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_stamp: Option<String>,
}

impl CallRecord {
    /// Convenience constructor for the fields the sync pipeline reads.
    pub fn new(
        uuid: impl Into<String>,
        caller_number: impl Into<String>,
        destination_number: impl Into<String>,
        start_stamp: impl Into<String>,
        duration: impl Into<String>,
        result: impl Into<String>,
        recording_present: bool,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            caller_number: caller_number.into(),
            destination_number: destination_number.into(),
            start_stamp: start_stamp.into(),
            duration: duration.into(),
            result: result.into(),
            recording_present: recording_present.to_string(),
            queue: None,
            queue_wait_seconds: None,
            direction: None,
            caller_id_name: None,
            destination_name: None,
            talk_duration: None,
            answer_stamp: None,
            end_stamp: None,
        }
    }

    /// The dialable destination: the first whitespace-separated token.
    ///
    /// `"1002 (905318865036)"` → `"1002"`.
    pub fn dialable_destination(&self) -> &str {
        first_token(&self.destination_number)
    }

    /// The dialable caller number, split the same way as the destination.
    pub fn dialable_caller(&self) -> &str {
        first_token(&self.caller_number)
    }

    pub fn has_recording(&self) -> bool {
        let v = self.recording_present.trim();
        v.eq_ignore_ascii_case("true") || v == "1"
    }

    /// Call duration in seconds, parsed from the `HH:MM:SS` text.
    pub fn duration_secs(&self) -> Result<u64> {
        match parse_duration(&self.duration) {
            Some(secs) => Ok(secs),
            None => bail!(
                "invalid duration '{}' for call {}",
                self.duration,
                self.uuid
            ),
        }
    }

    /// Call start as epoch milliseconds.
    pub fn start_timestamp_ms(&self) -> Result<i64> {
        match parse_start_stamp(&self.start_stamp) {
            Some(dt) => Ok(dt.timestamp_millis()),
            None => bail!(
                "invalid start time '{}' for call {}",
                self.start_stamp,
                self.uuid
            ),
        }
    }
}

fn first_token(s: &str) -> &str {
    s.split_whitespace().next().unwrap_or("")
}

/// Parse `HH:MM:SS`, `MM:SS`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    let nums: Option<Vec<u64>> = parts.iter().map(|p| p.trim().parse::<u64>().ok()).collect();
    let nums = nums?;
    match nums.as_slice() {
        [h, m, sec] => h
            .checked_mul(3600)?
            .checked_add(m.checked_mul(60)?)?
            .checked_add(*sec),
        [m, sec] => m.checked_mul(60)?.checked_add(*sec),
        [sec] => Some(*sec),
        _ => None,
    }
}

/// Parse the provider's start stamp.
///
/// Accepts `2024-11-05 11:34:51 +0300`, RFC 3339, and offset-less
/// `2024-11-05 11:34:51` (taken as UTC).
pub fn parse_start_stamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = s.strip_suffix(" UTC").unwrap_or(s);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| n.and_utc())
}

fn string_or_scalar<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_string_or_scalar(deserializer)?.unwrap_or_default())
}

// The provider sends some fields as strings in one API version and as
// numbers/booleans in another.
fn opt_string_or_scalar<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// A CRM contact, as far as the sync engine reads it.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Contact {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub mobile_phone: Option<String>,
    pub company: Option<String>,
    /// First associated company, when read with association expansion.
    pub company_id: Option<String>,
}

impl Contact {
    /// `"first last"`, trimmed. Empty when the contact has no name parts.
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }
}

/// A CRM company. Only ever resolved through a contact's association.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Company {
    pub id: String,
    pub name: Option<String>,
}

/// CRM call status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    Completed,
    Busy,
    NoAnswer,
    Failed,
    Queued,
    Ringing,
    Hold,
    Canceled,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Completed => "COMPLETED",
            CallStatus::Busy => "BUSY",
            CallStatus::NoAnswer => "NO_ANSWER",
            CallStatus::Failed => "FAILED",
            CallStatus::Queued => "QUEUED",
            CallStatus::Ringing => "RINGING",
            CallStatus::Hold => "HOLD",
            CallStatus::Canceled => "CANCELED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "INBOUND",
            CallDirection::Outbound => "OUTBOUND",
        }
    }
}

/// Properties of a call engagement to be created in the CRM.
#[derive(Debug, Clone, PartialEq)]
pub struct CallProperties {
    pub direction: CallDirection,
    pub duration_secs: u64,
    pub from_number: String,
    pub to_number: String,
    pub recording_url: String,
    pub status: CallStatus,
    pub title: String,
    pub timestamp_ms: i64,
    /// Notes text. Always carries the call UUID for later dedup lookups.
    pub body: String,
}

/// A call engagement as returned by a CRM search.
#[derive(Debug, Clone, PartialEq)]
pub struct CallObject {
    pub id: String,
    pub body: Option<String>,
}

/// CRM object types that take part in associations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    Calls,
    Contacts,
    Companies,
}

impl ObjectType {
    /// Path segment used by the CRM API.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Calls => "calls",
            ObjectType::Contacts => "contacts",
            ObjectType::Companies => "companies",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The association kinds the sync engine creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    CallToContact,
    CallToCompany,
}

impl AssociationKind {
    /// CRM-defined association type identifier.
    pub fn type_id(&self) -> u32 {
        match self {
            AssociationKind::CallToContact => 219,
            AssociationKind::CallToCompany => 220,
        }
    }

    pub fn from_type(&self) -> ObjectType {
        ObjectType::Calls
    }

    pub fn to_type(&self) -> ObjectType {
        match self {
            AssociationKind::CallToContact => ObjectType::Contacts,
            AssociationKind::CallToCompany => ObjectType::Companies,
        }
    }
}

/// One failed record inside a sync run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncFailure {
    pub uuid: String,
    pub number: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate statistics for one sync run.
///
/// Owned by the orchestrator for the duration of a run and handed to the
/// caller afterwards.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SyncStats {
    pub total: u64,
    pub processed: u64,
    pub success: u64,
    pub skipped: u64,
    pub failed: u64,
    pub contact_matched: u64,
    pub company_matched: u64,
    pub errors: Vec<SyncFailure>,
}

impl SyncStats {
    /// Successful writes as a percentage of all fetched records.
    pub fn success_rate(&self) -> f64 {
        percentage(self.success, self.total)
    }

    /// Contact matches as a percentage of all fetched records.
    pub fn match_rate(&self) -> f64 {
        percentage(self.contact_matched, self.total)
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}
