//! Sync progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts. The
//! orchestrator emits one event when it starts fetching and one per record
//! processed.

use std::io::Write;

/// A single progress event for a sync run.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncProgressEvent {
    /// Fetching call records from this source (no total yet).
    Fetching { source: String },
    /// Record `n` of `total` finished with `outcome`.
    Processing {
        source: String,
        n: u64,
        total: u64,
        call_uuid: String,
        outcome: &'static str,
    },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync santral  processing  12 / 1,024 calls".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Fetching { source } => {
                format!("sync {}  fetching...\n", source)
            }
            SyncProgressEvent::Processing {
                source,
                n,
                total,
                call_uuid,
                outcome,
            } => format!(
                "sync {}  processing  {} / {} calls  {} {}\n",
                source,
                format_number(*n),
                format_number(*total),
                call_uuid,
                outcome
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Fetching { source } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "fetching"
            }),
            SyncProgressEvent::Processing {
                source,
                n,
                total,
                call_uuid,
                outcome,
            } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "processing",
                "n": n,
                "total": total,
                "call_uuid": call_uuid,
                "outcome": outcome
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" | "none" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
