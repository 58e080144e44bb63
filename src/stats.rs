//! Sync run summary.
//!
//! Renders the final [`SyncStats`] of a run: counts, success and contact
//! match rates, and one line per failed record. Used by `cdrsync sync` and
//! `cdrsync replay`.

use cdr_sync_core::models::SyncStats;

use crate::progress::format_number;

/// Render the summary of one sync run.
pub fn format_summary(stats: &SyncStats) -> String {
    let mut out = String::new();
    out.push_str("CDR Sync Summary\n");
    out.push_str("================\n\n");
    out.push_str(&format!("  Total calls:     {}\n", format_number(stats.total)));
    out.push_str(&format!("  Processed:       {}\n", format_number(stats.processed)));
    out.push_str(&format!("  Succeeded:       {}\n", format_number(stats.success)));
    out.push_str(&format!("  Skipped:         {}\n", format_number(stats.skipped)));
    out.push_str(&format!("  Failed:          {}\n", format_number(stats.failed)));
    out.push_str(&format!(
        "  Contact matched: {}\n",
        format_number(stats.contact_matched)
    ));
    out.push_str(&format!(
        "  Company matched: {}\n\n",
        format_number(stats.company_matched)
    ));
    out.push_str(&format!("  Success rate:    {:.1}%\n", stats.success_rate()));
    out.push_str(&format!("  Match rate:      {:.1}%\n", stats.match_rate()));

    if !stats.errors.is_empty() {
        out.push_str("\n  Failures:\n");
        for (i, failure) in stats.errors.iter().enumerate() {
            out.push_str(&format!(
                "    {}. {} ({}) at {}: {}\n",
                i + 1,
                failure.uuid,
                failure.number,
                failure.timestamp.format("%Y-%m-%d %H:%M:%S"),
                failure.error
            ));
        }
    }
    out
}

pub fn print_summary(stats: &SyncStats) {
    print!("{}", format_summary(stats));
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdr_sync_core::models::SyncFailure;
    use chrono::{TimeZone, Utc};

    #[test]
    fn empty_run_has_zero_rates() {
        let text = format_summary(&SyncStats::default());
        assert!(text.contains("Success rate:    0.0%"));
        assert!(text.contains("Match rate:      0.0%"));
        assert!(!text.contains("Failures"));
    }

    #[test]
    fn lists_failures_in_order() {
        let stats = SyncStats {
            total: 4,
            processed: 4,
            success: 3,
            failed: 1,
            contact_matched: 3,
            errors: vec![SyncFailure {
                uuid: "u-3".into(),
                number: "05382752273".into(),
                error: "CRM API error 502".into(),
                timestamp: Utc.with_ymd_and_hms(2024, 11, 5, 8, 0, 0).unwrap(),
            }],
            ..Default::default()
        };
        let text = format_summary(&stats);
        assert!(text.contains("Success rate:    75.0%"));
        assert!(text.contains("1. u-3 (05382752273) at 2024-11-05 08:00:00: CRM API error 502"));
    }
}
