//! # CDR Sync CLI (`cdrsync`)
//!
//! ## Usage
//!
//! ```bash
//! cdrsync --config ./config/cdrsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cdrsync sync` | Sync one window of call records into HubSpot |
//! | `cdrsync sync-call <uuid>` | Fetch and sync a single call record |
//! | `cdrsync replay <file>` | Run a JSON file of call records through the pipeline |
//! | `cdrsync find-contact <phone>` | Look up a HubSpot contact by phone |
//! | `cdrsync normalize <phone>` | Print the E.164 form of a phone number |
//! | `cdrsync update-notes <uuid> <notes>` | Replace the notes of a synced call |
//! | `cdrsync sources` | Show configured endpoints and secret status |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use cdr_sync::client::{ClientSettings, CrmClient};
use cdr_sync::config::{self, Config, NoteMode};
use cdr_sync::hubspot::HubSpotClient;
use cdr_sync::progress::ProgressMode;
use cdr_sync::replay::FileFetcher;
use cdr_sync::santral::SantralClient;
use cdr_sync::sources;
use cdr_sync::stats::print_summary;
use cdr_sync::sync::{SyncOrchestrator, SyncSettings};
use cdr_sync::traits::{CallFetcher, CallFilter};
use cdr_sync_core::crm::memory::InMemoryCrm;
use cdr_sync_core::crm::CrmApi;
use cdr_sync_core::models::parse_start_stamp;
use cdr_sync_core::phone;

/// Synchronize PBX call-detail records into HubSpot as call engagements.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used. See
/// `config/cdrsync.example.toml` for every setting.
#[derive(Parser)]
#[command(name = "cdrsync", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cdrsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one window of call records from Santral into HubSpot.
    ///
    /// Without `--from`, the window starts `sync.window_hours` before `--to`
    /// (default: now).
    Sync {
        #[command(flatten)]
        window: WindowArgs,

        /// Which note to attach: the call record, or a synthesized summary
        /// with contact, company, and recording link.
        #[arg(long, value_enum)]
        notes: Option<NoteArg>,

        /// Progress on stderr: `off`, `human`, or `json`. Default: human on a TTY.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Fetch one call record from Santral by UUID and sync it.
    SyncCall {
        call_uuid: String,

        #[arg(long, value_enum)]
        notes: Option<NoteArg>,
    },

    /// Run call records saved as JSON through the sync pipeline.
    Replay {
        /// JSON file: an array of records or a saved `/cdrs` response.
        file: PathBuf,

        #[command(flatten)]
        window: WindowArgs,

        /// Use an empty in-memory CRM instead of HubSpot.
        #[arg(long)]
        dry_run: bool,

        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Look up a HubSpot contact by phone number.
    FindContact {
        phone: String,
    },

    /// Print the E.164 form of a phone number and its lookup variants.
    Normalize {
        phone: String,
    },

    /// Replace the notes of the engagement synced for a call UUID.
    UpdateNotes {
        call_uuid: String,
        notes: String,
    },

    /// Show configured endpoints and whether their secrets are set.
    Sources,
}

#[derive(clap::Args)]
struct WindowArgs {
    /// Window start (RFC 3339, `YYYY-MM-DD HH:MM:SS`, or `YYYY-MM-DD`).
    #[arg(long)]
    from: Option<String>,

    /// Window end (same formats; a bare date means end of that day).
    #[arg(long)]
    to: Option<String>,

    /// Maximum number of records to fetch.
    #[arg(long)]
    limit: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum NoteArg {
    Record,
    Synthesized,
}

impl From<NoteArg> for NoteMode {
    fn from(arg: NoteArg) -> Self {
        match arg {
            NoteArg::Record => NoteMode::Record,
            NoteArg::Synthesized => NoteMode::Synthesized,
        }
    }
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s).ok_or_else(|| format!("invalid progress mode '{}': use off, human, or json", s))
}

fn parse_bound(value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Some(ts) = parse_start_stamp(value) {
        return Ok(ts);
    }
    let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") else {
        bail!("invalid time '{}': expected RFC 3339, 'YYYY-MM-DD HH:MM:SS', or 'YYYY-MM-DD'", value);
    };
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    match time {
        Some(t) => Ok(t.and_utc()),
        None => bail!("invalid time '{}'", value),
    }
}

impl WindowArgs {
    fn bounds(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let from = self.from.as_deref().map(|v| parse_bound(v, false)).transpose()?;
        let to = self.to.as_deref().map(|v| parse_bound(v, true)).transpose()?;
        Ok((from, to))
    }
}

fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn hubspot_client(cfg: &Config) -> Result<CrmClient> {
    let api: Arc<dyn CrmApi> = Arc::new(HubSpotClient::from_config(&cfg.hubspot)?);
    Ok(CrmClient::new(api, &ClientSettings::from_config(&cfg.hubspot)))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let load_config = || load_config_or_default(&cli.config);

    match cli.command {
        // No config needed
        Commands::Normalize { phone: raw } => {
            let Some(normalized) = phone::normalize(&raw) else {
                bail!("cannot normalize phone number '{}'", raw);
            };
            println!("{}", normalized);
            for variant in normalized.lookup_variants().iter().skip(1) {
                println!("  variant: {}", variant);
            }
        }
        Commands::Sync {
            window,
            notes,
            progress,
        } => {
            let cfg = load_config()?;
            let (from, to) = window.bounds()?;
            let mut settings = SyncSettings::from_config(&cfg);
            if let Some(limit) = window.limit {
                settings.page_limit = limit;
            }
            if let Some(mode) = notes {
                settings.note_mode = mode.into();
            }

            let santral = Arc::new(SantralClient::from_config(&cfg.santral)?);
            let orchestrator = SyncOrchestrator::new(hubspot_client(&cfg)?, santral.clone(), settings)
                .with_recordings(santral)
                .with_progress(progress.unwrap_or_else(ProgressMode::default_for_tty).reporter());

            let stats = orchestrator.run_sync(from, to).await?;
            print_summary(&stats);
        }
        Commands::SyncCall { call_uuid, notes } => {
            let cfg = load_config()?;
            let mut settings = SyncSettings::from_config(&cfg);
            if let Some(mode) = notes {
                settings.note_mode = mode.into();
            }

            let santral = Arc::new(SantralClient::from_config(&cfg.santral)?);
            let Some(record) = santral.fetch_call(&call_uuid).await? else {
                bail!("call {} not found in Santral", call_uuid);
            };
            let orchestrator = SyncOrchestrator::new(hubspot_client(&cfg)?, santral.clone(), settings)
                .with_recordings(santral);
            let stats = orchestrator.sync_records(std::slice::from_ref(&record)).await;
            print_summary(&stats);
            if stats.failed > 0 {
                bail!("call {} failed to sync", call_uuid);
            }
        }
        Commands::Replay {
            file,
            window,
            dry_run,
            progress,
        } => {
            let cfg = load_config()?;
            let (from, to) = window.bounds()?;
            let client = if dry_run {
                let api: Arc<dyn CrmApi> = Arc::new(InMemoryCrm::new());
                CrmClient::new(api, &ClientSettings::from_config(&cfg.hubspot))
            } else {
                hubspot_client(&cfg)?
            };

            let fetcher = Arc::new(FileFetcher::new(&file));
            let filter = CallFilter {
                from_time: from,
                to_time: to,
                limit: window.limit.unwrap_or(0),
                ..Default::default()
            };
            let page = fetcher.fetch_calls(&filter).await?;

            let orchestrator = SyncOrchestrator::new(client, fetcher, SyncSettings::from_config(&cfg))
                .with_progress(progress.unwrap_or_else(ProgressMode::default_for_tty).reporter());
            let stats = orchestrator.sync_records(&page.records).await;
            print_summary(&stats);
        }
        Commands::FindContact { phone: raw } => {
            let cfg = load_config()?;
            let client = hubspot_client(&cfg)?;
            match client.resolver.find_contact_by_phone(&raw).await? {
                Some(contact) => {
                    println!("id:       {}", contact.id);
                    println!("name:     {}", contact.display_name());
                    println!("phone:    {}", contact.phone.as_deref().unwrap_or("-"));
                    println!("mobile:   {}", contact.mobile_phone.as_deref().unwrap_or("-"));
                    println!("company:  {}", contact.company.as_deref().unwrap_or("-"));
                }
                None => println!("No contact found for {}", raw),
            }
        }
        Commands::UpdateNotes { call_uuid, notes } => {
            let cfg = load_config()?;
            let client = hubspot_client(&cfg)?;
            if !client.writer.update_engagement_notes(&call_uuid, &notes).await {
                bail!("no engagement updated for call {}", call_uuid);
            }
            println!("Notes updated for call {}", call_uuid);
        }
        Commands::Sources => {
            sources::list_sources(&load_config()?)?;
        }
    }

    Ok(())
}
