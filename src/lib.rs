//! # CDR Sync
//!
//! Synchronizes telephony call-detail records into HubSpot as call
//! engagements, linked to the matching contact and its company.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────────┐   ┌──────────┐
//! │ CallFetcher │──▶│ SyncOrchestrator             │──▶│  CrmApi  │
//! │ Santral/JSON│   │ resolve → guard → write →    │   │ HubSpot  │
//! └─────────────┘   │ associate (3-tier fallback)  │   └──────────┘
//!                   └──────────────┬───────────────┘
//!                                  ▼
//!                             SyncStats → summary
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export HUBSPOT_ACCESS_TOKEN=... SANTRAL_API_KEY=...
//! cdrsync sources                       # check configuration
//! cdrsync sync                          # last 24 hours
//! cdrsync sync --from 2024-11-05 --to 2024-11-05
//! cdrsync replay calls.json --dry-run   # run saved records offline
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`resolver`] | Multi-variant contact lookup by phone |
//! | [`guard`] | Duplicate-engagement check by call UUID |
//! | [`engagement`] | Call engagement writer |
//! | [`associations`] | Tiered association pipeline |
//! | [`sync`] | Per-batch orchestration and statistics |
//! | [`hubspot`] | HubSpot REST client |
//! | [`santral`] | Santral call-record and recording client |
//! | [`replay`] | JSON-file call fetcher |
//! | [`error_log`] | Per-client diagnostic error log |

pub mod associations;
pub mod client;
pub mod config;
pub mod engagement;
pub mod error_log;
pub mod guard;
pub mod hubspot;
pub mod progress;
pub mod rate_limit;
pub mod replay;
pub mod resolver;
pub mod santral;
pub mod sources;
pub mod stats;
pub mod sync;
pub mod traits;
