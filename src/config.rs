use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub hubspot: HubspotConfig,
    #[serde(default)]
    pub santral: SantralConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HubspotConfig {
    #[serde(default = "default_hubspot_base_url")]
    pub base_url: String,
    /// Environment variable holding the private-app access token.
    #[serde(default = "default_hubspot_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pause before each contact-search variant, to stay under the CRM's
    /// request-rate ceiling.
    #[serde(default = "default_search_delay_ms")]
    pub search_delay_ms: u64,
    #[serde(default = "default_association_batch_size")]
    pub association_batch_size: usize,
    /// Appended to call titles and used as the note heading.
    #[serde(default = "default_source_label")]
    pub source_label: String,
}

impl Default for HubspotConfig {
    fn default() -> Self {
        Self {
            base_url: default_hubspot_base_url(),
            token_env: default_hubspot_token_env(),
            timeout_secs: default_timeout_secs(),
            search_delay_ms: default_search_delay_ms(),
            association_batch_size: default_association_batch_size(),
            source_label: default_source_label(),
        }
    }
}

fn default_hubspot_base_url() -> String {
    "https://api.hubapi.com".to_string()
}
fn default_hubspot_token_env() -> String {
    "HUBSPOT_ACCESS_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_search_delay_ms() -> u64 {
    300
}
fn default_association_batch_size() -> usize {
    100
}
fn default_source_label() -> String {
    "Santral".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SantralConfig {
    #[serde(default = "default_santral_base_url")]
    pub base_url: String,
    #[serde(default = "default_santral_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

impl Default for SantralConfig {
    fn default() -> Self {
        Self {
            base_url: default_santral_base_url(),
            api_key_env: default_santral_key_env(),
            timeout_secs: default_timeout_secs(),
            max_requests_per_minute: default_max_requests_per_minute(),
            page_limit: default_page_limit(),
        }
    }
}

fn default_santral_base_url() -> String {
    "https://api.bulutsantralim.com".to_string()
}
fn default_santral_key_env() -> String {
    "SANTRAL_API_KEY".to_string()
}
fn default_max_requests_per_minute() -> u32 {
    5
}
fn default_page_limit() -> u32 {
    100
}

/// Which note a sync run attaches to created calls.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoteMode {
    /// Built from the call record (queue, wait time, recording flag).
    #[default]
    Record,
    /// Synthesized by the engagement writer, with contact, company, and a
    /// recording link from the recording locator.
    Synthesized,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Default look-back when `--from` is omitted.
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    #[serde(default)]
    pub note_mode: NoteMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            note_mode: NoteMode::default(),
        }
    }
}

fn default_window_hours() -> i64 {
    24
}

impl Config {
    /// Built-in defaults, for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

impl HubspotConfig {
    pub fn access_token(&self) -> Result<String> {
        std::env::var(&self.token_env)
            .with_context(|| format!("{} environment variable not set", self.token_env))
    }
}

impl SantralConfig {
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .with_context(|| format!("{} environment variable not set", self.api_key_env))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.hubspot.base_url.trim().is_empty() {
        bail!("hubspot.base_url must not be empty");
    }
    if config.hubspot.association_batch_size == 0 {
        bail!("hubspot.association_batch_size must be > 0");
    }
    if config.santral.max_requests_per_minute == 0 {
        bail!("santral.max_requests_per_minute must be > 0");
    }
    if config.santral.page_limit == 0 {
        bail!("santral.page_limit must be > 0");
    }
    if config.sync.window_hours <= 0 {
        bail!("sync.window_hours must be > 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.hubspot.base_url, "https://api.hubapi.com");
        assert_eq!(cfg.hubspot.search_delay_ms, 300);
        assert_eq!(cfg.hubspot.association_batch_size, 100);
        assert_eq!(cfg.santral.max_requests_per_minute, 5);
        assert_eq!(cfg.sync.window_hours, 24);
        assert_eq!(cfg.sync.note_mode, NoteMode::Record);
        validate(&cfg).unwrap();
    }

    #[test]
    fn overrides_and_validation() {
        let cfg: Config = toml::from_str(
            r#"
[hubspot]
source_label = "PBX"
search_delay_ms = 0

[santral]
max_requests_per_minute = 0

[sync]
note_mode = "synthesized"
"#,
        )
        .unwrap();
        assert_eq!(cfg.hubspot.source_label, "PBX");
        assert_eq!(cfg.sync.note_mode, NoteMode::Synthesized);
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("max_requests_per_minute"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/cdrsync.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
