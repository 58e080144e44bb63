use anyhow::Result;

use crate::config::Config;

/// Print the configured upstream endpoints and whether their secrets are set.
pub fn list_sources(config: &Config) -> Result<()> {
    let hubspot_ready = config.hubspot.access_token().is_ok();
    let santral_ready = config.santral.api_key().is_ok();

    println!("{:<10} {:<32} {:<24} READY", "SOURCE", "BASE URL", "SECRET ENV");
    println!(
        "{:<10} {:<32} {:<24} {}",
        "hubspot", config.hubspot.base_url, config.hubspot.token_env, hubspot_ready
    );
    println!(
        "{:<10} {:<32} {:<24} {}",
        "santral", config.santral.base_url, config.santral.api_key_env, santral_ready
    );
    println!();
    println!(
        "santral rate limit: {} requests/minute, page limit {}",
        config.santral.max_requests_per_minute, config.santral.page_limit
    );

    Ok(())
}
