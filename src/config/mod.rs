mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./vodcheck.toml",
        "~/.config/vodcheck/config.toml",
        "/etc/vodcheck/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.run.concurrency == 0 {
        anyhow::bail!("run.concurrency must be at least 1");
    }

    if config.fetch.timeout_secs == 0 {
        anyhow::bail!("fetch.timeout_secs must be at least 1");
    }

    if config.fetch.max_body_bytes == 0 {
        anyhow::bail!("fetch.max_body_bytes must be at least 1");
    }

    if config.validation.threshold_ticks < 0 || config.validation.keyframe_tolerance_ticks < 0 {
        anyhow::bail!("validation tolerances cannot be negative");
    }

    for name in config.fetch.headers.keys() {
        if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
            anyhow::bail!("fetch.headers contains an invalid header name: {:?}", name);
        }
    }

    if config.fetch.g2o.is_enabled() && config.fetch.g2o.data_header.is_empty() {
        anyhow::bail!("fetch.g2o.data_header cannot be empty when signing is enabled");
    }

    Ok(())
}
