pub mod types;

pub use types::{Config, RawConfig};

use anyhow::{Context, Result};
use std::path::Path;

impl Config {
    /// Load, parse, and validate configuration from `path`. Falls back to
    /// built-in defaults if the file doesn't exist, the same forgiving
    /// behavior the gateway's own loader has, so a zero-config `-d` run
    /// against `127.0.0.1:8888` still works.
    pub fn load(path: &Path) -> Result<Self> {
        let mut raw: RawConfig = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content).context("parsing TOML config")?,
                Some("json") => serde_json::from_str(&content).context("parsing JSON config")?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            RawConfig::default()
        };

        apply_env_overrides(&mut raw);

        let config = Config::from_raw(raw).context("validating configuration")?;
        tracing::info!(port = config.port, "loaded configuration");
        Ok(config)
    }

    pub fn reload(path: &Path) -> Result<Self> {
        Self::load(path)
    }
}

/// The handful of settings an operator commonly wants to flip without
/// editing the file, following the same override pattern as the gateway's
/// own `apply_env_overrides`.
fn apply_env_overrides(raw: &mut RawConfig) {
    if let Ok(v) = std::env::var("TINYRELAY_PORT") {
        if let Ok(port) = v.parse() {
            raw.port = port;
        }
    }
    if let Ok(v) = std::env::var("TINYRELAY_LOG_LEVEL") {
        raw.log_level = v;
    }
    if let Ok(v) = std::env::var("TINYRELAY_MAX_CLIENTS") {
        if let Ok(n) = v.parse() {
            raw.max_clients = n;
        }
    }
}
