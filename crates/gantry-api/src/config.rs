//! Command-line arguments and proxy configuration.
//!
//! The process takes its runtime knobs (listen address, cache directory,
//! timeouts) from flags or environment variables, and the target catalog
//! from a YAML file. Credentials live only in the YAML file so they never
//! appear in process listings.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Deserialize;

use gantry_core::observability::LogFormat;
use gantry_core::target::Target;

/// Command-line arguments for the gantry binary.
#[derive(Debug, Parser)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, env = "GANTRY_CONFIG")]
    pub config: PathBuf,

    /// Directory that holds downloaded artifacts.
    #[arg(long, env = "GANTRY_DOWNLOAD_DIR")]
    pub download_dir: PathBuf,

    /// Address the HTTP server listens on.
    #[arg(long, env = "GANTRY_HTTP_ADDR")]
    pub http_addr: SocketAddr,

    /// Base path the HTTP API is served under.
    #[arg(long, env = "GANTRY_HTTP_BASE_PATH", default_value = "/")]
    pub http_base_path: String,

    /// How long resolved run metadata stays valid.
    #[arg(long, env = "GANTRY_GITHUB_API_CACHE_TTL", default_value = "5m")]
    #[arg(value_parser = humantime::parse_duration)]
    pub github_api_cache_ttl: Duration,

    /// How long a request waits for a busy target before giving up.
    #[arg(long, env = "GANTRY_TARGET_LOCK_TIMEOUT", default_value = "30s")]
    #[arg(value_parser = humantime::parse_duration)]
    pub target_lock_timeout: Duration,

    /// Log output format.
    #[arg(long, env = "GANTRY_LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormatArg,
}

/// Log format selection for the command line.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum LogFormatArg {
    /// Machine-readable JSON lines.
    Json,
    /// Human-readable output.
    #[default]
    Pretty,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Json => Self::Json,
            LogFormatArg::Pretty => Self::Pretty,
        }
    }
}

/// Proxy configuration loaded from YAML.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Named upstream credentials.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    /// Named proxy targets.
    #[serde(default)]
    pub targets: HashMap<String, Target>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: HashMap<&str, &str> = self
            .tokens
            .keys()
            .map(|name| (name.as_str(), "[REDACTED]"))
            .collect();
        f.debug_struct("Config")
            .field("tokens", &tokens)
            .field("targets", &self.targets)
            .finish()
    }
}

impl Config {
    /// Loads and validates the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, is not valid YAML, or
    /// fails validation.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.targets.is_empty() {
            bail!("config defines no targets");
        }
        for (name, target) in &self.targets {
            if target.owner.is_empty() {
                bail!("target '{name}': owner is required");
            }
            if target.repo.is_empty() {
                bail!("target '{name}': repo is required");
            }
            if target.workflow_file.is_empty() {
                bail!("target '{name}': filename is required");
            }
            if !self.tokens.contains_key(&target.token) {
                bail!(
                    "target '{name}' references unknown token '{}'",
                    target.token
                );
            }
        }
        Ok(())
    }
}

/// Normalizes the configured base path to `/` or `/prefix` form.
///
/// # Errors
///
/// Returns an error when the path does not start with `/`.
pub fn normalize_base_path(raw: &str) -> anyhow::Result<String> {
    if !raw.starts_with('/') {
        bail!("http base path {raw:?} must start with '/'");
    }
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(trimmed.to_string())
    }
}
