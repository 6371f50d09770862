//! Runtime configuration.
//!
//! Layered the usual way: an optional TOML file, then `TALLY_*` environment
//! variables (`__` separates nested keys, e.g.
//! `TALLY_READINESS__MAX_ATTEMPTS`).

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use chrono::FixedOffset;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use tally_cache::CacheFile;
use tally_core::{
  LoadStrategy,
  timestamp::{DEFAULT_UTC_OFFSET_HOURS, offset_from_hours},
};

use crate::readiness::RetryPolicy;

// ─── Settings ────────────────────────────────────────────────────────────────

/// Every configurable knob of a pipeline run.
///
/// Not `Debug`: it carries `db_password`, which is never logged.
#[derive(Deserialize, Clone)]
pub struct Settings {
  pub source_url:              String,
  pub cache_path:              PathBuf,
  #[serde(default)]
  pub db_host:                 Option<String>,
  /// The SQLite database file.
  #[serde(default = "default_db_name")]
  pub db_name:                 PathBuf,
  #[serde(default)]
  pub db_user:                 Option<String>,
  #[serde(default)]
  pub db_password:             Option<String>,
  #[serde(default = "default_api_host")]
  pub api_host:                String,
  #[serde(default = "default_api_port")]
  pub api_port:                u16,
  #[serde(default)]
  pub load_strategy:           LoadStrategy,
  #[serde(default = "default_utc_offset_hours")]
  pub ingest_utc_offset_hours: i32,
  #[serde(default)]
  pub fetch_pre_delay_ms:      u64,
  #[serde(default)]
  pub fetch_post_delay_ms:     u64,
  #[serde(default = "default_source_timeout_ms")]
  pub source_timeout_ms:       u64,
  #[serde(default)]
  pub readiness:               ReadinessSettings,
  #[serde(default)]
  pub api:                     ApiSettings,
  #[serde(default)]
  pub presenter:               PresenterSettings,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReadinessSettings {
  pub max_attempts:     u32,
  pub initial_delay_ms: u64,
  pub max_delay_ms:     u64,
  pub multiplier:       f64,
}

impl Default for ReadinessSettings {
  fn default() -> Self {
    Self {
      max_attempts:     10,
      initial_delay_ms: 200,
      max_delay_ms:     5_000,
      multiplier:       2.0,
    }
  }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
  /// Run the API inside the pipeline process. When `false` the API is
  /// expected to be running already (`tally serve`).
  pub spawn: bool,
}

impl Default for ApiSettings {
  fn default() -> Self { Self { spawn: true } }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PresenterSettings {
  pub enabled: bool,
  /// Program and arguments. Defaults to `tally report` with the same config.
  pub command: Option<Vec<String>>,
}

impl Default for PresenterSettings {
  fn default() -> Self { Self { enabled: true, command: None } }
}

fn default_db_name() -> PathBuf { PathBuf::from("feature_store.db") }
fn default_api_host() -> String { "127.0.0.1".to_string() }
fn default_api_port() -> u16 { 5000 }
fn default_utc_offset_hours() -> i32 { DEFAULT_UTC_OFFSET_HOURS }
fn default_source_timeout_ms() -> u64 { 30_000 }

// ─── Loading ─────────────────────────────────────────────────────────────────

impl Settings {
  /// Read `path` (if it exists) and overlay `TALLY_*` environment variables.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::layered(path, environment())
  }

  fn layered(path: &Path, env: Environment) -> Result<Self, ConfigError> {
    let settings: Self = Config::builder()
      .add_source(File::from(path).required(false))
      .add_source(env)
      .build()?
      .try_deserialize()?;
    Ok(settings.expanded())
  }

  /// Parse settings from TOML text alone.
  pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
    let settings: Self = Config::builder()
      .add_source(File::from_str(text, FileFormat::Toml))
      .build()?
      .try_deserialize()?;
    Ok(settings.expanded())
  }

  fn expanded(mut self) -> Self {
    self.cache_path = expand_tilde(&self.cache_path);
    self.db_name = expand_tilde(&self.db_name);
    self
  }

  // ── Derived values ────────────────────────────────────────────────────────

  pub fn utc_offset(&self) -> tally_core::Result<FixedOffset> {
    offset_from_hours(self.ingest_utc_offset_hours)
  }

  pub fn cache(&self) -> tally_core::Result<CacheFile> {
    Ok(CacheFile::new(&self.cache_path, self.utc_offset()?))
  }

  pub fn api_address(&self) -> String { format!("{}:{}", self.api_host, self.api_port) }

  pub fn source_timeout(&self) -> Duration { Duration::from_millis(self.source_timeout_ms) }

  pub fn fetch_pre_delay(&self) -> Duration { Duration::from_millis(self.fetch_pre_delay_ms) }

  pub fn fetch_post_delay(&self) -> Duration {
    Duration::from_millis(self.fetch_post_delay_ms)
  }

  pub fn retry_policy(&self) -> RetryPolicy { RetryPolicy::from(&self.readiness) }

  /// Log which connection settings the SQLite backend does not use.
  pub fn warn_unused_credentials(&self) {
    if let Some(host) = &self.db_host {
      tracing::debug!(%host, "db_host is ignored by the SQLite backend");
    }
    if let Some(user) = &self.db_user {
      tracing::debug!(%user, "db_user is ignored by the SQLite backend");
    }
    if self.db_password.is_some() {
      tracing::warn!("db_password is set but the SQLite backend does not use it");
    }
  }
}

fn environment() -> Environment {
  Environment::with_prefix("TALLY")
    .prefix_separator("_")
    .separator("__")
    .try_parsing(true)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
