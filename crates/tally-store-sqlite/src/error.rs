//! Error type for `tally-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A record of the batch could not be decoded or inserted. The whole batch
  /// was rolled back.
  #[error("load failed at {}: {reason}", key_or_unknown(.key))]
  LoadFailed { key: Option<String>, reason: String },

  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

fn key_or_unknown(key: &Option<String>) -> &str {
  key.as_deref().unwrap_or("<unknown key>")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
