//! Error types for `tally-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid sales date {0:?}: expected MM/DD/YYYY")]
  InvalidDate(String),

  #[error("invalid ingestion timestamp: {0:?}")]
  InvalidTimestamp(String),

  #[error("invalid free-shipping flag: {0}")]
  InvalidFlag(String),

  #[error("serialization error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
