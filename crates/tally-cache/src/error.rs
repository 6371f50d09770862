//! Error type for `tally-cache`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to persist cache {}: {reason}", path.display())]
  PersistenceWriteFailed { path: PathBuf, reason: String },

  #[error("failed to read cache {}: {reason}", path.display())]
  CacheRead { path: PathBuf, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
