//! Error type for `tally-source`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Transport failure or a non-success HTTP status.
  #[error("source unavailable: {0}")]
  SourceUnavailable(String),

  /// The payload has no `data` member or it does not describe sales rows.
  #[error("source payload malformed: {0}")]
  SourceMalformed(String),

  #[error("http client error: {0}")]
  Client(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
