//! Error type for pipeline runs.

use thiserror::Error;

use crate::{client::ApiClientError, orchestrator::Stage};

/// A pipeline run halted in `stage`.
#[derive(Debug, Error)]
#[error("stage {stage} failed: {kind}")]
pub struct PipelineError {
  pub stage: Stage,
  #[source]
  pub kind:  ErrorKind,
}

impl PipelineError {
  pub fn new(stage: Stage, kind: impl Into<ErrorKind>) -> Self {
    Self { stage, kind: kind.into() }
  }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
  #[error(transparent)]
  Source(#[from] tally_source::Error),

  #[error(transparent)]
  Cache(#[from] tally_cache::Error),

  #[error(transparent)]
  Core(#[from] tally_core::Error),

  #[error("failed to bind {address}: {reason}")]
  Bind { address: String, reason: String },

  #[error("serving API did not become ready after {attempts} attempts")]
  ServiceStartupTimeout { attempts: u32 },

  #[error(transparent)]
  Api(#[from] ApiClientError),

  #[error(transparent)]
  Load(Box<dyn std::error::Error + Send + Sync>),

  #[error("failed to launch {program}: {reason}")]
  Spawn { program: String, reason: String },

  #[error("exited with {status}: {stderr}")]
  StageFailed { status: String, stderr: String },

  #[error("background task failed: {0}")]
  Task(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
