//! Pipeline orchestration for Tally.
//!
//! Sequences the remote fetch, the cache merge, the serving API, the
//! relational load and the downstream presenter, halting at the first
//! failure. See [`orchestrator::Pipeline`].
//!
//! Two pipelines must not run against the same cache file or table at the
//! same time; nothing here serialises them.

pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod presenter;
pub mod readiness;
pub mod report;

pub use client::{ApiClient, ApiClientError};
pub use config::Settings;
pub use error::{ErrorKind, PipelineError};
pub use orchestrator::{Pipeline, PipelineReport, ServerGuard, Stage};
pub use presenter::Presenter;
pub use readiness::RetryPolicy;
pub use report::{Summary, summarize};
