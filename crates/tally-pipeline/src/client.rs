//! Async HTTP client for the serving API.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tally_core::RawRecord;
use thiserror::Error;

/// Why a call to the serving API failed.
#[derive(Debug, Error)]
pub enum ApiClientError {
  /// Nothing is listening yet. Readiness polling retries on this.
  #[error("API not ready: {0}")]
  NotReady(String),

  #[error("GET /data → {0}")]
  Status(StatusCode),

  #[error("malformed API response: {0}")]
  Decode(String),

  #[error("HTTP error: {0}")]
  Transport(#[from] reqwest::Error),
}

/// Client for `GET /data`.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client:   Client,
  base_url: String,
}

impl ApiClient {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiClientError> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base_url: base_url.into() })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }

  /// `GET /data`: the full cache snapshot as generic records.
  pub async fn list_records(&self) -> Result<Vec<RawRecord>, ApiClientError> {
    let resp = self
      .client
      .get(self.url("/data"))
      .send()
      .await
      .map_err(|e| {
        if e.is_connect() {
          ApiClientError::NotReady(e.to_string())
        } else {
          ApiClientError::Transport(e)
        }
      })?;

    if !resp.status().is_success() {
      return Err(ApiClientError::Status(resp.status()));
    }
    resp
      .json()
      .await
      .map_err(|e| ApiClientError::Decode(e.to_string()))
  }
}
