//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("cache error: {0}")]
  Cache(#[from] tally_cache::Error),

  #[error("internal error: {0}")]
  Internal(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    tracing::error!(error = %self, "request failed");
    let message = self.to_string();
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message })))
      .into_response()
  }
}
