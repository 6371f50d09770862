//! Handler for `GET /data`.
//!
//! Returns the whole local cache as a JSON array. No filtering, no paging.

use std::sync::Arc;

use axum::{Json, extract::State};
use tally_cache::CacheFile;
use tally_core::SalesRecord;

use crate::error::ApiError;

/// `GET /data`
pub async fn list(
  State(cache): State<Arc<CacheFile>>,
) -> Result<Json<Vec<SalesRecord>>, ApiError> {
  let records = tokio::task::spawn_blocking(move || cache.load())
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
  tracing::debug!(records = records.len(), "serving cache snapshot");
  Ok(Json(records))
}
