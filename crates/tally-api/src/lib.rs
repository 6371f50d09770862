//! HTTP serving API for the local sales cache.
//!
//! Exposes an axum [`Router`] with a single read-only route, `GET /data`,
//! returning the cache as a JSON array of wire records.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = tally_api::api_router(Arc::new(cache));
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod records;

use std::{future::Future, sync::Arc};

use axum::{Router, routing::get};
use tally_cache::CacheFile;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build the API router over `cache`.
pub fn api_router(cache: Arc<CacheFile>) -> Router<()> {
  Router::new()
    .route("/data", get(records::list))
    .layer(TraceLayer::new_for_http())
    .with_state(cache)
}

/// Serve [`api_router`] on `listener` until `shutdown` resolves.
pub async fn serve<F>(
  listener: TcpListener,
  cache: Arc<CacheFile>,
  shutdown: F,
) -> std::io::Result<()>
where
  F: Future<Output = ()> + Send + 'static,
{
  if let Ok(addr) = listener.local_addr() {
    tracing::info!(
      %addr,
      cache = %cache.path().display(),
      "serving GET /data"
    );
  }
  axum::serve(listener, api_router(cache))
    .with_graceful_shutdown(shutdown)
    .await
}
