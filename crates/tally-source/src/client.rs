//! HTTP retrieval of the remote feed.

use std::time::Duration;

use reqwest::Client;
use tally_core::SalesRecord;

use crate::{Error, Result, payload::parse_payload};

/// Fetches the sales feed from a fixed URL.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct SourceClient {
  client: Client,
  url:    String,
}

impl SourceClient {
  pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, url: url.into() })
  }

  /// `GET <url>` and decode the payload. Has no side effects.
  pub async fn fetch(&self) -> Result<Vec<SalesRecord>> {
    tracing::info!(url = %self.url, "fetching remote feed");

    let resp = self
      .client
      .get(&self.url)
      .send()
      .await
      .map_err(|e| Error::SourceUnavailable(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
      return Err(Error::SourceUnavailable(format!(
        "GET {} → {status}",
        self.url
      )));
    }

    let body = resp
      .bytes()
      .await
      .map_err(|e| Error::SourceUnavailable(e.to_string()))?;
    tracing::debug!(bytes = body.len(), "remote feed downloaded");

    let records = parse_payload(&body)?;
    tracing::info!(records = records.len(), "remote feed decoded");
    Ok(records)
  }
}

#[cfg(test)]
mod tests {
  use axum::{Router, http::StatusCode, routing::get};
  use tokio::net::TcpListener;

  use super::*;

  async fn spawn_feed(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}/data.py")
  }

  fn client(url: String) -> SourceClient {
    SourceClient::new(url, Duration::from_secs(5)).unwrap()
  }

  #[tokio::test]
  async fn fetches_assignment_payload() {
    let app = Router::new().route(
      "/data.py",
      get(|| async {
        r#"data = [{"salesdate": "02/01/2024", "productid": 5,
          "region": "East", "freeship": 0, "discount": 0.0, "itemssold": 2}]"#
      }),
    );
    let url = spawn_feed(app).await;

    let records = client(url).fetch().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].product_id, 5);
  }

  #[tokio::test]
  async fn non_success_status_is_unavailable() {
    let app = Router::new()
      .route("/data.py", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
    let url = spawn_feed(app).await;

    let err = client(url).fetch().await.unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable(ref m) if m.contains("503")));
  }

  #[tokio::test]
  async fn refused_connection_is_unavailable() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(format!("http://{addr}/data.py")).fetch().await.unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable(_)));
  }

  #[tokio::test]
  async fn malformed_payload_is_reported() {
    let app = Router::new().route("/data.py", get(|| async { "print('hi')" }));
    let url = spawn_feed(app).await;

    let err = client(url).fetch().await.unwrap_err();
    assert!(matches!(err, Error::SourceMalformed(_)));
  }
}
