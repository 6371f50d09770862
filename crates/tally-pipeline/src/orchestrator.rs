//! The pipeline state machine.
//!
//! `IDLE → FETCHING → SERVING_STARTUP → LOADING → PRESENTING → DONE`, with
//! `FAILED` reachable from every stage. Stages run strictly one after the
//! other; only the serving API outlives its stage, and only until loading
//! has finished.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tally_cache::CacheFile;
use tally_core::SalesSink;
use tally_source::SourceClient;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

use crate::{
  client::ApiClient,
  config::Settings,
  error::{ErrorKind, PipelineError, Result},
  presenter::Presenter,
  readiness::{RetryPolicy, wait_until_ready},
};

// ─── Stage ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
  Idle,
  Fetching,
  ServingStartup,
  Loading,
  Presenting,
  Done,
  Failed,
}

// ─── Serving API guard ───────────────────────────────────────────────────────

/// A serving API running as a background task.
///
/// Dropping the guard triggers graceful shutdown and aborts the task, so the
/// API never outlives the run that started it.
pub struct ServerGuard {
  addr:     SocketAddr,
  shutdown: Option<oneshot::Sender<()>>,
  task:     JoinHandle<std::io::Result<()>>,
}

impl ServerGuard {
  pub async fn spawn(address: &str, cache: Arc<CacheFile>) -> Result<Self, ErrorKind> {
    let listener = TcpListener::bind(address).await.map_err(|e| ErrorKind::Bind {
      address: address.to_string(),
      reason:  e.to_string(),
    })?;
    let addr = listener.local_addr().map_err(|e| ErrorKind::Bind {
      address: address.to_string(),
      reason:  e.to_string(),
    })?;

    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(tally_api::serve(listener, cache, async {
      let _ = rx.await;
    }));
    Ok(Self { addr, shutdown: Some(tx), task })
  }

  pub fn base_url(&self) -> String { format!("http://{}", self.addr) }
}

impl Drop for ServerGuard {
  fn drop(&mut self) {
    if let Some(tx) = self.shutdown.take() {
      let _ = tx.send(());
    }
    self.task.abort();
    tracing::debug!(addr = %self.addr, "serving API stopped");
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
  pub stages_entered:   Vec<Stage>,
  /// Records admitted into the cache by this run's fetch.
  pub admitted:         usize,
  /// Rows written by the loader.
  pub loaded:           usize,
  /// Presenter exit code; `None` when no presenter is configured.
  pub presenter_status: Option<i32>,
}

/// One pipeline, wired to its source, cache, sink and presenter.
pub struct Pipeline<S> {
  source:      SourceClient,
  cache:       Arc<CacheFile>,
  sink:        S,
  api_address: String,
  spawn_api:   bool,
  readiness:   RetryPolicy,
  api_timeout: Duration,
  pre_delay:   Duration,
  post_delay:  Duration,
  presenter:   Option<Presenter>,
  history:     Vec<Stage>,
}

impl<S: SalesSink> Pipeline<S> {
  pub fn from_settings(
    settings: &Settings,
    sink: S,
    presenter: Option<Presenter>,
  ) -> Result<Self> {
    let source = SourceClient::new(&settings.source_url, settings.source_timeout())
      .map_err(|e| PipelineError::new(Stage::Idle, e))?;
    let cache = settings
      .cache()
      .map_err(|e| PipelineError::new(Stage::Idle, e))?;

    Ok(Self {
      source,
      cache: Arc::new(cache),
      sink,
      api_address: settings.api_address(),
      spawn_api: settings.api.spawn,
      readiness: settings.retry_policy(),
      api_timeout: settings.source_timeout(),
      pre_delay: settings.fetch_pre_delay(),
      post_delay: settings.fetch_post_delay(),
      presenter,
      history: Vec::new(),
    })
  }

  /// Stages entered by the most recent run, in order.
  pub fn history(&self) -> &[Stage] { &self.history }

  /// Run every stage once. Halts at the first failure.
  pub async fn run(&mut self) -> Result<PipelineReport> {
    self.history.clear();
    self.enter(Stage::Idle);

    match self.drive().await {
      Ok(mut report) => {
        self.enter(Stage::Done);
        report.stages_entered = self.history.clone();
        Ok(report)
      }
      Err(err) => {
        self.enter(Stage::Failed);
        tracing::error!(stage = %err.stage, error = %err.kind, "pipeline halted");
        Err(err)
      }
    }
  }

  fn enter(&mut self, stage: Stage) {
    tracing::info!(%stage, "entering stage");
    self.history.push(stage);
  }

  async fn drive(&mut self) -> Result<PipelineReport> {
    self.enter(Stage::Fetching);
    let admitted = self
      .fetch()
      .await
      .map_err(|e| PipelineError::new(Stage::Fetching, e))?;

    self.enter(Stage::ServingStartup);
    let (guard, client) = self
      .start_api()
      .await
      .map_err(|e| PipelineError::new(Stage::ServingStartup, e))?;

    self.enter(Stage::Loading);
    let loaded = self
      .load(&client)
      .await
      .map_err(|e| PipelineError::new(Stage::Loading, e))?;
    drop(guard);

    self.enter(Stage::Presenting);
    let presenter_status = match &self.presenter {
      Some(presenter) => Some(
        presenter
          .run()
          .await
          .map_err(|e| PipelineError::new(Stage::Presenting, e))?,
      ),
      None => None,
    };

    Ok(PipelineReport {
      stages_entered: Vec::new(),
      admitted,
      loaded,
      presenter_status,
    })
  }

  async fn fetch(&self) -> Result<usize, ErrorKind> {
    tokio::time::sleep(self.pre_delay).await;

    let fetched = self.source.fetch().await?;
    let cache = Arc::clone(&self.cache);
    let outcome = tokio::task::spawn_blocking(move || cache.ingest(fetched))
      .await
      .map_err(|e| ErrorKind::Task(e.to_string()))??;

    tokio::time::sleep(self.post_delay).await;
    Ok(outcome.admitted)
  }

  async fn start_api(&self) -> Result<(Option<ServerGuard>, ApiClient), ErrorKind> {
    let (guard, base_url) = if self.spawn_api {
      let guard = ServerGuard::spawn(&self.api_address, Arc::clone(&self.cache)).await?;
      let url = guard.base_url();
      (Some(guard), url)
    } else {
      (None, format!("http://{}", self.api_address))
    };

    let client = ApiClient::new(base_url, self.api_timeout)?;
    match wait_until_ready(&client, &self.readiness).await {
      Some(_) => Ok((guard, client)),
      None => Err(ErrorKind::ServiceStartupTimeout {
        attempts: self.readiness.max_attempts,
      }),
    }
  }

  async fn load(&self, client: &ApiClient) -> Result<usize, ErrorKind> {
    let records = client.list_records().await?;
    self
      .sink
      .load(records)
      .await
      .map_err(|e| ErrorKind::Load(Box::new(e)))
  }
}

#[cfg(test)]
mod tests {
  use axum::{Router, routing::get};
  use chrono::NaiveDate;
  use serde_json::json;
  use tally_core::{LoadStrategy, SalesRecord};
  use tally_store_sqlite::SqliteSink;

  use super::*;

  // ── Fixtures ──────────────────────────────────────────────────────────────

  async fn spawn_feed(body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/data.py", get(move || async move { body }));
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}/data.py")
  }

  async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
  }

  fn settings(source_url: &str, dir: &tempfile::TempDir) -> Settings {
    Settings::from_toml(&format!(
      r#"
      source_url = "{source_url}"
      cache_path = "{cache}"
      api_port = 0
      [readiness]
      max_attempts = 5
      initial_delay_ms = 5
      max_delay_ms = 20
      "#,
      cache = dir.path().join("feature_store.csv").display(),
    ))
    .unwrap()
  }

  fn cached(day: u32, product_id: i64, region: &str) -> SalesRecord {
    SalesRecord {
      sale_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
      product_id,
      region: region.into(),
      free_ship: false,
      discount: 0.0,
      items_sold: 1,
      ingested_at: None,
    }
  }

  fn feed() -> String {
    json!({
      "data": [
        {
          "salesdate": "01/01/2024", "productid": 1, "region": "East",
          "freeship": 0, "discount": 0.0, "itemssold": 9
        },
        {
          "salesdate": "01/03/2024", "productid": 3, "region": "East",
          "freeship": 1, "discount": 0.2, "itemssold": 4
        },
        {
          "salesdate": "01/03/2024", "productid": 4, "region": "West",
          "freeship": 0, "itemssold": 2
        },
        {
          "salesdate": "01/04/2024", "productid": 5, "region": "North",
          "freeship": 1, "discount": 0.05, "itemssold": 7
        }
      ]
    })
    .to_string()
  }

  // ── Scenarios ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn three_new_and_one_duplicate_end_to_end() {
    for strategy in [LoadStrategy::FullReset, LoadStrategy::Upsert] {
      let dir = tempfile::tempdir().unwrap();
      let url = spawn_feed(feed()).await;
      let settings = settings(&url, &dir);

      let existing = vec![cached(1, 1, "East"), cached(2, 2, "West")];
      settings.cache().unwrap().save(&existing).unwrap();

      let sink = SqliteSink::open_in_memory(strategy).await.unwrap();
      let mut pipeline = Pipeline::from_settings(&settings, sink.clone(), None).unwrap();
      let report = pipeline.run().await.unwrap();

      assert_eq!(report.admitted, 3, "{strategy}");
      assert_eq!(report.loaded, existing.len() + 3);
      assert_eq!(sink.count().await.unwrap(), existing.len() + 3);
      assert_eq!(report.presenter_status, None);
      assert_eq!(report.stages_entered, [
        Stage::Idle,
        Stage::Fetching,
        Stage::ServingStartup,
        Stage::Loading,
        Stage::Presenting,
        Stage::Done,
      ]);

      // The duplicate kept the cached value, not the fetched one.
      let first = sink.find(1, "East").await.unwrap();
      assert_eq!(first[0].items_sold, 1);
    }
  }

  #[tokio::test]
  async fn unreachable_api_times_out_before_loading() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_feed(feed()).await;
    let port = closed_port().await;
    let settings = settings(&url, &dir);
    let settings = Settings {
      api_port: port,
      api: crate::config::ApiSettings { spawn: false },
      ..settings
    };

    let sink = SqliteSink::open_in_memory(LoadStrategy::FullReset).await.unwrap();
    let mut pipeline = Pipeline::from_settings(&settings, sink.clone(), None).unwrap();
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.stage, Stage::ServingStartup);
    assert!(matches!(err.kind, ErrorKind::ServiceStartupTimeout { attempts: 5 }));
    assert!(!pipeline.history().contains(&Stage::Loading));
    assert_eq!(pipeline.history().last(), Some(&Stage::Failed));
    assert_eq!(sink.count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn unavailable_source_fails_in_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let port = closed_port().await;
    let settings = settings(&format!("http://127.0.0.1:{port}/data.py"), &dir);

    let sink = SqliteSink::open_in_memory(LoadStrategy::Upsert).await.unwrap();
    let mut pipeline = Pipeline::from_settings(&settings, sink, None).unwrap();
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.stage, Stage::Fetching);
    assert!(matches!(
      err.kind,
      ErrorKind::Source(tally_source::Error::SourceUnavailable(_))
    ));
    assert_eq!(pipeline.history(), [Stage::Idle, Stage::Fetching, Stage::Failed]);
    assert!(err.to_string().starts_with("stage FETCHING failed"));
  }

  #[tokio::test]
  async fn corrupt_cache_halts_before_loading() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_feed(feed()).await;
    let settings = settings(&url, &dir);
    std::fs::write(
      &settings.cache_path,
      "salesdate,productid,region,freeship,discount,itemssold,update_time\n\
       02/30/2024,9,East,0,0,1,\n",
    )
    .unwrap();

    let sink = SqliteSink::open_in_memory(LoadStrategy::Upsert).await.unwrap();
    let mut pipeline = Pipeline::from_settings(&settings, sink.clone(), None).unwrap();
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.stage, Stage::Fetching);
    assert!(matches!(
      err.kind,
      ErrorKind::Cache(tally_cache::Error::CacheRead { .. })
    ));
    assert!(!pipeline.history().contains(&Stage::Loading));
    assert_eq!(sink.count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn presenter_failure_is_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_feed(feed()).await;
    let settings = settings(&url, &dir);
    let presenter = Presenter::new("sh", vec![
      "-c".into(),
      "echo dashboard down >&2; exit 2".into(),
    ]);

    let sink = SqliteSink::open_in_memory(LoadStrategy::Upsert).await.unwrap();
    let mut pipeline = Pipeline::from_settings(&settings, sink.clone(), Some(presenter)).unwrap();
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.stage, Stage::Presenting);
    assert!(err.to_string().contains("dashboard down"), "{err}");
    // Loading committed before the presenter ran.
    assert_eq!(sink.count().await.unwrap(), 4);
  }

  #[tokio::test]
  async fn presenter_exit_status_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_feed(feed()).await;
    let settings = settings(&url, &dir);
    let presenter = Presenter::new("sh", vec!["-c".into(), "exit 0".into()]);

    let sink = SqliteSink::open_in_memory(LoadStrategy::Upsert).await.unwrap();
    let mut pipeline = Pipeline::from_settings(&settings, sink, Some(presenter)).unwrap();
    let report = pipeline.run().await.unwrap();
    assert_eq!(report.presenter_status, Some(0));
  }

  #[tokio::test]
  async fn rerun_admits_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let url = spawn_feed(feed()).await;
    let settings = settings(&url, &dir);

    let sink = SqliteSink::open_in_memory(LoadStrategy::Upsert).await.unwrap();
    let mut pipeline = Pipeline::from_settings(&settings, sink.clone(), None).unwrap();
    assert_eq!(pipeline.run().await.unwrap().admitted, 4);
    assert_eq!(pipeline.run().await.unwrap().admitted, 0);
    assert_eq!(sink.count().await.unwrap(), 4);
  }

  #[tokio::test]
  async fn dropping_the_guard_stops_the_api() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(CacheFile::new(
      dir.path().join("c.csv"),
      tally_core::timestamp::offset_from_hours(0).unwrap(),
    ));
    let guard = ServerGuard::spawn("127.0.0.1:0", cache).await.unwrap();
    let client = ApiClient::new(guard.base_url(), Duration::from_secs(1)).unwrap();
    let policy = RetryPolicy {
      max_attempts:  5,
      initial_delay: Duration::from_millis(5),
      max_delay:     Duration::from_millis(20),
      multiplier:    2.0,
    };
    assert!(wait_until_ready(&client, &policy).await.is_some());

    drop(guard);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.list_records().await.is_err());
  }
}
