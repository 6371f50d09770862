//! `tally`: the feature-store pipeline binary.
//!
//! Reads `tally.toml` (or the path given with `--config`) plus `TALLY_*`
//! environment variables, then runs one stage or the whole pipeline.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tally_core::SalesSink;
use tally_pipeline::{ApiClient, Pipeline, Presenter, Settings, summarize};
use tally_source::SourceClient;
use tally_store_sqlite::SqliteSink;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Tally feature-store pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "tally.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Fetch, serve, load and present, in that order.
  Run,
  /// Fetch the remote feed and merge it into the cache.
  Fetch,
  /// Serve `GET /data` from the cache until interrupted.
  Serve,
  /// Read the serving API and load the relational table.
  Load,
  /// Print aggregates over the relational table.
  Report,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // A missing .env is fine.
  let _ = dotenvy::dotenv();

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  match cli.command {
    Command::Run => run(&settings, &cli.config).await,
    Command::Fetch => fetch(&settings).await,
    Command::Serve => serve(&settings).await,
    Command::Load => load(&settings).await,
    Command::Report => report(&settings).await,
  }
}

async fn open_sink(settings: &Settings) -> anyhow::Result<SqliteSink> {
  settings.warn_unused_credentials();
  SqliteSink::open(&settings.db_name, settings.load_strategy)
    .await
    .with_context(|| format!("failed to open database at {:?}", settings.db_name))
}

async fn run(settings: &Settings, config_path: &std::path::Path) -> anyhow::Result<()> {
  let sink = open_sink(settings).await?;
  let presenter = Presenter::from_settings(&settings.presenter, config_path)
    .context("failed to resolve presenter command")?;

  let mut pipeline = Pipeline::from_settings(settings, sink, presenter)?;
  let report = pipeline.run().await?;
  tracing::info!(
    admitted = report.admitted,
    loaded = report.loaded,
    presenter_status = ?report.presenter_status,
    "pipeline finished"
  );
  Ok(())
}

async fn fetch(settings: &Settings) -> anyhow::Result<()> {
  let source = SourceClient::new(&settings.source_url, settings.source_timeout())?;
  let cache = settings.cache()?;

  let fetched = source.fetch().await?;
  let outcome = tokio::task::spawn_blocking(move || cache.ingest(fetched))
    .await
    .context("cache task panicked")??;
  println!("admitted {} of {} cached rows", outcome.admitted, outcome.records.len());
  Ok(())
}

async fn serve(settings: &Settings) -> anyhow::Result<()> {
  let cache = Arc::new(settings.cache()?);
  let address = settings.api_address();
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  tally_api::serve(listener, cache, async {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
  })
  .await
  .context("server error")?;
  Ok(())
}

async fn load(settings: &Settings) -> anyhow::Result<()> {
  let base_url = format!("http://{}", settings.api_address());
  let client = ApiClient::new(base_url, settings.source_timeout())?;
  let records = client.list_records().await.context("failed to read serving API")?;
  let sink = open_sink(settings).await?;
  let loaded = sink.load(records).await?;
  println!("loaded {loaded} rows");
  Ok(())
}

async fn report(settings: &Settings) -> anyhow::Result<()> {
  let sink = open_sink(settings).await?;
  let records = sink.fetch_all().await?;
  print!("{}", summarize(&records));
  Ok(())
}
