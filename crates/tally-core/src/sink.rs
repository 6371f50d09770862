//! The `SalesSink` trait: the relational side of the pipeline.
//!
//! The trait is implemented by storage backends (e.g. `tally-store-sqlite`).
//! The orchestrator and the report consumer depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::record::{RawRecord, SalesRecord};

/// How a load cycle treats rows already in the table.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoadStrategy {
  /// Drop and recreate the table, then insert the whole batch.
  FullReset,
  /// Keep existing rows; insert new keys and overwrite changed ones.
  #[default]
  Upsert,
}

/// Abstraction over a relational feature-store table.
///
/// A single `load` call is atomic: either every record of the batch is
/// written or none is. Concurrent loads against the same table are not
/// coordinated beyond what the backend's transactions provide.
pub trait SalesSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Load a batch of records in their generic JSON form and return the
  /// number of rows written.
  fn load(
    &self,
    records: Vec<RawRecord>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Every row in the table, ordered by key. This is the bulk read issued by
  /// downstream consumers.
  fn fetch_all(
    &self,
  ) -> impl Future<Output = Result<Vec<SalesRecord>, Self::Error>> + Send + '_;

  /// Rows for one product in one region.
  fn find<'a>(
    &'a self,
    product_id: i64,
    region: &'a str,
  ) -> impl Future<Output = Result<Vec<SalesRecord>, Self::Error>> + Send + 'a;

  /// Number of rows; zero when the table does not exist yet.
  fn count(&self) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
