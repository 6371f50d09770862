//! [`SqliteSink`]: the SQLite implementation of [`SalesSink`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use tally_core::{LoadStrategy, RawRecord, SalesRecord, SalesSink, record::describe_raw_key};

use crate::{
  Error, Result,
  encode::{EncodedRow, RawRow},
  schema::{
    CREATE_TABLE, DROP_TABLE, INSERT, PRAGMAS, SELECT_COLUMNS, TABLE, TABLE_EXISTS,
    UPSERT,
  },
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A feature-store table backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteSink {
  pub(crate) conn: tokio_rusqlite::Connection,
  strategy:        LoadStrategy,
}

/// Why a batch was rolled back, carried out of the connection thread.
struct Rejected {
  key:    Option<String>,
  reason: String,
}

impl SqliteSink {
  /// Open (or create) a database at `path`.
  pub async fn open(path: impl AsRef<Path>, strategy: LoadStrategy) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let sink = Self { conn, strategy };
    sink.init().await?;
    Ok(sink)
  }

  /// Open an in-memory database, useful for testing.
  pub async fn open_in_memory(strategy: LoadStrategy) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let sink = Self { conn, strategy };
    sink.init().await?;
    Ok(sink)
  }

  async fn init(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `SELECT_COLUMNS` with an optional trailing clause; an absent table
  /// reads as empty.
  async fn select(
    &self,
    clause: &'static str,
    product_id: Option<i64>,
    region: Option<String>,
  ) -> Result<Vec<SalesRecord>> {
    let raws: Vec<RawRow> = self
      .conn
      .call(move |conn| {
        if !table_exists(conn)? {
          return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} {clause}"))?;
        let rows = match (product_id, region) {
          (Some(p), Some(r)) => stmt
            .query_map(rusqlite::params![p, r], RawRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
          _ => stmt
            .query_map([], RawRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRow::into_record).collect()
  }
}

pub(crate) fn table_exists(conn: &rusqlite::Connection) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(TABLE_EXISTS, rusqlite::params![TABLE], |_| Ok(true))
      .optional()?
      .unwrap_or(false),
  )
}

// ─── SalesSink impl ──────────────────────────────────────────────────────────

impl SalesSink for SqliteSink {
  type Error = Error;

  async fn load(&self, records: Vec<RawRecord>) -> Result<usize> {
    let strategy = self.strategy;
    let batch = records.len();

    let outcome: std::result::Result<usize, Rejected> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let insert = match strategy {
          LoadStrategy::FullReset => {
            tx.execute_batch(DROP_TABLE)?;
            tx.execute_batch(CREATE_TABLE)?;
            INSERT
          }
          LoadStrategy::Upsert => {
            tx.execute_batch(CREATE_TABLE)?;
            UPSERT
          }
        };

        let mut written = 0;
        {
          let mut stmt = tx.prepare(insert)?;
          for raw in records {
            // Returning early drops `tx`, which rolls the batch back.
            let key = describe_raw_key(&raw);
            let row = match EncodedRow::from_raw(raw) {
              Ok(row) => row,
              Err(e) => return Ok(Err(Rejected { key, reason: e.to_string() })),
            };
            let inserted = stmt.execute(rusqlite::params![
              row.salesdate,
              row.productid,
              row.region,
              row.freeship,
              row.discount,
              row.itemssold,
              row.update_time,
            ]);
            if let Err(e) = inserted {
              return Ok(Err(Rejected { key, reason: e.to_string() }));
            }
            written += 1;
          }
        }

        tx.commit()?;
        Ok(Ok(written))
      })
      .await?;

    match outcome {
      Ok(written) => {
        tracing::info!(%strategy, rows = written, "batch loaded into {TABLE}");
        Ok(written)
      }
      Err(Rejected { key, reason }) => {
        tracing::error!(%strategy, batch, ?key, %reason, "batch rolled back");
        Err(Error::LoadFailed { key, reason })
      }
    }
  }

  async fn fetch_all(&self) -> Result<Vec<SalesRecord>> {
    self
      .select("ORDER BY salesdate, productid, region", None, None)
      .await
  }

  async fn find(&self, product_id: i64, region: &str) -> Result<Vec<SalesRecord>> {
    self
      .select(
        "WHERE productid = ?1 AND region = ?2 ORDER BY salesdate",
        Some(product_id),
        Some(region.to_owned()),
      )
      .await
  }

  async fn count(&self) -> Result<usize> {
    let n: i64 = self
      .conn
      .call(|conn| {
        if !table_exists(conn)? {
          return Ok(0);
        }
        Ok(conn.query_row(
          &format!("SELECT COUNT(*) FROM {TABLE}"),
          [],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(usize::try_from(n).unwrap_or_default())
  }
}
