//! Encoding and decoding helpers between [`SalesRecord`] and the column
//! representations stored in SQLite.
//!
//! Dates are stored as ISO `YYYY-MM-DD` strings, admission stamps in their
//! canonical sortable form, booleans as SQLite integers.

use chrono::NaiveDate;
use tally_core::{IngestedAt, RawRecord, SalesRecord};

use crate::{Error, Result};

// ─── NaiveDate ───────────────────────────────────────────────────────────────

const ISO_DATE: &str = "%Y-%m-%d";

pub fn encode_date(d: NaiveDate) -> String { d.format(ISO_DATE).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, ISO_DATE)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── IngestedAt ──────────────────────────────────────────────────────────────

pub fn encode_ingested(at: &IngestedAt) -> String { at.to_canonical() }

pub fn decode_ingested(s: &str) -> Result<IngestedAt> { Ok(IngestedAt::parse(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column values ready to bind into `INSERT`/`UPSERT`.
pub struct EncodedRow {
  pub salesdate:   String,
  pub productid:   i64,
  pub region:      String,
  pub freeship:    bool,
  pub discount:    f64,
  pub itemssold:   i64,
  pub update_time: Option<String>,
}

impl EncodedRow {
  /// Decode a wire record (`MM/DD/YYYY` date, `0`/`1` flag) into column
  /// values.
  pub fn from_raw(raw: RawRecord) -> tally_core::Result<Self> {
    let record = SalesRecord::from_raw(raw)?;
    Ok(Self::from_record(&record))
  }

  pub fn from_record(record: &SalesRecord) -> Self {
    Self {
      salesdate:   encode_date(record.sale_date),
      productid:   record.product_id,
      region:      record.region.clone(),
      freeship:    record.free_ship,
      discount:    record.discount,
      itemssold:   record.items_sold,
      update_time: record.ingested_at.as_ref().map(encode_ingested),
    }
  }
}

/// Raw values read directly from a `feature_store` row.
pub struct RawRow {
  pub salesdate:   String,
  pub productid:   i64,
  pub region:      String,
  pub freeship:    bool,
  pub discount:    f64,
  pub itemssold:   i64,
  pub update_time: Option<String>,
}

impl RawRow {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      salesdate:   row.get(0)?,
      productid:   row.get(1)?,
      region:      row.get(2)?,
      freeship:    row.get(3)?,
      discount:    row.get(4)?,
      itemssold:   row.get(5)?,
      update_time: row.get(6)?,
    })
  }

  pub fn into_record(self) -> Result<SalesRecord> {
    Ok(SalesRecord {
      sale_date:   decode_date(&self.salesdate)?,
      product_id:  self.productid,
      region:      self.region,
      free_ship:   self.freeship,
      discount:    self.discount,
      items_sold:  self.itemssold,
      ingested_at: self.update_time.as_deref().map(decode_ingested).transpose()?,
    })
  }
}
