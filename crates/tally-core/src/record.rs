//! Sales records, the rows of the feature store.
//!
//! A record is produced by the remote source, stamped once by the merge store
//! and never modified afterwards. Its wire form (cache file header, API JSON,
//! source payload) uses the flat legacy column names: `salesdate`,
//! `productid`, `region`, `freeship`, `discount`, `itemssold`,
//! `update_time`.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, IngestedAt, Result};

/// A record in its generic JSON-object form, as served by the API.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Date layout of `salesdate` on the wire.
pub const SALE_DATE_FORMAT: &str = "%m/%d/%Y";

// ─── Record ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
  #[serde(rename = "salesdate", with = "sale_date")]
  pub sale_date:   NaiveDate,
  #[serde(rename = "productid")]
  pub product_id:  i64,
  pub region:      String,
  #[serde(rename = "freeship", with = "flag")]
  pub free_ship:   bool,
  /// Absent or null in the source means no discount.
  #[serde(default, deserialize_with = "discount::deserialize")]
  pub discount:    f64,
  #[serde(rename = "itemssold")]
  pub items_sold:  i64,
  /// Set by the merge store on admission; `None` straight from the source.
  #[serde(rename = "update_time", default)]
  pub ingested_at: Option<IngestedAt>,
}

impl SalesRecord {
  pub fn key(&self) -> CompositeKey {
    CompositeKey {
      sale_date:  self.sale_date,
      product_id: self.product_id,
      region:     self.region.clone(),
    }
  }

  /// Decode a record from its generic JSON form.
  pub fn from_raw(raw: RawRecord) -> Result<Self> {
    Ok(serde_json::from_value(serde_json::Value::Object(raw))?)
  }
}

// ─── Composite key ───────────────────────────────────────────────────────────

/// The deduplication identity of a record: `(salesdate, productid, region)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeKey {
  pub sale_date:  NaiveDate,
  pub product_id: i64,
  pub region:     String,
}

impl fmt::Display for CompositeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}/{}/{}",
      self.sale_date.format(SALE_DATE_FORMAT),
      self.product_id,
      self.region
    )
  }
}

/// Best-effort key description of a raw record that may not decode.
///
/// Returns `None` when any of the three key fields is missing.
pub fn describe_raw_key(raw: &RawRecord) -> Option<String> {
  let field = |name: &str| {
    raw.get(name).filter(|v| !v.is_null()).map(|v| match v {
      serde_json::Value::String(s) => s.clone(),
      other => other.to_string(),
    })
  };
  Some(format!(
    "{}/{}/{}",
    field("salesdate")?,
    field("productid")?,
    field("region")?
  ))
}

/// Parse a `MM/DD/YYYY` sales date. Single-digit month and day are accepted.
pub fn parse_sale_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s.trim(), SALE_DATE_FORMAT)
    .map_err(|_| Error::InvalidDate(s.to_owned()))
}

// ─── Serde helpers ───────────────────────────────────────────────────────────

mod sale_date {
  use chrono::NaiveDate;
  use serde::{Deserialize, Deserializer, Serializer};

  use super::SALE_DATE_FORMAT;

  pub fn serialize<S: Serializer>(d: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&d.format(SALE_DATE_FORMAT))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(d)?;
    super::parse_sale_date(&raw).map_err(serde::de::Error::custom)
  }
}

/// `freeship` is an integer `0`/`1` on the wire. Booleans and their string
/// spellings (as the CSV reader hands them over) are accepted as well.
mod flag {
  use std::fmt;

  use serde::{Deserializer, Serializer, de};

  use crate::Error;

  pub fn serialize<S: Serializer>(v: &bool, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u8(u8::from(*v))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    d.deserialize_any(FlagVisitor)
  }

  struct FlagVisitor;

  impl de::Visitor<'_> for FlagVisitor {
    type Value = bool;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str("0, 1, or a boolean")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> { Ok(v) }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
      match v {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(E::custom(Error::InvalidFlag(other.to_string()))),
      }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
      u64::try_from(v)
        .map_err(|_| E::custom(Error::InvalidFlag(v.to_string())))
        .and_then(|u| self.visit_u64(u))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<bool, E> {
      if v == 0.0 {
        Ok(false)
      } else if v == 1.0 {
        Ok(true)
      } else {
        Err(E::custom(Error::InvalidFlag(v.to_string())))
      }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
      match v.trim() {
        "0" | "false" | "False" => Ok(false),
        "1" | "true" | "True" => Ok(true),
        other => Err(E::custom(Error::InvalidFlag(other.to_owned()))),
      }
    }
  }
}

mod discount {
  use serde::{Deserialize, Deserializer};

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(0.0))
  }
}
