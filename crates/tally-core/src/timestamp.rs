//! Ingestion timestamps.
//!
//! A record gains its `ingested_at` stamp when the merge store admits it. The
//! stamp is wall-clock time in a fixed UTC offset (never the host's local
//! zone) and travels through the cache file and the API in a display form,
//! `2024-01-15 09:00 AM`. That form only has minute resolution and does not
//! sort lexically, so comparisons always go through [`IngestedAt`] itself.

use std::{fmt, str::FromStr};

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset as _, Timelike as _, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Display format used in the cache file and on the wire.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %I:%M %p";

/// Sortable format written to the relational `update_time` column.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ingest zone used when none is configured: UTC−05:00.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -5;

/// Wall-clock admission time in the ingest zone, truncated to the minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IngestedAt(NaiveDateTime);

impl IngestedAt {
  /// The current time in `offset`.
  pub fn now_in(offset: FixedOffset) -> Self {
    Self::from_instant(Utc::now().with_timezone(&offset))
  }

  /// Wall-clock time of `instant` in its own offset.
  pub fn from_instant(instant: DateTime<FixedOffset>) -> Self {
    Self::from_naive(instant.naive_local())
  }

  pub fn from_naive(naive: NaiveDateTime) -> Self {
    // Seconds are dropped so an in-memory stamp equals its display
    // round-trip.
    let truncated = naive
      .with_second(0)
      .and_then(|n| n.with_nanosecond(0))
      .unwrap_or(naive);
    Self(truncated)
  }

  /// As [`IngestedAt::parse_in`] with the default ingest zone.
  pub fn parse(s: &str) -> Result<Self> { Self::parse_in(s, default_offset()) }

  /// Parse the display form, the canonical relational form, or RFC 3339.
  ///
  /// The first two are wall-clock times already in `offset`. An RFC 3339
  /// instant carries its own offset and is converted into `offset`, so equal
  /// instants parse equal whatever zone they were written in.
  pub fn parse_in(s: &str, offset: FixedOffset) -> Result<Self> {
    let s = s.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, DISPLAY_FORMAT) {
      return Ok(Self::from_naive(naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, CANONICAL_FORMAT) {
      return Ok(Self::from_naive(naive));
    }
    DateTime::parse_from_rfc3339(s)
      .map(|instant| Self::from_instant(instant.with_timezone(&offset)))
      .map_err(|_| Error::InvalidTimestamp(s.to_owned()))
  }

  pub fn naive(&self) -> NaiveDateTime { self.0 }

  pub fn to_display(&self) -> String { self.0.format(DISPLAY_FORMAT).to_string() }

  pub fn to_canonical(&self) -> String {
    self.0.format(CANONICAL_FORMAT).to_string()
  }
}

impl fmt::Display for IngestedAt {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_display())
  }
}

impl FromStr for IngestedAt {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl Serialize for IngestedAt {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_display())
  }
}

impl<'de> Deserialize<'de> for IngestedAt {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Self::parse(&raw).map_err(serde::de::Error::custom)
  }
}

/// Build the fixed ingest offset from whole hours east of UTC.
pub fn offset_from_hours(hours: i32) -> Result<FixedOffset> {
  hours
    .checked_mul(3600)
    .and_then(FixedOffset::east_opt)
    .ok_or_else(|| Error::InvalidTimestamp(format!("utc offset {hours}h")))
}

fn default_offset() -> FixedOffset {
  offset_from_hours(DEFAULT_UTC_OFFSET_HOURS).unwrap_or_else(|_| Utc.fix())
}
