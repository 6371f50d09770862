//! [`CacheFile`]: the CSV-backed local cache.

use std::{
  fs, io,
  path::{Path, PathBuf},
};

use chrono::FixedOffset;
use tally_core::{IngestedAt, SalesRecord};
use tempfile::NamedTempFile;

use crate::{
  Error, Result,
  merge::{MergeOutcome, merge},
};

/// Header row of the cache file, in column order.
pub const CACHE_HEADER: [&str; 7] = [
  "salesdate",
  "productid",
  "region",
  "freeship",
  "discount",
  "itemssold",
  "update_time",
];

/// The local cache file. Admission stamps use the fixed `offset`, not the
/// host's local zone.
#[derive(Debug, Clone)]
pub struct CacheFile {
  path:   PathBuf,
  offset: FixedOffset,
}

impl CacheFile {
  pub fn new(path: impl Into<PathBuf>, offset: FixedOffset) -> Self {
    Self { path: path.into(), offset }
  }

  pub fn path(&self) -> &Path { &self.path }

  /// Every cached record in file order. A missing file is an empty cache.
  pub fn load(&self) -> Result<Vec<SalesRecord>> {
    let file = match fs::File::open(&self.path) {
      Ok(f) => f,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(self.read_error(e)),
    };

    csv::Reader::from_reader(file)
      .deserialize()
      .collect::<Result<Vec<SalesRecord>, csv::Error>>()
      .map_err(|e| self.read_error(e))
  }

  /// Merge `fetched` into the cache, stamped with the current time, and
  /// persist the result.
  pub fn ingest(&self, fetched: Vec<SalesRecord>) -> Result<MergeOutcome> {
    self.ingest_at(fetched, IngestedAt::now_in(self.offset))
  }

  /// As [`CacheFile::ingest`] with an explicit admission stamp.
  pub fn ingest_at(
    &self,
    fetched: Vec<SalesRecord>,
    now: IngestedAt,
  ) -> Result<MergeOutcome> {
    let fetched_len = fetched.len();
    let existing = self.load()?;
    let outcome = merge(fetched, existing, now);

    // Re-saved even when nothing was admitted; the content is unchanged.
    self.save(&outcome.records)?;

    tracing::info!(
      path = %self.path.display(),
      fetched = fetched_len,
      admitted = outcome.admitted,
      total = outcome.records.len(),
      "cache updated"
    );
    Ok(outcome)
  }

  /// Replace the cache with `records`.
  ///
  /// The rows are written to a temporary file next to the cache and renamed
  /// over it, so readers see either the old or the new file, never a mix.
  pub fn save(&self, records: &[SalesRecord]) -> Result<()> {
    let dir = match self.path.parent() {
      Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
      _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| self.write_error(e))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| self.write_error(e))?;
    {
      let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(tmp.as_file_mut());
      writer
        .write_record(CACHE_HEADER)
        .map_err(|e| self.write_error(e))?;
      for record in records {
        writer.serialize(record).map_err(|e| self.write_error(e))?;
      }
      writer.flush().map_err(|e| self.write_error(e))?;
    }
    tmp.as_file_mut().sync_all().map_err(|e| self.write_error(e))?;
    tmp
      .persist(&self.path)
      .map_err(|e| self.write_error(e.error))?;
    Ok(())
  }

  fn read_error(&self, e: impl ToString) -> Error {
    Error::CacheRead { path: self.path.clone(), reason: e.to_string() }
  }

  fn write_error(&self, e: impl ToString) -> Error {
    Error::PersistenceWriteFailed {
      path:   self.path.clone(),
      reason: e.to_string(),
    }
  }
}
