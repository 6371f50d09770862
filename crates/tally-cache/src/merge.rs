//! The in-memory merge step.
//!
//! Computed fully before anything touches the disk, so a failed write never
//! leaves a half-merged cache behind.

use std::collections::HashSet;

use tally_core::{CompositeKey, IngestedAt, SalesRecord};

/// Result of merging a fetch into the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
  /// The existing rows, in their original order, followed by the admitted
  /// rows in fetch order.
  pub records:  Vec<SalesRecord>,
  /// How many rows at the tail of `records` were admitted by this merge.
  pub admitted: usize,
}

impl MergeOutcome {
  pub fn admitted_records(&self) -> &[SalesRecord] {
    &self.records[self.records.len() - self.admitted..]
  }
}

/// Admit every record of `new` whose composite key is absent from `existing`
/// and stamp it with `now`.
///
/// Key matching is exact. A fetched record whose key is already cached is
/// dropped even when its other fields differ; the first occurrence of a key
/// within `new` wins over later ones.
pub fn merge(
  new: Vec<SalesRecord>,
  existing: Vec<SalesRecord>,
  now: IngestedAt,
) -> MergeOutcome {
  let mut seen: HashSet<CompositeKey> =
    existing.iter().map(SalesRecord::key).collect();
  let mut records = existing;
  let before = records.len();

  for mut record in new {
    if seen.insert(record.key()) {
      record.ingested_at = Some(now);
      records.push(record);
    }
  }

  let admitted = records.len() - before;
  MergeOutcome { records, admitted }
}

/// Latest admission stamp among `records`.
pub fn max_ingested_at(records: &[SalesRecord]) -> Option<IngestedAt> {
  records.iter().filter_map(|r| r.ingested_at).max()
}
