//! Incremental merge store for Tally.
//!
//! Keeps the local cache, a CSV file holding every record ever admitted.
//! Fetched records are admitted only when their composite key has not been
//! seen before; the cache is append-only from the pipeline's point of view.
//!
//! The cache is single-writer: two concurrent ingests against the same file
//! can lose each other's rows. Nothing here locks the file.

mod file;
mod merge;

pub mod error;

pub use error::{Error, Result};
pub use file::{CACHE_HEADER, CacheFile};
pub use merge::{MergeOutcome, max_ingested_at, merge};
