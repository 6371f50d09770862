//! Core types and trait definitions for the Tally feature store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod record;
pub mod sink;
pub mod timestamp;

pub use error::{Error, Result};
pub use record::{CompositeKey, RawRecord, SalesRecord};
pub use sink::{LoadStrategy, SalesSink};
pub use timestamp::IngestedAt;
