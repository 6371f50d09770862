//! Remote source adapter for Tally.
//!
//! Pulls the daily sales feed over HTTP and turns it into
//! [`SalesRecord`](tally_core::SalesRecord)s. The payload is always parsed as
//! data; nothing fetched from the remote is ever evaluated.

mod client;
mod payload;

pub mod error;

pub use client::SourceClient;
pub use error::{Error, Result};
pub use payload::parse_payload;
