//! Market data: a resilient quote cache refreshed on a backoff schedule.
//!
//! A single background task owns writes to the cache; every other caller
//! reads the latest complete snapshot.

pub mod backoff;
pub mod cache;
pub mod error;
pub mod fetcher;
pub mod types;

pub use backoff::{run_periodic, Backoff, BackoffPolicy};
pub use cache::QuoteCache;
pub use error::QuoteError;
pub use fetcher::{HttpQuoteFetcher, QuoteFetcher};
pub use types::{QuoteRecord, QuoteSnapshot};
