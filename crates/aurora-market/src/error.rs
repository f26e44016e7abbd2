//! Quote fetch and validation errors.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("Quote request failed: {0}")]
    Request(String),

    #[error("Quote API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed quote payload: {0}")]
    Malformed(String),

    #[error("Invalid quote data: {0}")]
    Invalid(String),

    #[error("Quote refresh timed out after {0:?}")]
    Timeout(Duration),
}
