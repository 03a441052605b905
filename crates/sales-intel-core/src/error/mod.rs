//! Error handling for the sales-intelligence backbone.
//!
//! All failures in the core flow are variants of [`SalesIntelError`]. The
//! taxonomy distinguishes faults that abort a sync job (connection,
//! authentication, validation) from faults that are counted and contained
//! (record-level mapping errors, projection handler errors) - see
//! [`SalesIntelError::is_retryable`] and the per-variant docs.

mod types;

pub use types::SalesIntelError;

/// Result type used across both backbone crates.
pub type Result<T> = std::result::Result<T, SalesIntelError>;
