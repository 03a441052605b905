use thiserror::Error;

/// Error types for all backbone operations.
///
/// Variants map to the platform's failure kinds:
///
/// - [`Connection`](SalesIntelError::Connection) /
///   [`Authentication`](SalesIntelError::Authentication) - the remote source
///   cannot be reached or refuses credentials. Terminal for the current sync
///   job.
/// - [`RecordInvalid`](SalesIntelError::RecordInvalid) - a single record
///   failed mapping or validation. Counted and skipped, never fatal.
/// - [`ConcurrencyConflict`](SalesIntelError::ConcurrencyConflict) - a
///   per-aggregate version collision in the event store. Callers retry once
///   after refetching the current version.
/// - [`Projection`](SalesIntelError::Projection) - a projection handler
///   failed. The event stays unmarked for that projection and is retried on
///   the next rebuild pass.
/// - [`NotInSystem`](SalesIntelError::NotInSystem) - a view lookup missed
///   even after a synchronous rebuild; the caller should prompt a resync.
#[derive(Debug, Clone, Error)]
pub enum SalesIntelError {
    #[error("Connection to {remote} failed: {message}")]
    Connection { remote: String, message: String },

    #[error("Authentication with {remote} failed: {message}")]
    Authentication { remote: String, message: String },

    #[error("Invalid {entity_type} record {record_id}: {message}")]
    RecordInvalid {
        entity_type: String,
        record_id: String,
        message: String,
    },

    #[error("Concurrency conflict on {aggregate_id}: {message}")]
    ConcurrencyConflict {
        aggregate_id: String,
        message: String,
    },

    #[error("Projection '{projection}' failed on event {event_id}: {message}")]
    Projection {
        projection: String,
        event_id: String,
        message: String,
    },

    #[error("{entity_type} {entity_id} not in system")]
    NotInSystem {
        entity_type: String,
        entity_id: String,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Sync job conflict: {message}")]
    JobConflict { message: String },

    #[error("Deadline exceeded: {message}")]
    Timeout { message: String },
}

impl SalesIntelError {
    /// Whether the operation that produced this error is worth retrying.
    ///
    /// Transient connection faults, append conflicts and deadline overruns
    /// are retryable; everything else indicates a problem retrying will not
    /// fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SalesIntelError::Connection { .. }
                | SalesIntelError::ConcurrencyConflict { .. }
                | SalesIntelError::Timeout { .. }
        )
    }

    /// Whether this error aborts the surrounding sync job.
    ///
    /// Record-level and projection faults are contained locally; connection,
    /// authentication and validation faults propagate to the caller.
    pub fn is_fatal_for_job(&self) -> bool {
        matches!(
            self,
            SalesIntelError::Connection { .. }
                | SalesIntelError::Authentication { .. }
                | SalesIntelError::Validation { .. }
                | SalesIntelError::Timeout { .. }
        )
    }

    /// Shorthand for a store-layer failure.
    pub fn store(message: impl Into<String>) -> Self {
        SalesIntelError::Store {
            message: message.into(),
        }
    }

    /// Shorthand for a connection failure against a named remote.
    pub fn connection(remote: impl Into<String>, message: impl Into<String>) -> Self {
        SalesIntelError::Connection {
            remote: remote.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SalesIntelError {
    fn from(error: serde_json::Error) -> Self {
        SalesIntelError::Serialization {
            message: error.to_string(),
        }
    }
}
