//! Event and metadata types.
//!
//! Payloads are intentionally opaque (`serde_json::Value`): the schema of
//! external-source records is owned by the source, not by the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use sales_intel_core::models::{AggregateType, EventType};

/// Contextual metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub user_id: Option<String>,
    pub source: String,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self {
            user_id: None,
            source: "system".to_string(),
            correlation_id: None,
            causation_id: None,
        }
    }
}

impl EventMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_causation_id(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// An immutable event in the event store.
///
/// `version` is the per-aggregate sequence number. A freshly constructed
/// event carries `version = 0`, meaning "assign on append": the store
/// allocates `max(existing) + 1` for the aggregate. Callers may set an
/// explicit version, in which case a collision surfaces as a concurrency
/// conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    pub payload: Value,
    #[serde(default)]
    pub metadata: EventMetadata,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub processed_by: Vec<String>,
}

impl Event {
    pub fn new(
        event_type: EventType,
        aggregate_type: AggregateType,
        aggregate_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            aggregate_type,
            aggregate_id: aggregate_id.into(),
            payload,
            metadata: EventMetadata::default(),
            timestamp: Utc::now(),
            version: 0,
            processed_by: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Whether the given projection has already marked this event processed.
    pub fn processed_by(&self, projection_name: &str) -> bool {
        self.processed_by.iter().any(|p| p == projection_name)
    }
}
