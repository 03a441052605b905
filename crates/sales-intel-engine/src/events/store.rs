//! Append-only event store.
//!
//! Source of truth for the entire system. Events are immutable once
//! appended; only the `processed_by` set may grow, via
//! [`EventStore::mark_processed`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use sales_intel_core::error::{Result, SalesIntelError};
use sales_intel_core::models::{AggregateType, EventType};

use super::types::Event;

/// Event store interface for persisting and retrieving events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a single event. Returns the stored event with its assigned
    /// per-aggregate version.
    ///
    /// An event with `version = 0` gets `max(existing) + 1` for its
    /// aggregate. An explicit version that collides with an existing one
    /// fails with [`SalesIntelError::ConcurrencyConflict`]; callers retry by
    /// refetching [`EventStore::current_version`].
    async fn append(&self, event: Event) -> Result<Event>;

    /// Append multiple events in order.
    async fn append_batch(&self, events: Vec<Event>) -> Result<Vec<Event>>;

    /// All events for one aggregate with version greater than
    /// `since_version`, ordered by version.
    async fn events_for_aggregate(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
        since_version: i64,
    ) -> Result<Vec<Event>>;

    /// Events of one type, optionally after a timestamp, ordered by
    /// timestamp ascending.
    async fn events_by_type(
        &self,
        event_type: EventType,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Event>>;

    /// All events after a timestamp, ordered by timestamp ascending. Ties
    /// are broken by append order, consistently within a call.
    async fn all_events_since(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Event>>;

    /// Record that a projection has consumed an event. Idempotent set-add;
    /// marking twice is a no-op.
    async fn mark_processed(&self, event_id: Uuid, projection_name: &str) -> Result<()>;

    /// Count events, optionally filtered by type and timestamp.
    async fn count_events(
        &self,
        event_type: Option<EventType>,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64>;

    /// Highest version for an aggregate, 0 when it has no events.
    async fn current_version(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<i64>;

    /// Count events of the given types already marked processed by a
    /// projection. Feeds the rebuild `behind` computation.
    async fn processed_count(
        &self,
        event_types: &[EventType],
        projection_name: &str,
    ) -> Result<u64>;
}

/// In-memory event store backing the engine and the test suite.
///
/// The write lock serializes appends, which is how the per-aggregate
/// version uniqueness constraint is enforced here; a document-store driver
/// would use a compound unique index on
/// `(aggregate_type, aggregate_id, version)`.
pub struct InMemoryEventStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    events: Vec<Event>,
    versions: HashMap<(AggregateType, String), i64>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    fn append_locked(inner: &mut StoreInner, mut event: Event) -> Result<Event> {
        let key = (event.aggregate_type, event.aggregate_id.clone());
        let current = inner.versions.get(&key).copied().unwrap_or(0);

        if event.version == 0 {
            event.version = current + 1;
        } else if event.version <= current {
            return Err(SalesIntelError::ConcurrencyConflict {
                aggregate_id: event.aggregate_id.clone(),
                message: format!(
                    "version {} already exists (current max {})",
                    event.version, current
                ),
            });
        }

        inner.versions.insert(key, event.version);
        tracing::debug!(
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            version = event.version,
            "event appended"
        );
        inner.events.push(event.clone());
        Ok(event)
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: Event) -> Result<Event> {
        let mut inner = self.inner.write().await;
        Self::append_locked(&mut inner, event)
    }

    async fn append_batch(&self, events: Vec<Event>) -> Result<Vec<Event>> {
        let mut inner = self.inner.write().await;
        let mut stored = Vec::with_capacity(events.len());
        for event in events {
            stored.push(Self::append_locked(&mut inner, event)?);
        }
        Ok(stored)
    }

    async fn events_for_aggregate(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
        since_version: i64,
    ) -> Result<Vec<Event>> {
        let inner = self.inner.read().await;
        let mut events: Vec<Event> = inner
            .events
            .iter()
            .filter(|e| {
                e.aggregate_type == aggregate_type
                    && e.aggregate_id == aggregate_id
                    && e.version > since_version
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn events_by_type(
        &self,
        event_type: EventType,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let inner = self.inner.read().await;
        let mut events: Vec<Event> = inner
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter(|e| since.map_or(true, |ts| e.timestamp >= ts))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        events.truncate(limit);
        Ok(events)
    }

    async fn all_events_since(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let inner = self.inner.read().await;
        let mut events: Vec<Event> = inner
            .events
            .iter()
            .filter(|e| since.map_or(true, |ts| e.timestamp >= ts))
            .cloned()
            .collect();
        // Vec order is append order, so a stable sort keeps ties consistent.
        events.sort_by_key(|e| e.timestamp);
        events.truncate(limit);
        Ok(events)
    }

    async fn mark_processed(&self, event_id: Uuid, projection_name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(event) = inner.events.iter_mut().find(|e| e.id == event_id) {
            if !event.processed_by.iter().any(|p| p == projection_name) {
                event.processed_by.push(projection_name.to_string());
            }
        }
        Ok(())
    }

    async fn count_events(
        &self,
        event_type: Option<EventType>,
        since: Option<DateTime<Utc>>,
    ) -> Result<u64> {
        let inner = self.inner.read().await;
        let count = inner
            .events
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| since.map_or(true, |ts| e.timestamp >= ts))
            .count();
        Ok(count as u64)
    }

    async fn current_version(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .versions
            .get(&(aggregate_type, aggregate_id.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn processed_count(
        &self,
        event_types: &[EventType],
        projection_name: &str,
    ) -> Result<u64> {
        let inner = self.inner.read().await;
        let count = inner
            .events
            .iter()
            .filter(|e| event_types.contains(&e.event_type))
            .filter(|e| e.processed_by.iter().any(|p| p == projection_name))
            .count();
        Ok(count as u64)
    }
}
