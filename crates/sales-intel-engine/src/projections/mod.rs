//! Projection runtime: the capability set every materialized view
//! implements, the bus adapter that tracks processing marks, and
//! rebuild-from-log support.

pub mod access_matrix;
pub mod activity_view;
pub mod dashboard_metrics;
pub mod opportunity_view;
pub mod user_profile;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use sales_intel_core::error::{Result, SalesIntelError};
use sales_intel_core::models::EventType;

use crate::events::{Event, EventBus, EventHandler, EventStore};

pub use access_matrix::AccessMatrixProjection;
pub use activity_view::ActivityViewProjection;
pub use dashboard_metrics::DashboardMetricsProjection;
pub use opportunity_view::OpportunityViewProjection;
pub use user_profile::UserProfileProjection;

/// Batch ceiling when draining the log during a rebuild.
const REBUILD_BATCH_LIMIT: usize = 10_000;

/// A materialized view fed from the event log.
///
/// `handle` must be idempotent: replaying the same event history yields the
/// same view state regardless of prior state, which is what makes
/// at-least-once delivery and rebuild-from-log safe.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Name recorded in each event's `processed_by` set.
    fn name(&self) -> &'static str;

    /// Event types this projection consumes.
    fn subscribes_to(&self) -> Vec<EventType>;

    /// Dispatch priority class on the bus. Entity views run at 0; views
    /// that read other views (access matrix, activity snapshots) at 1;
    /// aggregates over those (dashboard metrics) at 2.
    fn priority(&self) -> u8 {
        0
    }

    /// Apply one event to the view.
    async fn handle(&self, event: &Event) -> Result<()>;

    /// Clear the view, for a clean-slate rebuild.
    async fn truncate(&self) -> Result<()>;
}

/// Bus adapter for one projection.
///
/// Marks the event processed only after a successful `handle`; a failed
/// handler leaves the event unmarked for that projection so the next
/// rebuild pass retries it.
pub struct ProjectionSubscriber {
    projection: Arc<dyn Projection>,
    event_store: Arc<dyn EventStore>,
}

impl ProjectionSubscriber {
    pub fn new(projection: Arc<dyn Projection>, event_store: Arc<dyn EventStore>) -> Self {
        Self {
            projection,
            event_store,
        }
    }
}

#[async_trait]
impl EventHandler for ProjectionSubscriber {
    fn name(&self) -> &str {
        self.projection.name()
    }

    fn priority(&self) -> u8 {
        self.projection.priority()
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        self.projection
            .handle(event)
            .await
            .map_err(|e| SalesIntelError::Projection {
                projection: self.projection.name().to_string(),
                event_id: event.id.to_string(),
                message: e.to_string(),
            })?;
        self.event_store
            .mark_processed(event.id, self.projection.name())
            .await
    }
}

/// Outcome of one rebuild pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildOutcome {
    pub processed: u64,
    pub errors: u64,
}

/// How far a projection lags behind the log.
#[derive(Debug, Clone, Copy)]
pub struct RebuildStatus {
    pub processed_events: u64,
    pub total_events: u64,
    pub is_up_to_date: bool,
    pub behind: u64,
}

/// Owns the registered projections and wires them to the bus at startup.
pub struct ProjectionRuntime {
    projections: Vec<Arc<dyn Projection>>,
    event_store: Arc<dyn EventStore>,
}

impl ProjectionRuntime {
    pub fn new(event_store: Arc<dyn EventStore>) -> Self {
        Self {
            projections: Vec::new(),
            event_store,
        }
    }

    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projections(&self) -> &[Arc<dyn Projection>] {
        &self.projections
    }

    fn projection(&self, name: &str) -> Result<&Arc<dyn Projection>> {
        self.projections
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| SalesIntelError::Validation {
                message: format!("projection '{name}' is not registered"),
            })
    }

    /// Subscribe every projection to its event types.
    pub async fn wire_subscriptions(&self, bus: &EventBus) {
        for projection in &self.projections {
            let subscriber = Arc::new(ProjectionSubscriber::new(
                projection.clone(),
                self.event_store.clone(),
            ));
            for event_type in projection.subscribes_to() {
                bus.subscribe(event_type, subscriber.clone()).await;
            }
        }
    }

    /// Replay the log through one projection, in timestamp order.
    ///
    /// Does not clear the view first; callers wanting a clean slate
    /// truncate via [`Projection::truncate`] before rebuilding.
    pub async fn rebuild_from_events(
        &self,
        name: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<RebuildOutcome> {
        let projection = self.projection(name)?.clone();
        let subscribed = projection.subscribes_to();

        let events = self
            .event_store
            .all_events_since(since, REBUILD_BATCH_LIMIT)
            .await?;

        let mut outcome = RebuildOutcome::default();
        for event in events
            .iter()
            .filter(|e| subscribed.contains(&e.event_type))
        {
            match projection.handle(event).await {
                Ok(()) => {
                    self.event_store.mark_processed(event.id, name).await?;
                    outcome.processed += 1;
                }
                Err(error) => {
                    outcome.errors += 1;
                    tracing::error!(
                        projection = name,
                        event_id = %event.id,
                        %error,
                        "rebuild: handler failed"
                    );
                }
            }
        }

        tracing::info!(
            projection = name,
            processed = outcome.processed,
            errors = outcome.errors,
            "rebuild finished"
        );
        Ok(outcome)
    }

    /// Rebuild every projection, lower priority classes first so derived
    /// views read rebuilt state.
    pub async fn rebuild_all(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<HashMap<String, RebuildOutcome>> {
        let mut ordered: Vec<&Arc<dyn Projection>> = self.projections.iter().collect();
        ordered.sort_by_key(|p| p.priority());

        let mut outcomes = HashMap::new();
        for projection in ordered {
            let outcome = self.rebuild_from_events(projection.name(), since).await?;
            outcomes.insert(projection.name().to_string(), outcome);
        }
        Ok(outcomes)
    }

    /// How far behind the log a projection currently is.
    pub async fn rebuild_status(&self, name: &str) -> Result<RebuildStatus> {
        let projection = self.projection(name)?;
        let subscribed = projection.subscribes_to();

        let mut total = 0u64;
        for event_type in &subscribed {
            total += self.event_store.count_events(Some(*event_type), None).await?;
        }
        let processed = self
            .event_store
            .processed_count(&subscribed, name)
            .await?;
        let behind = total.saturating_sub(processed);

        Ok(RebuildStatus {
            processed_events: processed,
            total_events: total,
            is_up_to_date: behind == 0,
            behind,
        })
    }
}

/// Source user ids affected by an opportunity event: the current
/// salesperson plus the previous one when the assignment changed.
///
/// The previous owner comes from the payload when the command supplied it,
/// otherwise from the aggregate's event history - the log is the one place
/// the pre-overwrite assignment is always available.
pub(crate) async fn affected_salesperson_ids(
    event: &Event,
    event_store: &dyn EventStore,
) -> Result<Vec<i64>> {
    fn push_unique(id: i64, ids: &mut Vec<i64>) {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    let mut ids: Vec<i64> = Vec::new();
    let payload = &event.payload;
    for key in ["salesperson_id", "new_owner_id"] {
        if let Some(id) = payload.get(key).and_then(Value::as_i64) {
            push_unique(id, &mut ids);
        }
    }

    if let Some(old) = payload.get("old_owner_id").and_then(Value::as_i64) {
        push_unique(old, &mut ids);
    } else if event.version > 1 {
        let history = event_store
            .events_for_aggregate(event.aggregate_type, &event.aggregate_id, 0)
            .await?;
        let previous = history
            .iter()
            .rev()
            .filter(|e| e.version < event.version)
            .find_map(|e| e.payload.get("salesperson_id").and_then(Value::as_i64));
        if let Some(prev) = previous {
            push_unique(prev, &mut ids);
        }
    }

    Ok(ids)
}
