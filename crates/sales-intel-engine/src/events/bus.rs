//! In-process event bus.
//!
//! Topic-based pub/sub with type-specific and global subscribers. A
//! [`EventBus::publish`] call fans an event out to the union of both sets;
//! handlers within the same dispatch priority run concurrently, and a
//! failing handler never aborts its siblings - its failure is captured,
//! logged, and returned in the per-handler outcomes.
//!
//! Priorities exist because some read models derive from others: the
//! entity views (priority 0) must be written before the access matrix
//! (priority 1) queries them, which in turn must be written before the
//! dashboard metrics (priority 2) read it. Handlers in distinct priority
//! classes are awaited in class order; within a class, fan-out is parallel.
//!
//! There is no persistent queue here. Delivery is at-least-once within the
//! process lifetime; durability comes from the event store, and projections
//! use `processed_by` marks to avoid reprocessing.

use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use sales_intel_core::error::Result;
use sales_intel_core::models::EventType;

use super::types::Event;

/// A subscriber on the event bus.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name, used for logging and per-handler outcomes.
    fn name(&self) -> &str;

    /// Handle a single event.
    async fn handle(&self, event: &Event) -> Result<()>;

    /// Dispatch priority class. Lower classes complete before higher ones
    /// start; handlers within a class run in parallel.
    fn priority(&self) -> u8 {
        0
    }
}

/// Result of one handler invocation during a publish.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub handler: String,
    pub result: Result<()>,
}

impl DispatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// In-process pub/sub bus for domain events.
///
/// Conceptually a process-wide singleton, but constructed at startup and
/// injected into every component that publishes or subscribes - never
/// accessed ambiently.
pub struct EventBus {
    subscribers: RwLock<HashMap<EventType, Vec<Arc<dyn EventHandler>>>>,
    global_subscribers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            global_subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe a handler to a specific event type.
    pub async fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        tracing::info!(handler = handler.name(), event_type = %event_type, "subscribed");
        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(event_type).or_default().push(handler);
    }

    /// Subscribe a handler to all events (useful for audit logging).
    pub async fn subscribe_all(&self, handler: Arc<dyn EventHandler>) {
        tracing::info!(handler = handler.name(), "subscribed to ALL events");
        let mut global = self.global_subscribers.write().await;
        global.push(handler);
    }

    /// Publish an event to all matching subscribers.
    ///
    /// Returns per-handler outcomes in subscription order (type-specific
    /// before global, lower priority class first).
    pub async fn publish(&self, event: &Event) -> Vec<DispatchOutcome> {
        let mut handlers: Vec<Arc<dyn EventHandler>> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .get(&event.event_type)
                .map(|hs| hs.to_vec())
                .unwrap_or_default()
        };
        {
            let global = self.global_subscribers.read().await;
            handlers.extend(global.iter().cloned());
        }

        if handlers.is_empty() {
            tracing::debug!(event_type = %event.event_type, "no subscribers");
            return Vec::new();
        }

        tracing::debug!(
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            handlers = handlers.len(),
            "publishing"
        );

        // Stable partition into priority classes, preserving subscription
        // order within each class.
        let mut classes: Vec<u8> = handlers.iter().map(|h| h.priority()).collect();
        classes.sort_unstable();
        classes.dedup();

        let mut outcomes = Vec::with_capacity(handlers.len());
        for class in classes {
            let wave: Vec<Arc<dyn EventHandler>> = handlers
                .iter()
                .filter(|h| h.priority() == class)
                .cloned()
                .collect();

            let results = join_all(wave.iter().map(|handler| {
                let handler = handler.clone();
                async move { handler.handle(event).await }
            }))
            .await;

            for (handler, result) in wave.iter().zip(results) {
                if let Err(error) = &result {
                    tracing::error!(
                        handler = handler.name(),
                        event_id = %event.id,
                        event_type = %event.event_type,
                        %error,
                        "handler failed"
                    );
                }
                outcomes.push(DispatchOutcome {
                    handler: handler.name().to_string(),
                    result,
                });
            }
        }

        outcomes
    }

    /// Number of subscribers, for one event type or in total (global
    /// subscribers excluded from per-type counts, matching the query
    /// contract).
    pub async fn subscriber_count(&self, event_type: Option<EventType>) -> usize {
        let subscribers = self.subscribers.read().await;
        match event_type {
            Some(t) => subscribers.get(&t).map_or(0, |hs| hs.len()),
            None => subscribers.values().map(|hs| hs.len()).sum(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sales_intel_core::error::SalesIntelError;
    use sales_intel_core::models::AggregateType;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingHandler {
        name: String,
        priority: u8,
        calls: Arc<AtomicUsize>,
        order: Arc<RwLock<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, _event: &Event) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.order.write().await.push(self.name.clone());
            if self.fail {
                return Err(SalesIntelError::Projection {
                    projection: self.name.clone(),
                    event_id: "test".into(),
                    message: "boom".into(),
                });
            }
            Ok(())
        }

        fn priority(&self) -> u8 {
            self.priority
        }
    }

    fn test_event() -> Event {
        Event::new(
            EventType::OdooUserSynced,
            AggregateType::User,
            "user-1",
            json!({}),
        )
    }

    fn handler(
        name: &str,
        priority: u8,
        calls: &Arc<AtomicUsize>,
        order: &Arc<RwLock<Vec<String>>>,
        fail: bool,
    ) -> Arc<dyn EventHandler> {
        Arc::new(RecordingHandler {
            name: name.to_string(),
            priority,
            calls: calls.clone(),
            order: order.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn publish_reaches_type_and_global_subscribers() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(RwLock::new(Vec::new()));

        bus.subscribe(
            EventType::OdooUserSynced,
            handler("typed", 0, &calls, &order, false),
        )
        .await;
        bus.subscribe_all(handler("audit", 0, &calls, &order, false)).await;

        let outcomes = bus.publish(&test_event()).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(DispatchOutcome::succeeded));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_failing_handler_does_not_abort_siblings() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(RwLock::new(Vec::new()));

        bus.subscribe(
            EventType::OdooUserSynced,
            handler("bad", 0, &calls, &order, true),
        )
        .await;
        bus.subscribe(
            EventType::OdooUserSynced,
            handler("good", 0, &calls, &order, false),
        )
        .await;

        let outcomes = bus.publish(&test_event()).await;
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].succeeded());
        assert!(outcomes[1].succeeded());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn lower_priority_classes_complete_first() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(RwLock::new(Vec::new()));

        // Subscribe out of priority order on purpose.
        bus.subscribe(
            EventType::OdooUserSynced,
            handler("metrics", 2, &calls, &order, false),
        )
        .await;
        bus.subscribe(
            EventType::OdooUserSynced,
            handler("view", 0, &calls, &order, false),
        )
        .await;
        bus.subscribe(
            EventType::OdooUserSynced,
            handler("access", 1, &calls, &order, false),
        )
        .await;

        bus.publish(&test_event()).await;
        let seen = order.read().await.clone();
        assert_eq!(seen, vec!["view", "access", "metrics"]);
    }

    #[tokio::test]
    async fn subscriber_counts() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(RwLock::new(Vec::new()));

        bus.subscribe(
            EventType::OdooUserSynced,
            handler("a", 0, &calls, &order, false),
        )
        .await;
        bus.subscribe(
            EventType::OdooOpportunitySynced,
            handler("b", 0, &calls, &order, false),
        )
        .await;

        assert_eq!(bus.subscriber_count(Some(EventType::OdooUserSynced)).await, 1);
        assert_eq!(bus.subscriber_count(None).await, 2);
        assert_eq!(
            bus.subscriber_count(Some(EventType::OpportunityDeleted)).await,
            0
        );
    }
}
