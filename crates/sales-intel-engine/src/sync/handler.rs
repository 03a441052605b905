//! The sync command handler.
//!
//! For every entity type, in dependency order (users before opportunities
//! before accounts and activities): fetch remote records, normalize them,
//! diff against the raw store by checksum, and for each changed record
//! append a domain event and publish it to the bus. Unchanged records are
//! skipped, which is what makes a full resync produce zero events.
//!
//! Record-level faults are counted and logged, never fatal; connector
//! faults abort the job; the outer deadline is checked between entity
//! types.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use sales_intel_core::config::SyncSettings;
use sales_intel_core::error::{Result, SalesIntelError};
use sales_intel_core::models::EntityType;

use crate::events::{Event, EventBus, EventMetadata, EventStore};
use crate::odoo::connector::SourceConnector;
use crate::odoo::mapper;
use crate::store::{RawStore, SyncStats};

pub struct SyncHandler {
    raw_store: Arc<dyn RawStore>,
    event_store: Arc<dyn EventStore>,
    bus: Arc<EventBus>,
    settings: SyncSettings,
}

impl SyncHandler {
    pub fn new(
        raw_store: Arc<dyn RawStore>,
        event_store: Arc<dyn EventStore>,
        bus: Arc<EventBus>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            raw_store,
            event_store,
            bus,
            settings,
        }
    }

    /// Execute a full sync against the given source.
    pub async fn handle_sync_command(
        &self,
        sync_job_id: &str,
        connector: &dyn SourceConnector,
    ) -> Result<SyncStats> {
        tracing::info!(sync_job_id, "starting sync");
        let started = Instant::now();
        let mut stats = SyncStats::default();

        for entity_type in EntityType::SYNC_ORDER {
            if started.elapsed() >= self.settings.job_deadline {
                return Err(SalesIntelError::Timeout {
                    message: format!(
                        "sync deadline of {:?} exceeded before {entity_type}",
                        self.settings.job_deadline
                    ),
                });
            }

            tracing::info!(%entity_type, "syncing");
            let records = connector.fetch_entities(entity_type).await?;

            let mut changed = 0u64;
            for raw in &records {
                match self.process_record(entity_type, raw, sync_job_id).await {
                    Ok(true) => changed += 1,
                    Ok(false) => stats.unchanged += 1,
                    Err(error) if !error.is_fatal_for_job() => {
                        stats.record_errors += 1;
                        tracing::warn!(%entity_type, %error, "record skipped");
                    }
                    Err(error) => return Err(error),
                }
            }

            match entity_type {
                EntityType::User => stats.users = changed,
                EntityType::Opportunity => stats.opportunities = changed,
                EntityType::Account => stats.accounts = changed,
                EntityType::Activity => stats.activities = changed,
            }
            stats.total_events += changed;
            tracing::info!(
                %entity_type,
                fetched = records.len(),
                changed,
                "entity sync complete"
            );
        }

        tracing::info!(
            sync_job_id,
            total_events = stats.total_events,
            unchanged = stats.unchanged,
            record_errors = stats.record_errors,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "sync complete"
        );
        Ok(stats)
    }

    /// Returns `Ok(true)` when the record changed and produced an event.
    async fn process_record(
        &self,
        entity_type: EntityType,
        raw: &Value,
        sync_job_id: &str,
    ) -> Result<bool> {
        let canonical = mapper::map_entity(entity_type, raw);
        let source_id = mapper::source_id_of(entity_type, &canonical).ok_or_else(|| {
            SalesIntelError::RecordInvalid {
                entity_type: entity_type.to_string(),
                record_id: "?".to_string(),
                message: "record has no source id".to_string(),
            }
        })?;

        let upsert = self
            .raw_store
            .upsert(entity_type, &source_id, canonical.clone(), sync_job_id)
            .await?;
        if !upsert.changed {
            return Ok(false);
        }

        let event = Event::new(
            entity_type.synced_event(),
            entity_type.aggregate_type(),
            entity_type.aggregate_id(&source_id),
            canonical,
        )
        .with_metadata(
            EventMetadata::new()
                .with_source("odoo_sync")
                .with_correlation_id(sync_job_id),
        );

        let stored = self.append_with_retry(event).await?;
        self.bus.publish(&stored).await;
        Ok(true)
    }

    /// Append, retrying once on a version conflict after refetching the
    /// aggregate's current version. A second conflict escalates to a
    /// record-level fault.
    async fn append_with_retry(&self, event: Event) -> Result<Event> {
        match self.event_store.append(event.clone()).await {
            Ok(stored) => Ok(stored),
            Err(SalesIntelError::ConcurrencyConflict { .. }) => {
                let current = self
                    .event_store
                    .current_version(event.aggregate_type, &event.aggregate_id)
                    .await?;
                self.event_store
                    .append(event.with_version(current + 1))
                    .await
                    .map_err(|e| SalesIntelError::RecordInvalid {
                        entity_type: "event".to_string(),
                        record_id: String::new(),
                        message: format!("append retry failed: {e}"),
                    })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InMemoryEventStore;
    use crate::store::InMemoryRawStore;
    use async_trait::async_trait;
    use sales_intel_core::models::EventType;
    use serde_json::json;
    use std::collections::HashMap;

    struct FakeConnector {
        records: HashMap<EntityType, Vec<Value>>,
        fail_on: Option<EntityType>,
    }

    #[async_trait]
    impl SourceConnector for FakeConnector {
        async fn fetch_entities(&self, entity_type: EntityType) -> Result<Vec<Value>> {
            if self.fail_on == Some(entity_type) {
                return Err(SalesIntelError::connection("odoo", "boom"));
            }
            Ok(self.records.get(&entity_type).cloned().unwrap_or_default())
        }
    }

    fn handler() -> (SyncHandler, Arc<InMemoryEventStore>, Arc<InMemoryRawStore>) {
        let raw = Arc::new(InMemoryRawStore::new());
        let events = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(EventBus::new());
        let handler = SyncHandler::new(
            raw.clone(),
            events.clone(),
            bus,
            SyncSettings::default(),
        );
        (handler, events, raw)
    }

    fn user_record(employee_id: i64, email: &str) -> Value {
        json!({
            "id": employee_id,
            "name": email.split('@').next().unwrap_or_default(),
            "work_email": email,
            "user_id": [employee_id * 10, "name"],
            "parent_id": false,
        })
    }

    #[tokio::test]
    async fn changed_records_produce_events_and_unchanged_do_not() {
        let (handler, events, raw) = handler();
        let connector = FakeConnector {
            records: HashMap::from([(
                EntityType::User,
                vec![user_record(10, "alice@corp.io"), user_record(20, "bob@corp.io")],
            )]),
            fail_on: None,
        };

        let stats = handler.handle_sync_command("job-1", &connector).await.unwrap();
        assert_eq!(stats.users, 2);
        assert_eq!(stats.total_events, 2);
        assert_eq!(events.count_events(None, None).await.unwrap(), 2);

        // Second run: checksums match, no new raw versions, no new events.
        let stats = handler.handle_sync_command("job-2", &connector).await.unwrap();
        assert_eq!(stats.users, 0);
        assert_eq!(stats.unchanged, 2);
        assert_eq!(events.count_events(None, None).await.unwrap(), 2);
        assert_eq!(raw.version_count(EntityType::User, "10").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn malformed_records_are_counted_not_fatal() {
        let (handler, events, _raw) = handler();
        let connector = FakeConnector {
            records: HashMap::from([(
                EntityType::User,
                vec![json!({"name": "no id"}), user_record(10, "alice@corp.io")],
            )]),
            fail_on: None,
        };

        let stats = handler.handle_sync_command("job-1", &connector).await.unwrap();
        assert_eq!(stats.record_errors, 1);
        assert_eq!(stats.users, 1);
        assert_eq!(
            events
                .count_events(Some(EventType::OdooUserSynced), None)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn connector_fault_aborts_the_job() {
        let (handler, _events, _raw) = handler();
        let connector = FakeConnector {
            records: HashMap::new(),
            fail_on: Some(EntityType::Opportunity),
        };

        let err = handler.handle_sync_command("job-1", &connector).await.unwrap_err();
        assert!(matches!(err, SalesIntelError::Connection { .. }));
    }

    #[tokio::test]
    async fn events_carry_sync_metadata_and_versions() {
        let (handler, events, _raw) = handler();
        let connector = FakeConnector {
            records: HashMap::from([(
                EntityType::User,
                vec![user_record(10, "alice@corp.io")],
            )]),
            fail_on: None,
        };
        handler.handle_sync_command("job-1", &connector).await.unwrap();

        let stored = events
            .events_for_aggregate(
                sales_intel_core::models::AggregateType::User,
                "user-10",
                0,
            )
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].version, 1);
        assert_eq!(stored[0].metadata.source, "odoo_sync");
        assert_eq!(stored[0].metadata.correlation_id.as_deref(), Some("job-1"));
    }
}
