//! Domain commands outside the sync pipeline.
//!
//! Small command handlers for the events the sync loop does not emit:
//! logins, manager and role changes, opportunity reassignment, stage
//! changes and soft deletion. Each appends to the event store and
//! publishes on the bus, so the projections pick them up exactly like
//! sync-emitted events.

use serde_json::{json, Value};
use std::sync::Arc;

use sales_intel_core::error::{Result, SalesIntelError};
use sales_intel_core::models::{AggregateType, EntityType, EventType};

use crate::events::{Event, EventBus, EventMetadata, EventStore};
use crate::store::{RawStore, UserProfileStore};

pub struct Commands {
    event_store: Arc<dyn EventStore>,
    bus: Arc<EventBus>,
    raw_store: Arc<dyn RawStore>,
    profiles: Arc<dyn UserProfileStore>,
}

impl Commands {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        bus: Arc<EventBus>,
        raw_store: Arc<dyn RawStore>,
        profiles: Arc<dyn UserProfileStore>,
    ) -> Self {
        Self {
            event_store,
            bus,
            raw_store,
            profiles,
        }
    }

    async fn emit(&self, event: Event) -> Result<Event> {
        let stored = self.event_store.append(event).await?;
        self.bus.publish(&stored).await;
        Ok(stored)
    }

    async fn user_aggregate_id(&self, email: &str) -> Result<String> {
        let profile = self
            .profiles
            .by_email(&email.to_lowercase())
            .await?
            .ok_or_else(|| SalesIntelError::NotInSystem {
                entity_type: "user".to_string(),
                entity_id: email.to_string(),
            })?;
        Ok(match profile.odoo.employee_id {
            Some(id) => EntityType::User.aggregate_id(&id.to_string()),
            None => format!("user-{}", profile.id),
        })
    }

    /// Record a login; the profile's `last_login` follows.
    pub async fn record_login(&self, email: &str) -> Result<Event> {
        let aggregate_id = self.user_aggregate_id(email).await?;
        self.emit(
            Event::new(
                EventType::UserLoggedIn,
                AggregateType::User,
                aggregate_id,
                json!({"email": email.to_lowercase()}),
            )
            .with_metadata(EventMetadata::new().with_source("auth")),
        )
        .await
    }

    /// Reassign a user to a new manager (or clear it with `None`).
    pub async fn assign_manager(
        &self,
        user_email: &str,
        new_manager_employee_id: Option<i64>,
    ) -> Result<Event> {
        let aggregate_id = self.user_aggregate_id(user_email).await?;
        self.emit(
            Event::new(
                EventType::ManagerAssigned,
                AggregateType::User,
                aggregate_id,
                json!({
                    "user_email": user_email.to_lowercase(),
                    "new_manager_employee_id": new_manager_employee_id,
                }),
            )
            .with_metadata(EventMetadata::new().with_source("command")),
        )
        .await
    }

    /// Change a user's role. `"super_admin"` grants unrestricted read
    /// access through the projections.
    pub async fn change_user_role(&self, user_email: &str, new_role: &str) -> Result<Event> {
        let aggregate_id = self.user_aggregate_id(user_email).await?;
        self.emit(
            Event::new(
                EventType::UserRoleChanged,
                AggregateType::User,
                aggregate_id,
                json!({
                    "user_email": user_email.to_lowercase(),
                    "new_role": new_role,
                }),
            )
            .with_metadata(EventMetadata::new().with_source("command")),
        )
        .await
    }

    /// Latest canonical payload for an opportunity, from the raw store.
    async fn latest_opportunity_payload(&self, source_id: &str) -> Result<Value> {
        self.raw_store
            .latest(EntityType::Opportunity, source_id)
            .await?
            .map(|record| record.payload)
            .ok_or_else(|| SalesIntelError::NotInSystem {
                entity_type: "opportunity".to_string(),
                entity_id: source_id.to_string(),
            })
    }

    /// Hand an opportunity to a different salesperson. The event carries
    /// the full patched payload so the view re-denormalizes completely.
    pub async fn reassign_opportunity(
        &self,
        source_id: &str,
        new_owner_odoo_id: i64,
    ) -> Result<Event> {
        let mut payload = self.latest_opportunity_payload(source_id).await?;
        let old_owner = payload.get("salesperson_id").and_then(Value::as_i64);
        payload["old_owner_id"] = json!(old_owner);
        payload["new_owner_id"] = json!(new_owner_odoo_id);
        payload["salesperson_id"] = json!(new_owner_odoo_id);

        self.emit(
            Event::new(
                EventType::OpportunityAssigned,
                AggregateType::Opportunity,
                EntityType::Opportunity.aggregate_id(source_id),
                payload,
            )
            .with_metadata(EventMetadata::new().with_source("command")),
        )
        .await
    }

    /// Move an opportunity to a new stage, re-emitting the full payload.
    pub async fn change_opportunity_stage(
        &self,
        source_id: &str,
        new_stage: &str,
    ) -> Result<Event> {
        let mut payload = self.latest_opportunity_payload(source_id).await?;
        payload["stage_name"] = json!(new_stage);
        payload["stage_id"] = Value::Null;

        self.emit(
            Event::new(
                EventType::OpportunityStageChanged,
                AggregateType::Opportunity,
                EntityType::Opportunity.aggregate_id(source_id),
                payload,
            )
            .with_metadata(EventMetadata::new().with_source("command")),
        )
        .await
    }

    /// Soft-delete an opportunity; the view document remains for audit.
    pub async fn delete_opportunity(&self, source_id: &str, reason: &str) -> Result<Event> {
        let id: Value = source_id.parse::<i64>().map(Into::into).unwrap_or(json!(source_id));
        self.emit(
            Event::new(
                EventType::OpportunityDeleted,
                AggregateType::Opportunity,
                EntityType::Opportunity.aggregate_id(source_id),
                json!({"id": id, "reason": reason}),
            )
            .with_metadata(EventMetadata::new().with_source("command")),
        )
        .await
    }
}
