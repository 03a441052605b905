//! Activity view projection.
//!
//! Builds the `activity_view` collection. Activities reference a parent
//! record via `(res_model, res_id)`; only those parented to an opportunity
//! are projected, and they inherit the opportunity's visibility set
//! verbatim. Opportunity re-syncs refresh the embedded snapshot and the
//! inherited visibility of every linked activity, so the two views never
//! drift while the opportunity is alive.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use sales_intel_core::error::Result;
use sales_intel_core::models::{EventType, PresalesCategory};

use crate::events::Event;
use crate::odoo::mapper::non_empty;
use crate::store::{
    ActivityView, ActivityViewStore, AssignedTo, OpportunityRef, OpportunityViewStore,
    UserProfileStore,
};

use super::Projection;

/// Parent model name that marks an activity as opportunity-linked.
const OPPORTUNITY_MODEL: &str = "crm.lead";

/// Lexical presales classifier over summary and activity type.
pub fn categorize(summary: &str, activity_type: &str) -> PresalesCategory {
    let summary = summary.to_lowercase();
    let activity_type = activity_type.to_lowercase();

    let contains_any = |haystack: &str, needles: &[&str]| {
        needles.iter().any(|needle| haystack.contains(needle))
    };

    if contains_any(&summary, &["poc", "proof of concept", "pilot"]) {
        return PresalesCategory::Poc;
    }
    if contains_any(&summary, &["demo", "demonstration", "walkthrough"]) {
        return PresalesCategory::Demo;
    }
    if contains_any(&summary, &["presentation", "pitch", "deck"]) {
        return PresalesCategory::Presentation;
    }
    if contains_any(&summary, &["rfp", "tender", "proposal", "bid"]) {
        return PresalesCategory::RfpInfluence;
    }
    if contains_any(&summary, &["lead", "qualification", "discovery"]) {
        return PresalesCategory::Lead;
    }
    if activity_type.contains("meeting") {
        return PresalesCategory::Meeting;
    }
    if activity_type.contains("call") {
        return PresalesCategory::Call;
    }
    PresalesCategory::Other
}

pub struct ActivityViewProjection {
    activities: Arc<dyn ActivityViewStore>,
    opportunities: Arc<dyn OpportunityViewStore>,
    profiles: Arc<dyn UserProfileStore>,
}

impl ActivityViewProjection {
    pub fn new(
        activities: Arc<dyn ActivityViewStore>,
        opportunities: Arc<dyn OpportunityViewStore>,
        profiles: Arc<dyn UserProfileStore>,
    ) -> Self {
        Self {
            activities,
            opportunities,
            profiles,
        }
    }

    async fn handle_activity_synced(&self, event: &Event) -> Result<()> {
        let payload = &event.payload;
        let Some(source_id) = payload.get("id").and_then(Value::as_i64) else {
            tracing::warn!(event_id = %event.id, "activity event has no id");
            return Ok(());
        };

        let res_model = payload.get("res_model").and_then(Value::as_str).unwrap_or("");
        if res_model != OPPORTUNITY_MODEL {
            tracing::debug!(source_id, res_model, "skipping non-opportunity activity");
            return Ok(());
        }

        let Some(res_id) = payload.get("res_id").and_then(Value::as_i64) else {
            tracing::warn!(source_id, "activity has no res_id");
            return Ok(());
        };

        let Some(opportunity) = self.opportunities.by_source_id(&res_id.to_string()).await?
        else {
            // The sync command orders opportunities before activities, so a
            // missing parent means the opportunity never synced.
            tracing::warn!(source_id, res_id, "activity links to unknown opportunity");
            return Ok(());
        };

        let assigned_to = match payload.get("user_id").and_then(Value::as_i64) {
            Some(odoo_user_id) => Some(
                match self.profiles.by_odoo_user_id(odoo_user_id).await? {
                    Some(profile) => AssignedTo {
                        user_id: Some(profile.id),
                        odoo_user_id: profile.odoo.user_id,
                        name: profile.name,
                        email: Some(profile.email),
                    },
                    None => AssignedTo {
                        user_id: None,
                        odoo_user_id: Some(odoo_user_id),
                        name: payload
                            .get("user_name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        email: None,
                    },
                },
            ),
            None => None,
        };

        let summary = payload
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let activity_type = payload
            .get("activity_type")
            .and_then(Value::as_str)
            .unwrap_or("task")
            .to_string();

        let existing = self.activities.by_source_id(&source_id.to_string()).await?;
        let (id, created_at) = match &existing {
            Some(view) => (view.id.clone(), view.created_at),
            None => (Uuid::new_v4().to_string(), Utc::now()),
        };

        let visible = opportunity.visible_to_user_ids.clone();
        let view = ActivityView {
            id,
            source_id: source_id.to_string(),
            presales_category: categorize(&summary, &activity_type),
            activity_type,
            summary,
            note: payload
                .get("note")
                .and_then(Value::as_str)
                .map(str::to_string)
                .and_then(non_empty),
            due_date: payload
                .get("date_deadline")
                .and_then(Value::as_str)
                .map(str::to_string)
                .and_then(non_empty),
            state: payload
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or("planned")
                .to_string(),
            opportunity: Some(OpportunityRef {
                id: opportunity.id.clone(),
                source_id: opportunity.source_id.clone(),
                name: opportunity.name.clone(),
                salesperson: opportunity.salesperson.clone(),
            }),
            assigned_to,
            visible_to_user_ids: visible,
            is_active: true,
            last_synced: event.timestamp,
            event_version: event.version,
            created_at,
        };
        self.activities.upsert(view).await?;

        tracing::info!(
            source_id,
            res_id,
            "activity projected with inherited visibility"
        );
        Ok(())
    }

    /// Snapshot refresh: an opportunity re-sync rewrites the embedded
    /// opportunity fields and visibility of every linked activity.
    async fn handle_opportunity_synced(&self, event: &Event) -> Result<()> {
        let Some(source_id) = event.payload.get("id").and_then(Value::as_i64) else {
            return Ok(());
        };
        let source_id = source_id.to_string();

        let Some(opportunity) = self.opportunities.by_source_id(&source_id).await? else {
            return Ok(());
        };

        let linked = self.activities.linked_to_opportunity(&source_id).await?;
        let count = linked.len();
        for mut activity in linked {
            activity.opportunity = Some(OpportunityRef {
                id: opportunity.id.clone(),
                source_id: opportunity.source_id.clone(),
                name: opportunity.name.clone(),
                salesperson: opportunity.salesperson.clone(),
            });
            activity.visible_to_user_ids = opportunity.visible_to_user_ids.clone();
            self.activities.upsert(activity).await?;
        }
        if count > 0 {
            tracing::debug!(source_id, count, "refreshed linked activity snapshots");
        }
        Ok(())
    }
}

#[async_trait]
impl Projection for ActivityViewProjection {
    fn name(&self) -> &'static str {
        "ActivityViewProjection"
    }

    fn subscribes_to(&self) -> Vec<EventType> {
        vec![EventType::OdooActivitySynced, EventType::OdooOpportunitySynced]
    }

    fn priority(&self) -> u8 {
        1
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        match event.event_type {
            EventType::OdooActivitySynced => self.handle_activity_synced(event).await,
            EventType::OdooOpportunitySynced => self.handle_opportunity_synced(event).await,
            _ => Ok(()),
        }
    }

    async fn truncate(&self) -> Result<()> {
        self.activities.truncate().await
    }
}
