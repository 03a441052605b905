//! Opportunity view projection.
//!
//! Builds the `opportunity_view` collection: opportunities with the
//! salesperson pre-joined from user profiles, the account pre-joined from
//! the latest raw record, and `visible_to_user_ids` precomputed so access
//! checks are a set-membership test.
//!
//! Assignment and stage-change events re-denormalize the whole document
//! rather than patching a single field; the handlers stay idempotent and
//! there is exactly one write path.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use sales_intel_core::error::Result;
use sales_intel_core::models::{EntityType, EventType};

use crate::events::Event;
use crate::odoo::mapper::non_empty;
use crate::store::{
    AccountSnapshot, OpportunityView, OpportunityViewStore, RawStore, SalespersonSnapshot,
    UserProfileStore,
};

use super::Projection;

pub struct OpportunityViewProjection {
    views: Arc<dyn OpportunityViewStore>,
    profiles: Arc<dyn UserProfileStore>,
    raw: Arc<dyn RawStore>,
}

impl OpportunityViewProjection {
    pub fn new(
        views: Arc<dyn OpportunityViewStore>,
        profiles: Arc<dyn UserProfileStore>,
        raw: Arc<dyn RawStore>,
    ) -> Self {
        Self {
            views,
            profiles,
            raw,
        }
    }

    async fn upsert_from_event(&self, event: &Event) -> Result<()> {
        let payload = &event.payload;
        let Some(source_id) = payload.get("id").and_then(Value::as_i64) else {
            tracing::warn!(event_id = %event.id, "opportunity event has no id");
            return Ok(());
        };
        let source_id = source_id.to_string();

        let mut visible_to_user_ids: Vec<String> = Vec::new();

        // Salesperson: resolve the source user id against user profiles.
        let salesperson = match payload.get("salesperson_id").and_then(Value::as_i64) {
            Some(sp_odoo_user_id) => {
                match self.profiles.by_odoo_user_id(sp_odoo_user_id).await? {
                    Some(profile) => {
                        visible_to_user_ids.push(profile.id.clone());
                        if let Some(manager) = &profile.hierarchy.manager {
                            visible_to_user_ids.push(manager.user_id.clone());
                        }
                        Some(SalespersonSnapshot {
                            user_id: Some(profile.id.clone()),
                            odoo_user_id: profile.odoo.user_id,
                            odoo_employee_id: profile.odoo.employee_id,
                            name: profile.name.clone(),
                            email: Some(profile.email.clone()),
                            team_id: profile.odoo.team_id,
                            team_name: profile.odoo.team_name.clone(),
                            manager: profile.hierarchy.manager.clone(),
                        })
                    }
                    None => {
                        tracing::warn!(
                            source_id,
                            sp_odoo_user_id,
                            "salesperson does not resolve to a user profile"
                        );
                        Some(SalespersonSnapshot {
                            user_id: None,
                            odoo_user_id: Some(sp_odoo_user_id),
                            odoo_employee_id: None,
                            name: payload
                                .get("salesperson_name")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            email: None,
                            team_id: payload.get("team_id").and_then(Value::as_i64),
                            team_name: payload
                                .get("team_name")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                                .and_then(non_empty),
                            manager: None,
                        })
                    }
                }
            }
            None => {
                tracing::warn!(source_id, "opportunity has no salesperson_id");
                None
            }
        };

        // Account: pre-join display fields from the latest raw record.
        let account = match payload.get("partner_id").and_then(Value::as_i64) {
            Some(partner_id) => self
                .raw
                .latest(EntityType::Account, &partner_id.to_string())
                .await?
                .map(|record| AccountSnapshot {
                    source_id: partner_id.to_string(),
                    name: record
                        .payload
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    city: record
                        .payload
                        .get("city")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .and_then(non_empty),
                    country: record
                        .payload
                        .get("country_name")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .and_then(non_empty),
                })
                .or_else(|| {
                    let name = payload
                        .get("partner_name")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    non_empty(name.to_string()).map(|name| AccountSnapshot {
                        source_id: partner_id.to_string(),
                        name,
                        city: None,
                        country: None,
                    })
                }),
            None => None,
        };

        // Every super-admin sees every opportunity.
        for admin in self.profiles.super_admins().await? {
            visible_to_user_ids.push(admin.id);
        }
        visible_to_user_ids.sort();
        visible_to_user_ids.dedup();

        let existing = self.views.by_source_id(&source_id).await?;
        let (id, created_at) = match &existing {
            Some(view) => (view.id.clone(), view.created_at),
            None => (Uuid::new_v4().to_string(), Utc::now()),
        };

        let visible_count = visible_to_user_ids.len();
        let view = OpportunityView {
            id,
            source_id: source_id.clone(),
            name: payload
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Untitled")
                .to_string(),
            stage: payload
                .get("stage_name")
                .and_then(Value::as_str)
                .unwrap_or("New")
                .to_string(),
            value: payload
                .get("expected_revenue")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            probability: payload
                .get("probability")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            expected_close_date: payload
                .get("date_deadline")
                .and_then(Value::as_str)
                .map(str::to_string)
                .and_then(non_empty),
            description: payload
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string)
                .and_then(non_empty),
            salesperson,
            account,
            visible_to_user_ids,
            // A re-synced opportunity is resurrected even if it was
            // soft-deleted earlier.
            is_active: true,
            deleted_at: None,
            delete_reason: None,
            last_synced: event.timestamp,
            event_version: event.version,
            created_at,
        };
        self.views.upsert(view).await?;

        tracing::info!(
            source_id,
            visible_to = visible_count,
            action = if existing.is_some() { "updated" } else { "created" },
            "opportunity projected"
        );
        Ok(())
    }

    async fn handle_deleted(&self, event: &Event) -> Result<()> {
        let payload = &event.payload;
        let Some(source_id) = payload.get("id").and_then(Value::as_i64) else {
            tracing::warn!(event_id = %event.id, "OpportunityDeleted event has no id");
            return Ok(());
        };
        let reason = payload
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("source_deleted");

        let deleted = self
            .views
            .soft_delete(&source_id.to_string(), reason)
            .await?;
        if deleted {
            tracing::info!(source_id, reason, "opportunity soft-deleted");
        } else {
            tracing::warn!(source_id, "OpportunityDeleted for unknown opportunity");
        }
        Ok(())
    }
}

#[async_trait]
impl Projection for OpportunityViewProjection {
    fn name(&self) -> &'static str {
        "OpportunityViewProjection"
    }

    fn subscribes_to(&self) -> Vec<EventType> {
        vec![
            EventType::OdooOpportunitySynced,
            EventType::OpportunityAssigned,
            EventType::OpportunityStageChanged,
            EventType::OpportunityDeleted,
        ]
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        match event.event_type {
            EventType::OpportunityDeleted => self.handle_deleted(event).await,
            _ => self.upsert_from_event(event).await,
        }
    }

    async fn truncate(&self) -> Result<()> {
        self.views.truncate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        InMemoryOpportunityViewStore, InMemoryRawStore, InMemoryUserProfileStore,
    };
    use crate::store::{Hierarchy, OdooLink, UserIdentity, UserProfile};
    use sales_intel_core::models::AggregateType;
    use serde_json::json;

    fn profile(
        id: &str,
        email: &str,
        odoo_user_id: i64,
        manager: Option<UserIdentity>,
        super_admin: bool,
    ) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            email: email.to_string(),
            name: email.split('@').next().unwrap_or_default().to_string(),
            job_title: None,
            role: None,
            odoo: OdooLink {
                user_id: Some(odoo_user_id),
                employee_id: Some(odoo_user_id / 10),
                ..OdooLink::default()
            },
            hierarchy: Hierarchy {
                manager,
                ..Hierarchy::default()
            },
            is_super_admin: super_admin,
            last_login: None,
            last_sync: None,
            event_version: 1,
            created_at: Utc::now(),
            version: 1,
        }
    }

    fn synced_event(source_id: i64, salesperson: Option<i64>, stage: &str) -> Event {
        Event::new(
            EventType::OdooOpportunitySynced,
            AggregateType::Opportunity,
            EntityType::Opportunity.aggregate_id(&source_id.to_string()),
            json!({
                "id": source_id,
                "name": format!("Opp {source_id}"),
                "salesperson_id": salesperson,
                "partner_id": 301,
                "stage_name": stage,
                "expected_revenue": 50_000.0,
                "probability": 60.0,
                "date_deadline": "2026-09-01",
            }),
        )
        .with_version(1)
    }

    struct Fixture {
        views: Arc<InMemoryOpportunityViewStore>,
        profiles: Arc<InMemoryUserProfileStore>,
        raw: Arc<InMemoryRawStore>,
        projection: OpportunityViewProjection,
    }

    fn fixture() -> Fixture {
        let views = Arc::new(InMemoryOpportunityViewStore::new());
        let profiles = Arc::new(InMemoryUserProfileStore::new());
        let raw = Arc::new(InMemoryRawStore::new());
        let projection =
            OpportunityViewProjection::new(views.clone(), profiles.clone(), raw.clone());
        Fixture {
            views,
            profiles,
            raw,
            projection,
        }
    }

    #[tokio::test]
    async fn visibility_contains_salesperson_manager_and_admins() {
        let f = fixture();
        let alice = UserIdentity {
            user_id: "alice-id".into(),
            employee_id: Some(10),
            name: "alice".into(),
            email: "alice@corp.io".into(),
        };
        f.profiles
            .upsert(profile("alice-id", "alice@corp.io", 100, None, false))
            .await
            .unwrap();
        f.profiles
            .upsert(profile("bob-id", "bob@corp.io", 200, Some(alice), false))
            .await
            .unwrap();
        f.profiles
            .upsert(profile("carol-id", "carol@corp.io", 300, None, true))
            .await
            .unwrap();

        f.projection
            .handle(&synced_event(201, Some(200), "Proposal"))
            .await
            .unwrap();

        let view = f.views.by_source_id("201").await.unwrap().unwrap();
        let visible = &view.visible_to_user_ids;
        assert!(visible.contains(&"bob-id".to_string()));
        assert!(visible.contains(&"alice-id".to_string()));
        assert!(visible.contains(&"carol-id".to_string()));
        assert_eq!(visible.len(), 3);
        assert_eq!(view.salesperson.as_ref().unwrap().user_id.as_deref(), Some("bob-id"));
    }

    #[tokio::test]
    async fn unresolved_salesperson_leaves_only_admin_visibility() {
        let f = fixture();
        f.profiles
            .upsert(profile("carol-id", "carol@corp.io", 300, None, true))
            .await
            .unwrap();

        f.projection
            .handle(&synced_event(201, Some(999), "New"))
            .await
            .unwrap();

        let view = f.views.by_source_id("201").await.unwrap().unwrap();
        assert_eq!(view.visible_to_user_ids, vec!["carol-id".to_string()]);
        let sp = view.salesperson.unwrap();
        assert!(sp.user_id.is_none());
        assert_eq!(sp.odoo_user_id, Some(999));
    }

    #[tokio::test]
    async fn account_is_joined_from_latest_raw_record() {
        let f = fixture();
        f.raw
            .upsert(
                EntityType::Account,
                "301",
                json!({"id": 301, "name": "Acme", "city": "Berlin", "country_name": "Germany"}),
                "job-1",
            )
            .await
            .unwrap();

        f.projection
            .handle(&synced_event(201, None, "New"))
            .await
            .unwrap();

        let view = f.views.by_source_id("201").await.unwrap().unwrap();
        let account = view.account.unwrap();
        assert_eq!(account.name, "Acme");
        assert_eq!(account.city.as_deref(), Some("Berlin"));
        assert_eq!(account.country.as_deref(), Some("Germany"));
    }

    #[tokio::test]
    async fn soft_delete_then_resync_resurrects() {
        let f = fixture();
        f.projection
            .handle(&synced_event(201, None, "New"))
            .await
            .unwrap();

        let delete = Event::new(
            EventType::OpportunityDeleted,
            AggregateType::Opportunity,
            "opportunity-201",
            json!({"id": 201, "reason": "odoo_deleted"}),
        )
        .with_version(2);
        f.projection.handle(&delete).await.unwrap();

        let deleted = f.views.by_source_id("201").await.unwrap().unwrap();
        assert!(!deleted.is_active);
        assert!(deleted.deleted_at.is_some());
        let stable_id = deleted.id.clone();

        f.projection
            .handle(&synced_event(201, None, "Proposal").with_version(3))
            .await
            .unwrap();
        let revived = f.views.by_source_id("201").await.unwrap().unwrap();
        assert!(revived.is_active);
        assert!(revived.deleted_at.is_none());
        assert_eq!(revived.id, stable_id);
        assert_eq!(revived.stage, "Proposal");
    }
}
