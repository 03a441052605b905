//! User profile projection.
//!
//! Builds the `user_profiles` view: denormalized users with resolved
//! manager and subordinate snapshots. The stable profile UUID is generated
//! on first insert for an email and preserved across every later mutation;
//! it is the identity opportunities and access matrices reference.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use sales_intel_core::error::Result;
use sales_intel_core::models::EventType;

use crate::events::Event;
use crate::odoo::mapper::non_empty;
use crate::store::{Hierarchy, OdooLink, UserProfile, UserProfileStore};

use super::Projection;

pub struct UserProfileProjection {
    profiles: Arc<dyn UserProfileStore>,
}

impl UserProfileProjection {
    pub fn new(profiles: Arc<dyn UserProfileStore>) -> Self {
        Self { profiles }
    }

    async fn handle_user_synced(&self, event: &Event) -> Result<()> {
        let payload = &event.payload;
        let email = payload.get("email").and_then(Value::as_str).unwrap_or("");
        if email.is_empty() {
            tracing::warn!(event_id = %event.id, "OdooUserSynced event has no email");
            return Ok(());
        }
        let email = email.to_lowercase();

        let employee_id = payload.get("odoo_employee_id").and_then(Value::as_i64);
        let odoo_user_id = payload.get("odoo_user_id").and_then(Value::as_i64);
        let manager_employee_id = payload.get("manager_odoo_id").and_then(Value::as_i64);

        // Subordinates: everyone whose stored manager id points at this user.
        let subordinates = match employee_id {
            Some(id) => self
                .profiles
                .subordinates_of(id)
                .await?
                .iter()
                .map(UserProfile::identity)
                .collect(),
            None => Vec::new(),
        };

        let manager = match manager_employee_id {
            Some(id) => self
                .profiles
                .by_odoo_employee_id(id)
                .await?
                .map(|p| p.identity()),
            None => None,
        };

        let existing = self.profiles.by_email(&email).await?;
        let (id, created_at, is_super_admin, role, last_login, version) = match &existing {
            Some(p) => (
                p.id.clone(),
                p.created_at,
                p.is_super_admin,
                p.role.clone(),
                p.last_login,
                p.version + 1,
            ),
            None => (Uuid::new_v4().to_string(), Utc::now(), false, None, None, 1),
        };

        let subordinate_count = subordinates.len();
        let profile = UserProfile {
            id,
            email: email.clone(),
            name: payload
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            job_title: payload
                .get("job_title")
                .and_then(Value::as_str)
                .map(str::to_string)
                .and_then(non_empty),
            role,
            odoo: OdooLink {
                user_id: odoo_user_id,
                employee_id,
                team_id: payload.get("team_id").and_then(Value::as_i64),
                team_name: payload
                    .get("team_name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .and_then(non_empty),
                department_id: payload.get("department_id").and_then(Value::as_i64),
                department_name: payload
                    .get("department_name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .and_then(non_empty),
                manager_employee_id,
            },
            hierarchy: Hierarchy::with_subordinates(manager, subordinates),
            is_super_admin,
            last_login,
            last_sync: Some(event.timestamp),
            event_version: event.version,
            created_at,
            version,
        };

        let identity = profile.identity();
        self.profiles.upsert(profile).await?;

        tracing::info!(
            email,
            ?employee_id,
            subordinates = subordinate_count,
            action = if existing.is_some() { "updated" } else { "created" },
            "user profile projected"
        );

        // Denormalization refresh: this user's identity is embedded in the
        // manager slot of every report, and in their own manager's
        // subordinate list.
        if let Some(employee_id) = employee_id {
            let touched = self
                .profiles
                .set_manager_snapshot(employee_id, identity)
                .await?;
            if touched > 0 {
                tracing::info!(touched, "refreshed manager snapshot in subordinate profiles");
            }
        }
        if let Some(manager_employee_id) = manager_employee_id {
            self.refresh_subordinate_list(manager_employee_id).await?;
        }

        Ok(())
    }

    /// Recompute the embedded subordinate list on the profile owning the
    /// given employee id.
    async fn refresh_subordinate_list(&self, manager_employee_id: i64) -> Result<()> {
        let Some(mut manager) = self.profiles.by_odoo_employee_id(manager_employee_id).await?
        else {
            return Ok(());
        };
        let subordinates: Vec<_> = self
            .profiles
            .subordinates_of(manager_employee_id)
            .await?
            .iter()
            .map(UserProfile::identity)
            .collect();
        manager.hierarchy =
            Hierarchy::with_subordinates(manager.hierarchy.manager.clone(), subordinates);
        manager.version += 1;
        self.profiles.upsert(manager).await
    }

    async fn handle_manager_assigned(&self, event: &Event) -> Result<()> {
        let payload = &event.payload;
        let Some(email) = payload.get("user_email").and_then(Value::as_str) else {
            tracing::warn!(event_id = %event.id, "ManagerAssigned event has no user_email");
            return Ok(());
        };
        let Some(mut profile) = self.profiles.by_email(&email.to_lowercase()).await? else {
            tracing::warn!(email, "ManagerAssigned for unknown user");
            return Ok(());
        };

        let old_manager = profile.odoo.manager_employee_id;
        let new_manager = payload
            .get("new_manager_employee_id")
            .and_then(Value::as_i64);

        profile.odoo.manager_employee_id = new_manager;
        profile.hierarchy.manager = match new_manager {
            Some(id) => self
                .profiles
                .by_odoo_employee_id(id)
                .await?
                .map(|p| p.identity()),
            None => None,
        };
        profile.version += 1;
        self.profiles.upsert(profile).await?;

        // Both sides of the move need their subordinate lists recomputed.
        if let Some(id) = old_manager {
            self.refresh_subordinate_list(id).await?;
        }
        if let Some(id) = new_manager {
            self.refresh_subordinate_list(id).await?;
        }
        Ok(())
    }

    async fn handle_role_changed(&self, event: &Event) -> Result<()> {
        let payload = &event.payload;
        let Some(email) = payload.get("user_email").and_then(Value::as_str) else {
            return Ok(());
        };
        let Some(mut profile) = self.profiles.by_email(&email.to_lowercase()).await? else {
            tracing::warn!(email, "UserRoleChanged for unknown user");
            return Ok(());
        };

        let new_role = payload
            .get("new_role")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        profile.is_super_admin = new_role == "super_admin";
        profile.role = non_empty(new_role);
        profile.version += 1;
        self.profiles.upsert(profile).await
    }

    async fn handle_logged_in(&self, event: &Event) -> Result<()> {
        let Some(email) = event.payload.get("email").and_then(Value::as_str) else {
            return Ok(());
        };
        let Some(mut profile) = self.profiles.by_email(&email.to_lowercase()).await? else {
            return Ok(());
        };
        profile.last_login = Some(event.timestamp);
        self.profiles.upsert(profile).await
    }
}

#[async_trait]
impl Projection for UserProfileProjection {
    fn name(&self) -> &'static str {
        "UserProfileProjection"
    }

    fn subscribes_to(&self) -> Vec<EventType> {
        vec![
            EventType::OdooUserSynced,
            EventType::UserLoggedIn,
            EventType::ManagerAssigned,
            EventType::UserRoleChanged,
        ]
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        match event.event_type {
            EventType::OdooUserSynced => self.handle_user_synced(event).await,
            EventType::ManagerAssigned => self.handle_manager_assigned(event).await,
            EventType::UserRoleChanged => self.handle_role_changed(event).await,
            EventType::UserLoggedIn => self.handle_logged_in(event).await,
            _ => Ok(()),
        }
    }

    async fn truncate(&self) -> Result<()> {
        self.profiles.truncate().await
    }
}
