//! Access matrix projection.
//!
//! Maintains `user_access_matrix`: per-user precomputed lists of
//! accessible opportunity, account and subordinate ids, so authorization
//! is an O(1) document read. On every relevant event the projection
//! determines the affected users and rebuilds only their matrices.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use sales_intel_core::error::Result;
use sales_intel_core::models::EventType;

use crate::events::{Event, EventStore};
use crate::store::{
    AccessMatrix, AccessMatrixStore, OpportunityViewStore, UserProfile, UserProfileStore,
};

use super::{affected_salesperson_ids, Projection};

/// Freshness horizon stamped on each entry; readers treat older entries as
/// cache misses.
const MATRIX_TTL_SECONDS: u64 = 300;

pub struct AccessMatrixProjection {
    matrices: Arc<dyn AccessMatrixStore>,
    profiles: Arc<dyn UserProfileStore>,
    opportunities: Arc<dyn OpportunityViewStore>,
    event_store: Arc<dyn EventStore>,
}

impl AccessMatrixProjection {
    pub fn new(
        matrices: Arc<dyn AccessMatrixStore>,
        profiles: Arc<dyn UserProfileStore>,
        opportunities: Arc<dyn OpportunityViewStore>,
        event_store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            matrices,
            profiles,
            opportunities,
            event_store,
        }
    }

    /// Rebuild the matrix for one user.
    ///
    /// Also the entry point for on-demand rebuilds from the query layer
    /// when a lookup misses or the entry has aged out.
    pub async fn rebuild_for_user(&self, user_id: &str) -> Result<()> {
        let Some(profile) = self.profiles.by_id(user_id).await? else {
            tracing::warn!(user_id, "cannot rebuild access matrix, user not found");
            return Ok(());
        };

        let accessible_opportunities = if profile.is_super_admin {
            self.opportunities.active_source_ids().await?
        } else {
            self.opportunities
                .visible_to(user_id)
                .await?
                .into_iter()
                .map(|v| v.source_id)
                .collect()
        };

        // Accounts are reachable through accessible opportunities.
        let mut accessible_accounts: Vec<String> = self
            .opportunities
            .by_source_ids(&accessible_opportunities)
            .await?
            .into_iter()
            .filter_map(|v| v.account.map(|a| a.source_id))
            .collect();
        accessible_accounts.sort();
        accessible_accounts.dedup();

        let direct_reports = match profile.odoo.employee_id {
            Some(id) => self.profiles.subordinates_of(id).await?.len(),
            None => 0,
        };
        let accessible_user_ids = self.transitive_subordinates(&profile).await?;

        let matrix = AccessMatrix {
            user_id: profile.id.clone(),
            email: profile.email.clone(),
            accessible_opportunities,
            accessible_accounts,
            accessible_user_ids,
            is_super_admin: profile.is_super_admin,
            is_manager: direct_reports > 0,
            subordinate_count: direct_reports,
            managed_team_ids: profile.odoo.team_id.into_iter().collect(),
            computed_at: Utc::now(),
            ttl_seconds: MATRIX_TTL_SECONDS,
        };

        tracing::info!(
            email = %profile.email,
            opportunities = matrix.accessible_opportunities.len(),
            subordinates = matrix.accessible_user_ids.len(),
            "access matrix rebuilt"
        );
        self.matrices.put(matrix).await
    }

    /// Multi-level subordinate expansion with a visited-set cycle guard.
    async fn transitive_subordinates(&self, profile: &UserProfile) -> Result<Vec<String>> {
        let mut user_ids = Vec::new();
        let mut visited: HashSet<i64> = HashSet::new();
        let mut frontier: Vec<i64> = profile.odoo.employee_id.into_iter().collect();

        while let Some(employee_id) = frontier.pop() {
            if !visited.insert(employee_id) {
                continue;
            }
            for subordinate in self.profiles.subordinates_of(employee_id).await? {
                if subordinate.id != profile.id && !user_ids.contains(&subordinate.id) {
                    user_ids.push(subordinate.id.clone());
                }
                if let Some(id) = subordinate.odoo.employee_id {
                    frontier.push(id);
                }
            }
        }
        user_ids.sort();
        Ok(user_ids)
    }

    /// A user changed: their own visibility, their reports' and their
    /// manager's can all shift.
    async fn handle_user_changed(&self, event: &Event) -> Result<()> {
        let payload = &event.payload;
        let email = payload
            .get("email")
            .or_else(|| payload.get("user_email"))
            .and_then(Value::as_str)
            .unwrap_or("");
        if email.is_empty() {
            return Ok(());
        }
        let Some(user) = self.profiles.by_email(&email.to_lowercase()).await? else {
            return Ok(());
        };

        self.rebuild_for_user(&user.id).await?;

        if let Some(employee_id) = user.odoo.employee_id {
            for subordinate in self.profiles.subordinates_of(employee_id).await? {
                self.rebuild_for_user(&subordinate.id).await?;
            }
        }
        if let Some(manager) = &user.hierarchy.manager {
            self.rebuild_for_user(&manager.user_id).await?;
        }
        Ok(())
    }

    /// An opportunity changed: the new owner, the previous owner (when the
    /// assignment moved), their managers, and every super-admin hold
    /// matrices that reference it.
    async fn handle_opportunity_changed(&self, event: &Event) -> Result<()> {
        for odoo_user_id in affected_salesperson_ids(event, self.event_store.as_ref()).await? {
            let Some(user) = self.profiles.by_odoo_user_id(odoo_user_id).await? else {
                continue;
            };
            self.rebuild_for_user(&user.id).await?;
            if let Some(manager) = &user.hierarchy.manager {
                self.rebuild_for_user(&manager.user_id).await?;
            }
        }

        for admin in self.profiles.super_admins().await? {
            self.rebuild_for_user(&admin.id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Projection for AccessMatrixProjection {
    fn name(&self) -> &'static str {
        "AccessMatrixProjection"
    }

    fn subscribes_to(&self) -> Vec<EventType> {
        vec![
            EventType::OdooUserSynced,
            EventType::ManagerAssigned,
            EventType::OdooOpportunitySynced,
            EventType::OpportunityAssigned,
        ]
    }

    fn priority(&self) -> u8 {
        1
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        match event.event_type {
            EventType::OdooUserSynced | EventType::ManagerAssigned => {
                self.handle_user_changed(event).await
            }
            EventType::OdooOpportunitySynced | EventType::OpportunityAssigned => {
                self.handle_opportunity_changed(event).await
            }
            _ => Ok(()),
        }
    }

    async fn truncate(&self) -> Result<()> {
        self.matrices.truncate().await
    }
}
