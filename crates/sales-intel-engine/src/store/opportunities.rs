//! The `opportunity_view` materialized view: opportunities with pre-joined
//! salesperson and account snapshots and a precomputed visibility set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use sales_intel_core::error::Result;

use super::profiles::UserIdentity;

/// Salesperson snapshot pre-joined from the user profile view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalespersonSnapshot {
    /// Resolved platform identity; `None` when the source user id did not
    /// match any profile at event time.
    pub user_id: Option<String>,
    pub odoo_user_id: Option<i64>,
    pub odoo_employee_id: Option<i64>,
    pub name: String,
    pub email: Option<String>,
    pub team_id: Option<i64>,
    pub team_name: Option<String>,
    pub manager: Option<UserIdentity>,
}

/// Account snapshot pre-joined from the latest raw account record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub source_id: String,
    pub name: String,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// Denormalized opportunity document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityView {
    pub id: String,
    pub source_id: String,
    pub name: String,
    pub stage: String,
    pub value: f64,
    pub probability: f64,
    pub expected_close_date: Option<String>,
    pub description: Option<String>,
    pub salesperson: Option<SalespersonSnapshot>,
    pub account: Option<AccountSnapshot>,
    /// Deduplicated, sorted set of user UUIDs permitted to read this
    /// opportunity. Always contains the salesperson (when resolved), their
    /// manager (when any), and every super-admin.
    pub visible_to_user_ids: Vec<String>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub delete_reason: Option<String>,
    pub last_synced: DateTime<Utc>,
    pub event_version: i64,
    pub created_at: DateTime<Utc>,
}

impl OpportunityView {
    pub fn visible_to(&self, user_id: &str) -> bool {
        self.visible_to_user_ids.iter().any(|id| id == user_id)
    }
}

/// Repository for the `opportunity_view` collection.
#[async_trait]
pub trait OpportunityViewStore: Send + Sync {
    async fn by_source_id(&self, source_id: &str) -> Result<Option<OpportunityView>>;
    /// Insert or replace, keyed by `source_id`.
    async fn upsert(&self, view: OpportunityView) -> Result<()>;
    /// Soft delete: the document stays readable for audit.
    async fn soft_delete(&self, source_id: &str, reason: &str) -> Result<bool>;
    /// Active opportunities whose visibility set contains the user.
    async fn visible_to(&self, user_id: &str) -> Result<Vec<OpportunityView>>;
    /// Source ids of all active opportunities.
    async fn active_source_ids(&self) -> Result<Vec<String>>;
    /// Active opportunities among the given source ids.
    async fn by_source_ids(&self, source_ids: &[String]) -> Result<Vec<OpportunityView>>;
    async fn count(&self) -> Result<u64>;
    async fn truncate(&self) -> Result<()>;
}

/// In-memory driver for the opportunity view.
pub struct InMemoryOpportunityViewStore {
    views: RwLock<HashMap<String, OpportunityView>>,
}

impl InMemoryOpportunityViewStore {
    pub fn new() -> Self {
        Self {
            views: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryOpportunityViewStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OpportunityViewStore for InMemoryOpportunityViewStore {
    async fn by_source_id(&self, source_id: &str) -> Result<Option<OpportunityView>> {
        let views = self.views.read().await;
        Ok(views.get(source_id).cloned())
    }

    async fn upsert(&self, view: OpportunityView) -> Result<()> {
        let mut views = self.views.write().await;
        views.insert(view.source_id.clone(), view);
        Ok(())
    }

    async fn soft_delete(&self, source_id: &str, reason: &str) -> Result<bool> {
        let mut views = self.views.write().await;
        match views.get_mut(source_id) {
            Some(view) => {
                view.is_active = false;
                view.deleted_at = Some(Utc::now());
                view.delete_reason = Some(reason.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn visible_to(&self, user_id: &str) -> Result<Vec<OpportunityView>> {
        let views = self.views.read().await;
        let mut matching: Vec<OpportunityView> = views
            .values()
            .filter(|v| v.is_active && v.visible_to(user_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(matching)
    }

    async fn active_source_ids(&self) -> Result<Vec<String>> {
        let views = self.views.read().await;
        let mut ids: Vec<String> = views
            .values()
            .filter(|v| v.is_active)
            .map(|v| v.source_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn by_source_ids(&self, source_ids: &[String]) -> Result<Vec<OpportunityView>> {
        let views = self.views.read().await;
        let mut matching: Vec<OpportunityView> = source_ids
            .iter()
            .filter_map(|id| views.get(id))
            .filter(|v| v.is_active)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(matching)
    }

    async fn count(&self) -> Result<u64> {
        let views = self.views.read().await;
        Ok(views.len() as u64)
    }

    async fn truncate(&self) -> Result<()> {
        let mut views = self.views.write().await;
        views.clear();
        Ok(())
    }
}
