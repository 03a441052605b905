//! The `activity_view` materialized view: activities with visibility
//! inherited from their linked opportunity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use sales_intel_core::error::Result;
use sales_intel_core::models::PresalesCategory;

use super::opportunities::SalespersonSnapshot;

/// Minimal snapshot of the linked opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityRef {
    pub id: String,
    pub source_id: String,
    pub name: String,
    pub salesperson: Option<SalespersonSnapshot>,
}

/// Who the activity is assigned to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedTo {
    pub user_id: Option<String>,
    pub odoo_user_id: Option<i64>,
    pub name: String,
    pub email: Option<String>,
}

/// Denormalized activity document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityView {
    pub id: String,
    pub source_id: String,
    pub activity_type: String,
    pub summary: String,
    pub note: Option<String>,
    pub due_date: Option<String>,
    pub state: String,
    pub presales_category: PresalesCategory,
    pub opportunity: Option<OpportunityRef>,
    pub assigned_to: Option<AssignedTo>,
    /// Inherited verbatim from the linked opportunity at event time.
    pub visible_to_user_ids: Vec<String>,
    pub is_active: bool,
    pub last_synced: DateTime<Utc>,
    pub event_version: i64,
    pub created_at: DateTime<Utc>,
}

/// Query filter for the activity read surface.
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub category: Option<PresalesCategory>,
    pub state: Option<String>,
    pub activity_type: Option<String>,
}

impl ActivityFilter {
    fn matches(&self, activity: &ActivityView) -> bool {
        self.category.map_or(true, |c| activity.presales_category == c)
            && self
                .state
                .as_deref()
                .map_or(true, |s| activity.state == s)
            && self
                .activity_type
                .as_deref()
                .map_or(true, |t| activity.activity_type == t)
    }
}

/// Repository for the `activity_view` collection.
#[async_trait]
pub trait ActivityViewStore: Send + Sync {
    async fn by_source_id(&self, source_id: &str) -> Result<Option<ActivityView>>;
    /// Insert or replace, keyed by `source_id`.
    async fn upsert(&self, view: ActivityView) -> Result<()>;
    /// Active activities visible to the user, filtered.
    async fn visible_to(&self, user_id: &str, filter: &ActivityFilter)
        -> Result<Vec<ActivityView>>;
    /// Activities linked to one opportunity, by its source id.
    async fn linked_to_opportunity(&self, opportunity_source_id: &str)
        -> Result<Vec<ActivityView>>;
    async fn count(&self) -> Result<u64>;
    async fn truncate(&self) -> Result<()>;
}

/// In-memory driver for the activity view.
pub struct InMemoryActivityViewStore {
    views: RwLock<HashMap<String, ActivityView>>,
}

impl InMemoryActivityViewStore {
    pub fn new() -> Self {
        Self {
            views: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryActivityViewStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActivityViewStore for InMemoryActivityViewStore {
    async fn by_source_id(&self, source_id: &str) -> Result<Option<ActivityView>> {
        let views = self.views.read().await;
        Ok(views.get(source_id).cloned())
    }

    async fn upsert(&self, view: ActivityView) -> Result<()> {
        let mut views = self.views.write().await;
        views.insert(view.source_id.clone(), view);
        Ok(())
    }

    async fn visible_to(
        &self,
        user_id: &str,
        filter: &ActivityFilter,
    ) -> Result<Vec<ActivityView>> {
        let views = self.views.read().await;
        let mut matching: Vec<ActivityView> = views
            .values()
            .filter(|a| a.is_active)
            .filter(|a| a.visible_to_user_ids.iter().any(|id| id == user_id))
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(matching)
    }

    async fn linked_to_opportunity(
        &self,
        opportunity_source_id: &str,
    ) -> Result<Vec<ActivityView>> {
        let views = self.views.read().await;
        let mut matching: Vec<ActivityView> = views
            .values()
            .filter(|a| {
                a.opportunity
                    .as_ref()
                    .map_or(false, |o| o.source_id == opportunity_source_id)
            })
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

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(source_id: &str, category: PresalesCategory, visible: &[&str]) -> ActivityView {
        ActivityView {
            id: format!("act-{source_id}"),
            source_id: source_id.to_string(),
            activity_type: "Meeting".into(),
            summary: "Demo".into(),
            note: None,
            due_date: None,
            state: "planned".into(),
            presales_category: category,
            opportunity: Some(OpportunityRef {
                id: "opp-1".into(),
                source_id: "1".into(),
                name: "Opp".into(),
                salesperson: None,
            }),
            assigned_to: None,
            visible_to_user_ids: visible.iter().map(|s| s.to_string()).collect(),
            is_active: true,
            last_synced: Utc::now(),
            event_version: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn filtered_visibility_query() {
        let store = InMemoryActivityViewStore::new();
        store
            .upsert(activity("1", PresalesCategory::Demo, &["u1"]))
            .await
            .unwrap();
        store
            .upsert(activity("2", PresalesCategory::Poc, &["u1"]))
            .await
            .unwrap();
        store
            .upsert(activity("3", PresalesCategory::Demo, &["u2"]))
            .await
            .unwrap();

        let all = store
            .visible_to("u1", &ActivityFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let demos = store
            .visible_to(
                "u1",
                &ActivityFilter {
                    category: Some(PresalesCategory::Demo),
                    ..ActivityFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(demos.len(), 1);
        assert_eq!(demos[0].source_id, "1");
    }

    #[tokio::test]
    async fn linked_lookup() {
        let store = InMemoryActivityViewStore::new();
        store
            .upsert(activity("1", PresalesCategory::Demo, &[]))
            .await
            .unwrap();
        store
            .upsert(activity("2", PresalesCategory::Call, &[]))
            .await
            .unwrap();

        let linked = store.linked_to_opportunity("1").await.unwrap();
        assert_eq!(linked.len(), 2);
        assert!(store.linked_to_opportunity("9").await.unwrap().is_empty());
    }
}
