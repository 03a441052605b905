//! Dashboard metrics projection.
//!
//! Maintains `dashboard_metrics`: per-user pipeline, won revenue and
//! by-stage aggregates over the opportunities the user's access matrix
//! grants, so dashboards load without scanning the opportunity view.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use sales_intel_core::error::Result;
use sales_intel_core::models::{is_closed_stage, is_won_stage, EventType};

use crate::events::{Event, EventStore};
use crate::store::{
    AccessMatrixStore, DashboardMetrics, DashboardMetricsStore, OpportunityViewStore,
    StageMetrics, TeamMetrics, UserProfileStore,
};

use super::{affected_salesperson_ids, Projection};

const METRICS_TTL_SECONDS: u64 = 300;

pub struct DashboardMetricsProjection {
    metrics: Arc<dyn DashboardMetricsStore>,
    matrices: Arc<dyn AccessMatrixStore>,
    profiles: Arc<dyn UserProfileStore>,
    opportunities: Arc<dyn OpportunityViewStore>,
    event_store: Arc<dyn EventStore>,
}

impl DashboardMetricsProjection {
    pub fn new(
        metrics: Arc<dyn DashboardMetricsStore>,
        matrices: Arc<dyn AccessMatrixStore>,
        profiles: Arc<dyn UserProfileStore>,
        opportunities: Arc<dyn OpportunityViewStore>,
        event_store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            metrics,
            matrices,
            profiles,
            opportunities,
            event_store,
        }
    }

    /// Compute and store all metrics for one user.
    pub async fn rebuild_for_user(&self, user_id: &str) -> Result<()> {
        let Some(access) = self.matrices.get(user_id).await? else {
            // No matrix yet; the query layer rebuilds both on demand.
            tracing::warn!(user_id, "no access matrix, skipping metrics rebuild");
            return Ok(());
        };

        let opportunities = self
            .opportunities
            .by_source_ids(&access.accessible_opportunities)
            .await?;

        let mut pipeline_value = 0.0;
        let mut won_revenue = 0.0;
        let mut active_opportunities = 0u64;
        let mut won_count = 0u64;
        let mut by_stage: BTreeMap<String, StageMetrics> = BTreeMap::new();

        for opportunity in &opportunities {
            if is_won_stage(&opportunity.stage) {
                won_revenue += opportunity.value;
                won_count += 1;
            }
            if !is_closed_stage(&opportunity.stage) {
                pipeline_value += opportunity.value;
                active_opportunities += 1;
                let entry = by_stage.entry(opportunity.stage.clone()).or_default();
                entry.count += 1;
                entry.value += opportunity.value;
            }
        }

        let team_metrics = access.is_manager.then(|| TeamMetrics {
            team_size: access.subordinate_count,
            team_pipeline: pipeline_value,
            team_won: won_revenue,
        });

        let metrics = DashboardMetrics {
            user_id: user_id.to_string(),
            pipeline_value,
            won_revenue,
            active_opportunities,
            total_opportunities: opportunities.len() as u64,
            won_count,
            by_stage,
            team_metrics,
            computed_at: Utc::now(),
            ttl_seconds: METRICS_TTL_SECONDS,
        };

        tracing::info!(
            user_id,
            pipeline_value,
            active_opportunities,
            "dashboard metrics computed"
        );
        self.metrics.put(metrics).await
    }

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

    async fn handle_user_changed(&self, event: &Event) -> Result<()> {
        let Some(email) = event.payload.get("email").and_then(Value::as_str) else {
            return Ok(());
        };
        if let Some(user) = self.profiles.by_email(&email.to_lowercase()).await? {
            self.rebuild_for_user(&user.id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Projection for DashboardMetricsProjection {
    fn name(&self) -> &'static str {
        "DashboardMetricsProjection"
    }

    fn subscribes_to(&self) -> Vec<EventType> {
        vec![
            EventType::OdooOpportunitySynced,
            EventType::OpportunityStageChanged,
            EventType::OdooUserSynced,
        ]
    }

    fn priority(&self) -> u8 {
        2
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        match event.event_type {
            EventType::OdooOpportunitySynced | EventType::OpportunityStageChanged => {
                self.handle_opportunity_changed(event).await
            }
            EventType::OdooUserSynced => self.handle_user_changed(event).await,
            _ => Ok(()),
        }
    }

    async fn truncate(&self) -> Result<()> {
        self.metrics.truncate().await
    }
}
