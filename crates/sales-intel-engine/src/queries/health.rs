//! System health summary: projection sizes and last sync, for operational
//! dashboards.

use serde::Serialize;
use std::sync::Arc;

use sales_intel_core::error::Result;

use crate::events::EventStore;
use crate::store::{
    AccessMatrixStore, ActivityViewStore, DashboardMetricsStore, OpportunityViewStore, SyncJob,
    SyncJobStore, UserProfileStore,
};

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub total_events: u64,
    pub user_profiles: u64,
    pub opportunity_views: u64,
    pub activity_views: u64,
    pub access_matrices: u64,
    pub dashboard_metrics: u64,
    pub last_completed_sync: Option<SyncJob>,
}

pub struct HealthQueries {
    event_store: Arc<dyn EventStore>,
    profiles: Arc<dyn UserProfileStore>,
    opportunities: Arc<dyn OpportunityViewStore>,
    activities: Arc<dyn ActivityViewStore>,
    matrices: Arc<dyn AccessMatrixStore>,
    metrics: Arc<dyn DashboardMetricsStore>,
    jobs: Arc<dyn SyncJobStore>,
}

impl HealthQueries {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_store: Arc<dyn EventStore>,
        profiles: Arc<dyn UserProfileStore>,
        opportunities: Arc<dyn OpportunityViewStore>,
        activities: Arc<dyn ActivityViewStore>,
        matrices: Arc<dyn AccessMatrixStore>,
        metrics: Arc<dyn DashboardMetricsStore>,
        jobs: Arc<dyn SyncJobStore>,
    ) -> Self {
        Self {
            event_store,
            profiles,
            opportunities,
            activities,
            matrices,
            metrics,
            jobs,
        }
    }

    pub async fn system_health(&self) -> Result<SystemHealth> {
        Ok(SystemHealth {
            total_events: self.event_store.count_events(None, None).await?,
            user_profiles: self.profiles.count().await?,
            opportunity_views: self.opportunities.count().await?,
            activity_views: self.activities.count().await?,
            access_matrices: self.matrices.count().await?,
            dashboard_metrics: self.metrics.count().await?,
            last_completed_sync: self.jobs.last_completed().await?,
        })
    }
}
