//! Dashboard metrics lookups with rebuild-on-miss.

use std::sync::Arc;
use std::time::Duration;

use sales_intel_core::error::{Result, SalesIntelError};

use crate::projections::DashboardMetricsProjection;
use crate::store::{DashboardMetrics, DashboardMetricsStore};

use super::{AccessQueries, KeyedLocks};

pub struct DashboardQueries {
    metrics: Arc<dyn DashboardMetricsStore>,
    projection: Arc<DashboardMetricsProjection>,
    access: Arc<AccessQueries>,
    freshness: Duration,
    locks: KeyedLocks,
}

impl DashboardQueries {
    pub fn new(
        metrics: Arc<dyn DashboardMetricsStore>,
        projection: Arc<DashboardMetricsProjection>,
        access: Arc<AccessQueries>,
        freshness: Duration,
    ) -> Self {
        Self {
            metrics,
            projection,
            access,
            freshness,
            locks: KeyedLocks::new(),
        }
    }

    /// Precomputed dashboard aggregates for one user, rebuilding on miss
    /// or staleness. The metrics computation reads the access matrix, so
    /// the rebuild path refreshes that first.
    pub async fn dashboard_metrics(&self, user_id: &str) -> Result<DashboardMetrics> {
        if let Some(metrics) = self.metrics.get(user_id).await? {
            if !metrics.is_stale(self.freshness) {
                return Ok(metrics);
            }
        }

        let lock = self.locks.acquire(user_id).await;
        let _guard = lock.lock().await;

        if let Some(metrics) = self.metrics.get(user_id).await? {
            if !metrics.is_stale(self.freshness) {
                return Ok(metrics);
            }
        }

        tracing::info!(user_id, "dashboard metrics miss, computing");
        self.access.access_matrix(user_id).await?;
        self.projection.rebuild_for_user(user_id).await?;

        self.metrics
            .get(user_id)
            .await?
            .ok_or_else(|| SalesIntelError::NotInSystem {
                entity_type: "user".to_string(),
                entity_id: user_id.to_string(),
            })
    }
}
