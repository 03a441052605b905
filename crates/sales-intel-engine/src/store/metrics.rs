//! The `dashboard_metrics` collection: precomputed per-user KPIs with TTL
//! semantics.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;

use sales_intel_core::error::Result;

/// Count and value for one pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub count: u64,
    pub value: f64,
}

/// Rolled-up totals for a manager's team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMetrics {
    pub team_size: usize,
    pub team_pipeline: f64,
    pub team_won: f64,
}

/// Precomputed dashboard aggregates for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub user_id: String,
    pub pipeline_value: f64,
    pub won_revenue: f64,
    pub active_opportunities: u64,
    pub total_opportunities: u64,
    pub won_count: u64,
    /// Non-closed stages only, keyed by stage name.
    pub by_stage: BTreeMap<String, StageMetrics>,
    pub team_metrics: Option<TeamMetrics>,
    pub computed_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl DashboardMetrics {
    pub fn is_stale(&self, freshness: Duration) -> bool {
        (Utc::now() - self.computed_at).num_seconds() >= freshness.as_secs() as i64
    }
}

/// Repository for the dashboard metrics collection. Same TTL model as the
/// access matrix store.
#[async_trait]
pub trait DashboardMetricsStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<DashboardMetrics>>;
    async fn put(&self, metrics: DashboardMetrics) -> Result<()>;
    async fn remove_expired(&self) -> Result<usize>;
    async fn count(&self) -> Result<u64>;
    async fn truncate(&self) -> Result<()>;
}

/// In-memory driver with TTL-expiry-on-read semantics.
pub struct InMemoryDashboardMetricsStore {
    entries: RwLock<HashMap<String, DashboardMetrics>>,
    expiry: ChronoDuration,
}

impl InMemoryDashboardMetricsStore {
    pub fn new(expiry: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            expiry: ChronoDuration::seconds(expiry.as_secs() as i64),
        }
    }
}

#[async_trait]
impl DashboardMetricsStore for InMemoryDashboardMetricsStore {
    async fn get(&self, user_id: &str) -> Result<Option<DashboardMetrics>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(user_id)
            .filter(|m| Utc::now() - m.computed_at < self.expiry)
            .cloned())
    }

    async fn put(&self, metrics: DashboardMetrics) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(metrics.user_id.clone(), metrics);
        Ok(())
    }

    async fn remove_expired(&self) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let expiry = self.expiry;
        entries.retain(|_, m| Utc::now() - m.computed_at < expiry);
        Ok(before - entries.len())
    }

    async fn count(&self) -> Result<u64> {
        let entries = self.entries.read().await;
        Ok(entries.len() as u64)
    }

    async fn truncate(&self) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ttl_reads() {
        let store = InMemoryDashboardMetricsStore::new(Duration::from_secs(600));
        store
            .put(DashboardMetrics {
                user_id: "u1".into(),
                pipeline_value: 100.0,
                won_revenue: 0.0,
                active_opportunities: 1,
                total_opportunities: 1,
                won_count: 0,
                by_stage: BTreeMap::new(),
                team_metrics: None,
                computed_at: Utc::now() - ChronoDuration::seconds(700),
                ttl_seconds: 300,
            })
            .await
            .unwrap();

        assert!(store.get("u1").await.unwrap().is_none());
        assert_eq!(store.remove_expired().await.unwrap(), 1);
    }
}
