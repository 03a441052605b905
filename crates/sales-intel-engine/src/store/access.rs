//! The `user_access_matrix` collection: precomputed per-user access lists
//! with TTL semantics.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use sales_intel_core::error::Result;

/// Precomputed access-control entry for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessMatrix {
    pub user_id: String,
    pub email: String,
    /// Source ids of opportunities the user may read.
    pub accessible_opportunities: Vec<String>,
    /// Source ids of accounts referenced by those opportunities.
    pub accessible_accounts: Vec<String>,
    /// User ids of subordinates, expanded transitively.
    pub accessible_user_ids: Vec<String>,
    pub is_super_admin: bool,
    pub is_manager: bool,
    pub subordinate_count: usize,
    pub managed_team_ids: Vec<i64>,
    pub computed_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl AccessMatrix {
    /// Age of this entry in seconds.
    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.computed_at).num_seconds()
    }

    /// Whether readers should treat this entry as a cache miss.
    pub fn is_stale(&self, freshness: Duration) -> bool {
        self.age_seconds() >= freshness.as_secs() as i64
    }
}

/// Repository for the access matrix collection.
///
/// The backing store carries a TTL index on `computed_at`: entries past the
/// expiry window are dropped automatically and reads treat them as absent.
#[async_trait]
pub trait AccessMatrixStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<AccessMatrix>>;
    async fn put(&self, matrix: AccessMatrix) -> Result<()>;
    /// Drop expired entries; returns how many were removed. The document
    /// store does this automatically via its TTL index; the in-memory
    /// driver exposes it for tests and periodic sweeps.
    async fn remove_expired(&self) -> Result<usize>;
    async fn count(&self) -> Result<u64>;
    async fn truncate(&self) -> Result<()>;
}

/// In-memory driver with TTL-expiry-on-read semantics.
pub struct InMemoryAccessMatrixStore {
    entries: RwLock<HashMap<String, AccessMatrix>>,
    expiry: ChronoDuration,
}

impl InMemoryAccessMatrixStore {
    pub fn new(expiry: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            expiry: ChronoDuration::seconds(expiry.as_secs() as i64),
        }
    }

    fn expired(&self, matrix: &AccessMatrix) -> bool {
        Utc::now() - matrix.computed_at >= self.expiry
    }
}

#[async_trait]
impl AccessMatrixStore for InMemoryAccessMatrixStore {
    async fn get(&self, user_id: &str) -> Result<Option<AccessMatrix>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(user_id)
            .filter(|m| !self.expired(m))
            .cloned())
    }

    async fn put(&self, matrix: AccessMatrix) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(matrix.user_id.clone(), matrix);
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
