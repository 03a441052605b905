//! Access matrix lookups with rebuild-on-miss.

use std::sync::Arc;
use std::time::Duration;

use sales_intel_core::error::{Result, SalesIntelError};

use crate::projections::AccessMatrixProjection;
use crate::store::{AccessMatrix, AccessMatrixStore};

use super::KeyedLocks;

pub struct AccessQueries {
    matrices: Arc<dyn AccessMatrixStore>,
    projection: Arc<AccessMatrixProjection>,
    freshness: Duration,
    locks: KeyedLocks,
}

impl AccessQueries {
    pub fn new(
        matrices: Arc<dyn AccessMatrixStore>,
        projection: Arc<AccessMatrixProjection>,
        freshness: Duration,
    ) -> Self {
        Self {
            matrices,
            projection,
            freshness,
            locks: KeyedLocks::new(),
        }
    }

    /// O(1) authorization lookup.
    ///
    /// A miss or an entry older than the freshness window triggers one
    /// synchronous rebuild for this user. When even the rebuild yields no
    /// matrix the user is not in the system and the caller should prompt a
    /// resync.
    pub async fn access_matrix(&self, user_id: &str) -> Result<AccessMatrix> {
        if let Some(matrix) = self.matrices.get(user_id).await? {
            if !matrix.is_stale(self.freshness) {
                return Ok(matrix);
            }
        }

        let lock = self.locks.acquire(user_id).await;
        let _guard = lock.lock().await;

        // Another reader may have rebuilt while we waited.
        if let Some(matrix) = self.matrices.get(user_id).await? {
            if !matrix.is_stale(self.freshness) {
                return Ok(matrix);
            }
        }

        tracing::warn!(user_id, "access matrix miss, rebuilding");
        self.projection.rebuild_for_user(user_id).await?;

        self.matrices
            .get(user_id)
            .await?
            .ok_or_else(|| SalesIntelError::NotInSystem {
                entity_type: "user".to_string(),
                entity_id: user_id.to_string(),
            })
    }
}
