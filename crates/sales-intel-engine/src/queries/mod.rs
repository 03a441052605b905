//! Query side: the read surface consumed by the HTTP layer.
//!
//! Every query is a lookup against a materialized view. The access-matrix
//! and dashboard-metrics reads add TTL semantics: a miss or an entry past
//! the freshness window triggers a synchronous rebuild for the requesting
//! user only, guarded by a per-user lock so concurrent readers do not
//! duplicate the work.

pub mod access;
pub mod dashboard;
pub mod health;
pub mod visibility;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub use access::AccessQueries;
pub use dashboard::DashboardQueries;
pub use health::{HealthQueries, SystemHealth};
pub use visibility::VisibilityQueries;

/// Per-key async locks for single-flight rebuilds.
pub(crate) struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
