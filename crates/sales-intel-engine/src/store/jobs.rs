//! The `sync_jobs` collection: sync job lifecycle documents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use sales_intel_core::error::{Result, SalesIntelError};
use sales_intel_core::models::{SyncJobStatus, TriggerSource};

/// Per-entity counters accumulated by a sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub users: u64,
    pub opportunities: u64,
    pub accounts: u64,
    pub activities: u64,
    /// Records whose checksum matched the stored version.
    pub unchanged: u64,
    /// Records that failed mapping or appending; logged and skipped.
    pub record_errors: u64,
    pub total_events: u64,
}

/// One sync job document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: String,
    pub status: SyncJobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub triggered_by: String,
    pub trigger_source: TriggerSource,
    pub stats: Option<SyncStats>,
    pub error_message: Option<String>,
}

impl SyncJob {
    pub fn running(id: impl Into<String>, triggered_by: &str, source: TriggerSource) -> Self {
        Self {
            id: id.into(),
            status: SyncJobStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            triggered_by: triggered_by.to_string(),
            trigger_source: source,
            stats: None,
            error_message: None,
        }
    }
}

/// Repository for sync jobs. Enforces the single-active-job invariant.
#[async_trait]
pub trait SyncJobStore: Send + Sync {
    /// Register a new running job. Fails with
    /// [`SalesIntelError::JobConflict`] when another job is running.
    async fn begin(&self, job: SyncJob) -> Result<()>;
    async fn get(&self, job_id: &str) -> Result<Option<SyncJob>>;
    async fn complete(&self, job_id: &str, stats: SyncStats) -> Result<()>;
    async fn fail(&self, job_id: &str, error_message: &str) -> Result<()>;
    async fn running(&self) -> Result<Option<SyncJob>>;
    async fn last_completed(&self) -> Result<Option<SyncJob>>;
}

/// In-memory driver for sync jobs.
pub struct InMemorySyncJobStore {
    jobs: RwLock<HashMap<String, SyncJob>>,
}

impl InMemorySyncJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySyncJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncJobStore for InMemorySyncJobStore {
    async fn begin(&self, job: SyncJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(active) = jobs.values().find(|j| j.status == SyncJobStatus::Running) {
            return Err(SalesIntelError::JobConflict {
                message: format!("sync job {} is already running", active.id),
            });
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<SyncJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(job_id).cloned())
    }

    async fn complete(&self, job_id: &str, stats: SyncStats) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| SalesIntelError::Store {
            message: format!("sync job {job_id} not found"),
        })?;
        job.status = SyncJobStatus::Completed;
        job.completed_at = Some(Utc::now());
        job.stats = Some(stats);
        Ok(())
    }

    async fn fail(&self, job_id: &str, error_message: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| SalesIntelError::Store {
            message: format!("sync job {job_id} not found"),
        })?;
        job.status = SyncJobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error_message = Some(error_message.to_string());
        Ok(())
    }

    async fn running(&self) -> Result<Option<SyncJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .find(|j| j.status == SyncJobStatus::Running)
            .cloned())
    }

    async fn last_completed(&self) -> Result<Option<SyncJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| j.status == SyncJobStatus::Completed)
            .max_by_key(|j| j.completed_at)
            .cloned())
    }
}
