//! Sync job lifecycle.
//!
//! Owns the `sync_jobs` collection: registers a running job (rejecting a
//! second trigger while one is active), executes the sync handler, and
//! records completion or failure with the aggregated stats or error
//! message.

use std::sync::Arc;
use uuid::Uuid;

use sales_intel_core::error::{Result, SalesIntelError};
use sales_intel_core::models::TriggerSource;

use crate::odoo::connector::SourceConnector;
use crate::store::{SyncJob, SyncJobStore};

use super::handler::SyncHandler;

pub struct SyncService {
    jobs: Arc<dyn SyncJobStore>,
    handler: Arc<SyncHandler>,
    connector: Arc<dyn SourceConnector>,
}

impl SyncService {
    pub fn new(
        jobs: Arc<dyn SyncJobStore>,
        handler: Arc<SyncHandler>,
        connector: Arc<dyn SourceConnector>,
    ) -> Self {
        Self {
            jobs,
            handler,
            connector,
        }
    }

    /// Start a sync in the background and return its job id.
    ///
    /// Fails with [`SalesIntelError::JobConflict`] when a job is already
    /// running.
    pub async fn trigger_sync(
        &self,
        triggered_by: &str,
        trigger_source: TriggerSource,
    ) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        self.jobs
            .begin(SyncJob::running(job_id.clone(), triggered_by, trigger_source))
            .await?;

        let jobs = self.jobs.clone();
        let handler = self.handler.clone();
        let connector = self.connector.clone();
        let spawned_job_id = job_id.clone();
        tokio::spawn(async move {
            Self::execute(jobs, handler, connector, spawned_job_id).await;
        });

        Ok(job_id)
    }

    /// Run a sync to completion on the current task. Used by schedulers
    /// and tests that need the final job document.
    pub async fn run_sync(
        &self,
        triggered_by: &str,
        trigger_source: TriggerSource,
    ) -> Result<SyncJob> {
        let job_id = Uuid::new_v4().to_string();
        self.jobs
            .begin(SyncJob::running(job_id.clone(), triggered_by, trigger_source))
            .await?;

        Self::execute(
            self.jobs.clone(),
            self.handler.clone(),
            self.connector.clone(),
            job_id.clone(),
        )
        .await;
        self.sync_status(&job_id).await
    }

    async fn execute(
        jobs: Arc<dyn SyncJobStore>,
        handler: Arc<SyncHandler>,
        connector: Arc<dyn SourceConnector>,
        job_id: String,
    ) {
        let outcome = handler
            .handle_sync_command(&job_id, connector.as_ref())
            .await;

        let record = match outcome {
            Ok(stats) => jobs.complete(&job_id, stats).await,
            Err(error) => {
                tracing::error!(job_id, %error, "sync failed");
                jobs.fail(&job_id, &error.to_string()).await
            }
        };
        if let Err(error) = record {
            tracing::error!(job_id, %error, "failed to record sync job outcome");
        }
    }

    /// Fetch a sync job document.
    pub async fn sync_status(&self, job_id: &str) -> Result<SyncJob> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or_else(|| SalesIntelError::NotInSystem {
                entity_type: "sync_job".to_string(),
                entity_id: job_id.to_string(),
            })
    }
}
