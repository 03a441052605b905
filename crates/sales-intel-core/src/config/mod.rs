//! Configuration for the backbone.
//!
//! All runtime configuration comes from the environment (a `.env` file is
//! honored via `dotenvy`). [`AppConfig::from_env`] is the single entry
//! point; components receive the typed sub-configs by value.

mod env_utils;

use std::time::Duration;

use crate::error::Result;

pub use env_utils::EnvLoader;

/// Connection settings for the remote Odoo source.
#[derive(Debug, Clone)]
pub struct OdooConfig {
    /// Base URL of the Odoo instance. Well-known path suffixes
    /// (`/odoo`, `/web`, `/jsonrpc`, `/xmlrpc`) are stripped by the
    /// connector.
    pub base_url: String,
    pub database: String,
    pub username: String,
    pub api_key: String,
}

impl OdooConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: EnvLoader::load_required("ODOO_URL")?,
            database: EnvLoader::load_required("ODOO_DB")?,
            username: EnvLoader::load_required("ODOO_USERNAME")?,
            api_key: EnvLoader::load_required("ODOO_API_KEY")?,
        })
    }
}

/// Scheduling and resource limits for sync jobs and view caches.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Outer deadline for a whole sync job. Checked between entity types;
    /// on overrun the job is marked failed with a timeout message.
    pub job_deadline: Duration,
    /// Per-request timeout for remote source calls.
    pub request_timeout: Duration,
    /// Page size for remote source pagination.
    pub page_size: u32,
    /// Age past which access-matrix and dashboard-metrics entries are
    /// treated as cache misses by readers.
    pub view_freshness: Duration,
    /// Age past which the store driver drops the entry entirely.
    pub view_expiry: Duration,
    /// Maximum retries for a failed page fetch before the job aborts.
    pub max_page_retries: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            job_deadline: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(30),
            page_size: 100,
            view_freshness: Duration::from_secs(300),
            view_expiry: Duration::from_secs(600),
            max_page_retries: 3,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            job_deadline: Duration::from_secs(EnvLoader::load_with_default(
                "SYNC_JOB_DEADLINE_SECS",
                defaults.job_deadline.as_secs(),
            )?),
            request_timeout: Duration::from_secs(EnvLoader::load_with_default(
                "SYNC_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            page_size: EnvLoader::load_with_default("SYNC_PAGE_SIZE", defaults.page_size)?,
            view_freshness: Duration::from_secs(EnvLoader::load_with_default(
                "VIEW_FRESHNESS_SECS",
                defaults.view_freshness.as_secs(),
            )?),
            view_expiry: Duration::from_secs(EnvLoader::load_with_default(
                "VIEW_EXPIRY_SECS",
                defaults.view_expiry.as_secs(),
            )?),
            max_page_retries: EnvLoader::load_with_default(
                "SYNC_MAX_PAGE_RETRIES",
                defaults.max_page_retries,
            )?,
        })
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub odoo: OdooConfig,
    pub sync: SyncSettings,
}

impl AppConfig {
    /// Load configuration from the environment, honoring a `.env` file if
    /// present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            odoo: OdooConfig::from_env()?,
            sync: SyncSettings::from_env()?,
        })
    }
}
