//! Storage layer: versioned raw records and the materialized view
//! collections.
//!
//! The document store itself is an external collaborator; this module
//! defines one async repository trait per collection plus an in-memory
//! reference driver for each. The engine and the test suite run against
//! the in-memory drivers; a production deployment supplies drivers backed
//! by its document store.

pub mod access;
pub mod activities;
pub mod jobs;
pub mod metrics;
pub mod opportunities;
pub mod profiles;
pub mod raw;

pub use access::{AccessMatrix, AccessMatrixStore, InMemoryAccessMatrixStore};
pub use activities::{
    ActivityFilter, ActivityView, ActivityViewStore, AssignedTo, InMemoryActivityViewStore,
    OpportunityRef,
};
pub use jobs::{InMemorySyncJobStore, SyncJob, SyncJobStore, SyncStats};
pub use metrics::{
    DashboardMetrics, DashboardMetricsStore, InMemoryDashboardMetricsStore, StageMetrics,
    TeamMetrics,
};
pub use opportunities::{
    AccountSnapshot, InMemoryOpportunityViewStore, OpportunityView, OpportunityViewStore,
    SalespersonSnapshot,
};
pub use profiles::{
    Hierarchy, InMemoryUserProfileStore, OdooLink, UserIdentity, UserProfile, UserProfileStore,
};
pub use raw::{canonical_json, payload_checksum, InMemoryRawStore, RawRecord, RawStore, RawUpsert};
