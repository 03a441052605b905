//! # Sales Intel Core
//!
//! Shared primitives for the sales-intelligence data backbone:
//!
//! - [`error`] - the platform-wide error taxonomy and `Result` alias
//! - [`config`] - environment-driven configuration for the remote source
//!   connection and sync scheduling
//! - [`models`] - the closed domain vocabularies (entity types, aggregate
//!   types, event types, job states, stage sets)
//!
//! Everything else (connector, stores, event bus, projections, queries)
//! lives in the `sales-intel-engine` crate.

pub mod config;
pub mod error;
pub mod models;

pub use config::{AppConfig, OdooConfig, SyncSettings};
pub use error::{Result, SalesIntelError};
pub use models::{
    AggregateType, EntityType, EventType, PresalesCategory, SyncJobStatus, TriggerSource,
};
