//! # Sales Intel Engine
//!
//! The event-sourced backbone behind the sales-intelligence platform. It
//! continuously ingests records from a remote Odoo instance, stores them in
//! an immutable event log, and maintains a family of denormalized
//! read-optimized views so that dashboard and access-control queries are
//! O(1) lookups.
//!
//! ## Architecture
//!
//! Command side:
//!
//! 1. [`odoo`] - JSON-RPC connector and the vendor field mapper
//! 2. [`store::raw`] - versioned, checksum-keyed raw record storage
//! 3. [`sync`] - the change-detecting sync command handler and job lifecycle
//!
//! Event backbone:
//!
//! 4. [`events::store`] - append-only log with per-aggregate monotonic
//!    versions and per-projection processing marks
//! 5. [`events::bus`] - in-process pub/sub with staged parallel fan-out
//!
//! Query side:
//!
//! 6. [`projections`] - five materialized views (user profiles,
//!    opportunities, activities, access matrix, dashboard metrics)
//! 7. [`queries`] - the read surface consumed by the HTTP layer, with
//!    TTL-driven on-demand rebuilds
//!
//! [`bootstrap::Backbone`] wires the whole thing together with injected
//! dependencies; nothing in this crate uses ambient global state.

pub mod bootstrap;
pub mod events;
pub mod odoo;
pub mod projections;
pub mod queries;
pub mod store;
pub mod sync;

pub use bootstrap::Backbone;
pub use events::{Event, EventBus, EventMetadata, EventStore};
pub use sync::{SyncHandler, SyncService};
