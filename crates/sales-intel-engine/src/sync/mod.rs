//! Command side: the change-detecting sync pipeline, the job lifecycle
//! service, and the non-sync domain commands.

pub mod commands;
pub mod handler;
pub mod service;

pub use commands::Commands;
pub use handler::SyncHandler;
pub use service::SyncService;
