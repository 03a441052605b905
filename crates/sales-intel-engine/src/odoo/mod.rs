//! Remote Odoo integration: the JSON-RPC connector and the vendor field
//! mapper.

pub mod connector;
pub mod mapper;

pub use connector::{OdooConnector, SourceConnector};
