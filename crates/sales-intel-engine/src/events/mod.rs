//! Event sourcing backbone: typed domain events, the append-only event
//! store, and the in-process event bus.

pub mod bus;
pub mod store;
pub mod types;

pub use bus::{DispatchOutcome, EventBus, EventHandler};
pub use store::{EventStore, InMemoryEventStore};
pub use types::{Event, EventMetadata};
