//! Closed domain vocabularies shared by the command and query sides.

mod enums;

pub use enums::{
    is_closed_stage, is_won_stage, AggregateType, EntityType, EventType, PresalesCategory,
    SyncJobStatus, TriggerSource, CLOSED_STAGES, WON_STAGES,
};
