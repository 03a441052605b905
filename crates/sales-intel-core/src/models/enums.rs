use serde::{Deserialize, Serialize};

/// Entity kinds fetched from the remote source and stored as raw records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    User,
    Opportunity,
    Account,
    Activity,
}

impl EntityType {
    /// Sync order: users must project before opportunities reference them,
    /// opportunities before activities inherit their visibility.
    pub const SYNC_ORDER: [EntityType; 4] = [
        EntityType::User,
        EntityType::Opportunity,
        EntityType::Account,
        EntityType::Activity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Opportunity => "opportunity",
            EntityType::Account => "account",
            EntityType::Activity => "activity",
        }
    }

    /// The event emitted when a record of this entity kind changes.
    pub fn synced_event(&self) -> EventType {
        match self {
            EntityType::User => EventType::OdooUserSynced,
            EntityType::Opportunity => EventType::OdooOpportunitySynced,
            EntityType::Account => EventType::OdooAccountSynced,
            EntityType::Activity => EventType::OdooActivitySynced,
        }
    }

    pub fn aggregate_type(&self) -> AggregateType {
        match self {
            EntityType::User => AggregateType::User,
            EntityType::Opportunity => AggregateType::Opportunity,
            EntityType::Account => AggregateType::Account,
            EntityType::Activity => AggregateType::Activity,
        }
    }

    /// Stable aggregate id derived from the source id, e.g. `user-17`.
    pub fn aggregate_id(&self, source_id: &str) -> String {
        format!("{}-{}", self.as_str(), source_id)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Types of aggregates in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    User,
    Opportunity,
    Account,
    Activity,
    Invoice,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::User => "User",
            AggregateType::Opportunity => "Opportunity",
            AggregateType::Account => "Account",
            AggregateType::Activity => "Activity",
            AggregateType::Invoice => "Invoice",
        }
    }
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of domain event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    // User events
    OdooUserSynced,
    UserLoggedIn,
    ManagerAssigned,
    UserRoleChanged,
    // Opportunity events
    OdooOpportunitySynced,
    OpportunityCreated,
    OpportunityAssigned,
    OpportunityStageChanged,
    OpportunityDeleted,
    // Account events
    OdooAccountSynced,
    // Invoice events
    OdooInvoiceSynced,
    // Activity events
    OdooActivitySynced,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OdooUserSynced => "OdooUserSynced",
            EventType::UserLoggedIn => "UserLoggedIn",
            EventType::ManagerAssigned => "ManagerAssigned",
            EventType::UserRoleChanged => "UserRoleChanged",
            EventType::OdooOpportunitySynced => "OdooOpportunitySynced",
            EventType::OpportunityCreated => "OpportunityCreated",
            EventType::OpportunityAssigned => "OpportunityAssigned",
            EventType::OpportunityStageChanged => "OpportunityStageChanged",
            EventType::OpportunityDeleted => "OpportunityDeleted",
            EventType::OdooAccountSynced => "OdooAccountSynced",
            EventType::OdooInvoiceSynced => "OdooInvoiceSynced",
            EventType::OdooActivitySynced => "OdooActivitySynced",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle states of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncJobStatus {
    Running,
    Completed,
    Failed,
}

/// How a sync job was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Manual,
    Scheduled,
}

/// Presales classification tags for activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresalesCategory {
    #[serde(rename = "POC")]
    Poc,
    Demo,
    Presentation,
    #[serde(rename = "RFP_Influence")]
    RfpInfluence,
    Lead,
    Meeting,
    Call,
    Other,
}

impl PresalesCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresalesCategory::Poc => "POC",
            PresalesCategory::Demo => "Demo",
            PresalesCategory::Presentation => "Presentation",
            PresalesCategory::RfpInfluence => "RFP_Influence",
            PresalesCategory::Lead => "Lead",
            PresalesCategory::Meeting => "Meeting",
            PresalesCategory::Call => "Call",
            PresalesCategory::Other => "Other",
        }
    }
}

impl std::fmt::Display for PresalesCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages that end an opportunity's life, case-sensitive match against the
/// stored stage name.
pub const CLOSED_STAGES: [&str; 4] = ["Won", "Lost", "Closed Won", "Closed Lost"];

/// Stages that count toward won revenue.
pub const WON_STAGES: [&str; 2] = ["Won", "Closed Won"];

pub fn is_closed_stage(stage: &str) -> bool {
    CLOSED_STAGES.contains(&stage)
}

pub fn is_won_stage(stage: &str) -> bool {
    WON_STAGES.contains(&stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn event_type_serializes_to_wire_name() {
        let json = serde_json::to_string(&EventType::OdooUserSynced).unwrap();
        assert_eq!(json, "\"OdooUserSynced\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventType::OdooUserSynced);
    }

    #[test]
    fn entity_type_round_trip() {
        let json = serde_json::to_string(&EntityType::Opportunity).unwrap();
        assert_eq!(json, "\"opportunity\"");
    }

    #[test]
    fn aggregate_id_format() {
        assert_eq!(EntityType::User.aggregate_id("17"), "user-17");
        assert_eq!(EntityType::Activity.aggregate_id("9"), "activity-9");
    }

    #[test_case("Won", true, true)]
    #[test_case("Closed Won", true, true)]
    #[test_case("Lost", true, false)]
    #[test_case("Closed Lost", true, false)]
    #[test_case("Proposal", false, false)]
    #[test_case("won", false, false; "match is case sensitive")]
    fn stage_classification(stage: &str, closed: bool, won: bool) {
        assert_eq!(is_closed_stage(stage), closed);
        assert_eq!(is_won_stage(stage), won);
    }

    #[test]
    fn presales_category_wire_names() {
        assert_eq!(
            serde_json::to_string(&PresalesCategory::Poc).unwrap(),
            "\"POC\""
        );
        assert_eq!(
            serde_json::to_string(&PresalesCategory::RfpInfluence).unwrap(),
            "\"RFP_Influence\""
        );
    }
}
