#![allow(dead_code)]

//! Shared fixtures: an in-memory source connector and Odoo-shaped seed
//! records.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use sales_intel_core::config::SyncSettings;
use sales_intel_core::error::Result;
use sales_intel_core::models::EntityType;
use sales_intel_engine::odoo::SourceConnector;
use sales_intel_engine::sync::SyncService;
use sales_intel_engine::Backbone;

/// In-memory stand-in for the remote source; records can be swapped
/// between sync runs to simulate source-side edits.
pub struct TestSource {
    records: RwLock<HashMap<EntityType, Vec<Value>>>,
}

impl TestSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: RwLock::new(HashMap::new()),
        })
    }

    pub async fn set(&self, entity_type: EntityType, records: Vec<Value>) {
        self.records.write().await.insert(entity_type, records);
    }
}

#[async_trait]
impl SourceConnector for TestSource {
    async fn fetch_entities(&self, entity_type: EntityType) -> Result<Vec<Value>> {
        Ok(self
            .records
            .read()
            .await
            .get(&entity_type)
            .cloned()
            .unwrap_or_default())
    }
}

/// `hr.employee` record. The source user id is `employee_id * 10` by
/// convention in these fixtures.
pub fn employee(id: i64, name: &str, email: &str, manager_id: Option<i64>) -> Value {
    json!({
        "id": id,
        "name": name,
        "work_email": email,
        "job_title": "Account Executive",
        "user_id": [id * 10, name],
        "parent_id": manager_id.map(|m| json!([m, "manager"])).unwrap_or(json!(false)),
        "department_id": [5, "Sales"],
        "sale_team_id": [7, "EMEA"],
    })
}

/// `res.partner` record.
pub fn partner(id: i64, name: &str, city: &str, country: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "email": false,
        "phone": false,
        "street": false,
        "city": city,
        "zip": false,
        "state_id": false,
        "country_id": [76, country],
        "is_company": true,
        "parent_id": false,
    })
}

/// `crm.lead` record.
pub fn lead(
    id: i64,
    name: &str,
    salesperson_user_id: i64,
    partner_id: i64,
    revenue: f64,
    stage: &str,
) -> Value {
    json!({
        "id": id,
        "name": name,
        "partner_id": [partner_id, "partner"],
        "user_id": [salesperson_user_id, "salesperson"],
        "expected_revenue": revenue,
        "probability": 60.0,
        "stage_id": [3, stage],
        "team_id": [7, "EMEA"],
        "date_deadline": "2026-09-01",
        "description": false,
        "create_date": "2026-01-15 09:00:00",
    })
}

/// `mail.activity` record parented to an opportunity.
pub fn mail_activity(id: i64, summary: &str, res_id: i64, user_id: i64) -> Value {
    json!({
        "id": id,
        "summary": summary,
        "note": false,
        "activity_type_id": [2, "Meeting"],
        "state": "planned",
        "date_deadline": "2026-08-15",
        "res_model": "crm.lead",
        "res_id": res_id,
        "user_id": [user_id, "assignee"],
    })
}

pub struct Env {
    pub backbone: Backbone,
    pub source: Arc<TestSource>,
    pub service: SyncService,
}

/// A wired backbone with an empty test source.
pub async fn env() -> Env {
    let backbone = Backbone::in_memory(SyncSettings::default()).await;
    let source = TestSource::new();
    let service = backbone.sync_service(source.clone());
    Env {
        backbone,
        source,
        service,
    }
}

/// Stable profile UUID for an email.
pub async fn user_id(backbone: &Backbone, email: &str) -> String {
    backbone
        .profiles
        .by_email(email)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("no profile for {email}"))
        .id
}
