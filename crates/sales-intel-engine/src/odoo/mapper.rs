//! Vendor field mapper.
//!
//! Normalizes the field shapes Odoo returns across versions into canonical
//! records. Every function here is a pure transformation over the raw
//! payload; the mapper never consults a store.
//!
//! Relation (Many2One) fields arrive in three wire forms:
//!
//! - array `[id, "Display Name"]` (v17+)
//! - object `{"id": 12, "name": "Display Name"}`
//! - bare scalar `12`
//!
//! Unset text and relation fields come back as `false`, which is coerced to
//! the empty string (or `None`/`0.0` for ids and numerics). Date strings
//! pass through verbatim.

use serde_json::{json, Value};

use sales_intel_core::models::EntityType;

/// Extract the id from a relation field, whatever its wire form.
pub fn relation_id(value: &Value) -> Option<i64> {
    match value {
        Value::Array(items) => items.first().and_then(Value::as_i64),
        Value::Object(map) => map.get("id").and_then(Value::as_i64),
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Extract the display name from a relation field, empty when absent.
pub fn relation_name(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .get(1)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Value::Object(map) => map
            .get("name")
            .or_else(|| map.get("display_name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

/// Extract the id list from a Many2Many field.
pub fn many2many_ids(value: &Value) -> Vec<i64> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_i64).collect(),
        _ => Vec::new(),
    }
}

/// Coerce Odoo's `false`/null quirks on text fields to the empty string.
pub fn clean_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(false) | Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Coerce a numeric field, defaulting to 0.0 on any coercion failure.
pub fn clean_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Empty strings become `None`; everything else is kept.
pub fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn field<'a>(raw: &'a Value, key: &str) -> &'a Value {
    raw.get(key).unwrap_or(&Value::Null)
}

/// Map an `hr.employee` record to the canonical user shape.
pub fn map_user(raw: &Value) -> Value {
    let department = field(raw, "department_id");
    let team = field(raw, "sale_team_id");

    json!({
        "odoo_employee_id": field(raw, "id").as_i64(),
        "odoo_user_id": relation_id(field(raw, "user_id")),
        "email": clean_str(field(raw, "work_email")),
        "name": clean_str(field(raw, "name")),
        "job_title": clean_str(field(raw, "job_title")),
        "manager_odoo_id": relation_id(field(raw, "parent_id")),
        "department_id": relation_id(department),
        "department_name": relation_name(department),
        "team_id": relation_id(team),
        "team_name": relation_name(team),
        "source": "odoo",
    })
}

/// Map a `crm.lead` record to the canonical opportunity shape.
pub fn map_opportunity(raw: &Value) -> Value {
    let account = field(raw, "partner_id");
    let owner = field(raw, "user_id");
    let stage = field(raw, "stage_id");
    let team = field(raw, "team_id");

    let name = clean_str(field(raw, "name"));
    let stage_name = relation_name(stage);

    json!({
        "id": field(raw, "id").as_i64(),
        "name": if name.is_empty() { "Untitled".to_string() } else { name },
        "partner_id": relation_id(account),
        "partner_name": relation_name(account),
        "salesperson_id": relation_id(owner),
        "salesperson_name": relation_name(owner),
        "stage_id": relation_id(stage),
        "stage_name": if stage_name.is_empty() { "New".to_string() } else { stage_name },
        "team_id": relation_id(team),
        "team_name": relation_name(team),
        "expected_revenue": clean_f64(field(raw, "expected_revenue")),
        "probability": clean_f64(field(raw, "probability")),
        "date_deadline": clean_str(field(raw, "date_deadline")),
        "create_date": clean_str(field(raw, "create_date")),
        "description": clean_str(field(raw, "description")),
        "source": "odoo",
    })
}

/// Map a `res.partner` record to the canonical account shape.
pub fn map_account(raw: &Value) -> Value {
    let country = field(raw, "country_id");
    let state = field(raw, "state_id");
    let parent = field(raw, "parent_id");

    let name = clean_str(field(raw, "name"));
    let country_name = relation_name(country);

    json!({
        "id": field(raw, "id").as_i64(),
        "name": if name.is_empty() { "Unnamed".to_string() } else { name },
        "email": clean_str(field(raw, "email")),
        "phone": clean_str(field(raw, "phone")),
        "street": clean_str(field(raw, "street")),
        "city": clean_str(field(raw, "city")),
        "zip": clean_str(field(raw, "zip")),
        "state_id": relation_id(state),
        "state_name": relation_name(state),
        "country_id": relation_id(country),
        "country_name": if country_name.is_empty() {
            clean_str(field(raw, "country_name"))
        } else {
            country_name
        },
        "is_company": field(raw, "is_company").as_bool().unwrap_or(false),
        "parent_id": relation_id(parent),
        "parent_name": relation_name(parent),
        "source": "odoo",
    })
}

/// Map a `mail.activity` record to the canonical activity shape.
pub fn map_activity(raw: &Value) -> Value {
    let assignee = field(raw, "user_id");
    let activity_type = relation_name(field(raw, "activity_type_id"));

    let summary = clean_str(field(raw, "summary"));
    let note = clean_str(field(raw, "note"));
    let state = clean_str(field(raw, "state"));

    json!({
        "id": field(raw, "id").as_i64(),
        "summary": if summary.is_empty() { note.clone() } else { summary },
        "note": note,
        "activity_type": if activity_type.is_empty() { "task".to_string() } else { activity_type },
        "state": if state.is_empty() { "planned".to_string() } else { state },
        "date_deadline": clean_str(field(raw, "date_deadline")),
        "res_model": clean_str(field(raw, "res_model")),
        "res_id": relation_id(field(raw, "res_id")),
        "user_id": relation_id(assignee),
        "user_name": relation_name(assignee),
        "source": "odoo",
    })
}

/// Map a raw source record to its canonical shape by entity kind.
pub fn map_entity(entity_type: EntityType, raw: &Value) -> Value {
    match entity_type {
        EntityType::User => map_user(raw),
        EntityType::Opportunity => map_opportunity(raw),
        EntityType::Account => map_account(raw),
        EntityType::Activity => map_activity(raw),
    }
}

/// The key holding the source id in a canonical record.
pub fn source_id_of(entity_type: EntityType, canonical: &Value) -> Option<String> {
    let key = match entity_type {
        EntityType::User => "odoo_employee_id",
        _ => "id",
    };
    canonical.get(key).and_then(Value::as_i64).map(|id| id.to_string())
}
