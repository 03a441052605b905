//! JSON-RPC connector for the remote Odoo source.
//!
//! Authentication is a two-step remote procedure: a credentials exchange
//! against the `common` service yields a numeric uid, and model methods are
//! then invoked through `object.execute_kw` bound to that uid. The
//! connector is stateless across sync jobs and keeps a single pooled HTTP
//! client per instance.
//!
//! Failure semantics: transient network errors and 5xx responses are
//! retried with capped exponential backoff and surface as retryable
//! connection faults when exhausted; a 401/403 or a credentials refusal is
//! an authentication fault, terminal for the current job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use sales_intel_core::config::{OdooConfig, SyncSettings};
use sales_intel_core::error::{Result, SalesIntelError};
use sales_intel_core::models::EntityType;

const SOURCE: &str = "odoo";

const USER_FIELDS: [&str; 7] = [
    "id",
    "name",
    "work_email",
    "job_title",
    "user_id",
    "parent_id",
    "department_id",
];

const OPPORTUNITY_FIELDS: [&str; 12] = [
    "id",
    "name",
    "partner_id",
    "user_id",
    "expected_revenue",
    "probability",
    "stage_id",
    "team_id",
    "date_deadline",
    "description",
    "create_date",
    "write_date",
];

const ACCOUNT_FIELDS: [&str; 13] = [
    "id",
    "name",
    "email",
    "phone",
    "street",
    "city",
    "zip",
    "state_id",
    "country_id",
    "is_company",
    "parent_id",
    "create_date",
    "write_date",
];

const ACTIVITY_FIELDS: [&str; 9] = [
    "id",
    "summary",
    "note",
    "activity_type_id",
    "state",
    "date_deadline",
    "res_model",
    "res_id",
    "user_id",
];

/// The seam the sync handler talks through. Production uses
/// [`OdooConnector`]; tests substitute an in-memory fake.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Fetch every record of one entity kind, streaming page by page
    /// internally and returning raw source records.
    async fn fetch_entities(&self, entity_type: EntityType) -> Result<Vec<Value>>;
}

/// JSON-RPC connector for Odoo 16+.
pub struct OdooConnector {
    base_url: String,
    database: String,
    username: String,
    api_key: String,
    client: reqwest::Client,
    uid: RwLock<Option<i64>>,
    request_id: AtomicI64,
    page_size: u32,
    max_page_retries: u32,
}

impl OdooConnector {
    pub fn new(config: OdooConfig, settings: &SyncSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| SalesIntelError::connection(SOURCE, e.to_string()))?;

        Ok(Self {
            base_url: Self::normalize_base_url(&config.base_url),
            database: config.database,
            username: config.username,
            api_key: config.api_key,
            client,
            uid: RwLock::new(None),
            request_id: AtomicI64::new(1),
            page_size: settings.page_size,
            max_page_retries: settings.max_page_retries,
        })
    }

    /// Strip well-known path suffixes so `https://x.odoo.com/odoo` and the
    /// bare instance URL behave identically.
    pub fn normalize_base_url(url: &str) -> String {
        let mut url = url.trim_end_matches('/').to_string();
        for suffix in ["/odoo", "/web", "/jsonrpc", "/xmlrpc"] {
            if url.to_lowercase().ends_with(suffix) {
                url.truncate(url.len() - suffix.len());
            }
        }
        url
    }

    fn endpoint(&self) -> String {
        format!("{}/jsonrpc", self.base_url)
    }

    fn next_request_id(&self) -> i64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let millis = 250u64.saturating_mul(1 << attempt.min(5));
        Duration::from_millis(millis.min(5_000))
    }

    /// One JSON-RPC call, returning the full response body. Retries
    /// transient network errors and 5xx responses with capped exponential
    /// backoff.
    async fn call_raw(&self, params: Value) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": params,
            "id": self.next_request_id(),
        });

        let mut attempt = 0;
        loop {
            let response = self.client.post(self.endpoint()).json(&payload).send().await;

            let error_message = match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| {
                            SalesIntelError::connection(
                                SOURCE,
                                format!("invalid JSON-RPC response: {e}"),
                            )
                        });
                    }
                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        return Err(SalesIntelError::Authentication {
                            remote: SOURCE.to_string(),
                            message: format!("HTTP {status}"),
                        });
                    }
                    if !status.is_server_error() {
                        return Err(SalesIntelError::connection(
                            SOURCE,
                            format!("HTTP {status}"),
                        ));
                    }
                    format!("HTTP {status}")
                }
                Err(e) => e.to_string(),
            };

            if attempt >= self.max_page_retries {
                return Err(SalesIntelError::connection(
                    SOURCE,
                    format!("{error_message} after {attempt} retries"),
                ));
            }
            let delay = Self::backoff_delay(attempt);
            tracing::warn!(%error_message, attempt, ?delay, "retrying Odoo call");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Authenticate and cache the numeric uid.
    ///
    /// A `false` result means invalid credentials, distinct from an
    /// explicit JSON-RPC `error` object.
    pub async fn authenticate(&self) -> Result<i64> {
        let body = self
            .call_raw(json!({
                "service": "common",
                "method": "authenticate",
                "args": [self.database, self.username, self.api_key, {}],
            }))
            .await?;

        if let Some(error) = body.get("error") {
            let message = error
                .pointer("/data/message")
                .or_else(|| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(SalesIntelError::Authentication {
                remote: SOURCE.to_string(),
                message,
            });
        }

        match body.get("result").and_then(Value::as_i64) {
            Some(uid) => {
                tracing::info!(uid, "Odoo authentication successful");
                *self.uid.write().await = Some(uid);
                Ok(uid)
            }
            None => Err(SalesIntelError::Authentication {
                remote: SOURCE.to_string(),
                message: "invalid credentials".to_string(),
            }),
        }
    }

    async fn ensure_uid(&self) -> Result<i64> {
        if let Some(uid) = *self.uid.read().await {
            return Ok(uid);
        }
        self.authenticate().await
    }

    /// Execute a method on an Odoo model.
    pub async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value> {
        let uid = self.ensure_uid().await?;
        let body = self
            .call_raw(json!({
                "service": "object",
                "method": "execute_kw",
                "args": [self.database, uid, self.api_key, model, method, args, kwargs],
            }))
            .await?;

        if let Some(error) = body.get("error") {
            let message = error
                .pointer("/data/message")
                .or_else(|| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(SalesIntelError::connection(
                SOURCE,
                format!("{model}.{method}: {message}"),
            ));
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Search and read one page of records.
    pub async fn search_read(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        offset: u32,
        limit: u32,
        order: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut kwargs = json!({
            "fields": fields,
            "offset": offset,
            "limit": limit,
        });
        if let Some(order) = order {
            kwargs["order"] = json!(order);
        }

        let result = self
            .execute_kw(model, "search_read", json!([domain]), kwargs)
            .await?;

        match result {
            Value::Array(records) => Ok(records),
            other => Err(SalesIntelError::connection(
                SOURCE,
                format!("search_read on {model} returned non-array: {other}"),
            )),
        }
    }

    /// Fetch every record for a model, paging until exhausted.
    async fn fetch_all(
        &self,
        model: &str,
        domain: Value,
        fields: &[&str],
        order: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        let mut offset = 0u32;
        loop {
            let page = self
                .search_read(model, domain.clone(), fields, offset, self.page_size, order)
                .await?;
            let page_len = page.len() as u32;
            records.extend(page);
            if page_len < self.page_size {
                break;
            }
            offset += page_len;
        }
        tracing::debug!(model, count = records.len(), "fetched records");
        Ok(records)
    }

    fn since_domain(modified_since: Option<DateTime<Utc>>) -> Value {
        match modified_since {
            Some(ts) => json!([["write_date", ">=", ts.format("%Y-%m-%d %H:%M:%S").to_string()]]),
            None => json!([]),
        }
    }

    pub async fn fetch_users(&self, modified_since: Option<DateTime<Utc>>) -> Result<Vec<Value>> {
        // sale_team_id only exists on installations with the sales module,
        // so it is requested separately from the baseline employee fields.
        let mut fields: Vec<&str> = USER_FIELDS.to_vec();
        fields.push("sale_team_id");
        self.fetch_all(
            "hr.employee",
            Self::since_domain(modified_since),
            &fields,
            Some("id asc"),
        )
        .await
    }

    pub async fn fetch_opportunities(
        &self,
        modified_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>> {
        self.fetch_all(
            "crm.lead",
            Self::since_domain(modified_since),
            &OPPORTUNITY_FIELDS,
            Some("id asc"),
        )
        .await
    }

    pub async fn fetch_accounts(&self, modified_since: Option<DateTime<Utc>>) -> Result<Vec<Value>> {
        self.fetch_all(
            "res.partner",
            Self::since_domain(modified_since),
            &ACCOUNT_FIELDS,
            Some("id asc"),
        )
        .await
    }

    pub async fn fetch_activities(&self) -> Result<Vec<Value>> {
        self.fetch_all("mail.activity", json!([]), &ACTIVITY_FIELDS, Some("id asc"))
            .await
    }

    /// Connection test via `common.version`; returns server info.
    pub async fn test_connection(&self) -> Result<Value> {
        let body = self
            .call_raw(json!({
                "service": "common",
                "method": "version",
                "args": [],
            }))
            .await?;
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl SourceConnector for OdooConnector {
    async fn fetch_entities(&self, entity_type: EntityType) -> Result<Vec<Value>> {
        match entity_type {
            EntityType::User => self.fetch_users(None).await,
            EntityType::Opportunity => self.fetch_opportunities(None).await,
            EntityType::Account => self.fetch_accounts(None).await,
            EntityType::Activity => self.fetch_activities().await,
        }
    }
}
