//! Versioned raw record storage with checksum-based change detection.
//!
//! Every fetched source record is kept forever: a new payload for a known
//! `(entity_type, source_id)` supersedes the previous version by flipping
//! its `is_latest` flag, never by deleting it. An unchanged payload (same
//! checksum) is a no-op, which is what makes a full resync idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use sales_intel_core::error::Result;
use sales_intel_core::models::EntityType;

/// Canonical JSON rendering: object keys sorted lexicographically, no
/// whitespace. Checksums are computed over this form so that key order in
/// the wire payload cannot produce phantom changes.
pub fn canonical_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(key).unwrap_or_default());
                    out.push(':');
                    write(&map[*key], out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

/// Hex SHA-256 of the canonical JSON form of a payload.
pub fn payload_checksum(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(payload).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One stored version of a fetched source record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub source_id: String,
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
    pub sync_job_id: String,
    pub is_latest: bool,
    pub checksum: String,
}

/// Outcome of a raw upsert.
#[derive(Debug, Clone)]
pub struct RawUpsert {
    pub stored: bool,
    /// False when the payload checksum matched the current latest version.
    pub changed: bool,
    pub record: RawRecord,
}

/// Repository for raw source records.
#[async_trait]
pub trait RawStore: Send + Sync {
    /// Store a payload version for `(entity_type, source_id)`.
    ///
    /// If the checksum matches the current latest version, returns
    /// `changed = false` and the existing record. Otherwise the current
    /// latest (if any) is superseded and a fresh version inserted, in one
    /// serialized step per key.
    async fn upsert(
        &self,
        entity_type: EntityType,
        source_id: &str,
        payload: Value,
        sync_job_id: &str,
    ) -> Result<RawUpsert>;

    /// The current latest record for a key.
    async fn latest(&self, entity_type: EntityType, source_id: &str) -> Result<Option<RawRecord>>;

    /// How many versions exist for a key.
    async fn version_count(&self, entity_type: EntityType, source_id: &str) -> Result<usize>;

    /// Total records, optionally filtered by entity type.
    async fn count(&self, entity_type: Option<EntityType>) -> Result<u64>;
}

/// In-memory raw store; the write lock serializes upserts per store, which
/// subsumes the per-key serialization the contract requires.
pub struct InMemoryRawStore {
    records: RwLock<Vec<RawRecord>>,
}

impl InMemoryRawStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryRawStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RawStore for InMemoryRawStore {
    async fn upsert(
        &self,
        entity_type: EntityType,
        source_id: &str,
        payload: Value,
        sync_job_id: &str,
    ) -> Result<RawUpsert> {
        let checksum = payload_checksum(&payload);
        let mut records = self.records.write().await;

        if let Some(existing) = records
            .iter()
            .find(|r| r.entity_type == entity_type && r.source_id == source_id && r.is_latest)
        {
            if existing.checksum == checksum {
                return Ok(RawUpsert {
                    stored: true,
                    changed: false,
                    record: existing.clone(),
                });
            }
        }

        for record in records
            .iter_mut()
            .filter(|r| r.entity_type == entity_type && r.source_id == source_id && r.is_latest)
        {
            record.is_latest = false;
        }

        let record = RawRecord {
            id: Uuid::new_v4(),
            entity_type,
            source_id: source_id.to_string(),
            payload,
            fetched_at: Utc::now(),
            sync_job_id: sync_job_id.to_string(),
            is_latest: true,
            checksum,
        };
        records.push(record.clone());

        Ok(RawUpsert {
            stored: true,
            changed: true,
            record,
        })
    }

    async fn latest(&self, entity_type: EntityType, source_id: &str) -> Result<Option<RawRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| r.entity_type == entity_type && r.source_id == source_id && r.is_latest)
            .cloned())
    }

    async fn version_count(&self, entity_type: EntityType, source_id: &str) -> Result<usize> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.entity_type == entity_type && r.source_id == source_id)
            .count())
    }

    async fn count(&self, entity_type: Option<EntityType>) -> Result<u64> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| entity_type.map_or(true, |t| r.entity_type == t))
            .count() as u64)
    }
}
