//! The `user_profiles` materialized view: denormalized users with a
//! precomputed reporting hierarchy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use sales_intel_core::error::Result;

/// Minimal identity snapshot embedded in manager/subordinate slots.
///
/// The authoritative fields live once on the owning profile; snapshots are
/// refreshed by the user-profile projection's denormalization step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    pub employee_id: Option<i64>,
    pub name: String,
    pub email: String,
}

/// Linkage into the remote source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OdooLink {
    pub user_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub team_id: Option<i64>,
    pub team_name: Option<String>,
    pub department_id: Option<i64>,
    pub department_name: Option<String>,
    pub manager_employee_id: Option<i64>,
}

/// Precomputed reporting hierarchy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hierarchy {
    pub manager: Option<UserIdentity>,
    pub subordinates: Vec<UserIdentity>,
    pub reports_count: usize,
    pub is_manager: bool,
}

impl Hierarchy {
    pub fn with_subordinates(manager: Option<UserIdentity>, subordinates: Vec<UserIdentity>) -> Self {
        let reports_count = subordinates.len();
        Self {
            manager,
            is_manager: reports_count > 0,
            reports_count,
            subordinates,
        }
    }
}

/// Denormalized user profile document.
///
/// `id` is the stable UUID generated on first insert for an email; it is
/// the canonical identity that opportunity views and access matrices
/// reference, and it never changes across subsequent syncs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub job_title: Option<String>,
    pub role: Option<String>,
    pub odoo: OdooLink,
    pub hierarchy: Hierarchy,
    pub is_super_admin: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub last_sync: Option<DateTime<Utc>>,
    pub event_version: i64,
    pub created_at: DateTime<Utc>,
    /// Document version, incremented on every mutation.
    pub version: i64,
}

impl UserProfile {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            user_id: self.id.clone(),
            employee_id: self.odoo.employee_id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Repository for the `user_profiles` collection.
#[async_trait]
pub trait UserProfileStore: Send + Sync {
    async fn by_id(&self, id: &str) -> Result<Option<UserProfile>>;
    /// Lookup by email; the key is the lower-cased address.
    async fn by_email(&self, email: &str) -> Result<Option<UserProfile>>;
    async fn by_odoo_user_id(&self, odoo_user_id: i64) -> Result<Option<UserProfile>>;
    async fn by_odoo_employee_id(&self, employee_id: i64) -> Result<Option<UserProfile>>;
    /// All profiles whose `odoo.manager_employee_id` equals the given id.
    async fn subordinates_of(&self, manager_employee_id: i64) -> Result<Vec<UserProfile>>;
    async fn super_admins(&self) -> Result<Vec<UserProfile>>;
    /// Insert or replace, keyed by the profile `id`.
    async fn upsert(&self, profile: UserProfile) -> Result<()>;
    /// Refresh the embedded manager snapshot on every profile reporting to
    /// the given manager. Returns the number of profiles touched.
    async fn set_manager_snapshot(
        &self,
        manager_employee_id: i64,
        manager: UserIdentity,
    ) -> Result<u64>;
    async fn count(&self) -> Result<u64>;
    async fn truncate(&self) -> Result<()>;
}

/// In-memory driver for the profile collection.
pub struct InMemoryUserProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryUserProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryUserProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserProfileStore for InMemoryUserProfileStore {
    async fn by_id(&self, id: &str) -> Result<Option<UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(id).cloned())
    }

    async fn by_email(&self, email: &str) -> Result<Option<UserProfile>> {
        let needle = email.to_lowercase();
        let profiles = self.profiles.read().await;
        Ok(profiles.values().find(|p| p.email == needle).cloned())
    }

    async fn by_odoo_user_id(&self, odoo_user_id: i64) -> Result<Option<UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles
            .values()
            .find(|p| p.odoo.user_id == Some(odoo_user_id))
            .cloned())
    }

    async fn by_odoo_employee_id(&self, employee_id: i64) -> Result<Option<UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles
            .values()
            .find(|p| p.odoo.employee_id == Some(employee_id))
            .cloned())
    }

    async fn subordinates_of(&self, manager_employee_id: i64) -> Result<Vec<UserProfile>> {
        let profiles = self.profiles.read().await;
        let mut subs: Vec<UserProfile> = profiles
            .values()
            .filter(|p| p.odoo.manager_employee_id == Some(manager_employee_id))
            .cloned()
            .collect();
        subs.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(subs)
    }

    async fn super_admins(&self) -> Result<Vec<UserProfile>> {
        let profiles = self.profiles.read().await;
        let mut admins: Vec<UserProfile> = profiles
            .values()
            .filter(|p| p.is_super_admin)
            .cloned()
            .collect();
        admins.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(admins)
    }

    async fn upsert(&self, profile: UserProfile) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn set_manager_snapshot(
        &self,
        manager_employee_id: i64,
        manager: UserIdentity,
    ) -> Result<u64> {
        let mut profiles = self.profiles.write().await;
        let mut touched = 0;
        for profile in profiles
            .values_mut()
            .filter(|p| p.odoo.manager_employee_id == Some(manager_employee_id))
        {
            profile.hierarchy.manager = Some(manager.clone());
            touched += 1;
        }
        Ok(touched)
    }

    async fn count(&self) -> Result<u64> {
        let profiles = self.profiles.read().await;
        Ok(profiles.len() as u64)
    }

    async fn truncate(&self) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        profiles.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, email: &str, employee_id: i64, manager: Option<i64>) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            email: email.to_string(),
            name: email.split('@').next().unwrap_or_default().to_string(),
            job_title: None,
            role: None,
            odoo: OdooLink {
                user_id: Some(employee_id * 10),
                employee_id: Some(employee_id),
                manager_employee_id: manager,
                ..OdooLink::default()
            },
            hierarchy: Hierarchy::default(),
            is_super_admin: false,
            last_login: None,
            last_sync: None,
            event_version: 1,
            created_at: Utc::now(),
            version: 1,
        }
    }

    #[tokio::test]
    async fn lookups_by_each_key() {
        let store = InMemoryUserProfileStore::new();
        store.upsert(profile("p1", "alice@corp.io", 10, None)).await.unwrap();

        assert!(store.by_id("p1").await.unwrap().is_some());
        assert!(store.by_email("ALICE@CORP.IO").await.unwrap().is_some());
        assert!(store.by_odoo_user_id(100).await.unwrap().is_some());
        assert!(store.by_odoo_employee_id(10).await.unwrap().is_some());
        assert!(store.by_odoo_employee_id(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subordinates_and_manager_snapshot_refresh() {
        let store = InMemoryUserProfileStore::new();
        store.upsert(profile("p1", "alice@corp.io", 10, None)).await.unwrap();
        store.upsert(profile("p2", "bob@corp.io", 20, Some(10))).await.unwrap();
        store.upsert(profile("p3", "carol@corp.io", 30, Some(10))).await.unwrap();

        let subs = store.subordinates_of(10).await.unwrap();
        assert_eq!(subs.len(), 2);

        let touched = store
            .set_manager_snapshot(
                10,
                UserIdentity {
                    user_id: "p1".into(),
                    employee_id: Some(10),
                    name: "Alice".into(),
                    email: "alice@corp.io".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(touched, 2);

        let bob = store.by_id("p2").await.unwrap().unwrap();
        assert_eq!(bob.hierarchy.manager.unwrap().user_id, "p1");
    }
}
