//! Local profile lifecycle: the persisted registry, the active-profile
//! marker, and cascading deletion driven by an explicit owned-key index.
//!
//! The index replaces substring matching over the key namespace: every
//! derived key written for a profile is recorded under that profile, so
//! deletion removes exactly the keys the profile owns and nothing else.

use std::collections::BTreeSet;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::errors::{CoreError, CoreResult};
use crate::keys::{self, storage_key};
use crate::storage::LocalStore;

const MIN_NAME_LEN: usize = 2;
const MAX_NAME_LEN: usize = 30;

/// An isolated namespace of financial data, local to this device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted registry of local profiles with the active-profile marker.
pub struct ProfileRegistry {
    store: Rc<dyn LocalStore>,
}

impl ProfileRegistry {
    pub fn new(store: Rc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// All registered profiles; a malformed registry reads as empty.
    pub fn list(&self) -> Vec<Profile> {
        let Some(raw) = self.store.get(keys::PROFILES) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(profiles) => profiles,
            Err(err) => {
                warn!(%err, "discarding malformed profile registry");
                Vec::new()
            }
        }
    }

    /// Creates a profile. An empty (trimmed) name is a silent no-op per the
    /// registry contract; other invalid names are validation errors.
    pub fn create(&self, name: &str) -> CoreResult<Option<Profile>> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if trimmed.chars().count() < MIN_NAME_LEN {
            return Err(CoreError::Validation(
                "profile name must have at least 2 characters".into(),
            ));
        }
        if trimmed.chars().count() > MAX_NAME_LEN {
            return Err(CoreError::Validation(
                "profile name must have at most 30 characters".into(),
            ));
        }
        let mut profiles = self.list();
        let duplicate = profiles
            .iter()
            .any(|profile| profile.name.trim().eq_ignore_ascii_case(trimmed));
        if duplicate {
            return Err(CoreError::Validation(format!(
                "a profile named `{trimmed}` already exists"
            )));
        }

        let profile = Profile {
            id: Uuid::new_v4().simple().to_string(),
            name: trimmed.to_string(),
            created_at: Utc::now(),
        };
        profiles.push(profile.clone());
        self.save(&profiles)?;
        Ok(Some(profile))
    }

    /// Deletes a profile and every key it owns. Data deletion completes
    /// before the registry is updated so the registry never references a
    /// profile whose data is half-removed.
    pub fn delete(&self, profile_id: &str) -> CoreResult<()> {
        let mut profiles = self.list();
        if !profiles.iter().any(|profile| profile.id == profile_id) {
            return Err(CoreError::Validation(format!(
                "unknown profile `{profile_id}`"
            )));
        }

        OwnedKeyIndex::remove_all(self.store.as_ref(), profile_id);
        profiles.retain(|profile| profile.id != profile_id);
        self.save(&profiles)?;

        if self.active().as_deref() == Some(profile_id) {
            self.clear_active();
        }
        Ok(())
    }

    /// Marks a registered profile as the active one.
    pub fn select(&self, profile_id: &str) -> CoreResult<()> {
        if !self.list().iter().any(|profile| profile.id == profile_id) {
            return Err(CoreError::Validation(format!(
                "unknown profile `{profile_id}`"
            )));
        }
        self.store.set(keys::ACTIVE_PROFILE, profile_id);
        Ok(())
    }

    /// Id of the active profile recorded in durable storage, if any.
    pub fn active(&self) -> Option<String> {
        self.store.get(keys::ACTIVE_PROFILE)
    }

    pub fn clear_active(&self) {
        self.store.remove(keys::ACTIVE_PROFILE);
    }

    fn save(&self, profiles: &[Profile]) -> CoreResult<()> {
        let json = serde_json::to_string(profiles)
            .map_err(crate::errors::StoreError::from)?;
        self.store.set(keys::PROFILES, &json);
        Ok(())
    }
}

/// Explicit index of the derived keys each profile owns.
pub struct OwnedKeyIndex;

impl OwnedKeyIndex {
    fn index_key(profile_id: &str) -> String {
        storage_key(keys::OWNED_KEYS, Some(profile_id), None)
    }

    /// Records a derived key as owned by the profile. Idempotent.
    pub fn record(store: &dyn LocalStore, profile_id: &str, key: &str) {
        let mut owned = Self::keys_for(store, profile_id);
        if owned.insert(key.to_string()) {
            match serde_json::to_string(&owned) {
                Ok(json) => store.set(&Self::index_key(profile_id), &json),
                Err(err) => warn!(%err, profile_id, "failed to serialize owned-key index"),
            }
        }
    }

    /// Keys currently recorded for the profile.
    pub fn keys_for(store: &dyn LocalStore, profile_id: &str) -> BTreeSet<String> {
        store
            .get(&Self::index_key(profile_id))
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(keys) => Some(keys),
                Err(err) => {
                    warn!(%err, profile_id, "discarding malformed owned-key index");
                    None
                }
            })
            .unwrap_or_default()
    }

    /// Removes every owned key, then the index entry itself.
    pub fn remove_all(store: &dyn LocalStore, profile_id: &str) {
        for key in Self::keys_for(store, profile_id) {
            store.remove(&key);
        }
        store.remove(&Self::index_key(profile_id));
    }
}
