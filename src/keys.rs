//! Storage-key derivation for the local key/value namespace.
//!
//! Keys are composed from a logical dataset name, an optional profile id, and
//! an optional month key, joined by a reserved separator. The separator is
//! forbidden inside logical names and generated ids, so two distinct
//! `(name, profile, month)` triples never collide.

use crate::ledger::MonthKey;

/// Reserved separator between key parts. Must not appear in logical names,
/// profile ids, or user ids.
pub const SEPARATOR: &str = "::";

pub const EXPENSES: &str = "expenses";
pub const INCOMES: &str = "incomes";
pub const CATEGORIES: &str = "categories";
pub const CURRENCY: &str = "currency";
pub const BUDGET: &str = "budget";

/// Global registry of profiles.
pub const PROFILES: &str = "profiles";
/// Global marker holding the id of the last selected local profile.
pub const ACTIVE_PROFILE: &str = "active-profile";
/// Per-profile index of every derived key written for that profile.
pub const OWNED_KEYS: &str = "owned-keys";

/// Derives the storage key for a logical dataset, omitting absent parts.
///
/// Three tiers: `{name}` for global data, `{name}::{profile}` for per-profile
/// data, and `{name}::{profile}::{YYYY-MM}` for per-profile-per-month data.
pub fn storage_key(name: &str, profile: Option<&str>, month: Option<MonthKey>) -> String {
    debug_assert!(!name.contains(SEPARATOR));
    debug_assert!(profile.map_or(true, |id| !id.contains(SEPARATOR)));

    let mut key = String::from(name);
    if let Some(profile) = profile {
        key.push_str(SEPARATOR);
        key.push_str(profile);
    }
    if let Some(month) = month {
        key.push_str(SEPARATOR);
        key.push_str(&month.to_string());
    }
    key
}
