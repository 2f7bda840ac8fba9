use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

use tracing::{error, warn};

use super::LocalStore;
use crate::errors::StoreError;

const DEFAULT_DIR_NAME: &str = ".presupuesto_core";
const STORE_FILE: &str = "store.json";
const TMP_EXTENSION: &str = "tmp";

/// [`LocalStore`] backed by a single JSON file holding the whole key/value
/// namespace. Every mutation is staged to a temporary file and renamed into
/// place so a crash never leaves a half-written store behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: RefCell<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Opens (or creates) the store file at the given path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entries = if path.exists() {
            let data = fs::read_to_string(&path)?;
            match serde_json::from_str(&data) {
                Ok(entries) => entries,
                Err(err) => {
                    // Malformed persisted state is recovered, not fatal.
                    warn!(path = %path.display(), %err, "discarding malformed store file");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: RefCell::new(entries),
        })
    }

    /// Opens the store at the default location, `~/.presupuesto_core/store.json`,
    /// overridable through `PRESUPUESTO_CORE_HOME`.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(default_base_dir().join(STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) {
        if let Err(err) = self.try_persist() {
            error!(path = %self.path.display(), %err, "failed to persist local store");
        }
    }

    fn try_persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&*self.entries.borrow())?;
        let tmp = self.path.with_extension(TMP_EXTENSION);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Application data directory, defaulting to `~/.presupuesto_core`.
pub fn default_base_dir() -> PathBuf {
    if let Some(custom) = env::var_os("PRESUPUESTO_CORE_HOME") {
        return PathBuf::from(custom);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR_NAME)
}

impl LocalStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.persist();
    }

    fn remove(&self, key: &str) {
        let removed = self.entries.borrow_mut().remove(key).is_some();
        if removed {
            self.persist();
        }
    }

    fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }
}
