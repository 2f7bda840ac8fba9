use std::cell::RefCell;
use std::collections::BTreeMap;

use super::LocalStore;

/// In-memory [`LocalStore`] used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("a").is_none());
        store.set("a", "1");
        store.set("b", "2");
        assert_eq!(store.get("a").as_deref(), Some("1"));
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
        store.remove("a");
        assert!(store.get("a").is_none());
        assert_eq!(store.len(), 1);
    }
}
