//! Remote document-store collaborator: asynchronous-by-contract reads and
//! writes plus push-based live subscriptions over hierarchical paths.
//!
//! The backing network client is external to this crate; [`MemoryRemote`]
//! stands in for it in tests and dispatches snapshots synchronously.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;

use crate::errors::StoreError;
use crate::ledger::MonthKey;

/// Snapshot callback. Receives the full document, or `None` when the
/// document does not exist; each delivery fully replaces prior state.
pub type SnapshotFn = Rc<dyn Fn(Option<Value>)>;

/// Disposer for a live subscription. The contract is exactly-once release:
/// explicit [`Subscription::dispose`] or the `Drop` fallback, never both.
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Releases the subscription; no callback fires afterwards.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Document store exposing get/set/subscribe by path.
pub trait RemoteStore {
    fn get_document(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Writes a document. With `merge`, top-level fields are merged into the
    /// existing document; without it, the document is fully replaced.
    fn set_document(&self, path: &str, value: Value, merge: bool) -> Result<(), StoreError>;

    /// Establishes a live subscription; the backend pushes every subsequent
    /// write to `on_snapshot` in emission order.
    fn subscribe(&self, path: &str, on_snapshot: SnapshotFn) -> Subscription;
}

/// Path of a per-user dataset document.
pub fn data_path(user_id: &str, dataset: &str) -> String {
    format!("users/{user_id}/data/{dataset}")
}

/// Path of a per-user monthly budget document.
pub fn budget_path(user_id: &str, month: MonthKey) -> String {
    format!("users/{user_id}/budgets/{month}")
}

#[derive(Default)]
struct RemoteInner {
    documents: BTreeMap<String, Value>,
    subscribers: BTreeMap<u64, (String, SnapshotFn)>,
    next_token: u64,
    subscribe_calls: usize,
    dispose_calls: usize,
    fail_writes: bool,
}

/// In-memory [`RemoteStore`] with subscribe/dispose accounting, used by the
/// test suites and as a reference for backend adapters.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Rc<RefCell<RemoteInner>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every write fails with a backend error. Simulates the
    /// fire-and-forget failure path.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    pub fn subscribe_calls(&self) -> usize {
        self.inner.borrow().subscribe_calls
    }

    pub fn dispose_calls(&self) -> usize {
        self.inner.borrow().dispose_calls
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Current document at `path`, if any.
    pub fn document(&self, path: &str) -> Option<Value> {
        self.inner.borrow().documents.get(path).cloned()
    }

    /// Backend-originated update: stores the document and notifies
    /// subscribers, as if another session had written it.
    pub fn push(&self, path: &str, value: Value) {
        self.inner
            .borrow_mut()
            .documents
            .insert(path.to_string(), value);
        self.notify(path);
    }

    fn notify(&self, path: &str) {
        // Snapshot the matching callbacks first so none runs while the
        // store is borrowed; callbacks may read the store again.
        let (snapshot, callbacks): (Option<Value>, Vec<SnapshotFn>) = {
            let inner = self.inner.borrow();
            let snapshot = inner.documents.get(path).cloned();
            let callbacks = inner
                .subscribers
                .values()
                .filter(|(subscribed, _)| subscribed == path)
                .map(|(_, callback)| Rc::clone(callback))
                .collect();
            (snapshot, callbacks)
        };
        for callback in callbacks {
            callback(snapshot.clone());
        }
    }
}

impl RemoteStore for MemoryRemote {
    fn get_document(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.inner.borrow().documents.get(path).cloned())
    }

    fn set_document(&self, path: &str, value: Value, merge: bool) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.fail_writes {
                return Err(StoreError::Backend(format!("write to `{path}` refused")));
            }
            let next = match (merge, inner.documents.get(path)) {
                (true, Some(Value::Object(existing))) => {
                    let Value::Object(incoming) = value else {
                        return Err(StoreError::Backend(format!(
                            "merge write to `{path}` requires an object"
                        )));
                    };
                    let mut merged = existing.clone();
                    merged.extend(incoming);
                    Value::Object(merged)
                }
                _ => value,
            };
            inner.documents.insert(path.to_string(), next);
        }
        self.notify(path);
        Ok(())
    }

    fn subscribe(&self, path: &str, on_snapshot: SnapshotFn) -> Subscription {
        let token = {
            let mut inner = self.inner.borrow_mut();
            let token = inner.next_token;
            inner.next_token += 1;
            inner.subscribe_calls += 1;
            inner
                .subscribers
                .insert(token, (path.to_string(), on_snapshot));
            token
        };
        let inner = Rc::clone(&self.inner);
        Subscription::new(move || {
            let mut inner = inner.borrow_mut();
            inner.subscribers.remove(&token);
            inner.dispose_calls += 1;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_extends_and_replace_overwrites() {
        let remote = MemoryRemote::new();
        let path = budget_path("u1", MonthKey::new(2024, 6).unwrap());
        remote
            .set_document(&path, json!({"budget": 100.0, "categoryBudgets": {}}), true)
            .unwrap();
        remote
            .set_document(&path, json!({"budget": 200.0}), true)
            .unwrap();
        let doc = remote.document(&path).unwrap();
        assert_eq!(doc["budget"], 200.0);
        assert!(doc["categoryBudgets"].is_object());

        remote
            .set_document(&path, json!({"budget": 300.0}), false)
            .unwrap();
        let doc = remote.document(&path).unwrap();
        assert!(doc.get("categoryBudgets").is_none());
    }

    #[test]
    fn subscribers_receive_writes_until_disposed() {
        let remote = MemoryRemote::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = remote.subscribe(
            "users/u1/data/expenses",
            Rc::new(move |snapshot| sink.borrow_mut().push(snapshot)),
        );

        remote
            .set_document("users/u1/data/expenses", json!({"expenses": [1]}), false)
            .unwrap();
        remote
            .set_document("users/u1/data/incomes", json!({"incomes": []}), false)
            .unwrap();
        assert_eq!(seen.borrow().len(), 1, "unrelated paths do not notify");

        sub.dispose();
        remote
            .set_document("users/u1/data/expenses", json!({"expenses": [2]}), false)
            .unwrap();
        assert_eq!(seen.borrow().len(), 1, "no callback after dispose");
        assert_eq!(remote.subscribe_calls(), 1);
        assert_eq!(remote.dispose_calls(), 1);
    }

    #[test]
    fn dropping_a_subscription_releases_exactly_once() {
        let remote = MemoryRemote::new();
        {
            let _sub = remote.subscribe("users/u1/data/expenses", Rc::new(|_| {}));
            assert_eq!(remote.active_subscriptions(), 1);
        }
        assert_eq!(remote.active_subscriptions(), 0);
        assert_eq!(remote.dispose_calls(), 1);
    }

    #[test]
    fn failed_writes_do_not_touch_the_document() {
        let remote = MemoryRemote::new();
        remote
            .set_document("users/u1/data/expenses", json!({"expenses": [1]}), false)
            .unwrap();
        remote.fail_writes(true);
        let err = remote
            .set_document("users/u1/data/expenses", json!({"expenses": [2]}), false)
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(
            remote.document("users/u1/data/expenses").unwrap()["expenses"],
            json!([1])
        );
    }
}
