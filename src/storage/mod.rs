//! Durable persistence collaborators: the synchronous local key/value store
//! and the asynchronous, subscribable remote document store.

pub mod json_backend;
pub mod memory;
pub mod remote;

pub use json_backend::JsonFileStore;
pub use memory::MemoryStore;
pub use remote::{budget_path, data_path, MemoryRemote, RemoteStore, SnapshotFn, Subscription};

/// Synchronous key/value persistence over string values. Structured data is
/// serialized to and from JSON text by the caller.
///
/// The store is used from a single-threaded, event-driven context;
/// implementations use interior mutability and are not required to be
/// thread-safe. Writes are infallible from the caller's perspective,
/// mirroring browser local storage: failures are logged, not surfaced.
pub trait LocalStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn keys(&self) -> Vec<String>;
}
