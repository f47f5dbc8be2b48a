//! Runtime Environment
//!
//! A small key/value store shared by the scheme and all of its widgets
//! (working directory, base paths, and similar). Widgets get a read-only
//! [`EnvView`] that reflects later changes. The store is guarded by a
//! `parking_lot::RwLock` so background workers holding a view may read it.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value as Json;

type Store = Arc<RwLock<IndexMap<String, Json>>>;

/// The writable runtime environment, owned by the scheme.
#[derive(Debug, Clone, Default)]
pub struct Env {
    inner: Store,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, returning the previous value.
    pub fn set(&self, key: &str, value: Json) -> Option<Json> {
        self.inner.write().insert(key.to_string(), value)
    }

    /// Remove `key`, returning the previous value.
    pub fn remove(&self, key: &str) -> Option<Json> {
        self.inner.write().shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<Json> {
        self.inner.read().get(key).cloned()
    }

    /// A read-only view that follows later changes.
    pub fn view(&self) -> EnvView {
        EnvView {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only view of an [`Env`].
#[derive(Debug, Clone)]
pub struct EnvView {
    inner: Store,
}

impl EnvView {
    pub fn get(&self, key: &str) -> Option<Json> {
        self.inner.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Copy of all entries, in insertion order.
    pub fn snapshot(&self) -> Vec<(String, Json)> {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
