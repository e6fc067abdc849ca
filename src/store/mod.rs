// ABOUTME: In-memory cache of the most recently observed dependency values
// ABOUTME: Tracks which ids have ever received data, distinct from the value being null

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Read-only view of the cache handed to template helpers.
///
/// `None` means the id has never received data; `Some(Value::Null)` means the
/// last fetch completed and the result was empty.
pub trait Recaller: Send + Sync {
    fn recall(&self, id: &str) -> Option<Value>;
}

#[derive(Default)]
struct StoreData {
    data: HashMap<String, Value>,
    received: HashSet<String>,
}

/// Keyed container of last-observed dependency values.
///
/// All operations are serialized under a single read/write lock; readers
/// never block other readers. Values are stored opaquely and never
/// interpreted.
#[derive(Default)]
pub struct Store {
    inner: RwLock<StoreData>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the value and marks the id as received.
    pub fn save(&self, id: &str, value: Value) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.data.insert(id.to_string(), value);
        inner.received.insert(id.to_string());
    }

    /// Removes the entry and its received flag.
    pub fn delete(&self, id: &str) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.data.remove(id);
        inner.received.remove(id);
    }

    /// Empties the cache entirely.
    pub fn reset(&self) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.data.clear();
        inner.received.clear();
    }

    /// Number of ids currently holding data.
    pub fn len(&self) -> usize {
        self.inner.read().expect("store lock poisoned").data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Recaller for Store {
    fn recall(&self, id: &str) -> Option<Value> {
        let inner = self.inner.read().expect("store lock poisoned");
        if !inner.received.contains(id) {
            return None;
        }
        Some(inner.data.get(id).cloned().unwrap_or(Value::Null))
    }
}
