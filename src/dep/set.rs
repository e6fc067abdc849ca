// ABOUTME: Insertion-ordered set of dependencies keyed by id
// ABOUTME: Backs the watcher registry and the per-execution used/missing sets

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use super::Dependency;

/// An ordered, set-semantic container of dependencies keyed by id.
///
/// Iteration follows insertion order. Adding a dependency whose id is already
/// present is a no-op.
#[derive(Clone, Default)]
pub struct DepSet {
    deps: IndexMap<String, Arc<dyn Dependency>>,
}

impl DepSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the dependency was newly added.
    pub fn add(&mut self, dep: Arc<dyn Dependency>) -> bool {
        let id = dep.id();
        if self.deps.contains_key(&id) {
            return false;
        }
        self.deps.insert(id, dep);
        true
    }

    /// Removes by id, preserving the order of the remaining entries.
    pub fn remove(&mut self, id: &str) -> bool {
        self.deps.shift_remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.deps.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Dependency>> {
        self.deps.get(id)
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    pub fn clear(&mut self) {
        self.deps.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Dependency>> {
        self.deps.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.deps.keys().map(|k| k.as_str())
    }
}

impl fmt::Debug for DepSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.deps.keys()).finish()
    }
}
