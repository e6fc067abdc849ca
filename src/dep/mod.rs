// ABOUTME: Dependency abstraction for externally-watched data sources
// ABOUTME: Defines the fetch/identify/stop contract, the client bundle, and the stop signal

pub mod env;
pub mod error;
pub mod fake;
pub mod file;
pub mod set;
pub mod token;

pub use error::{DependencyError, Result};
pub use set::DepSet;

use async_trait::async_trait;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Metadata returned by every successful fetch.
///
/// `last_index` is an opaque monotone token handed back on the next fetch to
/// implement blocking-until-change semantics on upstreams that support it.
/// `last_contact` is used to compute staleness of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
    pub last_index: u64,
    pub last_contact: Duration,
}

/// A successful fetch result: the opaque value plus its metadata.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub value: Value,
    pub metadata: ResponseMetadata,
}

impl Fetched {
    pub fn new(value: Value, last_index: u64) -> Self {
        Self {
            value,
            metadata: ResponseMetadata {
                last_index,
                last_contact: Duration::ZERO,
            },
        }
    }
}

/// An external data source that can be identified, fetched and stopped.
///
/// `fetch` may block for an extended period (long poll). Implementations must
/// return `DependencyError::Stopped` once `stop` has been signaled, including
/// for a fetch already in flight. The `Display` impl is the dependency's
/// identity: two dependencies with equal ids are interchangeable everywhere
/// in the cache and watcher.
#[async_trait]
pub trait Dependency: fmt::Display + Send + Sync {
    async fn fetch(&self, clients: &ClientSet, last_index: u64) -> Result<Fetched>;

    fn stop(&self);

    fn id(&self) -> String {
        self.to_string()
    }
}

/// Shared bundle of upstream API clients, passed through to every fetch.
///
/// The core never inspects it; dependency implementations look up the typed
/// client they need. Cloning is cheap and all clones share the same registry.
#[derive(Clone, Default)]
pub struct ClientSet {
    clients: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl ClientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, replacing any previous client of the same type.
    pub fn add<T: Any + Send + Sync>(&self, client: T) {
        self.clients
            .write()
            .expect("client set lock poisoned")
            .insert(TypeId::of::<T>(), Arc::new(client));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.clients
            .read()
            .expect("client set lock poisoned")
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|c| c.downcast::<T>().ok())
    }
}

impl fmt::Debug for ClientSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.clients.read().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("ClientSet").field("clients", &len).finish()
    }
}

/// Idempotent stop signal shared between a dependency and its in-flight fetch.
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `stop` has been called. Safe to await repeatedly.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        // The sender lives as long as self, so changed() only fails after stop.
        let _ = rx.changed().await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
