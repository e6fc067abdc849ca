// ABOUTME: Registry of active views multiplexing their updates into the cache
// ABOUTME: Exposes the wait primitive the template engine blocks on between renders

pub mod error;

pub use error::{Result, WatcherError};

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dep::token::TokenRenewQuery;
use crate::dep::{ClientSet, DepSet, Dependency, DependencyError};
use crate::store::{Recaller, Store};
use crate::view::{RetryConfig, View};

/// Updates shared by all views are funneled through one bounded channel; a
/// full channel blocks the producing views, which bounds un-applied change.
const DATA_CHANNEL_SIZE: usize = 64;
const ERR_CHANNEL_SIZE: usize = 8;

/// Input for constructing a watcher.
pub struct WatcherInput {
    pub clients: ClientSet,
    pub cache: Arc<Store>,
    pub retry: RetryConfig,
}

impl Default for WatcherInput {
    fn default() -> Self {
        Self {
            clients: ClientSet::new(),
            cache: Arc::new(Store::new()),
            retry: RetryConfig::default(),
        }
    }
}

struct ViewEntry {
    view: Arc<View>,
    task: JoinHandle<()>,
}

struct WatcherInner {
    clients: ClientSet,
    store: Arc<Store>,
    views: Mutex<IndexMap<String, ViewEntry>>,
    data_tx: mpsc::Sender<Arc<View>>,
    data_rx: AsyncMutex<mpsc::Receiver<Arc<View>>>,
    err_tx: mpsc::Sender<DependencyError>,
    err_rx: AsyncMutex<mpsc::Receiver<DependencyError>>,
    changed: Mutex<DepSet>,
    // Incremented when a waiter enters wait; lets tests and stop coordination
    // observe that someone is blocked.
    waiting_tx: watch::Sender<u64>,
    stop_notify: Notify,
    stopped: AtomicBool,
    retry: RetryConfig,
    token_id: Mutex<Option<String>>,
}

/// Owns the store and one view per watched dependency. Cloning produces a
/// second handle onto the same watcher.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

impl Watcher {
    pub fn new(input: WatcherInput) -> Self {
        let (data_tx, data_rx) = mpsc::channel(DATA_CHANNEL_SIZE);
        let (err_tx, err_rx) = mpsc::channel(ERR_CHANNEL_SIZE);
        let (waiting_tx, _) = watch::channel(0);

        Self {
            inner: Arc::new(WatcherInner {
                clients: input.clients,
                store: input.cache,
                views: Mutex::new(IndexMap::new()),
                data_tx,
                data_rx: AsyncMutex::new(data_rx),
                err_tx,
                err_rx: AsyncMutex::new(err_rx),
                changed: Mutex::new(DepSet::new()),
                waiting_tx,
                stop_notify: Notify::new(),
                stopped: AtomicBool::new(false),
                retry: input.retry,
                token_id: Mutex::new(None),
            }),
        }
    }

    /// The cache this watcher writes into.
    pub fn store(&self) -> &Arc<Store> {
        &self.inner.store
    }

    /// Registers a dependency and starts its view. Returns true on first
    /// registration; adding an id that is already watched is a no-op.
    pub fn add(&self, dep: Arc<dyn Dependency>) -> bool {
        if self.inner.stopped.load(Ordering::SeqCst) {
            warn!(dep = %dep.id(), "add ignored: watcher is stopped");
            return false;
        }

        let id = dep.id();
        let mut views = self.inner.views.lock().expect("views lock poisoned");
        if views.contains_key(&id) {
            return false;
        }

        let view = View::new(dep, self.inner.clients.clone(), self.inner.retry.clone());
        let task = tokio::spawn(Arc::clone(&view).run(
            self.inner.data_tx.clone(),
            self.inner.err_tx.clone(),
        ));
        views.insert(id.clone(), ViewEntry { view, task });

        debug!(dep = %id, "started view");
        true
    }

    pub fn watching(&self, id: &str) -> bool {
        self.inner
            .views
            .lock()
            .expect("views lock poisoned")
            .contains_key(id)
    }

    /// Number of views currently registered.
    pub fn size(&self) -> usize {
        self.inner.views.lock().expect("views lock poisoned").len()
    }

    /// Registers a token-renewal dependency for the given auth token. Empty
    /// tokens are ignored. The renewer is not named by any template, so
    /// `clean_deps` leaves it alone.
    pub fn watch_token(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }

        let dep: Arc<dyn Dependency> = Arc::new(TokenRenewQuery::new(token));
        let id = dep.id();
        let added = self.add(dep);
        if added {
            *self.inner.token_id.lock().expect("token lock poisoned") = Some(id);
        }
        added
    }

    /// Stops and unregisters a single view.
    pub fn remove(&self, id: &str) -> bool {
        let entry = {
            let mut views = self.inner.views.lock().expect("views lock poisoned");
            views.shift_remove(id)
        };

        match entry {
            Some(entry) => {
                entry.view.stop();
                entry.task.abort();
                debug!(dep = %id, "removed view");
                true
            }
            None => false,
        }
    }

    /// Stops and removes every view whose dependency was not used by the
    /// last render, keeping a registered token renewer. Reaped ids also leave
    /// the cache and the changed set.
    pub fn clean_deps(&self, used: &DepSet) {
        let token_id = self
            .inner
            .token_id
            .lock()
            .expect("token lock poisoned")
            .clone();

        let stale: Vec<String> = {
            let views = self.inner.views.lock().expect("views lock poisoned");
            views
                .keys()
                .filter(|id| !used.contains(id) && token_id.as_deref() != Some(id.as_str()))
                .cloned()
                .collect()
        };

        for id in stale {
            self.remove(&id);
            self.inner.store.delete(&id);
            self.inner
                .changed
                .lock()
                .expect("changed lock poisoned")
                .remove(&id);
            debug!(dep = %id, "reaped unused dependency");
        }
    }

    /// Dependencies updated since the last time they were marked seen.
    pub fn changed(&self) -> DepSet {
        self.inner
            .changed
            .lock()
            .expect("changed lock poisoned")
            .clone()
    }

    /// Clears the given dependencies from the changed set, typically after a
    /// render consumed them.
    pub fn mark_seen(&self, seen: &DepSet) {
        let mut changed = self.inner.changed.lock().expect("changed lock poisoned");
        for id in seen.ids() {
            changed.remove(id);
        }
    }

    fn apply(&self, view: Arc<View>) {
        // A waiter racing stop() may still see buffered updates in its
        // select; nothing may enter the store once stop has begun.
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }

        let id = view.id();
        let value = view.last_value().unwrap_or(Value::Null);
        self.inner.store.save(&id, value);
        self.inner
            .changed
            .lock()
            .expect("changed lock poisoned")
            .add(Arc::clone(view.dep()));
        debug!(dep = %id, "applied update to cache");
    }

    /// Blocks until at least one update has arrived since the prior wait,
    /// then drains whatever else is immediately available (coalescing) and
    /// applies everything to the store before returning.
    ///
    /// Returns the first terminal dependency error received. Stopping the
    /// watcher unblocks a current waiter with `Ok(())`; a stop that happened
    /// *before* wait was called does not pre-cancel it. Cancellation is the
    /// caller's: drop the future (e.g. via `tokio::time::timeout`) and any
    /// undelivered update stays buffered for the next waiter.
    pub async fn wait(&self) -> Result<()> {
        self.inner.waiting_tx.send_modify(|n| *n += 1);

        if self.inner.stopped.load(Ordering::SeqCst) {
            self.inner.stop_notify.notified().await;
            return Ok(());
        }

        let mut data_rx = self.inner.data_rx.lock().await;
        let mut err_rx = self.inner.err_rx.lock().await;

        tokio::select! {
            received = data_rx.recv() => {
                let Some(view) = received else { return Ok(()) };
                self.apply(view);
                while let Ok(view) = data_rx.try_recv() {
                    self.apply(view);
                }
                Ok(())
            }
            received = err_rx.recv() => match received {
                Some(err) => Err(err.into()),
                None => Ok(()),
            },
            _ = self.inner.stop_notify.notified() => Ok(()),
        }
    }

    /// Same semantics as `wait`, delivered through a one-shot channel.
    pub fn wait_ch(&self) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        let watcher = self.clone();
        tokio::spawn(async move {
            let _ = tx.send(watcher.wait().await);
        });
        rx
    }

    /// Stops every view, clears the registry, resets the cache and unblocks a
    /// current waiter. Idempotent; each call re-signals waiters.
    pub async fn stop(&self) {
        let was_stopped = self.inner.stopped.swap(true, Ordering::SeqCst);

        let entries: Vec<ViewEntry> = {
            let mut views = self.inner.views.lock().expect("views lock poisoned");
            views.drain(..).map(|(_, entry)| entry).collect()
        };
        for entry in &entries {
            entry.view.stop();
        }
        for entry in entries {
            entry.task.abort();
            let _ = entry.task.await;
        }

        self.inner.store.reset();
        self.inner
            .changed
            .lock()
            .expect("changed lock poisoned")
            .clear();
        *self.inner.token_id.lock().expect("token lock poisoned") = None;

        // Discard updates that were in flight when the views went down, so
        // nothing enters the store after this returns. A blocked waiter holds
        // the receiver lock; it is unblocked by the notify below instead.
        if let Ok(mut data_rx) = self.inner.data_rx.try_lock() {
            while data_rx.try_recv().is_ok() {}
        }

        self.inner.stop_notify.notify_waiters();

        if !was_stopped {
            info!("watcher stopped");
        }
    }

    #[cfg(test)]
    pub(crate) fn waiting_watch(&self) -> watch::Receiver<u64> {
        self.inner.waiting_tx.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn data_tx(&self) -> mpsc::Sender<Arc<View>> {
        self.inner.data_tx.clone()
    }

    #[cfg(test)]
    pub(crate) fn err_tx(&self) -> mpsc::Sender<DependencyError> {
        self.inner.err_tx.clone()
    }
}

impl Recaller for Watcher {
    fn recall(&self, id: &str) -> Option<Value> {
        self.inner.store.recall(id)
    }
}
