//! Store Implementation
//!
//! # How `set` Works
//!
//! 1. The pre-mutation state is pushed onto the history stack (if enabled).
//! 2. The value is written.
//! 3. Devtools logging and the external mutation hook run.
//! 4. Listeners of the key are invoked. Each one receives the value the key
//!    holds at the moment it is called, so a listener delayed behind a
//!    concurrent `set` never observes the value that was overwritten.
//! 5. Dependents are evaluated: computeds whose dependency snapshot changed
//!    are re-run, written and propagated recursively; matching watchers fire.
//! 6. The state is persisted (if a persistence backend is configured).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::computed::Computed;
use super::history::History;
use super::persistence::Persistence;
use super::watcher::Watcher;
use crate::value::{Value, ValueMap};

/// Callback fired with the new value of a key.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// External observer of every store mutation: `(module, store, key, value)`.
pub type MutationHook = Arc<dyn Fn(&str, &str, &str, &Value) + Send + Sync>;

/// Shared slot for the mutation hook, so a manager can install one after its
/// stores were created.
pub(crate) type HookCell = Arc<RwLock<Option<MutationHook>>>;

/// Options for [`Store::new`].
#[derive(Clone, Default)]
pub struct StoreOptions {
    module: Option<String>,
    history: Option<usize>,
    persistence: Option<Arc<dyn Persistence>>,
    devtools: bool,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Module namespace, `app` when unset.
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Keep up to `depth` undo steps.
    pub fn history(mut self, depth: usize) -> Self {
        self.history = Some(depth);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Log mutations and subscriptions at debug level.
    pub fn devtools(mut self) -> Self {
        self.devtools = true;
        self
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("module", &self.module)
            .field("history", &self.history)
            .field("persistence", &self.persistence.is_some())
            .field("devtools", &self.devtools)
            .finish()
    }
}

/// Handle returned by `on_change` and `register_watcher`.
///
/// Dropping the handle keeps the subscription alive; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
#[must_use = "dropping a Subscription leaves the callback registered"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new<F: FnOnce() + Send + 'static>(cancel: F) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

struct StoreInner {
    module: String,
    name: String,
    state: RwLock<ValueMap>,
    listeners: Mutex<HashMap<String, IndexMap<u64, Listener>>>,
    next_listener_id: AtomicU64,
    computeds: RwLock<IndexMap<String, Arc<Computed>>>,
    watchers: RwLock<Vec<Arc<Watcher>>>,
    history: Option<Mutex<History>>,
    persistence: Option<Arc<dyn Persistence>>,
    devtools: bool,
    hook: HookCell,
}

/// A namespaced reactive key-value container.
///
/// Cloning a store yields another handle to the same state.
///
/// # Example
///
/// ```rust,ignore
/// let store = Store::new("default", StoreOptions::new().module("app"));
/// let sub = store.on_change("count", |v| println!("count = {v}"));
/// store.set("count", 3);
/// sub.unsubscribe();
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create a standalone store. Use
    /// [`StoreManager::create_store`](super::StoreManager::create_store) to
    /// make it addressable from templates.
    pub fn new(name: impl Into<String>, options: StoreOptions) -> Self {
        Self::with_hook(name, options, HookCell::default())
    }

    pub(crate) fn with_hook(name: impl Into<String>, options: StoreOptions, hook: HookCell) -> Self {
        let StoreOptions { module, history, persistence, devtools } = options;
        let store = Self {
            inner: Arc::new(StoreInner {
                module: module.unwrap_or_else(|| "app".to_string()),
                name: name.into(),
                state: RwLock::new(ValueMap::new()),
                listeners: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(0),
                computeds: RwLock::new(IndexMap::new()),
                watchers: RwLock::new(Vec::new()),
                history: history.map(|depth| Mutex::new(History::new(depth))),
                persistence,
                devtools,
                hook,
            }),
        };

        if let Some(persistence) = &store.inner.persistence {
            if let Some(saved) = persistence.load(&store.storage_key()) {
                store.inner.state.write().extend(saved);
            }
        }

        store
    }

    pub fn module(&self) -> &str {
        &self.inner.module
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Key used with the persistence backend.
    pub fn storage_key(&self) -> String {
        format!("trellis:{}:{}", self.inner.module, self.inner.name)
    }

    /// Write a value and propagate the change.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        {
            let mut state = self.inner.state.write();
            if let Some(history) = &self.inner.history {
                history.lock().record(state.clone());
            }
            state.insert(key.clone(), value.clone());
        }

        if self.inner.devtools {
            tracing::debug!(module = %self.inner.module, store = %self.inner.name, %key, %value, "store set");
        }

        let hook = self.inner.hook.read().clone();
        if let Some(hook) = hook {
            hook(&self.inner.module, &self.inner.name, &key, &value);
        }

        self.notify(&key);
        self.evaluate_dependents(&key);
        self.persist();
    }

    /// Current value of `key`, `Null` if it was never set.
    pub fn get(&self, key: &str) -> Value {
        match self.inner.state.read().get(key) {
            Some(value) => value.clone(),
            None => {
                tracing::debug!(module = %self.inner.module, store = %self.inner.name, key, "store key not found");
                Value::Null
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.state.read().contains_key(key)
    }

    /// Copy of the whole state.
    pub fn snapshot(&self) -> ValueMap {
        self.inner.state.read().clone()
    }

    /// Register a listener for `key`.
    pub fn on_change<F>(&self, key: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let key = key.into();
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);

        if self.inner.devtools {
            tracing::debug!(module = %self.inner.module, store = %self.inner.name, %key, id, "listener added");
        }

        self.inner
            .listeners
            .lock()
            .entry(key.clone())
            .or_default()
            .insert(id, Arc::new(listener));

        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut listeners = inner.listeners.lock();
                if let Some(for_key) = listeners.get_mut(&key) {
                    for_key.shift_remove(&id);
                    if for_key.is_empty() {
                        listeners.remove(&key);
                    }
                }
            }
        })
    }

    /// Number of live listeners on `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        self.inner.listeners.lock().get(key).map_or(0, IndexMap::len)
    }

    /// Register a computed value. It is evaluated immediately and its output
    /// written without notifying listeners.
    pub fn register_computed(&self, computed: Computed) {
        let computed = Arc::new(computed);
        let inputs = computed.inputs(&self.inner.state.read());
        let value = computed.evaluate(&inputs);
        self.inner.state.write().insert(computed.key().to_string(), value);
        self.inner
            .computeds
            .write()
            .insert(computed.key().to_string(), computed);
    }

    /// The registered computed for `key`, if any.
    pub fn computed(&self, key: &str) -> Option<Arc<Computed>> {
        self.inner.computeds.read().get(key).cloned()
    }

    pub fn register_watcher(&self, watcher: Watcher) -> Subscription {
        let watcher = Arc::new(watcher);
        self.inner.watchers.write().push(Arc::clone(&watcher));

        if watcher.is_immediate() {
            watcher.run(&self.snapshot());
        }

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.watchers.write().retain(|w| !Arc::ptr_eq(w, &watcher));
            }
        })
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.read().len()
    }

    /// Restore the snapshot taken before the last mutation. Returns `false`
    /// when history is disabled or exhausted.
    pub fn undo(&self) -> bool {
        self.travel(|history, current| history.undo(current))
    }

    /// Re-apply the last undone mutation.
    pub fn redo(&self) -> bool {
        self.travel(|history, current| history.redo(current))
    }

    pub fn can_undo(&self) -> bool {
        self.inner.history.as_ref().is_some_and(|h| h.lock().can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.inner.history.as_ref().is_some_and(|h| h.lock().can_redo())
    }

    fn travel<F>(&self, step: F) -> bool
    where
        F: FnOnce(&mut History, ValueMap) -> Option<ValueMap>,
    {
        let Some(history) = &self.inner.history else {
            return false;
        };

        let (before, after) = {
            let mut state = self.inner.state.write();
            let mut history = history.lock();
            match step(&mut history, state.clone()) {
                Some(restored) => {
                    let before = std::mem::replace(&mut *state, restored);
                    (before, state.clone())
                }
                None => return false,
            }
        };

        for (key, value) in &after {
            if before.get(key) != Some(value) {
                self.notify(key);
            }
        }
        for key in before.keys().filter(|k| !after.contains_key(*k)) {
            self.notify(key);
        }
        self.persist();
        true
    }

    /// Call the listeners of `key` with its current value, read again for
    /// every listener.
    fn notify(&self, key: &str) {
        let listeners: Vec<Listener> = match self.inner.listeners.lock().get(key) {
            Some(for_key) => for_key.values().cloned().collect(),
            None => return,
        };
        for listener in listeners {
            let current = self.inner.state.read().get(key).cloned().unwrap_or(Value::Null);
            listener(&current);
        }
    }

    fn evaluate_dependents(&self, key: &str) {
        let computeds: Vec<Arc<Computed>> = self
            .inner
            .computeds
            .read()
            .values()
            .filter(|c| c.depends_on(key))
            .cloned()
            .collect();

        for computed in computeds {
            let inputs = computed.inputs(&self.inner.state.read());
            if let Some(value) = computed.reevaluate(&inputs) {
                self.inner
                    .state
                    .write()
                    .insert(computed.key().to_string(), value);
                self.notify(computed.key());
                self.evaluate_dependents(computed.key());
            }
        }

        let watchers: Vec<Arc<Watcher>> = self
            .inner
            .watchers
            .read()
            .iter()
            .filter(|w| w.matches(key))
            .cloned()
            .collect();

        if !watchers.is_empty() {
            let snapshot = self.snapshot();
            for watcher in watchers {
                watcher.run(&snapshot);
            }
        }
    }

    fn persist(&self) {
        if let Some(persistence) = &self.inner.persistence {
            if let Err(err) = persistence.save(&self.storage_key(), &self.snapshot()) {
                tracing::warn!(%err, store = %self.inner.name, "failed to persist store");
            }
        }
    }

    pub(crate) fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("module", &self.inner.module)
            .field("name", &self.inner.name)
            .field("keys", &self.inner.state.read().len())
            .finish()
    }
}
