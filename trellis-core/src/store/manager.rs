//! Registry of stores addressed by `(module, name)`.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::store::{HookCell, MutationHook, Store, StoreOptions};
use crate::error::{Error, Result};
use crate::value::ValueMap;

/// Nested snapshot: module -> store name -> state.
pub type StoresSnapshot = BTreeMap<String, BTreeMap<String, ValueMap>>;

/// Owns every store the template renderer can resolve.
///
/// Stores created through the manager share its mutation hook, so a hook
/// installed later still sees their mutations.
#[derive(Clone, Default)]
pub struct StoreManager {
    stores: Arc<DashMap<(String, String), Store>>,
    hook: HookCell,
}

impl StoreManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a store.
    pub fn create_store(&self, name: &str, options: StoreOptions) -> Result<Store> {
        let store = Store::with_hook(name, options, Arc::clone(&self.hook));
        let key = (store.module().to_string(), name.to_string());
        match self.stores.entry(key) {
            Entry::Occupied(_) => Err(Error::DuplicateStore {
                module: store.module().to_string(),
                name: name.to_string(),
            }),
            Entry::Vacant(slot) => {
                tracing::debug!(module = %store.module(), store = name, "store created");
                slot.insert(store.clone());
                Ok(store)
            }
        }
    }

    /// The registered store, or a freshly created one with default options.
    pub fn get_or_create(&self, module: &str, name: &str) -> Store {
        let key = (module.to_string(), name.to_string());
        self.stores
            .entry(key)
            .or_insert_with(|| {
                Store::with_hook(name, StoreOptions::new().module(module), Arc::clone(&self.hook))
            })
            .value()
            .clone()
    }

    /// Register an externally created store.
    pub fn register_store(&self, store: Store) -> Result<()> {
        let key = (store.module().to_string(), store.name().to_string());
        match self.stores.entry(key) {
            Entry::Occupied(existing) if existing.get().ptr_eq(&store) => Ok(()),
            Entry::Occupied(_) => Err(Error::DuplicateStore {
                module: store.module().to_string(),
                name: store.name().to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(store);
                Ok(())
            }
        }
    }

    pub fn get_store(&self, module: &str, name: &str) -> Option<Store> {
        self.stores
            .get(&(module.to_string(), name.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Remove a store from the registry. Outstanding handles keep working.
    pub fn unregister_store(&self, module: &str, name: &str) -> Option<Store> {
        self.stores
            .remove(&(module.to_string(), name.to_string()))
            .map(|(_, store)| store)
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Install a hook that observes every mutation of every managed store.
    pub fn set_mutation_hook(&self, hook: Option<MutationHook>) {
        *self.hook.write() = hook;
    }

    /// State of every store, keyed by module then store name.
    pub fn snapshot(&self) -> StoresSnapshot {
        let mut out = StoresSnapshot::new();
        for entry in self.stores.iter() {
            let (module, name) = entry.key();
            out.entry(module.clone())
                .or_default()
                .insert(name.clone(), entry.value().snapshot());
        }
        out
    }

    /// [`snapshot`](Self::snapshot) encoded as MessagePack.
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(&self.snapshot())?)
    }

    /// Apply a MessagePack snapshot, creating stores that do not exist and
    /// setting every key (listeners fire as for a normal `set`).
    pub fn restore_bytes(&self, bytes: &[u8]) -> Result<()> {
        let snapshot: StoresSnapshot = rmp_serde::from_slice(bytes)?;
        for (module, stores) in snapshot {
            for (name, state) in stores {
                let store = self.get_or_create(&module, &name);
                for (key, value) in state {
                    store.set(key, value);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for StoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreManager")
            .field("stores", &self.stores.len())
            .field("hook", &self.hook.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use parking_lot::Mutex;

    #[test]
    fn create_and_lookup() {
        let manager = StoreManager::new();
        let store = manager.create_store("default", StoreOptions::new()).unwrap();
        store.set("count", 1);

        let found = manager.get_store("app", "default").unwrap();
        assert_eq!(found.get("count"), Value::from(1));
        assert!(manager.get_store("app", "missing").is_none());
    }

    #[test]
    fn create_rejects_duplicates() {
        let manager = StoreManager::new();
        let a = manager.create_store("s", StoreOptions::new().module("m")).unwrap();
        a.set("x", 1);
        assert!(matches!(
            manager.create_store("s", StoreOptions::new().module("m")),
            Err(Error::DuplicateStore { .. })
        ));
        assert_eq!(manager.get_or_create("m", "s").get("x"), Value::from(1));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn register_rejects_duplicates() {
        let manager = StoreManager::new();
        let store = Store::new("s", StoreOptions::new());
        manager.register_store(store.clone()).unwrap();
        manager.register_store(store).unwrap();

        let other = Store::new("s", StoreOptions::new());
        assert!(matches!(
            manager.register_store(other),
            Err(Error::DuplicateStore { .. })
        ));
    }

    #[test]
    fn unregister_removes_store() {
        let manager = StoreManager::new();
        manager.create_store("s", StoreOptions::new()).unwrap();
        assert!(manager.unregister_store("app", "s").is_some());
        assert!(manager.is_empty());
        assert!(manager.unregister_store("app", "s").is_none());
    }

    #[test]
    fn snapshot_groups_by_module() {
        let manager = StoreManager::new();
        manager.create_store("a", StoreOptions::new()).unwrap().set("k", 1);
        manager.create_store("b", StoreOptions::new().module("admin")).unwrap().set("k", "v");

        let snapshot = manager.snapshot();
        assert_eq!(snapshot["app"]["a"]["k"], Value::from(1));
        assert_eq!(snapshot["admin"]["b"]["k"], Value::from("v"));
    }

    #[test]
    fn snapshot_bytes_restore_into_fresh_manager() {
        let manager = StoreManager::new();
        manager.create_store("a", StoreOptions::new()).unwrap().set("items", vec![Value::from(1), Value::from(2)]);
        let bytes = manager.snapshot_bytes().unwrap();

        let restored = StoreManager::new();
        restored.restore_bytes(&bytes).unwrap();
        assert_eq!(restored.snapshot(), manager.snapshot());
    }

    #[test]
    fn hook_installed_later_sees_mutations() {
        let manager = StoreManager::new();
        let store = manager.create_store("default", StoreOptions::new()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        manager.set_mutation_hook(Some(Arc::new(move |m: &str, s: &str, k: &str, _: &Value| {
            seen_clone.lock().push(format!("{m}/{s}/{k}"));
        })));
        store.set("count", 2);
        assert_eq!(*seen.lock(), vec!["app/default/count".to_string()]);
    }
}
