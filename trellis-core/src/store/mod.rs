//! Reactive Stores
//!
//! A [`Store`] is a namespaced key-value container that notifies listeners
//! when a key changes. Stores are the coarse-grained half of Trellis'
//! reactivity; [`reactive`](crate::reactive) provides the fine-grained half.
//!
//! # Concepts
//!
//! ## Listeners
//!
//! `on_change(key, cb)` registers a callback fired after every `set` of that
//! key. The returned [`Subscription`] removes it again.
//!
//! ## Computed Values
//!
//! A [`Computed`] derives a key from a declared list of dependency keys. It
//! re-evaluates only when the values of its dependencies actually differ from
//! the last evaluation, and its output key propagates to further computeds
//! and watchers like any other key.
//!
//! ## Watchers
//!
//! A [`Watcher`] runs a callback when any of its dependency keys changes, or
//! on every mutation when it has none. Deep watchers also match dotted
//! parent/child paths (`user` matches `user.name` and vice versa).
//!
//! ## History
//!
//! Stores created with [`StoreOptions::history`] keep a bounded stack of
//! pre-mutation snapshots for `undo`/`redo`.
//!
//! # Thread Safety
//!
//! Stores may be mutated from any thread. Internal maps live behind
//! `parking_lot` locks and no lock is held while user callbacks run, so a
//! listener may freely call back into the store. Multi-key updates are not
//! atomic.

mod computed;
mod history;
mod manager;
mod persistence;
mod store;
mod watcher;

pub use computed::Computed;
pub use manager::{StoreManager, StoresSnapshot};
pub use persistence::{JsonFilePersistence, MemoryPersistence, Persistence};
pub use store::{Listener, MutationHook, Store, StoreOptions, Subscription};
pub use watcher::Watcher;
