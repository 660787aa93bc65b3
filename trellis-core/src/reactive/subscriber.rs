//! Subscriber bookkeeping shared by signals and effects.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an effect.
///
/// Signals key their subscriber maps by this id, which makes repeated reads
/// within one run idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

type Untrack = Box<dyn Fn(SubscriberId) + Send + Sync>;

/// A signal read recorded by an effect during its last run.
///
/// The effect only keeps a way to remove itself from the signal, never the
/// signal itself, so signals are freed once their owners drop them.
pub(crate) struct Dependency {
    signal_id: u64,
    untrack: Untrack,
}

impl Dependency {
    pub(crate) fn new<F>(signal_id: u64, untrack: F) -> Self
    where
        F: Fn(SubscriberId) + Send + Sync + 'static,
    {
        Self { signal_id, untrack: Box::new(untrack) }
    }

    pub(crate) fn signal_id(&self) -> u64 {
        self.signal_id
    }

    /// Remove `subscriber` from the signal's subscriber set.
    pub(crate) fn release(&self, subscriber: SubscriberId) {
        (self.untrack)(subscriber)
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency").field("signal_id", &self.signal_id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn release_calls_untrack_with_subscriber() {
        let released = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();
        let me = SubscriberId::new();
        let dep = Dependency::new(7, move |id| {
            assert_eq!(id, me);
            released_clone.store(true, Ordering::SeqCst);
        });
        assert_eq!(dep.signal_id(), 7);
        dep.release(me);
        assert!(released.load(Ordering::SeqCst));
    }
}
