//! Observable cells.
//!
//! Reading a `Signal` inside a running [`Effect`](super::Effect) links the
//! two: the effect joins the cell's subscriber map and the cell is recorded
//! as one of the effect's dependencies. Writing the cell re-runs every
//! linked effect on the writing thread.
//!
//! Before each run an effect unlinks itself from every cell it read last
//! time, so the subscriber map only ever holds effects whose latest run
//! actually read the cell.
//!
//! Value and subscribers are guarded by `parking_lot` locks that are always
//! released before any effect executes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::context::ReactiveContext;
use super::effect::EffectInner;
use super::subscriber::{Dependency, SubscriberId};

static NEXT_SIGNAL: AtomicU64 = AtomicU64::new(0);

fn next_signal_id() -> u64 {
    NEXT_SIGNAL.fetch_add(1, Ordering::Relaxed)
}

type Subscribers = Mutex<IndexMap<SubscriberId, Arc<EffectInner>>>;

/// A shared, observable value. Clones are handles onto the same cell.
///
/// ```rust,ignore
/// let theme = Signal::new(String::from("light"));
/// let _log = Effect::new({
///     let theme = theme.clone();
///     move || tracing::info!(theme = %theme.get(), "theme changed")
/// });
/// theme.set("dark".into());
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: u64,
    value: Arc<RwLock<T>>,
    subscribers: Arc<Subscribers>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            id: next_signal_id(),
            value: Arc::new(RwLock::new(value)),
            subscribers: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the current value, subscribing the running effect if any.
    pub fn get(&self) -> T {
        if let Some(effect) = ReactiveContext::current() {
            self.track(effect);
        }
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Set a new value and re-run every subscriber.
    pub fn set(&self, value: T) {
        *self.value.write() = value;
        self.notify();
    }

    /// Replace the value with `f(current)`.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn track(&self, effect: Arc<EffectInner>) {
        let subscriber = effect.id();
        self.subscribers
            .lock()
            .insert(subscriber, Arc::clone(&effect));

        let weak = Arc::downgrade(&self.subscribers);
        effect.track(Dependency::new(self.id, move |id| {
            if let Some(subscribers) = weak.upgrade() {
                subscribers.lock().shift_remove(&id);
            }
        }));
    }

    fn notify(&self) {
        let effects: Vec<Arc<EffectInner>> = self.subscribers.lock().values().cloned().collect();
        for effect in effects {
            effect.execute();
        }
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> std::fmt::Debug for Signal<T>
where
    T: Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn writes_are_visible_through_every_handle() {
        let cell = Signal::new(vec![1]);
        let other = cell.clone();
        assert_eq!(other.id(), cell.id());

        cell.set(vec![1, 2]);
        assert_eq!(other.get(), vec![1, 2]);

        other.update(|items| items.iter().map(|n| n * 10).collect());
        assert_eq!(cell.get_untracked(), vec![10, 20]);
    }

    #[test]
    fn untracked_read_does_not_subscribe() {
        let signal = Signal::new(1);
        let _effect = Effect::new({
            let signal = signal.clone();
            move || {
                signal.get_untracked();
            }
        });
        assert_eq!(signal.subscriber_count(), 0);

        let _effect = Effect::new({
            let signal = signal.clone();
            move || {
                ReactiveContext::untracked(|| signal.get());
            }
        });
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn set_reruns_every_subscriber() {
        let signal = Signal::new(0);
        let total = Arc::new(AtomicI32::new(0));

        let effects: Vec<Effect> = (0..3)
            .map(|_| {
                let signal = signal.clone();
                let total = total.clone();
                Effect::new(move || {
                    total.fetch_add(signal.get(), Ordering::SeqCst);
                })
            })
            .collect();

        signal.set(2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
        assert_eq!(signal.subscriber_count(), 3);

        effects[0].stop();
        assert_eq!(signal.subscriber_count(), 2);
    }

    #[test]
    fn dropping_signal_leaves_effect_usable() {
        let effect = {
            let signal = Signal::new(String::from("a"));
            let effect = Effect::new({
                let signal = signal.clone();
                move || {
                    signal.get();
                }
            });
            signal.set("b".into());
            effect
        };
        assert_eq!(effect.run_count(), 2);
        effect.stop();
        assert!(effect.is_stopped());
    }
}
