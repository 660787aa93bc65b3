//! Effects: closures that re-run after a cell they read is written.
//!
//! A run, the first one at construction included, goes through four phases.
//! The previous run's cleanup fires, the effect unlinks from every cell it
//! read last time, the body runs with the effect installed as the current
//! context, and the body's cleanup is kept for next time.
//!
//! Because links are rebuilt each run, an effect that takes a different
//! branch and stops reading a cell is no longer woken by it.
//!
//! # Cycles
//!
//! Re-runs happen synchronously inside `Signal::set`. An effect that writes a
//! signal it also reads recurses without bound.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::context::ReactiveContext;
use super::subscriber::{Dependency, SubscriberId};

/// Callback returned by an effect run, executed before the next run and on
/// stop.
pub type Cleanup = Box<dyn FnOnce() + Send>;

type RunFn = Box<dyn Fn() -> Option<Cleanup> + Send + Sync>;

pub(crate) struct EffectInner {
    id: SubscriberId,
    run: RunFn,
    cleanup: Mutex<Option<Cleanup>>,
    dependencies: Mutex<Vec<Dependency>>,
    stopped: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectInner {
    /// An effect that has not run yet.
    pub(crate) fn detached<F>(run: F) -> Arc<Self>
    where
        F: Fn() -> Option<Cleanup> + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: SubscriberId::new(),
            run: Box::new(run),
            cleanup: Mutex::new(None),
            dependencies: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        })
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    /// Record a signal read during the current run. Repeated reads of the
    /// same signal are recorded once.
    pub(crate) fn track(&self, dependency: Dependency) {
        let mut deps = self.dependencies.lock();
        if !deps.iter().any(|d| d.signal_id() == dependency.signal_id()) {
            deps.push(dependency);
        }
    }

    pub(crate) fn execute(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        self.release();

        let cleanup = {
            let _ctx = ReactiveContext::enter(Arc::clone(self));
            (self.run)()
        };
        *self.cleanup.lock() = cleanup;
        self.run_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Run the pending cleanup and leave every tracked signal.
    fn release(&self) {
        let cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }

        let deps = std::mem::take(&mut *self.dependencies.lock());
        for dep in &deps {
            dep.release(self.id);
        }
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.release();
        }
    }
}

/// A side-effecting computation that runs when its dependencies change.
///
/// The effect stays subscribed after the handle is dropped; call
/// [`stop`](Effect::stop) to end it.
///
/// ```rust,ignore
/// let selected = Signal::new(0usize);
/// let effect = Effect::new({
///     let selected = selected.clone();
///     move || tracing::debug!(row = selected.get(), "selection moved")
/// });
/// selected.set(3);
/// effect.stop();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create an effect and run it immediately to establish its dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_cleanup(move || {
            run();
            None
        })
    }

    /// Like [`new`](Effect::new), for bodies that return a cleanup.
    pub fn with_cleanup<F>(run: F) -> Self
    where
        F: Fn() -> Option<Cleanup> + Send + Sync + 'static,
    {
        let inner = EffectInner::detached(run);
        inner.execute();
        Self { inner }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Run cleanup, unsubscribe from every tracked signal and never run again.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Number of signals read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
