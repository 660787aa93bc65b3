//! The effect currently executing on this thread.
//!
//! Cells consult this to find out who is reading them. A thread-local stack
//! holds the executing effects; entering one pushes it and hands back a
//! guard that pops it again on drop, so an inner effect records only its own
//! reads and the outer effect resumes tracking once it returns.

use std::cell::RefCell;
use std::sync::Arc;

use super::effect::EffectInner;
use super::SubscriberId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Arc<EffectInner>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
///
/// The stack stays balanced even if the effect body panics.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Make `effect` the current effect until the guard is dropped.
    pub(crate) fn enter(effect: Arc<EffectInner>) -> Self {
        let subscriber_id = effect.id();
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(effect));
        Self { subscriber_id }
    }

    /// Check if an effect is currently running on this thread.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The id of the running effect, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|effect| effect.id()))
    }

    pub(crate) fn current() -> Option<Arc<EffectInner>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Run `f` with tracking suspended.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let saved = CONTEXT_STACK.with(|stack| std::mem::take(&mut *stack.borrow_mut()));
        let _restore = RestoreStack(Some(saved));
        f()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(effect) = popped {
                debug_assert_eq!(
                    effect.id(),
                    self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id,
                    effect.id()
                );
            }
        });
    }
}

struct RestoreStack(Option<Vec<Arc<EffectInner>>>);

impl Drop for RestoreStack {
    fn drop(&mut self) {
        if let Some(saved) = self.0.take() {
            CONTEXT_STACK.with(|stack| *stack.borrow_mut() = saved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect() -> Arc<EffectInner> {
        EffectInner::detached(|| None)
    }

    #[test]
    fn context_tracks_subscriber() {
        let e = effect();
        let id = e.id();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(e);
            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn nested_contexts_restore_outer() {
        let (outer, inner) = (effect(), effect());
        let (outer_id, inner_id) = (outer.id(), inner.id());

        {
            let _ctx1 = ReactiveContext::enter(outer);
            {
                let _ctx2 = ReactiveContext::enter(inner);
                assert_eq!(ReactiveContext::current_subscriber(), Some(inner_id));
            }
            assert_eq!(ReactiveContext::current_subscriber(), Some(outer_id));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn untracked_hides_current_effect() {
        let e = effect();
        let id = e.id();
        let _ctx = ReactiveContext::enter(e);
        ReactiveContext::untracked(|| assert!(!ReactiveContext::is_active()));
        assert_eq!(ReactiveContext::current_subscriber(), Some(id));
    }
}
