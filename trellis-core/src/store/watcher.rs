//! Store watchers.

use std::fmt;

use smallvec::SmallVec;

use crate::value::ValueMap;

type WatchFn = Box<dyn Fn(&ValueMap) + Send + Sync>;

/// A callback fired when watched keys change.
///
/// An empty dependency list makes the watcher a wildcard that fires on every
/// mutation of the store. The callback receives a snapshot of the whole
/// store state taken after the mutation.
pub struct Watcher {
    deps: SmallVec<[String; 4]>,
    deep: bool,
    immediate: bool,
    callback: WatchFn,
}

impl Watcher {
    pub fn new<I, D, F>(deps: I, callback: F) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
        F: Fn(&ValueMap) + Send + Sync + 'static,
    {
        Self {
            deps: deps.into_iter().map(Into::into).collect(),
            deep: false,
            immediate: false,
            callback: Box::new(callback),
        }
    }

    /// Also match dotted parent and child paths of each dependency.
    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    /// Run once at registration.
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn is_wildcard(&self) -> bool {
        self.deps.is_empty()
    }

    pub(crate) fn is_immediate(&self) -> bool {
        self.immediate
    }

    /// Whether a mutation of `key` should fire this watcher.
    pub fn matches(&self, key: &str) -> bool {
        if self.deps.is_empty() {
            return true;
        }
        self.deps.iter().any(|dep| {
            dep == key || (self.deep && (is_descendant(key, dep) || is_descendant(dep, key)))
        })
    }

    pub(crate) fn run(&self, state: &ValueMap) {
        (self.callback)(state)
    }
}

/// `user.name` is a descendant of `user`; `username` is not.
fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("deps", &self.deps)
            .field("deep", &self.deep)
            .field("immediate", &self.immediate)
            .finish()
    }
}
