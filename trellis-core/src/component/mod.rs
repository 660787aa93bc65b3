//! Components
//!
//! An [`HtmlComponent`] pairs a directive template with its props, the store
//! it renders against and the child components it includes. Components are
//! shared through [`ComponentRef`], a cheap handle that can also travel
//! inside a [`Value`] (a list of components in a store, a component-valued
//! prop).
//!
//! # Identity
//!
//! A component's id is the SHA-256 of its name and its props serialized as
//! sorted `key=value;` pairs. The id is stamped on the template's `<root>`
//! element as `data-component-id`, which is how updates find the component's
//! subtree in the live document.
//!
//! # Render Cycle
//!
//! Every render first runs and clears the teardowns of the previous one
//! (store subscriptions, condition blocks, dependencies synthesized by loops
//! and inline includes), then renders the template, installing fresh
//! subscriptions as it goes. The set of live subscriptions therefore always
//! matches the latest render.
//!
//! # Signals and Slots
//!
//! A component may own named [`Signal`]s for state that does not belong in a
//! store; `@signal:name` renders one and keeps it current. A parent fills a
//! child's `@slot` placeholders with `@slot:child.name` blocks. Provided slot
//! markup survives the child's own renders and is replaced whenever the
//! parent renders again.

mod registry;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::reactive::Signal;
use crate::store::{Store, StoreManager, Subscription};
use crate::template::{self, ConditionBlock, RenderContext};
use crate::value::{Value, ValueMap};

pub use registry::{ComponentRegistry, Constructor};

/// Callback run when a component enters or leaves the live document.
pub type LifecycleHook = Arc<dyn Fn(&ComponentRef) + Send + Sync>;

/// Named signals a component renders with `@signal:name`.
pub type SignalMap = IndexMap<String, Signal<Value>>;

/// Compute the id of a component from its name and props.
pub fn component_id(name: &str, props: &ValueMap) -> String {
    let mut entries: Vec<(&String, &Value)> = props.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    for (key, value) in entries {
        hasher.update(format!("{key}={value};").as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Render timing for one component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub render_count: u64,
    pub last_duration: Duration,
    pub total_duration: Duration,
}

/// A template-backed component.
pub struct HtmlComponent {
    pub(crate) id: Arc<str>,
    pub(crate) name: String,
    pub(crate) template: String,
    pub(crate) props: ValueMap,
    pub(crate) store: Option<Store>,
    pub(crate) dependencies: IndexMap<String, ComponentRef>,
    /// Dependencies added by the latest render rather than by the user.
    pub(crate) synthesized: HashSet<String>,
    pub(crate) subscriptions: Vec<Subscription>,
    pub(crate) conditions: HashMap<String, ConditionBlock>,
    pub(crate) signals: SignalMap,
    /// Slot markup provided by the parent's latest render.
    pub(crate) slots: IndexMap<String, String>,
    on_mount: Option<LifecycleHook>,
    on_unmount: Option<LifecycleHook>,
    stats: RenderStats,
}

impl HtmlComponent {
    /// Create a component. Fails when the template is empty.
    pub fn new(name: impl Into<String>, template: impl Into<String>, props: ValueMap) -> Result<Self> {
        let name = name.into();
        let template = template.into();
        if template.trim().is_empty() {
            return Err(Error::MissingTemplate { component: name });
        }
        let id: Arc<str> = component_id(&name, &props).into();
        Ok(Self {
            id,
            name,
            template,
            props,
            store: None,
            dependencies: IndexMap::new(),
            synthesized: HashSet::new(),
            subscriptions: Vec::new(),
            conditions: HashMap::new(),
            signals: IndexMap::new(),
            slots: IndexMap::new(),
            on_mount: None,
            on_unmount: None,
            stats: RenderStats::default(),
        })
    }

    /// Declare a child rendered by `@include:<name>`.
    pub fn with_dependency(mut self, name: impl Into<String>, dependency: ComponentRef) -> Self {
        self.dependencies.insert(name.into(), dependency);
        self
    }

    /// Own a signal readable as `@signal:<name>` and `@if:signal:<name>`.
    pub fn with_signal(mut self, name: impl Into<String>, signal: Signal<Value>) -> Self {
        self.signals.insert(name.into(), signal);
        self
    }

    /// Fill the `@slot:<name>` placeholder before any parent provides it.
    pub fn with_slot(mut self, name: impl Into<String>, html: impl Into<String>) -> Self {
        self.slots.insert(name.into(), html.into());
        self
    }

    pub fn on_mount<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ComponentRef) + Send + Sync + 'static,
    {
        self.on_mount = Some(Arc::new(hook));
        self
    }

    pub fn on_unmount<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ComponentRef) + Send + Sync + 'static,
    {
        self.on_unmount = Some(Arc::new(hook));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_ref(self) -> ComponentRef {
        ComponentRef { id: Arc::clone(&self.id), inner: Arc::new(Mutex::new(self)) }
    }

    /// Attach a dependency discovered while rendering. It is bound to this
    /// component's store and dropped again before the next render.
    pub(crate) fn attach_dependency(&mut self, name: String, dependency: ComponentRef) {
        if let Some(store) = &self.store {
            bind_store(&dependency, store, &mut HashSet::new());
        }
        self.synthesized.insert(name.clone());
        self.dependencies.insert(name, dependency);
    }

    /// Run and clear every teardown of the previous render. Returns the
    /// dependencies the previous render synthesized.
    pub(crate) fn teardown(&mut self) -> IndexMap<String, ComponentRef> {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        self.conditions.clear();
        let mut previous = IndexMap::new();
        for name in self.synthesized.drain() {
            if let Some(dep) = self.dependencies.shift_remove(&name) {
                previous.insert(name, dep);
            }
        }
        previous
    }
}

impl fmt::Debug for HtmlComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtmlComponent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("props", &self.props.len())
            .field("dependencies", &self.dependencies.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("signals", &self.signals.len())
            .finish()
    }
}

/// Point a component (and the dependencies it declares) at `store`.
fn bind_store(component: &ComponentRef, store: &Store, visited: &mut HashSet<usize>) {
    if !visited.insert(component.addr()) {
        return;
    }
    // A component that is mid-render is already bound.
    let Some(mut inner) = component.inner.try_lock() else {
        return;
    };
    inner.store = Some(store.clone());
    let deps: Vec<ComponentRef> = inner.dependencies.values().cloned().collect();
    drop(inner);
    for dep in deps {
        bind_store(&dep, store, visited);
    }
}

/// Shared handle to a component.
#[derive(Clone)]
pub struct ComponentRef {
    id: Arc<str>,
    inner: Arc<Mutex<HtmlComponent>>,
}

impl ComponentRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Whether both handles refer to the same component instance.
    pub fn ptr_eq(&self, other: &ComponentRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Bind the component to `store`, or to the `app/default` store when
    /// none is given. Declared dependencies share the same store.
    pub fn init(&self, store: Option<Store>, stores: &StoreManager) -> Result<()> {
        let store = match store {
            Some(store) => store,
            None => stores.get_store("app", "default").ok_or_else(|| Error::NoStore {
                component: self.name(),
            })?,
        };
        let deps: Vec<ComponentRef> = {
            let mut inner = self.inner.lock();
            inner.store = Some(store.clone());
            inner.dependencies.values().cloned().collect()
        };
        let mut visited = HashSet::from([self.addr()]);
        for dep in deps {
            bind_store(&dep, &store, &mut visited);
        }
        Ok(())
    }

    /// The store the component renders against, once initialized.
    pub fn store(&self) -> Option<Store> {
        self.inner.lock().store.clone()
    }

    /// Declare a dependency at runtime. It is bound to this component's
    /// store if there is one.
    pub fn add_dependency(&self, name: impl Into<String>, dependency: ComponentRef) {
        if let Some(store) = self.store() {
            bind_store(&dependency, &store, &mut HashSet::new());
        }
        self.inner.lock().dependencies.insert(name.into(), dependency);
    }

    pub fn dependencies(&self) -> Vec<(String, ComponentRef)> {
        self.inner
            .lock()
            .dependencies
            .iter()
            .map(|(name, dep)| (name.clone(), dep.clone()))
            .collect()
    }

    pub fn props(&self) -> ValueMap {
        self.inner.lock().props.clone()
    }

    pub fn signal(&self, name: &str) -> Option<Signal<Value>> {
        self.inner.lock().signals.get(name).cloned()
    }

    pub fn slot(&self, name: &str) -> Option<String> {
        self.inner.lock().slots.get(name).cloned()
    }

    /// Hand slot markup to this component. Fails when the component is
    /// rendering further up the stack.
    pub(crate) fn provide_slot(&self, name: &str, html: String) -> bool {
        match self.inner.try_lock() {
            Some(mut inner) => {
                inner.slots.insert(name.to_string(), html);
                true
            }
            None => false,
        }
    }

    /// Render the component to markup.
    pub fn render(&self, ctx: &RenderContext) -> String {
        let mut inner = self.inner.lock();
        render_locked(&mut inner, ctx)
    }

    /// Render unless the component is already rendering further up the
    /// stack (a component that includes itself).
    pub(crate) fn try_render(&self, ctx: &RenderContext) -> Option<String> {
        let mut inner = self.inner.try_lock()?;
        Some(render_locked(&mut inner, ctx))
    }

    pub fn stats(&self) -> RenderStats {
        self.inner.lock().stats
    }

    /// Number of store subscriptions installed by the latest render.
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    pub(crate) fn condition_block(&self, condition_id: &str) -> Option<ConditionBlock> {
        self.inner.lock().conditions.get(condition_id).cloned()
    }

    /// Tear the component down: the unmount hook runs, subscriptions are
    /// released and dependencies are unmounted in turn.
    pub fn unmount(&self) {
        let mut visited = HashSet::new();
        self.unmount_inner(&mut visited);
    }

    fn unmount_inner(&self, visited: &mut HashSet<usize>) {
        if !visited.insert(self.addr()) {
            return;
        }
        self.detach();
        for (_, dep) in self.dependencies() {
            dep.unmount_inner(visited);
        }
    }

    /// Unmount hook plus teardown of this component alone.
    pub(crate) fn detach(&self) {
        let hook = self.inner.lock().on_unmount.clone();
        if let Some(hook) = hook {
            hook(self);
        }
        let previous = self.inner.lock().teardown();
        tracing::debug!(component = %self.id, released = previous.len(), "component detached");
    }

    pub(crate) fn fire_mount(&self) {
        let hook = self.inner.lock().on_mount.clone();
        if let Some(hook) = hook {
            hook(self);
        }
    }
}

fn render_locked(inner: &mut HtmlComponent, ctx: &RenderContext) -> String {
    let start = Instant::now();
    let previous = inner.teardown();
    let html = template::render(inner, ctx, previous);
    let elapsed = start.elapsed();
    inner.stats.render_count += 1;
    inner.stats.last_duration = elapsed;
    inner.stats.total_duration += elapsed;
    tracing::trace!(component = %inner.name, id = %inner.id, ?elapsed, "rendered");
    html
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ComponentRef");
        s.field("id", &self.id);
        if let Some(inner) = self.inner.try_lock() {
            s.field("name", &inner.name);
        }
        s.finish()
    }
}

impl From<HtmlComponent> for Value {
    fn from(component: HtmlComponent) -> Self {
        Value::Component(component.into_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreOptions;
    use crate::value_map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn props(value: Value) -> ValueMap {
        match value {
            Value::Map(map) => map,
            _ => ValueMap::new(),
        }
    }

    #[test]
    fn empty_template_is_rejected() {
        let err = HtmlComponent::new("Empty", "  \n ", ValueMap::new()).unwrap_err();
        assert!(matches!(err, Error::MissingTemplate { component } if component == "Empty"));
    }

    #[test]
    fn id_is_independent_of_prop_order() {
        let a = props(value_map! { "x" => 1, "y" => "two" });
        let b = props(value_map! { "y" => "two", "x" => 1 });
        assert_eq!(component_id("Card", &a), component_id("Card", &b));
        assert_ne!(component_id("Card", &a), component_id("Other", &a));
        assert_eq!(component_id("Card", &a).len(), 64);
    }

    #[test]
    fn init_falls_back_to_default_store() {
        let stores = StoreManager::new();
        let child = HtmlComponent::new("Child", "<p>c</p>", ValueMap::new()).unwrap().into_ref();
        let parent = HtmlComponent::new("Parent", "<root>@include:child</root>", ValueMap::new())
            .unwrap()
            .with_dependency("child", child.clone())
            .into_ref();

        assert!(matches!(parent.init(None, &stores), Err(Error::NoStore { .. })));

        let default = stores.create_store("default", StoreOptions::new()).unwrap();
        parent.init(None, &stores).unwrap();
        assert!(parent.store().unwrap().ptr_eq(&default));
        assert!(child.store().unwrap().ptr_eq(&default));
    }

    #[test]
    fn lifecycle_hooks_fire() {
        let mounted = Arc::new(AtomicUsize::new(0));
        let unmounted = Arc::new(AtomicUsize::new(0));
        let (m, u) = (mounted.clone(), unmounted.clone());
        let child_unmounted = Arc::new(AtomicUsize::new(0));
        let cu = child_unmounted.clone();

        let child = HtmlComponent::new("Child", "<p>c</p>", ValueMap::new())
            .unwrap()
            .on_unmount(move |_| {
                cu.fetch_add(1, Ordering::SeqCst);
            })
            .into_ref();
        let component = HtmlComponent::new("Hooks", "<root></root>", ValueMap::new())
            .unwrap()
            .with_dependency("child", child)
            .on_mount(move |_| {
                m.fetch_add(1, Ordering::SeqCst);
            })
            .on_unmount(move |_| {
                u.fetch_add(1, Ordering::SeqCst);
            })
            .into_ref();

        component.fire_mount();
        component.unmount();
        assert_eq!(mounted.load(Ordering::SeqCst), 1);
        assert_eq!(unmounted.load(Ordering::SeqCst), 1);
        assert_eq!(child_unmounted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signals_and_slots_are_shared_through_the_ref() {
        let mode = Signal::new(Value::from("view"));
        let c = HtmlComponent::new("Panel", "<root>@signal:mode</root>", ValueMap::new())
            .unwrap()
            .with_signal("mode", mode.clone())
            .with_slot("footer", "<i>f</i>")
            .into_ref();

        mode.set(Value::from("edit"));
        assert_eq!(c.signal("mode").unwrap().get_untracked(), Value::from("edit"));
        assert!(c.signal("other").is_none());

        assert_eq!(c.slot("footer").as_deref(), Some("<i>f</i>"));
        assert!(c.provide_slot("footer", "<b>F</b>".into()));
        assert_eq!(c.slot("footer").as_deref(), Some("<b>F</b>"));

        let guard = c.inner.lock();
        assert!(!c.provide_slot("footer", "x".into()));
        drop(guard);
    }

    #[test]
    fn component_refs_compare_by_identity() {
        let a = HtmlComponent::new("A", "<p></p>", ValueMap::new()).unwrap().into_ref();
        let b = HtmlComponent::new("A", "<p></p>", ValueMap::new()).unwrap().into_ref();
        assert_eq!(a.id(), b.id());
        assert!(!a.ptr_eq(&b));
        assert_eq!(Value::Component(a.clone()), Value::Component(a));
    }
}
