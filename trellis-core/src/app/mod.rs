//! Application
//!
//! [`App`] owns the live [`Document`] and is the single UI context of a
//! Trellis program. It mounts a root component into a container element and
//! keeps the document in sync with the stores.
//!
//! # How Updates Flow
//!
//! 1. A store mutation or signal write (from any thread) fires the listeners
//!    the renderer installed. They only enqueue an [`UpdateRequest`].
//! 2. [`App::flush`] (or [`App::process_next`] in async code) drains the
//!    queue on the UI context and coalesces it.
//! 3. Each request is applied at the narrowest scope: a `data-store` or
//!    `data-signal` span's text, one `data-condition` block, or a full
//!    component re-render that is reconciled into the component's existing
//!    subtree. Values are read when the request is applied, never when it
//!    was queued.
//! 4. Event bindings inside the patched subtree are re-attached and the
//!    template hook is notified.

mod queue;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::component::{ComponentRef, ComponentRegistry};
use crate::config::AppConfig;
use crate::dom::{self, attach_bindings, BindingRegistry, DispatchOutcome, Document, HandlerRegistry, NodeId, VNode};
use crate::error::{Error, Result};
use crate::reactive::Signal;
use crate::store::{Store, StoreManager};
use crate::template::RenderContext;
use crate::value::Value;

pub use queue::{update_channel, UpdateReceiver, UpdateRequest, UpdateSender};

/// Called with `(component_id, html)` every time markup is applied.
pub type TemplateHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

const COMPONENT_ID_ATTR: &str = "data-component-id";

/// Source of a two-way (`:w`) bound attribute.
enum Writable {
    Store(Store, String),
    Signal(Signal<Value>),
}

impl Writable {
    fn get(&self) -> Value {
        match self {
            Writable::Store(store, key) => store.get(key),
            Writable::Signal(signal) => signal.get_untracked(),
        }
    }

    fn set(&self, value: Value) {
        match self {
            Writable::Store(store, key) => store.set(key.clone(), value),
            Writable::Signal(signal) => signal.set(value),
        }
    }
}

pub struct App {
    config: AppConfig,
    ctx: RenderContext,
    bindings: BindingRegistry,
    handlers: HandlerRegistry,
    document: Document,
    container: NodeId,
    receiver: UpdateReceiver,
    root: Option<ComponentRef>,
    /// Every component reachable from the root, keyed by instance, children
    /// before parents.
    live: IndexMap<usize, ComponentRef>,
    template_hook: Option<TemplateHook>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let (updates, receiver) = update_channel();
        let mut document = Document::new();
        let container = document.create_element("div");
        document.set_attr(container, "id", &config.root_id);

        let ctx = RenderContext {
            stores: StoreManager::new(),
            components: ComponentRegistry::new(),
            updates,
            dev_mode: config.dev_mode,
        };

        Self {
            config,
            ctx,
            bindings: BindingRegistry::new(),
            handlers: HandlerRegistry::new(),
            document,
            container,
            receiver,
            root: None,
            live: IndexMap::new(),
            template_hook: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn stores(&self) -> &StoreManager {
        &self.ctx.stores
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.ctx.components
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    pub fn render_context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The element components mount into.
    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn root(&self) -> Option<&ComponentRef> {
        self.root.as_ref()
    }

    /// Markup currently inside the container.
    pub fn html(&self) -> String {
        dom::inner_html(&self.document, self.container)
    }

    pub fn set_template_hook<F>(&mut self, hook: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.template_hook = Some(Arc::new(hook));
    }

    /// Mount `component` against the `app/default` store.
    pub fn mount(&mut self, component: ComponentRef) -> Result<()> {
        self.mount_with_store(component, None)
    }

    /// Render `component` into the container, replacing whatever was mounted.
    pub fn mount_with_store(&mut self, component: ComponentRef, store: Option<Store>) -> Result<()> {
        component.init(store, &self.ctx.stores)?;
        self.unmount();

        let html = component.render(&self.ctx);
        let name = component.name();
        self.root = Some(component.clone());
        self.patch(self.container, component.id(), &name, &html);
        self.sync_live();
        tracing::debug!(component = %name, id = component.id(), "mounted");
        Ok(())
    }

    /// Unmount the root component and everything it includes. Returns false
    /// when nothing was mounted.
    pub fn unmount(&mut self) -> bool {
        let Some(root) = self.root.take() else {
            return false;
        };
        let listeners = self.document.clear_listeners_within(self.container);
        dom::patch_children(&mut self.document, self.container, &[]);
        for component in std::mem::take(&mut self.live).into_values().rev() {
            component.detach();
            self.bindings.remove(component.id());
        }
        tracing::debug!(id = root.id(), listeners, "unmounted");
        true
    }

    /// A live component by id.
    pub fn component(&self, component_id: &str) -> Option<ComponentRef> {
        self.live.values().find(|c| c.id() == component_id).cloned()
    }

    /// Number of live components.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// The subtree a component's markup lives in: its `<root>` element, or
    /// the container for the root component. An empty id means the container.
    fn locate(&self, component_id: &str) -> Option<NodeId> {
        if component_id.is_empty() {
            return Some(self.container);
        }
        self.document
            .find_by_attr(self.container, COMPONENT_ID_ATTR, component_id)
            .or_else(|| {
                self.root
                    .as_ref()
                    .filter(|root| root.id() == component_id)
                    .map(|_| self.container)
            })
    }

    /// Apply freshly rendered `html` for `component_id` to the document.
    pub fn update_dom(&mut self, component_id: &str, html: &str) -> Result<()> {
        let target = self
            .locate(component_id)
            .ok_or_else(|| Error::ComponentNotMounted { id: component_id.to_string() })?;
        let template = self
            .component(component_id)
            .map(|c| c.name())
            .unwrap_or_else(|| component_id.to_string());
        self.patch(target, component_id, &template, html);
        Ok(())
    }

    fn patch(&mut self, target: NodeId, component_id: &str, template: &str, html: &str) {
        let cleared = self.document.clear_listeners_within(target);
        let vnodes = dom::parse(html);

        let mut significant = vnodes
            .iter()
            .filter(|v| !matches!(v, VNode::Text(text) if text.trim().is_empty()));
        let in_place = match (significant.next(), significant.next()) {
            (Some(single), None)
                if target != self.container && single.attr(COMPONENT_ID_ATTR) == Some(component_id) =>
            {
                Some(single)
            }
            _ => None,
        };

        let roots = match in_place {
            Some(single) => {
                dom::patch_attributes(&mut self.document, target, single);
                dom::patch_children(&mut self.document, target, single.children());
                vec![target]
            }
            None => {
                dom::patch_children(&mut self.document, target, &vnodes);
                self.document.children(target).to_vec()
            }
        };

        let bindings = self.bindings.register(component_id, template, html);
        let attached = attach_bindings(
            &mut self.document,
            &roots,
            component_id,
            &bindings,
            &self.handlers,
            self.config.dev_mode,
        );
        self.sync_writable(&roots);

        tracing::debug!(component = component_id, cleared, attached, "dom updated");
        if let Some(hook) = &self.template_hook {
            hook(component_id, html);
        }
    }

    /// The component whose markup holds `node`: the nearest stamped
    /// ancestor, or the root component.
    fn owner(&self, node: NodeId) -> Option<ComponentRef> {
        let mut current = Some(node);
        while let Some(id) = current {
            if let Some(component_id) = self.document.attr(id, COMPONENT_ID_ATTR) {
                return self.component(component_id);
            }
            current = self.document.parent(id);
        }
        self.root.clone()
    }

    /// Resolve a `@store:m.s.k:w` or `@signal:name:w` attribute.
    fn writable_binding(&self, node: NodeId, attr: &str) -> Option<Writable> {
        let source = self.document.attr(node, attr)?.strip_suffix(":w")?;
        if let Some(name) = source.strip_prefix("@signal:") {
            return self.owner(node)?.signal(name).map(Writable::Signal);
        }
        let path = source.strip_prefix("@store:")?;
        let mut parts = path.split('.');
        let (module, name, key) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let store = self.ctx.stores.get_store(module, name)?;
        Some(Writable::Store(store, key.to_string()))
    }

    /// Push bound values into the properties of two-way bound inputs.
    fn sync_writable(&mut self, roots: &[NodeId]) {
        let nodes: Vec<NodeId> = roots.iter().flat_map(|root| self.document.descendants(*root)).collect();
        for node in nodes {
            if let Some(source) = self.writable_binding(node, "value") {
                let value = source.get().to_string();
                self.document.set_property(node, "value", Value::from(value));
            }
            if let Some(source) = self.writable_binding(node, "checked") {
                let checked = source.get().as_bool().unwrap_or(false);
                self.document.set_property(node, "checked", Value::Bool(checked));
            }
        }
    }

    /// Apply every pending update. Returns the number of requests applied
    /// after coalescing.
    pub fn flush(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let mut batch = Vec::new();
            while let Ok(request) = self.receiver.try_recv() {
                batch.push(request);
            }
            if batch.is_empty() {
                return applied;
            }
            for request in queue::coalesce(batch) {
                self.apply(request);
                applied += 1;
            }
        }
    }

    /// Wait for the next update and apply it together with anything queued
    /// behind it. Returns false once the queue is closed.
    pub async fn process_next(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(request) => {
                self.apply(request);
                self.flush();
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, request: UpdateRequest) {
        tracing::trace!(?request, "applying update");
        match request {
            UpdateRequest::Rerender { component_id } => self.rerender(&component_id),
            UpdateRequest::StoreBinding { component_id, binding } => {
                self.patch_store_binding(&component_id, &binding)
            }
            UpdateRequest::SignalBinding { component_id, name } => self.patch_signal_binding(&component_id, &name),
            UpdateRequest::Condition { component_id, condition_id } => {
                self.patch_condition(&component_id, &condition_id)
            }
        }
    }

    fn rerender(&mut self, component_id: &str) {
        let Some(component) = self.component(component_id) else {
            tracing::debug!(component = component_id, "re-render requested for a component that is not live");
            return;
        };
        // A component without a `<root>` element has no subtree of its own;
        // the whole tree is re-rendered instead.
        let (component, target) = match self.locate(component_id) {
            Some(target) => (component, target),
            None => match self.root.clone() {
                Some(root) => (root, self.container),
                None => return,
            },
        };
        let html = component.render(&self.ctx);
        let name = component.name();
        self.patch(target, component.id(), &name, &html);
        self.sync_live();
    }

    fn patch_store_binding(&mut self, component_id: &str, binding: &str) {
        let Some(scope) = self.locate(component_id) else {
            tracing::debug!(component = component_id, binding, "store update for a component that is not mounted");
            return;
        };
        let mut parts = binding.splitn(3, '.');
        let (Some(module), Some(name), Some(key)) = (parts.next(), parts.next(), parts.next()) else {
            return;
        };
        let Some(store) = self.ctx.stores.get_store(module, name) else {
            tracing::debug!(component = component_id, binding, "store binding outlived its store");
            return;
        };
        let text = [VNode::text(store.get(key).to_string())];
        for span in self.document.find_all_by_attr(scope, "data-store", binding) {
            dom::patch_children(&mut self.document, span, &text);
        }
        self.sync_writable(&[scope]);
    }

    fn patch_signal_binding(&mut self, component_id: &str, name: &str) {
        let Some(scope) = self.locate(component_id) else {
            tracing::debug!(component = component_id, signal = name, "signal update for a component that is not mounted");
            return;
        };
        let Some(signal) = self.component(component_id).and_then(|c| c.signal(name)) else {
            return;
        };
        let text = [VNode::text(signal.get_untracked().to_string())];
        // Children may own a signal of the same name.
        let spans: Vec<NodeId> = self
            .document
            .find_all_by_attr(scope, "data-signal", name)
            .into_iter()
            .filter(|span| self.owner(*span).is_some_and(|owner| owner.id() == component_id))
            .collect();
        for span in spans {
            dom::patch_children(&mut self.document, span, &text);
        }
        self.sync_writable(&[scope]);
    }

    fn patch_condition(&mut self, component_id: &str, condition_id: &str) {
        let Some(component) = self.component(component_id) else {
            return;
        };
        let Some(block) = component.condition_block(condition_id) else {
            tracing::debug!(component = component_id, condition = condition_id, "condition block is gone");
            return;
        };
        let Some(div) = self
            .locate(component_id)
            .and_then(|scope| self.document.find_by_attr(scope, "data-condition", condition_id))
        else {
            return;
        };

        let html = block.select(&self.ctx.stores, &component.props()).to_string();
        self.document.clear_listeners_within(div);
        dom::patch_children(&mut self.document, div, &dom::parse(&html));
        let roots = self.document.children(div).to_vec();
        attach_bindings(&mut self.document, &roots, component_id, &[], &self.handlers, self.config.dev_mode);
        self.sync_writable(&roots);
    }

    /// Recompute the live set after a render. Components that appeared get
    /// their mount hook; components that disappeared are detached.
    fn sync_live(&mut self) {
        let mut reachable = IndexMap::new();
        if let Some(root) = &self.root {
            collect_live(root, &mut HashSet::new(), &mut reachable);
        }

        for (addr, component) in &reachable {
            if !self.live.contains_key(addr) {
                component.fire_mount();
            }
        }
        let gone: Vec<ComponentRef> = self
            .live
            .iter()
            .filter(|(addr, _)| !reachable.contains_key(*addr))
            .map(|(_, c)| c.clone())
            .collect();
        self.live = reachable;

        for component in gone {
            component.detach();
            // Another instance may have taken over the same id.
            if self.component(component.id()).is_none() {
                self.document.remove_listeners(component.id());
                self.bindings.remove(component.id());
            }
        }
    }

    /// The element decorated `[name]` inside a component.
    pub fn get_ref(&self, component_id: &str, name: &str) -> Option<NodeId> {
        let scope = self.locate(component_id)?;
        self.document.find_by_attr(scope, "data-ref", name)
    }

    /// Dispatch an event and apply the updates its handlers caused.
    pub fn dispatch(&mut self, target: NodeId, event: &str) -> DispatchOutcome {
        let outcome = self.document.dispatch(target, event);
        self.flush();
        outcome
    }

    /// Simulate user input: set the element's `value` property, write it
    /// through to the store for `:w` bindings and dispatch `input`.
    pub fn set_input_value(&mut self, target: NodeId, value: &str) -> DispatchOutcome {
        self.document.set_property(target, "value", Value::from(value));
        if let Some(source) = self.writable_binding(target, "value") {
            source.set(Value::from(value));
        }
        self.dispatch(target, "input")
    }
}

/// Post-order walk of the dependency graph.
fn collect_live(component: &ComponentRef, visited: &mut HashSet<usize>, out: &mut IndexMap<usize, ComponentRef>) {
    if !visited.insert(component.addr()) {
        return;
    }
    for (_, dep) in component.dependencies() {
        collect_live(&dep, visited, out);
    }
    out.insert(component.addr(), component.clone());
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("root", &self.root.as_ref().map(ComponentRef::id))
            .field("live", &self.live.len())
            .field("nodes", &self.document.len())
            .finish()
    }
}
