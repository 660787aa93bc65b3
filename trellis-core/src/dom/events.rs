//! Event listeners and dispatch.
//!
//! Handlers are registered by name in a [`HandlerRegistry`]; the binding
//! layer attaches [`Listener`]s to nodes, owned by a component id so that a
//! component's listeners can be torn down before its subtree is patched.
//!
//! [`Document::dispatch`] bubbles an event from its target up to the root,
//! honoring the `stopPropagation`, `preventDefault` and `once` modifiers.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::node::{Document, NodeId};

/// Callback invoked for a dispatched event.
pub type Handler = Arc<dyn Fn(&mut Event) + Send + Sync>;

/// An event travelling through the tree.
#[derive(Debug, Clone)]
pub struct Event {
    name: String,
    target: NodeId,
    current_target: NodeId,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl Event {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    /// The node whose listener is running.
    pub fn current_target(&self) -> NodeId {
        self.current_target
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Modifiers parsed from `data-on-<event>-modifiers`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub stop_propagation: bool,
    pub prevent_default: bool,
    pub once: bool,
}

impl Modifiers {
    /// Parse a list of modifier names. Unknown names are ignored.
    pub fn parse<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut mods = Self::default();
        for name in names {
            match name.trim() {
                "stopPropagation" | "stop" => mods.stop_propagation = true,
                "preventDefault" | "prevent" => mods.prevent_default = true,
                "once" => mods.once = true,
                other => tracing::debug!(modifier = other, "ignoring unknown event modifier"),
            }
        }
        mods
    }
}

/// A handler attached to a node.
#[derive(Clone)]
pub struct Listener {
    pub(crate) owner: String,
    pub(crate) event: String,
    pub(crate) handler_name: String,
    pub(crate) modifiers: Modifiers,
    pub(crate) handler: Handler,
}

impl Listener {
    pub fn new(
        owner: impl Into<String>,
        event: impl Into<String>,
        handler_name: impl Into<String>,
        modifiers: Modifiers,
        handler: Handler,
    ) -> Self {
        Self {
            owner: owner.into(),
            event: event.into(),
            handler_name: handler_name.into(),
            modifiers,
            handler,
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("owner", &self.owner)
            .field("event", &self.event)
            .field("handler", &self.handler_name)
            .field("modifiers", &self.modifiers)
            .finish()
    }
}

/// Named event handlers, shared by every component of an application.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<DashMap<String, Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `name`.
    pub fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&mut Event) + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).map(|h| Arc::clone(h.value()))
    }

    pub fn remove(&self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Result of [`Document::dispatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Number of listeners that ran.
    pub handled: usize,
    pub default_prevented: bool,
}

impl Document {
    /// Attach a listener. A node never holds two listeners for the same
    /// event and handler name, whoever owns them, and a `once` listener that
    /// already fired on the node is not attached again.
    pub fn add_listener(&mut self, node: NodeId, listener: Listener) -> bool {
        if !self.contains(node) {
            return false;
        }
        if listener.modifiers.once
            && self.consumed_once.get(&node).is_some_and(|fired| {
                fired
                    .iter()
                    .any(|(event, handler)| *event == listener.event && *handler == listener.handler_name)
            })
        {
            return false;
        }
        let list = self.listeners.entry(node).or_default();
        if list
            .iter()
            .any(|l| l.event == listener.event && l.handler_name == listener.handler_name)
        {
            return false;
        }
        list.push(listener);
        true
    }

    /// Remove every listener owned by `owner`. Returns how many were removed.
    pub fn remove_listeners(&mut self, owner: &str) -> usize {
        let mut removed = 0;
        self.listeners.retain(|_, list| {
            let before = list.len();
            list.retain(|l| l.owner != owner);
            removed += before - list.len();
            !list.is_empty()
        });
        removed
    }

    /// Remove listeners owned by `owner` on nodes at or below `root`.
    pub fn remove_listeners_within(&mut self, owner: &str, root: NodeId) -> usize {
        let nodes: Vec<NodeId> = self
            .listeners
            .keys()
            .copied()
            .filter(|node| self.is_inclusive_descendant(*node, root))
            .collect();
        let mut removed = 0;
        for node in nodes {
            if let Some(list) = self.listeners.get_mut(&node) {
                let before = list.len();
                list.retain(|l| l.owner != owner);
                removed += before - list.len();
                if list.is_empty() {
                    self.listeners.remove(&node);
                }
            }
        }
        removed
    }

    /// Remove every listener on nodes at or below `root`, whoever owns them.
    pub fn clear_listeners_within(&mut self, root: NodeId) -> usize {
        let nodes: Vec<NodeId> = self
            .listeners
            .keys()
            .copied()
            .filter(|node| self.is_inclusive_descendant(*node, root))
            .collect();
        nodes
            .into_iter()
            .filter_map(|node| self.listeners.remove(&node))
            .map(|list| list.len())
            .sum()
    }

    pub fn listeners(&self, node: NodeId) -> &[Listener] {
        self.listeners.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    /// Dispatch `event` at `target` and bubble it up to the root.
    pub fn dispatch(&mut self, target: NodeId, event: &str) -> DispatchOutcome {
        let mut ev = Event {
            name: event.to_string(),
            target,
            current_target: target,
            default_prevented: false,
            propagation_stopped: false,
        };
        let mut outcome = DispatchOutcome::default();
        let mut current = Some(target);

        while let Some(node) = current {
            let matching: Vec<Listener> = self
                .listeners(node)
                .iter()
                .filter(|l| l.event == event)
                .cloned()
                .collect();

            ev.current_target = node;
            for listener in matching {
                if listener.modifiers.once {
                    if let Some(list) = self.listeners.get_mut(&node) {
                        list.retain(|l| !(l.event == listener.event && l.handler_name == listener.handler_name));
                    }
                    self.consumed_once
                        .entry(node)
                        .or_default()
                        .push((listener.event.clone(), listener.handler_name.clone()));
                }
                if listener.modifiers.prevent_default {
                    ev.prevent_default();
                }
                if listener.modifiers.stop_propagation {
                    ev.stop_propagation();
                }
                tracing::trace!(event, handler = %listener.handler_name, "dispatching");
                (listener.handler)(&mut ev);
                outcome.handled += 1;
            }

            if ev.propagation_stopped {
                break;
            }
            current = self.parent(node);
        }

        outcome.default_prevented = ev.default_prevented;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, Arc::new(move |_: &mut Event| {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn tree() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let button = doc.create_element("button");
        doc.append_child(outer, button);
        (doc, outer, button)
    }

    #[test]
    fn events_bubble_to_ancestors() {
        let (mut doc, outer, button) = tree();
        let (outer_count, outer_handler) = counter();
        let (button_count, button_handler) = counter();
        doc.add_listener(outer, Listener::new("c", "click", "outer", Modifiers::default(), outer_handler));
        doc.add_listener(button, Listener::new("c", "click", "inner", Modifiers::default(), button_handler));

        let outcome = doc.dispatch(button, "click");
        assert_eq!(outcome.handled, 2);
        assert_eq!(outer_count.load(Ordering::SeqCst), 1);
        assert_eq!(button_count.load(Ordering::SeqCst), 1);

        doc.dispatch(button, "keyup");
        assert_eq!(button_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_propagation_and_prevent_default() {
        let (mut doc, outer, button) = tree();
        let (outer_count, outer_handler) = counter();
        let (_, button_handler) = counter();
        let mods = Modifiers::parse(["stopPropagation", "preventDefault"]);
        doc.add_listener(outer, Listener::new("c", "click", "outer", Modifiers::default(), outer_handler));
        doc.add_listener(button, Listener::new("c", "click", "inner", mods, button_handler));

        let outcome = doc.dispatch(button, "click");
        assert!(outcome.default_prevented);
        assert_eq!(outer_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn once_listener_fires_a_single_time() {
        let (mut doc, _, button) = tree();
        let (count, handler) = counter();
        doc.add_listener(button, Listener::new("c", "click", "h", Modifiers::parse(["once"]), handler));
        doc.dispatch(button, "click");
        doc.dispatch(button, "click");
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(doc.listener_count(), 0);
    }

    #[test]
    fn listeners_are_removed_by_owner() {
        let (mut doc, outer, button) = tree();
        let (_, h1) = counter();
        let (_, h2) = counter();
        doc.add_listener(outer, Listener::new("parent", "click", "a", Modifiers::default(), h1));
        doc.add_listener(button, Listener::new("child", "click", "b", Modifiers::default(), h2.clone()));
        assert!(!doc.add_listener(button, Listener::new("parent", "click", "b", Modifiers::default(), h2)));

        assert_eq!(doc.remove_listeners("child"), 1);
        assert_eq!(doc.listener_count(), 1);
        assert_eq!(doc.remove_listeners_within("parent", button), 0);
        assert_eq!(doc.remove_listeners_within("parent", outer), 1);
    }

    #[test]
    fn handler_registry_lookup() {
        let registry = HandlerRegistry::new();
        registry.register("save", |ev: &mut Event| ev.prevent_default());
        assert!(registry.get("save").is_some());
        assert!(registry.get("missing").is_none());
        assert!(registry.remove("save"));
    }
}
