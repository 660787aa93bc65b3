//! Event Bindings
//!
//! Rendered markup declares its handlers with `data-on-<event>="handler"`
//! attributes (plus an optional `data-on-<event>-modifiers` list). Rather than
//! scanning every node after each patch, the registry compiles the markup of
//! a template once into an ordered list of [`Binding`]s: a child-index path
//! from the component's top-level nodes to the element, the event, the
//! handler name and its modifiers.
//!
//! # Sharing
//!
//! The compiled list is keyed by template name and stored as `Arc<[Binding]>`,
//! so every instance of a template shares one allocation and associating a
//! component id with its bindings is a single map insert.
//!
//! # Attaching
//!
//! [`attach_bindings`] resolves each path against the live tree and checks
//! that the element still carries the expected attribute. Loops and
//! conditionals change the shape of the markup between renders, so a sweep
//! afterwards picks up any `data-on-*` attribute that no compiled binding
//! covered.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::events::{HandlerRegistry, Listener, Modifiers};
use super::node::{Document, NodeId};
use super::parse::{parse, VNode};

const EVENT_PREFIX: &str = "data-on-";
const MODIFIERS_SUFFIX: &str = "-modifiers";

/// One compiled event binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Child indices from the component's top-level node list.
    pub path: Vec<usize>,
    pub event: String,
    pub handler: String,
    pub modifiers: Modifiers,
}

/// Events declared by an element's attributes, as `(event, handler, modifiers)`.
fn declared_events<'a>(
    attrs: impl Iterator<Item = (&'a str, &'a str)> + Clone,
) -> Vec<(String, String, Modifiers)> {
    attrs
        .clone()
        .filter_map(|(name, handler)| {
            let event = name.strip_prefix(EVENT_PREFIX)?;
            if event.is_empty() || event.ends_with(MODIFIERS_SUFFIX) || handler.is_empty() {
                return None;
            }
            let modifiers_attr = format!("{name}{MODIFIERS_SUFFIX}");
            let modifiers = attrs
                .clone()
                .find(|(k, _)| *k == modifiers_attr)
                .map(|(_, v)| Modifiers::parse(v.split(',')))
                .unwrap_or_default();
            Some((event.to_string(), handler.to_string(), modifiers))
        })
        .collect()
}

/// Compile the bindings declared by `markup`.
pub fn compile(markup: &str) -> Vec<Binding> {
    fn walk(nodes: &[VNode], path: &mut Vec<usize>, out: &mut Vec<Binding>) {
        for (index, node) in nodes.iter().enumerate() {
            let VNode::Element { attrs, children, .. } = node else {
                continue;
            };
            path.push(index);
            let attrs = attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()));
            for (event, handler, modifiers) in declared_events(attrs) {
                out.push(Binding { path: path.clone(), event, handler, modifiers });
            }
            walk(children, path, out);
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&parse(markup), &mut Vec::new(), &mut out);
    out
}

/// Compiled bindings per template name, and the association of component ids
/// with them.
#[derive(Clone, Default)]
pub struct BindingRegistry {
    templates: Arc<DashMap<String, Arc<[Binding]>>>,
    components: Arc<DashMap<String, Arc<[Binding]>>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `component_id` with the bindings of `template_name`,
    /// compiling them from `markup` the first time the template is seen.
    pub fn register(&self, component_id: &str, template_name: &str, markup: &str) -> Arc<[Binding]> {
        let bindings = self
            .templates
            .entry(template_name.to_string())
            .or_insert_with(|| {
                let compiled: Arc<[Binding]> = compile(markup).into();
                tracing::debug!(template = template_name, bindings = compiled.len(), "compiled bindings");
                compiled
            })
            .clone();
        self.components.insert(component_id.to_string(), Arc::clone(&bindings));
        bindings
    }

    pub fn get(&self, component_id: &str) -> Option<Arc<[Binding]>> {
        self.components.get(component_id).map(|b| Arc::clone(b.value()))
    }

    pub fn remove(&self, component_id: &str) -> Option<Arc<[Binding]>> {
        self.components.remove(component_id).map(|(_, b)| b)
    }

    /// Number of distinct templates compiled so far.
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }
}

impl fmt::Debug for BindingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingRegistry")
            .field("templates", &self.templates.len())
            .field("components", &self.components.len())
            .finish()
    }
}

fn resolve(doc: &Document, roots: &[NodeId], path: &[usize]) -> Option<NodeId> {
    let (first, rest) = path.split_first()?;
    let mut node = *roots.get(*first)?;
    for index in rest {
        node = *doc.children(node).get(*index)?;
    }
    Some(node)
}

#[allow(clippy::too_many_arguments)]
fn listen(
    doc: &mut Document,
    node: NodeId,
    owner: &str,
    event: &str,
    handler_name: &str,
    modifiers: Modifiers,
    handlers: &HandlerRegistry,
    dev_mode: bool,
) -> bool {
    let Some(handler) = handlers.get(handler_name) else {
        if dev_mode {
            tracing::warn!(component = owner, handler = handler_name, event, "no handler registered");
        } else {
            tracing::debug!(component = owner, handler = handler_name, event, "no handler registered");
        }
        return false;
    };
    doc.add_listener(node, Listener::new(owner, event, handler_name, modifiers, handler))
}

/// Attach `bindings` below `roots`, then sweep the subtrees for declared
/// events the compiled paths did not reach. Returns the number of listeners
/// attached.
pub fn attach_bindings(
    doc: &mut Document,
    roots: &[NodeId],
    owner: &str,
    bindings: &[Binding],
    handlers: &HandlerRegistry,
    dev_mode: bool,
) -> usize {
    let mut attached = 0;

    for binding in bindings {
        let Some(node) = resolve(doc, roots, &binding.path) else {
            continue;
        };
        let attr = format!("{EVENT_PREFIX}{}", binding.event);
        if doc.attr(node, &attr) != Some(binding.handler.as_str()) {
            continue;
        }
        if listen(doc, node, owner, &binding.event, &binding.handler, binding.modifiers, handlers, dev_mode) {
            attached += 1;
        }
    }

    let nodes: Vec<NodeId> = roots.iter().flat_map(|root| doc.descendants(*root)).collect();
    for node in nodes {
        let declared = match doc.element(node) {
            Some(el) => declared_events(el.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            None => continue,
        };
        for (event, handler, modifiers) in declared {
            let present = doc
                .listeners(node)
                .iter()
                .any(|l| l.event == event && l.handler_name == handler);
            if !present && listen(doc, node, owner, &event, &handler, modifiers, handlers, dev_mode) {
                attached += 1;
            }
        }
    }

    attached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{patch_children, Event};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn compiles_paths_and_modifiers() {
        let bindings = compile(
            r#"<root><p>hi</p><button data-on-click="save" data-on-click-modifiers="preventDefault,once">s</button></root>"#,
        );
        assert_eq!(bindings.len(), 1);
        let b = &bindings[0];
        assert_eq!(b.path, vec![0, 1]);
        assert_eq!(b.event, "click");
        assert_eq!(b.handler, "save");
        assert!(b.modifiers.prevent_default && b.modifiers.once);
    }

    #[test]
    fn bindings_are_shared_per_template() {
        let registry = BindingRegistry::new();
        let a = registry.register("c1", "Counter", r#"<button data-on-click="inc"></button>"#);
        let b = registry.register("c2", "Counter", "<p>ignored</p>");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.template_count(), 1);
        assert!(registry.get("c2").is_some());
        assert!(registry.remove("c1").is_some());
        assert!(registry.get("c1").is_none());
    }

    #[test]
    fn attaches_compiled_and_swept_bindings() {
        let markup = r#"<div><button data-on-click="inc">+</button></div>"#;
        let mut doc = Document::new();
        let container = doc.create_element("div");
        patch_children(&mut doc, container, &parse(markup));

        let count = Arc::new(AtomicUsize::new(0));
        let handlers = HandlerRegistry::new();
        let c = count.clone();
        handlers.register("inc", move |_: &mut Event| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        // Compiled against a different shape: the path misses, the sweep finds it.
        let stale = compile(r#"<div><p></p><button data-on-click="inc">+</button></div>"#);
        let roots = doc.children(container).to_vec();
        assert_eq!(attach_bindings(&mut doc, &roots, "c", &stale, &handlers, false), 1);
        // Re-attaching is idempotent.
        assert_eq!(attach_bindings(&mut doc, &roots, "c", &compile(markup), &handlers, false), 0);

        let button = doc.children(roots[0])[0];
        doc.dispatch(button, "click");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fired_once_listener_is_not_reattached() {
        let markup = r#"<button data-on-click="go" data-on-click-modifiers="once">go</button>"#;
        let mut doc = Document::new();
        let container = doc.create_element("div");
        patch_children(&mut doc, container, &parse(markup));

        let count = Arc::new(AtomicUsize::new(0));
        let handlers = HandlerRegistry::new();
        let c = count.clone();
        handlers.register("go", move |_: &mut Event| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let roots = doc.children(container).to_vec();
        let bindings = compile(markup);
        assert_eq!(attach_bindings(&mut doc, &roots, "c", &bindings, &handlers, false), 1);
        doc.dispatch(roots[0], "click");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // A later patch of the same subtree sweeps the node again.
        doc.clear_listeners_within(container);
        assert_eq!(attach_bindings(&mut doc, &roots, "c", &bindings, &handlers, false), 0);
        doc.dispatch(roots[0], "click");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // A fresh node starts armed.
        doc.remove(roots[0]);
        patch_children(&mut doc, container, &parse(markup));
        let roots = doc.children(container).to_vec();
        assert_eq!(attach_bindings(&mut doc, &roots, "c", &bindings, &handlers, false), 1);
        doc.dispatch(roots[0], "click");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_handlers_are_skipped() {
        let mut doc = Document::new();
        let container = doc.create_element("div");
        patch_children(&mut doc, container, &parse(r#"<a data-on-click="nope">x</a>"#));
        let roots = doc.children(container).to_vec();
        let attached = attach_bindings(&mut doc, &roots, "c", &[], &HandlerRegistry::new(), true);
        assert_eq!(attached, 0);
        assert_eq!(doc.listener_count(), 0);
    }
}
