//! Directive evaluation.
//!
//! # Render Pass
//!
//! 1. The template's first `<root>` start tag is stamped with
//!    `data-component-id`.
//! 2. `{{key}}` placeholders are replaced from the component's props.
//! 3. The template is parsed into a directive tree. Slot blocks aimed at a
//!    dependency are rendered first and handed to that dependency, so the
//!    child sees them wherever its `@include` appears.
//! 4. The tree is walked once. Loops bind their aliases in a scope that
//!    shadows props; conditionals render every branch up front so a later
//!    store or signal change can swap branches without a full re-render.
//! 5. Constructor decorators (`[key ...]`, `[ref]`) are rewritten last.
//!
//! Every store value and signal the output depends on gets a listener that
//! enqueues the narrowest [`UpdateRequest`] able to refresh it. Signal
//! listeners are effects; the first run only records the dependency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use smallvec::{smallvec, SmallVec};

use super::condition::Condition;
use super::constructors;
use super::parser::{self, Conditional, Loop, Node, Slot};
use crate::app::{UpdateRequest, UpdateSender};
use crate::component::{component_id, ComponentRef, ComponentRegistry, HtmlComponent, SignalMap};
use crate::reactive::{Effect, Signal};
use crate::store::{Store, StoreManager, Subscription};
use crate::value::{Value, ValueMap};

/// Services a render reaches beyond the component itself.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub stores: StoreManager,
    pub components: ComponentRegistry,
    pub updates: UpdateSender,
    /// Unresolved directives log at `warn` instead of `debug`.
    pub dev_mode: bool,
}

/// Pre-rendered branches of one `data-condition` block.
#[derive(Debug, Clone)]
pub struct ConditionBlock {
    branches: Vec<(Option<Condition>, String)>,
    /// Loop aliases in effect where the block appeared.
    scope: ValueMap,
    signals: SignalMap,
}

impl ConditionBlock {
    /// Markup of the first branch whose condition holds, or of the `@else`
    /// branch. Empty when nothing matches.
    pub fn select(&self, stores: &StoreManager, props: &ValueMap) -> &str {
        for (condition, html) in &self.branches {
            let taken = match condition {
                Some(condition) => condition.evaluate(
                    stores,
                    |path| lookup(&self.scope, props, path),
                    |name| self.signals.get(name).map(Signal::get_untracked),
                ),
                None => true,
            };
            if taken {
                return html;
            }
        }
        ""
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }
}

/// Resolve a dotted path: the first segment from the loop scope, then from
/// props.
fn lookup(scope: &ValueMap, props: &ValueMap, path: &str) -> Option<Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let root = scope.get(head).or_else(|| props.get(head))?;
    match rest {
        Some(rest) => root.path(rest).cloned(),
        None => Some(root.clone()),
    }
}

fn split_store_path(path: &str) -> Option<(&str, &str, &str)> {
    let mut parts = path.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(module), Some(store), Some(key), None) => Some((module, store, key)),
        _ => None,
    }
}

/// Render `component` against `ctx`. `previous` holds the dependencies the
/// last render synthesized so inline includes can keep their instances.
pub(crate) fn render(
    component: &mut HtmlComponent,
    ctx: &RenderContext,
    previous: IndexMap<String, ComponentRef>,
) -> String {
    let stamped = stamp_root(&component.template, &component.id);
    let source = interpolate(&stamped, &component.props);
    let nodes = parser::parse(&source);

    let mut renderer = Renderer {
        component,
        ctx,
        previous,
        scope: ValueMap::new(),
        conditions_seen: HashMap::new(),
        inline_includes: 0,
        prop_includes: 0,
    };
    let mut out = String::with_capacity(source.len());
    renderer.provide_slots(&nodes);
    renderer.nodes(&nodes, &mut out);
    constructors::apply(&out)
}

/// Add `data-component-id` to the first `<root>` start tag. Tags that only
/// begin with `root`, such as `<rootline>`, are skipped.
fn stamp_root(template: &str, id: &str) -> String {
    let mut from = 0;
    while let Some(offset) = template[from..].find("<root") {
        let end = from + offset + "<root".len();
        match template.as_bytes().get(end) {
            Some(b) if *b == b'>' || *b == b'/' || b.is_ascii_whitespace() => {
                return format!("{} data-component-id=\"{id}\"{}", &template[..end], &template[end..]);
            }
            _ => from = end,
        }
    }
    template.to_string()
}

/// Replace `{{key}}` with the prop's text form. Unknown keys stay literal.
fn interpolate(template: &str, props: &ValueMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        out.push_str(&rest[..start]);
        match props.get(&after[..end]) {
            Some(value) => out.push_str(&value.to_string()),
            None => out.push_str(&rest[start..start + end + 4]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Add `data-key` to the first start tag of one loop iteration, unless it
/// already carries a key.
fn insert_data_key(body: &str, key: &str) -> String {
    let bytes = body.as_bytes();
    let Some(start) = (0..bytes.len().saturating_sub(1))
        .find(|&i| bytes[i] == b'<' && bytes[i + 1].is_ascii_alphabetic())
    else {
        return body.to_string();
    };
    let name_end = start
        + 1
        + body[start + 1..]
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'-')
            .count();
    let tag_end = body[name_end..].find('>').map_or(body.len(), |i| name_end + i);
    let attrs = &body[name_end..tag_end];
    if attrs.contains("data-key=") || attrs.contains("[key ") {
        return body.to_string();
    }
    format!("{} data-key=\"{key}\"{}", &body[..name_end], &body[name_end..])
}

/// Parse `key:"value"` pairs of an inline include.
fn parse_inline_props(src: &str) -> ValueMap {
    let mut props = ValueMap::new();
    let mut rest = src;
    while let Some(colon) = rest.find(":\"") {
        let key_start = rest.as_bytes()[..colon]
            .iter()
            .rposition(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
            .map_or(0, |i| i + 1);
        let value_start = colon + 2;
        let Some(len) = rest[value_start..].find('"') else { break };
        let key = &rest[key_start..colon];
        if !key.is_empty() {
            props.insert(key.to_string(), Value::from(&rest[value_start..value_start + len]));
        }
        rest = &rest[value_start + len + 1..];
    }
    props
}

struct Iteration<'a> {
    key: String,
    bindings: SmallVec<[(&'a str, Value); 2]>,
}

struct Renderer<'r> {
    component: &'r mut HtmlComponent,
    ctx: &'r RenderContext,
    previous: IndexMap<String, ComponentRef>,
    scope: ValueMap,
    conditions_seen: HashMap<String, usize>,
    inline_includes: usize,
    prop_includes: usize,
}

impl Renderer<'_> {
    fn nodes(&mut self, nodes: &[Node<'_>], out: &mut String) {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Include { name, source } => match self.component.dependencies.get(*name).cloned() {
                    Some(dep) => self.child(&dep, source, out),
                    None => {
                        self.unresolved("dependency", name);
                        out.push_str(source);
                    }
                },
                Node::IncludeInline { name, props, source } => self.inline_include(name, props, source, out),
                Node::Loop(looped) => self.looped(looped, out),
                Node::Conditional(conditional) => self.conditional(conditional, out),
                Node::Store { module, store, key, writable, source } => {
                    self.store(module, store, key, *writable, source, out)
                }
                Node::Signal { name, writable, source } => self.signal(name, *writable, source, out),
                Node::Prop { path, source } => self.prop(path, source, out),
                Node::Slot(slot) => self.slot(slot, out),
                Node::Event { event, modifiers, handler } => {
                    out.push_str(&format!("data-on-{event}=\"{handler}\""));
                    if !modifiers.is_empty() {
                        out.push_str(&format!(" data-on-{event}-modifiers=\"{}\"", modifiers.replace('.', ",")));
                    }
                }
            }
        }
    }

    fn unresolved(&self, what: &str, name: &str) {
        if self.ctx.dev_mode {
            tracing::warn!(component = %self.component.name, what, name, "unresolved directive left as text");
        } else {
            tracing::debug!(component = %self.component.name, what, name, "unresolved directive left as text");
        }
    }

    fn child(&self, dep: &ComponentRef, source: &str, out: &mut String) {
        match dep.try_render(self.ctx) {
            Some(html) => out.push_str(&html),
            None => {
                tracing::warn!(
                    component = %self.component.name,
                    child = dep.id(),
                    "included component is already rendering, left as text"
                );
                out.push_str(source);
            }
        }
    }

    fn inline_include(&mut self, name: &str, props_src: &str, source: &str, out: &mut String) {
        let props = parse_inline_props(props_src);
        let placeholder = format!("inc-{name}-{}", self.inline_includes);
        self.inline_includes += 1;

        let id = component_id(name, &props);
        let reused = match self.previous.get(&placeholder) {
            Some(previous) if previous.id() == id => self.previous.shift_remove(&placeholder),
            _ => None,
        };
        let child = match reused {
            Some(child) => child,
            None => match self.ctx.components.load(name, props) {
                Ok(child) => child,
                Err(err) => {
                    tracing::debug!(component = %self.component.name, %err, "inline include failed");
                    self.unresolved("component", name);
                    out.push_str(source);
                    return;
                }
            },
        };
        self.component.attach_dependency(placeholder, child.clone());
        self.child(&child, source, out);
    }

    fn subscribe_rerender(&mut self, store: &Store, key: &str) {
        let updates = self.ctx.updates.clone();
        let component_id = self.component.id.to_string();
        let subscription = store.on_change(key, move |_| {
            updates.send(UpdateRequest::Rerender { component_id: component_id.clone() })
        });
        self.component.subscriptions.push(subscription);
    }

    fn lookup(&self, path: &str) -> Option<Value> {
        lookup(&self.scope, &self.component.props, path)
    }

    /// Range bound: an integer literal, a store reference or a prop.
    fn bound(&mut self, expr: &str) -> Option<i64> {
        let expr = expr.trim();
        if let Ok(n) = expr.parse::<i64>() {
            return Some(n);
        }
        if let Some((module, name, key)) = expr.strip_prefix("store:").and_then(split_store_path) {
            if let Some(store) = self.ctx.stores.get_store(module, name) {
                let value = store.get(key);
                if let Some(n) = value.as_i64() {
                    self.subscribe_rerender(&store, key);
                    return Some(n);
                }
            }
        }
        self.lookup(expr)?.as_i64()
    }

    fn iterations<'a>(&mut self, looped: &Loop<'a>) -> Option<Vec<Iteration<'a>>> {
        let first = *looped.aliases.first()?;
        let second = looped.aliases.get(1).copied();

        if let Some((start, end)) = looped.expr.split_once("..") {
            let start = self.bound(start)?;
            let end = self.bound(end)?;
            return Some(
                (start..=end)
                    .map(|i| Iteration { key: i.to_string(), bindings: smallvec![(first, Value::Int(i))] })
                    .collect(),
            );
        }

        let collection = if let Some(path) = looped.expr.strip_prefix("store:") {
            let (module, name, key) = split_store_path(path)?;
            let Some(store) = self.ctx.stores.get_store(module, name) else {
                self.unresolved("store", path);
                return None;
            };
            self.subscribe_rerender(&store, key);
            store.get(key)
        } else {
            match self.lookup(looped.expr) {
                Some(value) => value,
                None => {
                    self.unresolved("prop", looped.expr);
                    return None;
                }
            }
        };

        let item_alias = second.unwrap_or(first);
        let mut iterations = Vec::new();
        match collection {
            Value::Null => {}
            Value::List(items) => {
                for (index, item) in items.into_iter().enumerate() {
                    if let Value::Component(child) = &item {
                        self.component.attach_dependency(format!("for-{item_alias}-{index}"), child.clone());
                    }
                    let bindings = match second {
                        Some(second) => smallvec![(first, Value::from(index)), (second, item)],
                        None => smallvec![(first, item)],
                    };
                    iterations.push(Iteration { key: index.to_string(), bindings });
                }
            }
            Value::Map(map) => {
                let mut entries: Vec<(String, Value)> = map.into_iter().collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                for (index, (key, value)) in entries.into_iter().enumerate() {
                    let bindings = match second {
                        Some(second) => {
                            if let Value::Component(child) = &value {
                                self.component
                                    .attach_dependency(format!("for-{second}-{index}"), child.clone());
                            }
                            smallvec![(first, Value::from(key.as_str())), (second, value)]
                        }
                        None => smallvec![(first, Value::from(key.as_str()))],
                    };
                    iterations.push(Iteration { key, bindings });
                }
            }
            other => {
                tracing::debug!(expr = looped.expr, value = %other, "loop collection is not iterable");
                return None;
            }
        }
        Some(iterations)
    }

    fn looped(&mut self, looped: &Loop<'_>, out: &mut String) {
        let Some(iterations) = self.iterations(looped) else {
            out.push_str(looped.opener);
            self.nodes(&looped.body, out);
            out.push_str(looped.closer);
            return;
        };

        for iteration in iterations {
            let shadowed: SmallVec<[(String, Option<Value>); 2]> = iteration
                .bindings
                .into_iter()
                .map(|(alias, value)| (alias.to_string(), self.scope.insert(alias.to_string(), value)))
                .collect();

            let mut body = String::new();
            self.nodes(&looped.body, &mut body);

            for (alias, old) in shadowed.into_iter().rev() {
                match old {
                    Some(old) => {
                        self.scope.insert(alias, old);
                    }
                    None => {
                        self.scope.shift_remove(&alias);
                    }
                }
            }
            out.push_str(&insert_data_key(&body, &iteration.key));
        }
    }

    fn store(&mut self, module: &str, name: &str, key: &str, writable: bool, source: &str, out: &mut String) {
        let Some(store) = self.ctx.stores.get_store(module, name) else {
            self.unresolved("store", &format!("{module}.{name}"));
            out.push_str(source);
            return;
        };
        let binding = format!("{module}.{name}.{key}");
        let value = store.get(key);

        let updates = self.ctx.updates.clone();
        let component_id = self.component.id.to_string();
        let bound = binding.clone();
        let subscription = store.on_change(key, move |_| {
            updates.send(UpdateRequest::StoreBinding { component_id: component_id.clone(), binding: bound.clone() })
        });
        self.component.subscriptions.push(subscription);

        if writable {
            // Two-way bindings are wired up when the markup is attached.
            out.push_str(source);
        } else {
            out.push_str(&format!("<span data-store=\"{binding}\">{value}</span>"));
        }
    }

    fn signal(&mut self, name: &str, writable: bool, source: &str, out: &mut String) {
        let Some(signal) = self.component.signals.get(name).cloned() else {
            self.unresolved("signal", name);
            out.push_str(source);
            return;
        };
        let value = signal.get_untracked();

        let component_id = self.component.id.to_string();
        let bound = name.to_string();
        self.watch_signal(signal, move || UpdateRequest::SignalBinding {
            component_id: component_id.clone(),
            name: bound.clone(),
        });

        if writable {
            out.push_str(source);
        } else {
            out.push_str(&format!("<span data-signal=\"{name}\">{value}</span>"));
        }
    }

    /// Enqueue `request()` every time `signal` is written after this render.
    fn watch_signal<F>(&mut self, signal: Signal<Value>, request: F)
    where
        F: Fn() -> UpdateRequest + Send + Sync + 'static,
    {
        let updates = self.ctx.updates.clone();
        let primed = AtomicBool::new(false);
        let effect = Effect::new(move || {
            signal.get();
            if primed.swap(true, Ordering::SeqCst) {
                updates.send(request());
            }
        });
        self.component.subscriptions.push(Subscription::new(move || effect.stop()));
    }

    /// The dependency a `@slot:dep[.name]` block fills, with the slot name.
    fn slot_provision<'s>(&self, target: &'s str) -> Option<(ComponentRef, &'s str)> {
        let (dep, name) = target.split_once('.').unwrap_or((target, "default"));
        self.component.dependencies.get(dep).cloned().map(|dep| (dep, name))
    }

    /// Render every slot block aimed at a dependency and hand it over.
    /// Loop bodies are not searched.
    fn provide_slots(&mut self, nodes: &[Node<'_>]) {
        for node in nodes {
            match node {
                Node::Slot(slot) => match self.slot_provision(slot.target) {
                    Some((dep, name)) => {
                        let mut html = String::new();
                        self.nodes(&slot.body, &mut html);
                        if !dep.provide_slot(name, html) {
                            tracing::warn!(component = %self.component.name, slot = name, "slot target is rendering, slot dropped");
                        }
                    }
                    None => self.provide_slots(&slot.body),
                },
                Node::Conditional(conditional) => {
                    for branch in &conditional.branches {
                        self.provide_slots(&branch.body);
                    }
                }
                _ => {}
            }
        }
    }

    fn slot(&mut self, slot: &Slot<'_>, out: &mut String) {
        if self.slot_provision(slot.target).is_some() {
            return;
        }
        if slot.target.contains('.') {
            self.unresolved("dependency", slot.target);
            out.push_str(slot.opener);
            self.nodes(&slot.body, out);
            out.push_str(slot.closer);
            return;
        }
        let name = if slot.target.is_empty() { "default" } else { slot.target };
        match self.component.slots.get(name).cloned() {
            Some(html) => out.push_str(&html),
            None => self.nodes(&slot.body, out),
        }
    }

    fn prop(&mut self, path: &str, source: &str, out: &mut String) {
        let head = path.split('.').next().unwrap_or(path);
        let from_scope = self.scope.contains_key(head);
        match self.lookup(path) {
            Some(Value::Component(child)) => {
                if !from_scope {
                    let placeholder = format!("prop-{path}-{}", self.prop_includes);
                    self.prop_includes += 1;
                    self.component.attach_dependency(placeholder, child.clone());
                }
                self.child(&child, source, out);
            }
            Some(value) => out.push_str(&value.to_string()),
            None => {
                self.unresolved("prop", path);
                out.push_str(source);
            }
        }
    }

    fn conditional(&mut self, conditional: &Conditional<'_>, out: &mut String) {
        let lines: Vec<&str> = conditional.branches.iter().map(|b| b.line.unwrap_or("")).collect();
        let mut id = format!("cond-{}", hex::encode(Sha256::digest(lines.join("|").as_bytes())));
        let seen = self.conditions_seen.entry(id.clone()).or_insert(0);
        *seen += 1;
        if *seen > 1 {
            id = format!("{id}-{seen}");
        }

        let mut branches = Vec::with_capacity(conditional.branches.len());
        let mut chosen = None;
        for (index, branch) in conditional.branches.iter().enumerate() {
            let mut html = String::new();
            self.nodes(&branch.body, &mut html);
            let html = constructors::apply(&html);

            let condition = branch.line.map(Condition::parse);
            let taken = match &condition {
                Some(condition) => {
                    if let Some((module, name, key)) = condition.store_dependency() {
                        if let Some(store) = self.ctx.stores.get_store(module, name) {
                            self.subscribe_condition(&store, key, &id);
                        }
                    }
                    if let Some(name) = condition.signal_dependency() {
                        match self.component.signals.get(name).cloned() {
                            Some(signal) => {
                                let component_id = self.component.id.to_string();
                                let condition_id = id.clone();
                                self.watch_signal(signal, move || UpdateRequest::Condition {
                                    component_id: component_id.clone(),
                                    condition_id: condition_id.clone(),
                                });
                            }
                            None => self.unresolved("signal", name),
                        }
                    }
                    condition.evaluate(
                        &self.ctx.stores,
                        |path| lookup(&self.scope, &self.component.props, path),
                        |name| self.component.signals.get(name).map(Signal::get_untracked),
                    )
                }
                None => true,
            };
            if taken && chosen.is_none() {
                chosen = Some(index);
            }
            branches.push((condition, html));
        }

        let selected = chosen.map_or("", |index| branches[index].1.as_str());
        let signals = self.component.signals.clone();
        out.push_str(&format!("<div data-condition=\"{id}\">{selected}</div>"));
        self.component
            .conditions
            .insert(id, ConditionBlock { branches, scope: self.scope.clone(), signals });
    }

    fn subscribe_condition(&mut self, store: &Store, key: &str, condition_id: &str) {
        let updates = self.ctx.updates.clone();
        let component_id = self.component.id.to_string();
        let condition_id = condition_id.to_string();
        let subscription = store.on_change(key, move |_| {
            updates.send(UpdateRequest::Condition {
                component_id: component_id.clone(),
                condition_id: condition_id.clone(),
            })
        });
        self.component.subscriptions.push(subscription);
    }
}
