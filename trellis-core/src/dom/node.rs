//! Document Nodes
//!
//! The live tree is an arena of nodes addressed by [`NodeId`]. Ids stay valid
//! for the lifetime of the node they name: moving a node keeps its id, and a
//! removed node's slot is only reused under a new generation, so a stale id
//! never aliases a newer node.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;

use crate::value::Value;

/// Stable handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Get the raw slot index.
    pub fn raw(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// An element: tag, ordered attributes and out-of-band properties.
///
/// Properties model state that lives on the node but not in its markup, such
/// as the current value of an input. The reconciler never touches them.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: IndexMap<String, String>,
    pub props: HashMap<String, Value>,
}

/// The kind of node.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Element(Element),
    Text(String),
    Comment(String),
}

/// A node together with its tree links.
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Counters of mutating operations, used to assert minimal patches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomStats {
    /// Nodes allocated, counting every node of an inserted subtree.
    pub created: usize,
    /// Subtrees removed.
    pub removed: usize,
    /// Attached nodes moved to another position.
    pub moved: usize,
    pub attr_writes: usize,
    pub text_writes: usize,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// A mutable document tree.
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    stats: DomStats,
    pub(crate) listeners: HashMap<NodeId, Vec<super::events::Listener>>,
    /// `(event, handler)` pairs of `once` listeners that already fired.
    pub(crate) consumed_once: HashMap<NodeId, Vec<(String, String)>>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            stats: DomStats::default(),
            listeners: HashMap::new(),
            consumed_once: HashMap::new(),
        }
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.stats.created += 1;
        let node = Node { kind, parent: None, children: Vec::new() };
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation += 1;
                slot.node = Some(node);
                NodeId { index, generation: slot.generation }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot { generation: 0, node: Some(node) });
                NodeId { index, generation: 0 }
            }
        }
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element(Element {
            tag: tag.into(),
            ..Element::default()
        }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Comment(text.into()))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.node(id)?.kind() {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attrs.get(name).map(String::as_str)
    }

    /// Set an attribute, counting the write only if the value changed.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let Some(el) = self.element_mut(id) else {
            return;
        };
        if el.attrs.get(name).map(String::as_str) == Some(value) {
            return;
        }
        el.attrs.insert(name.to_string(), value.to_string());
        self.stats.attr_writes += 1;
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(el) = self.element_mut(id) {
            if el.attrs.shift_remove(name).is_some() {
                self.stats.attr_writes += 1;
            }
        }
    }

    pub fn property(&self, id: NodeId, name: &str) -> Option<&Value> {
        self.element(id)?.props.get(name)
    }

    pub fn set_property(&mut self, id: NodeId, name: impl Into<String>, value: Value) {
        if let Some(el) = self.element_mut(id) {
            el.props.insert(name.into(), value);
        }
    }

    /// Text content of a text or comment node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.node(id)?.kind() {
            NodeKind::Text(t) | NodeKind::Comment(t) => Some(t),
            NodeKind::Element(_) => None,
        }
    }

    /// Overwrite a text or comment node's content.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(node) = self.node_mut(id) {
            if let NodeKind::Text(t) | NodeKind::Comment(t) = &mut node.kind {
                t.clear();
                t.push_str(text);
                self.stats.text_writes += 1;
            }
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(NodeKind::Text(t)) = self.node(node).map(Node::kind) {
                out.push_str(t);
            }
        }
        out
    }

    /// Detach `child` from its current parent without freeing it.
    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = None;
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let len = self.children(parent).len();
        self.insert_at(parent, child, len);
    }

    /// Insert `child` at `index` among `parent`'s children (clamped to the end).
    /// A child that is already attached somewhere is moved.
    pub fn insert_at(&mut self, parent: NodeId, child: NodeId, index: usize) {
        if !self.contains(parent) || !self.contains(child) || parent == child {
            return;
        }
        if self.parent(child).is_some() {
            self.detach(child);
            self.stats.moved += 1;
        }
        if let Some(p) = self.node_mut(parent) {
            let index = index.min(p.children.len());
            p.children.insert(index, child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
    }

    /// Put `replacement` where `old` is and free `old`'s subtree.
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) {
        if let Some(parent) = self.parent(old) {
            let index = self.children(parent).iter().position(|c| *c == old).unwrap_or(0);
            self.remove(old);
            self.insert_at(parent, replacement, index);
        } else {
            self.remove(old);
        }
    }

    /// Detach and free a node with its whole subtree.
    pub fn remove(&mut self, id: NodeId) {
        if !self.contains(id) {
            return;
        }
        self.detach(id);
        self.stats.removed += 1;

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.listeners.remove(&current);
            self.consumed_once.remove(&current);
            let slot = &mut self.slots[current.index as usize];
            if let Some(node) = slot.node.take() {
                stack.extend(node.children);
                self.free.push(current.index);
            }
        }
    }

    /// `id` and every node below it, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// First element at or below `root` whose attribute `name` equals `value`.
    pub fn find_by_attr(&self, root: NodeId, name: &str, value: &str) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|id| self.attr(*id, name) == Some(value))
    }

    /// Every element at or below `root` whose attribute `name` equals `value`.
    pub fn find_all_by_attr(&self, root: NodeId, name: &str, value: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.attr(*id, name) == Some(value))
            .collect()
    }

    /// Whether `node` is `ancestor` or lies below it.
    pub fn is_inclusive_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    pub fn stats(&self) -> DomStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = DomStats::default();
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.len())
            .field("stats", &self.stats)
            .finish()
    }
}
