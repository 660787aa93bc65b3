//! Keyed Reconciliation
//!
//! Patches a live subtree so that it matches a freshly parsed [`VNode`]
//! forest while touching as few nodes as possible.
//!
//! # How `patch_children` Works
//!
//! 1. Old children carrying a non-empty `data-key` are indexed by key.
//! 2. New children are walked in order with a running position `index`:
//!    - keyed and found: the old node is patched in place and moved to
//!      `index` only if it is not already there, so identity survives
//!      reorders;
//!    - keyed and not found: the new node is instantiated and inserted;
//!    - unkeyed: the old child at `index` is patched if it is unkeyed too,
//!      otherwise the new node is instantiated and inserted there.
//! 3. Keyed old nodes that were never matched are removed.
//! 4. Remaining old children past `index` are trimmed.
//!
//! # Leaf Patching
//!
//! Text and comment nodes are written only when their content differs.
//! Elements whose tag differs are replaced wholesale; otherwise attributes
//! are diffed (stale ones removed, changed ones set) and children recurse.
//!
//! Reconciliation cannot fail: malformed input simply results in inserts and
//! replacements.

use indexmap::IndexMap;

use super::node::{Document, NodeId, NodeKind};
use super::parse::VNode;

/// Build a live subtree from a detached node.
pub fn instantiate(doc: &mut Document, vnode: &VNode) -> NodeId {
    match vnode {
        VNode::Text(text) => doc.create_text(text.as_str()),
        VNode::Comment(text) => doc.create_comment(text.as_str()),
        VNode::Element { tag, attrs, children } => {
            let id = doc.create_element(tag.as_str());
            for (name, value) in attrs {
                doc.set_attr(id, name, value);
            }
            for child in children {
                let child_id = instantiate(doc, child);
                doc.append_child(id, child_id);
            }
            id
        }
    }
}

fn live_key(doc: &Document, id: NodeId) -> Option<String> {
    doc.attr(id, "data-key")
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

/// Patch the children of `parent` to match `new_children`.
pub fn patch_children(doc: &mut Document, parent: NodeId, new_children: &[VNode]) {
    let mut keyed: IndexMap<String, NodeId> = IndexMap::new();
    for child in doc.children(parent).to_vec() {
        if let Some(key) = live_key(doc, child) {
            keyed.insert(key, child);
        }
    }

    let mut index = 0;
    for new_child in new_children {
        if let Some(key) = new_child.key() {
            match keyed.shift_remove(key) {
                Some(old) => {
                    let old = patch_node(doc, old, new_child);
                    if doc.children(parent).get(index) != Some(&old) {
                        tracing::trace!(key, index, "moving keyed node");
                        doc.insert_at(parent, old, index);
                    }
                }
                None => {
                    let created = instantiate(doc, new_child);
                    doc.insert_at(parent, created, index);
                }
            }
            index += 1;
            continue;
        }

        match doc.children(parent).get(index).copied() {
            Some(old) if live_key(doc, old).is_none() => {
                patch_node(doc, old, new_child);
            }
            _ => {
                let created = instantiate(doc, new_child);
                doc.insert_at(parent, created, index);
            }
        }
        index += 1;
    }

    for (key, stale) in keyed {
        tracing::trace!(%key, "removing unmatched keyed node");
        doc.remove(stale);
    }

    while let Some(&excess) = doc.children(parent).get(index) {
        doc.remove(excess);
    }
}

/// Patch one live node against a detached one. Returns the id of the node
/// now occupying the position, which differs from `old` when it had to be
/// replaced.
pub fn patch_node(doc: &mut Document, old: NodeId, new: &VNode) -> NodeId {
    enum Plan {
        Text { changed: bool },
        Element,
        Replace,
    }

    let plan = match (doc.node(old).map(|n| n.kind()), new) {
        (Some(NodeKind::Text(current)), VNode::Text(text))
        | (Some(NodeKind::Comment(current)), VNode::Comment(text)) => Plan::Text {
            changed: current != text,
        },
        (Some(NodeKind::Element(el)), VNode::Element { tag, .. }) if el.tag.eq_ignore_ascii_case(tag) => {
            Plan::Element
        }
        _ => Plan::Replace,
    };

    match plan {
        Plan::Text { changed } => {
            if let (true, VNode::Text(text) | VNode::Comment(text)) = (changed, new) {
                doc.set_text(old, text);
            }
            old
        }
        Plan::Element => {
            patch_attributes(doc, old, new);
            patch_children(doc, old, new.children());
            old
        }
        Plan::Replace => {
            tracing::trace!(node = %old, "replacing node");
            let replacement = instantiate(doc, new);
            doc.replace(old, replacement);
            replacement
        }
    }
}

/// Remove attributes missing from `new`, then set the ones that differ.
pub fn patch_attributes(doc: &mut Document, old: NodeId, new: &VNode) {
    let VNode::Element { attrs, .. } = new else {
        return;
    };
    let stale: Vec<String> = doc
        .element(old)
        .map(|el| {
            el.attrs
                .keys()
                .filter(|name| !attrs.iter().any(|(k, _)| k == *name))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    for name in stale {
        doc.remove_attr(old, &name);
    }
    for (name, value) in attrs {
        doc.set_attr(old, name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{inner_html, parse};
    use crate::value::Value;

    fn mount(markup: &str) -> (Document, NodeId) {
        let mut doc = Document::new();
        let root = doc.create_element("div");
        patch_children(&mut doc, root, &parse(markup));
        doc.reset_stats();
        (doc, root)
    }

    #[test]
    fn keyed_reorder_preserves_identity() {
        let (mut doc, root) = mount(
            r#"<li data-key="1">A</li><li data-key="2">B</li><li data-key="3">C</li>"#,
        );
        let before = doc.children(root).to_vec();
        for (i, id) in before.iter().enumerate() {
            doc.set_property(*id, "marker", Value::from(i));
        }

        patch_children(
            &mut doc,
            root,
            &parse(r#"<li data-key="3">C</li><li data-key="1">A</li><li data-key="2">B</li>"#),
        );

        let after = doc.children(root).to_vec();
        assert_eq!(after, vec![before[2], before[0], before[1]]);
        assert_eq!(doc.property(after[0], "marker"), Some(&Value::from(2)));
        assert_eq!(doc.stats().created, 0);
        assert_eq!(doc.stats().removed, 0);
        assert_eq!(doc.stats().text_writes, 0);
    }

    #[test]
    fn unmatched_keys_are_inserted_and_removed() {
        let (mut doc, root) = mount(r#"<li data-key="a">A</li><li data-key="b">B</li>"#);
        let a = doc.children(root)[0];

        patch_children(&mut doc, root, &parse(r#"<li data-key="a">A</li><li data-key="c">C</li>"#));

        assert_eq!(doc.children(root)[0], a);
        assert_eq!(inner_html(&doc, root), r#"<li data-key="a">A</li><li data-key="c">C</li>"#);
        assert_eq!(doc.stats().removed, 1);
        assert_eq!(doc.stats().created, 2);
    }

    #[test]
    fn unkeyed_children_patch_by_index() {
        let (mut doc, root) = mount("<p>one</p><p>two</p><p>three</p>");
        let first = doc.children(root)[0];

        patch_children(&mut doc, root, &parse("<p>uno</p><p>two</p>"));

        assert_eq!(doc.children(root)[0], first);
        assert_eq!(inner_html(&doc, root), "<p>uno</p><p>two</p>");
        assert_eq!(doc.stats().text_writes, 1);
        assert_eq!(doc.stats().created, 0);
        assert_eq!(doc.stats().removed, 1);
    }

    #[test]
    fn tag_change_replaces_node() {
        let (mut doc, root) = mount("<p>x</p>");
        let old = doc.children(root)[0];
        patch_children(&mut doc, root, &parse("<span>x</span>"));
        let new = doc.children(root)[0];
        assert_ne!(old, new);
        assert!(!doc.contains(old));
        assert_eq!(inner_html(&doc, root), "<span>x</span>");
    }

    #[test]
    fn attributes_are_diffed() {
        let (mut doc, root) = mount(r#"<a href="/a" class="x" title="t">l</a>"#);
        patch_children(&mut doc, root, &parse(r#"<a href="/b" class="x">l</a>"#));
        let a = doc.children(root)[0];
        assert_eq!(doc.attr(a, "href"), Some("/b"));
        assert_eq!(doc.attr(a, "title"), None);
        assert_eq!(doc.stats().attr_writes, 2);
    }

    #[test]
    fn identical_markup_is_a_no_op() {
        let markup = r#"<div class="c"><span data-key="1">a</span>text</div>"#;
        let (mut doc, root) = mount(markup);
        patch_children(&mut doc, root, &parse(markup));
        assert_eq!(doc.stats(), Default::default());
    }

    #[test]
    fn unkeyed_new_child_does_not_consume_keyed_old() {
        let (mut doc, root) = mount(r#"<li data-key="1">A</li>"#);
        let keyed = doc.children(root)[0];
        patch_children(&mut doc, root, &parse(r#"<p>head</p><li data-key="1">A</li>"#));
        assert_eq!(doc.children(root)[1], keyed);
        assert_eq!(doc.children(root).len(), 2);
    }
}
