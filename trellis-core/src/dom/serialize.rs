//! Markup serialization for live and detached nodes.
//!
//! Text is written back verbatim (the parser does not decode entities), so
//! `parse` followed by serialization reproduces well-formed input.

use super::node::{Document, NodeId, NodeKind};
use super::parse::{is_void, VNode};

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push('=');
    if value.contains('"') {
        out.push('\'');
        out.push_str(value);
        out.push('\'');
    } else {
        out.push('"');
        out.push_str(value);
        out.push('"');
    }
}

fn write_start(out: &mut String, tag: &str, attrs: &mut dyn Iterator<Item = (&str, &str)>) {
    out.push('<');
    out.push_str(tag);
    for (name, value) in attrs {
        write_attr(out, name, value);
    }
    out.push('>');
}

/// Markup of a live node and its subtree.
pub fn outer_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, &mut out);
    out
}

/// Markup of a live node's children.
pub fn inner_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    for child in doc.children(id) {
        write_node(doc, *child, &mut out);
    }
    out
}

fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    let Some(node) = doc.node(id) else {
        return;
    };
    match node.kind() {
        NodeKind::Text(text) => out.push_str(text),
        NodeKind::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeKind::Element(el) => {
            write_start(out, &el.tag, &mut el.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            if is_void(&el.tag) {
                return;
            }
            for child in node.children() {
                write_node(doc, *child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

/// Markup of a detached node.
pub fn vnode_to_html(node: &VNode) -> String {
    let mut out = String::new();
    write_vnode(node, &mut out);
    out
}

fn write_vnode(node: &VNode, out: &mut String) {
    match node {
        VNode::Text(text) => out.push_str(text),
        VNode::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        VNode::Element { tag, attrs, children } => {
            write_start(out, tag, &mut attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            if is_void(tag) {
                return;
            }
            for child in children {
                write_vnode(child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse;

    #[test]
    fn parse_then_serialize_reproduces_markup() {
        let markup = r#"<ul class="list"><li data-key="1">A<br></li><!--c--><li data-key="2">B</li></ul>"#;
        let nodes = parse(markup);
        assert_eq!(vnode_to_html(&nodes[0]), markup);
    }

    #[test]
    fn live_tree_serializes() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attr(div, "title", r#"say "hi""#);
        let text = doc.create_text("x");
        doc.append_child(div, text);
        assert_eq!(outer_html(&doc, div), r#"<div title='say "hi"'>x</div>"#);
        assert_eq!(inner_html(&doc, div), "x");
    }
}
