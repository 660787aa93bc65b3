//! Lenient markup parser.
//!
//! Turns rendered markup into a detached [`VNode`] forest. The parser never
//! fails: stray end tags are dropped, unclosed elements are closed at the end
//! of input and anything that does not look like a tag is text.

use std::fmt;

/// A detached node built from markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VNode {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<VNode>,
    },
    Text(String),
    Comment(String),
}

impl VNode {
    pub fn element(tag: impl Into<String>) -> Self {
        VNode::Element { tag: tag.into(), attrs: Vec::new(), children: Vec::new() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        VNode::Text(text.into())
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            VNode::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            VNode::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn children(&self) -> &[VNode] {
        match self {
            VNode::Element { children, .. } => children,
            _ => &[],
        }
    }

    /// The reconciliation key: a non-empty `data-key` attribute.
    pub fn key(&self) -> Option<&str> {
        self.attr("data-key").filter(|k| !k.is_empty())
    }

    /// Number of nodes in this subtree.
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(VNode::size).sum::<usize>()
    }
}

impl fmt::Display for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::serialize::vnode_to_html(self))
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea"];

pub(crate) fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

struct Open {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<VNode>,
}

/// Parse markup into a list of top-level nodes.
pub fn parse(markup: &str) -> Vec<VNode> {
    let mut root: Vec<VNode> = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    let bytes = markup.as_bytes();
    let mut pos = 0;
    let mut text_start = 0;

    fn push(stack: &mut [Open], root: &mut Vec<VNode>, node: VNode) {
        match stack.last_mut() {
            Some(open) => open.children.push(node),
            None => root.push(node),
        }
    }

    fn flush_text(markup: &str, from: usize, to: usize, stack: &mut [Open], root: &mut Vec<VNode>) {
        if to > from {
            push(stack, root, VNode::Text(markup[from..to].to_string()));
        }
    }

    fn close(stack: &mut Vec<Open>, root: &mut Vec<VNode>) {
        if let Some(open) = stack.pop() {
            let node = VNode::Element { tag: open.tag, attrs: open.attrs, children: open.children };
            push(stack, root, node);
        }
    }

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }
        let rest = &markup[pos..];

        if rest.starts_with("<!--") {
            flush_text(markup, text_start, pos, &mut stack, &mut root);
            let end = rest[4..].find("-->").map(|i| pos + 4 + i);
            let (body, next) = match end {
                Some(end) => (&markup[pos + 4..end], end + 3),
                None => (&markup[pos + 4..], markup.len()),
            };
            push(&mut stack, &mut root, VNode::Comment(body.to_string()));
            pos = next;
            text_start = pos;
            continue;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            // Doctype and processing instructions carry nothing we render.
            flush_text(markup, text_start, pos, &mut stack, &mut root);
            pos = rest.find('>').map_or(markup.len(), |i| pos + i + 1);
            text_start = pos;
            continue;
        }

        if rest.starts_with("</") {
            let name_len = rest[2..]
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':'))
                .unwrap_or(rest.len() - 2);
            if name_len == 0 {
                pos += 1;
                continue;
            }
            flush_text(markup, text_start, pos, &mut stack, &mut root);
            let name = rest[2..2 + name_len].to_ascii_lowercase();
            pos = rest.find('>').map_or(markup.len(), |i| pos + i + 1);
            text_start = pos;
            if let Some(depth) = stack.iter().rposition(|open| open.tag == name) {
                while stack.len() > depth {
                    close(&mut stack, &mut root);
                }
            }
            continue;
        }

        let Some((tag, attrs, self_closing, next)) = parse_start_tag(markup, pos) else {
            pos += 1;
            continue;
        };
        flush_text(markup, text_start, pos, &mut stack, &mut root);
        pos = next;
        text_start = pos;

        if self_closing || is_void(&tag) {
            push(&mut stack, &mut root, VNode::Element { tag, attrs, children: Vec::new() });
            continue;
        }

        if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
            let closing = format!("</{tag}");
            let lower = markup[pos..].to_ascii_lowercase();
            let body_end = lower.find(&closing).map_or(markup.len(), |i| pos + i);
            let mut children = Vec::new();
            if body_end > pos {
                children.push(VNode::Text(markup[pos..body_end].to_string()));
            }
            pos = markup[body_end..].find('>').map_or(markup.len(), |i| body_end + i + 1);
            text_start = pos;
            push(&mut stack, &mut root, VNode::Element { tag, attrs, children });
            continue;
        }

        stack.push(Open { tag, attrs, children: Vec::new() });
    }

    flush_text(markup, text_start, markup.len(), &mut stack, &mut root);
    while !stack.is_empty() {
        close(&mut stack, &mut root);
    }
    root
}

type StartTag = (String, Vec<(String, String)>, bool, usize);

/// Parse `<tag attr="v" ...>` starting at `start`. Returns `None` when the
/// text is not a start tag.
fn parse_start_tag(markup: &str, start: usize) -> Option<StartTag> {
    let bytes = markup.as_bytes();
    let mut pos = start + 1;
    if !bytes.get(pos)?.is_ascii_alphabetic() {
        return None;
    }
    let name_start = pos;
    while pos < bytes.len() && is_name_byte(bytes[pos]) {
        pos += 1;
    }
    let tag = markup[name_start..pos].to_ascii_lowercase();
    let mut attrs: Vec<(String, String)> = Vec::new();

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        match bytes.get(pos) {
            None => return Some((tag, attrs, false, markup.len())),
            Some(b'>') => return Some((tag, attrs, false, pos + 1)),
            Some(b'/') if bytes.get(pos + 1) == Some(&b'>') => {
                return Some((tag, attrs, true, pos + 2));
            }
            Some(b'/') => {
                pos += 1;
                continue;
            }
            _ => {}
        }

        let attr_start = pos;
        while pos < bytes.len()
            && !bytes[pos].is_ascii_whitespace()
            && !matches!(bytes[pos], b'=' | b'>')
            && !(bytes[pos] == b'/' && bytes.get(pos + 1) == Some(&b'>'))
        {
            pos += 1;
        }
        let name = markup[attr_start..pos].to_string();

        let mut after_name = pos;
        while after_name < bytes.len() && bytes[after_name].is_ascii_whitespace() {
            after_name += 1;
        }
        let value = if bytes.get(after_name) == Some(&b'=') {
            pos = after_name + 1;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            match bytes.get(pos) {
                Some(&quote @ (b'"' | b'\'')) => {
                    let value_start = pos + 1;
                    let value_end = markup[value_start..]
                        .find(quote as char)
                        .map_or(markup.len(), |i| value_start + i);
                    pos = (value_end + 1).min(markup.len());
                    markup[value_start..value_end].to_string()
                }
                _ => {
                    let value_start = pos;
                    while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>' {
                        pos += 1;
                    }
                    markup[value_start..pos].to_string()
                }
            }
        } else {
            String::new()
        };

        if !name.is_empty() && !attrs.iter().any(|(k, _)| *k == name) {
            attrs.push((name, value));
        }
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}
