//! Constructor decorators inside start tags.
//!
//! `<li [key item-3]>` becomes `<li data-key="item-3">` and `<div [panel]>`
//! becomes `<div data-ref="panel">`. One decorator per element is rewritten;
//! anything after it is left alone. Brackets inside quoted attribute values
//! are not decorators.

/// Rewrite the first decorator of every start tag in `markup`.
pub(crate) fn apply(markup: &str) -> String {
    let bytes = markup.as_bytes();
    let mut out = String::with_capacity(markup.len());
    let mut copied = 0;
    let mut pos = 0;

    while pos + 1 < bytes.len() {
        if bytes[pos] != b'<' || !bytes[pos + 1].is_ascii_alphabetic() {
            pos += 1;
            continue;
        }
        let name_end = pos
            + 1
            + markup[pos + 1..]
                .bytes()
                .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
                .count();
        let Some(close) = markup[name_end..].find('>').map(|i| name_end + i) else {
            break;
        };
        if let Some(rewritten) = rewrite_tag(&markup[pos + 1..name_end], &markup[name_end..close]) {
            out.push_str(&markup[copied..pos]);
            out.push_str(&rewritten);
            copied = close + 1;
        }
        pos = close + 1;
    }

    out.push_str(&markup[copied..]);
    out
}

/// Offsets of every `[` preceded by whitespace and outside quotes.
fn decorator_starts(body: &str) -> Vec<usize> {
    let bytes = body.as_bytes();
    let mut quote = None;
    let mut starts = Vec::new();
    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'[' && i > 0 && bytes[i - 1].is_ascii_whitespace() => starts.push(i),
            None => {}
        }
    }
    starts
}

/// `body` is the text between the tag name and the closing `>`.
fn rewrite_tag(tag: &str, body: &str) -> Option<String> {
    for open in decorator_starts(body) {
        let inner_start = open + 1;
        let close = inner_start + body[inner_start..].find(']')?;
        let inner = &body[inner_start..close];
        let (name, param) = match inner.find(' ') {
            Some(space) => (&inner[..space], inner[space..].trim()),
            None => (inner, ""),
        };
        if name.is_empty() {
            continue;
        }
        let attr = if name == "key" && !param.is_empty() {
            format!(" data-key=\"{param}\"")
        } else {
            format!(" data-ref=\"{name}\"")
        };
        let before = &body[..open - 1];
        let after = &body[close + 1..];
        return Some(format!("<{tag}{before}{attr}{after}>"));
    }
    None
}
