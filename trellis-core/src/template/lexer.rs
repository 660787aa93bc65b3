//! Directive tokenizer.
//!
//! A single forward scan splits a template into literal text and directive
//! tokens. Tokens borrow from the source and record their byte span, so a
//! directive that fails to resolve later can be written back verbatim.
//!
//! Conditionals are line-oriented: `@if:`, `@else-if:`, `@else` and `@endif`
//! are only recognized when they are the sole content of a line, and the
//! token swallows the whole line including its newline. Every other
//! directive may appear anywhere.

use std::ops::Range;

/// What a token means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind<'a> {
    Text,
    /// `@include:name`
    Include { name: &'a str },
    /// `@include:Name:{k:"v"}`
    IncludeInline { name: &'a str, props: &'a str },
    /// `@for:alias in expr` or `@for:a,b in expr`
    For { aliases: &'a str, expr: &'a str },
    EndFor,
    /// `@foreach:expr as alias`
    Foreach { expr: &'a str, alias: &'a str },
    EndForeach,
    /// A trimmed `@if:...` line.
    If { line: &'a str },
    /// A trimmed `@else-if:...` line.
    ElseIf { line: &'a str },
    Else,
    EndIf,
    /// `@store:module.store.key` with an optional `:w` suffix.
    Store { module: &'a str, store: &'a str, key: &'a str, writable: bool },
    /// `@signal:name` with an optional `:w` suffix.
    Signal { name: &'a str, writable: bool },
    /// `@prop:name` or `@prop:name.field`
    Prop { path: &'a str },
    /// `@slot`, `@slot:name` or `@slot:dependency.name`. The target is
    /// empty for the bare form.
    Slot { target: &'a str },
    EndSlot,
    /// `@on:event:handler` or `@event.mod:handler`
    Event { event: &'a str, modifiers: &'a str, handler: &'a str },
}

impl TokenKind<'_> {
    /// Tokens that end a block opened by an earlier token.
    pub fn is_closer(&self) -> bool {
        matches!(
            self,
            TokenKind::EndFor
                | TokenKind::EndForeach
                | TokenKind::ElseIf { .. }
                | TokenKind::Else
                | TokenKind::EndIf
                | TokenKind::EndSlot
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Range<usize>,
}

/// Directive names that never parse as an event shorthand.
const KEYWORDS: &[&str] = &[
    "include", "for", "endfor", "foreach", "endforeach", "if", "else", "endif", "store", "prop", "signal",
    "slot", "endslot",
];

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Length of the leading run of word bytes.
fn word_len(s: &str) -> usize {
    s.bytes().take_while(|b| is_word(*b)).count()
}

fn space_len(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_whitespace).count()
}

/// Length of `\w+(\.\w+)*` at the start of `s`.
fn dotted_len(s: &str) -> usize {
    let mut len = word_len(s);
    if len == 0 {
        return 0;
    }
    let bytes = s.as_bytes();
    while bytes.get(len) == Some(&b'.') {
        let next = word_len(&s[len + 1..]);
        if next == 0 {
            break;
        }
        len += 1 + next;
    }
    len
}

/// Whether `s` starts with `keyword` not followed by a word byte.
fn keyword_at(s: &str, keyword: &str) -> bool {
    s.starts_with(keyword) && !s.as_bytes().get(keyword.len()).is_some_and(|b| is_word(*b))
}

/// Split `source` into tokens.
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;

    fn flush(tokens: &mut Vec<Token<'_>>, from: usize, to: usize) {
        if to > from {
            tokens.push(Token { kind: TokenKind::Text, span: from..to });
        }
    }

    while pos < bytes.len() {
        if pos == 0 || bytes[pos - 1] == b'\n' {
            if let Some((kind, len)) = conditional_line(&source[pos..]) {
                flush(&mut tokens, text_start, pos);
                tokens.push(Token { kind, span: pos..pos + len });
                pos += len;
                text_start = pos;
                continue;
            }
        }

        if bytes[pos] == b'@' {
            if let Some((kind, len)) = directive(&source[pos..]) {
                flush(&mut tokens, text_start, pos);
                tokens.push(Token { kind, span: pos..pos + len });
                pos += len;
                text_start = pos;
                continue;
            }
        }

        pos += 1;
    }

    flush(&mut tokens, text_start, bytes.len());
    tokens
}

/// Recognize a conditional line at the start of `rest`. The returned length
/// covers the trailing newline.
fn conditional_line(rest: &str) -> Option<(TokenKind<'_>, usize)> {
    let (line, len) = match rest.find('\n') {
        Some(end) => (&rest[..end], end + 1),
        None => (rest, rest.len()),
    };
    let trimmed = line.trim();
    if !trimmed.starts_with('@') {
        return None;
    }
    let kind = if trimmed.starts_with("@if:") {
        TokenKind::If { line: trimmed }
    } else if trimmed.starts_with("@else-if:") {
        TokenKind::ElseIf { line: trimmed }
    } else if trimmed == "@else" {
        TokenKind::Else
    } else if trimmed == "@endif" {
        TokenKind::EndIf
    } else {
        return None;
    };
    Some((kind, len))
}

/// Recognize a directive starting with `@` at the start of `rest`.
fn directive(rest: &str) -> Option<(TokenKind<'_>, usize)> {
    let body = &rest[1..];

    if let Some(after) = body.strip_prefix("include:") {
        return include(after).map(|(kind, len)| (kind, 1 + "include:".len() + len));
    }
    if let Some(after) = body.strip_prefix("foreach:") {
        return foreach(after).map(|(kind, len)| (kind, 1 + "foreach:".len() + len));
    }
    if let Some(after) = body.strip_prefix("for:") {
        return for_loop(after).map(|(kind, len)| (kind, 1 + "for:".len() + len));
    }
    if keyword_at(body, "endforeach") {
        return Some((TokenKind::EndForeach, 1 + "endforeach".len()));
    }
    if keyword_at(body, "endfor") {
        return Some((TokenKind::EndFor, 1 + "endfor".len()));
    }
    if let Some(after) = body.strip_prefix("store:") {
        return store(after).map(|(kind, len)| (kind, 1 + "store:".len() + len));
    }
    if let Some(after) = body.strip_prefix("signal:") {
        let len = word_len(after);
        if len == 0 {
            return None;
        }
        let writable = after[len..].starts_with(":w");
        let total = 1 + "signal:".len() + len + if writable { 2 } else { 0 };
        return Some((TokenKind::Signal { name: &after[..len], writable }, total));
    }
    if keyword_at(body, "endslot") {
        return Some((TokenKind::EndSlot, 1 + "endslot".len()));
    }
    if keyword_at(body, "slot") {
        return Some(slot(&body["slot".len()..]));
    }
    if let Some(after) = body.strip_prefix("prop:") {
        let len = dotted_len(after);
        return (len > 0).then(|| (TokenKind::Prop { path: &after[..len] }, 1 + "prop:".len() + len));
    }
    event(body).map(|(kind, len)| (kind, 1 + len))
}

fn include(s: &str) -> Option<(TokenKind<'_>, usize)> {
    let name_len = s
        .bytes()
        .take_while(|b| is_word(*b) || *b == b'-')
        .count();
    if name_len == 0 {
        return None;
    }
    let name = &s[..name_len];
    if let Some(props_start) = s[name_len..].strip_prefix(":{") {
        if let Some(close) = props_start.find('}') {
            let props = &props_start[..close];
            return Some((TokenKind::IncludeInline { name, props }, name_len + 2 + close + 1));
        }
    }
    Some((TokenKind::Include { name }, name_len))
}

fn for_loop(s: &str) -> Option<(TokenKind<'_>, usize)> {
    let mut len = word_len(s);
    if len == 0 {
        return None;
    }
    if s.as_bytes().get(len) == Some(&b',') {
        let second = word_len(&s[len + 1..]);
        if second == 0 {
            return None;
        }
        len += 1 + second;
    }
    let aliases = &s[..len];

    let gap = space_len(&s[len..]);
    if gap == 0 || !s[len + gap..].starts_with("in") {
        return None;
    }
    let after_in = len + gap + 2;
    let gap = space_len(&s[after_in..]);
    if gap == 0 {
        return None;
    }
    let expr_start = after_in + gap;
    let expr_len = s[expr_start..]
        .bytes()
        .take_while(|b| !b.is_ascii_whitespace())
        .count();
    if expr_len == 0 {
        return None;
    }
    let expr = &s[expr_start..expr_start + expr_len];
    Some((TokenKind::For { aliases, expr }, expr_start + expr_len))
}

fn foreach(s: &str) -> Option<(TokenKind<'_>, usize)> {
    let expr_len = s.bytes().take_while(|b| !b.is_ascii_whitespace()).count();
    if expr_len == 0 {
        return None;
    }
    let expr = &s[..expr_len];
    let gap = space_len(&s[expr_len..]);
    if gap == 0 || !s[expr_len + gap..].starts_with("as") {
        return None;
    }
    let after_as = expr_len + gap + 2;
    let gap = space_len(&s[after_as..]);
    if gap == 0 {
        return None;
    }
    let alias_start = after_as + gap;
    let alias_len = word_len(&s[alias_start..]);
    if alias_len == 0 {
        return None;
    }
    let alias = &s[alias_start..alias_start + alias_len];
    Some((TokenKind::Foreach { expr, alias }, alias_start + alias_len))
}

fn store(s: &str) -> Option<(TokenKind<'_>, usize)> {
    let mut parts = [""; 3];
    let mut pos = 0;
    for (i, part) in parts.iter_mut().enumerate() {
        if i > 0 {
            if s.as_bytes().get(pos) != Some(&b'.') {
                return None;
            }
            pos += 1;
        }
        let len = word_len(&s[pos..]);
        if len == 0 {
            return None;
        }
        *part = &s[pos..pos + len];
        pos += len;
    }
    let writable = s[pos..].starts_with(":w");
    if writable {
        pos += 2;
    }
    let [module, store, key] = parts;
    Some((TokenKind::Store { module, store, key, writable }, pos))
}

/// The rest of a `@slot` directive after the keyword. At most one dot.
fn slot(s: &str) -> (TokenKind<'_>, usize) {
    let bare = (TokenKind::Slot { target: "" }, 1 + "slot".len());
    let Some(after) = s.strip_prefix(':') else {
        return bare;
    };
    let mut len = word_len(after);
    if len == 0 {
        return bare;
    }
    if after.as_bytes().get(len) == Some(&b'.') {
        let name = word_len(&after[len + 1..]);
        if name > 0 {
            len += 1 + name;
        }
    }
    (TokenKind::Slot { target: &after[..len] }, 1 + "slot:".len() + len)
}

/// `(on:)?event(.modifier)*:handler` followed by whitespace, `>` or `/`.
/// The terminator is not part of the token.
fn event(s: &str) -> Option<(TokenKind<'_>, usize)> {
    let (prefixed, start) = match s.strip_prefix("on:") {
        Some(_) => (true, 3),
        None => (false, 0),
    };
    let path_len = dotted_len(&s[start..]);
    if path_len == 0 {
        return None;
    }
    let path = &s[start..start + path_len];
    let (event, modifiers) = match path.find('.') {
        Some(dot) => (&path[..dot], &path[dot + 1..]),
        None => (path, ""),
    };
    if !prefixed && KEYWORDS.contains(&event) {
        return None;
    }

    let colon = start + path_len;
    if s.as_bytes().get(colon) != Some(&b':') {
        return None;
    }
    let handler_len = word_len(&s[colon + 1..]);
    if handler_len == 0 {
        return None;
    }
    let end = colon + 1 + handler_len;
    match s.as_bytes().get(end) {
        Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => {}
        _ => return None,
    }
    let handler = &s[colon + 1..end];
    Some((TokenKind::Event { event, modifiers, handler }, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind<'_>> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn spans_cover_the_source() {
        let source = "<p>@prop:name and @store:app.default.count</p>";
        let tokens = tokenize(source);
        let rebuilt: String = tokens.iter().map(|t| &source[t.span.clone()]).collect();
        assert_eq!(rebuilt, source);
        assert_eq!(tokens.len(), 5);
    }

    #[test]
    fn store_directives() {
        assert_eq!(
            kinds("@store:app.default.count:w"),
            vec![TokenKind::Store { module: "app", store: "default", key: "count", writable: true }]
        );
        // Two segments is not a store reference.
        assert_eq!(kinds("@store:app.count"), vec![TokenKind::Text]);
    }

    #[test]
    fn loops() {
        assert_eq!(
            kinds("@for:i,item in items x@endfor"),
            vec![
                TokenKind::For { aliases: "i,item", expr: "items" },
                TokenKind::Text,
                TokenKind::EndFor,
            ]
        );
        assert_eq!(
            kinds("@foreach:store:a.b.c as row@endforeach"),
            vec![TokenKind::Foreach { expr: "store:a.b.c", alias: "row" }, TokenKind::EndForeach]
        );
        assert_eq!(kinds("@for:item items"), vec![TokenKind::Text]);
    }

    #[test]
    fn conditionals_are_line_based() {
        let source = "a\n  @if:prop:x==\"1\"\nyes\n@else\nno\n@endif\nb";
        let tokens = tokenize(source);
        let k: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            k,
            vec![
                TokenKind::Text,
                TokenKind::If { line: "@if:prop:x==\"1\"" },
                TokenKind::Text,
                TokenKind::Else,
                TokenKind::Text,
                TokenKind::EndIf,
                TokenKind::Text,
            ]
        );
        assert_eq!(&source[tokens[2].span.clone()], "yes\n");

        // Mid-line conditionals are plain text.
        assert_eq!(kinds("x @if:prop:a==\"b\""), vec![TokenKind::Text]);
    }

    #[test]
    fn events_need_a_terminator() {
        assert_eq!(
            kinds("<button @on:click:save>"),
            vec![
                TokenKind::Text,
                TokenKind::Event { event: "click", modifiers: "", handler: "save" },
                TokenKind::Text,
            ]
        );
        assert_eq!(
            kinds("<a @click.stopPropagation.once:go />")[1],
            TokenKind::Event { event: "click", modifiers: "stopPropagation.once", handler: "go" }
        );
        assert_eq!(kinds("mail me @home:office"), vec![TokenKind::Text]);
    }

    #[test]
    fn includes() {
        assert_eq!(kinds("@include:header-bar"), vec![TokenKind::Include { name: "header-bar" }]);
        assert_eq!(
            kinds(r#"@include:Card:{title:"Hi"}"#),
            vec![TokenKind::IncludeInline { name: "Card", props: r#"title:"Hi""# }]
        );
    }

    #[test]
    fn signals_and_slots() {
        assert_eq!(
            kinds("<input value=\"@signal:draft:w\">"),
            vec![TokenKind::Text, TokenKind::Signal { name: "draft", writable: true }, TokenKind::Text]
        );
        assert_eq!(kinds("@signal:mode "), vec![TokenKind::Signal { name: "mode", writable: false }, TokenKind::Text]);
        assert_eq!(
            kinds("@slot:card.footer<i>x</i>@endslot"),
            vec![TokenKind::Slot { target: "card.footer" }, TokenKind::Text, TokenKind::EndSlot]
        );
        assert_eq!(
            kinds("@slot fallback@endslot"),
            vec![TokenKind::Slot { target: "" }, TokenKind::Text, TokenKind::EndSlot]
        );
        assert_eq!(kinds("@slotted"), vec![TokenKind::Text]);
        assert_eq!(kinds("@signal: x"), vec![TokenKind::Text]);
    }

    #[test]
    fn keywords_are_not_events() {
        assert_eq!(kinds("@prop: x"), vec![TokenKind::Text]);
        assert_eq!(kinds("@endfor"), vec![TokenKind::EndFor]);
        assert_eq!(kinds("@endforx"), vec![TokenKind::Text]);
    }

    #[test]
    fn multibyte_text_is_preserved() {
        let source = "héllo @prop:naïve wörld";
        let tokens = tokenize(source);
        let rebuilt: String = tokens.iter().map(|t| &source[t.span.clone()]).collect();
        assert_eq!(rebuilt, source);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Prop { path: "na" }));
    }
}
