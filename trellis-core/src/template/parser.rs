//! Recursive-descent parser from tokens to a directive tree.
//!
//! Blocks (`@for`, `@foreach`, `@if`, `@slot`) nest freely. A block whose closing
//! directive never arrives is not an error: its opener is kept as literal
//! text and its body is spliced into the enclosing block. Closing directives
//! with no open block are literal text as well.

use smallvec::SmallVec;

use super::lexer::{tokenize, Token, TokenKind};

/// A node of the directive tree. Text slices borrow from the template.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<'a> {
    Text(&'a str),
    Include { name: &'a str, source: &'a str },
    IncludeInline { name: &'a str, props: &'a str, source: &'a str },
    Loop(Loop<'a>),
    Conditional(Conditional<'a>),
    Store { module: &'a str, store: &'a str, key: &'a str, writable: bool, source: &'a str },
    Signal { name: &'a str, writable: bool, source: &'a str },
    Prop { path: &'a str, source: &'a str },
    Slot(Slot<'a>),
    Event { event: &'a str, modifiers: &'a str, handler: &'a str },
}

/// `@for` / `@foreach` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop<'a> {
    /// One alias (`item`) or two (`index,item` / `key,value`).
    pub aliases: SmallVec<[&'a str; 2]>,
    pub expr: &'a str,
    pub body: Vec<Node<'a>>,
    pub opener: &'a str,
    pub closer: &'a str,
}

/// One `@if` / `@else-if` / `@else` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch<'a> {
    /// The trimmed directive line; `None` for `@else`.
    pub line: Option<&'a str>,
    pub body: Vec<Node<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional<'a> {
    pub branches: Vec<Branch<'a>>,
}

/// `@slot[:target]` ... `@endslot`.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot<'a> {
    /// `name`, `dependency` or `dependency.name`; empty for `@slot`.
    pub target: &'a str,
    pub body: Vec<Node<'a>>,
    pub opener: &'a str,
    pub closer: &'a str,
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
}

/// Parse a template into its directive tree.
pub fn parse(source: &str) -> Vec<Node<'_>> {
    let mut parser = Parser { source, tokens: tokenize(source), pos: 0 };
    let mut nodes = Vec::new();
    loop {
        nodes.extend(parser.block());
        match parser.next() {
            // A closer with nothing open.
            Some(token) => nodes.push(Node::Text(parser.text(&token))),
            None => break,
        }
    }
    nodes
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn text(&self, token: &Token<'a>) -> &'a str {
        &self.source[token.span.clone()]
    }

    /// Parse nodes until a closing directive (left unconsumed) or the end.
    fn block(&mut self) -> Vec<Node<'a>> {
        let mut nodes = Vec::new();
        while let Some(token) = self.peek() {
            if token.kind.is_closer() {
                break;
            }
            let Some(token) = self.next() else { break };
            let source = self.text(&token);
            match token.kind {
                TokenKind::Text => nodes.push(Node::Text(source)),
                TokenKind::Include { name } => nodes.push(Node::Include { name, source }),
                TokenKind::IncludeInline { name, props } => {
                    nodes.push(Node::IncludeInline { name, props, source })
                }
                TokenKind::Store { module, store, key, writable } => {
                    nodes.push(Node::Store { module, store, key, writable, source })
                }
                TokenKind::Signal { name, writable } => nodes.push(Node::Signal { name, writable, source }),
                TokenKind::Prop { path } => nodes.push(Node::Prop { path, source }),
                TokenKind::Slot { target } => nodes.extend(self.slot(target, source)),
                TokenKind::Event { event, modifiers, handler } => {
                    nodes.push(Node::Event { event, modifiers, handler })
                }
                TokenKind::For { aliases, expr } => {
                    nodes.extend(self.looped(aliases.split(',').collect(), expr, source, TokenKind::EndFor))
                }
                TokenKind::Foreach { expr, alias } => {
                    let mut aliases = SmallVec::new();
                    aliases.push(alias);
                    nodes.extend(self.looped(aliases, expr, source, TokenKind::EndForeach))
                }
                TokenKind::If { line } => nodes.extend(self.conditional(line, source)),
                // Closers stop the loop above before being consumed.
                TokenKind::EndFor
                | TokenKind::EndForeach
                | TokenKind::ElseIf { .. }
                | TokenKind::Else
                | TokenKind::EndIf
                | TokenKind::EndSlot => nodes.push(Node::Text(source)),
            }
        }
        nodes
    }

    fn looped(
        &mut self,
        aliases: SmallVec<[&'a str; 2]>,
        expr: &'a str,
        opener: &'a str,
        closer: TokenKind<'a>,
    ) -> Vec<Node<'a>> {
        let body = self.block();
        match self.peek() {
            Some(token) if token.kind == closer => {
                let token = token.clone();
                self.pos += 1;
                vec![Node::Loop(Loop { aliases, expr, body, opener, closer: self.text(&token) })]
            }
            _ => {
                tracing::debug!(directive = opener, "loop without terminator left as text");
                let mut nodes = vec![Node::Text(opener)];
                nodes.extend(body);
                nodes
            }
        }
    }

    fn slot(&mut self, target: &'a str, opener: &'a str) -> Vec<Node<'a>> {
        let body = self.block();
        match self.peek() {
            Some(token) if token.kind == TokenKind::EndSlot => {
                let token = token.clone();
                self.pos += 1;
                vec![Node::Slot(Slot { target, body, opener, closer: self.text(&token) })]
            }
            _ => {
                tracing::debug!(directive = opener, "slot without @endslot left as text");
                let mut nodes = vec![Node::Text(opener)];
                nodes.extend(body);
                nodes
            }
        }
    }

    fn conditional(&mut self, first_line: &'a str, opener: &'a str) -> Vec<Node<'a>> {
        let mut branches = vec![Branch { line: Some(first_line), body: self.block() }];
        // Literal text of every branch opener, for the unterminated case.
        let mut openers = vec![opener];

        loop {
            let Some(token) = self.peek().cloned() else { break };
            match token.kind {
                TokenKind::ElseIf { line } => {
                    self.pos += 1;
                    openers.push(self.text(&token));
                    branches.push(Branch { line: Some(line), body: self.block() });
                }
                TokenKind::Else => {
                    self.pos += 1;
                    openers.push(self.text(&token));
                    branches.push(Branch { line: None, body: self.block() });
                }
                TokenKind::EndIf => {
                    self.pos += 1;
                    return vec![Node::Conditional(Conditional { branches })];
                }
                _ => break,
            }
        }

        tracing::debug!(directive = first_line, "conditional without @endif left as text");
        let mut nodes = Vec::new();
        for (opener, branch) in openers.into_iter().zip(branches) {
            nodes.push(Node::Text(opener));
            nodes.extend(branch.body);
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loops_and_conditionals_nest() {
        let nodes = parse("@for:row in rows\n@if:prop:row.ok==\"1\"\nok\n@endif\n@endfor");
        let [Node::Loop(outer)] = nodes.as_slice() else {
            panic!("expected a single loop, got {nodes:?}");
        };
        assert_eq!(outer.aliases.as_slice(), ["row"]);
        assert_eq!(outer.expr, "rows");
        assert!(outer.body.iter().any(|n| matches!(n, Node::Conditional(_))));
    }

    #[test]
    fn branches_keep_their_lines() {
        let nodes = parse("@if:prop:a==\"1\"\none\n@else-if:prop:a==\"2\"\ntwo\n@else\nother\n@endif\n");
        let [Node::Conditional(cond)] = nodes.as_slice() else {
            panic!("expected a conditional, got {nodes:?}");
        };
        let lines: Vec<_> = cond.branches.iter().map(|b| b.line).collect();
        assert_eq!(lines, vec![Some("@if:prop:a==\"1\""), Some("@else-if:prop:a==\"2\""), None]);
        assert_eq!(cond.branches[2].body, vec![Node::Text("other\n")]);
    }

    #[test]
    fn unterminated_blocks_are_literal() {
        let nodes = parse("@for:x in xs body");
        assert_eq!(nodes, vec![Node::Text("@for:x in xs"), Node::Text(" body")]);

        let nodes = parse("@if:prop:a==\"1\"\nyes\n");
        assert_eq!(nodes, vec![Node::Text("@if:prop:a==\"1\"\n"), Node::Text("yes\n")]);
    }

    #[test]
    fn slots_hold_their_body() {
        let nodes = parse("<p>@slot:footer<i>@prop:x</i>@endslot</p>");
        let Node::Slot(slot) = &nodes[1] else {
            panic!("expected a slot, got {nodes:?}");
        };
        assert_eq!(slot.target, "footer");
        assert_eq!(slot.body, vec![Node::Text("<i>"), Node::Prop { path: "x", source: "@prop:x" }, Node::Text("</i>")]);
        assert_eq!(nodes[2], Node::Text("</p>"));

        let nodes = parse("@slot open");
        assert_eq!(nodes, vec![Node::Text("@slot"), Node::Text(" open")]);
    }

    #[test]
    fn stray_closers_are_literal() {
        let nodes = parse("a @endfor b\n@endif\n");
        assert_eq!(
            nodes,
            vec![Node::Text("a "), Node::Text("@endfor"), Node::Text(" b\n"), Node::Text("@endif\n")]
        );
    }

    #[test]
    fn inner_closer_does_not_end_outer_block() {
        // The loop is unterminated; the @endif closes the conditional inside it.
        let nodes = parse("@for:x in xs\n@if:prop:x==\"1\"\n1\n@endif\n");
        assert_eq!(nodes[0], Node::Text("@for:x in xs"));
        assert!(nodes.iter().any(|n| matches!(n, Node::Conditional(_))));
    }
}
