// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Recursive-descent parser producing the template AST.
//!
//! The parser consumes the token stream from [`crate::lexer`] and builds
//! [`Node`] trees. It consults the [`ExtensionRegistry`] to recognize
//! extension tag names and filter names at parse time; anything unregistered
//! is a parse error at its exact position, so misspelled extensions never
//! survive to render time.
//!
//! Block structure errors report the position that makes them actionable:
//! an unclosed `{% if %}`/`{% for %}` fails with the *opening* tag's
//! location.

use crate::ast::{BinaryOp, BlockKind, Expr, Node, Span, UnaryOp};
use crate::error::{ParamqlError, Result};
use crate::extensions::ExtensionRegistry;
use crate::lexer::{tokenize, Token, TokenKind};

/// Tag words that close or continue a block and are only valid where the
/// grammar expects them.
const END_WORDS: &[&str] = &["elif", "else", "endif", "endfor"];

/// Reserved words that can never start a variable path.
const RESERVED: &[&str] = &["and", "or", "not", "in", "true", "false"];

/// Parses template source into a [`Node::Root`].
pub fn parse(source: &str, registry: &ExtensionRegistry) -> Result<Node> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        idx: 0,
        registry,
    };
    parser.parse_root()
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    idx: usize,
    registry: &'a ExtensionRegistry,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let i = (self.idx + ahead).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        }
        token
    }

    fn error_at(&self, message: impl Into<String>, span: Span) -> ParamqlError {
        ParamqlError::parse(message, self.source, span.line, span.column)
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token> {
        let token = self.peek().clone();
        if &token.kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error_at(format!("expected {}", what), token.span))
        }
    }

    fn parse_root(&mut self) -> Result<Node> {
        let children = self.parse_nodes(&[])?;
        match &self.peek().kind {
            TokenKind::Eof => Ok(Node::Root {
                children,
                span: Span::new(0, self.source.len(), 1, 1),
            }),
            _ => {
                let span = self.peek().span;
                Err(self.error_at("unexpected content after template end", span))
            }
        }
    }

    /// Parses a sibling sequence until EOF or until the next token pair is
    /// `{%` followed by one of `terminators` (left unconsumed for the
    /// caller).
    fn parse_nodes(&mut self, terminators: &[&str]) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();

        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Eof => return Ok(nodes),
                TokenKind::Text(content) => {
                    self.advance();
                    nodes.push(Node::Text {
                        content,
                        span: token.span,
                    });
                }
                TokenKind::VarOpen => {
                    self.advance();
                    let expr = self.parse_expr()?;
                    self.expect(&TokenKind::VarClose, "'}}'")?;
                    nodes.push(Node::Expression {
                        expr,
                        span: token.span,
                    });
                }
                TokenKind::BlockOpen => {
                    let (word, word_span) = match &self.peek_at(1).kind {
                        TokenKind::Ident(word) => (word.clone(), self.peek_at(1).span),
                        _ => {
                            let span = self.peek_at(1).span;
                            return Err(self.error_at("expected a tag name after '{%'", span));
                        }
                    };

                    if terminators.contains(&word.as_str()) {
                        return Ok(nodes);
                    }
                    if END_WORDS.contains(&word.as_str()) {
                        return Err(self.error_at(
                            format!("'{{% {} %}}' without a matching opening tag", word),
                            word_span,
                        ));
                    }

                    self.advance(); // {%
                    self.advance(); // tag word
                    let node = match word.as_str() {
                        "if" => self.parse_if(token.span)?,
                        "for" => self.parse_for(token.span)?,
                        "set" => self.parse_set(token.span)?,
                        name if self.registry.has_tag(name) => {
                            self.parse_tag(token.span, word, word_span)?
                        }
                        name => {
                            return Err(self
                                .error_at(format!("unknown tag '{}'", name), word_span));
                        }
                    };
                    nodes.push(node);
                }
                _ => {
                    return Err(self.error_at("unexpected token", token.span));
                }
            }
        }
    }

    /// Consumes `{% word %}` where `word` must be one of `expected`; the
    /// caller guarantees [`Parser::parse_nodes`] stopped on one of them or
    /// on EOF. EOF reports the unclosed block at `open_span`.
    fn take_end_word(&mut self, opened: &str, open_span: Span, expected: &[&str]) -> Result<String> {
        if matches!(self.peek().kind, TokenKind::Eof) {
            return Err(self.error_at(
                format!("unclosed '{{% {} %}}' block", opened),
                open_span,
            ));
        }
        self.advance(); // {%
        match self.advance().kind {
            TokenKind::Ident(word) if expected.contains(&word.as_str()) => Ok(word),
            _ => unreachable!("parse_nodes stops only on expected end words"),
        }
    }

    fn parse_if(&mut self, open_span: Span) -> Result<Node> {
        let mut arms = Vec::new();
        let mut else_body = None;

        let condition = self.parse_expr()?;
        self.expect(&TokenKind::BlockClose, "'%}'")?;
        let body = self.parse_nodes(&["elif", "else", "endif"])?;
        arms.push((condition, body));

        loop {
            let word = self.take_end_word("if", open_span, &["elif", "else", "endif"])?;
            match word.as_str() {
                "elif" => {
                    let condition = self.parse_expr()?;
                    self.expect(&TokenKind::BlockClose, "'%}'")?;
                    let body = self.parse_nodes(&["elif", "else", "endif"])?;
                    arms.push((condition, body));
                }
                "else" => {
                    self.expect(&TokenKind::BlockClose, "'%}'")?;
                    else_body = Some(self.parse_nodes(&["endif"])?);
                    self.take_end_word("if", open_span, &["endif"])?;
                    self.expect(&TokenKind::BlockClose, "'%}'")?;
                    break;
                }
                _ => {
                    self.expect(&TokenKind::BlockClose, "'%}'")?;
                    break;
                }
            }
        }

        Ok(Node::Block {
            kind: BlockKind::If { arms, else_body },
            span: open_span,
        })
    }

    fn parse_for(&mut self, open_span: Span) -> Result<Node> {
        let var = self.parse_ident("a loop variable")?;
        match self.advance() {
            Token {
                kind: TokenKind::Ident(word),
                ..
            } if word == "in" => {}
            token => return Err(self.error_at("expected 'in'", token.span)),
        }
        let list = self.parse_expr()?;
        self.expect(&TokenKind::BlockClose, "'%}'")?;

        let body = self.parse_nodes(&["else", "endfor"])?;
        let mut else_body = None;

        let word = self.take_end_word("for", open_span, &["else", "endfor"])?;
        if word == "else" {
            self.expect(&TokenKind::BlockClose, "'%}'")?;
            else_body = Some(self.parse_nodes(&["endfor"])?);
            self.take_end_word("for", open_span, &["endfor"])?;
        }
        self.expect(&TokenKind::BlockClose, "'%}'")?;

        Ok(Node::Block {
            kind: BlockKind::For {
                var,
                list,
                body,
                else_body,
            },
            span: open_span,
        })
    }

    fn parse_set(&mut self, open_span: Span) -> Result<Node> {
        let name = self.parse_ident("a variable name")?;
        self.expect(&TokenKind::Assign, "'='")?;
        let value = self.parse_expr()?;
        self.expect(&TokenKind::BlockClose, "'%}'")?;

        Ok(Node::Block {
            kind: BlockKind::Set { name, value },
            span: open_span,
        })
    }

    fn parse_tag(&mut self, open_span: Span, name: String, name_span: Span) -> Result<Node> {
        let mut args = Vec::new();
        if self.peek().kind != TokenKind::BlockClose {
            args.push(self.parse_expr()?);
            while self.peek().kind == TokenKind::Comma {
                self.advance();
                args.push(self.parse_expr()?);
            }
        }
        self.expect(&TokenKind::BlockClose, "'%}'")?;

        Ok(Node::Tag {
            name,
            name_span,
            args,
            span: open_span,
        })
    }

    fn parse_ident(&mut self, what: &str) -> Result<String> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(name) if !RESERVED.contains(&name.as_str()) => Ok(name),
            _ => Err(self.error_at(format!("expected {}", what), token.span)),
        }
    }

    // Expression grammar, loosest first:
    //   or > and > not > comparison > additive > multiplicative > unary - > filter
    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while matches!(&self.peek().kind, TokenKind::Ident(w) if w == "or") {
            let span = self.advance().span;
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while matches!(&self.peek().kind, TokenKind::Ident(w) if w == "and") {
            let span = self.advance().span;
            let right = self.parse_not()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if matches!(&self.peek().kind, TokenKind::Ident(w) if w == "not") {
            let span = self.advance().span;
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        let op = match self.peek().kind {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        let span = self.advance().span;
        let right = self.parse_additive()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span,
        })
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            let span = self.advance().span;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            let span = self.advance().span;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek().kind == TokenKind::Minus {
            let span = self.advance().span;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_postfix()
    }

    /// Primary expression followed by filter applications; filters bind
    /// tighter than any binary operator.
    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;

        while self.peek().kind == TokenKind::Pipe {
            self.advance();
            let token = self.advance();
            let name = match token.kind {
                TokenKind::Ident(name) => name,
                _ => return Err(self.error_at("expected a filter name after '|'", token.span)),
            };
            if !self.registry.has_filter(&name) {
                return Err(self.error_at(format!("unknown filter '{}'", name), token.span));
            }

            let mut args = Vec::new();
            if self.peek().kind == TokenKind::LParen {
                self.advance();
                if self.peek().kind != TokenKind::RParen {
                    args.push(self.parse_expr()?);
                    while self.peek().kind == TokenKind::Comma {
                        self.advance();
                        args.push(self.parse_expr()?);
                    }
                }
                self.expect(&TokenKind::RParen, "')'")?;
            }

            expr = Expr::Filter {
                name,
                name_span: token.span,
                input: Box::new(expr),
                args,
            };
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Bool {
                    value: true,
                    span: token.span,
                }),
                "false" => Ok(Expr::Bool {
                    value: false,
                    span: token.span,
                }),
                w if RESERVED.contains(&w) => {
                    Err(self.error_at(format!("unexpected keyword '{}'", w), token.span))
                }
                _ => {
                    let mut path = vec![word];
                    while self.peek().kind == TokenKind::Dot {
                        self.advance();
                        let segment = self.advance();
                        match segment.kind {
                            TokenKind::Ident(name) => path.push(name),
                            _ => {
                                return Err(self
                                    .error_at("expected an identifier after '.'", segment.span))
                            }
                        }
                    }
                    Ok(Expr::Var {
                        path,
                        span: token.span,
                    })
                }
            },
            TokenKind::Num(literal) => Ok(Expr::Num {
                literal,
                span: token.span,
            }),
            TokenKind::Str(value) => Ok(Expr::Str {
                value,
                span: token.span,
            }),
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.error_at("expected an expression", token.span)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ExtensionRegistry {
        ExtensionRegistry::with_builtins().unwrap()
    }

    fn parse_ok(source: &str) -> Node {
        parse(source, &registry()).unwrap()
    }

    fn children(node: &Node) -> &[Node] {
        match node {
            Node::Root { children, .. } => children,
            _ => panic!("expected root"),
        }
    }

    #[test]
    fn text_and_expression() {
        let root = parse_ok("Hello {{ name }}!");
        let nodes = children(&root);
        assert_eq!(nodes.len(), 3);
        match &nodes[1] {
            Node::Expression { expr, span } => {
                assert_eq!(span.column, 7);
                assert_eq!(
                    *expr,
                    Expr::Var {
                        path: vec!["name".to_string()],
                        span: Span::new(9, 13, 1, 10)
                    }
                );
            }
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn if_elif_else_structure() {
        let root =
            parse_ok("{% if a %}1{% elif b %}2{% else %}3{% endif %}");
        match &children(&root)[0] {
            Node::Block {
                kind: BlockKind::If { arms, else_body },
                ..
            } => {
                assert_eq!(arms.len(), 2);
                assert!(else_body.is_some());
            }
            other => panic!("expected if block, got {other:?}"),
        }
    }

    #[test]
    fn for_with_else_branch() {
        let root = parse_ok("{% for x in xs %}{{ x }}{% else %}none{% endfor %}");
        match &children(&root)[0] {
            Node::Block {
                kind:
                    BlockKind::For {
                        var,
                        body,
                        else_body,
                        ..
                    },
                ..
            } => {
                assert_eq!(var, "x");
                assert_eq!(body.len(), 1);
                assert!(else_body.is_some());
            }
            other => panic!("expected for block, got {other:?}"),
        }
    }

    #[test]
    fn set_binding() {
        let root = parse_ok("{% set limit = 10 %}");
        match &children(&root)[0] {
            Node::Block {
                kind: BlockKind::Set { name, value },
                ..
            } => {
                assert_eq!(name, "limit");
                assert!(value.is_literal());
            }
            other => panic!("expected set block, got {other:?}"),
        }
    }

    #[test]
    fn error_tag_parses_with_spans() {
        let root = parse_ok("\n{% error \"boom\" %}");
        // Child 0 is the leading newline text run
        match &children(&root)[1] {
            Node::Tag {
                name,
                name_span,
                args,
                span,
            } => {
                assert_eq!(name, "error");
                assert_eq!((span.line, span.column), (2, 1));
                assert_eq!((name_span.line, name_span.column), (2, 4));
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected tag, got {other:?}"),
        }
    }

    #[test]
    fn unclosed_if_reports_opening_location() {
        let err = parse("ab\ncd{% if flag %}x", &registry()).unwrap_err();
        match err {
            ParamqlError::Parse { line, column, message, .. } => {
                assert_eq!((line, column), (2, 3));
                assert!(message.contains("unclosed"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = parse("{% explode %}", &registry()).unwrap_err();
        assert!(err.to_string().contains("unknown tag 'explode'"));
    }

    #[test]
    fn unknown_filter_is_rejected_at_parse_time() {
        let err = parse("{{ a | sparkle }}", &registry()).unwrap_err();
        assert!(err.to_string().contains("unknown filter 'sparkle'"));
    }

    #[test]
    fn stray_end_tag_is_rejected() {
        let err = parse("x{% endif %}", &registry()).unwrap_err();
        assert!(err.to_string().contains("without a matching opening tag"));
    }

    #[test]
    fn precedence_filter_binds_tighter_than_add() {
        let root = parse_ok("{{ a + b | upper }}");
        match &children(&root)[0] {
            Node::Expression { expr, .. } => match expr {
                Expr::Binary { op, right, .. } => {
                    assert_eq!(*op, BinaryOp::Add);
                    assert!(matches!(**right, Expr::Filter { .. }));
                }
                other => panic!("expected binary add, got {other:?}"),
            },
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn parenthesized_expression() {
        let root = parse_ok("{{ (a or b) and c }}");
        match &children(&root)[0] {
            Node::Expression { expr, .. } => {
                assert!(matches!(
                    expr,
                    Expr::Binary {
                        op: BinaryOp::And,
                        ..
                    }
                ));
            }
            other => panic!("expected expression, got {other:?}"),
        }
    }
}
