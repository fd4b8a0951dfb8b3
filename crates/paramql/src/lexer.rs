// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Tokenizer for the template language.
//!
//! The lexer runs in two modes: outside delimiters it accumulates raw text,
//! inside `{{ ... }}` and `{% ... %}` it produces expression tokens.
//! Comments `{# ... #}` are consumed entirely and emit nothing.
//!
//! Every token carries a [`Span`] with the 1-indexed line and column of its
//! first character, which downstream stages use for metadata locations and
//! error reporting.

use crate::ast::Span;
use crate::error::{ParamqlError, Result};

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token kind and payload.
    pub kind: TokenKind,
    /// Source location of the token.
    pub span: Span,
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Raw template text outside any delimiter.
    Text(String),
    /// `{{`
    VarOpen,
    /// `}}`
    VarClose,
    /// `{%`
    BlockOpen,
    /// `%}`
    BlockClose,
    /// An identifier or keyword.
    Ident(String),
    /// A string literal, escapes already processed.
    Str(String),
    /// A numeric literal, kept as written.
    Num(String),
    /// `|`
    Pipe,
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `=`
    Assign,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// End of input.
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Content,
    Var,
    Block,
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    idx: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            idx: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).map(|&(_, c)| c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.idx + ahead).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.idx)
            .map(|&(o, _)| o)
            .unwrap_or(self.source.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn mark(&self) -> (usize, usize, usize) {
        (self.offset(), self.line, self.column)
    }

    fn span_from(&self, mark: (usize, usize, usize)) -> Span {
        Span::new(mark.0, self.offset(), mark.1, mark.2)
    }

    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> ParamqlError {
        ParamqlError::parse(message, self.source, line, column)
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut mode = Mode::Content;

        loop {
            match mode {
                Mode::Content => {
                    if self.peek().is_none() {
                        break;
                    }
                    if let Some(open) = self.lex_content(&mut tokens)? {
                        mode = open;
                    }
                }
                Mode::Var | Mode::Block => {
                    let token = self.lex_inside(mode)?;
                    let closing = matches!(token.kind, TokenKind::VarClose | TokenKind::BlockClose);
                    tokens.push(token);
                    if closing {
                        mode = Mode::Content;
                    }
                }
            }
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::new(self.source.len(), self.source.len(), self.line, self.column),
        });
        Ok(tokens)
    }

    /// Lexes raw text until a delimiter. Returns the mode entered when an
    /// opening delimiter was consumed.
    fn lex_content(&mut self, tokens: &mut Vec<Token>) -> Result<Option<Mode>> {
        let start = self.mark();
        let mut text = String::new();

        while let Some(c) = self.peek() {
            if c == '{' {
                match self.peek_at(1) {
                    Some('{') | Some('%') | Some('#') => break,
                    _ => {}
                }
            }
            text.push(c);
            self.bump();
        }

        if !text.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Text(text),
                span: self.span_from(start),
            });
        }

        if self.peek().is_none() {
            return Ok(None);
        }

        let open = self.mark();
        self.bump();
        let kind = self.bump();
        match kind {
            Some('{') => {
                tokens.push(Token {
                    kind: TokenKind::VarOpen,
                    span: self.span_from(open),
                });
                Ok(Some(Mode::Var))
            }
            Some('%') => {
                tokens.push(Token {
                    kind: TokenKind::BlockOpen,
                    span: self.span_from(open),
                });
                Ok(Some(Mode::Block))
            }
            Some('#') => {
                self.skip_comment(open)?;
                Ok(None)
            }
            _ => unreachable!("delimiter peeked before bump"),
        }
    }

    fn skip_comment(&mut self, open: (usize, usize, usize)) -> Result<()> {
        while let Some(c) = self.peek() {
            if c == '#' && self.peek_at(1) == Some('}') {
                self.bump();
                self.bump();
                return Ok(());
            }
            self.bump();
        }
        Err(self.error("unterminated comment", open.1, open.2))
    }

    fn lex_inside(&mut self, mode: Mode) -> Result<Token> {
        // Skip whitespace, newlines included
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }

        let start = self.mark();
        let c = match self.peek() {
            Some(c) => c,
            None => {
                let what = if mode == Mode::Var { "expression" } else { "tag" };
                return Err(self.error(format!("unterminated {}", what), start.1, start.2));
            }
        };

        // Closing delimiters
        if c == '}' && self.peek_at(1) == Some('}') {
            self.bump();
            self.bump();
            return Ok(Token {
                kind: TokenKind::VarClose,
                span: self.span_from(start),
            });
        }
        if c == '%' && self.peek_at(1) == Some('}') {
            self.bump();
            self.bump();
            return Ok(Token {
                kind: TokenKind::BlockClose,
                span: self.span_from(start),
            });
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
                ident.push(self.bump().unwrap());
            }
            return Ok(Token {
                kind: TokenKind::Ident(ident),
                span: self.span_from(start),
            });
        }

        if c.is_ascii_digit() {
            let mut num = String::new();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                num.push(self.bump().unwrap());
            }
            if self.peek() == Some('.') && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit())
            {
                num.push(self.bump().unwrap());
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    num.push(self.bump().unwrap());
                }
            }
            return Ok(Token {
                kind: TokenKind::Num(num),
                span: self.span_from(start),
            });
        }

        if c == '"' || c == '\'' {
            let value = self.lex_string(c, start)?;
            return Ok(Token {
                kind: TokenKind::Str(value),
                span: self.span_from(start),
            });
        }

        let kind = match c {
            '|' => {
                self.bump();
                TokenKind::Pipe
            }
            '.' => {
                self.bump();
                TokenKind::Dot
            }
            ',' => {
                self.bump();
                TokenKind::Comma
            }
            '(' => {
                self.bump();
                TokenKind::LParen
            }
            ')' => {
                self.bump();
                TokenKind::RParen
            }
            '+' => {
                self.bump();
                TokenKind::Plus
            }
            '-' => {
                self.bump();
                TokenKind::Minus
            }
            '*' => {
                self.bump();
                TokenKind::Star
            }
            '/' => {
                self.bump();
                TokenKind::Slash
            }
            '%' => {
                self.bump();
                TokenKind::Percent
            }
            '=' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    return Err(self.error("unexpected character '!'", start.1, start.2));
                }
            }
            '<' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            other => {
                return Err(self.error(
                    format!("unexpected character '{}'", other),
                    start.1,
                    start.2,
                ))
            }
        };

        Ok(Token {
            kind,
            span: self.span_from(start),
        })
    }

    fn lex_string(&mut self, quote: char, start: (usize, usize, usize)) -> Result<String> {
        self.bump();
        let mut value = String::new();

        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal", start.1, start.2)),
                Some(c) if c == quote => return Ok(value),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some('\'') => value.push('\''),
                    Some(other) => {
                        return Err(self.error(
                            format!("unknown escape '\\{}'", other),
                            start.1,
                            start.2,
                        ))
                    }
                    None => {
                        return Err(self.error("unterminated string literal", start.1, start.2))
                    }
                },
                Some(c) => value.push(c),
            }
        }
    }
}

/// Tokenizes a template source into a token stream ending in [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).tokenize()
}
