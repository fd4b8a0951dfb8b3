// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree (AST) types for SQL templates.
//!
//! This module defines the data structures that represent a parsed template.
//! The AST is produced by the parser and consumed by the metadata extractor,
//! the transform passes and the code generator.
//!
//! # Structure
//!
//! A template is represented by a [`Node::Root`] whose children are the
//! document-order sequence of text runs, output expressions, blocks and
//! extension tags. The node set is a closed enum so that every pass over the
//! tree is an exhaustiveness-checked `match`.
//!
//! # Positions
//!
//! Every node and expression carries a [`Span`] with 1-indexed line and
//! column. Transform passes that synthesize a node must give it the span of
//! the node it replaces; no node reachable from a root may be span-less.

use serde::{Deserialize, Serialize};

/// Source location information for error reporting and metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset from the start of the source.
    pub start: usize,
    /// Byte offset of the end (exclusive).
    pub end: usize,
    /// 1-indexed line number.
    pub line: usize,
    /// 1-indexed column number.
    pub column: usize,
}

impl Span {
    /// Creates a new source span.
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// AST node types representing template structure.
///
/// Composite kinds ([`Node::Root`], [`Node::Block`]) own an ordered sequence
/// of children rendered in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// The root of a parsed template.
    Root {
        /// Document-order children.
        children: Vec<Node>,
        /// Span of the whole template.
        span: Span,
    },
    /// Plain text between constructs, emitted verbatim.
    Text {
        /// The text content, whitespace preserved.
        content: String,
        /// Source location of the run.
        span: Span,
    },
    /// An output expression `{{ expr }}`.
    Expression {
        /// The expression to evaluate and write to the output.
        expr: Expr,
        /// Span anchored at the opening `{{`.
        span: Span,
    },
    /// A control-flow block (`{% if %}`, `{% for %}`, `{% set %}`).
    Block {
        /// The block's kind and contents.
        kind: BlockKind,
        /// Span anchored at the opening `{%`.
        span: Span,
    },
    /// An extension tag `{% name arg, ... %}` resolved through the registry.
    Tag {
        /// The registered tag name.
        name: String,
        /// Span of the tag name keyword itself.
        name_span: Span,
        /// Tag arguments in source order.
        args: Vec<Expr>,
        /// Span anchored at the opening `{%`.
        span: Span,
    },
}

impl Node {
    /// Returns the source span of this node.
    pub fn span(&self) -> Span {
        match self {
            Node::Root { span, .. }
            | Node::Text { span, .. }
            | Node::Expression { span, .. }
            | Node::Block { span, .. }
            | Node::Tag { span, .. } => *span,
        }
    }
}

/// The kind of a [`Node::Block`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Conditional block `{% if %}...{% elif %}...{% else %}...{% endif %}`.
    If {
        /// `(condition, body)` pairs for the `if` and each `elif` arm.
        arms: Vec<(Expr, Vec<Node>)>,
        /// Body of the `{% else %}` arm, if present.
        else_body: Option<Vec<Node>>,
    },
    /// Iteration block `{% for ident in expr %}...{% else %}...{% endfor %}`.
    For {
        /// Loop variable bound for the body.
        var: String,
        /// Expression yielding the list to iterate.
        list: Expr,
        /// Nodes rendered once per item.
        body: Vec<Node>,
        /// Nodes rendered when the list is empty.
        else_body: Option<Vec<Node>>,
    },
    /// Local binding `{% set ident = expr %}`, visible until the end of the
    /// enclosing block.
    Set {
        /// The name bound.
        name: String,
        /// The value expression.
        value: Expr,
    },
}

/// An expression appearing in an output, a condition, or a tag argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A dotted variable reference `a.b.c`.
    Var {
        /// Path segments; the first is the root name looked up in the
        /// render scope.
        path: Vec<String>,
        /// Span of the root identifier.
        span: Span,
    },
    /// A string literal with escapes already processed.
    Str {
        /// The unescaped value.
        value: String,
        /// Source location.
        span: Span,
    },
    /// A numeric literal, kept as written so integers stay integers.
    Num {
        /// The literal text (a valid Lua numeral).
        literal: String,
        /// Source location.
        span: Span,
    },
    /// A boolean literal.
    Bool {
        /// The value.
        value: bool,
        /// Source location.
        span: Span,
    },
    /// A unary operation (`not x`, `-x`).
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
        /// Source location of the operator.
        span: Span,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
        /// Source location of the operator.
        span: Span,
    },
    /// A filter application `input | name(args...)`.
    Filter {
        /// The registered filter name.
        name: String,
        /// Span of the filter name.
        name_span: Span,
        /// The piped-in value.
        input: Box<Expr>,
        /// Extra arguments, if the filter was called with parentheses.
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Returns the source span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::Var { span, .. }
            | Expr::Str { span, .. }
            | Expr::Num { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. } => *span,
            Expr::Filter { name_span, .. } => *name_span,
        }
    }

    /// True when the expression is a literal with no variable content.
    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Str { .. } | Expr::Num { .. } | Expr::Bool { .. })
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Logical negation `not`.
    Not,
    /// Arithmetic negation `-`.
    Neg,
}

/// Binary operators, loosest-binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Logical `or`.
    Or,
    /// Logical `and`.
    And,
    /// Equality `==`.
    Eq,
    /// Inequality `!=`.
    Ne,
    /// Less than `<`.
    Lt,
    /// Less than or equal `<=`.
    Le,
    /// Greater than `>`.
    Gt,
    /// Greater than or equal `>=`.
    Ge,
    /// Addition, or concatenation when either side is a string.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Modulo.
    Rem,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_span_accessor() {
        let span = Span::new(0, 5, 1, 1);
        let node = Node::Text {
            content: "SELECT".to_string(),
            span,
        };
        assert_eq!(node.span(), span);
    }

    #[test]
    fn literal_classification() {
        let span = Span::new(0, 1, 1, 1);
        assert!(Expr::Num {
            literal: "1".to_string(),
            span
        }
        .is_literal());
        assert!(!Expr::Var {
            path: vec!["a".to_string()],
            span
        }
        .is_literal());
    }
}
