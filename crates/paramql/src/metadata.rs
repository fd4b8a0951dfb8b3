// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Static metadata extraction from a parsed template.
//!
//! One read-only traversal of the raw AST collects:
//!
//! - the set of named parameters the template references, each with every
//!   source location it appears at, in first-seen order;
//! - the error annotations declared by `{% error "..." %}` tags, each with
//!   its code and location(s).
//!
//! Extraction runs before any transform pass, so every reported position
//! refers to the caller's original source text. Names bound by `{% for %}`
//! or `{% set %}` (including the implicit `loop` record) are locals, not
//! parameters.
//!
//! A parameter occurrence is anchored at the opening delimiter of the
//! construct whose expression references it: the `{{` of an output
//! expression, or the `{%` of a block or extension tag. Error annotations
//! are anchored at the `error` keyword itself.

use crate::ast::{BlockKind, Expr, Node, Span};
use serde::{Deserialize, Serialize};

/// Name of the built-in error tag whose occurrences become annotations.
pub const ERROR_TAG: &str = "error";

/// Name of the implicit per-iteration record bound inside `{% for %}`.
pub const LOOP_VAR: &str = "loop";

/// A 1-indexed source position reported in template metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-indexed line number.
    pub line: usize,
    /// 1-indexed column number.
    pub column: usize,
}

impl From<Span> for Location {
    fn from(span: Span) -> Self {
        Self {
            line: span.line,
            column: span.column,
        }
    }
}

/// A named parameter and every location it is referenced at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMetadata {
    /// The parameter name (root segment of the reference path).
    pub name: String,
    /// Non-empty, in traversal order.
    pub locations: Vec<Location>,
}

/// An error annotation declared by an `{% error %}` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAnnotation {
    /// The annotation code (the tag's literal argument). Not necessarily
    /// unique within one template.
    pub code: String,
    /// Locations of the tag keyword, in traversal order.
    pub locations: Vec<Location>,
}

/// The aggregate metadata of one compiled unit. Immutable once compilation
/// finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    /// Referenced parameters in first-seen order.
    pub parameters: Vec<ParameterMetadata>,
    /// Declared error annotations in traversal order.
    pub errors: Vec<ErrorAnnotation>,
}

impl TemplateMetadata {
    /// Looks up a parameter entry by name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterMetadata> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Walks the AST once and collects [`TemplateMetadata`]. The tree is not
/// mutated.
pub fn extract(ast: &Node) -> TemplateMetadata {
    let mut collector = Collector::default();
    match ast {
        Node::Root { children, .. } => collector.walk_sequence(children),
        other => collector.walk_sequence(std::slice::from_ref(other)),
    }
    TemplateMetadata {
        parameters: collector.parameters,
        errors: collector.errors,
    }
}

#[derive(Default)]
struct Collector {
    parameters: Vec<ParameterMetadata>,
    errors: Vec<ErrorAnnotation>,
    scope: Vec<String>,
}

impl Collector {
    /// Walks a sibling sequence. `{% set %}` bindings accumulate for the
    /// rest of the sequence and are dropped when it ends.
    fn walk_sequence(&mut self, nodes: &[Node]) {
        let depth = self.scope.len();
        for node in nodes {
            self.walk_node(node);
        }
        self.scope.truncate(depth);
    }

    fn walk_node(&mut self, node: &Node) {
        match node {
            Node::Root { children, .. } => self.walk_sequence(children),
            Node::Text { .. } => {}
            Node::Expression { expr, span } => self.collect_expr(expr, (*span).into()),
            Node::Block { kind, span } => self.walk_block(kind, *span),
            Node::Tag {
                name,
                name_span,
                args,
                span,
            } => {
                for arg in args {
                    self.collect_expr(arg, (*span).into());
                }
                if name == ERROR_TAG {
                    if let Some(Expr::Str { value, .. }) = args.first() {
                        self.record_error(value, (*name_span).into());
                    }
                }
            }
        }
    }

    fn walk_block(&mut self, kind: &BlockKind, span: Span) {
        let anchor: Location = span.into();
        match kind {
            BlockKind::If { arms, else_body } => {
                for (condition, body) in arms {
                    self.collect_expr(condition, anchor);
                    self.walk_sequence(body);
                }
                if let Some(body) = else_body {
                    self.walk_sequence(body);
                }
            }
            BlockKind::For {
                var,
                list,
                body,
                else_body,
            } => {
                self.collect_expr(list, anchor);

                let depth = self.scope.len();
                self.scope.push(var.clone());
                self.scope.push(LOOP_VAR.to_string());
                self.walk_sequence(body);
                self.scope.truncate(depth);

                if let Some(body) = else_body {
                    self.walk_sequence(body);
                }
            }
            BlockKind::Set { name, value } => {
                self.collect_expr(value, anchor);
                self.scope.push(name.clone());
            }
        }
    }

    fn collect_expr(&mut self, expr: &Expr, anchor: Location) {
        match expr {
            Expr::Var { path, .. } => {
                let root = &path[0];
                if !self.scope.iter().any(|bound| bound == root) {
                    self.record_parameter(root, anchor);
                }
            }
            Expr::Str { .. } | Expr::Num { .. } | Expr::Bool { .. } => {}
            Expr::Unary { operand, .. } => self.collect_expr(operand, anchor),
            Expr::Binary { left, right, .. } => {
                self.collect_expr(left, anchor);
                self.collect_expr(right, anchor);
            }
            Expr::Filter { input, args, .. } => {
                self.collect_expr(input, anchor);
                for arg in args {
                    self.collect_expr(arg, anchor);
                }
            }
        }
    }

    fn record_parameter(&mut self, name: &str, location: Location) {
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                if !existing.locations.contains(&location) {
                    existing.locations.push(location);
                }
            }
            None => self.parameters.push(ParameterMetadata {
                name: name.to_string(),
                locations: vec![location],
            }),
        }
    }

    fn record_error(&mut self, code: &str, location: Location) {
        match self.errors.iter_mut().find(|e| e.code == code) {
            Some(existing) => existing.locations.push(location),
            None => self.errors.push(ErrorAnnotation {
                code: code.to_string(),
                locations: vec![location],
            }),
        }
    }
}
