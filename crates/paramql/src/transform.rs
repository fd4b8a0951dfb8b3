// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! AST rewriting passes applied between metadata extraction and code
//! generation.
//!
//! Passes run in a fixed order, each consuming the tree the previous pass
//! produced:
//!
//! 1. [`fold_constants`] rewrites output expressions whose value is a
//!    literal into text nodes;
//! 2. [`fold_text`] merges adjacent text nodes (including freshly folded
//!    constants) into one run;
//! 3. [`prune_empty_text`] drops zero-length text runs.
//!
//! Every pass borrows its input and builds a new tree, so a failing pass
//! leaves the caller's tree untouched; there is no partial rewrite of a
//! single construct. A synthesized node always inherits the span of the
//! node it replaces, keeping every output position traceable to the
//! original source. Passes never introduce parameter references; metadata
//! is extracted before any pass runs and is not recomputed afterwards.

use crate::ast::{BlockKind, Expr, Node, Span};
use crate::error::{ParamqlError, Result};

/// Applies all rewrite passes in their fixed order.
pub fn transform(ast: &Node) -> Result<Node> {
    let tree = fold_constants(ast)?;
    let tree = fold_text(&tree)?;
    prune_empty_text(&tree)
}

fn transform_error(message: impl Into<String>, span: Span) -> ParamqlError {
    ParamqlError::Transform {
        message: message.into(),
        line: span.line,
        column: span.column,
    }
}

/// Rebuilds a node, applying `f` to every child sequence bottom-up.
fn map_sequences(node: &Node, f: &dyn Fn(Vec<Node>) -> Result<Vec<Node>>) -> Result<Node> {
    let mapped = |nodes: &[Node]| -> Result<Vec<Node>> {
        let rebuilt: Result<Vec<Node>> = nodes.iter().map(|n| map_sequences(n, f)).collect();
        f(rebuilt?)
    };

    match node {
        Node::Root { children, span } => Ok(Node::Root {
            children: mapped(children)?,
            span: *span,
        }),
        Node::Block { kind, span } => {
            let kind = match kind {
                BlockKind::If { arms, else_body } => {
                    if arms.is_empty() {
                        return Err(transform_error("if block with no arms", *span));
                    }
                    let arms = arms
                        .iter()
                        .map(|(cond, body)| Ok((cond.clone(), mapped(body)?)))
                        .collect::<Result<Vec<_>>>()?;
                    let else_body = match else_body {
                        Some(body) => Some(mapped(body)?),
                        None => None,
                    };
                    BlockKind::If { arms, else_body }
                }
                BlockKind::For {
                    var,
                    list,
                    body,
                    else_body,
                } => BlockKind::For {
                    var: var.clone(),
                    list: list.clone(),
                    body: mapped(body)?,
                    else_body: match else_body {
                        Some(body) => Some(mapped(body)?),
                        None => None,
                    },
                },
                BlockKind::Set { name, value } => BlockKind::Set {
                    name: name.clone(),
                    value: value.clone(),
                },
            };
            Ok(Node::Block { kind, span: *span })
        }
        leaf => Ok(leaf.clone()),
    }
}

/// Merges adjacent text nodes. The merged node keeps the first run's
/// position and stretches its byte range to the last run.
pub fn fold_text(ast: &Node) -> Result<Node> {
    map_sequences(ast, &|nodes| {
        let mut folded: Vec<Node> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if let Node::Text {
                content: ref next,
                span: next_span,
            } = node
            {
                if let Some(Node::Text { content, span }) = folded.last_mut() {
                    content.push_str(next);
                    span.end = next_span.end;
                    continue;
                }
            }
            folded.push(node);
        }
        Ok(folded)
    })
}

/// Materializes literal-only output expressions as text, inheriting the
/// expression node's span.
pub fn fold_constants(ast: &Node) -> Result<Node> {
    map_sequences(ast, &|nodes| {
        nodes
            .into_iter()
            .map(|node| match node {
                Node::Expression { ref expr, span } if expr.is_literal() => {
                    Ok(Node::Text {
                        content: literal_text(expr),
                        span,
                    })
                }
                other => Ok(other),
            })
            .collect()
    })
}

/// Drops text nodes whose content is empty.
pub fn prune_empty_text(ast: &Node) -> Result<Node> {
    map_sequences(ast, &|nodes| {
        Ok(nodes
            .into_iter()
            .filter(|node| !matches!(node, Node::Text { content, .. } if content.is_empty()))
            .collect())
    })
}

fn literal_text(expr: &Expr) -> String {
    match expr {
        Expr::Str { value, .. } => value.clone(),
        Expr::Num { literal, .. } => literal.clone(),
        Expr::Bool { value, .. } => value.to_string(),
        _ => unreachable!("caller checked is_literal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::ExtensionRegistry;
    use crate::parser::parse;

    fn parse_ok(source: &str) -> Node {
        let registry = ExtensionRegistry::with_builtins().unwrap();
        parse(source, &registry).unwrap()
    }

    fn root_children(node: &Node) -> &[Node] {
        match node {
            Node::Root { children, .. } => children,
            _ => panic!("expected root"),
        }
    }

    #[test]
    fn plain_template_is_unchanged() {
        let ast = parse_ok("SELECT {{ col }} FROM t");
        let out = transform(&ast).unwrap();
        assert_eq!(ast, out);
    }

    #[test]
    fn literal_expression_becomes_text() {
        let ast = parse_ok("LIMIT {{ 10 }}");
        let out = transform(&ast).unwrap();
        let nodes = root_children(&out);
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            Node::Text { content, span } => {
                assert_eq!(content, "LIMIT 10");
                // Merged run keeps the first node's position
                assert_eq!((span.line, span.column), (1, 1));
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn synthesized_text_inherits_expression_span() {
        let ast = parse_ok("{{ 'x' }}");
        let out = fold_constants(&ast).unwrap();
        match &root_children(&out)[0] {
            Node::Text { content, span } => {
                assert_eq!(content, "x");
                assert_eq!((span.line, span.column), (1, 1));
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn adjacent_text_merges_inside_blocks() {
        let ast = parse_ok("{% if a %}x{{ 1 }}y{% endif %}");
        let out = transform(&ast).unwrap();
        match &root_children(&out)[0] {
            Node::Block {
                kind: BlockKind::If { arms, .. },
                ..
            } => {
                assert_eq!(arms[0].1.len(), 1);
                assert!(
                    matches!(&arms[0].1[0], Node::Text { content, .. } if content == "x1y")
                );
            }
            other => panic!("expected if block, got {other:?}"),
        }
    }

    #[test]
    fn failing_pass_leaves_input_untouched() {
        let bad = Node::Root {
            children: vec![Node::Block {
                kind: BlockKind::If {
                    arms: vec![],
                    else_body: None,
                },
                span: Span::new(0, 0, 3, 7),
            }],
            span: Span::new(0, 0, 1, 1),
        };
        let snapshot = bad.clone();

        let err = transform(&bad).unwrap_err();
        match err {
            ParamqlError::Transform { line, column, .. } => {
                assert_eq!((line, column), (3, 7));
            }
            other => panic!("expected transform error, got {other:?}"),
        }
        assert_eq!(bad, snapshot);
    }
}
