// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the paramql compilation engine.
//!
//! This module defines [`ParamqlError`], the main error enum, the
//! [`RenderFault`] payload raised out of template execution, and
//! [`SourceContext`] for rich parse-error messages with a source snippet.
//!
//! # Error Categories
//!
//! - **Parse errors**: invalid template syntax, with exact position
//! - **Transform errors**: a rewrite pass met structure it cannot handle
//! - **Codegen errors**: Lua code generation failures
//! - **Render faults**: raised while executing a compiled unit against data
//! - **Configuration errors**: duplicate or conflicting extension registration
//! - **Resolution errors**: template name could not be loaded
//!
//! None of these are retried or swallowed internally; every error surfaces
//! to the caller of the failing compile or render call.

use std::fmt;
use thiserror::Error;

/// Source context for enhanced error messages.
///
/// Captures a snippet of template source around an error location, enabling
/// messages with line numbers and a caret pointing at the exact column.
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// All lines from the template source.
    pub lines: Vec<String>,
    /// The line number where the error occurred (1-indexed).
    pub error_line: usize,
    /// The column number where the error occurred (1-indexed).
    pub error_column: usize,
    /// First line number of the snippet (1-indexed).
    pub snippet_start: usize,
    /// Last line number of the snippet (1-indexed).
    pub snippet_end: usize,
}

impl SourceContext {
    /// Creates a source context from template source and an error location.
    ///
    /// Captures up to 2 lines before and after the error line.
    pub fn from_source(source: &str, line: usize, column: usize) -> Self {
        let lines: Vec<String> = source.lines().map(|l| l.to_string()).collect();
        let snippet_start = line.saturating_sub(2).max(1);
        let snippet_end = (line + 2).min(lines.len().max(1));

        Self {
            lines,
            error_line: line,
            error_column: column,
            snippet_start,
            snippet_end,
        }
    }

    /// Formats the source snippet with line numbers and an error indicator.
    pub fn format_snippet(&self) -> String {
        let mut result = String::new();

        for line_num in self.snippet_start..=self.snippet_end {
            if line_num > self.lines.len() {
                break;
            }

            let line = &self.lines[line_num - 1];
            result.push_str(&format!("{:4} | {}\n", line_num, line));

            if line_num == self.error_line {
                result.push_str(&format!(
                    "     | {}^\n",
                    " ".repeat(self.error_column.saturating_sub(1))
                ));
            }
        }

        result
    }
}

impl fmt::Display for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_snippet())
    }
}

/// Helper struct for displaying an optional source context.
pub struct OptSourceContextDisplay<'a>(pub &'a Option<SourceContext>);

impl<'a> fmt::Display for OptSourceContextDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ctx) => write!(f, "{}", ctx),
            None => Ok(()),
        }
    }
}

/// Helper trait for formatting an optional source context.
pub trait AsDisplay<'a> {
    /// Wraps self for Display formatting.
    fn as_display(&'a self) -> OptSourceContextDisplay<'a>;
}

impl<'a> AsDisplay<'a> for Option<SourceContext> {
    fn as_display(&'a self) -> OptSourceContextDisplay<'a> {
        OptSourceContextDisplay(self)
    }
}

/// A fault raised while executing a compiled unit against data.
///
/// Carries a human-readable message, the originating annotation code when
/// the fault was raised by the built-in `error` tag, and the 1-indexed
/// position of the construct that raised it. Render faults are fatal to the
/// render call that raised them only; the compiled unit stays reusable.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RenderFault {
    /// Human-readable message. For `error` tags this embeds the annotation
    /// text and its zero-based annotation coordinates.
    pub message: String,
    /// The annotation code, when raised from an `error` tag.
    pub code: Option<String>,
    /// 1-indexed line of the originating construct.
    pub line: usize,
    /// 1-indexed column of the originating construct.
    pub column: usize,
}

impl RenderFault {
    /// Creates a fault with no annotation code.
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            code: None,
            line,
            column,
        }
    }

    /// Creates a fault carrying an annotation code.
    pub fn with_code(
        message: impl Into<String>,
        code: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
            line,
            column,
        }
    }
}

/// The main error type for paramql operations.
#[derive(Error, Debug)]
pub enum ParamqlError {
    /// Template parsing failed due to invalid syntax.
    #[error("Parse error: {message} at line {line}, column {column}\n{}", source_context.as_display())]
    Parse {
        /// Description of the parse error.
        message: String,
        /// 1-indexed line where the error occurred.
        line: usize,
        /// 1-indexed column where the error occurred.
        column: usize,
        /// Source context for rich error display.
        source_context: Option<SourceContext>,
    },

    /// A transform pass encountered structure it cannot handle.
    #[error("Transform error: {message} at line {line}, column {column}")]
    Transform {
        /// Description of the failure.
        message: String,
        /// 1-indexed line of the offending node in the original source.
        line: usize,
        /// 1-indexed column of the offending node in the original source.
        column: usize,
    },

    /// Lua code generation failed.
    #[error("Code generation error: {0}")]
    Codegen(String),

    /// The loader could not resolve a template name.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// A fault raised during execution against live data.
    #[error(transparent)]
    Render(#[from] RenderFault),

    /// Duplicate or conflicting extension registration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A cache backend failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Lua runtime error that could not be mapped to a template position.
    #[error("Lua execution error: {0}")]
    Lua(#[from] mlua::Error),

    /// File I/O error from a loader.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParamqlError {
    /// Builds a parse error with a source snippet attached.
    pub fn parse(message: impl Into<String>, source: &str, line: usize, column: usize) -> Self {
        ParamqlError::Parse {
            message: message.into(),
            line,
            column,
            source_context: Some(SourceContext::from_source(source, line, column)),
        }
    }
}

/// Convenience type alias for Results with [`ParamqlError`].
pub type Result<T> = std::result::Result<T, ParamqlError>;
