// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

// Allow large error types - the ParamqlError enum contains rich context for
// debugging (source snippets, positions). This is an intentional design choice
// for better DX.
#![allow(clippy::result_large_err)]

//! # paramql
//!
//! Parameterized SQL templating engine for Rust, compiled to Lua.
//!
//! paramql turns Jinja-style SQL templates into compiled Lua modules that
//! render against live data in a sandboxed runtime. Compilation also
//! extracts static metadata: every top-level parameter a template reads,
//! with source positions, plus the error annotations its `{% error %}`
//! tags can raise.
//!
//! ## Features
//!
//! - Jinja-style syntax (`{{ expr }}`, `{% if %}`, `{% for %}`, `{% set %}`)
//! - Static parameter and error-annotation extraction
//! - Constant folding and text merging before code generation
//! - Pluggable tag and filter extensions, validated at compile time
//! - Sandboxed Lua execution with template-position error mapping
//! - Built-in compiled-unit caching keyed on source content
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use paramql::{Engine, FileSystemLoader};
//!
//! let loader = FileSystemLoader::new("./queries");
//! let engine = Engine::with_memory_cache(loader, 100)?;
//!
//! let metadata = engine.metadata("users/list")?;
//! let sql = engine.render("users/list", &serde_json::json!({ "limit": 50 }))?;
//! ```

/// Abstract syntax tree types for templates.
pub mod ast;
/// Compiled unit caching.
pub mod cache;
/// Lua code generation and source maps.
pub mod codegen;
/// The compilation pipeline.
pub mod compiler;
/// Template execution engine.
pub mod engine;
/// Error types and reporting.
pub mod error;
/// Tag and filter extensions.
pub mod extensions;
/// Template tokenization.
pub mod lexer;
/// Template source loading (filesystem, memory).
pub mod loader;
/// Static metadata extraction.
pub mod metadata;
/// Template parser.
pub mod parser;
/// AST transformation passes.
pub mod transform;

pub use cache::{MemoryCache, NoCache, UnitCache};
pub use compiler::{CompiledArtifact, CompiledUnit, Compiler};
pub use engine::{Engine, UndefinedBehavior};
pub use error::{ParamqlError, RenderFault, Result};
pub use extensions::{ExtensionRegistry, FilterExtension, TagExtension};
pub use loader::{FileSystemLoader, MemoryLoader, TemplateLoader};
pub use metadata::{ErrorAnnotation, Location, ParameterMetadata, TemplateMetadata};

#[cfg(test)]
mod tests;
