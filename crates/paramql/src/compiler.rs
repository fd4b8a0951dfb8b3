// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The compilation pipeline: parse, extract metadata, transform, generate.

use crate::codegen::{generate, LuaSourceMap};
use crate::error::Result;
use crate::extensions::ExtensionRegistry;
use crate::metadata::{extract, TemplateMetadata};
use crate::parser::parse;
use crate::transform::transform;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// The immutable result of compiling one template.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// The template's registered name.
    pub name: String,
    /// The generated Lua module source.
    pub lua_code: String,
    /// SHA-256 of the template source, hex-encoded. Used for cache
    /// invalidation: a unit is only reused while the loader still serves
    /// a source with the same hash.
    pub source_hash: String,
    /// Statically extracted metadata.
    pub metadata: TemplateMetadata,
    /// Maps generated Lua lines back to template positions.
    pub source_map: LuaSourceMap,
}

/// Serializable view of a compiled unit, for the CLI's artifact output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledArtifact {
    /// The template's registered name.
    pub name: String,
    /// The generated Lua module source.
    pub lua_code: String,
    /// SHA-256 of the template source, hex-encoded.
    pub source_hash: String,
    /// Statically extracted metadata.
    pub metadata: TemplateMetadata,
}

impl From<&CompiledUnit> for CompiledArtifact {
    fn from(unit: &CompiledUnit) -> Self {
        Self {
            name: unit.name.clone(),
            lua_code: unit.lua_code.clone(),
            source_hash: unit.source_hash.clone(),
            metadata: unit.metadata.clone(),
        }
    }
}

/// Hashes a template source for cache invalidation.
pub fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compiles template sources into [`CompiledUnit`]s.
///
/// The compiler holds a read-only extension registry shared with the
/// engine; parsing validates tag and filter names against it, so an
/// unregistered extension is a compile-time error rather than a render
/// failure.
#[derive(Debug, Clone)]
pub struct Compiler {
    registry: Arc<ExtensionRegistry>,
}

impl Compiler {
    /// Creates a compiler over the given registry.
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this compiler validates against.
    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// Runs the full pipeline on one template source.
    ///
    /// Metadata is extracted from the parse tree before any transform
    /// runs, so parameter positions always refer to the original source.
    pub fn compile(&self, name: &str, source: &str) -> Result<CompiledUnit> {
        debug!(template = name, "compiling template");

        let ast = parse(source, &self.registry)?;
        let metadata = extract(&ast);
        let transformed = transform(&ast)?;
        let (lua_code, source_map) = generate(&transformed, name)?;

        debug!(
            template = name,
            parameters = metadata.parameters.len(),
            lua_lines = lua_code.lines().count(),
            "compiled template"
        );

        Ok(CompiledUnit {
            name: name.to_string(),
            lua_code,
            source_hash: hash_source(source),
            metadata,
            source_map,
        })
    }
}

impl Default for Compiler {
    /// A compiler with only the built-in extensions registered.
    fn default() -> Self {
        // with_builtins only fails on duplicate built-in names, which
        // would be a bug in this crate rather than a runtime condition.
        let registry = ExtensionRegistry::with_builtins()
            .unwrap_or_else(|_| unreachable!("built-in extension names are distinct"));
        Self::new(Arc::new(registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParamqlError;
    use crate::metadata::Location;

    #[test]
    fn compiles_a_template_end_to_end() {
        let compiler = Compiler::default();
        let unit = compiler
            .compile("greeting", "Hello {{ name }}!")
            .unwrap();

        assert_eq!(unit.name, "greeting");
        assert!(unit.lua_code.contains("rt.lookup(ctx, 'name'"));
        assert_eq!(unit.metadata.parameters.len(), 1);
        assert_eq!(unit.metadata.parameters[0].name, "name");
        assert_eq!(
            unit.metadata.parameters[0].locations,
            vec![Location { line: 1, column: 7 }]
        );
    }

    #[test]
    fn metadata_reflects_the_source_not_the_transform() {
        // Constant folding rewrites the expression into text, but the
        // parameter positions of the surrounding source are unchanged.
        let compiler = Compiler::default();
        let unit = compiler
            .compile("q", "SELECT * FROM t LIMIT {{ 10 }} -- {{ n }}")
            .unwrap();
        assert!(unit.lua_code.contains("LIMIT 10"));
        assert_eq!(unit.metadata.parameters.len(), 1);
        assert_eq!(unit.metadata.parameters[0].name, "n");
    }

    #[test]
    fn source_hash_tracks_content() {
        let compiler = Compiler::default();
        let a = compiler.compile("t", "SELECT 1").unwrap();
        let b = compiler.compile("t", "SELECT 2").unwrap();
        let a2 = compiler.compile("t", "SELECT 1").unwrap();
        assert_ne!(a.source_hash, b.source_hash);
        assert_eq!(a.source_hash, a2.source_hash);
        assert_eq!(a.source_hash.len(), 64);
    }

    #[test]
    fn parse_errors_surface_with_position() {
        let compiler = Compiler::default();
        let err = compiler.compile("bad", "{% if x %}no end").unwrap_err();
        match err {
            ParamqlError::Parse { line, column, .. } => {
                assert_eq!((line, column), (1, 1));
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_filter_is_a_compile_error() {
        let compiler = Compiler::default();
        let err = compiler.compile("bad", "{{ x | nope }}").unwrap_err();
        assert!(matches!(err, ParamqlError::Parse { .. }));
        assert!(err.to_string().contains("nope"));
    }
}
