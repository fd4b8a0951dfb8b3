// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CLI command implementations.
//!
//! This module contains the implementations for all paramql CLI commands:
//!
//! - `compile`: Compile a template and emit its Lua artifact
//! - `metadata`: Print a template's static metadata as JSON
//! - `render`: Render a template against a data object
//! - `execute`: Execute a template and print its result value

/// Template compilation command.
pub mod compile;
/// Template execution command.
pub mod execute;
/// Metadata inspection command.
pub mod metadata;
/// Template rendering command.
pub mod render;

use anyhow::Context;
use paramql::{Engine, FileSystemLoader};
use serde_json::Value as JsonValue;
use std::path::Path;

/// Builds an engine over a template root directory.
pub(crate) fn engine_for(root: &Path, extension: &str) -> anyhow::Result<Engine<FileSystemLoader>> {
    anyhow::ensure!(
        root.is_dir(),
        "template root '{}' is not a directory",
        root.display()
    );
    let loader = FileSystemLoader::new(root).with_extension(extension);
    Ok(Engine::with_memory_cache(loader, 64)?)
}

/// Parses the `--data` argument: inline JSON, or `@file` to read a file.
pub(crate) fn parse_data(data: Option<&str>) -> anyhow::Result<JsonValue> {
    let Some(data) = data else {
        return Ok(JsonValue::Object(Default::default()));
    };
    let text = match data.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read data file '{}'", path))?,
        None => data.to_string(),
    };
    serde_json::from_str(&text).context("data is not valid JSON")
}
