// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Metadata command: print a template's static metadata.

use std::path::Path;

/// Compiles one template and prints its metadata as JSON.
pub fn run(root: &Path, extension: &str, name: &str) -> anyhow::Result<()> {
    let engine = super::engine_for(root, extension)?;
    let metadata = engine.metadata(name)?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}
