// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Compile command: turn a template into its Lua artifact.

use paramql::CompiledArtifact;
use std::path::Path;

/// Compiles one template and prints the result.
///
/// With `--lua` only the generated Lua source is printed; otherwise the
/// full artifact (name, Lua source, source hash, metadata) is emitted as
/// JSON.
pub fn run(root: &Path, extension: &str, name: &str, lua_only: bool) -> anyhow::Result<()> {
    let engine = super::engine_for(root, extension)?;
    let unit = engine.unit(name)?;

    if lua_only {
        print!("{}", unit.lua_code);
        return Ok(());
    }

    let artifact = CompiledArtifact::from(unit.as_ref());
    println!("{}", serde_json::to_string_pretty(&artifact)?);
    Ok(())
}
