// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Execute command: evaluate a template and print its result value.

use paramql::UndefinedBehavior;
use std::path::Path;

/// Executes one template against the given data and prints the result
/// value as JSON.
pub fn run(
    root: &Path,
    extension: &str,
    name: &str,
    data: Option<&str>,
    strict: bool,
) -> anyhow::Result<()> {
    let mut engine = super::engine_for(root, extension)?;
    if strict {
        engine = engine.undefined_behavior(UndefinedBehavior::Strict);
    }

    let data = super::parse_data(data)?;
    let result = engine.execute(name, &data)?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
