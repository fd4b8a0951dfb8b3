// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Render command: produce text from a template and a data object.

use paramql::UndefinedBehavior;
use std::path::Path;

/// Renders one template against the given data and prints the output.
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
    let output = engine.render(name, &data)?;
    println!("{}", output);
    Ok(())
}
