// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The built-in `error` tag.
//!
//! `{% error "CODE: message" %}` binds its literal argument and the tag
//! keyword's source position at parse time. Whenever rendering reaches the
//! tag it raises a [`RenderFault`] unconditionally rather than performing a static
//! check. The fault's structured location is the 1-indexed position of the
//! keyword; the message embeds the zero-based annotation coordinates
//! (`line:column`) used by error-annotation tooling, so a tag at line 2,
//! column 4 produces a message ending in `at 1:3`.
//!
//! The literal's string escapes are processed by the lexer; the unescaped
//! text is embedded verbatim with no further interpolation.

use crate::error::{RenderFault, Result};
use crate::extensions::TagExtension;
use crate::metadata::Location;
use serde_json::Value as JsonValue;

/// The error-raising tag extension.
pub struct ErrorTag;

impl TagExtension for ErrorTag {
    fn name(&self) -> &str {
        crate::metadata::ERROR_TAG
    }

    fn call(&self, args: &[JsonValue], location: Location) -> Result<JsonValue> {
        let code = match args.first() {
            Some(JsonValue::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                return Err(RenderFault::new(
                    format!(
                        "error tag requires a message at {}:{}",
                        location.line.saturating_sub(1),
                        location.column.saturating_sub(1)
                    ),
                    location.line,
                    location.column,
                )
                .into())
            }
        };

        let message = format!(
            "{} at {}:{}",
            code,
            location.line.saturating_sub(1),
            location.column.saturating_sub(1)
        );
        Err(RenderFault::with_code(message, code, location.line, location.column).into())
    }
}
