// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Extension registry for custom tags and filters.
//!
//! Extensions plug into two phases: the parser consults the registry to
//! recognize tag and filter names, and the render engine dispatches to the
//! same instances when the compiled artifact reaches them.
//!
//! The registry is built once at startup ([`ExtensionRegistry::with_builtins`]
//! followed by any user registrations) and handed to the compiler and the
//! engine behind an `Arc`, read-only from then on. Registering a duplicate
//! name, or attempting to override a built-in, fails with a configuration
//! error at registration time, never at render time.

/// Built-in `error` tag.
pub mod error_tag;
/// Built-in value filters.
pub mod filters;

pub use error_tag::ErrorTag;

use crate::error::{ParamqlError, Result};
use crate::metadata::Location;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A tag extension: introduces `{% name arg, ... %}` syntax and runs custom
/// behavior whenever that branch of the template is reached during rendering.
pub trait TagExtension: Send + Sync + 'static {
    /// The tag name this extension owns.
    fn name(&self) -> &str;

    /// Invoked at render time with the evaluated arguments and the tag
    /// keyword's source location. The returned value is written to the
    /// output; returning an error aborts the render.
    fn call(&self, args: &[JsonValue], location: Location) -> Result<JsonValue>;
}

/// A filter extension: a named transform applied to an expression value via
/// `value | name(args...)`.
pub trait FilterExtension: Send + Sync + 'static {
    /// The filter name this extension owns.
    fn name(&self) -> &str;

    /// Applies the filter. Errors abort the render; the engine attaches the
    /// filter's source position when the returned fault does not carry one.
    fn apply(&self, value: &JsonValue, args: &[JsonValue]) -> Result<JsonValue>;
}

/// Registration point for tag and filter extensions.
///
/// Owns the name-to-extension mapping exclusively. Extensions must not hold
/// mutable cross-template state; instances are shared across every compile
/// and render that the registry serves.
#[derive(Default)]
pub struct ExtensionRegistry {
    tags: HashMap<String, Arc<dyn TagExtension>>,
    filters: HashMap<String, Arc<dyn FilterExtension>>,
    builtin_tags: HashSet<String>,
    builtin_filters: HashSet<String>,
}

impl ExtensionRegistry {
    /// Creates an empty registry with no built-ins. Most callers want
    /// [`ExtensionRegistry::with_builtins`] instead.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with the built-in extensions: the
    /// `error` tag and the `upper`, `lower`, `trim`, `length`, `default`
    /// and `join` filters. Built-ins are sealed: user extensions may be
    /// layered on but can never take over a built-in name.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();

        registry.register_tag(Arc::new(ErrorTag))?;
        registry.builtin_tags = registry.tags.keys().cloned().collect();

        for filter in filters::builtins() {
            registry.register_filter(filter)?;
        }
        registry.builtin_filters = registry.filters.keys().cloned().collect();

        Ok(registry)
    }

    /// Registers a tag extension under its declared name.
    pub fn register_tag(&mut self, extension: Arc<dyn TagExtension>) -> Result<()> {
        let name = extension.name().to_string();
        if self.builtin_tags.contains(&name) {
            return Err(ParamqlError::Configuration(format!(
                "cannot override built-in tag '{}'",
                name
            )));
        }
        if self.tags.contains_key(&name) {
            return Err(ParamqlError::Configuration(format!(
                "tag '{}' is already registered",
                name
            )));
        }
        self.tags.insert(name, extension);
        Ok(())
    }

    /// Registers a filter extension under its declared name.
    pub fn register_filter(&mut self, extension: Arc<dyn FilterExtension>) -> Result<()> {
        let name = extension.name().to_string();
        if self.builtin_filters.contains(&name) {
            return Err(ParamqlError::Configuration(format!(
                "cannot override built-in filter '{}'",
                name
            )));
        }
        if self.filters.contains_key(&name) {
            return Err(ParamqlError::Configuration(format!(
                "filter '{}' is already registered",
                name
            )));
        }
        self.filters.insert(name, extension);
        Ok(())
    }

    /// True when a tag extension owns `name`.
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// True when a filter extension owns `name`.
    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Looks up a tag extension by name.
    pub fn tag(&self, name: &str) -> Option<&Arc<dyn TagExtension>> {
        self.tags.get(name)
    }

    /// Looks up a filter extension by name.
    pub fn filter(&self, name: &str) -> Option<&Arc<dyn FilterExtension>> {
        self.filters.get(name)
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}
