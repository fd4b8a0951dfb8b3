// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template source loading.
//!
//! This module provides the [`TemplateLoader`] trait and implementations
//! for locating template sources by name.
//!
//! # Loader Implementations
//!
//! - [`FileSystemLoader`]: Loads templates from a root directory
//! - [`MemoryLoader`]: Loads templates from in-memory storage (testing,
//!   embedded use)
//!
//! # Custom Loaders
//!
//! Implement [`TemplateLoader`] for custom loading strategies (network,
//! database, etc.). Implementations must be thread-safe (`Send + Sync`).

use crate::error::{ParamqlError, Result};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Trait for loading template sources by name.
pub trait TemplateLoader: Send + Sync + 'static {
    /// Loads the source for a template name.
    ///
    /// Returns [`ParamqlError::TemplateNotFound`] when the name does not
    /// resolve to a template.
    fn load(&self, name: &str) -> Result<String>;

    /// Checks whether a template name resolves without loading it.
    fn exists(&self, name: &str) -> bool {
        self.load(name).is_ok()
    }
}

/// Filesystem-based template loader.
///
/// Resolves template names relative to a root directory, appending a
/// default extension when the name has none. Names that would escape the
/// root (`..` components) are rejected.
///
/// # Examples
///
/// ```rust,ignore
/// use paramql::FileSystemLoader;
///
/// let loader = FileSystemLoader::new("./queries");
/// // "users/list" resolves to ./queries/users/list.sql
/// let source = loader.load("users/list")?;
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root_dir: PathBuf,
    extension: String,
}

impl FileSystemLoader {
    /// Creates a loader rooted at the given directory, resolving
    /// extension-less names with `.sql`.
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            extension: "sql".to_string(),
        }
    }

    /// Overrides the default file extension for extension-less names.
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ParamqlError::TemplateNotFound(name.to_string()));
        }

        let mut path = self.root_dir.join(relative);
        if path.extension().is_none() {
            path.set_extension(&self.extension);
        }
        Ok(path)
    }
}

impl TemplateLoader for FileSystemLoader {
    fn load(&self, name: &str) -> Result<String> {
        let path = self.resolve(name)?;
        if !path.is_file() {
            return Err(ParamqlError::TemplateNotFound(name.to_string()));
        }
        std::fs::read_to_string(&path).map_err(ParamqlError::Io)
    }

    fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Memory-based template loader that stores sources in a shared map.
///
/// Clones share the same underlying storage, so templates added after an
/// engine is constructed are visible to it.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryLoader {
    /// Creates an empty memory loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a template source.
    pub fn add_template(&self, name: &str, source: &str) {
        if let Ok(mut templates) = self.templates.lock() {
            templates.insert(name.to_string(), source.to_string());
        }
    }

    /// Removes a template.
    pub fn remove_template(&self, name: &str) {
        if let Ok(mut templates) = self.templates.lock() {
            templates.remove(name);
        }
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, name: &str) -> Result<String> {
        let templates = self
            .templates
            .lock()
            .map_err(|_| ParamqlError::Cache("template store lock poisoned".to_string()))?;
        templates
            .get(name)
            .cloned()
            .ok_or_else(|| ParamqlError::TemplateNotFound(name.to_string()))
    }

    fn exists(&self, name: &str) -> bool {
        self.templates
            .lock()
            .map(|templates| templates.contains_key(name))
            .unwrap_or(false)
    }
}
