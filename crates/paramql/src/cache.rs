// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Compiled unit caching.
//!
//! Caching avoids re-running the compilation pipeline for unchanged
//! templates. Entries are keyed by template name and validated against
//! the source hash: the engine discards a cached unit whose hash no
//! longer matches what the loader serves.
//!
//! # Cache Implementations
//!
//! - [`MemoryCache`]: In-memory LRU cache
//! - [`NoCache`]: Disables caching (every render recompiles)
//!
//! Implement the [`UnitCache`] trait for custom strategies.

use crate::compiler::CompiledUnit;
use crate::error::{ParamqlError, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Trait for compiled unit caches.
///
/// Implementations must be thread-safe (`Send + Sync`); the engine calls
/// them concurrently from multiple render threads.
pub trait UnitCache: Send + Sync + std::fmt::Debug {
    /// Retrieves a unit by template name.
    fn get(&self, name: &str) -> Result<Option<Arc<CompiledUnit>>>;
    /// Stores a unit under a template name.
    fn set(&self, name: &str, unit: Arc<CompiledUnit>) -> Result<()>;
    /// Removes a unit.
    fn remove(&self, name: &str) -> Result<()>;
    /// Clears all cached units.
    fn clear(&self) -> Result<()>;
    /// Creates a boxed clone (for use in closures).
    fn clone_box(&self) -> Box<dyn UnitCache>;
}

impl Clone for Box<dyn UnitCache> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// In-memory LRU cache of compiled units.
///
/// Least recently used entries are evicted when capacity is reached.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    cache: Arc<Mutex<LruCache<String, Arc<CompiledUnit>>>>,
}

/// Capacity used by [`MemoryCache::default`].
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

impl MemoryCache {
    /// Creates a cache holding at most `capacity` units. A zero capacity
    /// is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<String, Arc<CompiledUnit>>>> {
        self.cache
            .lock()
            .map_err(|_| ParamqlError::Cache("unit cache lock poisoned".to_string()))
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl UnitCache for MemoryCache {
    fn get(&self, name: &str) -> Result<Option<Arc<CompiledUnit>>> {
        Ok(self.lock()?.get(name).cloned())
    }

    fn set(&self, name: &str, unit: Arc<CompiledUnit>) -> Result<()> {
        self.lock()?.put(name.to_string(), unit);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.lock()?.pop(name);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn UnitCache> {
        Box::new(self.clone())
    }
}

/// A cache that stores nothing.
#[derive(Debug, Clone, Default)]
pub struct NoCache;

impl UnitCache for NoCache {
    fn get(&self, _name: &str) -> Result<Option<Arc<CompiledUnit>>> {
        Ok(None)
    }

    fn set(&self, _name: &str, _unit: Arc<CompiledUnit>) -> Result<()> {
        Ok(())
    }

    fn remove(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn UnitCache> {
        Box::new(self.clone())
    }
}
