// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template execution engine.
//!
//! The engine owns a sandboxed Lua runtime and ties the other pieces
//! together: it loads sources through a [`TemplateLoader`], compiles them
//! (with cache reuse keyed on the source hash), evaluates the generated
//! Lua module, and calls its `render`/`execute` entry points with live
//! data.
//!
//! # Examples
//!
//! ```rust,ignore
//! use paramql::{Engine, MemoryLoader};
//! use serde_json::json;
//!
//! let loader = MemoryLoader::new();
//! loader.add_template("greeting", "Hello {{ name }}!");
//!
//! let engine = Engine::with_memory_cache(loader, 64)?;
//! let sql = engine.render("greeting", &json!({ "name": "World" }))?;
//! assert_eq!(sql, "Hello World!");
//! ```
//!
//! # Runtime bridge
//!
//! Generated code never touches Rust state directly. Instead the engine
//! passes a `rt` table of functions into every render call:
//!
//! - `rt.lookup(ctx, name, line, col)`: top-level variable access, which
//!   enforces the undefined-variable policy
//! - `rt.filter(name, value, args, line, col)`: filter dispatch
//! - `rt.tag(name, args, line, col)`: tag dispatch
//!
//! A [`RenderFault`] raised inside one of these crosses the Lua boundary
//! as an external error and is recovered intact on the way out. Plain Lua
//! runtime errors are mapped back to template positions through the
//! compiled unit's source map.

use crate::cache::{MemoryCache, UnitCache};
use crate::compiler::{hash_source, CompiledUnit, Compiler};
use crate::error::{ParamqlError, RenderFault, Result};
use crate::extensions::ExtensionRegistry;
use crate::loader::TemplateLoader;
use crate::metadata::{Location, TemplateMetadata};
use lazy_static::lazy_static;
use mlua::{Lua, LuaSerdeExt, SerializeOptions, Table, Value};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

// JSON null must become Lua nil, not the serde null sentinel, so that
// absent and null data behave identically in lookups and truth tests.
const SERIALIZE_OPTIONS: SerializeOptions = SerializeOptions::new()
    .serialize_none_to_null(false)
    .serialize_unit_to_null(false);

/// Policy for top-level variables the data object does not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndefinedBehavior {
    /// Undefined variables render as the empty string.
    #[default]
    Lenient,
    /// Referencing an undefined variable raises a [`RenderFault`] at the
    /// variable's position.
    Strict,
}

/// The template execution engine.
///
/// An engine is bound to one Lua state and is not `Sync`; share the
/// extension registry and cache across threads instead and give each
/// thread its own engine.
pub struct Engine<L: TemplateLoader> {
    lua: Lua,
    loader: L,
    cache: Box<dyn UnitCache>,
    compiler: Compiler,
    rt: Table,
    strict: Arc<AtomicBool>,
    // Evaluated module tables, keyed by source hash so a recompiled unit
    // never reuses a stale module
    modules: RefCell<HashMap<String, Table>>,
}

impl<L: TemplateLoader> Engine<L> {
    /// Creates an engine over the given loader and cache, using the
    /// built-in extensions and lenient undefined-variable handling.
    pub fn new(loader: L, cache: Box<dyn UnitCache>) -> Result<Self> {
        let registry = ExtensionRegistry::with_builtins()?;
        Self::with_registry(loader, cache, Arc::new(registry))
    }

    /// Creates an engine with an in-memory LRU cache of the given
    /// capacity.
    pub fn with_memory_cache(loader: L, capacity: usize) -> Result<Self> {
        Self::new(loader, Box::new(MemoryCache::new(capacity)))
    }

    /// Creates an engine over a caller-built extension registry.
    ///
    /// The registry is shared read-only with the compiler: tags and
    /// filters available at render time are exactly those that parsing
    /// validated against.
    pub fn with_registry(
        loader: L,
        cache: Box<dyn UnitCache>,
        registry: Arc<ExtensionRegistry>,
    ) -> Result<Self> {
        let lua = Lua::new();
        let globals = lua.globals();
        Self::sandbox_lua(&lua, &globals)?;

        let strict = Arc::new(AtomicBool::new(false));
        let rt = Self::build_runtime(&lua, &registry, &strict)?;

        Ok(Self {
            lua,
            loader,
            cache,
            compiler: Compiler::new(registry),
            rt,
            strict,
            modules: RefCell::new(HashMap::new()),
        })
    }

    /// Sets the undefined-variable policy.
    pub fn undefined_behavior(self, behavior: UndefinedBehavior) -> Self {
        self.strict
            .store(behavior == UndefinedBehavior::Strict, Ordering::Relaxed);
        self
    }

    /// The registry this engine compiles and renders against.
    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        self.compiler.registry()
    }

    /// Sandboxes the Lua environment by disabling dangerous functions
    /// and libraries.
    ///
    /// This removes access to:
    /// - `io` library (file I/O)
    /// - `debug` library (introspection)
    /// - `load`, `loadstring`, `loadfile`, `dofile` (dynamic code execution)
    /// - Most of `os` (keeps only `os.date`, `os.time`, `os.clock`,
    ///   `os.difftime`)
    fn sandbox_lua(lua: &Lua, globals: &Table) -> Result<()> {
        // Save safe os functions before removing the library
        let os_table: Table = globals.get("os")?;
        let os_date: mlua::Function = os_table.get("date")?;
        let os_time: mlua::Function = os_table.get("time")?;
        let os_clock: mlua::Function = os_table.get("clock")?;
        let os_difftime: mlua::Function = os_table.get("difftime")?;

        globals.set("io", Value::Nil)?;
        globals.set("debug", Value::Nil)?;
        globals.set("load", Value::Nil)?;
        globals.set("loadstring", Value::Nil)?;
        globals.set("loadfile", Value::Nil)?;
        globals.set("dofile", Value::Nil)?;

        let safe_os = lua.create_table()?;
        safe_os.set("date", os_date)?;
        safe_os.set("time", os_time)?;
        safe_os.set("clock", os_clock)?;
        safe_os.set("difftime", os_difftime)?;
        globals.set("os", safe_os)?;

        Ok(())
    }

    /// Builds the `rt` dispatch table handed to every render call.
    fn build_runtime(
        lua: &Lua,
        registry: &Arc<ExtensionRegistry>,
        strict: &Arc<AtomicBool>,
    ) -> Result<Table> {
        let rt = lua.create_table()?;

        let strict_flag = strict.clone();
        let lookup = lua.create_function(
            move |_, (ctx, name, line, col): (Table, String, usize, usize)| {
                let value: Value = ctx.get(name.as_str())?;
                if value == Value::Nil && strict_flag.load(Ordering::Relaxed) {
                    return Err(mlua::Error::external(RenderFault::new(
                        format!("'{}' is undefined", name),
                        line,
                        col,
                    )));
                }
                Ok(value)
            },
        )?;
        rt.set("lookup", lookup)?;

        let filter_registry = registry.clone();
        let filter = lua.create_function(
            move |lua, (name, value, args, line, col): (String, Value, Table, usize, usize)| {
                let extension = filter_registry.filter(&name).ok_or_else(|| {
                    mlua::Error::external(RenderFault::new(
                        format!("unknown filter '{}'", name),
                        line,
                        col,
                    ))
                })?;
                let input: JsonValue = lua.from_value(value)?;
                let args = table_to_args(lua, args)?;
                let result = extension
                    .apply(&input, &args)
                    .map_err(|e| fault_to_lua(e, line, col))?;
                lua.to_value_with(&result, SERIALIZE_OPTIONS)
            },
        )?;
        rt.set("filter", filter)?;

        let tag_registry = registry.clone();
        let tag = lua.create_function(
            move |lua, (name, args, line, col): (String, Table, usize, usize)| {
                let extension = tag_registry.tag(&name).ok_or_else(|| {
                    mlua::Error::external(RenderFault::new(
                        format!("unknown tag '{}'", name),
                        line,
                        col,
                    ))
                })?;
                let args = table_to_args(lua, args)?;
                let result = extension
                    .call(&args, Location { line, column: col })
                    .map_err(|e| fault_to_lua(e, line, col))?;
                lua.to_value_with(&result, SERIALIZE_OPTIONS)
            },
        )?;
        rt.set("tag", tag)?;

        Ok(rt)
    }

    /// Returns the compiled unit for a template, reusing the cache while
    /// the loader still serves a source with the same hash.
    pub fn unit(&self, name: &str) -> Result<Arc<CompiledUnit>> {
        let source = self.loader.load(name)?;
        let hash = hash_source(&source);

        if let Some(cached) = self.cache.get(name)? {
            if cached.source_hash == hash {
                debug!(template = name, "compiled unit cache hit");
                return Ok(cached);
            }
            debug!(template = name, "template source changed, recompiling");
        }

        let unit = Arc::new(self.compiler.compile(name, &source)?);
        self.cache.set(name, unit.clone())?;
        Ok(unit)
    }

    /// Compiles a template and returns its static metadata without
    /// rendering it.
    pub fn metadata(&self, name: &str) -> Result<TemplateMetadata> {
        Ok(self.unit(name)?.metadata.clone())
    }

    /// Renders a template against a data object, producing text.
    pub fn render(&self, name: &str, data: &JsonValue) -> Result<String> {
        let unit = self.unit(name)?;
        self.render_unit(&unit, data)
    }

    /// Renders an already compiled unit.
    pub fn render_unit(&self, unit: &CompiledUnit, data: &JsonValue) -> Result<String> {
        let render = self.entry_point(unit, "render")?;
        let ctx = self.lua.to_value_with(data, SERIALIZE_OPTIONS)?;
        render
            .call::<String>((ctx, &self.rt))
            .map_err(|e| self.translate_error(unit, e))
    }

    /// Executes a template against a data object, returning the value of
    /// its last top-level expression, or the rendered text when the
    /// template has none.
    pub fn execute(&self, name: &str, data: &JsonValue) -> Result<JsonValue> {
        let unit = self.unit(name)?;
        self.execute_unit(&unit, data)
    }

    /// Executes an already compiled unit.
    pub fn execute_unit(&self, unit: &CompiledUnit, data: &JsonValue) -> Result<JsonValue> {
        let execute = self.entry_point(unit, "execute")?;
        let ctx = self.lua.to_value_with(data, SERIALIZE_OPTIONS)?;
        let result: Value = execute
            .call((ctx, &self.rt))
            .map_err(|e| self.translate_error(unit, e))?;
        Ok(self.lua.from_value(result)?)
    }

    /// Drops all cached compiled units and evaluated modules.
    pub fn clear_cache(&self) -> Result<()> {
        self.modules.borrow_mut().clear();
        self.cache.clear()
    }

    /// Fetches an exported function from the unit's Lua module, evaluating
    /// the chunk on first use and reusing the module table afterwards. The
    /// module holds no render state, so reuse across calls is safe.
    fn entry_point(&self, unit: &CompiledUnit, name: &str) -> Result<mlua::Function> {
        if let Some(module) = self.modules.borrow().get(&unit.source_hash) {
            return Ok(module.get(name)?);
        }

        let chunk_name = format!("@{}", unit.name);
        let module = self
            .lua
            .load(&unit.lua_code)
            .set_name(chunk_name)
            .eval::<Table>()
            .map_err(|e| self.translate_error(unit, e))?;
        let function = module.get(name)?;
        self.modules
            .borrow_mut()
            .insert(unit.source_hash.clone(), module);
        Ok(function)
    }

    /// Maps a Lua-side failure back into the crate's error taxonomy.
    ///
    /// A [`RenderFault`] raised by an extension or a lookup is recovered
    /// from the callback error chain unchanged. Plain Lua runtime errors
    /// are re-anchored at the template position their generated line maps
    /// to; anything else surfaces as a Lua error.
    fn translate_error(&self, unit: &CompiledUnit, error: mlua::Error) -> ParamqlError {
        if let Some(fault) = extract_fault(&error) {
            return ParamqlError::Render(fault);
        }

        let message = error.to_string();
        if let Some(location) = unit.source_map.locate_error(&message) {
            let message = strip_chunk_positions(&message);
            return ParamqlError::Render(RenderFault::new(
                format!(
                    "{} (template {}, line {}, column {})",
                    message, unit.name, location.line, location.column
                ),
                location.line,
                location.column,
            ));
        }

        ParamqlError::Lua(error)
    }
}

impl<L: TemplateLoader> std::fmt::Debug for Engine<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("strict", &self.strict.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Converts a Lua argument table into the JSON values extensions accept.
fn table_to_args(lua: &Lua, args: Table) -> mlua::Result<Vec<JsonValue>> {
    let mut converted = Vec::with_capacity(args.raw_len());
    for value in args.sequence_values::<Value>() {
        converted.push(lua.from_value(value?)?);
    }
    Ok(converted)
}

/// Wraps an extension failure for transport across the Lua boundary,
/// anchoring position-less faults at the dispatch site.
fn fault_to_lua(error: ParamqlError, line: usize, col: usize) -> mlua::Error {
    match error {
        ParamqlError::Render(mut fault) => {
            if fault.line == 0 {
                fault.line = line;
                fault.column = col;
            }
            mlua::Error::external(fault)
        }
        other => mlua::Error::external(RenderFault::new(other.to_string(), line, col)),
    }
}

/// Recovers a [`RenderFault`] from a Lua error's cause chain, if one is
/// there.
fn extract_fault(error: &mlua::Error) -> Option<RenderFault> {
    match error {
        mlua::Error::CallbackError { cause, .. } => extract_fault(cause),
        mlua::Error::WithContext { cause, .. } => extract_fault(cause),
        mlua::Error::ExternalError(external) => {
            external.downcast_ref::<RenderFault>().cloned()
        }
        _ => None,
    }
}

/// Removes `[string "@name"]:LINE:` markers from a Lua error message; the
/// generated line numbers mean nothing to template authors.
fn strip_chunk_positions(message: &str) -> String {
    lazy_static! {
        static ref CHUNK_RE: Regex =
            Regex::new(r#"\[string "[^"]*"\]:\d+:\s*"#).unwrap();
    }
    CHUNK_RE.replace_all(message, "").trim().to_string()
}
