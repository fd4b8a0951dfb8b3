// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Lua code generation from the transformed AST.
//!
//! The compiled artifact is a self-contained Lua module:
//!
//! ```lua
//! -- Helper functions (__get, __truthy, __tostr, __add)
//!
//! local function render(ctx, rt)
//!     local __output = {}
//!     -- Template body
//!     return table.concat(__output), __last, __has_last
//! end
//!
//! exports.render = render
//! exports.execute = function(ctx, rt) ... end
//! return exports
//! ```
//!
//! `ctx` is the runtime data object bound as the top-level variable scope;
//! `rt` is the engine-provided runtime table whose `lookup`, `filter` and
//! `tag` entries dispatch back into Rust (undefined-variable policy,
//! filter extensions, tag extensions). Loop and `set` bindings become Lua
//! locals prefixed `__l_` so template names can never collide with Lua
//! keywords.
//!
//! Alongside the code, generation produces a [`LuaSourceMap`] that maps
//! generated line numbers back to template positions, used to translate
//! runtime Lua errors into template coordinates.

use crate::ast::{BinaryOp, BlockKind, Expr, Node, Span, UnaryOp};
use crate::error::{ParamqlError, Result};
use crate::metadata::Location;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

/// Maps generated Lua line numbers to template source positions.
///
/// Only significant lines are recorded (those carrying an expression,
/// condition, or tag dispatch). Lookups fall back to the closest preceding
/// mapping, which is correct because generated statements for one construct
/// are contiguous.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LuaSourceMap {
    mappings: BTreeMap<usize, Location>,
}

impl LuaSourceMap {
    /// Creates an empty source map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a mapping from a generated line to a template position.
    pub fn record(&mut self, lua_line: usize, location: Location) {
        self.mappings.insert(lua_line, location);
    }

    /// Finds the template position for a generated line, falling back to
    /// the closest preceding mapping.
    pub fn lookup(&self, lua_line: usize) -> Option<Location> {
        if let Some(&location) = self.mappings.get(&lua_line) {
            return Some(location);
        }
        self.mappings
            .range(..=lua_line)
            .next_back()
            .map(|(_, &location)| location)
    }

    /// Returns true if no mappings are recorded.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Extracts the template position referenced by a Lua error message.
    ///
    /// Lua error messages embed generated line numbers as `:LINE:`; the
    /// first one that maps to a template position wins.
    pub fn locate_error(&self, error_msg: &str) -> Option<Location> {
        lazy_static! {
            static ref LINE_RE: Regex = Regex::new(r":(\d+):").unwrap();
        }

        for caps in LINE_RE.captures_iter(error_msg) {
            if let Ok(lua_line) = caps[1].parse::<usize>() {
                if let Some(location) = self.lookup(lua_line) {
                    return Some(location);
                }
            }
        }
        None
    }
}

/// Escapes a string for embedding in a single-quoted Lua literal.
pub fn escape_lua_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if (c as u32) < 0x20 => escaped.push_str(&format!("\\{}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Generates the Lua module and its source map for a transformed AST.
pub fn generate(ast: &Node, template_name: &str) -> Result<(String, LuaSourceMap)> {
    let mut generator = LuaCodeGenerator::new(template_name);
    generator.generate(ast)?;
    Ok((generator.output, generator.source_map))
}

struct LuaCodeGenerator {
    template_name: String,
    output: String,
    indent_level: usize,
    current_line: usize,
    source_map: LuaSourceMap,
    counter: usize,
    scope: Vec<String>,
}

impl LuaCodeGenerator {
    fn new(template_name: &str) -> Self {
        Self {
            template_name: template_name.to_string(),
            output: String::new(),
            indent_level: 0,
            current_line: 1,
            source_map: LuaSourceMap::new(),
            counter: 0,
            scope: Vec::new(),
        }
    }

    fn write_line(&mut self, line: &str) {
        if !line.is_empty() {
            for _ in 0..self.indent_level {
                self.output.push_str("    ");
            }
            self.output.push_str(line);
        }
        self.output.push('\n');
        self.current_line += 1;
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level -= 1;
    }

    /// Records a source mapping for the next written line.
    fn map_next(&mut self, span: Span) {
        self.source_map.record(self.current_line, span.into());
    }

    fn next_id(&mut self) -> usize {
        self.counter += 1;
        self.counter
    }

    fn generate(&mut self, ast: &Node) -> Result<()> {
        let children = match ast {
            Node::Root { children, .. } => children,
            other => {
                return Err(ParamqlError::Codegen(format!(
                    "expected a root node, got {:?}",
                    other.span()
                )))
            }
        };

        self.write_line("-- Generated Lua template module");
        self.write_line(&format!(
            "-- Template: {}",
            escape_lua_string(&self.template_name.clone())
        ));
        self.write_line("local exports = {}");
        self.write_line("");

        self.generate_helpers();

        self.write_line("local function render(ctx, rt)");
        self.indent();
        self.write_line("ctx = ctx or {}");
        self.write_line("local __output = {}");
        self.write_line("local __last = nil");
        self.write_line("local __has_last = false");
        self.write_line("local function __write(content)");
        self.indent();
        self.write_line("__output[#__output + 1] = content");
        self.dedent();
        self.write_line("end");
        self.write_line("");

        self.generate_nodes(children)?;

        self.write_line("");
        self.write_line("return table.concat(__output), __last, __has_last");
        self.dedent();
        self.write_line("end");

        self.write_line("");
        self.write_line("exports.render = render");
        self.write_line("exports.execute = function(ctx, rt)");
        self.indent();
        self.write_line("local text, last, has_last = render(ctx, rt)");
        self.write_line("if has_last then");
        self.indent();
        self.write_line("return last");
        self.dedent();
        self.write_line("end");
        self.write_line("return text");
        self.dedent();
        self.write_line("end");
        self.write_line(&format!(
            "exports.templateName = '{}'",
            escape_lua_string(&self.template_name.clone())
        ));
        self.write_line("");
        self.write_line("return exports");

        Ok(())
    }

    fn generate_helpers(&mut self) {
        self.write_line("local function __get(value, key)");
        self.indent();
        self.write_line("if type(value) == 'table' then");
        self.indent();
        self.write_line("return value[key]");
        self.dedent();
        self.write_line("end");
        self.write_line("return nil");
        self.dedent();
        self.write_line("end");
        self.write_line("");

        // nil, false, 0 and '' are falsy; everything else is truthy
        self.write_line("local function __truthy(value)");
        self.indent();
        self.write_line("if value == nil or value == false then");
        self.indent();
        self.write_line("return false");
        self.dedent();
        self.write_line("end");
        self.write_line("if value == 0 or value == '' then");
        self.indent();
        self.write_line("return false");
        self.dedent();
        self.write_line("end");
        self.write_line("return true");
        self.dedent();
        self.write_line("end");
        self.write_line("");

        self.write_line("local function __tostr(value)");
        self.indent();
        self.write_line("if value == nil then");
        self.indent();
        self.write_line("return ''");
        self.dedent();
        self.write_line("end");
        self.write_line("if type(value) == 'table' then");
        self.indent();
        self.write_line("error('cannot render a table value', 3)");
        self.dedent();
        self.write_line("end");
        self.write_line("return tostring(value)");
        self.dedent();
        self.write_line("end");
        self.write_line("");

        self.write_line("local function __add(a, b)");
        self.indent();
        self.write_line("if type(a) == 'string' or type(b) == 'string' then");
        self.indent();
        self.write_line("return __tostr(a) .. __tostr(b)");
        self.dedent();
        self.write_line("end");
        self.write_line("return a + b");
        self.dedent();
        self.write_line("end");
        self.write_line("");
    }

    /// Emits a sibling sequence. `{% set %}` bindings accumulate for the
    /// rest of the sequence and drop when it ends, matching the Lua scope
    /// of the emitted locals.
    fn generate_nodes(&mut self, nodes: &[Node]) -> Result<()> {
        let depth = self.scope.len();
        for node in nodes {
            self.generate_node(node)?;
        }
        self.scope.truncate(depth);
        Ok(())
    }

    fn generate_node(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Root { children, .. } => self.generate_nodes(children),
            Node::Text { content, span } => {
                self.map_next(*span);
                let line = format!("__write('{}')", escape_lua_string(content));
                self.write_line(&line);
                Ok(())
            }
            Node::Expression { expr, span } => {
                let code = self.expr_code(expr);
                self.map_next(*span);
                self.write_line(&format!("__last = {}", code));
                self.write_line("__has_last = true");
                self.map_next(*span);
                self.write_line("__write(__tostr(__last))");
                Ok(())
            }
            Node::Block { kind, span } => self.generate_block(kind, *span),
            Node::Tag {
                name,
                name_span,
                args,
                ..
            } => {
                let args_code = self.args_table(args);
                self.map_next(*name_span);
                let line = format!(
                    "__write(__tostr(rt.tag('{}', {}, {}, {})))",
                    escape_lua_string(name),
                    args_code,
                    name_span.line,
                    name_span.column
                );
                self.write_line(&line);
                Ok(())
            }
        }
    }

    fn generate_block(&mut self, kind: &BlockKind, span: Span) -> Result<()> {
        match kind {
            BlockKind::If { arms, else_body } => {
                for (i, (condition, body)) in arms.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "elseif" };
                    let cond_code = self.expr_code(condition);
                    self.map_next(span);
                    self.write_line(&format!("{} __truthy({}) then", keyword, cond_code));
                    self.indent();
                    self.generate_nodes(body)?;
                    self.dedent();
                }
                if let Some(body) = else_body {
                    self.write_line("else");
                    self.indent();
                    self.generate_nodes(body)?;
                    self.dedent();
                }
                self.write_line("end");
                Ok(())
            }
            BlockKind::For {
                var,
                list,
                body,
                else_body,
            } => {
                let id = self.next_id();
                let list_code = self.expr_code(list);
                self.map_next(span);
                self.write_line(&format!("local __list{} = {}", id, list_code));
                self.write_line(&format!("local __len{} = 0", id));
                self.write_line(&format!("if type(__list{}) == 'table' then", id));
                self.indent();
                self.write_line(&format!("__len{} = #__list{}", id, id));
                self.dedent();
                self.write_line("end");
                self.write_line(&format!("if __len{} > 0 then", id));
                self.indent();
                self.write_line(&format!("for __i{} = 1, __len{} do", id, id));
                self.indent();
                self.write_line(&format!("local __l_{} = __list{}[__i{}]", var, id, id));
                self.write_line(&format!(
                    "local __l_loop = {{ index = __i{id}, index0 = __i{id} - 1, first = __i{id} == 1, last = __i{id} == __len{id}, length = __len{id} }}",
                    id = id
                ));

                let depth = self.scope.len();
                self.scope.push(var.clone());
                self.scope.push("loop".to_string());
                self.generate_nodes(body)?;
                self.scope.truncate(depth);

                self.dedent();
                self.write_line("end");
                self.dedent();
                if let Some(body) = else_body {
                    self.write_line("else");
                    self.indent();
                    self.generate_nodes(body)?;
                    self.dedent();
                }
                self.write_line("end");
                Ok(())
            }
            BlockKind::Set { name, value } => {
                let code = self.expr_code(value);
                self.map_next(span);
                self.write_line(&format!("local __l_{} = {}", name, code));
                self.scope.push(name.clone());
                Ok(())
            }
        }
    }

    fn args_table(&mut self, args: &[Expr]) -> String {
        let parts: Vec<String> = args.iter().map(|arg| self.expr_code(arg)).collect();
        format!("{{ {} }}", parts.join(", "))
    }

    fn expr_code(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Var { path, span } => {
                let root = &path[0];
                let mut code = if self.scope.iter().any(|bound| bound == root) {
                    format!("__l_{}", root)
                } else {
                    format!(
                        "rt.lookup(ctx, '{}', {}, {})",
                        escape_lua_string(root),
                        span.line,
                        span.column
                    )
                };
                for segment in &path[1..] {
                    code = format!("__get({}, '{}')", code, escape_lua_string(segment));
                }
                code
            }
            Expr::Str { value, .. } => format!("'{}'", escape_lua_string(value)),
            Expr::Num { literal, .. } => literal.clone(),
            Expr::Bool { value, .. } => value.to_string(),
            Expr::Unary { op, operand, .. } => {
                let operand_code = self.expr_code(operand);
                match op {
                    UnaryOp::Not => format!("(not __truthy({}))", operand_code),
                    UnaryOp::Neg => format!("(-({}))", operand_code),
                }
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let l = self.expr_code(left);
                let r = self.expr_code(right);
                match op {
                    // Short-circuit with template truthiness, evaluating
                    // each side at most once
                    BinaryOp::Or => format!(
                        "(function() local __v = {} if __truthy(__v) then return __v end return {} end)()",
                        l, r
                    ),
                    BinaryOp::And => format!(
                        "(function() local __v = {} if not __truthy(__v) then return __v end return {} end)()",
                        l, r
                    ),
                    BinaryOp::Eq => format!("({} == {})", l, r),
                    BinaryOp::Ne => format!("({} ~= {})", l, r),
                    BinaryOp::Lt => format!("({} < {})", l, r),
                    BinaryOp::Le => format!("({} <= {})", l, r),
                    BinaryOp::Gt => format!("({} > {})", l, r),
                    BinaryOp::Ge => format!("({} >= {})", l, r),
                    BinaryOp::Add => format!("__add({}, {})", l, r),
                    BinaryOp::Sub => format!("({} - {})", l, r),
                    BinaryOp::Mul => format!("({} * {})", l, r),
                    BinaryOp::Div => format!("({} / {})", l, r),
                    BinaryOp::Rem => format!("({} % {})", l, r),
                }
            }
            Expr::Filter {
                name,
                name_span,
                input,
                args,
            } => {
                let input_code = self.expr_code(input);
                let args_code = self.args_table(args);
                format!(
                    "rt.filter('{}', {}, {}, {}, {})",
                    escape_lua_string(name),
                    input_code,
                    args_code,
                    name_span.line,
                    name_span.column
                )
            }
        }
    }
}
