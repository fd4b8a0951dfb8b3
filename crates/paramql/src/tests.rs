// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! End-to-end tests covering the full pipeline: load, compile, extract,
//! render, execute.

use crate::error::{ParamqlError, RenderFault};
use crate::extensions::{ExtensionRegistry, FilterExtension, TagExtension};
use crate::loader::{MemoryLoader, TemplateLoader};
use crate::metadata::Location;
use crate::{Engine, UndefinedBehavior};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

fn engine_with(templates: &[(&str, &str)]) -> Engine<MemoryLoader> {
    let loader = MemoryLoader::new();
    for (name, source) in templates {
        loader.add_template(name, source);
    }
    Engine::with_memory_cache(loader, 16).unwrap()
}

#[test]
fn render_is_deterministic_for_fixed_inputs() {
    let engine = engine_with(&[(
        "q",
        "SELECT * FROM users WHERE tier = '{{ tier }}' LIMIT {{ limit }}",
    )]);
    let data = json!({ "tier": "pro", "limit": 50 });
    let first = engine.render("q", &data).unwrap();
    let second = engine.render("q", &data).unwrap();
    assert_eq!(first, "SELECT * FROM users WHERE tier = 'pro' LIMIT 50");
    assert_eq!(first, second);
}

#[test]
fn compilation_is_reproducible() {
    let engine = engine_with(&[("q", "{% for x in xs %}{{ x }}{% endfor %}")]);
    let a = engine.unit("q").unwrap();
    engine.clear_cache().unwrap();
    let b = engine.unit("q").unwrap();
    assert_eq!(a.lua_code, b.lua_code);
    assert_eq!(a.source_hash, b.source_hash);
    assert_eq!(a.metadata, b.metadata);
}

#[test]
fn metadata_reports_parameter_positions() {
    let engine = engine_with(&[("greeting", "Hello {{ name }}!")]);
    let metadata = engine.metadata("greeting").unwrap();

    assert_eq!(metadata.parameters.len(), 1);
    let param = metadata.parameter("name").unwrap();
    assert_eq!(param.locations, vec![Location { line: 1, column: 7 }]);
}

#[test]
fn metadata_orders_parameters_by_first_use() {
    let engine = engine_with(&[(
        "q",
        "{{ b }} {{ a }}\n{% if a %}{{ c }}{% endif %} {{ b }}",
    )]);
    let metadata = engine.metadata("q").unwrap();
    let names: Vec<&str> = metadata.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["b", "a", "c"]);
    // Repeated uses accumulate locations under one entry
    assert_eq!(metadata.parameter("b").unwrap().locations.len(), 2);
}

#[test]
fn metadata_collects_error_annotations() {
    let engine = engine_with(&[(
        "guard",
        "{% if limit > 100 %}{% error \"LIMIT_TOO_HIGH\" %}{% endif %}",
    )]);
    let metadata = engine.metadata("guard").unwrap();
    assert_eq!(metadata.errors.len(), 1);
    assert_eq!(metadata.errors[0].code, "LIMIT_TOO_HIGH");
}

#[test]
fn error_tag_raises_with_annotation_coordinates() {
    // The raised message embeds the tag keyword's zero-based position;
    // the structured fault keeps the one-based position.
    let engine = engine_with(&[("failing", "\n{% error \"This is an error\" %}\n  ")]);
    let err = engine.render("failing", &json!({})).unwrap_err();
    match err {
        ParamqlError::Render(fault) => {
            assert_eq!(fault.message, "This is an error at 1:3");
            assert_eq!(fault.code.as_deref(), Some("This is an error"));
            assert_eq!((fault.line, fault.column), (2, 4));
        }
        other => panic!("expected a render fault, got {other:?}"),
    }
}

#[test]
fn error_tag_only_raises_when_reached() {
    let engine = engine_with(&[(
        "guard",
        "SELECT 1{% if bad %}{% error \"NOPE\" %}{% endif %}",
    )]);
    assert_eq!(
        engine.render("guard", &json!({ "bad": false })).unwrap(),
        "SELECT 1"
    );
    let err = engine.render("guard", &json!({ "bad": true })).unwrap_err();
    assert!(matches!(err, ParamqlError::Render(f) if f.code.as_deref() == Some("NOPE")));
}

#[test]
fn unclosed_block_reports_the_opening_position() {
    let engine = engine_with(&[("bad", "x\n  {% if a %}body")]);
    let err = engine.render("bad", &json!({})).unwrap_err();
    match err {
        ParamqlError::Parse { message, line, column, .. } => {
            assert!(message.contains("unclosed"));
            assert_eq!((line, column), (2, 3));
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn constant_folding_is_invisible_in_output() {
    let engine = engine_with(&[("q", "SELECT * FROM t LIMIT {{ 10 }}")]);
    assert_eq!(
        engine.render("q", &json!({})).unwrap(),
        "SELECT * FROM t LIMIT 10"
    );
    // The folded literal never becomes a parameter
    assert!(engine.metadata("q").unwrap().parameters.is_empty());
}

#[test]
fn conditionals_follow_template_truthiness() {
    let engine = engine_with(&[(
        "q",
        "{% if items %}has items{% else %}empty{% endif %}",
    )]);
    assert_eq!(engine.render("q", &json!({ "items": [1] })).unwrap(), "has items");
    assert_eq!(engine.render("q", &json!({ "items": [] })).unwrap(), "has items");
    assert_eq!(engine.render("q", &json!({ "items": "" })).unwrap(), "empty");
    assert_eq!(engine.render("q", &json!({ "items": 0 })).unwrap(), "empty");
    assert_eq!(engine.render("q", &json!({})).unwrap(), "empty");
}

#[test]
fn elif_chain_picks_the_first_true_arm() {
    let engine = engine_with(&[(
        "q",
        "{% if n > 10 %}big{% elif n > 5 %}mid{% else %}small{% endif %}",
    )]);
    assert_eq!(engine.render("q", &json!({ "n": 20 })).unwrap(), "big");
    assert_eq!(engine.render("q", &json!({ "n": 7 })).unwrap(), "mid");
    assert_eq!(engine.render("q", &json!({ "n": 1 })).unwrap(), "small");
}

#[test]
fn for_loop_exposes_the_loop_record() {
    let engine = engine_with(&[(
        "q",
        "{% for x in xs %}{{ loop.index }}:{{ x }}{% if not loop.last %}, {% endif %}{% endfor %}",
    )]);
    assert_eq!(
        engine.render("q", &json!({ "xs": ["a", "b", "c"] })).unwrap(),
        "1:a, 2:b, 3:c"
    );
}

#[test]
fn for_else_renders_on_empty_or_missing_lists() {
    let engine = engine_with(&[(
        "q",
        "{% for x in xs %}{{ x }}{% else %}none{% endfor %}",
    )]);
    assert_eq!(engine.render("q", &json!({ "xs": [] })).unwrap(), "none");
    assert_eq!(engine.render("q", &json!({})).unwrap(), "none");
    assert_eq!(engine.render("q", &json!({ "xs": [1, 2] })).unwrap(), "12");
}

#[test]
fn loop_variable_shadows_and_does_not_leak() {
    let engine = engine_with(&[(
        "q",
        "{% for x in xs %}{{ x }}{% endfor %}{{ x }}",
    )]);
    // Inside the loop `x` is the element; outside it falls back to the
    // data object.
    assert_eq!(
        engine
            .render("q", &json!({ "xs": [1, 2], "x": "outer" }))
            .unwrap(),
        "12outer"
    );
    // The loop variable and `loop` itself are not parameters; the list is.
    let metadata = engine.metadata("q").unwrap();
    let names: Vec<&str> = metadata.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["xs", "x"]);
}

#[test]
fn set_binds_for_the_rest_of_the_block() {
    let engine = engine_with(&[(
        "q",
        "{% set limit = 25 %}LIMIT {{ limit }} OFFSET {{ limit * page }}",
    )]);
    assert_eq!(
        engine.render("q", &json!({ "page": 2 })).unwrap(),
        "LIMIT 25 OFFSET 50"
    );
    // The bound name is not a parameter; `page` is.
    let metadata = engine.metadata("q").unwrap();
    assert!(metadata.parameter("limit").is_none());
    assert!(metadata.parameter("page").is_some());
}

#[test]
fn builtin_filters_apply() {
    let engine = engine_with(&[
        ("up", "{{ name | upper }}"),
        ("trimmed", "[{{ s | trim }}]"),
        ("len", "{{ xs | length }}"),
        ("fallback", "{{ missing | default('anonymous') }}"),
        ("joined", "{{ ids | join(', ') }}"),
    ]);
    assert_eq!(engine.render("up", &json!({ "name": "ada" })).unwrap(), "ADA");
    assert_eq!(engine.render("trimmed", &json!({ "s": "  x  " })).unwrap(), "[x]");
    assert_eq!(engine.render("len", &json!({ "xs": [1, 2, 3] })).unwrap(), "3");
    assert_eq!(engine.render("fallback", &json!({})).unwrap(), "anonymous");
    assert_eq!(
        engine.render("joined", &json!({ "ids": [1, 2, 3] })).unwrap(),
        "1, 2, 3"
    );
}

#[test]
fn filter_failures_surface_as_render_faults_with_position() {
    let engine = engine_with(&[("q", "\n{{ n | join }}")]);
    let err = engine.render("q", &json!({ "n": 5 })).unwrap_err();
    match err {
        ParamqlError::Render(fault) => {
            // Anchored at the filter name
            assert_eq!((fault.line, fault.column), (2, 8));
        }
        other => panic!("expected a render fault, got {other:?}"),
    }
}

#[test]
fn unknown_filter_fails_at_compile_time() {
    let engine = engine_with(&[("q", "{{ x | sqljoin }}")]);
    let err = engine.render("q", &json!({})).unwrap_err();
    assert!(matches!(err, ParamqlError::Parse { .. }));
}

#[test]
fn execute_returns_the_last_expression_value() {
    let engine = engine_with(&[(
        "limit",
        "{% if tier == 'pro' %}{{ max * 10 }}{% else %}{{ max }}{% endif %}",
    )]);
    assert_eq!(
        engine
            .execute("limit", &json!({ "tier": "pro", "max": 10 }))
            .unwrap(),
        json!(100)
    );
    assert_eq!(
        engine
            .execute("limit", &json!({ "tier": "free", "max": 10 }))
            .unwrap(),
        json!(10)
    );
}

#[test]
fn execute_falls_back_to_rendered_text() {
    let engine = engine_with(&[("plain", "SELECT 1")]);
    assert_eq!(
        engine.execute("plain", &json!({})).unwrap(),
        json!("SELECT 1")
    );
}

#[test]
fn cache_reuses_units_until_the_source_changes() {
    let loader = MemoryLoader::new();
    loader.add_template("q", "v1 {{ n }}");
    let engine = Engine::with_memory_cache(loader.clone(), 16).unwrap();

    assert_eq!(engine.render("q", &json!({ "n": 1 })).unwrap(), "v1 1");
    let first = engine.unit("q").unwrap();
    let again = engine.unit("q").unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    loader.add_template("q", "v2 {{ n }}");
    assert_eq!(engine.render("q", &json!({ "n": 1 })).unwrap(), "v2 1");
    let rebuilt = engine.unit("q").unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
}

#[test]
fn deleted_template_becomes_not_found() {
    let loader = MemoryLoader::new();
    loader.add_template("q", "SELECT 1");
    let engine = Engine::with_memory_cache(loader.clone(), 16).unwrap();
    assert!(engine.render("q", &json!({})).is_ok());

    loader.remove_template("q");
    assert!(matches!(
        engine.render("q", &json!({})),
        Err(ParamqlError::TemplateNotFound(_))
    ));
}

struct MaskFilter;

impl FilterExtension for MaskFilter {
    fn name(&self) -> &str {
        "mask"
    }

    fn apply(&self, value: &JsonValue, _args: &[JsonValue]) -> crate::Result<JsonValue> {
        let s = value.as_str().unwrap_or_default();
        let masked: String = s.chars().map(|_| '*').collect();
        Ok(JsonValue::String(masked))
    }
}

struct NowTag;

impl TagExtension for NowTag {
    fn name(&self) -> &str {
        "now"
    }

    fn call(&self, _args: &[JsonValue], _location: Location) -> crate::Result<JsonValue> {
        Ok(json!("2026-01-01"))
    }
}

#[test]
fn custom_extensions_register_and_dispatch() {
    let mut registry = ExtensionRegistry::with_builtins().unwrap();
    registry.register_filter(Arc::new(MaskFilter)).unwrap();
    registry.register_tag(Arc::new(NowTag)).unwrap();

    let loader = MemoryLoader::new();
    loader.add_template("q", "{{ secret | mask }} at {% now %}");
    let engine =
        Engine::with_registry(loader, Box::new(crate::MemoryCache::new(4)), Arc::new(registry))
            .unwrap();
    assert_eq!(
        engine.render("q", &json!({ "secret": "hunter2" })).unwrap(),
        "******* at 2026-01-01"
    );
}

#[test]
fn builtins_cannot_be_overridden() {
    let mut registry = ExtensionRegistry::with_builtins().unwrap();

    struct FakeUpper;
    impl FilterExtension for FakeUpper {
        fn name(&self) -> &str {
            "upper"
        }
        fn apply(&self, value: &JsonValue, _args: &[JsonValue]) -> crate::Result<JsonValue> {
            Ok(value.clone())
        }
    }

    let err = registry.register_filter(Arc::new(FakeUpper)).unwrap_err();
    assert!(matches!(err, ParamqlError::Configuration(_)));
}

#[test]
fn custom_fault_carries_code_through_the_engine() {
    struct DenyTag;
    impl TagExtension for DenyTag {
        fn name(&self) -> &str {
            "deny"
        }
        fn call(&self, args: &[JsonValue], location: Location) -> crate::Result<JsonValue> {
            let code = args
                .first()
                .and_then(|a| a.as_str())
                .unwrap_or("DENIED")
                .to_string();
            Err(RenderFault::with_code(
                code.clone(),
                code,
                location.line,
                location.column,
            )
            .into())
        }
    }

    let mut registry = ExtensionRegistry::with_builtins().unwrap();
    registry.register_tag(Arc::new(DenyTag)).unwrap();

    let loader = MemoryLoader::new();
    loader.add_template("q", "{% deny \"ACCESS\" %}");
    let engine =
        Engine::with_registry(loader, Box::new(crate::MemoryCache::new(4)), Arc::new(registry))
            .unwrap();

    let err = engine.render("q", &json!({})).unwrap_err();
    assert!(matches!(err, ParamqlError::Render(f) if f.code.as_deref() == Some("ACCESS")));
}

#[test]
fn strict_mode_only_applies_to_top_level_lookups() {
    let engine = engine_with(&[("q", "{{ user.nickname }}")])
        .undefined_behavior(UndefinedBehavior::Strict);
    // Defined root, missing field: renders empty even in strict mode
    assert_eq!(
        engine.render("q", &json!({ "user": { "name": "ada" } })).unwrap(),
        ""
    );
    // Missing root: raises
    assert!(matches!(
        engine.render("q", &json!({})),
        Err(ParamqlError::Render(_))
    ));
}

#[test]
fn dotted_paths_read_nested_data() {
    let engine = engine_with(&[("q", "{{ user.address.city }}")]);
    assert_eq!(
        engine
            .render("q", &json!({ "user": { "address": { "city": "Zurich" } } }))
            .unwrap(),
        "Zurich"
    );
    // Missing intermediate values degrade to empty output
    assert_eq!(engine.render("q", &json!({ "user": 3 })).unwrap(), "");
}

#[test]
fn arithmetic_and_concatenation() {
    let engine = engine_with(&[
        ("sum", "{{ a + b }}"),
        ("concat", "{{ greeting + ', ' + name }}"),
        ("mod", "{{ n % 3 }}"),
    ]);
    assert_eq!(engine.render("sum", &json!({ "a": 2, "b": 3 })).unwrap(), "5");
    assert_eq!(
        engine
            .render("concat", &json!({ "greeting": "hi", "name": "ada" }))
            .unwrap(),
        "hi, ada"
    );
    assert_eq!(engine.render("mod", &json!({ "n": 7 })).unwrap(), "1");
}

#[test]
fn comments_produce_no_output() {
    let engine = engine_with(&[("q", "a{# not rendered {{ x }} #}b")]);
    assert_eq!(engine.render("q", &json!({})).unwrap(), "ab");
    assert!(engine.metadata("q").unwrap().parameters.is_empty());
}

#[test]
fn filesystem_loader_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("list.sql"),
        "SELECT * FROM users LIMIT {{ limit }}",
    )
    .unwrap();

    let engine =
        Engine::with_memory_cache(crate::FileSystemLoader::new(dir.path()), 16).unwrap();
    assert_eq!(
        engine.render("list", &json!({ "limit": 5 })).unwrap(),
        "SELECT * FROM users LIMIT 5"
    );
}
