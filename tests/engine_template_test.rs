//! Template-engine behavior across the public surface: native-type
//! substitution, omit handling, name generation, and caching.

mod common;

use formation::domain::raw::RawDoc;
use formation::engine::{EngineError, TemplateEngine, Value, VarScope};

use common::doc;

fn scope(yaml: &str) -> VarScope {
    let Value::Map(m) = Value::from(&doc(yaml)) else {
        panic!("scope fixture must be a map")
    };
    m
}

#[test]
fn generate_name_matches_known_fingerprints() {
    let engine = TemplateEngine::new();
    let vars = scope("x: 1\n");

    let single = engine
        .eval_expression("oc_generate_name('Hello World!')", &vars)
        .unwrap();
    assert_eq!(single, Value::String("hello-world-7f83b165".into()));

    let double = engine
        .eval_expression("oc_generate_name('my-app', 'v1.2.3')", &vars)
        .unwrap();
    assert_eq!(double, Value::String("my-app-v1.2.3-4f878dd8".into()));
}

#[test]
fn generate_name_truncates_body_never_suffix() {
    let engine = TemplateEngine::new();
    let body = "a".repeat(90);
    let vars = scope(&format!("name: {body}\n"));

    let value = engine
        .eval_expression("oc_generate_name(name)", &vars)
        .unwrap();
    let Value::String(name) = value else { panic!() };
    assert_eq!(name.len(), 63);

    // The suffix is derived from the pre-truncation input.
    let expected_suffix = formation::engine::hash_hex8(&body);
    assert!(name.ends_with(&expected_suffix));
}

#[test]
fn omit_in_conditional_map_drops_only_empty_fields() {
    let engine = TemplateEngine::new();
    let template = doc(concat!(
        "sizeLimit: '${parameters.sizeLimit != \"\" ? parameters.sizeLimit : omit()}'\n",
        "medium: '${parameters.medium != \"\" ? parameters.medium : omit()}'\n",
    ));
    let rendered = engine
        .render(
            &template,
            &scope("parameters:\n  sizeLimit: 1Gi\n  medium: ''\n"),
        )
        .unwrap();

    let map = rendered.as_map().unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map["sizeLimit"], RawDoc::String("1Gi".into()));
}

#[test]
fn omit_in_lists_removes_elements_but_keeps_empty_maps() {
    let engine = TemplateEngine::new();
    let template = doc(concat!(
        "args: \"${flags.filter(f, f != 'drop').map(f, f == 'skip' ? omit() : f)}\"\n",
        "annotations:\n",
        "  only: ${omit()}\n",
    ));
    let rendered = engine
        .render(&template, &scope("flags: [keep, drop, skip]\n"))
        .unwrap();

    assert_eq!(
        rendered.lookup("args"),
        Some(&RawDoc::List(vec![RawDoc::String("keep".into())]))
    );
    // The map emptied by omission stays as {}.
    assert_eq!(rendered.lookup("annotations"), Some(&RawDoc::empty_map()));
}

#[test]
fn single_expression_yields_native_types() {
    let engine = TemplateEngine::new();
    let template = doc(concat!(
        "int: ${p.count}\n",
        "bool: ${p.enabled}\n",
        "list: ${p.items}\n",
        "interpolated: count=${p.count} enabled=${p.enabled}\n",
    ));
    let rendered = engine
        .render(
            &template,
            &scope("p:\n  count: 7\n  enabled: true\n  items: [1, 2]\n"),
        )
        .unwrap();

    assert_eq!(rendered.lookup("int"), Some(&RawDoc::Int(7)));
    assert_eq!(rendered.lookup("bool"), Some(&RawDoc::Bool(true)));
    assert_eq!(
        rendered.lookup("list"),
        Some(&RawDoc::List(vec![RawDoc::Int(1), RawDoc::Int(2)]))
    );
    assert_eq!(
        rendered.lookup("interpolated"),
        Some(&RawDoc::String("count=7 enabled=true".into()))
    );
}

#[test]
fn map_key_expressions_must_be_strings() {
    let engine = TemplateEngine::new();
    let err = engine
        .render(&doc("${p.count}: value\n"), &scope("p:\n  count: 3\n"))
        .unwrap_err();
    let message = match err {
        EngineError::Type(message) => message,
        other => panic!("expected type error, got {other:?}"),
    };
    assert!(message.contains("map key expression"), "{message}");
}

#[test]
fn missing_data_is_distinguished_from_type_errors() {
    let engine = TemplateEngine::new();
    let vars = scope("p: {}\n");

    let missing = engine.eval_expression("p.absent", &vars).unwrap_err();
    assert!(missing.is_missing_data());

    let type_error = engine.eval_expression("1 + 'x'", &vars).unwrap_err();
    assert!(!type_error.is_missing_data());

    let syntax_error = engine.eval_expression("1 +", &vars).unwrap_err();
    assert!(!syntax_error.is_missing_data());
}

#[test]
fn merge_is_associative_with_right_wins() {
    let engine = TemplateEngine::new();
    let vars = scope(concat!(
        "a:\n  x: 1\n  nested:\n    p: 1\n",
        "b:\n  x: 2\n  nested:\n    q: 2\n",
        "c:\n  nested:\n    p: 3\n",
    ));

    let pairwise = engine
        .eval_expression("oc_merge(oc_merge(a, b), c)", &vars)
        .unwrap();
    let folded = engine.eval_expression("oc_merge(a, b, c)", &vars).unwrap();
    assert_eq!(pairwise, folded);

    let Value::Map(m) = folded else { panic!() };
    assert_eq!(m["x"], Value::Int(2));
    let Value::Map(nested) = &m["nested"] else { panic!() };
    assert_eq!(nested["p"], Value::Int(3));
    assert_eq!(nested["q"], Value::Int(2));
}

#[test]
fn identical_templates_share_cached_programs() {
    let engine = TemplateEngine::new();
    let template = doc("name: ${item.name}\nport: ${item.port}\n");

    // Two renders with the same variable shape: second is all cache hits.
    for port in [80, 81] {
        engine
            .render(
                &template,
                &scope(&format!("item:\n  name: svc\n  port: {port}\n")),
            )
            .unwrap();
    }
    assert_eq!(engine.cached_environments(), 1);
    assert_eq!(engine.cached_programs(), 2);
}

#[test]
fn rendering_same_inputs_is_byte_identical() {
    let engine = TemplateEngine::new();
    let template = doc(concat!(
        "metadata:\n",
        "  name: ${oc_generate_name(component, env)}\n",
        "hash: ${oc_hash(component)}\n",
        "entries: \"${eps.transformMapEntry(i, e, {e.name: e.port})}\"\n",
    ));
    let vars = scope(concat!(
        "component: checkout\n",
        "env: dev\n",
        "eps:\n- name: http\n  port: 80\n- name: grpc\n  port: 9090\n",
    ));

    let first = serde_json::to_string(&engine.render(&template, &vars).unwrap()).unwrap();
    let second = serde_json::to_string(&engine.render(&template, &vars).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn nested_expressions_are_compile_errors() {
    let engine = TemplateEngine::new();
    let err = engine
        .render(&doc("x: ${outer + ${inner}}\n"), &scope("outer: 1\n"))
        .unwrap_err();
    assert!(matches!(err, EngineError::Syntax(_)));
}
