use docweave::config::EngineConfig;
use docweave::test_utils::{CountingEvaluator, engine_from_yaml, engine_from_yaml_with};
use serde_json::json;

/// Overriding a base variable keeps its position; new names come after every base slot.
#[test]
fn test_ref_override_keeps_base_slot_order() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: data
    type: inline
    name: base
    vars:
      a: original
      b: unique to base
    a: { query_jq: ".vars.a" }
    b: { query_jq: ".vars.b" }
    c: { query_jq: ".vars.c" }
    q_b: { query_jq: ".vars.q_b" }
  - kind: data
    type: ref
    name: override
    base: data.inline.base
    vars:
      c: unique to ref
      q_b: { query_jq: ".vars.b" }
      a: { query_jq: ".vars.c" }
"#,
    );

    let output = engine.fetch_data("data.ref.override").unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(
        output.data,
        json!({"a": null, "b": "unique to base", "c": "unique to ref", "q_b": "unique to base"})
    );

    // The base on its own is unaffected by the override
    let base = engine.fetch_data("data.inline.base").unwrap();
    assert_eq!(base.data, json!({"a": "original", "b": "unique to base", "c": null, "q_b": null}));
}

/// A child redeclaring a parent name appends a new slot instead of reusing the old position.
#[test]
fn test_plain_nesting_appends_shadowing_slots() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: chain
    vars:
      v1: 1
      v2: { query_jq: ".vars.v1 + 1" }
      v4: 100
    blocks:
      - kind: section
        vars:
          v3: { query_jq: ".vars.v2 + 1" }
          before: { query_jq: ".vars.v4" }
          v4: { query_jq: ".vars.v3 + 1" }
        blocks:
          - kind: content
            type: text
            value: "{{ vars.v1 }} {{ vars.v2 }} {{ vars.v3 }} {{ vars.v4 }} (was {{ vars.before }})"
      - kind: content
        type: text
        value: "outside {{ vars.v4 }}"
"#,
    );

    let output = engine.render_content("document.chain").unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.markdown(), "1 2 3 4 (was 100)\n\noutside 100");
}

/// Forward references inside one vars block see nothing and evaluate to null.
#[test]
fn test_forward_reference_is_null() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: data
    type: inline
    name: forward
    vars:
      a: { query_jq: ".vars.b" }
      b: { query_jq: ".vars.a" }
    a: { query_jq: ".vars.a" }
    b: { query_jq: ".vars.b" }
"#,
    );
    let output = engine.fetch_data("data.inline.forward").unwrap();
    assert!(output.diagnostics.is_empty());
    assert_eq!(output.data, json!({"a": null, "b": null}));
}

#[test]
fn test_local_var_rules() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - kind: content
        type: text
        local_var: first
        value: "{{ vars.local }}"
      - kind: content
        type: text
        local_var: shadowed
        vars:
          other: { query_jq: ".vars.local" }
        value: "{{ vars.other }}"
      - kind: content
        type: text
        local_var: clash
        vars:
          local: again
        value: never
"#,
    );

    let output = engine.render_content("document.d").unwrap();
    assert_eq!(output.markdown(), "first\n\nshadowed");
    assert!(output.diagnostics.contains("Local var specified together with vars block"));
    assert!(output.diagnostics.contains("Local var redefinition"));
    assert_eq!(output.diagnostics.errors().count(), 1);
}

#[test]
fn test_required_vars_search_the_whole_chain() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    vars:
      customer: ACME
      empty: null
    blocks:
      - kind: section
        required_vars: [customer]
        blocks:
          - kind: content
            type: text
            value: "for {{ vars.customer }}"
      - kind: content
        type: text
        required_vars: [empty, absent]
        value: never
"#,
    );

    let output = engine.render_content("document.d").unwrap();
    assert_eq!(output.markdown(), "for ACME");
    let missing: Vec<_> = output.diagnostics.errors().collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].summary, "Missing required variable");
    assert_eq!(missing[0].detail.as_deref(), Some("empty, absent"));
}

/// Slots nobody reads are never evaluated.
#[test]
fn test_unused_slots_stay_unevaluated() {
    let evaluator = CountingEvaluator::new();
    let engine = engine_from_yaml_with(
        r#"
blocks:
  - kind: data
    type: inline
    name: lazy
    vars:
      used: { query_jq: "1" }
      unused: { query_jq: "2" }
    value: { query_jq: ".vars.used" }
"#,
        &EngineConfig::default(),
    )
    .with_evaluator(evaluator.clone());

    let output = engine.fetch_data("data.inline.lazy").unwrap();
    assert_eq!(output.data, json!({"value": 1}));
    // `.vars.used` plus the `used` slot itself
    assert_eq!(evaluator.calls(), 2);
}

/// Content forces only the variables its templates name.
#[test]
fn test_content_leaves_unused_slots_unevaluated() {
    let evaluator = CountingEvaluator::new();
    let engine = engine_from_yaml_with(
        r#"
blocks:
  - kind: document
    name: d
    vars:
      broken: { query_jq: '1 + "x"' }
      used: { query_jq: '"world"' }
      unused: { query_jq: "2" }
    blocks:
      - kind: content
        type: text
        value: hello
      - kind: content
        type: text
        value: "hello {{ vars.used }}"
"#,
        &EngineConfig::default(),
    )
    .with_evaluator(evaluator.clone());

    let output = engine.render_content("document.d").unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.markdown(), "hello\n\nhello world");
    assert_eq!(evaluator.calls(), 1);
}

const TITLED: &str = r#"
blocks:
  - kind: document
    name: d
    title: "T{{ vars.n }}"
    vars:
      n: { query_jq: ".data.inline.d.v" }
    blocks:
      - kind: data
        type: inline
        name: d
        v: 7
      - kind: content
        type: text
        value: "n={{ vars.n }}"
"#;

/// A title rendered before the children does not pin variables to the data
/// that existed at that point.
#[test]
fn test_vars_see_data_fetched_after_title() {
    let titled = engine_from_yaml(TITLED).render_content("document.d").unwrap();
    assert!(titled.diagnostics.is_empty(), "{:?}", titled.diagnostics);
    assert_eq!(titled.markdown(), "# T\n\nn=7");

    let untitled = engine_from_yaml(&TITLED.replace("    title: \"T{{ vars.n }}\"\n", ""))
        .render_content("document.d")
        .unwrap();
    assert_eq!(untitled.markdown(), "n=7");
}
