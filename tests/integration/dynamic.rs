use docweave::config::EngineConfig;
use docweave::test_utils::{engine_from_yaml, engine_from_yaml_with};

#[test]
fn test_items_expand_in_order() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - kind: dynamic
        items: [a, b, c]
        blocks:
          - kind: content
            type: text
            value: "{{ vars.dynamic_item_index }}:{{ vars.dynamic_item }}"
"#,
    );
    let output = engine.render_content("document.d").unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.markdown(), "0:a\n\n1:b\n\n2:c");
}

#[test]
fn test_items_from_earlier_data() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - kind: data
        type: inline
        name: team
        people: [{ name: Ada }, { name: Linus }]
      - kind: dynamic
        items: { query_jq: ".data.inline.team.people" }
        blocks:
          - kind: content
            type: text
            value: "- {{ vars.dynamic_item.name }}"
"#,
    );
    assert_eq!(engine.render_content("document.d").unwrap().markdown(), "- Ada\n\n- Linus");
}

/// An inner loop shadows `dynamic_item`; vars captured between the loops keep the outer value.
#[test]
fn test_nested_loops_shadow_outer_item() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - kind: dynamic
        items: [x, y]
        blocks:
          - kind: section
            vars:
              outer: { query_jq: ".vars.dynamic_item" }
            blocks:
              - kind: dynamic
                items: [1, 2]
                blocks:
                  - kind: content
                    type: text
                    value: "{{ vars.outer }}{{ vars.dynamic_item }}"
"#,
    );
    assert_eq!(engine.render_content("document.d").unwrap().markdown(), "x1\n\nx2\n\ny1\n\ny2");
}

#[test]
fn test_condition_with_and_without_items() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    vars:
      flag: true
    blocks:
      - kind: dynamic
        condition: { query_jq: ".vars.flag" }
        blocks:
          - kind: content
            type: text
            value: shown once
      - kind: dynamic
        condition: { query_jq: ".vars.flag | not" }
        blocks:
          - kind: content
            type: text
            value: never
      - kind: dynamic
        items: [1, 2, 3, 4]
        condition: { query_jq: ".vars.dynamic_item % 2 == 0" }
        blocks:
          - kind: content
            type: text
            value: "even {{ vars.dynamic_item }}"
"#,
    );
    let output = engine.render_content("document.d").unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.markdown(), "shown once\n\neven 2\n\neven 4");
}

#[test]
fn test_malformed_dynamic_blocks() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - kind: dynamic
        blocks:
          - kind: content
            type: text
            value: never
      - kind: dynamic
        items: [1, 2]
      - kind: dynamic
        items: not a list
        blocks:
          - kind: content
            type: text
            value: never
      - kind: content
        type: text
        value: siblings survive
"#,
    );
    let output = engine.render_content("document.d").unwrap();
    assert_eq!(output.markdown(), "siblings survive");

    let errors: Vec<_> = output.diagnostics.errors().map(|d| d.summary.as_str()).collect();
    assert_eq!(errors, ["Dynamic block without items", "Invalid dynamic items"]);
    let warnings: Vec<_> = output.diagnostics.warnings().map(|d| d.summary.as_str()).collect();
    assert_eq!(warnings, ["Dynamic block without content"]);
}

#[test]
fn test_iteration_limit() {
    let mut config = EngineConfig::default();
    config.limits.max_dynamic_items = 2;
    let engine = engine_from_yaml_with(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - kind: dynamic
        items: [1, 2, 3]
        blocks:
          - kind: content
            type: text
            value: "{{ vars.dynamic_item }}"
"#,
        &config,
    );
    let output = engine.render_content("document.d").unwrap();
    assert_eq!(output.markdown(), "");
    let detail = output.diagnostics.errors().next().and_then(|d| d.detail.clone()).unwrap();
    assert_eq!(detail, "3 items exceed the limit of 2");
}
