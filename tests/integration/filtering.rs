use docweave::config::EngineConfig;
use docweave::providers::ProviderRegistry;
use docweave::test_utils::{RecordingProvider, engine_from_yaml, engine_from_yaml_with};
use serde_json::{Value, json};

#[test]
fn test_is_included_truthiness() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    vars:
      nothing: []
    blocks:
      - { kind: content, type: text, is_included: [], value: empty list }
      - { kind: content, type: text, is_included: {}, value: empty map }
      - { kind: content, type: text, is_included: "", value: empty string }
      - { kind: content, type: text, is_included: false, value: "false" }
      - { kind: content, type: text, is_included: { query_jq: "null" }, value: "null" }
      - { kind: content, type: text, is_included: { query_jq: ".vars.nothing" }, value: query list }
      - { kind: content, type: text, is_included: [1], value: one }
      - { kind: content, type: text, is_included: { a: b }, value: two }
      - { kind: content, type: text, is_included: "no", value: three }
      - { kind: content, type: text, is_included: true, value: four }
      - { kind: content, type: text, is_included: 0, value: five }
      - { kind: content, type: text, is_included: { query_jq: "0" }, value: six }
"#,
    );

    let output = engine.render_content("document.d").unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.markdown(), "one\n\ntwo\n\nthree\n\nfour\n\nfive\n\nsix");
}

/// Exclusion drops the whole subtree, including data nested below it.
#[test]
fn test_is_included_excludes_subtree() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    vars:
      show: ""
    blocks:
      - kind: section
        title: Hidden
        is_included: { query_jq: ".vars.show" }
        blocks:
          - kind: data
            type: inline
            name: hidden
            n: 1
          - kind: content
            type: text
            value: never
      - kind: content
        type: text
        value: visible
  - kind: document
    name: off
    is_included: false
    blocks:
      - kind: content
        type: text
        value: never
"#,
    );

    let output = engine.render_content("document.d").unwrap();
    assert_eq!(output.markdown(), "visible");
    assert!(output.data.get("inline").is_none());
    assert_eq!(engine.fetch_data("document.d.data.inline.hidden").unwrap().data, Value::Null);

    let off = engine.render_content("document.off").unwrap();
    assert!(off.node.is_none());
    assert_eq!(off.markdown(), "");
}

const TAGGED: &str = r#"
blocks:
  - kind: document
    name: d
    title: Doc
    blocks:
      - kind: content
        type: text
        value: untagged top
      - kind: content
        type: text
        meta: { tags: [public] }
        value: tagged top
      - kind: section
        title: Open
        meta: { tags: [public, extra] }
        blocks:
          - kind: content
            type: text
            value: inside open
          - kind: section
            blocks:
              - kind: content
                type: text
                meta: { tags: [internal] }
                value: deep
      - kind: section
        title: Mixed
        blocks:
          - kind: content
            type: text
            meta: { tags: [public] }
            value: kept leaf
          - kind: content
            type: text
            meta: { tags: [internal] }
            value: dropped leaf
      - kind: section
        title: Empty
        blocks:
          - kind: content
            type: text
            meta: { tags: [internal] }
            value: hidden
      - kind: data
        type: inline
        name: counts
        meta: { tags: [internal] }
        n: 1
      - kind: content
        type: text
        meta: { tags: [public] }
        value: "n={{ data.inline.counts.n }}"
"#;

#[test]
fn test_tag_gate() {
    let config = EngineConfig::default().with_required_tags(vec!["public".to_string()]);
    let engine = engine_from_yaml_with(TAGGED, &config);

    let output = engine.render_content("document.d").unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(
        output.markdown(),
        "# Doc\n\ntagged top\n\n## Open\n\ninside open\n\ndeep\n\n## Mixed\n\nkept leaf\n\nn=1"
    );
}

#[test]
fn test_no_required_tags_renders_everything() {
    let engine = engine_from_yaml(TAGGED);
    let markdown = engine.render_content("document.d").unwrap().markdown();
    for text in ["untagged top", "dropped leaf", "## Empty", "hidden", "deep"] {
        assert!(markdown.contains(text), "missing {text:?} in {markdown}");
    }
}

/// A document keeps its title even when nothing inside it passes the gate.
#[test]
fn test_document_is_never_dropped() {
    let config = EngineConfig::default().with_required_tags(vec!["public".to_string()]);
    let engine = engine_from_yaml_with(
        r#"
blocks:
  - kind: document
    name: d
    title: Nothing public
    blocks:
      - kind: content
        type: text
        value: private
"#,
        &config,
    );
    assert_eq!(engine.render_content("document.d").unwrap().markdown(), "# Nothing public");
}

/// Dynamic blocks have no tags of their own: each instantiated leaf is gated.
#[test]
fn test_dynamic_blocks_are_transparent_to_the_gate() {
    let config = EngineConfig::default().with_required_tags(vec!["public".to_string()]);
    let engine = engine_from_yaml_with(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - kind: dynamic
        items: [a, b]
        blocks:
          - kind: content
            type: text
            meta: { tags: [public] }
            value: "public {{ vars.dynamic_item }}"
          - kind: content
            type: text
            value: "private {{ vars.dynamic_item }}"
"#,
        &config,
    );
    assert_eq!(engine.render_content("document.d").unwrap().markdown(), "public a\n\npublic b");
}

/// Excluded and filtered blocks never reach their provider.
#[test]
fn test_excluded_blocks_never_reach_providers() {
    let recorder = RecordingProvider::new();
    let mut providers = ProviderRegistry::with_builtins();
    providers.register_content("record", recorder.clone());
    let config = EngineConfig::default().with_required_tags(vec!["public".to_string()]);
    let engine = engine_from_yaml_with(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - { kind: content, type: record, meta: { tags: [public] }, value: kept }
      - { kind: content, type: record, meta: { tags: [public] }, is_included: false, value: excluded }
      - { kind: content, type: record, value: untagged }
      - kind: section
        is_included: { query_jq: ".vars.missing" }
        meta: { tags: [public] }
        blocks:
          - { kind: content, type: record, value: nested }
"#,
        &config,
    )
    .with_providers(providers);

    let output = engine.render_content("document.d").unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.markdown(), "kept");
    assert_eq!(recorder.calls(), [json!({"value": "kept"})]);
}

/// Warnings about an excluded block's own definition are never reported.
#[test]
fn test_excluded_block_reports_no_warnings() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - kind: content
        type: text
        is_included: false
        local_var: hidden
        vars: { other: 1 }
        value: hidden
      - kind: content
        type: text
        local_var: shown
        vars: { other: 1 }
        value: "{{ vars.local }}"
"#,
    );

    let output = engine.render_content("document.d").unwrap();
    assert_eq!(output.markdown(), "shown");
    let warnings: Vec<_> = output.diagnostics.iter().map(|d| d.summary.as_str()).collect();
    assert_eq!(warnings, ["Local var specified together with vars block"]);
}
