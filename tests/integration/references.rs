use docweave::core::EngineError;
use docweave::test_utils::{engine_from_yaml, parse_yaml};
use docweave::engine::Engine;
use docweave::config::EngineConfig;
use docweave::registry::BlockRegistry;

const CYCLE: &str = r#"
  - kind: content
    type: ref
    name: a
    base: content.ref.b
  - kind: content
    type: ref
    name: b
    base: content.ref.c
  - kind: content
    type: ref
    name: c
    base: content.ref.a
"#;

/// A cycle nothing dereferences is invisible.
#[test]
fn test_dormant_cycle_produces_no_diagnostics() {
    let engine = engine_from_yaml(&format!(
        r#"
blocks:
{CYCLE}
  - kind: document
    name: d
    blocks:
      - kind: content
        type: text
        value: fine
"#
    ));
    let output = engine.render_content("document.d").unwrap();
    assert_eq!(output.markdown(), "fine");
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
}

/// Dereferencing any block on the cycle reports it and skips only that block.
#[test]
fn test_reached_cycle_is_reported() {
    let engine = engine_from_yaml(&format!(
        r#"
blocks:
{CYCLE}
  - kind: document
    name: d
    blocks:
      - kind: content
        type: text
        value: before
      - kind: content
        type: ref
        name: use
        base: content.ref.b
      - kind: content
        type: text
        value: after
"#
    ));
    let output = engine.render_content("document.d").unwrap();
    assert_eq!(output.markdown(), "before\n\nafter");
    let errors: Vec<_> = output.diagnostics.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].summary, "Circular reference detected");
    assert_eq!(
        errors[0].detail.as_deref(),
        Some("content.ref.b → content.ref.c → content.ref.a → content.ref.b")
    );
    assert_eq!(errors[0].block.as_deref(), Some("document.d > content.ref.use"));
}

#[test]
fn test_missing_base_suggests_close_keys() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: section
    name: footer
    blocks:
      - kind: content
        type: text
        value: footer
  - kind: document
    name: d
    blocks:
      - kind: section
        type: ref
        name: f
        base: section.foter
"#,
    );
    let output = engine.render_content("document.d").unwrap();
    assert!(output.diagnostics.contains("Block not found"));
    let detail = output.diagnostics.errors().next().and_then(|d| d.detail.clone()).unwrap();
    assert!(detail.contains("section.footer"), "{detail}");
}

/// Forward `depends_on` renders the same regardless of lexical order.
#[test]
fn test_depends_on_forward_reference_matches_reverse_order() {
    let library = r#"
  - kind: section
    name: bbb
    blocks:
      - kind: content
        type: text
        value: from bbb
"#;
    let reader = r#"
      - kind: content
        type: text
        depends_on: [section.ref.aaa]
        value: { query_jq: '"saw: " + .document.content.children[0].markdown' }
"#;
    let referenced = r#"
      - kind: section
        type: ref
        name: aaa
        base: section.bbb
"#;

    let render = |children: String| {
        let engine = engine_from_yaml(&format!(
            "blocks:\n{library}  - kind: document\n    name: d\n    blocks:\n{children}"
        ));
        engine.render_content("document.d").unwrap()
    };

    let forward = render(format!("{reader}{referenced}"));
    let reverse = render(format!("{referenced}{reader}"));
    assert!(forward.diagnostics.is_empty(), "{:?}", forward.diagnostics);
    assert_eq!(forward.markdown(), "from bbb\n\nsaw: from bbb");
    assert_eq!(forward.markdown(), reverse.markdown());
    assert_eq!(forward.node, reverse.node);
}

/// A dependency living outside the document is pulled from the registry once.
#[test]
fn test_depends_on_registry_block_runs_once() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: data
    type: inline
    name: shared
    answer: 42
  - kind: document
    name: d
    blocks:
      - kind: content
        type: text
        depends_on: [data.inline.shared]
        value: "{{ data.inline.shared.answer }}"
      - kind: content
        type: text
        depends_on: [data.inline.shared, content.text.nowhere]
        value: never
"#,
    );
    let output = engine.render_content("document.d").unwrap();
    assert_eq!(output.markdown(), "42");
    assert_eq!(output.diagnostics.errors().count(), 1);
    assert!(output.diagnostics.contains("Block not found"));
}

/// A dependency elsewhere in the document runs in its own scope and keeps its place.
#[test]
fn test_depends_on_block_in_another_section() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - kind: section
        title: A
        blocks:
          - kind: content
            type: text
            name: reader
            depends_on: [content.text.t, data.inline.facts]
            value: "reader saw {{ data.inline.facts.n }}"
      - kind: section
        title: B
        vars:
          who: bee
        blocks:
          - kind: data
            type: inline
            name: facts
            n: { query_jq: ".vars.who" }
          - kind: content
            type: text
            name: t
            value: "{{ vars.who }}"
"#,
    );
    let output = engine.render_content("document.d").unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.markdown(), "## A\n\nreader saw bee\n\n## B\n\nbee");
}

/// Pulling a block forward does not hide its other occurrences.
#[test]
fn test_depends_on_leaves_dynamic_iterations_alone() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - kind: content
        type: text
        depends_on: [content.text.item]
        value: first
      - kind: dynamic
        items: [1, 2]
        blocks:
          - kind: content
            type: text
            name: item
            value: item
"#,
    );
    let output = engine.render_content("document.d").unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.markdown(), "item\n\nfirst\n\nitem\n\nitem");
}

#[test]
fn test_conflicting_definitions_warn_when_used() {
    let yaml = r#"
blocks:
  - kind: section
    name: dup
    blocks:
      - kind: content
        type: text
        value: first
  - kind: section
    name: dup
    blocks:
      - kind: content
        type: text
        value: second
  - kind: document
    name: quiet
    blocks:
      - kind: content
        type: text
        value: ok
  - kind: document
    name: loud
    blocks:
      - kind: section
        type: ref
        name: use
        base: section.dup
"#;
    let (blocks, _) = parse_yaml(yaml);
    let engine = Engine::new(BlockRegistry::build(blocks.iter()), &EngineConfig::default());

    assert!(engine.render_content("document.quiet").unwrap().diagnostics.is_empty());

    let loud = engine.render_content("document.loud").unwrap();
    assert_eq!(loud.markdown(), "first");
    assert!(loud.diagnostics.contains("Conflicting block definitions"));
    assert!(!loud.diagnostics.has_errors());
}

#[test]
fn test_unknown_target() {
    let engine = engine_from_yaml("blocks: []\n");
    assert!(matches!(engine.render_content("document.none"), Err(EngineError::TargetNotFound { .. })));
    assert!(matches!(engine.render_content("nonsense"), Err(EngineError::InvalidTarget { .. })));
}
