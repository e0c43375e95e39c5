use docweave::config::EngineConfig;
use docweave::test_utils::{engine_from_yaml, engine_from_yaml_with};
use serde_json::{Value, json};
use serial_test::serial;
use tempfile::TempDir;

/// The same data block sees document vars only when fetched through the document.
#[test]
fn test_fetch_scope_depends_on_target() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: data
    type: inline
    name: summary
    region: { query_jq: ".vars.region" }
    label: "{{ vars.region }}"
  - kind: document
    name: report
    vars:
      region: emea
    blocks:
      - kind: data
        type: ref
        name: scoped
        base: data.inline.summary
"#,
    );

    let standalone = engine.fetch_data("data.inline.summary").unwrap();
    assert!(standalone.diagnostics.is_empty());
    // Data arguments are queried, never templated
    assert_eq!(standalone.data, json!({"region": null, "label": "{{ vars.region }}"}));

    let scoped = engine.fetch_data("document.report.data.ref.scoped").unwrap();
    assert_eq!(scoped.data, json!({"region": "emea", "label": "{{ vars.region }}"}));

    assert!(engine.fetch_data("document.report.data.inline.summary").is_err());
}

#[test]
fn test_json_source() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("release.json"), r#"{"version": "1.2.0", "notes": ["fast"]}"#).unwrap();
    std::fs::write(dir.path().join("other.json"), r#"{"version": "0.9.0"}"#).unwrap();

    let engine = engine_from_yaml(&format!(
        r#"
blocks:
  - kind: document
    name: d
    blocks:
      - kind: data
        type: json
        name: release
        path: "{dir}/release.json"
      - kind: data
        type: json
        name: all
        glob: "{dir}/*.json"
      - kind: content
        type: text
        value: "v{{{{ data.json.release.version }}}} of {{{{ data.json.all | length }}}}"
"#,
        dir = dir.path().display()
    ));

    let output = engine.render_content("document.d").unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.markdown(), "v1.2.0 of 2");

    let all = engine.fetch_data("document.d.data.json.all").unwrap().data;
    let versions: Vec<_> = all.as_array().unwrap().iter().map(|entry| entry["contents"]["version"].clone()).collect();
    assert_eq!(versions, [json!("0.9.0"), json!("1.2.0")]);
}

#[test]
fn test_failing_and_missing_sources() {
    let engine = engine_from_yaml(
        r#"
blocks:
  - kind: data
    type: json
    name: gone
    path: /definitely/not/here.json
  - kind: data
    type: http
    name: remote
    url: https://example.com
"#,
    );

    let gone = engine.fetch_data("data.json.gone").unwrap();
    assert_eq!(gone.data, Value::Null);
    assert!(gone.diagnostics.contains("Data source failed"));

    let remote = engine.fetch_data("data.http.remote").unwrap();
    assert_eq!(remote.data, Value::Null);
    assert!(remote.diagnostics.contains("Missing data source"));
}

#[test]
#[serial]
fn test_env_source_and_env_root() {
    // SAFETY: serialized with every other env-mutating test
    unsafe {
        std::env::set_var("DOCWEAVE_IT_TOKEN", "secret");
        std::env::set_var("DOCWEAVE_IT_MODE", "ci");
    }

    let mut config = EngineConfig::default();
    config.env.prefix = Some("DOCWEAVE_IT_".to_string());
    let engine = engine_from_yaml_with(
        r#"
blocks:
  - kind: config
    type: data.env
    name: mine
    prefix: DOCWEAVE_IT_M
  - kind: document
    name: d
    blocks:
      - kind: data
        type: env
        name: mode
        config: config.data.env.mine
      - kind: content
        type: text
        value: { query_jq: '.env.DOCWEAVE_IT_TOKEN + " " + .data.env.mode.DOCWEAVE_IT_MODE' }
      - kind: content
        type: text
        value: { query_jq: '.env.HOME // "hidden"' }
"#,
        &config,
    );
    let output = engine.render_content("document.d");

    unsafe {
        std::env::remove_var("DOCWEAVE_IT_TOKEN");
        std::env::remove_var("DOCWEAVE_IT_MODE");
    }

    let output = output.unwrap();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.markdown(), "secret ci\n\nhidden");
    assert_eq!(output.data["env"]["mode"], json!({"DOCWEAVE_IT_MODE": "ci"}));
}
