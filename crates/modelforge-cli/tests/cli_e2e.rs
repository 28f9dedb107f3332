use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn modelforge_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_modelforge"))
}

fn run(args: &[&str]) -> Output {
    Command::new(modelforge_bin())
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("run modelforge")
}

fn write(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, text).expect("write fixture");
    path.display().to_string()
}

const BLOG_CATALOG: &str = r#"{
  "types": [
    {
      "name": "Blog",
      "members": [
        { "name": "Id", "type": { "kind": "scalar", "name": "int" } },
        { "name": "Posts", "type": { "kind": "collection", "target": "Post" } }
      ]
    },
    {
      "name": "Post",
      "members": [
        { "name": "Id", "type": { "kind": "scalar", "name": "int" } },
        { "name": "BlogId", "type": { "kind": "scalar", "name": "int" } },
        { "name": "Blog", "type": { "kind": "reference", "target": "Blog" } }
      ],
      "constructors": [
        { "parameters": [ { "name": "blogId", "type": "int" }, { "name": "clock", "type": "IClock" } ] }
      ]
    }
  ]
}"#;

#[test]
fn infer_writes_json_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = write(dir.path(), "catalog.json", BLOG_CATALOG);
    let options = write(
        dir.path(),
        "options.json",
        r#"{ "registered_services": ["IClock"] }"#,
    );
    let out = dir.path().join("model.json");

    let output = run(&[
        "infer",
        &catalog,
        "--options",
        &options,
        "--out",
        &out.display().to_string(),
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let model: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).expect("read model")).expect("json");
    let post = model["entity_types"]
        .as_array()
        .expect("entity types")
        .iter()
        .find(|e| e["name"] == "Post")
        .expect("Post");
    assert_eq!(post["primary_key"], serde_json::json!(["Id"]));
    assert_eq!(post["foreign_keys"][0]["properties"], serde_json::json!(["BlogId"]));
    assert_eq!(post["constructor"]["signature"], "Post(int, IClock)");
}

#[test]
fn infer_reports_validation_failures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = write(dir.path(), "catalog.json", BLOG_CATALOG);

    let output = run(&["infer", &catalog, "--json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Post"));
    assert!(stderr.contains("parameter `clock` (IClock) matches no property or service"));
}

#[test]
fn infer_prints_human_summary_for_selected_roots() {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = write(
        dir.path(),
        "catalog.json",
        r#"{ "types": [
            { "name": "Tag", "members": [ { "name": "Id", "type": { "kind": "scalar", "name": "int" } } ] },
            { "name": "Note", "members": [ { "name": "Id", "type": { "kind": "scalar", "name": "int" } } ] }
        ] }"#,
    );

    let output = run(&["infer", &catalog, "--roots", "Tag"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Tag"));
    assert!(!stdout.contains("Note"));
    assert!(stdout.contains("ok 1 entity types"));
}

#[test]
fn unknown_root_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = write(dir.path(), "catalog.json", BLOG_CATALOG);

    let output = run(&["infer", &catalog, "--roots", "Blog,Comment"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown root type(s): Comment"));
}

#[test]
fn conventions_lists_rules_per_event() {
    let output = run(&["conventions"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("model_finalizing"));
    assert!(stdout.contains("constructor_binding"));
    assert!(stdout.contains("foreign_key_property_discovery"));
}
