// Whole-pipeline scenarios: tiny JS file, Go package, Markdown document.

use std::path::Path;

use atlas_engine::ops::Engine;
use atlas_engine::pipeline::IndexOptions;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tiny_js_file() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a.js",
        "function foo(){ bar(); }\nfunction bar(){}",
    );
    let engine = Engine::open(dir.path()).unwrap();
    let indexed = engine.index(None, IndexOptions::default()).await;
    assert_eq!(indexed["ok"], true);

    let entities = engine.list_file_entities("a.js".to_string()).await;
    let ids: Vec<&str> = entities["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"a.js:function:foo"));
    assert!(ids.contains(&"a.js:function:bar"));

    let stats = engine.get_graph_stats().await;
    assert_eq!(stats["data"]["total_entities"], 2);

    let rels = engine
        .list_entity_relationships("foo".to_string(), 1, vec![])
        .await;
    let edges = rels["data"]["relationships"].as_array().unwrap();
    assert!(edges.iter().any(|e| {
        e["from"] == "a.js:function:foo" && e["to"] == "a.js:function:bar" && e["kind"] == "calls"
    }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn go_package_with_method() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "p/user.go",
        "package p\ntype User struct{}\nfunc (u *User) Save(){}",
    );
    let engine = Engine::open(dir.path()).unwrap();
    engine
        .index(Some("p".to_string()), IndexOptions::default())
        .await;

    let entities = engine.list_file_entities("p/user.go".to_string()).await;
    let ids: Vec<&str> = entities["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"p/user.go:package:p"));
    assert!(ids.contains(&"p/user.go:type:User"));
    assert!(ids.contains(&"p/user.go:method:User:Save"));

    let rels = engine
        .list_entity_relationships("Save".to_string(), 1, vec!["member_of".to_string()])
        .await;
    let edges = rels["data"]["relationships"].as_array().unwrap();
    assert!(edges.iter().any(|e| {
        e["from"] == "p/user.go:method:User:Save"
            && e["to"] == "p/user.go:type:User"
            && e["kind"] == "member_of"
    }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn markdown_headings() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "doc.md", "# A\n## B\ntext\n");
    let engine = Engine::open(dir.path()).unwrap();
    engine.index(None, IndexOptions::default()).await;

    let entities = engine.list_file_entities("doc.md".to_string()).await;
    let ids: Vec<&str> = entities["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"doc.md:document"));
    assert!(ids.contains(&"doc.md:heading:a"));
    assert!(ids.contains(&"doc.md:heading:b"));

    let rels = engine
        .analyze_code_impact("doc.md:document".to_string(), 1)
        .await;
    assert_eq!(rels["ok"], true);

    let query = engine.query("doc.md:document".to_string(), 5).await;
    let edges = query["data"]["relationships"].as_array().unwrap();
    assert!(edges.iter().any(|e| {
        e["from"] == "doc.md:document" && e["to"] == "doc.md:heading:a" && e["kind"] == "contains"
    }));
    assert!(edges.iter().any(|e| e["to"] == "doc.md:heading:b"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parse_error_file_still_indexed() {
    let dir = tempfile::tempdir().unwrap();
    // Unbalanced braces still produce a tree (with error nodes); a missing
    // grammar is the reliable failure path, so use an empty unsupported-free
    // repo plus one good file and verify error accounting via report shape.
    write(dir.path(), "ok.js", "function fine(){}");
    let engine = Engine::open(dir.path()).unwrap();
    let report = engine.index(None, IndexOptions::default()).await;
    assert_eq!(report["data"]["errorCount"], 0);

    let stats = engine.get_graph_stats().await;
    assert_eq!(stats["data"]["files_indexed"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn vanished_file_is_dropped_on_reindex() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.js", "function a(){}");
    write(dir.path(), "b.js", "function b(){}");
    let engine = Engine::open(dir.path()).unwrap();
    engine.index(None, IndexOptions::default()).await;
    assert_eq!(
        engine.get_graph_stats().await["data"]["files_indexed"],
        2
    );

    std::fs::remove_file(dir.path().join("b.js")).unwrap();
    engine
        .index(
            None,
            IndexOptions {
                incremental: true,
                ..IndexOptions::default()
            },
        )
        .await;

    let stats = engine.get_graph_stats().await;
    assert_eq!(stats["data"]["files_indexed"], 1);
    let entities = engine.list_file_entities("b.js".to_string()).await;
    assert!(entities["data"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn excluded_patterns_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "src/app.js", "function app(){}");
    write(dir.path(), "node_modules/dep/index.js", "function dep(){}");
    write(dir.path(), "bundle.min.js", "function minified(){}");
    let engine = Engine::open(dir.path()).unwrap();
    let report = engine.index(None, IndexOptions::default()).await;
    assert_eq!(report["data"]["filesIndexed"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_entity_source_snippet() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a.js",
        "// intro\nfunction foo(){\n  return 1;\n}\n",
    );
    let engine = Engine::open(dir.path()).unwrap();
    engine.index(None, IndexOptions::default()).await;

    let snippet = engine
        .get_entity_source("a.js:function:foo".to_string(), 1, 4096)
        .await;
    assert_eq!(snippet["ok"], true);
    assert!(snippet["data"]["text"]
        .as_str()
        .unwrap()
        .contains("function foo"));
    assert_eq!(snippet["data"]["truncated"], false);
}
