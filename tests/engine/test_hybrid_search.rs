// Hybrid semantic + structural search: annotations, pagination stability,
// cross-language filtering, clones, and impact.

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

async fn indexed_engine(dir: &tempfile::TempDir) -> Engine {
    let engine = Engine::open(dir.path()).unwrap();
    let report = engine.index(None, IndexOptions::default()).await;
    assert_eq!(report["ok"], true, "index failed: {report}");
    engine
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn save_user_query_annotates_structural_match() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "p/user.go",
        "package p\ntype User struct{}\nfunc (u *User) Save(){}\nfunc Render(){}",
    );
    let engine = indexed_engine(&dir).await;

    let page = engine
        .semantic_search("save user to database".to_string(), 5, None, None)
        .await;
    assert_eq!(page["ok"], true);
    let results = page["data"]["results"].as_array().unwrap();
    assert!(!results.is_empty());

    let save = results
        .iter()
        .find(|r| r["entity"]["id"] == "p/user.go:method:User:Save")
        .expect("User.Save should be a hit");
    let matches: Vec<&str> = save["structural_matches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap())
        .collect();
    assert!(matches.contains(&"name"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pagination_is_stable_until_index_changes() {
    let dir = tempfile::tempdir().unwrap();
    let body: String = (0..6)
        .map(|i| format!("function handler{i}() {{}}\n"))
        .collect();
    write(dir.path(), "handlers.js", &body);
    let engine = indexed_engine(&dir).await;

    let first = engine
        .semantic_search("handler".to_string(), 6, Some(2), None)
        .await;
    let first_page: Vec<String> = first["data"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["entity"]["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(first_page.len(), 2);
    let cursor = first["data"]["next_cursor"].as_str().unwrap().to_string();

    // Replaying page one gives the same ordering.
    let replay = engine
        .semantic_search("handler".to_string(), 6, Some(2), None)
        .await;
    let replay_page: Vec<String> = replay["data"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["entity"]["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(first_page, replay_page);

    // The cursor advances without overlap.
    let second = engine
        .semantic_search("handler".to_string(), 6, Some(2), Some(cursor))
        .await;
    let second_page: Vec<String> = second["data"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["entity"]["id"].as_str().unwrap().to_string())
        .collect();
    assert!(first_page.iter().all(|id| !second_page.contains(id)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_cursor_expires_after_reindex() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "h.js",
        "function handlerOne() {}\nfunction handlerTwo() {}\nfunction handlerThree() {}",
    );
    let engine = indexed_engine(&dir).await;

    let first = engine
        .semantic_search("handler".to_string(), 5, Some(1), None)
        .await;
    let cursor = first["data"]["next_cursor"].as_str().unwrap().to_string();

    // Changing the underlying set invalidates the cursor.
    write(dir.path(), "h.js", "function handlerOne() {}");
    engine
        .index(
            None,
            IndexOptions {
                incremental: true,
                ..IndexOptions::default()
            },
        )
        .await;

    let stale = engine
        .semantic_search("handler".to_string(), 5, Some(1), Some(cursor))
        .await;
    assert_eq!(stale["ok"], false);
    assert_eq!(stale["kind"], "InvalidArgument");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cross_language_search_filters_by_language() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.js", "function saveUser() {}");
    write(dir.path(), "b.go", "package b\nfunc SaveUser() {}");
    let engine = indexed_engine(&dir).await;

    let hits = engine
        .cross_language_search("save user".to_string(), vec!["go".to_string()], 5)
        .await;
    assert_eq!(hits["ok"], true);
    let results = hits["data"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|h| h["entity"]["file_path"] == "b.go"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn impact_follows_reverse_calls() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "chain.js",
        "function top(){ mid(); }\nfunction mid(){ leaf(); }\nfunction leaf(){}",
    );
    let engine = indexed_engine(&dir).await;

    let impact = engine
        .analyze_code_impact("chain.js:function:leaf".to_string(), 5)
        .await;
    assert_eq!(impact["ok"], true);
    let reachable: Vec<&str> = impact["data"]["reachable"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert!(reachable.contains(&"chain.js:function:mid"));
    assert!(reachable.contains(&"chain.js:function:top"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hotspots_rank_called_function_first() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "hot.js",
        "function hub(){}\nfunction a(){ hub(); }\nfunction b(){ hub(); }\nfunction c(){ hub(); }",
    );
    let engine = indexed_engine(&dir).await;

    let hotspots = engine.analyze_hotspots("fan_in".to_string(), 3).await;
    assert_eq!(hotspots["ok"], true);
    let top = &hotspots["data"].as_array().unwrap()[0];
    assert_eq!(top["entity"]["id"], "hot.js:function:hub");
    assert_eq!(top["value"], 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clone_detection_finds_twin_handlers() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "twins.js",
        "function copyBuffer(){}\nfunction copyBuffer2(){}\nfunction unrelatedThing(){}",
    );
    let engine = indexed_engine(&dir).await;

    let clones = engine.detect_code_clones(0.8).await;
    assert_eq!(clones["ok"], true);
    let clusters = clones["data"].as_array().unwrap();
    assert!(clusters.iter().any(|c| {
        let ids: Vec<&str> = c["entity_ids"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i.as_str().unwrap())
            .collect();
        ids.contains(&"twins.js:function:copyBuffer")
            && ids.contains(&"twins.js:function:copyBuffer2")
    }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn related_concepts_exclude_origin() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "store.js",
        "function saveUser(){}\nfunction saveAccount(){}\nfunction deleteUser(){}",
    );
    let engine = indexed_engine(&dir).await;

    let related = engine
        .find_related_concepts("store.js:function:saveUser".to_string(), 2)
        .await;
    assert_eq!(related["ok"], true);
    let results = related["data"].as_array().unwrap();
    assert!(!results.is_empty());
    assert!(results
        .iter()
        .all(|h| h["entity"]["id"] != "store.js:function:saveUser"));
}
