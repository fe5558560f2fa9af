// Resumable batch indexing: bounded per-call work, persisted cursor,
// completion at 100%.

use std::path::Path;

use atlas_engine::ops::Engine;

fn write_repo(root: &Path, files: usize) {
    for i in 0..files {
        let path = root.join(format!("src/m{i:02}.js"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("function m{i}() {{}}")).unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_cursor_advances_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    write_repo(dir.path(), 5);
    let engine = Engine::open(dir.path()).unwrap();

    let first = engine.batch_index(None, None, Some(2)).await;
    assert_eq!(first["ok"], true);
    assert_eq!(first["data"]["done"], false);
    assert_eq!(first["data"]["processed"], 2);
    assert_eq!(first["data"]["remaining"], 3);
    let session = first["data"]["sessionId"].as_str().unwrap().to_string();

    let second = engine
        .batch_index(None, Some(session.clone()), Some(2))
        .await;
    assert_eq!(second["data"]["processed"], 4);
    assert_eq!(second["data"]["remaining"], 1);
    assert_eq!(second["data"]["sessionId"], session.as_str());

    let third = engine.batch_index(None, Some(session.clone()), Some(2)).await;
    assert_eq!(third["data"]["done"], true);
    assert_eq!(third["data"]["percent"], 100);
    assert_eq!(third["data"]["remaining"], 0);

    // All five files landed in the graph across the three calls.
    let stats = engine.get_graph_stats().await;
    assert_eq!(stats["data"]["files_indexed"], 5);
    assert_eq!(stats["data"]["total_entities"], 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_session_is_invalid_argument() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    let response = engine
        .batch_index(None, Some("sess-doesnotexist".to_string()), Some(2))
        .await;
    assert_eq!(response["ok"], false);
    assert_eq!(response["kind"], "InvalidArgument");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_repo_session_is_immediately_done() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path()).unwrap();
    let response = engine.batch_index(None, None, Some(10)).await;
    assert_eq!(response["data"]["done"], true);
    assert_eq!(response["data"]["percent"], 100);
    assert_eq!(response["data"]["processed"], 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_files_persist_between_calls() {
    let dir = tempfile::tempdir().unwrap();
    write_repo(dir.path(), 3);
    let engine = Engine::open(dir.path()).unwrap();

    let first = engine.batch_index(None, None, Some(1)).await;
    let session = first["data"]["sessionId"].as_str().unwrap();
    let session_file = dir
        .path()
        .join(".code-graph-rag/sessions")
        .join(format!("{session}.json"));
    assert!(session_file.exists());
}
