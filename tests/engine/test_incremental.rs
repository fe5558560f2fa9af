// Incremental re-index: only the changed file re-parses, the graph reflects
// the new shape, and prior entity ids never duplicate.

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

fn incremental() -> IndexOptions {
    IndexOptions {
        incremental: true,
        ..IndexOptions::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn only_changed_file_reparses() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        write(
            dir.path(),
            &format!("f{i}.ts"),
            &format!("export function handler{i}(): void {{}}"),
        );
    }
    write(dir.path(), "x.ts", "export function target(a: string): void {}");
    let engine = Engine::open(dir.path()).unwrap();
    engine.index(None, IndexOptions::default()).await;

    write(
        dir.path(),
        "x.ts",
        "export function target(a: string, b: number): void {}",
    );
    let second = engine.index(None, incremental()).await;

    // 6 files, 5 unchanged: exactly files-1 cache hits.
    assert_eq!(second["data"]["filesIndexed"], 6);
    assert_eq!(second["data"]["fromCache"], 5);

    let entities = engine.list_file_entities("x.ts".to_string()).await;
    let list = entities["data"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(
        list[0]["metadata"]["parameters"],
        "(a: string, b: number)"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_duplicates_for_prior_entity_ids() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "x.ts",
        "export function keep(): void {}\nexport function drop(): void {}",
    );
    let engine = Engine::open(dir.path()).unwrap();
    engine.index(None, IndexOptions::default()).await;

    write(dir.path(), "x.ts", "export function keep(): void {}");
    engine.index(None, incremental()).await;

    let stats = engine.get_graph_stats().await;
    assert_eq!(stats["data"]["total_entities"], 1);

    let resolved = engine.resolve_entity("keep".to_string(), None).await;
    assert_eq!(resolved["data"].as_array().unwrap().len(), 1);
    let dropped = engine.resolve_entity("drop".to_string(), None).await;
    assert!(dropped["data"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_incremental_passes_are_stable() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.py", "def f():\n    pass\n");
    let engine = Engine::open(dir.path()).unwrap();
    engine.index(None, IndexOptions::default()).await;
    let baseline = engine.get_graph_stats().await;

    for _ in 0..3 {
        engine.index(None, incremental()).await;
    }
    let after = engine.get_graph_stats().await;
    assert_eq!(baseline["data"], after["data"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn force_reparses_everything() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.js", "function a(){}");
    let engine = Engine::open(dir.path()).unwrap();
    engine.index(None, IndexOptions::default()).await;

    let forced = engine
        .index(
            None,
            IndexOptions {
                force: true,
                ..IndexOptions::default()
            },
        )
        .await;
    assert_eq!(forced["data"]["fromCache"], 0);
    assert_eq!(
        engine.get_graph_stats().await["data"]["total_entities"],
        1
    );
}
