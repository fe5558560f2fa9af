// On-disk behavior: reopen, WAL visibility, and schema version gating.

use atlas_core::sqlite::SqliteGraphStore;
use atlas_core::store::GraphStore;
use atlas_core::types::{Entity, EntityKind, FileCommit, FileRecord, Location};

fn commit_one(store: &mut SqliteGraphStore, file: &str, name: &str) {
    let entity = Entity {
        id: Entity::make_id(file, EntityKind::Function, name),
        name: name.to_string(),
        kind: EntityKind::Function,
        file_path: file.to_string(),
        location: Location::default(),
        modifiers: vec![],
        metadata: serde_json::Map::new(),
    };
    store
        .commit_file(&FileCommit {
            file_path: file.to_string(),
            entities: vec![entity],
            relationships: vec![],
            record: FileRecord {
                file_path: file.to_string(),
                content_hash: "abc".to_string(),
                language: "js".to_string(),
                last_parsed_at: "2026-02-01T10:00:00Z".to_string(),
                parse_time_ms: 1,
                error_count: 0,
            },
        })
        .unwrap();
}

#[test]
fn rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.db");
    {
        let mut store = SqliteGraphStore::open(&db).unwrap();
        commit_one(&mut store, "a.js", "keep");
    }
    let store = SqliteGraphStore::open(&db).unwrap();
    let entities = store.entities_by_file("a.js").unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].name, "keep");
}

#[test]
fn reset_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.db");
    {
        let mut store = SqliteGraphStore::open(&db).unwrap();
        commit_one(&mut store, "a.js", "gone");
        store.reset().unwrap();
    }
    let store = SqliteGraphStore::open(&db).unwrap();
    assert_eq!(store.stats().unwrap().total_entities, 0);
}

#[test]
fn nested_state_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join(".code-graph-rag").join("graph.db");
    let store = SqliteGraphStore::open(&db).unwrap();
    assert_eq!(store.stats().unwrap().files_indexed, 0);
    assert!(db.exists());
}
