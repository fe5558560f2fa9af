// Per-file replacement semantics: the store always reflects exactly the
// last commit for a file, across any sequence of commits.

use atlas_core::sqlite::SqliteGraphStore;
use atlas_core::store::GraphStore;
use atlas_core::types::{
    Entity, EntityKind, FileCommit, FileRecord, Location, Point, RelKind, Relationship,
};

fn make_entity(file: &str, kind: EntityKind, name: &str, line: u32) -> Entity {
    Entity {
        id: Entity::make_id(file, kind, name),
        name: name.to_string(),
        kind,
        file_path: file.to_string(),
        location: Location {
            start: Point {
                line,
                column: 0,
                index: line * 40,
            },
            end: Point {
                line: line + 2,
                column: 1,
                index: line * 40 + 60,
            },
        },
        modifiers: vec![],
        metadata: serde_json::Map::new(),
    }
}

fn make_record(file: &str, hash: &str) -> FileRecord {
    FileRecord {
        file_path: file.to_string(),
        content_hash: hash.to_string(),
        language: "js".to_string(),
        last_parsed_at: "2026-02-01T10:00:00Z".to_string(),
        parse_time_ms: 2,
        error_count: 0,
    }
}

fn make_commit(file: &str, names: &[&str], hash: &str) -> FileCommit {
    let entities: Vec<Entity> = names
        .iter()
        .enumerate()
        .map(|(i, n)| make_entity(file, EntityKind::Function, n, i as u32 * 5 + 1))
        .collect();
    let relationships = entities
        .windows(2)
        .map(|pair| Relationship::new(pair[0].id.clone(), pair[1].id.clone(), RelKind::Calls))
        .collect();
    FileCommit {
        file_path: file.to_string(),
        entities,
        relationships,
        record: make_record(file, hash),
    }
}

#[test]
fn commit_sequence_keeps_only_last() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    store
        .commit_file(&make_commit("a.js", &["one", "two", "three"], "h1"))
        .unwrap();
    store
        .commit_file(&make_commit("a.js", &["two", "four"], "h2"))
        .unwrap();

    let entities = store.entities_by_file("a.js").unwrap();
    let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["two", "four"]);

    // No stragglers from the first commit.
    assert!(store.entity_by_id("a.js:function:one").unwrap().is_none());
    assert!(store.entity_by_id("a.js:function:three").unwrap().is_none());

    let stats = store.stats().unwrap();
    assert_eq!(stats.total_entities, 2);
    assert_eq!(stats.total_relationships, 1);
}

#[test]
fn identical_commits_are_idempotent() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    let commit = make_commit("a.js", &["f", "g"], "h1");
    store.commit_file(&commit).unwrap();
    store.commit_file(&commit).unwrap();
    store.commit_file(&commit).unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.total_entities, 2);
    assert_eq!(stats.total_relationships, 1);
    assert_eq!(stats.files_indexed, 1);
}

#[test]
fn commits_to_different_files_are_independent() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    store
        .commit_file(&make_commit("a.js", &["fa"], "ha"))
        .unwrap();
    store
        .commit_file(&make_commit("b.js", &["fb"], "hb"))
        .unwrap();
    store
        .commit_file(&make_commit("a.js", &["fa2"], "ha2"))
        .unwrap();

    assert_eq!(store.entities_by_file("b.js").unwrap().len(), 1);
    assert_eq!(
        store.entities_by_file("a.js").unwrap()[0].name,
        "fa2"
    );
}

#[test]
fn delete_file_twice_equals_once() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    store
        .commit_file(&make_commit("a.js", &["f"], "h"))
        .unwrap();

    store.delete_file("a.js").unwrap();
    let after_once = store.stats().unwrap();
    store.delete_file("a.js").unwrap();
    let after_twice = store.stats().unwrap();

    assert_eq!(after_once, after_twice);
    assert_eq!(after_once.total_entities, 0);
    assert_eq!(after_once.files_indexed, 0);
}

#[test]
fn failed_parse_commit_still_counts_file() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    let mut record = make_record("broken.js", "h");
    record.error_count = 1;
    store
        .commit_file(&FileCommit {
            file_path: "broken.js".to_string(),
            entities: vec![],
            relationships: vec![],
            record,
        })
        .unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.total_entities, 0);
    assert_eq!(
        store.file_record("broken.js").unwrap().unwrap().error_count,
        1
    );
}
