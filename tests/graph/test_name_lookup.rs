// Regex name lookup: anchored exact, substring, limits, and opaque-cursor
// pagination that expires when the result set changes.

use atlas_core::sqlite::SqliteGraphStore;
use atlas_core::store::{GraphStore, NameQuery};
use atlas_core::types::{Entity, EntityKind, FileCommit, FileRecord, Location};

fn seed(store: &mut SqliteGraphStore, names: &[&str]) {
    let entities: Vec<Entity> = names
        .iter()
        .enumerate()
        .map(|(i, n)| Entity {
            id: Entity::make_id("lib.py", EntityKind::Function, n),
            name: n.to_string(),
            kind: EntityKind::Function,
            file_path: "lib.py".to_string(),
            location: Location {
                start: atlas_core::types::Point {
                    line: i as u32 + 1,
                    column: 0,
                    index: 0,
                },
                end: atlas_core::types::Point {
                    line: i as u32 + 2,
                    column: 0,
                    index: 0,
                },
            },
            modifiers: vec![],
            metadata: serde_json::Map::new(),
        })
        .collect();
    store
        .commit_file(&FileCommit {
            file_path: "lib.py".to_string(),
            entities,
            relationships: vec![],
            record: FileRecord {
                file_path: "lib.py".to_string(),
                content_hash: "h".to_string(),
                language: "py".to_string(),
                last_parsed_at: "2026-02-01T10:00:00Z".to_string(),
                parse_time_ms: 1,
                error_count: 0,
            },
        })
        .unwrap();
}

fn paged(page_size: usize, cursor: Option<String>) -> NameQuery {
    NameQuery {
        page_size: Some(page_size),
        cursor,
        ..NameQuery::default()
    }
}

#[test]
fn anchored_exact_match_finds_only_that_entity() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    seed(&mut store, &["save", "save_all", "autosave"]);

    let page = store
        .find_entities_by_name("^save$", &NameQuery::default())
        .unwrap();
    assert_eq!(page.entities.len(), 1);
    assert_eq!(page.entities[0].name, "save");
    assert!(page.next_cursor.is_none());
}

#[test]
fn every_entity_matches_its_own_anchored_name() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    let names = ["alpha", "beta_2", "GammaCase"];
    seed(&mut store, &names);

    for name in names {
        let pattern = format!("^{}$", regex::escape(name));
        let page = store
            .find_entities_by_name(&pattern, &NameQuery::default())
            .unwrap();
        assert!(
            page.entities.iter().any(|e| e.name == name),
            "anchored lookup must find {name}"
        );
    }
}

#[test]
fn substring_semantics() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    seed(&mut store, &["save", "save_all", "load"]);

    let page = store
        .find_entities_by_name("save", &NameQuery::default())
        .unwrap();
    assert_eq!(page.entities.len(), 2);
}

#[test]
fn limit_bounds_result_length() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    seed(&mut store, &["f1", "f2", "f3", "f4", "f5"]);

    for k in 0..6 {
        let page = store
            .find_entities_by_name(
                "f",
                &NameQuery {
                    limit: Some(k),
                    ..NameQuery::default()
                },
            )
            .unwrap();
        assert!(page.entities.len() <= k);
    }
}

#[test]
fn cursor_pages_through_results_without_overlap() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    seed(&mut store, &["f1", "f2", "f3"]);

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = store.find_entities_by_name("f", &paged(1, cursor)).unwrap();
        seen.extend(page.entities.into_iter().map(|e| e.name));
        match page.next_cursor {
            Some(token) => cursor = Some(token),
            None => break,
        }
    }
    seen.sort();
    assert_eq!(seen, vec!["f1", "f2", "f3"]);
}

#[test]
fn cursor_is_stable_for_identical_inputs() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    seed(&mut store, &["f1", "f2", "f3"]);

    let first = store.find_entities_by_name("f", &paged(2, None)).unwrap();
    let replay = store.find_entities_by_name("f", &paged(2, None)).unwrap();
    assert_eq!(
        first.entities.iter().map(|e| &e.id).collect::<Vec<_>>(),
        replay.entities.iter().map(|e| &e.id).collect::<Vec<_>>()
    );
    assert_eq!(first.next_cursor, replay.next_cursor);
}

#[test]
fn cursor_expires_when_result_set_changes() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    seed(&mut store, &["f1", "f2", "f3"]);

    let first = store.find_entities_by_name("f", &paged(1, None)).unwrap();
    let token = first.next_cursor.unwrap();

    // Re-committing the file with a different entity set shifts the
    // matches; the old cursor must error rather than return wrong rows.
    seed(&mut store, &["f1", "f3", "f4"]);
    let err = store
        .find_entities_by_name("f", &paged(1, Some(token)))
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidArgument");
    assert!(err.to_string().contains("expired"));
}

#[test]
fn cursor_from_different_pattern_is_rejected() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    seed(&mut store, &["f1", "f2", "save"]);

    let page = store.find_entities_by_name("f", &paged(1, None)).unwrap();
    let token = page.next_cursor.unwrap();
    let err = store
        .find_entities_by_name("save", &paged(1, Some(token)))
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidArgument");
}

#[test]
fn case_sensitive_patterns() {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    seed(&mut store, &["Save", "save"]);

    let page = store
        .find_entities_by_name("^Save$", &NameQuery::default())
        .unwrap();
    assert_eq!(page.entities.len(), 1);
    assert_eq!(page.entities[0].name, "Save");
}
