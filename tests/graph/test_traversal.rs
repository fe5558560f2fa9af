// BFS relationship expansion: depth annotation, direction, kind filters,
// cycles, and edges to external symbols.

use atlas_core::sqlite::SqliteGraphStore;
use atlas_core::store::GraphStore;
use atlas_core::types::{
    Entity, EntityKind, FileCommit, FileRecord, Location, RelDirection, RelKind, Relationship,
};

fn entity(name: &str) -> Entity {
    Entity {
        id: Entity::make_id("g.rs", EntityKind::Function, name),
        name: name.to_string(),
        kind: EntityKind::Function,
        file_path: "g.rs".to_string(),
        location: Location::default(),
        modifiers: vec![],
        metadata: serde_json::Map::new(),
    }
}

fn store_with(entities: Vec<Entity>, relationships: Vec<Relationship>) -> SqliteGraphStore {
    let mut store = SqliteGraphStore::in_memory().unwrap();
    store
        .commit_file(&FileCommit {
            file_path: "g.rs".to_string(),
            entities,
            relationships,
            record: FileRecord {
                file_path: "g.rs".to_string(),
                content_hash: "h".to_string(),
                language: "rust".to_string(),
                last_parsed_at: "2026-02-01T10:00:00Z".to_string(),
                parse_time_ms: 1,
                error_count: 0,
            },
        })
        .unwrap();
    store
}

#[test]
fn depth_annotations_follow_frontiers() {
    let (a, b, c, d) = (entity("a"), entity("b"), entity("c"), entity("d"));
    let store = store_with(
        vec![a.clone(), b.clone(), c.clone(), d.clone()],
        vec![
            Relationship::new(a.id.clone(), b.id.clone(), RelKind::Calls),
            Relationship::new(b.id.clone(), c.id.clone(), RelKind::Calls),
            Relationship::new(c.id.clone(), d.id.clone(), RelKind::Calls),
        ],
    );

    let edges = store
        .relationships_for(&a.id, RelDirection::Outgoing, &[], 3)
        .unwrap();
    assert_eq!(edges.len(), 3);
    let depth_of = |to: &str| {
        edges
            .iter()
            .find(|e| e.relationship.to == to)
            .map(|e| e.depth)
            .unwrap()
    };
    assert_eq!(depth_of(&b.id), 1);
    assert_eq!(depth_of(&c.id), 2);
    assert_eq!(depth_of(&d.id), 3);
}

#[test]
fn max_depth_caps_expansion() {
    let (a, b, c) = (entity("a"), entity("b"), entity("c"));
    let store = store_with(
        vec![a.clone(), b.clone(), c.clone()],
        vec![
            Relationship::new(a.id.clone(), b.id.clone(), RelKind::Calls),
            Relationship::new(b.id.clone(), c.id.clone(), RelKind::Calls),
        ],
    );
    let edges = store
        .relationships_for(&a.id, RelDirection::Outgoing, &[], 1)
        .unwrap();
    assert_eq!(edges.len(), 1);
}

#[test]
fn mutual_recursion_terminates() {
    let (a, b) = (entity("a"), entity("b"));
    let store = store_with(
        vec![a.clone(), b.clone()],
        vec![
            Relationship::new(a.id.clone(), b.id.clone(), RelKind::Calls),
            Relationship::new(b.id.clone(), a.id.clone(), RelKind::Calls),
        ],
    );
    let edges = store
        .relationships_for(&a.id, RelDirection::Both, &[], 10)
        .unwrap();
    // Both edges visited exactly once despite the cycle.
    assert_eq!(edges.len(), 2);
}

#[test]
fn incoming_direction() {
    let (a, b) = (entity("a"), entity("b"));
    let store = store_with(
        vec![a.clone(), b.clone()],
        vec![Relationship::new(a.id.clone(), b.id.clone(), RelKind::Calls)],
    );
    let incoming = store
        .relationships_for(&b.id, RelDirection::Incoming, &[], 1)
        .unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].relationship.from, a.id);

    let outgoing = store
        .relationships_for(&b.id, RelDirection::Outgoing, &[], 1)
        .unwrap();
    assert!(outgoing.is_empty());
}

#[test]
fn kind_filter_applies_at_every_depth() {
    let (a, b, c) = (entity("a"), entity("b"), entity("c"));
    let store = store_with(
        vec![a.clone(), b.clone(), c.clone()],
        vec![
            Relationship::new(a.id.clone(), b.id.clone(), RelKind::Calls),
            Relationship::new(b.id.clone(), c.id.clone(), RelKind::Imports),
        ],
    );
    let only_calls = store
        .relationships_for(&a.id, RelDirection::Outgoing, &[RelKind::Calls], 3)
        .unwrap();
    assert_eq!(only_calls.len(), 1);
    assert_eq!(only_calls[0].relationship.to, b.id);
}

#[test]
fn external_symbol_targets_are_traversable_endpoints() {
    let a = entity("a");
    let store = store_with(
        vec![a.clone()],
        vec![Relationship::new(
            a.id.clone(),
            "serde_json",
            RelKind::Imports,
        )],
    );
    let edges = store
        .relationships_for(&a.id, RelDirection::Outgoing, &[], 2)
        .unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].relationship.to, "serde_json");
}
