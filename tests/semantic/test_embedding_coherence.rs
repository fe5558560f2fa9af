// Vector ↔ entity coherence: every embedding has a live entity; deletions
// take effect within the commit window.

use std::sync::Arc;

use atlas_core::types::{Entity, EntityKind, Location};
use atlas_semantic::embedder::HashEmbedder;
use atlas_semantic::indexer::SemanticIndexer;
use atlas_semantic::vector::VectorStore;

fn entity(id: &str, name: &str) -> Entity {
    Entity {
        id: id.to_string(),
        name: name.to_string(),
        kind: EntityKind::Function,
        file_path: "a.js".to_string(),
        location: Location::default(),
        modifiers: vec![],
        metadata: serde_json::Map::new(),
    }
}

fn make_indexer() -> SemanticIndexer {
    SemanticIndexer::new(
        Arc::new(VectorStore::in_memory(32).unwrap()),
        Arc::new(HashEmbedder::new(32)),
    )
}

#[test]
fn every_embedding_has_a_live_entity_after_commits() {
    let indexer = make_indexer();
    let live = vec![entity("a.js:function:x", "x"), entity("a.js:function:y", "y")];
    indexer.on_commit(&[], &live).unwrap();
    indexer.embed_all_pending().unwrap();

    let stored_ids = indexer.store().entity_ids().unwrap();
    let live_ids: Vec<&str> = live.iter().map(|e| e.id.as_str()).collect();
    for id in &stored_ids {
        assert!(live_ids.contains(&id.as_str()));
    }
}

#[test]
fn removing_entity_removes_embedding_in_same_commit_window() {
    let indexer = make_indexer();
    let x = entity("a.js:function:x", "x");
    let y = entity("a.js:function:y", "y");
    indexer.on_commit(&[], &[x.clone(), y.clone()]).unwrap();
    indexer.embed_all_pending().unwrap();

    // Recommit without y: its embedding is gone before any background work.
    indexer.on_commit(&[x.clone(), y.clone()], &[x.clone()]).unwrap();
    assert!(indexer.store().get(&y.id).unwrap().is_none());
}

#[test]
fn rename_is_delete_plus_add() {
    let indexer = make_indexer();
    let old = entity("a.js:function:oldName", "oldName");
    indexer.on_commit(&[], &[old.clone()]).unwrap();
    indexer.embed_all_pending().unwrap();

    let new = entity("a.js:function:newName", "newName");
    indexer.on_commit(&[old.clone()], &[new.clone()]).unwrap();
    indexer.embed_all_pending().unwrap();

    assert!(indexer.store().get(&old.id).unwrap().is_none());
    assert!(indexer.store().get(&new.id).unwrap().is_some());
}

#[test]
fn identical_inputs_produce_identical_vectors_across_refreshes() {
    let indexer = make_indexer();
    let e = entity("a.js:function:stable", "stable");
    indexer.on_commit(&[], &[e.clone()]).unwrap();
    indexer.embed_all_pending().unwrap();
    let first = indexer.store().get(&e.id).unwrap().unwrap();

    // Force a refresh by pretending the entity changed and changed back.
    let mut changed = e.clone();
    changed
        .metadata
        .insert("parameters".to_string(), serde_json::json!("(x)"));
    indexer.on_commit(&[e.clone()], &[changed.clone()]).unwrap();
    indexer.embed_all_pending().unwrap();
    indexer.on_commit(&[changed], &[e.clone()]).unwrap();
    indexer.embed_all_pending().unwrap();

    let last = indexer.store().get(&e.id).unwrap().unwrap();
    assert_eq!(first, last);
}
