// Vector store boundary behaviors and persistence invariants.

use atlas_semantic::embedder::{EmbeddingProvider, HashEmbedder};
use atlas_semantic::vector::VectorStore;

#[test]
fn k_zero_returns_empty() {
    let store = VectorStore::in_memory(8).unwrap();
    store.upsert("e", &[1.0; 8]).unwrap();
    assert!(store.search_top_k(&[1.0; 8], 0, None).unwrap().is_empty());
}

#[test]
fn k_beyond_size_returns_all() {
    let store = VectorStore::in_memory(4).unwrap();
    for i in 0..5 {
        let mut v = [0.0f32; 4];
        v[i % 4] = 1.0;
        store.upsert(&format!("e{i}"), &v).unwrap();
    }
    let hits = store.search_top_k(&[1.0, 0.0, 0.0, 0.0], 100, None).unwrap();
    assert_eq!(hits.len(), 5);
}

#[test]
fn scores_are_cosine_bounded() {
    let store = VectorStore::in_memory(2).unwrap();
    store.upsert("same", &[1.0, 0.0]).unwrap();
    store.upsert("opposite", &[-1.0, 0.0]).unwrap();
    let hits = store.search_top_k(&[1.0, 0.0], 10, None).unwrap();
    for hit in &hits {
        assert!(hit.score >= -1.0 - 1e-6 && hit.score <= 1.0 + 1e-6);
    }
    assert_eq!(hits[0].entity_id, "same");
    assert_eq!(hits[1].entity_id, "opposite");
}

#[test]
fn mismatched_write_rejected_without_mutation() {
    let store = VectorStore::in_memory(4).unwrap();
    assert!(store.upsert("bad", &[1.0, 2.0]).is_err());
    assert_eq!(store.len().unwrap(), 0);
}

#[test]
fn dimension_recorded_in_header_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vectors.db");
    {
        let store = VectorStore::open(&path, 16).unwrap();
        store.upsert("e", &[0.25; 16]).unwrap();
    }
    // Wrong dimension refused; right dimension sees the data.
    assert!(VectorStore::open(&path, 32).is_err());
    let store = VectorStore::open(&path, 16).unwrap();
    assert_eq!(store.dimension(), 16);
    assert_eq!(store.get("e").unwrap().unwrap().len(), 16);
}

#[test]
fn deterministic_embedder_feeds_deterministic_search() {
    let embedder = HashEmbedder::new(32);
    let store = VectorStore::in_memory(32).unwrap();
    store
        .upsert("doc", &embedder.embed("save user record"))
        .unwrap();

    let first = store
        .search_top_k(&embedder.embed("save user"), 1, None)
        .unwrap();
    let second = store
        .search_top_k(&embedder.embed("save user"), 1, None)
        .unwrap();
    assert_eq!(first[0].entity_id, second[0].entity_id);
    assert_eq!(first[0].score, second[0].score);
}
