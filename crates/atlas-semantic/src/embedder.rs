//! Embedding providers.
//!
//! The engine requires determinism: identical inputs must yield identical
//! vectors. The default [`HashEmbedder`] guarantees it with seeded feature
//! hashing — no model download, no network. Deployments that pin a real
//! model implement [`EmbeddingProvider`] at this seam; the determinism
//! requirement transfers to them.

use xxhash_rust::xxh64::xxh64;

use atlas_core::types::Entity;

/// Seam for embedding implementations.
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    /// Embed one text. Must be a pure function of `text`.
    fn embed(&self, text: &str) -> Vec<f32>;

    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Deterministic feature-hashing embedder.
///
/// Tokens (identifier-split, lowercased) hash into two bucket/sign pairs
/// each; the accumulated vector is L2-normalized. Adjacent-token bigrams add
/// coarse ordering signal.
pub struct HashEmbedder {
    dimension: usize,
}

const TOKEN_SEED: u64 = 0x41544c41; // stable across processes
const SIGN_SEED: u64 = 0x53454d49;

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn accumulate(&self, acc: &mut [f32], token: &str, weight: f32) {
        let bucket = (xxh64(token.as_bytes(), TOKEN_SEED) as usize) % self.dimension;
        let sign = if xxh64(token.as_bytes(), SIGN_SEED) & 1 == 0 {
            1.0
        } else {
            -1.0
        };
        acc[bucket] += sign * weight;
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut acc = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.accumulate(&mut acc, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&mut acc, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm: f32 = acc.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut acc {
                *v /= norm;
            }
        }
        acc
    }
}

/// Split identifiers and prose into lowercase tokens: `parseFileBatch` →
/// `parse`, `file`, `batch`; punctuation separates.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = c.is_lowercase() || c.is_numeric();
            for lower in c.to_lowercase() {
                current.push(lower);
            }
        } else {
            prev_lower = false;
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Stable serialization of an entity for embedding: name, sorted modifiers,
/// signature from metadata, owning file basename, and the owning
/// type/namespace qualifier when the id carries one.
pub fn embedding_input(entity: &Entity) -> String {
    let mut parts: Vec<String> = vec![entity.name.clone()];

    let mut modifiers = entity.modifiers.clone();
    modifiers.sort();
    if !modifiers.is_empty() {
        parts.push(modifiers.join(" "));
    }

    if let Some(params) = entity.metadata.get("parameters").and_then(|v| v.as_str()) {
        parts.push(params.to_string());
    }
    if let Some(ret) = entity.metadata.get("returnType").and_then(|v| v.as_str()) {
        parts.push(ret.to_string());
    }

    let basename = std::path::Path::new(&entity.file_path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| entity.file_path.clone());
    parts.push(basename);

    // Receiver metadata (Go) names the container directly; other languages
    // carry it in the id's qualifier.
    if let Some(receiver) = entity.metadata.get("receiver").and_then(|v| v.as_str()) {
        parts.push(receiver.to_string());
    } else if let Some(container) = owning_container(&entity.id, &entity.name) {
        parts.push(container);
    }

    parts.join(" | ")
}

/// The qualifier portion of an id's final segment: `a.rs:method:Engine::run`
/// → `Engine`; `m.py:function:User.save` → `User`.
fn owning_container(id: &str, name: &str) -> Option<String> {
    let qualified = id.rsplit(':').next()?;
    if qualified == name {
        return None;
    }
    let stripped = qualified
        .strip_suffix(name)?
        .trim_end_matches("::")
        .trim_end_matches('.');
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::types::{EntityKind, Location};

    fn entity(id: &str, name: &str, file: &str) -> Entity {
        Entity {
            id: id.to_string(),
            name: name.to_string(),
            kind: EntityKind::Function,
            file_path: file.to_string(),
            location: Location::default(),
            modifiers: vec![],
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedder::new(64);
        assert_eq!(embedder.embed("save user"), embedder.embed("save user"));
    }

    #[test]
    fn test_dimension_and_normalization() {
        let embedder = HashEmbedder::new(32);
        let v = embedder.embed("parse file batch");
        assert_eq!(v.len(), 32);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_input_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed("");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_similar_texts_score_higher() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed("save user to database");
        let b = embedder.embed("save user record database");
        let c = embedder.embed("render html template");
        let sim_ab = crate::vector::cosine(&a, &b);
        let sim_ac = crate::vector::cosine(&a, &c);
        assert!(sim_ab > sim_ac);
    }

    #[test]
    fn test_tokenize_camel_case() {
        assert_eq!(tokenize("parseFileBatch"), vec!["parse", "file", "batch"]);
        assert_eq!(tokenize("save_user"), vec!["save", "user"]);
        assert_eq!(tokenize("HTTPServer"), vec!["httpserver"]);
    }

    #[test]
    fn test_embedding_input_stability() {
        let mut e = entity("p/user.go:method:User:Save", "Save", "p/user.go");
        e.metadata
            .insert("parameters".to_string(), serde_json::json!("()"));
        let a = embedding_input(&e);
        let b = embedding_input(&e);
        assert_eq!(a, b);
        assert!(a.contains("Save"));
        assert!(a.contains("user.go"));
    }

    #[test]
    fn test_owning_container() {
        assert_eq!(
            owning_container("a.rs:method:Engine::run", "run"),
            Some("Engine".to_string())
        );
        assert_eq!(
            owning_container("m.py:function:User.save", "save"),
            Some("User".to_string())
        );
        assert_eq!(owning_container("a.js:function:foo", "foo"), None);
    }

    #[test]
    fn test_batch_matches_single() {
        let embedder = HashEmbedder::new(32);
        let batch = embedder.embed_batch(&["one".to_string(), "two".to_string()]);
        assert_eq!(batch[0], embedder.embed("one"));
        assert_eq!(batch[1], embedder.embed("two"));
    }
}
