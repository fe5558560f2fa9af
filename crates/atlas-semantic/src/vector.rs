//! Fixed-dimension dense-vector index with cosine similarity.
//!
//! Vectors persist in `vectors.db` next to the graph database as f32
//! little-endian blobs; the store's dimension is recorded in a meta table and
//! enforced on every write and open. Search runs against an in-memory matrix
//! rebuilt lazily after writes. When the SQLite build exposes a native
//! vector module (`vec0`), the store routes searches through it instead; the
//! API is identical in either mode.

use std::path::Path;
use std::sync::{Mutex, RwLock};

use rayon::prelude::*;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use atlas_core::error::EngineError;

/// One scored search hit. Scores are cosine similarity in [-1, 1].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VectorHit {
    pub entity_id: String,
    pub score: f32,
}

/// Which execution path searches take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    BruteForce,
    NativeExtension,
}

pub struct VectorStore {
    conn: Mutex<Connection>,
    dimension: usize,
    mode: SearchMode,
    /// Cached (id, vector) rows; `None` after any write.
    matrix: RwLock<Option<Vec<(String, Vec<f32>)>>>,
}

impl VectorStore {
    /// Open or create `vectors.db` with a fixed dimension. Opening an
    /// existing store with a different dimension fails with
    /// `DimensionMismatch`.
    pub fn open(path: &Path, dimension: usize) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::initialize(conn, dimension)
    }

    /// In-memory store (for testing).
    pub fn in_memory(dimension: usize) -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, dimension)
    }

    fn initialize(conn: Connection, dimension: usize) -> Result<Self, EngineError> {
        if dimension == 0 {
            return Err(EngineError::InvalidArgument(
                "vector dimension must be positive".to_string(),
            ));
        }
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS vector_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS embeddings (
                entity_id TEXT PRIMARY KEY,
                vector BLOB NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM vector_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match stored {
            Some(s) => {
                let found: usize = s.parse().unwrap_or(0);
                if found != dimension {
                    return Err(EngineError::DimensionMismatch {
                        store: found,
                        got: dimension,
                    });
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO vector_meta (key, value) VALUES ('dimension', ?1)",
                    params![dimension.to_string()],
                )?;
            }
        }

        let mode = if has_native_module(&conn) {
            SearchMode::NativeExtension
        } else {
            SearchMode::BruteForce
        };
        debug!(?mode, dimension, "vector store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            dimension,
            mode,
            matrix: RwLock::new(None),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Insert or replace one entity's vector. Length is validated against
    /// the store's dimension.
    pub fn upsert(&self, entity_id: &str, vector: &[f32]) -> Result<(), EngineError> {
        if vector.len() != self.dimension {
            return Err(EngineError::DimensionMismatch {
                store: self.dimension,
                got: vector.len(),
            });
        }
        let conn = self.conn.lock().expect("vector conn lock");
        conn.execute(
            "INSERT OR REPLACE INTO embeddings (entity_id, vector, created_at) VALUES (?1, ?2, ?3)",
            params![
                entity_id,
                vector_to_blob(vector),
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        drop(conn);
        *self.matrix.write().expect("matrix lock") = None;
        Ok(())
    }

    /// Remove one entity's vector. Idempotent.
    pub fn delete(&self, entity_id: &str) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("vector conn lock");
        conn.execute(
            "DELETE FROM embeddings WHERE entity_id = ?1",
            params![entity_id],
        )?;
        drop(conn);
        *self.matrix.write().expect("matrix lock") = None;
        Ok(())
    }

    pub fn get(&self, entity_id: &str) -> Result<Option<Vec<f32>>, EngineError> {
        let conn = self.conn.lock().expect("vector conn lock");
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT vector FROM embeddings WHERE entity_id = ?1",
                params![entity_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.map(|b| blob_to_vector(&b)))
    }

    pub fn len(&self) -> Result<usize, EngineError> {
        let conn = self.conn.lock().expect("vector conn lock");
        let count: usize = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool, EngineError> {
        Ok(self.len()? == 0)
    }

    /// Drop all vectors. The dimension is part of the store's identity and
    /// survives a reset.
    pub fn reset(&self) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("vector conn lock");
        conn.execute("DELETE FROM embeddings", [])?;
        drop(conn);
        *self.matrix.write().expect("matrix lock") = None;
        Ok(())
    }

    /// All entity ids with a stored vector.
    pub fn entity_ids(&self) -> Result<Vec<String>, EngineError> {
        let conn = self.conn.lock().expect("vector conn lock");
        let mut stmt = conn.prepare("SELECT entity_id FROM embeddings ORDER BY entity_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Top-k cosine search. `k = 0` returns nothing; `k` beyond the store
    /// size returns everything, ranked.
    pub fn search_top_k(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&(dyn Fn(&str) -> bool + Sync)>,
    ) -> Result<Vec<VectorHit>, EngineError> {
        if query.len() != self.dimension {
            return Err(EngineError::DimensionMismatch {
                store: self.dimension,
                got: query.len(),
            });
        }
        if k == 0 {
            return Ok(vec![]);
        }

        if self.mode == SearchMode::NativeExtension {
            if let Ok(hits) = self.search_native(query, k, filter) {
                return Ok(hits);
            }
            // Module misbehaved; the scan below answers identically.
        }
        self.search_brute_force(query, k, filter)
    }

    fn search_brute_force(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&(dyn Fn(&str) -> bool + Sync)>,
    ) -> Result<Vec<VectorHit>, EngineError> {
        // A concurrent write may invalidate the matrix between build and
        // read; rebuild until a snapshot holds.
        let mut hits: Vec<VectorHit> = loop {
            self.ensure_matrix()?;
            let matrix = self.matrix.read().expect("matrix lock");
            if let Some(rows) = matrix.as_ref() {
                break rows
                    .par_iter()
                    .filter(|(id, _)| filter.map(|f| f(id)).unwrap_or(true))
                    .map(|(id, vector)| VectorHit {
                        entity_id: id.clone(),
                        score: cosine(query, vector),
                    })
                    .collect();
            }
        };
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    /// KNN through the `vec0` virtual-table module when the linked SQLite
    /// provides it. Behavior matches the brute-force path.
    fn search_native(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&(dyn Fn(&str) -> bool + Sync)>,
    ) -> Result<Vec<VectorHit>, EngineError> {
        let conn = self.conn.lock().expect("vector conn lock");
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_index USING vec0(entity_id TEXT, embedding float[{}])",
            self.dimension
        ))?;
        conn.execute("DELETE FROM vec_index", [])?;
        conn.execute(
            "INSERT INTO vec_index (entity_id, embedding) SELECT entity_id, vector FROM embeddings",
            [],
        )?;
        let mut stmt = conn.prepare(
            "SELECT entity_id, distance FROM vec_index WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![vector_to_blob(query), k as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        let mut hits = Vec::new();
        for row in rows.filter_map(|r| r.ok()) {
            if filter.map(|f| f(&row.0)).unwrap_or(true) {
                // vec0 reports cosine distance; scores stay cosine similarity.
                hits.push(VectorHit {
                    entity_id: row.0,
                    score: 1.0 - row.1 as f32,
                });
            }
        }
        Ok(hits)
    }

    fn ensure_matrix(&self) -> Result<(), EngineError> {
        if self.matrix.read().expect("matrix lock").is_some() {
            return Ok(());
        }
        let conn = self.conn.lock().expect("vector conn lock");
        let mut stmt = conn.prepare("SELECT entity_id, vector FROM embeddings")?;
        let rows: Vec<(String, Vec<f32>)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    blob_to_vector(&row.get::<_, Vec<u8>>(1)?),
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        drop(conn);
        *self.matrix.write().expect("matrix lock") = Some(rows);
        Ok(())
    }
}

fn has_native_module(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT 1 FROM pragma_module_list WHERE name = 'vec0'",
        [],
        |_| Ok(true),
    )
    .optional()
    .ok()
    .flatten()
    .unwrap_or(false)
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity; zero-norm inputs score 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
