//! Resumable batch-index sessions.
//!
//! A session pins the file list discovered at session start plus a cursor, so
//! `batch_index` calls can honor strict per-call deadlines and pick up where
//! the previous call stopped. Sessions are JSON files under
//! `.code-graph-rag/sessions/`, keyed by session id.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use xxhash_rust::xxh64::xxh64;

use crate::error::EngineError;

/// Sessions untouched for this long are removed on the next session open.
const STALE_AFTER_DAYS: i64 = 7;

/// Running totals for a batch-index session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub processed: usize,
    pub failed: usize,
    pub entities: usize,
    pub relationships: usize,
}

/// A persisted cursor over a file list enabling resumable indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSession {
    pub session_id: String,
    pub root_path: String,
    pub file_queue: Vec<String>,
    pub cursor: usize,
    pub stats: SessionStats,
    /// RFC 3339 wall-clock timestamp.
    pub started_at: String,
}

impl IndexSession {
    /// Create a fresh session over a discovered file list.
    pub fn new(root_path: &str, file_queue: Vec<String>) -> Self {
        let started_at = Utc::now().to_rfc3339();
        let fingerprint = xxh64(
            format!("{root_path}\0{started_at}\0{}", file_queue.len()).as_bytes(),
            0,
        );
        IndexSession {
            session_id: format!("sess-{fingerprint:016x}"),
            root_path: root_path.to_string(),
            file_queue,
            cursor: 0,
            stats: SessionStats::default(),
            started_at,
        }
    }

    pub fn remaining(&self) -> usize {
        self.file_queue.len().saturating_sub(self.cursor)
    }

    pub fn done(&self) -> bool {
        self.cursor >= self.file_queue.len()
    }

    pub fn percent(&self) -> u32 {
        if self.file_queue.is_empty() {
            return 100;
        }
        ((self.cursor * 100) / self.file_queue.len()) as u32
    }

    /// The next slice of at most `max` files, without advancing the cursor.
    pub fn next_chunk(&self, max: usize) -> &[String] {
        let end = (self.cursor + max).min(self.file_queue.len());
        &self.file_queue[self.cursor..end]
    }

    pub fn advance(&mut self, processed: usize) {
        self.cursor = (self.cursor + processed).min(self.file_queue.len());
    }

    fn path_in(dir: &Path, session_id: &str) -> PathBuf {
        dir.join(format!("{session_id}.json"))
    }

    /// Persist under `<dir>/<sessionId>.json`.
    pub fn save(&self, dir: &Path) -> Result<(), EngineError> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path_in(dir, &self.session_id);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load a session by id. Missing or unreadable files are `None`.
    pub fn load(dir: &Path, session_id: &str) -> Option<IndexSession> {
        let path = Self::path_in(dir, session_id);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("session file {} is unreadable: {e}", path.display());
                None
            }
        }
    }

    /// Remove a finished session file. Idempotent.
    pub fn delete(dir: &Path, session_id: &str) {
        let _ = std::fs::remove_file(Self::path_in(dir, session_id));
    }

    /// Remove session files older than the staleness window.
    pub fn gc_stale(dir: &Path) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        let cutoff = Utc::now() - chrono::Duration::days(STALE_AFTER_DAYS);
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(session) = std::fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<IndexSession>(&c).ok())
            else {
                continue;
            };
            let Ok(started) = chrono::DateTime::parse_from_rfc3339(&session.started_at) else {
                continue;
            };
            if started.with_timezone(&Utc) < cutoff {
                debug!("removing stale session {}", session.session_id);
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}
