//! Index pipeline: walk → parse batch → per-file commit → embedding refresh.
//!
//! Also owns resumable batch sessions (`batch_index`) and stale-file cleanup
//! for incremental re-index. Every commit is per-file atomic; a file that
//! fails to parse still commits its file record so the graph reflects its
//! existence.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use atlas_core::config::EngineConfig;
use atlas_core::error::EngineError;
use atlas_core::session::IndexSession;
use atlas_core::sqlite::SqliteGraphStore;
use atlas_core::store::GraphStore;
use atlas_core::types::ParseDiagnostic;
use atlas_parsers::incremental::{
    BatchFile, BatchOptions, ChangeKind, FileChange, IncrementalParser, ParseOptions, ParseResult,
};
use atlas_parsers::walker::FileWalker;
use atlas_semantic::indexer::SemanticIndexer;

use crate::bus::{KnowledgeBus, TOPIC_INDEX_DIRTY, TOPIC_PARSE_DONE};
use crate::metrics::EngineMetrics;

/// Cap on the error list carried inside reports; the count is always exact.
const MAX_REPORTED_ERRORS: usize = 25;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub incremental: bool,
    pub exclude: Vec<String>,
    pub force: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub entities: usize,
    pub relationships: usize,
    pub duration_ms: u64,
    pub from_cache: usize,
    pub error_count: usize,
    pub errors: Vec<ParseDiagnostic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub session_id: String,
    pub done: bool,
    pub processed: usize,
    pub remaining: usize,
    pub percent: u32,
    pub errors: Vec<ParseDiagnostic>,
}

pub struct IndexPipeline {
    root: PathBuf,
    state_dir: PathBuf,
    config: EngineConfig,
    parser: Arc<IncrementalParser>,
    graph: Arc<Mutex<SqliteGraphStore>>,
    semantic: Arc<SemanticIndexer>,
    bus: Arc<KnowledgeBus>,
    metrics: Arc<EngineMetrics>,
}

impl IndexPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        root: PathBuf,
        state_dir: PathBuf,
        config: EngineConfig,
        parser: Arc<IncrementalParser>,
        graph: Arc<Mutex<SqliteGraphStore>>,
        semantic: Arc<SemanticIndexer>,
        bus: Arc<KnowledgeBus>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            root,
            state_dir,
            config,
            parser,
            graph,
            semantic,
            bus,
            metrics,
        }
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir.join("sessions")
    }

    pub fn parser(&self) -> &Arc<IncrementalParser> {
        &self.parser
    }

    fn discover(&self, sub_path: Option<&Path>, extra_excludes: &[String]) -> Vec<BatchFile> {
        let walk_root = match sub_path {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => self.root.join(p),
            None => self.root.clone(),
        };
        let excludes = self.config.merged_excludes(extra_excludes);
        let walker = FileWalker::new(&walk_root, &excludes);
        walker
            .walk()
            .into_iter()
            .map(|entry| {
                let rel = entry
                    .path
                    .strip_prefix(&self.root)
                    .unwrap_or(&entry.path)
                    .to_string_lossy()
                    .replace('\\', "/");
                BatchFile {
                    path: rel,
                    disk_path: Some(entry.path),
                    text: None,
                }
            })
            .collect()
    }

    /// Full or incremental index of the root (or a subtree). Unchanged files
    /// hit the parse cache; files that vanished since the last run are
    /// deleted from the graph when the whole root is walked.
    pub fn index(
        &self,
        sub_path: Option<&Path>,
        opts: &IndexOptions,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<IndexReport, EngineError> {
        let started = Instant::now();
        let files = self.discover(sub_path, &opts.exclude);
        let walked: Vec<String> = files.iter().map(|f| f.path.clone()).collect();

        let outcome = self.parser.parse_batch(
            files,
            &BatchOptions {
                batch_size: 10,
                use_cache: !opts.force,
                cancel,
            },
        );
        if outcome.cancelled {
            return Err(EngineError::Cancelled);
        }

        let mut report = IndexReport {
            files_indexed: outcome.results.len(),
            from_cache: outcome.stats.from_cache,
            ..IndexReport::default()
        };
        self.commit_results(&outcome.results, opts.force, &mut report)?;

        if sub_path.is_none() {
            self.remove_vanished(&walked)?;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        self.metrics
            .add(&self.metrics.files_parsed, report.files_indexed as u64);
        self.metrics
            .add(&self.metrics.cache_hits, report.from_cache as u64);
        info!(
            files = report.files_indexed,
            entities = report.entities,
            relationships = report.relationships,
            "index pass complete"
        );
        Ok(report)
    }

    /// Reset both stores and re-index from scratch.
    pub fn clean_index(
        &self,
        sub_path: Option<&Path>,
        opts: &IndexOptions,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<IndexReport, EngineError> {
        self.graph.lock().expect("graph lock").reset()?;
        self.semantic.store().reset()?;
        self.parser.clear_cache();
        let mut forced = opts.clone();
        forced.force = true;
        self.index(sub_path, &forced, cancel)
    }

    /// One resumable batch step: at most `max_files` files, then persist the
    /// cursor. Pass the returned session id back in to continue.
    pub fn batch_index(
        &self,
        sub_path: Option<&Path>,
        session_id: Option<&str>,
        max_files: Option<usize>,
        opts: &IndexOptions,
    ) -> Result<BatchProgress, EngineError> {
        let sessions = self.sessions_dir();
        IndexSession::gc_stale(&sessions);

        let mut session = match session_id {
            Some(id) => IndexSession::load(&sessions, id).ok_or_else(|| {
                EngineError::InvalidArgument(format!("unknown session: {id}"))
            })?,
            None => {
                let files = self.discover(sub_path, &opts.exclude);
                let queue: Vec<String> = files.into_iter().map(|f| f.path).collect();
                IndexSession::new(&self.root.to_string_lossy(), queue)
            }
        };

        let chunk_size = max_files.unwrap_or(self.config.indexing.max_files_per_batch);
        let chunk: Vec<BatchFile> = session
            .next_chunk(chunk_size)
            .iter()
            .map(|rel| BatchFile {
                path: rel.clone(),
                disk_path: Some(self.root.join(rel)),
                text: None,
            })
            .collect();

        let outcome = self.parser.parse_batch(
            chunk,
            &BatchOptions {
                batch_size: 10,
                use_cache: !opts.force,
                cancel: None,
            },
        );
        let mut report = IndexReport::default();
        self.commit_results(&outcome.results, opts.force, &mut report)?;

        session.advance(outcome.results.len());
        session.stats.processed += outcome.stats.succeeded + outcome.stats.failed;
        session.stats.failed += outcome.stats.failed;
        session.stats.entities += report.entities;
        session.stats.relationships += report.relationships;
        session.save(&sessions)?;

        Ok(BatchProgress {
            session_id: session.session_id.clone(),
            done: session.done(),
            processed: session.cursor,
            remaining: session.remaining(),
            percent: session.percent(),
            errors: report.errors,
        })
    }

    /// Apply explicit file changes (editor-driven): created and modified
    /// files re-parse (incrementally when edits are supplied), deletions drop
    /// graph rows and embeddings.
    pub fn apply_changes(&self, changes: &[FileChange]) -> Result<Vec<ParseResult>, EngineError> {
        let results = self
            .parser
            .process_incremental(changes, &ParseOptions::default());

        let mut report = IndexReport::default();
        self.commit_results(&results, false, &mut report)?;

        for change in changes {
            if change.change_type == ChangeKind::Deleted {
                self.delete_file(&change.file_path)?;
            }
        }
        Ok(results)
    }

    fn delete_file(&self, rel_path: &str) -> Result<(), EngineError> {
        let old = {
            let graph = self.graph.lock().expect("graph lock");
            graph.entities_by_file(rel_path)?
        };
        self.semantic.on_file_deleted(&old)?;
        self.graph
            .lock()
            .expect("graph lock")
            .delete_file(rel_path)?;
        self.bus
            .publish(TOPIC_INDEX_DIRTY, json!({ "file": rel_path, "deleted": true }));
        Ok(())
    }

    fn remove_vanished(&self, walked: &[String]) -> Result<(), EngineError> {
        let known: Vec<String> = {
            let graph = self.graph.lock().expect("graph lock");
            graph
                .file_records()?
                .into_iter()
                .map(|r| r.file_path)
                .collect()
        };
        let walked_set: std::collections::HashSet<&str> =
            walked.iter().map(|s| s.as_str()).collect();
        for path in known {
            if !walked_set.contains(path.as_str()) {
                warn!("file {path} vanished since last index, removing");
                self.parser.process_incremental(
                    &[FileChange {
                        file_path: path.clone(),
                        change_type: ChangeKind::Deleted,
                        content: None,
                        edits: vec![],
                    }],
                    &ParseOptions::default(),
                );
                self.delete_file(&path)?;
            }
        }
        Ok(())
    }

    fn commit_results(
        &self,
        results: &[ParseResult],
        force: bool,
        report: &mut IndexReport,
    ) -> Result<(), EngineError> {
        for result in results {
            report.entities += result.entities.len();
            report.relationships += result.relationships.len();
            report.error_count += result.errors.len();
            for error in &result.errors {
                if report.errors.len() < MAX_REPORTED_ERRORS {
                    report.errors.push(error.clone());
                }
            }

            let old = {
                let graph = self.graph.lock().expect("graph lock");
                // A cached result whose hash matches the stored record means
                // the graph already holds exactly these rows.
                if !force && result.from_cache {
                    if let Some(record) = graph.file_record(&result.file_path)? {
                        if record.content_hash == result.content_hash {
                            continue;
                        }
                    }
                }
                graph.entities_by_file(&result.file_path)?
            };

            self.graph
                .lock()
                .expect("graph lock")
                .commit_file(&result.to_commit())?;
            self.metrics.add(&self.metrics.commits, 1);
            self.semantic.on_commit(&old, &result.entities)?;
            self.bus.publish(
                TOPIC_PARSE_DONE,
                json!({
                    "file": result.file_path,
                    "entities": result.entities.len(),
                    "fromCache": result.from_cache,
                }),
            );
        }
        let pending = self.semantic.pending_len();
        if pending > 0 {
            self.bus
                .publish(TOPIC_INDEX_DIRTY, json!({ "pendingEmbeddings": pending }));
        }
        Ok(())
    }

    /// Drain pending embeddings; returns how many were written.
    pub fn refresh_embeddings(&self) -> Result<usize, EngineError> {
        let written = self.semantic.embed_all_pending()?;
        if written > 0 {
            self.metrics
                .add(&self.metrics.embeddings_written, written as u64);
        }
        Ok(written)
    }
}
