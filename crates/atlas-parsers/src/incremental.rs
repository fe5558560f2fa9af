//! The incremental parser: content-hash keyed LRU cache, batch parsing with
//! bounded parallelism, and incremental re-parse of edited files.
//!
//! Failures never escape: every problem becomes a [`ParseResult`] carrying
//! one diagnostic, and failed paths are cached under an error key so they are
//! not retried until their content changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use lru::LruCache;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tree_sitter::Tree;

use atlas_core::error::EngineError;
use atlas_core::hash::{cache_key, content_hash, error_cache_key};
use atlas_core::types::{Entity, FileCommit, FileRecord, ParseDiagnostic, Relationship};

use crate::analyzers::Analyzer;
use crate::fallback;
use crate::registry::{grammar_for, Grammar, Lang};
use crate::treesitter::{CstParser, EditSpan, PARSE_DEADLINE};

/// Default LRU budget: serialized result bytes.
pub const DEFAULT_CACHE_BYTES: usize = 100 * 1024 * 1024;

/// Default number of files per batch chunk.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Everything produced by one parse of one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub file_path: String,
    pub language: String,
    pub content_hash: String,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub errors: Vec<ParseDiagnostic>,
    pub parse_time_ms: u64,
    pub from_cache: bool,
}

impl ParseResult {
    /// Build the per-file commit for graph storage. The file row is written
    /// even when the parse failed, so the graph reflects the file's
    /// existence.
    pub fn to_commit(&self) -> FileCommit {
        FileCommit {
            file_path: self.file_path.clone(),
            entities: self.entities.clone(),
            relationships: self.relationships.clone(),
            record: FileRecord {
                file_path: self.file_path.clone(),
                content_hash: self.content_hash.clone(),
                language: self.language.clone(),
                last_parsed_at: chrono::Utc::now().to_rfc3339(),
                parse_time_ms: self.parse_time_ms,
                error_count: self.errors.len() as u32,
            },
        }
    }
}

/// Options for single-file parses.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub use_cache: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

/// One file in a batch. `path` is the id path recorded on entities;
/// `disk_path` overrides where bytes are read from when `text` is absent.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub path: String,
    pub disk_path: Option<PathBuf>,
    pub text: Option<String>,
}

impl BatchFile {
    pub fn from_path(path: impl Into<String>) -> Self {
        BatchFile {
            path: path.into(),
            disk_path: None,
            text: None,
        }
    }
}

/// Options for batch parsing.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub use_cache: bool,
    /// Checked between chunks; set to stop early.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            use_cache: true,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub from_cache: usize,
    pub total_time_ms: u64,
}

/// Outcome of a batch parse. Per-file failures land in `results` (with their
/// diagnostics) and are summarized in `errors`; a batch never aborts on one.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<ParseResult>,
    pub errors: Vec<ParseDiagnostic>,
    pub stats: BatchStats,
    pub cancelled: bool,
}

/// A change driven through [`IncrementalParser::process_incremental`].
#[derive(Debug, Clone)]
pub struct FileChange {
    pub file_path: String,
    pub change_type: ChangeKind,
    pub content: Option<String>,
    pub edits: Vec<EditSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A serializable cache row, used for export and warm restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub result: ParseResult,
    pub size: usize,
    pub cached_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct ResultCache {
    entries: LruCache<String, CacheEntry>,
    total_bytes: usize,
    max_bytes: usize,
    hits: u64,
    misses: u64,
}

impl ResultCache {
    fn new(max_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_bytes: 0,
            max_bytes,
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: &str) -> Option<ParseResult> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.hits += 1;
                entry.cached_at = chrono::Utc::now().to_rfc3339();
                let mut result = entry.result.clone();
                result.from_cache = true;
                Some(result)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Peek without touching hit counters or recency (for error-key checks).
    fn peek_hash(&self, key: &str) -> Option<String> {
        self.entries.peek(key).map(|e| e.result.content_hash.clone())
    }

    fn insert(&mut self, key: String, result: ParseResult) {
        let size = serde_json::to_vec(&result).map(|v| v.len()).unwrap_or(0);
        if let Some(old) = self.entries.pop(&key) {
            self.total_bytes = self.total_bytes.saturating_sub(old.size);
        }
        self.total_bytes += size;
        self.entries.push(
            key.clone(),
            CacheEntry {
                key,
                result,
                size,
                cached_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        while self.total_bytes > self.max_bytes {
            let Some((evicted_key, evicted)) = self.entries.pop_lru() else {
                break;
            };
            self.total_bytes = self.total_bytes.saturating_sub(evicted.size);
            debug!("cache evicted {evicted_key} ({} bytes)", evicted.size);
        }
    }

    fn remove_path(&mut self, path: &str) {
        let prefix = format!("{path}:");
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            if let Some(entry) = self.entries.pop(&key) {
                self.total_bytes = self.total_bytes.saturating_sub(entry.size);
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            bytes: self.total_bytes,
            hits: self.hits,
            misses: self.misses,
        }
    }
}

struct Throughput {
    files: u64,
    millis: u64,
}

/// Coordinates cache, parsing, and analysis for single files, batches, and
/// incremental change sets.
pub struct IncrementalParser {
    cache: Mutex<ResultCache>,
    trees: Mutex<HashMap<String, Tree>>,
    throughput: Mutex<Throughput>,
}

impl IncrementalParser {
    pub fn new() -> Self {
        Self::with_cache_bytes(DEFAULT_CACHE_BYTES)
    }

    pub fn with_cache_bytes(max_bytes: usize) -> Self {
        Self {
            cache: Mutex::new(ResultCache::new(max_bytes)),
            trees: Mutex::new(HashMap::new()),
            throughput: Mutex::new(Throughput { files: 0, millis: 0 }),
        }
    }

    /// Parse one file. Reads bytes from disk when `text` is omitted.
    pub fn parse_file(&self, path: &str, text: Option<&str>, opts: &ParseOptions) -> ParseResult {
        self.parse_file_from(path, None, text, opts)
    }

    fn parse_file_from(
        &self,
        path: &str,
        disk_path: Option<&Path>,
        text: Option<&str>,
        opts: &ParseOptions,
    ) -> ParseResult {
        let started = Instant::now();

        let owned;
        let content: &str = match text {
            Some(t) => t,
            None => {
                let read_from = disk_path.unwrap_or_else(|| Path::new(path));
                match std::fs::read_to_string(read_from) {
                    Ok(c) => {
                        owned = c;
                        &owned
                    }
                    Err(e) => {
                        return self.fail(path, "", format!("read failed: {e}"), started, opts);
                    }
                }
            }
        };

        let hash = content_hash(content.as_bytes());
        if opts.use_cache {
            let mut cache = self.cache.lock().expect("cache lock");
            if let Some(hit) = cache.get(&cache_key(path, &hash)) {
                return hit;
            }
            // A cached failure for identical content suppresses the retry.
            if cache.peek_hash(&error_cache_key(path)).as_deref() == Some(hash.as_str()) {
                if let Some(hit) = cache.get(&error_cache_key(path)) {
                    return hit;
                }
            }
        }

        let (lang, grammar) = match grammar_for(Path::new(path)) {
            Ok(pair) => pair,
            Err(e) => return self.fail_hashed(path, &hash, "", e, started, opts),
        };

        let result = match grammar {
            Grammar::Pattern => {
                let output = Analyzer::for_language(lang).analyze(None, path, content);
                self.finish(path, lang, &hash, output, None, started, opts)
            }
            Grammar::TreeSitter(ts_lang) => {
                let mut parser = CstParser::new();
                match parser.parse(&ts_lang, content, PARSE_DEADLINE) {
                    Ok(parsed) => {
                        let mut output =
                            Analyzer::for_language(lang).analyze(Some(&parsed.tree), path, content);
                        if matches!(lang, Lang::Js | Lang::Ts)
                            && output.entities.is_empty()
                            && output.diagnostics.is_empty()
                        {
                            output.entities = fallback::extract_js_ts(path, content);
                        }
                        self.finish(path, lang, &hash, output, Some(parsed.tree), started, opts)
                    }
                    Err(e) => self.fail_hashed(path, &hash, lang.as_str(), e, started, opts),
                }
            }
        };
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        path: &str,
        lang: Lang,
        hash: &str,
        output: crate::analyzers::AnalyzerOutput,
        tree: Option<Tree>,
        started: Instant,
        opts: &ParseOptions,
    ) -> ParseResult {
        let result = ParseResult {
            file_path: path.to_string(),
            language: lang.as_str().to_string(),
            content_hash: hash.to_string(),
            entities: output.entities,
            relationships: output.relationships,
            errors: output.diagnostics,
            parse_time_ms: started.elapsed().as_millis() as u64,
            from_cache: false,
        };
        if opts.use_cache {
            self.cache
                .lock()
                .expect("cache lock")
                .insert(cache_key(path, hash), result.clone());
        }
        if let Some(tree) = tree {
            self.trees
                .lock()
                .expect("trees lock")
                .insert(path.to_string(), tree);
        }
        result
    }

    fn fail(
        &self,
        path: &str,
        hash: &str,
        message: String,
        started: Instant,
        opts: &ParseOptions,
    ) -> ParseResult {
        let language = grammar_for(Path::new(path))
            .map(|(l, _)| l.as_str().to_string())
            .unwrap_or_default();
        let result = ParseResult {
            file_path: path.to_string(),
            language,
            content_hash: hash.to_string(),
            entities: vec![],
            relationships: vec![],
            errors: vec![ParseDiagnostic::new(path, message)],
            parse_time_ms: started.elapsed().as_millis() as u64,
            from_cache: false,
        };
        if opts.use_cache {
            self.cache
                .lock()
                .expect("cache lock")
                .insert(error_cache_key(path), result.clone());
        }
        result
    }

    fn fail_hashed(
        &self,
        path: &str,
        hash: &str,
        language: &str,
        error: EngineError,
        started: Instant,
        opts: &ParseOptions,
    ) -> ParseResult {
        let mut result = self.fail(path, hash, error.to_string(), started, opts);
        result.language = language.to_string();
        result
    }

    /// Parse many files in chunks with bounded parallelism. Per-file errors
    /// never abort the batch; cancellation is honored between chunks.
    pub fn parse_batch(&self, files: Vec<BatchFile>, opts: &BatchOptions) -> BatchOutcome {
        let started = Instant::now();
        let mut outcome = BatchOutcome {
            stats: BatchStats {
                total: files.len(),
                ..BatchStats::default()
            },
            ..BatchOutcome::default()
        };
        let parse_opts = ParseOptions {
            use_cache: opts.use_cache,
        };

        let chunk_size = opts.batch_size.max(1);
        let mut processed = 0usize;
        for chunk in files.chunks(chunk_size) {
            if let Some(cancel) = &opts.cancel {
                if cancel.load(Ordering::Relaxed) {
                    outcome.cancelled = true;
                    break;
                }
            }
            let results: Vec<ParseResult> = chunk
                .par_iter()
                .map(|file| {
                    self.parse_file_from(
                        &file.path,
                        file.disk_path.as_deref(),
                        file.text.as_deref(),
                        &parse_opts,
                    )
                })
                .collect();
            for result in results {
                if result.errors.is_empty() {
                    outcome.stats.succeeded += 1;
                } else {
                    outcome.stats.failed += 1;
                    outcome.errors.extend(result.errors.iter().cloned());
                }
                if result.from_cache {
                    outcome.stats.from_cache += 1;
                }
                outcome.results.push(result);
            }
            processed += chunk.len();
            if processed % 100 == 0 {
                info!("parsed {processed}/{} files", outcome.stats.total);
            }
        }

        outcome.stats.total_time_ms = started.elapsed().as_millis() as u64;
        {
            let mut throughput = self.throughput.lock().expect("throughput lock");
            throughput.files += outcome.results.len() as u64;
            throughput.millis += outcome.stats.total_time_ms;
        }
        outcome
    }

    /// Running throughput in files per second across all batches.
    pub fn throughput(&self) -> f64 {
        let t = self.throughput.lock().expect("throughput lock");
        if t.millis == 0 {
            0.0
        } else {
            t.files as f64 * 1000.0 / t.millis as f64
        }
    }

    /// Apply a set of file changes. Deletions return no result; the caller
    /// uses the missing entry to drive graph deletion.
    pub fn process_incremental(
        &self,
        changes: &[FileChange],
        opts: &ParseOptions,
    ) -> Vec<ParseResult> {
        let mut results = Vec::new();
        for change in changes {
            match change.change_type {
                ChangeKind::Deleted => {
                    self.cache
                        .lock()
                        .expect("cache lock")
                        .remove_path(&change.file_path);
                    self.trees
                        .lock()
                        .expect("trees lock")
                        .remove(&change.file_path);
                }
                ChangeKind::Created | ChangeKind::Modified => {
                    let reparsed = match (&change.content, change.edits.is_empty()) {
                        (Some(content), false) => {
                            self.reparse_incremental(&change.file_path, content, &change.edits, opts)
                        }
                        _ => None,
                    };
                    match reparsed {
                        Some(result) => results.push(result),
                        None => results.push(self.parse_file(
                            &change.file_path,
                            change.content.as_deref(),
                            opts,
                        )),
                    }
                }
            }
        }
        results
    }

    /// Incremental path: requires a retained tree from a previous parse.
    fn reparse_incremental(
        &self,
        path: &str,
        content: &str,
        edits: &[EditSpan],
        opts: &ParseOptions,
    ) -> Option<ParseResult> {
        let started = Instant::now();
        let hash = content_hash(content.as_bytes());
        if opts.use_cache {
            if let Some(hit) = self.cache.lock().expect("cache lock").get(&cache_key(path, &hash)) {
                return Some(hit);
            }
        }

        let mut old_tree = self.trees.lock().expect("trees lock").remove(path)?;
        let (lang, Grammar::TreeSitter(ts_lang)) = grammar_for(Path::new(path)).ok()? else {
            return None;
        };

        let mut parser = CstParser::new();
        match parser.parse_incremental(&ts_lang, content, edits, &mut old_tree, PARSE_DEADLINE) {
            Ok(parsed) => {
                let output =
                    Analyzer::for_language(lang).analyze(Some(&parsed.tree), path, content);
                Some(self.finish(path, lang, &hash, output, Some(parsed.tree), started, opts))
            }
            Err(e) => Some(self.fail_hashed(path, &hash, lang.as_str(), e, started, opts)),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.lock().expect("cache lock").clear();
    }

    /// Deterministic export of the cache, sorted by key.
    pub fn export_cache(&self) -> Vec<CacheEntry> {
        let cache = self.cache.lock().expect("cache lock");
        let mut entries: Vec<CacheEntry> = cache
            .entries
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Seed the cache from a prior export. On an unchanged repository the
    /// subsequent batch must hit for every warmed file.
    pub fn warm_restart(&self, entries: Vec<CacheEntry>) {
        let mut cache = self.cache.lock().expect("cache lock");
        for entry in entries {
            let mut result = entry.result;
            result.from_cache = false;
            cache.insert(entry.key, result);
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().expect("cache lock").stats()
    }
}

impl Default for IncrementalParser {
    fn default() -> Self {
        Self::new()
    }
}
