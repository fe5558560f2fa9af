//! Process-level engine counters, surfaced by `get_metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

#[derive(Debug)]
pub struct EngineMetrics {
    started: Instant,
    pub files_parsed: AtomicU64,
    pub cache_hits: AtomicU64,
    pub commits: AtomicU64,
    pub queries: AtomicU64,
    pub embeddings_written: AtomicU64,
    pub errors: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub files_parsed: u64,
    pub cache_hits: u64,
    pub commits: u64,
    pub queries: u64,
    pub embeddings_written: u64,
    pub errors: u64,
    pub parse_throughput_files_per_sec: f64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            files_parsed: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            embeddings_written: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, throughput: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_seconds: self.started.elapsed().as_secs(),
            files_parsed: self.files_parsed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            embeddings_written: self.embeddings_written.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            parse_throughput_files_per_sec: throughput,
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
