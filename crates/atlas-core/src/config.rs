//! Configuration loading for atlas.
//!
//! Reads `.code-graph-rag/config.json` and provides typed access to all
//! settings. Falls back to per-field defaults when the file is missing or
//! incomplete; unknown keys are ignored with a warning.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Directory (under the indexed project root) holding all persisted state:
/// `graph.db`, `vectors.db`, and `sessions/`.
pub const STATE_DIR_NAME: &str = ".code-graph-rag";

/// Exclusion globs always applied during indexing, merged with any
/// configured or per-request patterns.
pub const BUILTIN_EXCLUDES: &[&str] = &[
    ".git/**",
    "node_modules/**",
    "dist/**",
    "build/**",
    "target/**",
    "*.min.js",
    ".code-graph-rag/**",
    "tmp/**",
];

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `database.*` options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Overrides the state directory. A leading `~` expands to the user's
    /// home directory.
    #[serde(default)]
    pub path: Option<String>,
}

/// `embedding.*` options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

/// `indexing.*` options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_max_files_per_batch")]
    pub max_files_per_batch: usize,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// `scheduler.*` options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// CPU-bound worker pool size. Defaults to min(4, available cores).
    #[serde(default)]
    pub cpu_workers: Option<usize>,
    #[serde(default = "default_io_workers")]
    pub io_workers: usize,
}

/// `logging.*` options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub mirror_tmp: bool,
}

fn default_dimension() -> usize {
    384
}
fn default_max_files_per_batch() -> usize {
    50
}
fn default_io_workers() -> usize {
    8
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_files_per_batch: default_max_files_per_batch(),
            exclude: Vec::new(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cpu_workers: None,
            io_workers: default_io_workers(),
        }
    }
}

/// Recognized keys per section, used to warn on unknown configuration.
fn known_keys() -> HashMap<&'static str, &'static [&'static str]> {
    let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    m.insert("database", &["path"]);
    m.insert("embedding", &["dimension"]);
    m.insert("indexing", &["max_files_per_batch", "exclude"]);
    m.insert("scheduler", &["cpu_workers", "io_workers"]);
    m.insert("logging", &["directory", "mirror_tmp"]);
    m
}

impl EngineConfig {
    /// Load configuration from `<root>/.code-graph-rag/config.json`.
    /// Returns defaults if the file doesn't exist or can't be parsed.
    pub fn load(project_root: &Path) -> Self {
        let config_path = project_root.join(STATE_DIR_NAME).join("config.json");
        let content = match std::fs::read_to_string(&config_path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        Self::from_json(&content, &config_path.display().to_string())
    }

    /// Parse configuration from a JSON string, warning on unknown keys.
    pub fn from_json(content: &str, origin: &str) -> Self {
        let raw: Value = match serde_json::from_str(content) {
            Ok(v) => v,
            Err(e) => {
                warn!("failed to parse {origin}: {e}, using defaults");
                return Self::default();
            }
        };
        warn_unknown_keys(&raw, origin);
        match serde_json::from_value(raw) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("invalid configuration in {origin}: {e}, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve the state directory for a project root, honoring
    /// `database.path` with `~` expansion.
    pub fn state_dir(&self, project_root: &Path) -> PathBuf {
        match &self.database.path {
            Some(p) => expand_tilde(p),
            None => project_root.join(STATE_DIR_NAME),
        }
    }

    /// Effective CPU pool size: configured value or min(4, available cores).
    pub fn effective_cpu_workers(&self) -> usize {
        self.scheduler.cpu_workers.unwrap_or_else(|| {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4);
            cores.min(4)
        })
    }

    /// Configured exclusion globs merged with the built-in set.
    pub fn merged_excludes(&self, extra: &[String]) -> Vec<String> {
        let mut out: Vec<String> = BUILTIN_EXCLUDES.iter().map(|s| s.to_string()).collect();
        out.extend(self.indexing.exclude.iter().cloned());
        out.extend(extra.iter().cloned());
        out.dedup();
        out
    }
}

fn warn_unknown_keys(raw: &Value, origin: &str) {
    let Some(top) = raw.as_object() else { return };
    let known = known_keys();
    for (section, value) in top {
        match known.get(section.as_str()) {
            None => warn!("unknown configuration section `{section}` in {origin}, ignoring"),
            Some(fields) => {
                if let Some(obj) = value.as_object() {
                    for key in obj.keys() {
                        if !fields.contains(&key.as_str()) {
                            warn!(
                                "unknown configuration option `{section}.{key}` in {origin}, ignoring"
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
