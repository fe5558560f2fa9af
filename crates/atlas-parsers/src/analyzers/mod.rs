//! Per-language analyzers: walk a CST and emit entities + relationships.
//!
//! All analyzers share the same contract: they never fail across the
//! boundary (problems become diagnostics inside the output), and they stop
//! early when the shared circuit breakers trip — recursion depth over 50,
//! wall clock over 5 s, or (C++ only) the template/complexity caps — keeping
//! whatever partial results were collected.

pub mod c_lang;
pub mod cpp;
pub mod csharp;
pub mod go;
pub mod java;
pub mod javascript;
pub mod markdown;
pub mod python;
pub mod rust_lang;
pub mod vba;

use std::time::{Duration, Instant};

use tracing::warn;
use tree_sitter::{Node, Tree};

use atlas_core::types::{Entity, Location, ParseDiagnostic, Point, Relationship};

use crate::registry::Lang;

/// Maximum CST recursion depth before the analyzer aborts.
pub const MAX_WALK_DEPTH: usize = 50;

/// Maximum wall-clock time one analyzer may spend on one file.
pub const ANALYZER_DEADLINE: Duration = Duration::from_secs(5);

/// What one analyzer produced for one file. Partial on circuit break.
#[derive(Debug, Default)]
pub struct AnalyzerOutput {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl AnalyzerOutput {
    /// Enforce entity-id uniqueness and (from, to, kind) relationship
    /// uniqueness, keeping first occurrences.
    fn dedupe(&mut self) {
        let mut seen_ids = std::collections::HashSet::new();
        self.entities.retain(|e| seen_ids.insert(e.id.clone()));
        let mut seen_rels = std::collections::HashSet::new();
        self.relationships
            .retain(|r| seen_rels.insert((r.from.clone(), r.to.clone(), r.kind)));
    }
}

/// Shared circuit breaker for analyzer walks.
pub struct WalkGuard {
    started: Instant,
    deadline: Duration,
    max_depth: usize,
    trip: Option<String>,
}

impl WalkGuard {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            deadline: ANALYZER_DEADLINE,
            max_depth: MAX_WALK_DEPTH,
            trip: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_limits(deadline: Duration, max_depth: usize) -> Self {
        Self {
            started: Instant::now(),
            deadline,
            max_depth,
            trip: None,
        }
    }

    /// Returns false once any breaker has tripped; callers unwind keeping
    /// partial results.
    pub fn check(&mut self, depth: usize) -> bool {
        if self.trip.is_some() {
            return false;
        }
        if depth > self.max_depth {
            self.trip(format!(
                "recursion depth {depth} exceeds limit {}",
                self.max_depth
            ));
            return false;
        }
        if self.started.elapsed() > self.deadline {
            self.trip(format!(
                "analyzer exceeded {} ms deadline",
                self.deadline.as_millis()
            ));
            return false;
        }
        true
    }

    pub fn trip(&mut self, reason: String) {
        if self.trip.is_none() {
            warn!("circuit breaker: {reason}");
            self.trip = Some(reason);
        }
    }

    pub fn tripped(&self) -> Option<&str> {
        self.trip.as_deref()
    }
}

impl Default for WalkGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Tagged analyzer dispatch, one variant per supported language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analyzer {
    JavaScript,
    TypeScript,
    Python,
    C,
    Cpp,
    Rust,
    Go,
    Java,
    CSharp,
    Vba,
    Markdown,
}

impl Analyzer {
    pub fn for_language(lang: Lang) -> Analyzer {
        match lang {
            Lang::Js => Analyzer::JavaScript,
            Lang::Ts => Analyzer::TypeScript,
            Lang::Python => Analyzer::Python,
            Lang::C => Analyzer::C,
            Lang::Cpp => Analyzer::Cpp,
            Lang::Rust => Analyzer::Rust,
            Lang::Go => Analyzer::Go,
            Lang::Java => Analyzer::Java,
            Lang::CSharp => Analyzer::CSharp,
            Lang::Vba => Analyzer::Vba,
            Lang::Markdown => Analyzer::Markdown,
        }
    }

    /// Analyze one parsed file. `tree` is `None` only for pattern-backed
    /// languages (VBA). A tripped circuit breaker is reported as a
    /// diagnostic; partial results are kept.
    pub fn analyze(&self, tree: Option<&Tree>, path: &str, source: &str) -> AnalyzerOutput {
        let mut guard = WalkGuard::new();
        let mut output = match (self, tree) {
            (Analyzer::Vba, _) => vba::analyze(path, source),
            (Analyzer::JavaScript, Some(t)) => {
                javascript::analyze(t, path, source, false, &mut guard)
            }
            (Analyzer::TypeScript, Some(t)) => {
                javascript::analyze(t, path, source, true, &mut guard)
            }
            (Analyzer::Python, Some(t)) => python::analyze(t, path, source, &mut guard),
            (Analyzer::C, Some(t)) => c_lang::analyze(t, path, source, &mut guard),
            (Analyzer::Cpp, Some(t)) => cpp::analyze(t, path, source, &mut guard),
            (Analyzer::Rust, Some(t)) => rust_lang::analyze(t, path, source, &mut guard),
            (Analyzer::Go, Some(t)) => go::analyze(t, path, source, &mut guard),
            (Analyzer::Java, Some(t)) => java::analyze(t, path, source, &mut guard),
            (Analyzer::CSharp, Some(t)) => csharp::analyze(t, path, source, &mut guard),
            (Analyzer::Markdown, Some(t)) => markdown::analyze(t, path, source, &mut guard),
            (_, None) => {
                let mut out = AnalyzerOutput::default();
                out.diagnostics
                    .push(ParseDiagnostic::new(path, "analyzer requires a syntax tree"));
                out
            }
        };
        if let Some(reason) = guard.tripped() {
            output
                .diagnostics
                .push(ParseDiagnostic::new(path, format!("circuit breaker: {reason}")));
        }
        output.dedupe();
        output
    }
}

// ---------------------------------------------------------------------------
// Shared walk helpers
// ---------------------------------------------------------------------------

pub(crate) fn node_text<'a>(node: Node<'a>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

pub(crate) fn field_text(node: Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, source).to_string())
}

/// Location from CST node positions: rows become 1-based lines, columns and
/// byte indices stay 0-based.
pub(crate) fn location_of(node: Node) -> Location {
    let start = node.start_position();
    let end = node.end_position();
    Location {
        start: Point {
            line: start.row as u32 + 1,
            column: start.column as u32,
            index: node.start_byte() as u32,
        },
        end: Point {
            line: end.row as u32 + 1,
            column: end.column as u32,
            index: node.end_byte() as u32,
        },
    }
}

pub(crate) fn meta(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_trips_on_depth() {
        let mut guard = WalkGuard::new();
        assert!(guard.check(1));
        assert!(guard.check(MAX_WALK_DEPTH));
        assert!(!guard.check(MAX_WALK_DEPTH + 1));
        assert!(guard.tripped().unwrap().contains("recursion depth"));
        // Once tripped, stays tripped.
        assert!(!guard.check(1));
    }

    #[test]
    fn test_guard_trips_on_deadline() {
        let mut guard = WalkGuard::with_limits(Duration::from_millis(0), MAX_WALK_DEPTH);
        std::thread::sleep(Duration::from_millis(2));
        assert!(!guard.check(1));
        assert!(guard.tripped().unwrap().contains("deadline"));
    }

    #[test]
    fn test_dedupe_keeps_first() {
        use atlas_core::types::{EntityKind, RelKind};
        let e = Entity {
            id: "f.js:function:a".into(),
            name: "a".into(),
            kind: EntityKind::Function,
            file_path: "f.js".into(),
            location: Location::default(),
            modifiers: vec![],
            metadata: serde_json::Map::new(),
        };
        let mut out = AnalyzerOutput {
            entities: vec![e.clone(), e.clone()],
            relationships: vec![
                Relationship::new("x", "y", RelKind::Calls),
                Relationship::new("x", "y", RelKind::Calls),
                Relationship::new("x", "y", RelKind::Uses),
            ],
            diagnostics: vec![],
        };
        out.dedupe();
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.relationships.len(), 2);
    }
}
