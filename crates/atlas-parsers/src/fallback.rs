//! Regex fallback extraction for JS/TS.
//!
//! Runs only when a grammar parse yields zero entities and zero diagnostics,
//! guaranteeing non-empty output on degenerate inputs. It recognizes
//! `class`, `function`, TS `interface`, and `type =` declarations.

use std::sync::OnceLock;

use regex::Regex;

use atlas_core::types::{Entity, EntityKind, Location, Point};

struct Pattern {
    re: &'static Regex,
    kind: EntityKind,
}

fn patterns() -> [Pattern; 4] {
    static CLASS: OnceLock<Regex> = OnceLock::new();
    static FUNCTION: OnceLock<Regex> = OnceLock::new();
    static INTERFACE: OnceLock<Regex> = OnceLock::new();
    static TYPE: OnceLock<Regex> = OnceLock::new();
    [
        Pattern {
            re: CLASS.get_or_init(|| {
                Regex::new(r"(?m)^\s*(?:export\s+)?(?:abstract\s+)?class\s+(\w+)")
                    .expect("class pattern compiles")
            }),
            kind: EntityKind::Class,
        },
        Pattern {
            re: FUNCTION.get_or_init(|| {
                Regex::new(r"(?m)^\s*(?:export\s+)?(?:async\s+)?function\s*\*?\s*(\w+)")
                    .expect("function pattern compiles")
            }),
            kind: EntityKind::Function,
        },
        Pattern {
            re: INTERFACE.get_or_init(|| {
                Regex::new(r"(?m)^\s*(?:export\s+)?interface\s+(\w+)")
                    .expect("interface pattern compiles")
            }),
            kind: EntityKind::Interface,
        },
        Pattern {
            re: TYPE.get_or_init(|| {
                Regex::new(r"(?m)^\s*(?:export\s+)?type\s+(\w+)\s*=")
                    .expect("type pattern compiles")
            }),
            kind: EntityKind::Typedef,
        },
    ]
}

/// Extract a minimal entity list from raw JS/TS text.
pub fn extract_js_ts(path: &str, source: &str) -> Vec<Entity> {
    let mut out = Vec::new();
    for pattern in patterns() {
        for captures in pattern.re.captures_iter(source) {
            let name_match = captures.get(1).expect("pattern has a name group");
            let name = name_match.as_str().to_string();
            let offset = name_match.start();
            let line = source[..offset].bytes().filter(|b| *b == b'\n').count() as u32 + 1;
            let column = offset - source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
            out.push(Entity {
                id: Entity::make_id(path, pattern.kind, &name),
                name,
                kind: pattern.kind,
                file_path: path.to_string(),
                location: Location {
                    start: Point {
                        line,
                        column: column as u32,
                        index: offset as u32,
                    },
                    end: Point {
                        line,
                        column: (column + name_match.len()) as u32,
                        index: name_match.end() as u32,
                    },
                },
                modifiers: vec![],
                metadata: serde_json::Map::new(),
            });
        }
    }
    out.sort_by_key(|e| e.location.start.index);
    out
}
