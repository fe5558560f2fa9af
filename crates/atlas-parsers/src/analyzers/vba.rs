//! VBA analyzer.
//!
//! No tree-sitter grammar is published for VBA, so this analyzer scans raw
//! lines for module headers, `Sub`/`Function`/`Property` declarations,
//! constants, and `Call` statements. Ids follow the same
//! `"<path>:<kind>:<qualifiedName>"` contract as the grammar-backed
//! analyzers.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;

use atlas_core::types::{Entity, EntityKind, Location, Point, RelKind, Relationship};

use super::{meta, AnalyzerOutput};

fn procedure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:(Public|Private|Friend)\s+)?(?:(Static)\s+)?(Sub|Function|Property\s+(?:Get|Let|Set))\s+(\w+)\s*(\([^)]*\))?",
        )
        .expect("procedure pattern compiles")
    })
}

fn module_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)^\s*Attribute\s+VB_Name\s*=\s*"([^"]+)""#).expect("name pattern compiles")
    })
}

fn const_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:(Public|Private)\s+)?Const\s+(\w+)").expect("const pattern compiles")
    })
}

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*Call\s+(\w+)").expect("call pattern compiles"))
}

fn end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*End\s+(Sub|Function|Property)\b").expect("end pattern compiles")
    })
}

pub fn analyze(path: &str, source: &str) -> AnalyzerOutput {
    let mut out = AnalyzerOutput::default();

    let stem = std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    let mut module = stem.clone();
    // Attribute VB_Name wins over the file stem.
    for line in source.lines() {
        if let Some(captures) = module_name_re().captures(line) {
            module = captures[1].to_string();
            break;
        }
    }
    let module_id = format!("{path}:module:{module}");
    let line_count = source.lines().count().max(1) as u32;
    out.entities.push(Entity {
        id: module_id.clone(),
        name: module.clone(),
        kind: EntityKind::Module,
        file_path: path.to_string(),
        location: span(1, line_count, 0, source.len() as u32),
        modifiers: vec![],
        metadata: meta(&[]),
    });

    let mut current: Option<String> = None;
    let mut byte_offset = 0u32;
    for (idx, line) in source.lines().enumerate() {
        let line_no = idx as u32 + 1;

        if end_re().is_match(line) {
            current = None;
        } else if let Some(captures) = procedure_re().captures(line) {
            let keyword = captures[3].to_lowercase();
            let name = captures[4].to_string();
            let kind = if keyword.starts_with("property") {
                EntityKind::Property
            } else {
                EntityKind::Function
            };
            let id = format!("{}:{}:{}.{}", path, kind.as_str(), module, name);

            let mut modifiers = Vec::new();
            if let Some(vis) = captures.get(1) {
                modifiers.push(vis.as_str().to_string());
            }
            if captures.get(2).is_some() {
                modifiers.push("Static".to_string());
            }
            let mut metadata = meta(&[]);
            if let Some(params) = captures.get(5) {
                metadata.insert("parameters".to_string(), json!(params.as_str()));
            }

            out.entities.push(Entity {
                id: id.clone(),
                name,
                kind,
                file_path: path.to_string(),
                location: span(line_no, line_no, byte_offset, byte_offset + line.len() as u32),
                modifiers,
                metadata,
            });
            out.relationships.push(
                Relationship::new(id.clone(), module_id.clone(), RelKind::MemberOf)
                    .with_metadata("memberType", json!(keyword)),
            );
            current = Some(id);
        } else if let Some(captures) = const_re().captures(line) {
            let name = captures[2].to_string();
            let id = format!("{path}:constant:{module}.{name}");
            let mut modifiers = vec!["Const".to_string()];
            if let Some(vis) = captures.get(1) {
                modifiers.push(vis.as_str().to_string());
            }
            out.entities.push(Entity {
                id,
                name,
                kind: EntityKind::Constant,
                file_path: path.to_string(),
                location: span(line_no, line_no, byte_offset, byte_offset + line.len() as u32),
                modifiers,
                metadata: meta(&[]),
            });
        } else if let Some(captures) = call_re().captures(line) {
            if let Some(from) = &current {
                let callee = captures[1].to_string();
                out.relationships.push(
                    Relationship::new(
                        from.clone(),
                        format!("{path}:function:{module}.{callee}"),
                        RelKind::Calls,
                    )
                    .with_metadata("callType", json!("call")),
                );
            }
        }

        byte_offset += line.len() as u32 + 1;
    }

    out
}

fn span(start_line: u32, end_line: u32, start_index: u32, end_index: u32) -> Location {
    Location {
        start: Point {
            line: start_line,
            column: 0,
            index: start_index,
        },
        end: Point {
            line: end_line,
            column: 0,
            index: end_index,
        },
    }
}
