//! Markdown analyzer.
//!
//! Emits one `"<path>:document"` entity per file plus
//! `"<path>:heading:<slug-or-line>"` entities with `contains` edges from the
//! document to each heading.

use serde_json::json;
use tree_sitter::{Node, Tree};

use atlas_core::types::{Entity, EntityKind, RelKind, Relationship};

use super::{location_of, meta, node_text, AnalyzerOutput, WalkGuard};

pub fn analyze(tree: &Tree, path: &str, source: &str, guard: &mut WalkGuard) -> AnalyzerOutput {
    let mut out = AnalyzerOutput::default();
    let bytes = source.as_bytes();
    let root = tree.root_node();

    let document_id = format!("{path}:document");
    let title = std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    out.entities.push(Entity {
        id: document_id.clone(),
        name: title,
        kind: EntityKind::Document,
        file_path: path.to_string(),
        location: location_of(root),
        modifiers: vec![],
        metadata: meta(&[]),
    });

    walk(root, 0, path, bytes, &document_id, &mut out, guard);
    out
}

fn walk(
    node: Node,
    depth: usize,
    path: &str,
    source: &[u8],
    document_id: &str,
    out: &mut AnalyzerOutput,
    guard: &mut WalkGuard,
) {
    if !guard.check(depth) {
        return;
    }

    match node.kind() {
        "atx_heading" | "setext_heading" => {
            let text = heading_text(node, source);
            let line = node.start_position().row as u32 + 1;
            let slug = slugify(&text);
            let key = if slug.is_empty() {
                line.to_string()
            } else {
                slug
            };
            let id = format!("{path}:heading:{key}");
            out.entities.push(Entity {
                id: id.clone(),
                name: if text.is_empty() {
                    format!("line {line}")
                } else {
                    text
                },
                kind: EntityKind::Heading,
                file_path: path.to_string(),
                location: location_of(node),
                modifiers: vec![],
                metadata: meta(&[("level", json!(heading_level(node)))]),
            });
            out.relationships.push(Relationship::new(
                document_id.to_string(),
                id,
                RelKind::Contains,
            ));
        }
        _ => {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            for child in children {
                walk(child, depth + 1, path, source, document_id, out, guard);
            }
        }
    }
}

fn heading_text(heading: Node, source: &[u8]) -> String {
    let mut cursor = heading.walk();
    for child in heading.children(&mut cursor) {
        if child.kind() == "inline" || child.kind() == "paragraph" {
            return node_text(child, source).trim().to_string();
        }
    }
    String::new()
}

fn heading_level(heading: Node) -> u32 {
    let mut cursor = heading.walk();
    for child in heading.children(&mut cursor) {
        match child.kind() {
            "atx_h1_marker" | "setext_h1_underline" => return 1,
            "atx_h2_marker" | "setext_h2_underline" => return 2,
            "atx_h3_marker" => return 3,
            "atx_h4_marker" => return 4,
            "atx_h5_marker" => return 5,
            "atx_h6_marker" => return 6,
            _ => {}
        }
    }
    1
}

/// Lowercase, alphanumerics kept, runs of anything else collapse to `-`.
fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_dash = true;
        }
    }
    out
}
