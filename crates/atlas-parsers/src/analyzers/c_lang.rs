//! C analyzer.
//!
//! Plain-name ids: `"<path>:function:<name>"`, `"<path>:class:<Struct>"`,
//! `"<path>:typedef:<name>"`. `#include` lines become `imports` edges.

use serde_json::json;
use tree_sitter::{Node, Tree};

use atlas_core::types::{Entity, EntityKind, RelKind, Relationship};

use super::{field_text, location_of, meta, node_text, AnalyzerOutput, WalkGuard};

struct Ctx<'a> {
    path: &'a str,
    source: &'a [u8],
    module_id: String,
    out: AnalyzerOutput,
}

pub fn analyze(tree: &Tree, path: &str, source: &str, guard: &mut WalkGuard) -> AnalyzerOutput {
    let stem = std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    let mut ctx = Ctx {
        path,
        source: source.as_bytes(),
        module_id: format!("{path}:module:{stem}"),
        out: AnalyzerOutput::default(),
    };
    walk(tree.root_node(), 0, None, &mut ctx, guard);
    ctx.out
}

/// Unwrap pointer/function declarators down to the declared identifier.
fn declarator_name(node: Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" | "type_identifier" | "field_identifier" => {
            Some(node_text(node, source).to_string())
        }
        "function_declarator" | "pointer_declarator" | "array_declarator"
        | "parenthesized_declarator" | "init_declarator" => node
            .child_by_field_name("declarator")
            .and_then(|d| declarator_name(d, source)),
        _ => None,
    }
}

fn walk(node: Node, depth: usize, caller: Option<&str>, ctx: &mut Ctx, guard: &mut WalkGuard) {
    if !guard.check(depth) {
        return;
    }

    match node.kind() {
        "function_definition" => {
            let declarator = node.child_by_field_name("declarator");
            if let Some(name) = declarator.and_then(|d| declarator_name(d, ctx.source)) {
                let id = format!("{}:function:{}", ctx.path, name);
                let mut metadata = meta(&[]);
                if let Some(ret) = field_text(node, "type", ctx.source) {
                    metadata.insert("returnType".to_string(), json!(ret));
                }
                if let Some(params) = declarator
                    .and_then(|d| parameters_of(d))
                    .map(|p| node_text(p, ctx.source).to_string())
                {
                    metadata.insert("parameters".to_string(), json!(params));
                }
                let mut modifiers = Vec::new();
                if has_storage_class(node, ctx.source, "static") {
                    modifiers.push("static".to_string());
                }
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name,
                    kind: EntityKind::Function,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers,
                    metadata,
                });
                if let Some(body) = node.child_by_field_name("body") {
                    walk(body, depth + 1, Some(&id), ctx, guard);
                }
            }
        }
        "struct_specifier" | "union_specifier" => {
            // Definitions only; bare references have no body.
            if node.child_by_field_name("body").is_some() {
                if let Some(name) = field_text(node, "name", ctx.source) {
                    ctx.out.entities.push(Entity {
                        id: format!("{}:class:{}", ctx.path, name),
                        name,
                        kind: EntityKind::Class,
                        file_path: ctx.path.to_string(),
                        location: location_of(node),
                        modifiers: vec![],
                        metadata: meta(&[]),
                    });
                }
            }
            walk_children(node, depth, caller, ctx, guard);
        }
        "enum_specifier" => {
            if node.child_by_field_name("body").is_some() {
                if let Some(name) = field_text(node, "name", ctx.source) {
                    ctx.out.entities.push(Entity {
                        id: format!("{}:enum:{}", ctx.path, name),
                        name,
                        kind: EntityKind::Enum,
                        file_path: ctx.path.to_string(),
                        location: location_of(node),
                        modifiers: vec![],
                        metadata: meta(&[]),
                    });
                }
            }
            walk_children(node, depth, caller, ctx, guard);
        }
        "type_definition" => {
            if let Some(name) = node
                .child_by_field_name("declarator")
                .and_then(|d| declarator_name(d, ctx.source))
            {
                ctx.out.entities.push(Entity {
                    id: format!("{}:typedef:{}", ctx.path, name),
                    name,
                    kind: EntityKind::Typedef,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: vec![],
                    metadata: meta(&[]),
                });
            }
            walk_children(node, depth, caller, ctx, guard);
        }
        "declaration" => {
            // Top-level globals; prototypes and locals are skipped.
            if caller.is_none() && node.parent().map(|p| p.kind()) == Some("translation_unit") {
                emit_globals(node, ctx);
            }
            walk_children(node, depth, caller, ctx, guard);
        }
        "preproc_include" => {
            if let Some(path_node) = node.child_by_field_name("path") {
                let raw = node_text(path_node, ctx.source)
                    .trim_matches('"')
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string();
                ctx.out.relationships.push(Relationship::new(
                    ctx.module_id.clone(),
                    raw,
                    RelKind::Imports,
                ));
            }
        }
        "call_expression" => {
            if let Some(from) = caller {
                if let Some(function) = node.child_by_field_name("function") {
                    if function.kind() == "identifier" {
                        let callee = node_text(function, ctx.source);
                        ctx.out.relationships.push(
                            Relationship::new(
                                from.to_string(),
                                format!("{}:function:{}", ctx.path, callee),
                                RelKind::Calls,
                            )
                            .with_metadata("callType", json!("function")),
                        );
                    }
                }
            }
            walk_children(node, depth, caller, ctx, guard);
        }
        _ => walk_children(node, depth, caller, ctx, guard),
    }
}

fn walk_children(node: Node, depth: usize, caller: Option<&str>, ctx: &mut Ctx, guard: &mut WalkGuard) {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        walk(child, depth + 1, caller, ctx, guard);
    }
}

fn parameters_of(declarator: Node) -> Option<Node> {
    match declarator.kind() {
        "function_declarator" => declarator.child_by_field_name("parameters"),
        "pointer_declarator" => declarator
            .child_by_field_name("declarator")
            .and_then(parameters_of),
        _ => None,
    }
}

fn has_storage_class(node: Node, source: &[u8], keyword: &str) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| {
        c.kind() == "storage_class_specifier" && node_text(c, source) == keyword
    });
    result
}

fn emit_globals(declaration: Node, ctx: &mut Ctx) {
    let is_const = {
        let mut cursor = declaration.walk();
        let result = declaration
            .children(&mut cursor)
            .any(|c| c.kind() == "type_qualifier" && node_text(c, ctx.source) == "const");
        result
    };
    let mut cursor = declaration.walk();
    for child in declaration.named_children(&mut cursor) {
        let (name, has_function) = match child.kind() {
            "init_declarator" => (
                child
                    .child_by_field_name("declarator")
                    .and_then(|d| declarator_name(d, ctx.source)),
                false,
            ),
            "identifier" => (Some(node_text(child, ctx.source).to_string()), false),
            "function_declarator" => (None, true),
            _ => (None, false),
        };
        if has_function {
            continue;
        }
        let Some(name) = name else { continue };
        let kind = if is_const {
            EntityKind::Constant
        } else {
            EntityKind::Variable
        };
        ctx.out.entities.push(Entity {
            id: format!("{}:{}:{}", ctx.path, kind.as_str(), name),
            name,
            kind,
            file_path: ctx.path.to_string(),
            location: location_of(declaration),
            modifiers: if is_const {
                vec!["const".to_string()]
            } else {
                vec![]
            },
            metadata: meta(&[]),
        });
    }
}
