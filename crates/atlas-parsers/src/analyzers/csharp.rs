//! C# analyzer.
//!
//! Ids are fully qualified by namespace and nested types. Base-list entries
//! whose name follows the `I`-prefix interface convention become
//! `implements` edges; the rest become `inherits`.

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

struct Scope {
    segment: String,
    entity_id: String,
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
    let mut scopes = Vec::new();
    walk(tree.root_node(), 0, &mut scopes, None, &mut ctx, guard);
    ctx.out
}

fn qualify(scopes: &[Scope], name: &str) -> String {
    if scopes.is_empty() {
        name.to_string()
    } else {
        let mut q: String = scopes
            .iter()
            .map(|s| s.segment.as_str())
            .collect::<Vec<_>>()
            .join(".");
        q.push('.');
        q.push_str(name);
        q
    }
}

fn declared_modifiers(node: Node, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "modifier" {
            let text = node_text(child, source);
            if matches!(
                text,
                "public"
                    | "private"
                    | "protected"
                    | "internal"
                    | "static"
                    | "abstract"
                    | "sealed"
                    | "virtual"
                    | "override"
                    | "async"
                    | "readonly"
                    | "const"
            ) {
                out.push(text.to_string());
            }
        }
    }
    out
}

/// `IStore` reads as an interface per the BCL naming convention.
fn looks_like_interface(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('I') && chars.next().is_some_and(|c| c.is_uppercase())
}

fn walk(
    node: Node,
    depth: usize,
    scopes: &mut Vec<Scope>,
    caller: Option<&str>,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    if !guard.check(depth) {
        return;
    }

    match node.kind() {
        "namespace_declaration" | "file_scoped_namespace_declaration" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = qualify(scopes, &name);
                let id = format!("{}:module:{}", ctx.path, qname);
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name: name.clone(),
                    kind: EntityKind::Module,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: vec![],
                    metadata: meta(&[]),
                });
                scopes.push(Scope {
                    segment: name,
                    entity_id: id,
                });
                if let Some(body) = node.child_by_field_name("body") {
                    walk(body, depth + 1, scopes, caller, ctx, guard);
                } else {
                    // File-scoped namespaces cover the remaining siblings.
                    walk_children(node, depth, scopes, caller, ctx, guard);
                }
                scopes.pop();
            }
        }
        "using_directive" => {
            let mut cursor = node.walk();
            if let Some(name) = node
                .named_children(&mut cursor)
                .find(|c| matches!(c.kind(), "qualified_name" | "identifier"))
            {
                ctx.out.relationships.push(Relationship::new(
                    ctx.module_id.clone(),
                    node_text(name, ctx.source).to_string(),
                    RelKind::Imports,
                ));
            };
        }
        "class_declaration" | "record_declaration" | "struct_declaration" => {
            emit_type(node, EntityKind::Class, depth, scopes, caller, ctx, guard);
        }
        "interface_declaration" => {
            emit_type(node, EntityKind::Interface, depth, scopes, caller, ctx, guard);
        }
        "enum_declaration" => {
            emit_type(node, EntityKind::Enum, depth, scopes, caller, ctx, guard);
        }
        "method_declaration" | "constructor_declaration" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = qualify(scopes, &name);
                let id = format!("{}:method:{}", ctx.path, qname);
                let modifiers = declared_modifiers(node, ctx.source);
                let mut metadata = meta(&[]);
                if let Some(params) = field_text(node, "parameters", ctx.source) {
                    metadata.insert("parameters".to_string(), json!(params));
                }
                if let Some(ret) = field_text(node, "returns", ctx.source)
                    .or_else(|| field_text(node, "type", ctx.source))
                {
                    metadata.insert("returnType".to_string(), json!(ret));
                }
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name,
                    kind: EntityKind::Method,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers,
                    metadata,
                });
                if let Some(owner) = scopes.last() {
                    ctx.out.relationships.push(
                        Relationship::new(id.clone(), owner.entity_id.clone(), RelKind::MemberOf)
                            .with_metadata("memberType", json!("method")),
                    );
                }
                if let Some(body) = node.child_by_field_name("body") {
                    walk(body, depth + 1, scopes, Some(&id), ctx, guard);
                }
            }
        }
        "property_declaration" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = qualify(scopes, &name);
                let id = format!("{}:property:{}", ctx.path, qname);
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name,
                    kind: EntityKind::Property,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: declared_modifiers(node, ctx.source),
                    metadata: meta(&[]),
                });
                if let Some(owner) = scopes.last() {
                    ctx.out.relationships.push(
                        Relationship::new(id, owner.entity_id.clone(), RelKind::MemberOf)
                            .with_metadata("memberType", json!("property")),
                    );
                }
            }
        }
        "field_declaration" => {
            let modifiers = declared_modifiers(node, ctx.source);
            let is_const = modifiers.iter().any(|m| m == "const");
            let mut decl_cursor = node.walk();
            let declaration = node
                .named_children(&mut decl_cursor)
                .find(|c| c.kind() == "variable_declaration");
            if let Some(declaration) = declaration {
                let mut cursor = declaration.walk();
                for declarator in declaration
                    .named_children(&mut cursor)
                    .filter(|c| c.kind() == "variable_declarator")
                {
                    let declared = field_text(declarator, "name", ctx.source).or_else(|| {
                        let mut inner = declarator.walk();
                        let result = declarator
                            .named_children(&mut inner)
                            .find(|c| c.kind() == "identifier")
                            .map(|c| node_text(c, ctx.source).to_string());
                        result
                    });
                    if let Some(name) = declared {
                        let qname = qualify(scopes, &name);
                        let kind = if is_const {
                            EntityKind::Constant
                        } else {
                            EntityKind::Property
                        };
                        let id = format!("{}:{}:{}", ctx.path, kind.as_str(), qname);
                        ctx.out.entities.push(Entity {
                            id: id.clone(),
                            name,
                            kind,
                            file_path: ctx.path.to_string(),
                            location: location_of(declarator),
                            modifiers: modifiers.clone(),
                            metadata: meta(&[]),
                        });
                        if let Some(owner) = scopes.last() {
                            ctx.out.relationships.push(
                                Relationship::new(id, owner.entity_id.clone(), RelKind::MemberOf)
                                    .with_metadata("memberType", json!("field")),
                            );
                        }
                    }
                }
            }
        }
        "invocation_expression" => {
            if let Some(from) = caller {
                if let Some(function) = node.child_by_field_name("function") {
                    let callee = match function.kind() {
                        "identifier" => Some(node_text(function, ctx.source).to_string()),
                        "member_access_expression" => function
                            .child_by_field_name("name")
                            .map(|n| node_text(n, ctx.source).to_string()),
                        _ => None,
                    };
                    if let Some(callee) = callee {
                        ctx.out.relationships.push(
                            Relationship::new(
                                from.to_string(),
                                format!("{}:function:{}", ctx.path, callee),
                                RelKind::Calls,
                            )
                            .with_metadata("callType", json!("method")),
                        );
                    }
                }
            }
            walk_children(node, depth, scopes, caller, ctx, guard);
        }
        _ => walk_children(node, depth, scopes, caller, ctx, guard),
    }
}

fn walk_children(
    node: Node,
    depth: usize,
    scopes: &mut Vec<Scope>,
    caller: Option<&str>,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        walk(child, depth + 1, scopes, caller, ctx, guard);
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_type(
    node: Node,
    kind: EntityKind,
    depth: usize,
    scopes: &mut Vec<Scope>,
    caller: Option<&str>,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    let Some(name) = field_text(node, "name", ctx.source) else {
        return;
    };
    let qname = qualify(scopes, &name);
    let id = format!("{}:{}:{}", ctx.path, kind.as_str(), qname);
    let modifiers = declared_modifiers(node, ctx.source);
    ctx.out.entities.push(Entity {
        id: id.clone(),
        name: name.clone(),
        kind,
        file_path: ctx.path.to_string(),
        location: location_of(node),
        modifiers,
        metadata: meta(&[]),
    });

    let mut cursor = node.walk();
    if let Some(bases) = node
        .children(&mut cursor)
        .find(|c| c.kind() == "base_list")
    {
        let mut inner = bases.walk();
        for base in bases.named_children(&mut inner) {
            let base_name = node_text(base, ctx.source).to_string();
            let rel_kind = if kind == EntityKind::Interface || looks_like_interface(&base_name) {
                RelKind::Implements
            } else {
                RelKind::Inherits
            };
            ctx.out
                .relationships
                .push(Relationship::new(id.clone(), base_name, rel_kind));
        }
    }

    if let Some(body) = node.child_by_field_name("body") {
        scopes.push(Scope {
            segment: name,
            entity_id: id,
        });
        walk(body, depth + 1, scopes, caller, ctx, guard);
        scopes.pop();
    }
}
