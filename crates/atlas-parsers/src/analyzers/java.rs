//! Java analyzer.
//!
//! Ids are fully qualified by package and nested types:
//! `"<path>:class:<pkg.Outer.Inner>"`, `"<path>:method:<pkg.Outer.run>"`.

use serde_json::json;
use tree_sitter::{Node, Tree};

use atlas_core::types::{Entity, EntityKind, RelKind, Relationship};

use super::{field_text, location_of, meta, node_text, AnalyzerOutput, WalkGuard};

struct Ctx<'a> {
    path: &'a str,
    source: &'a [u8],
    package: String,
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
        package: String::new(),
        module_id: format!("{path}:module:{stem}"),
        out: AnalyzerOutput::default(),
    };
    let mut scopes = Vec::new();
    walk(tree.root_node(), 0, &mut scopes, None, &mut ctx, guard);
    ctx.out
}

fn qualify(package: &str, scopes: &[Scope], name: &str) -> String {
    let mut parts = Vec::new();
    if !package.is_empty() {
        parts.push(package.to_string());
    }
    parts.extend(scopes.iter().map(|s| s.segment.clone()));
    parts.push(name.to_string());
    parts.join(".")
}

fn declared_modifiers(node: Node, source: &[u8]) -> Vec<String> {
    let mut cursor = node.walk();
    let Some(modifiers) = node
        .children(&mut cursor)
        .find(|c| c.kind() == "modifiers")
    else {
        return vec![];
    };
    let mut out = Vec::new();
    let mut inner = modifiers.walk();
    for m in modifiers.children(&mut inner) {
        let text = node_text(m, source);
        if matches!(
            text,
            "public" | "private" | "protected" | "static" | "final" | "abstract" | "synchronized"
        ) {
            out.push(text.to_string());
        }
    }
    out
}

fn visibility(modifiers: &[String]) -> &'static str {
    if modifiers.iter().any(|m| m == "public") {
        "public"
    } else if modifiers.iter().any(|m| m == "private") {
        "private"
    } else if modifiers.iter().any(|m| m == "protected") {
        "protected"
    } else {
        "package"
    }
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
        "package_declaration" => {
            let mut cursor = node.walk();
            if let Some(name) = node
                .named_children(&mut cursor)
                .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
            {
                ctx.package = node_text(name, ctx.source).to_string();
            };
        }
        "import_declaration" => {
            let mut cursor = node.walk();
            if let Some(name) = node
                .named_children(&mut cursor)
                .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
            {
                ctx.out.relationships.push(Relationship::new(
                    ctx.module_id.clone(),
                    node_text(name, ctx.source).to_string(),
                    RelKind::Imports,
                ));
            };
        }
        "class_declaration" | "record_declaration" => {
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
                let qname = qualify(&ctx.package, scopes, &name);
                let id = format!("{}:method:{}", ctx.path, qname);
                let modifiers = declared_modifiers(node, ctx.source);
                let mut metadata = meta(&[("visibility", json!(visibility(&modifiers)))]);
                if !ctx.package.is_empty() {
                    metadata.insert("package".to_string(), json!(ctx.package.clone()));
                }
                if let Some(params) = field_text(node, "parameters", ctx.source) {
                    metadata.insert("parameters".to_string(), json!(params));
                }
                if let Some(ret) = field_text(node, "type", ctx.source) {
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
        "field_declaration" => {
            let modifiers = declared_modifiers(node, ctx.source);
            let is_constant = modifiers.iter().any(|m| m == "static")
                && modifiers.iter().any(|m| m == "final");
            let mut cursor = node.walk();
            for declarator in node
                .named_children(&mut cursor)
                .filter(|c| c.kind() == "variable_declarator")
            {
                if let Some(name) = field_text(declarator, "name", ctx.source) {
                    let qname = qualify(&ctx.package, scopes, &name);
                    let kind = if is_constant {
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
                        metadata: meta(&[("visibility", json!(visibility(&modifiers)))]),
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
        "method_invocation" => {
            if let Some(from) = caller {
                if let Some(name) = field_text(node, "name", ctx.source) {
                    ctx.out.relationships.push(
                        Relationship::new(
                            from.to_string(),
                            format!("{}:function:{}", ctx.path, name),
                            RelKind::Calls,
                        )
                        .with_metadata("callType", json!("method")),
                    );
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
    let qname = qualify(&ctx.package, scopes, &name);
    let id = format!("{}:{}:{}", ctx.path, kind.as_str(), qname);
    let modifiers = declared_modifiers(node, ctx.source);
    let mut metadata = meta(&[("visibility", json!(visibility(&modifiers)))]);
    if !ctx.package.is_empty() {
        metadata.insert("package".to_string(), json!(ctx.package.clone()));
    }
    metadata.insert(
        "isAbstract".to_string(),
        json!(modifiers.iter().any(|m| m == "abstract")),
    );
    ctx.out.entities.push(Entity {
        id: id.clone(),
        name: name.clone(),
        kind,
        file_path: ctx.path.to_string(),
        location: location_of(node),
        modifiers,
        metadata,
    });

    if let Some(superclass) = node.child_by_field_name("superclass") {
        let mut cursor = superclass.walk();
        for base in superclass.named_children(&mut cursor) {
            ctx.out.relationships.push(Relationship::new(
                id.clone(),
                node_text(base, ctx.source).to_string(),
                RelKind::Inherits,
            ));
        }
    }
    if let Some(interfaces) = node.child_by_field_name("interfaces") {
        for base in collect_type_names(interfaces) {
            ctx.out.relationships.push(Relationship::new(
                id.clone(),
                node_text(base, ctx.source).to_string(),
                RelKind::Implements,
            ));
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

fn collect_type_names(node: Node) -> Vec<Node> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "type_list" => {
                let mut inner = child.walk();
                out.extend(child.named_children(&mut inner));
            }
            _ => out.push(child),
        }
    }
    out
}
