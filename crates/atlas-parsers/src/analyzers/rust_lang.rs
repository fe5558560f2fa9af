//! Rust analyzer.
//!
//! Ids are path-qualified with `::` through module segments; methods defined
//! in `impl` blocks belong to the impl type, trait impls included.

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
    let mut mods = Vec::new();
    walk(tree.root_node(), 0, &mut mods, None, &mut ctx, guard);
    ctx.out
}

fn qualify(mods: &[String], name: &str) -> String {
    if mods.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", mods.join("::"), name)
    }
}

fn visibility_modifiers(node: Node, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "visibility_modifier" => out.push(node_text(child, source).to_string()),
            "function_modifiers" => {
                let mut inner = child.walk();
                for m in child.children(&mut inner) {
                    let text = node_text(m, source);
                    if matches!(text, "async" | "unsafe" | "const" | "extern") {
                        out.push(text.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn walk(
    node: Node,
    depth: usize,
    mods: &mut Vec<String>,
    caller: Option<&str>,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    if !guard.check(depth) {
        return;
    }

    match node.kind() {
        "mod_item" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = qualify(mods, &name);
                ctx.out.entities.push(Entity {
                    id: Entity::make_id(ctx.path, EntityKind::Module, &qname),
                    name: name.clone(),
                    kind: EntityKind::Module,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: visibility_modifiers(node, ctx.source),
                    metadata: meta(&[]),
                });
                if let Some(body) = node.child_by_field_name("body") {
                    mods.push(name);
                    walk(body, depth + 1, mods, caller, ctx, guard);
                    mods.pop();
                }
            }
        }
        "function_item" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = qualify(mods, &name);
                let id = Entity::make_id(ctx.path, EntityKind::Function, &qname);
                let mut metadata = meta(&[]);
                if let Some(params) = field_text(node, "parameters", ctx.source) {
                    metadata.insert("parameters".to_string(), json!(params));
                }
                if let Some(ret) = field_text(node, "return_type", ctx.source) {
                    metadata.insert("returnType".to_string(), json!(ret));
                }
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name,
                    kind: EntityKind::Function,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: visibility_modifiers(node, ctx.source),
                    metadata,
                });
                if let Some(body) = node.child_by_field_name("body") {
                    walk(body, depth + 1, mods, Some(&id), ctx, guard);
                }
            }
        }
        "struct_item" | "union_item" => {
            emit_type(node, EntityKind::Class, mods, ctx);
        }
        "enum_item" => {
            emit_type(node, EntityKind::Enum, mods, ctx);
        }
        "trait_item" => {
            if let Some(id) = emit_type(node, EntityKind::Interface, mods, ctx) {
                // Default methods declared on the trait itself.
                if let Some(body) = node.child_by_field_name("body") {
                    let trait_name = field_text(node, "name", ctx.source).unwrap_or_default();
                    emit_impl_methods(body, &trait_name, &id, depth, mods, ctx, guard);
                }
            }
        }
        "type_item" => {
            emit_type(node, EntityKind::Typedef, mods, ctx);
        }
        "const_item" | "static_item" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let kind = if node.kind() == "const_item" {
                    EntityKind::Constant
                } else {
                    EntityKind::Variable
                };
                let qname = qualify(mods, &name);
                let mut modifiers = visibility_modifiers(node, ctx.source);
                if node.kind() == "const_item" {
                    modifiers.push("const".to_string());
                }
                ctx.out.entities.push(Entity {
                    id: Entity::make_id(ctx.path, kind, &qname),
                    name,
                    kind,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers,
                    metadata: meta(&[]),
                });
            }
        }
        "impl_item" => {
            let type_name = node
                .child_by_field_name("type")
                .map(|t| base_type_name(t, ctx.source))
                .unwrap_or_default();
            let type_id = Entity::make_id(ctx.path, EntityKind::Class, &qualify(mods, &type_name));
            if let Some(trait_node) = node.child_by_field_name("trait") {
                ctx.out.relationships.push(Relationship::new(
                    type_id.clone(),
                    node_text(trait_node, ctx.source).to_string(),
                    RelKind::Implements,
                ));
            }
            if let Some(body) = node.child_by_field_name("body") {
                emit_impl_methods(body, &type_name, &type_id, depth, mods, ctx, guard);
            }
        }
        "use_declaration" => {
            if let Some(argument) = node.child_by_field_name("argument") {
                ctx.out.relationships.push(Relationship::new(
                    ctx.module_id.clone(),
                    node_text(argument, ctx.source).to_string(),
                    RelKind::Imports,
                ));
            }
        }
        "call_expression" => {
            if let Some(from) = caller {
                if let Some((callee, call_type)) = callee_name(node, ctx.source) {
                    ctx.out.relationships.push(
                        Relationship::new(
                            from.to_string(),
                            format!("{}:function:{}", ctx.path, callee),
                            RelKind::Calls,
                        )
                        .with_metadata("callType", json!(call_type)),
                    );
                }
            }
            walk_children(node, depth, mods, caller, ctx, guard);
        }
        _ => walk_children(node, depth, mods, caller, ctx, guard),
    }
}

fn walk_children(
    node: Node,
    depth: usize,
    mods: &mut Vec<String>,
    caller: Option<&str>,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        walk(child, depth + 1, mods, caller, ctx, guard);
    }
}

fn emit_type(
    node: Node,
    kind: EntityKind,
    mods: &[String],
    ctx: &mut Ctx,
) -> Option<String> {
    let name = field_text(node, "name", ctx.source)?;
    let qname = qualify(mods, &name);
    let id = Entity::make_id(ctx.path, kind, &qname);
    ctx.out.entities.push(Entity {
        id: id.clone(),
        name,
        kind,
        file_path: ctx.path.to_string(),
        location: location_of(node),
        modifiers: visibility_modifiers(node, ctx.source),
        metadata: meta(&[]),
    });
    Some(id)
}

/// Methods inside an impl or trait body, attributed to the owning type.
fn emit_impl_methods(
    body: Node,
    owner_name: &str,
    owner_id: &str,
    depth: usize,
    mods: &mut Vec<String>,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    let mut cursor = body.walk();
    let functions: Vec<Node> = body
        .named_children(&mut cursor)
        .filter(|c| c.kind() == "function_item")
        .collect();
    for function in functions {
        let Some(name) = field_text(function, "name", ctx.source) else {
            continue;
        };
        let qname = qualify(mods, &format!("{owner_name}::{name}"));
        let id = Entity::make_id(ctx.path, EntityKind::Method, &qname);
        let mut metadata = meta(&[]);
        if let Some(params) = field_text(function, "parameters", ctx.source) {
            metadata.insert("parameters".to_string(), json!(params));
        }
        if let Some(ret) = field_text(function, "return_type", ctx.source) {
            metadata.insert("returnType".to_string(), json!(ret));
        }
        ctx.out.entities.push(Entity {
            id: id.clone(),
            name,
            kind: EntityKind::Method,
            file_path: ctx.path.to_string(),
            location: location_of(function),
            modifiers: visibility_modifiers(function, ctx.source),
            metadata,
        });
        ctx.out.relationships.push(
            Relationship::new(id.clone(), owner_id.to_string(), RelKind::MemberOf)
                .with_metadata("memberType", json!("method")),
        );
        if let Some(fn_body) = function.child_by_field_name("body") {
            walk(fn_body, depth + 1, mods, Some(&id), ctx, guard);
        }
    }
}

/// `Vec<T>` → `Vec`; `&mut Foo` → `Foo`.
fn base_type_name(type_node: Node, source: &[u8]) -> String {
    match type_node.kind() {
        "generic_type" => type_node
            .child_by_field_name("type")
            .map(|t| node_text(t, source).to_string())
            .unwrap_or_else(|| node_text(type_node, source).to_string()),
        "reference_type" => type_node
            .child_by_field_name("type")
            .map(|t| base_type_name(t, source))
            .unwrap_or_default(),
        _ => node_text(type_node, source).to_string(),
    }
}

fn callee_name(call: Node, source: &[u8]) -> Option<(String, &'static str)> {
    let function = call.child_by_field_name("function")?;
    match function.kind() {
        "identifier" => Some((node_text(function, source).to_string(), "function")),
        "scoped_identifier" => Some((node_text(function, source).to_string(), "scoped")),
        "field_expression" => function
            .child_by_field_name("field")
            .map(|f| (node_text(f, source).to_string(), "method")),
        _ => None,
    }
}
