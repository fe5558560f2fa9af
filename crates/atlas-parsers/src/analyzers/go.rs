//! Go analyzer.
//!
//! Ids: `"<path>:package:<pkg>"`, `"<path>:function:<name>"`,
//! `"<path>:method:<RecvType>:<name>"`, `"<path>:type:<Name>"`,
//! `"<path>:const|var:<name>"`. Struct embedding produces `embeds` edges.

use serde_json::json;
use tree_sitter::{Node, Tree};

use atlas_core::types::{Entity, EntityKind, RelKind, Relationship};

use super::{field_text, location_of, meta, node_text, AnalyzerOutput, WalkGuard};

struct Ctx<'a> {
    path: &'a str,
    source: &'a [u8],
    package: String,
    package_id: String,
    out: AnalyzerOutput,
}

pub fn analyze(tree: &Tree, path: &str, source: &str, guard: &mut WalkGuard) -> AnalyzerOutput {
    let mut ctx = Ctx {
        path,
        source: source.as_bytes(),
        package: String::new(),
        package_id: String::new(),
        out: AnalyzerOutput::default(),
    };

    let root = tree.root_node();
    walk(root, 0, None, &mut ctx, guard);
    ctx.out
}

fn exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_uppercase())
}

fn modifiers_for(name: &str) -> Vec<String> {
    if exported(name) {
        vec!["exported".to_string()]
    } else {
        vec![]
    }
}

fn walk(node: Node, depth: usize, caller: Option<&str>, ctx: &mut Ctx, guard: &mut WalkGuard) {
    if !guard.check(depth) {
        return;
    }

    match node.kind() {
        "package_clause" => {
            let mut cursor = node.walk();
            if let Some(name_node) = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "package_identifier")
            {
                let name = node_text(name_node, ctx.source).to_string();
                ctx.package_id = format!("{}:package:{}", ctx.path, name);
                ctx.out.entities.push(Entity {
                    id: ctx.package_id.clone(),
                    name: name.clone(),
                    kind: EntityKind::Module,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: vec![],
                    metadata: meta(&[("package", json!(name))]),
                });
                ctx.package = name;
            };
        }
        "import_declaration" => {
            emit_imports(node, ctx);
        }
        "function_declaration" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let id = format!("{}:function:{}", ctx.path, name);
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name: name.clone(),
                    kind: EntityKind::Function,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: modifiers_for(&name),
                    metadata: signature_metadata(node, ctx),
                });
                if let Some(body) = node.child_by_field_name("body") {
                    walk(body, depth + 1, Some(&id), ctx, guard);
                }
            }
        }
        "method_declaration" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let receiver_type = receiver_type(node, ctx.source).unwrap_or_default();
                let id = format!("{}:method:{}:{}", ctx.path, receiver_type, name);
                let mut metadata = signature_metadata(node, ctx);
                metadata.insert("receiver".to_string(), json!(receiver_type));
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name: name.clone(),
                    kind: EntityKind::Method,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: modifiers_for(&name),
                    metadata,
                });
                if !receiver_type.is_empty() {
                    ctx.out.relationships.push(
                        Relationship::new(
                            id.clone(),
                            format!("{}:type:{}", ctx.path, receiver_type),
                            RelKind::MemberOf,
                        )
                        .with_metadata("memberType", json!("method")),
                    );
                }
                if let Some(body) = node.child_by_field_name("body") {
                    walk(body, depth + 1, Some(&id), ctx, guard);
                }
            }
        }
        "type_declaration" => {
            let mut cursor = node.walk();
            for spec in node.named_children(&mut cursor) {
                if spec.kind() != "type_spec" {
                    continue;
                }
                let Some(name) = field_text(spec, "name", ctx.source) else {
                    continue;
                };
                let type_node = spec.child_by_field_name("type");
                let kind = match type_node.map(|t| t.kind()) {
                    Some("struct_type") => EntityKind::Class,
                    Some("interface_type") => EntityKind::Interface,
                    _ => EntityKind::Typedef,
                };
                let id = format!("{}:type:{}", ctx.path, name);
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name: name.clone(),
                    kind,
                    file_path: ctx.path.to_string(),
                    location: location_of(spec),
                    modifiers: modifiers_for(&name),
                    metadata: meta(&[("package", json!(ctx.package.clone()))]),
                });
                if let Some(struct_node) = type_node.filter(|t| t.kind() == "struct_type") {
                    emit_embeds(struct_node, &id, ctx);
                }
            }
        }
        "const_declaration" | "var_declaration" => {
            let is_const = node.kind() == "const_declaration";
            let mut cursor = node.walk();
            for spec in node.named_children(&mut cursor) {
                if spec.kind() != "const_spec" && spec.kind() != "var_spec" {
                    continue;
                }
                let mut names = spec.walk();
                for name_node in spec
                    .named_children(&mut names)
                    .filter(|c| c.kind() == "identifier")
                {
                    let name = node_text(name_node, ctx.source).to_string();
                    let (segment, kind) = if is_const {
                        ("const", EntityKind::Constant)
                    } else {
                        ("var", EntityKind::Variable)
                    };
                    ctx.out.entities.push(Entity {
                        id: format!("{}:{}:{}", ctx.path, segment, name),
                        name: name.clone(),
                        kind,
                        file_path: ctx.path.to_string(),
                        location: location_of(spec),
                        modifiers: modifiers_for(&name),
                        metadata: meta(&[]),
                    });
                }
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

fn signature_metadata(node: Node, ctx: &Ctx) -> serde_json::Map<String, serde_json::Value> {
    let mut metadata = meta(&[("package", json!(ctx.package.clone()))]);
    if let Some(params) = field_text(node, "parameters", ctx.source) {
        metadata.insert("parameters".to_string(), json!(params));
    }
    if let Some(result) = field_text(node, "result", ctx.source) {
        metadata.insert("returnType".to_string(), json!(result));
    }
    metadata
}

/// `func (u *User) Save()` → `User`.
fn receiver_type(method: Node, source: &[u8]) -> Option<String> {
    let receiver = method.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    let param = receiver
        .named_children(&mut cursor)
        .find(|c| c.kind() == "parameter_declaration")?;
    let type_node = param.child_by_field_name("type")?;
    let text = node_text(type_node, source);
    Some(text.trim_start_matches('*').to_string())
}

fn emit_imports(node: Node, ctx: &mut Ctx) {
    let mut specs = Vec::new();
    collect_import_specs(node, &mut specs);
    for spec in specs {
        let Some(path_node) = spec.child_by_field_name("path") else {
            continue;
        };
        let raw = node_text(path_node, ctx.source).trim_matches('"').to_string();
        let mut rel = Relationship::new(ctx.package_id.clone(), raw, RelKind::Imports);
        if let Some(alias) = field_text(spec, "name", ctx.source) {
            rel = rel.with_metadata("importAlias", json!(alias));
        }
        ctx.out.relationships.push(rel);
    }
}

fn collect_import_specs<'a>(node: Node<'a>, out: &mut Vec<Node<'a>>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_spec" => out.push(child),
            "import_spec_list" => collect_import_specs(child, out),
            _ => {}
        }
    }
}

/// Embedded fields are field declarations without a name.
fn emit_embeds(struct_node: Node, type_id: &str, ctx: &mut Ctx) {
    let Some(field_list) = struct_node
        .named_child(0)
        .filter(|c| c.kind() == "field_declaration_list")
    else {
        return;
    };
    let mut cursor = field_list.walk();
    for field in field_list.named_children(&mut cursor) {
        if field.kind() != "field_declaration" {
            continue;
        }
        if field.child_by_field_name("name").is_some() {
            continue;
        }
        if let Some(type_node) = field.child_by_field_name("type") {
            let embedded = node_text(type_node, ctx.source)
                .trim_start_matches('*')
                .to_string();
            ctx.out.relationships.push(Relationship::new(
                type_id.to_string(),
                embedded,
                RelKind::Embeds,
            ));
        }
    }
}

fn callee_name(call: Node, source: &[u8]) -> Option<(String, &'static str)> {
    let function = call.child_by_field_name("function")?;
    match function.kind() {
        "identifier" => Some((node_text(function, source).to_string(), "function")),
        "selector_expression" => function
            .child_by_field_name("field")
            .map(|f| (node_text(f, source).to_string(), "method")),
        _ => None,
    }
}
