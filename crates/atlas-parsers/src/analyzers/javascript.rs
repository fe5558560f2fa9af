//! JavaScript / TypeScript analyzer.
//!
//! Qualified names nest through classes and namespaces with `.`; ids follow
//! `"<path>:<kind>:<qualifiedName>"`. TypeScript adds interfaces, type
//! aliases, and enums on top of the JavaScript walk.

use serde_json::json;
use tree_sitter::{Node, Tree};

use atlas_core::types::{Entity, EntityKind, RelKind, Relationship};

use super::{field_text, location_of, meta, node_text, AnalyzerOutput, WalkGuard};

struct Ctx<'a> {
    path: &'a str,
    source: &'a [u8],
    out: AnalyzerOutput,
}

/// Container stack entry: a class or namespace the walk is inside.
struct Scope {
    segment: String,
    entity_id: String,
}

pub fn analyze(
    tree: &Tree,
    path: &str,
    source: &str,
    is_ts: bool,
    guard: &mut WalkGuard,
) -> AnalyzerOutput {
    let mut ctx = Ctx {
        path,
        source: source.as_bytes(),
        out: AnalyzerOutput::default(),
    };
    let mut scopes = Vec::new();
    walk(
        tree.root_node(),
        0,
        &mut scopes,
        None,
        false,
        is_ts,
        &mut ctx,
        guard,
    );
    ctx.out
}

fn qualified(scopes: &[Scope], name: &str) -> String {
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

/// The from-side id used for import edges; JS/TS files do not materialize a
/// module entity, so this id stays referentially loose.
fn module_id(path: &str) -> String {
    let stem = std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    format!("{path}:module:{stem}")
}

#[allow(clippy::too_many_arguments)]
fn walk(
    node: Node,
    depth: usize,
    scopes: &mut Vec<Scope>,
    caller: Option<&str>,
    exported: bool,
    is_ts: bool,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    if !guard.check(depth) {
        return;
    }

    match node.kind() {
        "export_statement" => {
            if let Some(decl) = node.child_by_field_name("declaration") {
                walk(decl, depth + 1, scopes, caller, true, is_ts, ctx, guard);
            } else {
                walk_children(node, depth, scopes, caller, exported, is_ts, ctx, guard);
            }
        }
        "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let id = push_callable(node, &name, EntityKind::Function, scopes, exported, ctx);
                if let Some(body) = node.child_by_field_name("body") {
                    walk(body, depth + 1, scopes, Some(&id), false, is_ts, ctx, guard);
                }
            }
        }
        "class_declaration" | "abstract_class_declaration" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = qualified(scopes, &name);
                let id = Entity::make_id(ctx.path, EntityKind::Class, &qname);
                let mut modifiers = Vec::new();
                if exported {
                    modifiers.push("exported".to_string());
                }
                if node.kind() == "abstract_class_declaration" {
                    modifiers.push("abstract".to_string());
                }
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name,
                    kind: EntityKind::Class,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers,
                    metadata: meta(&[]),
                });
                emit_heritage(node, &id, ctx);
                if let Some(body) = node.child_by_field_name("body") {
                    scopes.push(Scope {
                        segment: qname.rsplit('.').next().unwrap_or(&qname).to_string(),
                        entity_id: id,
                    });
                    walk(body, depth + 1, scopes, caller, false, is_ts, ctx, guard);
                    scopes.pop();
                }
            }
        }
        "method_definition" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let id = push_callable(node, &name, EntityKind::Method, scopes, false, ctx);
                if let Some(owner) = scopes.last() {
                    ctx.out.relationships.push(
                        Relationship::new(id.clone(), owner.entity_id.clone(), RelKind::MemberOf)
                            .with_metadata("memberType", json!("method")),
                    );
                }
                if let Some(body) = node.child_by_field_name("body") {
                    walk(body, depth + 1, scopes, Some(&id), false, is_ts, ctx, guard);
                }
            }
        }
        "field_definition" | "public_field_definition" => {
            // JS names the field "property"; TS names it "name".
            let declared = field_text(node, "property", ctx.source)
                .or_else(|| field_text(node, "name", ctx.source));
            if let Some(name) = declared {
                let qname = qualified(scopes, &name);
                let id = Entity::make_id(ctx.path, EntityKind::Property, &qname);
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name,
                    kind: EntityKind::Property,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: keyword_modifiers(node, ctx.source),
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
        "interface_declaration" if is_ts => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = qualified(scopes, &name);
                let id = Entity::make_id(ctx.path, EntityKind::Interface, &qname);
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name,
                    kind: EntityKind::Interface,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: if exported {
                        vec!["exported".to_string()]
                    } else {
                        vec![]
                    },
                    metadata: meta(&[]),
                });
                emit_heritage(node, &id, ctx);
            }
        }
        "type_alias_declaration" if is_ts => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = qualified(scopes, &name);
                ctx.out.entities.push(Entity {
                    id: Entity::make_id(ctx.path, EntityKind::Typedef, &qname),
                    name,
                    kind: EntityKind::Typedef,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: if exported {
                        vec!["exported".to_string()]
                    } else {
                        vec![]
                    },
                    metadata: meta(&[]),
                });
            }
        }
        "enum_declaration" if is_ts => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = qualified(scopes, &name);
                ctx.out.entities.push(Entity {
                    id: Entity::make_id(ctx.path, EntityKind::Enum, &qname),
                    name,
                    kind: EntityKind::Enum,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: vec![],
                    metadata: meta(&[]),
                });
            }
        }
        "internal_module" if is_ts => {
            // namespace X { ... }
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = qualified(scopes, &name);
                let id = Entity::make_id(ctx.path, EntityKind::Module, &qname);
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name: name.clone(),
                    kind: EntityKind::Module,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: vec![],
                    metadata: meta(&[]),
                });
                if let Some(body) = node.child_by_field_name("body") {
                    scopes.push(Scope {
                        segment: name,
                        entity_id: id,
                    });
                    walk(body, depth + 1, scopes, caller, false, is_ts, ctx, guard);
                    scopes.pop();
                }
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            if scopes.is_empty() && caller.is_none() {
                let is_const = node
                    .child(0)
                    .map(|c| node_text(c, ctx.source) == "const")
                    .unwrap_or(false);
                declare_top_level(node, is_const, exported, depth, is_ts, ctx, guard, scopes);
            } else {
                walk_children(node, depth, scopes, caller, false, is_ts, ctx, guard);
            }
        }
        "import_statement" => {
            if let Some(source_node) = node.child_by_field_name("source") {
                let raw = node_text(source_node, ctx.source)
                    .trim_matches('"')
                    .trim_matches('\'')
                    .to_string();
                let mut rel = Relationship::new(module_id(ctx.path), raw, RelKind::Imports);
                if let Some(alias) = import_alias(node, ctx.source) {
                    rel = rel.with_metadata("importAlias", json!(alias));
                }
                ctx.out.relationships.push(rel);
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
            walk_children(node, depth, scopes, caller, false, is_ts, ctx, guard);
        }
        _ => walk_children(node, depth, scopes, caller, exported, is_ts, ctx, guard),
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_children(
    node: Node,
    depth: usize,
    scopes: &mut Vec<Scope>,
    caller: Option<&str>,
    exported: bool,
    is_ts: bool,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        walk(child, depth + 1, scopes, caller, exported, is_ts, ctx, guard);
    }
}

/// Emit a function or method entity and return its id.
fn push_callable(
    node: Node,
    name: &str,
    kind: EntityKind,
    scopes: &[Scope],
    exported: bool,
    ctx: &mut Ctx,
) -> String {
    let qname = qualified(scopes, name);
    let id = Entity::make_id(ctx.path, kind, &qname);
    let mut modifiers = keyword_modifiers(node, ctx.source);
    if exported {
        modifiers.push("exported".to_string());
    }
    let mut metadata = meta(&[]);
    if let Some(params) = field_text(node, "parameters", ctx.source) {
        metadata.insert("parameters".to_string(), json!(params));
    }
    if let Some(ret) = field_text(node, "return_type", ctx.source) {
        metadata.insert(
            "returnType".to_string(),
            json!(ret.trim_start_matches(':').trim()),
        );
    }
    ctx.out.entities.push(Entity {
        id: id.clone(),
        name: name.to_string(),
        kind,
        file_path: ctx.path.to_string(),
        location: location_of(node),
        modifiers,
        metadata,
    });
    id
}

/// Keyword tokens that double as modifiers on a declaration node.
fn keyword_modifiers(node: Node, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if !child.is_named() {
            let text = node_text(child, source);
            if matches!(text, "static" | "async" | "get" | "set" | "readonly" | "abstract") {
                out.push(text.to_string());
            }
        }
    }
    out
}

/// `extends` / `implements` clauses on classes and interfaces.
fn emit_heritage(node: Node, from_id: &str, ctx: &mut Ctx) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_heritage" => {
                let mut inner = child.walk();
                for clause in child.children(&mut inner) {
                    match clause.kind() {
                        "extends_clause" => {
                            for base in named_children(clause) {
                                ctx.out.relationships.push(Relationship::new(
                                    from_id.to_string(),
                                    node_text(base, ctx.source).to_string(),
                                    RelKind::Inherits,
                                ));
                            }
                        }
                        "implements_clause" => {
                            for base in named_children(clause) {
                                ctx.out.relationships.push(Relationship::new(
                                    from_id.to_string(),
                                    node_text(base, ctx.source).to_string(),
                                    RelKind::Implements,
                                ));
                            }
                        }
                        _ => {
                            // Plain JS: `class A extends B` keeps the expression itself.
                            if clause.is_named() {
                                ctx.out.relationships.push(Relationship::new(
                                    from_id.to_string(),
                                    node_text(clause, ctx.source).to_string(),
                                    RelKind::Inherits,
                                ));
                            }
                        }
                    }
                }
            }
            "extends_type_clause" | "extends_clause" => {
                for base in named_children(child) {
                    ctx.out.relationships.push(Relationship::new(
                        from_id.to_string(),
                        node_text(base, ctx.source).to_string(),
                        RelKind::Inherits,
                    ));
                }
            }
            _ => {}
        }
    }
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Top-level `const`/`let`/`var` declarators. Function-valued bindings are
/// functions; the rest are constants or variables.
#[allow(clippy::too_many_arguments)]
fn declare_top_level(
    node: Node,
    is_const: bool,
    exported: bool,
    depth: usize,
    is_ts: bool,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
    scopes: &mut Vec<Scope>,
) {
    for declarator in named_children(node) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name) = field_text(declarator, "name", ctx.source) else {
            continue;
        };
        let value = declarator.child_by_field_name("value");
        let is_function = value
            .map(|v| {
                matches!(
                    v.kind(),
                    "arrow_function" | "function_expression" | "function" | "generator_function"
                )
            })
            .unwrap_or(false);

        if is_function {
            let id = push_callable(declarator, &name, EntityKind::Function, scopes, exported, ctx);
            if let Some(body) = value.and_then(|v| v.child_by_field_name("body")) {
                walk(body, depth + 1, scopes, Some(&id), false, is_ts, ctx, guard);
            }
        } else {
            let kind = if is_const {
                EntityKind::Constant
            } else {
                EntityKind::Variable
            };
            let mut modifiers = Vec::new();
            if is_const {
                modifiers.push("const".to_string());
            }
            if exported {
                modifiers.push("exported".to_string());
            }
            let mut metadata = meta(&[]);
            if let Some(v) = value {
                let text = node_text(v, ctx.source);
                if text.len() <= 64 {
                    metadata.insert("value".to_string(), json!(text));
                }
            }
            ctx.out.entities.push(Entity {
                id: Entity::make_id(ctx.path, kind, &name),
                name,
                kind,
                file_path: ctx.path.to_string(),
                location: location_of(declarator),
                modifiers,
                metadata,
            });
        }
    }
}

fn import_alias(node: Node, source: &[u8]) -> Option<String> {
    // import X from "..." / import * as X from "..."
    for child in named_children(node) {
        if child.kind() == "import_clause" {
            for inner in named_children(child) {
                match inner.kind() {
                    "identifier" => return Some(node_text(inner, source).to_string()),
                    "namespace_import" => {
                        return named_children(inner)
                            .first()
                            .map(|n| node_text(*n, source).to_string())
                    }
                    _ => {}
                }
            }
        }
    }
    None
}

fn callee_name(call: Node, source: &[u8]) -> Option<(String, &'static str)> {
    let function = call.child_by_field_name("function")?;
    match function.kind() {
        "identifier" => Some((node_text(function, source).to_string(), "function")),
        "member_expression" => function
            .child_by_field_name("property")
            .map(|p| (node_text(p, source).to_string(), "method")),
        _ => None,
    }
}
