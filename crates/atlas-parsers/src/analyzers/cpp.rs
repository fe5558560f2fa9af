//! C++ analyzer.
//!
//! Ids are namespace-qualified with `::`; methods use
//! `"<path>:method:<Class>::<method>"`. Friend declarations produce
//! `friend_of` edges. On top of the shared guards, C++ enforces complexity
//! caps: template depth ≤ 10 and a composite score ≤ 100
//! (template_depth×10 + nested_classes×5 + inheritance_depth×3 +
//! operator_count×2). Beyond either cap the walk stops with partial results.

use serde_json::json;
use tree_sitter::{Node, Tree};

use atlas_core::types::{Entity, EntityKind, RelKind, Relationship};

use super::{field_text, location_of, meta, node_text, AnalyzerOutput, WalkGuard};

pub const MAX_TEMPLATE_DEPTH: u32 = 10;
pub const MAX_COMPLEXITY_SCORE: u32 = 100;

#[derive(Default)]
struct Complexity {
    template_depth: u32,
    max_template_depth: u32,
    nested_classes: u32,
    inheritance_depth: u32,
    operator_count: u32,
}

impl Complexity {
    fn score(&self) -> u32 {
        self.max_template_depth * 10
            + self.nested_classes * 5
            + self.inheritance_depth * 3
            + self.operator_count * 2
    }

    fn check(&self, guard: &mut WalkGuard) -> bool {
        if self.template_depth > MAX_TEMPLATE_DEPTH {
            guard.trip(format!(
                "template depth {} exceeds limit {MAX_TEMPLATE_DEPTH}",
                self.template_depth
            ));
            return false;
        }
        let score = self.score();
        if score > MAX_COMPLEXITY_SCORE {
            guard.trip(format!(
                "complexity score {score} exceeds limit {MAX_COMPLEXITY_SCORE}"
            ));
            return false;
        }
        true
    }
}

enum ScopeKind {
    Namespace,
    Class,
}

struct Scope {
    segment: String,
    kind: ScopeKind,
    entity_id: String,
}

struct Ctx<'a> {
    path: &'a str,
    source: &'a [u8],
    module_id: String,
    complexity: Complexity,
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
        complexity: Complexity::default(),
        out: AnalyzerOutput::default(),
    };
    let mut scopes = Vec::new();
    walk(tree.root_node(), 0, &mut scopes, None, false, &mut ctx, guard);
    ctx.out
}

fn qualify(scopes: &[Scope], name: &str) -> String {
    if scopes.is_empty() {
        name.to_string()
    } else {
        let prefix: Vec<&str> = scopes.iter().map(|s| s.segment.as_str()).collect();
        format!("{}::{}", prefix.join("::"), name)
    }
}

fn enclosing_class<'a>(scopes: &'a [Scope]) -> Option<&'a Scope> {
    scopes
        .iter()
        .rev()
        .find(|s| matches!(s.kind, ScopeKind::Class))
}

#[allow(clippy::too_many_arguments)]
fn walk(
    node: Node,
    depth: usize,
    scopes: &mut Vec<Scope>,
    caller: Option<&str>,
    templated: bool,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    if !guard.check(depth) || !ctx.complexity.check(guard) {
        return;
    }

    match node.kind() {
        "namespace_definition" => {
            let name = field_text(node, "name", ctx.source).unwrap_or_default();
            if name.is_empty() {
                // Anonymous namespaces contribute scope but no entity.
                if let Some(body) = node.child_by_field_name("body") {
                    walk(body, depth + 1, scopes, caller, false, ctx, guard);
                }
                return;
            }
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
            if let Some(body) = node.child_by_field_name("body") {
                scopes.push(Scope {
                    segment: name,
                    kind: ScopeKind::Namespace,
                    entity_id: id,
                });
                walk(body, depth + 1, scopes, caller, false, ctx, guard);
                scopes.pop();
            }
        }
        "template_declaration" => {
            ctx.complexity.template_depth += 1;
            ctx.complexity.max_template_depth = ctx
                .complexity
                .max_template_depth
                .max(ctx.complexity.template_depth);
            if ctx.complexity.check(guard) {
                walk_children(node, depth, scopes, caller, true, ctx, guard);
            }
            ctx.complexity.template_depth -= 1;
        }
        "class_specifier" | "struct_specifier" => {
            if node.child_by_field_name("body").is_none() {
                walk_children(node, depth, scopes, caller, false, ctx, guard);
                return;
            }
            let Some(name) = field_text(node, "name", ctx.source) else {
                walk_children(node, depth, scopes, caller, false, ctx, guard);
                return;
            };
            if enclosing_class(scopes).is_some() {
                ctx.complexity.nested_classes += 1;
            }
            let qname = qualify(scopes, &name);
            let id = format!("{}:class:{}", ctx.path, qname);
            let mut modifiers = Vec::new();
            if templated {
                modifiers.push("template".to_string());
            }
            ctx.out.entities.push(Entity {
                id: id.clone(),
                name: name.clone(),
                kind: EntityKind::Class,
                file_path: ctx.path.to_string(),
                location: location_of(node),
                modifiers,
                metadata: meta(&[]),
            });
            emit_bases(node, &id, ctx);
            if let Some(body) = node.child_by_field_name("body") {
                scopes.push(Scope {
                    segment: name,
                    kind: ScopeKind::Class,
                    entity_id: id,
                });
                walk(body, depth + 1, scopes, caller, false, ctx, guard);
                scopes.pop();
            }
        }
        "enum_specifier" => {
            if node.child_by_field_name("body").is_some() {
                if let Some(name) = field_text(node, "name", ctx.source) {
                    let qname = qualify(scopes, &name);
                    let mut modifiers = Vec::new();
                    if is_scoped_enum(node, ctx.source) {
                        modifiers.push("scoped".to_string());
                    }
                    ctx.out.entities.push(Entity {
                        id: format!("{}:enum:{}", ctx.path, qname),
                        name,
                        kind: EntityKind::Enum,
                        file_path: ctx.path.to_string(),
                        location: location_of(node),
                        modifiers,
                        metadata: meta(&[]),
                    });
                }
            }
        }
        "function_definition" => {
            emit_function(node, depth, scopes, templated, ctx, guard);
        }
        "field_declaration" => {
            // Method declarations inside a class body (no definition).
            if enclosing_class(scopes).is_some() {
                if let Some(declarator) = find_function_declarator(node) {
                    emit_method_from_declarator(node, declarator, scopes, templated, ctx);
                }
            }
            walk_children(node, depth, scopes, caller, false, ctx, guard);
        }
        "friend_declaration" => {
            if let Some(owner) = enclosing_class(scopes) {
                let text = node_text(node, ctx.source)
                    .trim_start_matches("friend")
                    .trim()
                    .trim_start_matches("class")
                    .trim()
                    .trim_end_matches(';')
                    .to_string();
                if !text.is_empty() {
                    ctx.out.relationships.push(Relationship::new(
                        owner.entity_id.clone(),
                        text,
                        RelKind::FriendOf,
                    ));
                }
            }
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
                    let callee = match function.kind() {
                        "identifier" => Some(node_text(function, ctx.source).to_string()),
                        "qualified_identifier" => {
                            Some(node_text(function, ctx.source).to_string())
                        }
                        "field_expression" => function
                            .child_by_field_name("field")
                            .map(|f| node_text(f, ctx.source).to_string()),
                        _ => None,
                    };
                    if let Some(callee) = callee {
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
            walk_children(node, depth, scopes, caller, false, ctx, guard);
        }
        _ => walk_children(node, depth, scopes, caller, templated, ctx, guard),
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_children(
    node: Node,
    depth: usize,
    scopes: &mut Vec<Scope>,
    caller: Option<&str>,
    templated: bool,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        walk(child, depth + 1, scopes, caller, templated, ctx, guard);
    }
}

fn is_scoped_enum(node: Node, source: &[u8]) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor)
        .any(|c| !c.is_named() && matches!(node_text(c, source), "class" | "struct"));
    result
}

fn emit_bases(class_node: Node, class_id: &str, ctx: &mut Ctx) {
    let mut cursor = class_node.walk();
    let Some(bases) = class_node
        .children(&mut cursor)
        .find(|c| c.kind() == "base_class_clause")
    else {
        return;
    };
    let mut count = 0u32;
    let mut inner = bases.walk();
    for base in bases.named_children(&mut inner) {
        if base.kind() == "access_specifier" {
            continue;
        }
        count += 1;
        ctx.out.relationships.push(Relationship::new(
            class_id.to_string(),
            node_text(base, ctx.source).to_string(),
            RelKind::Inherits,
        ));
    }
    ctx.complexity.inheritance_depth = ctx.complexity.inheritance_depth.max(count);
}

fn find_function_declarator(node: Node) -> Option<Node> {
    let declarator = node.child_by_field_name("declarator")?;
    match declarator.kind() {
        "function_declarator" => Some(declarator),
        "pointer_declarator" | "reference_declarator" => {
            let mut cursor = declarator.walk();
            let result = declarator
                .named_children(&mut cursor)
                .find(|c| c.kind() == "function_declarator");
            result
        }
        _ => None,
    }
}

fn declared_name(declarator: Node, source: &[u8]) -> Option<String> {
    let inner = declarator.child_by_field_name("declarator")?;
    Some(node_text(inner, source).to_string())
}

fn trailing_modifiers(node: Node, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let text = node_text(node, source);
    for keyword in ["virtual", "override", "final", "static", "const"] {
        // Whole-word scan over the declaration text.
        if text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .any(|w| w == keyword)
        {
            out.push(keyword.to_string());
        }
    }
    out
}

fn emit_function(
    node: Node,
    depth: usize,
    scopes: &mut Vec<Scope>,
    templated: bool,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    let Some(declarator) = find_function_declarator(node) else {
        return;
    };
    let Some(raw_name) = declared_name(declarator, ctx.source) else {
        return;
    };
    if raw_name.starts_with("operator") {
        ctx.complexity.operator_count += 1;
    }

    // `Widget::draw` outside the class body still belongs to Widget.
    let (owner_class, method_name) = match raw_name.rsplit_once("::") {
        Some((class_part, method)) => (Some(class_part.to_string()), method.to_string()),
        None => (None, raw_name.clone()),
    };

    let (kind, qname, owner_id) = if let Some(owner) = enclosing_class(scopes) {
        (
            EntityKind::Method,
            qualify(scopes, &method_name),
            Some(owner.entity_id.clone()),
        )
    } else if let Some(class_part) = owner_class {
        let class_qname = qualify(scopes, &class_part);
        (
            EntityKind::Method,
            format!("{class_qname}::{method_name}"),
            Some(format!("{}:class:{}", ctx.path, class_qname)),
        )
    } else {
        (EntityKind::Function, qualify(scopes, &method_name), None)
    };

    let id = format!("{}:{}:{}", ctx.path, kind.as_str(), qname);
    let mut modifiers = trailing_modifiers(declarator, ctx.source);
    if templated {
        modifiers.push("template".to_string());
    }
    let mut metadata = meta(&[]);
    if let Some(params) = declarator
        .child_by_field_name("parameters")
        .map(|p| node_text(p, ctx.source).to_string())
    {
        metadata.insert("parameters".to_string(), json!(params));
    }
    if let Some(ret) = field_text(node, "type", ctx.source) {
        metadata.insert("returnType".to_string(), json!(ret));
    }
    ctx.out.entities.push(Entity {
        id: id.clone(),
        name: method_name,
        kind,
        file_path: ctx.path.to_string(),
        location: location_of(node),
        modifiers,
        metadata,
    });
    if let Some(owner) = owner_id {
        ctx.out.relationships.push(
            Relationship::new(id.clone(), owner, RelKind::MemberOf)
                .with_metadata("memberType", json!("method")),
        );
    }
    if let Some(body) = node.child_by_field_name("body") {
        walk(body, depth + 1, scopes, Some(&id), false, ctx, guard);
    }
}

fn emit_method_from_declarator(
    node: Node,
    declarator: Node,
    scopes: &[Scope],
    templated: bool,
    ctx: &mut Ctx,
) {
    let Some(name) = declared_name(declarator, ctx.source) else {
        return;
    };
    if name.starts_with("operator") {
        ctx.complexity.operator_count += 1;
    }
    let qname = qualify(scopes, &name);
    let id = format!("{}:method:{}", ctx.path, qname);
    let mut modifiers = trailing_modifiers(node, ctx.source);
    if templated {
        modifiers.push("template".to_string());
    }
    let mut metadata = meta(&[]);
    if let Some(params) = declarator
        .child_by_field_name("parameters")
        .map(|p| node_text(p, ctx.source).to_string())
    {
        metadata.insert("parameters".to_string(), json!(params));
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
    if let Some(owner) = enclosing_class(scopes) {
        ctx.out.relationships.push(
            Relationship::new(id, owner.entity_id.clone(), RelKind::MemberOf)
                .with_metadata("memberType", json!("method")),
        );
    }
}
