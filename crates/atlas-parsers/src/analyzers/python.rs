//! Python analyzer.
//!
//! Ids are module-qualified: `"<path>:module:<stem>"`,
//! `"<path>:class:<Dotted>"`, and `"<path>:function:<Dotted>"` — defs inside
//! classes keep the function id segment with a dotted qualifier and carry the
//! method kind. Decorators produce first-class `decorates` edges.

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
    let module_id = format!("{path}:module:{stem}");

    let mut ctx = Ctx {
        path,
        source: source.as_bytes(),
        module_id: module_id.clone(),
        out: AnalyzerOutput::default(),
    };

    let root = tree.root_node();
    ctx.out.entities.push(Entity {
        id: module_id,
        name: stem,
        kind: EntityKind::Module,
        file_path: path.to_string(),
        location: location_of(root),
        modifiers: vec![],
        metadata: meta(&[]),
    });

    let mut classes = Vec::new();
    walk(root, 0, &mut classes, None, &[], &mut ctx, guard);
    ctx.out
}

/// A class the walk is currently inside.
struct ClassScope {
    segment: String,
    entity_id: String,
}

fn dotted(classes: &[ClassScope], name: &str) -> String {
    if classes.is_empty() {
        name.to_string()
    } else {
        let mut q: String = classes
            .iter()
            .map(|c| c.segment.as_str())
            .collect::<Vec<_>>()
            .join(".");
        q.push('.');
        q.push_str(name);
        q
    }
}

fn walk(
    node: Node,
    depth: usize,
    classes: &mut Vec<ClassScope>,
    caller: Option<&str>,
    decorators: &[String],
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    if !guard.check(depth) {
        return;
    }

    match node.kind() {
        "decorated_definition" => {
            let mut names = Vec::new();
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "decorator" {
                    let name = decorator_name(child, ctx.source);
                    if !name.is_empty() {
                        names.push(name);
                    }
                }
            }
            if let Some(definition) = node.child_by_field_name("definition") {
                walk(definition, depth + 1, classes, caller, &names, ctx, guard);
            }
        }
        "function_definition" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = dotted(classes, &name);
                let id = format!("{}:function:{}", ctx.path, qname);
                let kind = if classes.is_empty() {
                    EntityKind::Function
                } else {
                    EntityKind::Method
                };

                let mut modifiers = Vec::new();
                if is_async(node, ctx.source) {
                    modifiers.push("async".to_string());
                }
                if decorators.iter().any(|d| d == "staticmethod") {
                    modifiers.push("static".to_string());
                }
                if decorators.iter().any(|d| d == "classmethod") {
                    modifiers.push("classmethod".to_string());
                }

                let mut metadata = meta(&[]);
                if let Some(params) = field_text(node, "parameters", ctx.source) {
                    metadata.insert("parameters".to_string(), json!(params));
                }
                if let Some(ret) = field_text(node, "return_type", ctx.source) {
                    metadata.insert("returnType".to_string(), json!(ret));
                }
                if !decorators.is_empty() {
                    metadata.insert("decorators".to_string(), json!(decorators));
                }

                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name,
                    kind,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers,
                    metadata,
                });

                if let Some(owner) = classes.last() {
                    ctx.out.relationships.push(
                        Relationship::new(id.clone(), owner.entity_id.clone(), RelKind::MemberOf)
                            .with_metadata("memberType", json!("method")),
                    );
                }
                for decorator in decorators {
                    ctx.out.relationships.push(Relationship::new(
                        format!("{}:function:{}", ctx.path, decorator),
                        id.clone(),
                        RelKind::Decorates,
                    ));
                }

                if let Some(body) = node.child_by_field_name("body") {
                    walk(body, depth + 1, classes, Some(&id), &[], ctx, guard);
                }
            }
        }
        "class_definition" => {
            if let Some(name) = field_text(node, "name", ctx.source) {
                let qname = dotted(classes, &name);
                let id = format!("{}:class:{}", ctx.path, qname);

                let mut metadata = meta(&[]);
                if !decorators.is_empty() {
                    metadata.insert("decorators".to_string(), json!(decorators));
                }
                ctx.out.entities.push(Entity {
                    id: id.clone(),
                    name: name.clone(),
                    kind: EntityKind::Class,
                    file_path: ctx.path.to_string(),
                    location: location_of(node),
                    modifiers: vec![],
                    metadata,
                });

                if let Some(superclasses) = node.child_by_field_name("superclasses") {
                    let mut cursor = superclasses.walk();
                    for base in superclasses.named_children(&mut cursor) {
                        // Skip metaclass= and other keyword arguments.
                        if base.kind() == "keyword_argument" {
                            continue;
                        }
                        ctx.out.relationships.push(Relationship::new(
                            id.clone(),
                            node_text(base, ctx.source).to_string(),
                            RelKind::Inherits,
                        ));
                    }
                }
                for decorator in decorators {
                    ctx.out.relationships.push(Relationship::new(
                        format!("{}:function:{}", ctx.path, decorator),
                        id.clone(),
                        RelKind::Decorates,
                    ));
                }

                if let Some(body) = node.child_by_field_name("body") {
                    classes.push(ClassScope {
                        segment: name,
                        entity_id: id,
                    });
                    walk(body, depth + 1, classes, caller, &[], ctx, guard);
                    classes.pop();
                }
            }
        }
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                match child.kind() {
                    "dotted_name" => {
                        ctx.out.relationships.push(Relationship::new(
                            ctx.module_id.clone(),
                            node_text(child, ctx.source).to_string(),
                            RelKind::Imports,
                        ));
                    }
                    "aliased_import" => {
                        let target = field_text(child, "name", ctx.source).unwrap_or_default();
                        let mut rel =
                            Relationship::new(ctx.module_id.clone(), target, RelKind::Imports);
                        if let Some(alias) = field_text(child, "alias", ctx.source) {
                            rel = rel.with_metadata("importAlias", json!(alias));
                        }
                        ctx.out.relationships.push(rel);
                    }
                    _ => {}
                }
            }
        }
        "import_from_statement" => {
            if let Some(module) = field_text(node, "module_name", ctx.source) {
                ctx.out.relationships.push(Relationship::new(
                    ctx.module_id.clone(),
                    module,
                    RelKind::Imports,
                ));
            }
        }
        "call" => {
            if let Some(from) = caller {
                if let Some(callee) = callee_name(node, ctx.source) {
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
            walk_children(node, depth, classes, caller, ctx, guard);
        }
        "assignment" => {
            // Module-level bindings only; locals are noise.
            if classes.is_empty() && caller.is_none() {
                if let Some(left) = node.child_by_field_name("left") {
                    if left.kind() == "identifier" {
                        let name = node_text(left, ctx.source).to_string();
                        let kind = if name.chars().all(|c| !c.is_lowercase()) {
                            EntityKind::Constant
                        } else {
                            EntityKind::Variable
                        };
                        let mut metadata = meta(&[]);
                        if let Some(right) = node.child_by_field_name("right") {
                            let text = node_text(right, ctx.source);
                            if text.len() <= 64 {
                                metadata.insert("value".to_string(), json!(text));
                            }
                        }
                        ctx.out.entities.push(Entity {
                            id: format!("{}:{}:{}", ctx.path, kind.as_str(), name),
                            name,
                            kind,
                            file_path: ctx.path.to_string(),
                            location: location_of(node),
                            modifiers: vec![],
                            metadata,
                        });
                    }
                }
            }
            walk_children(node, depth, classes, caller, ctx, guard);
        }
        _ => walk_children(node, depth, classes, caller, ctx, guard),
    }
}

fn walk_children(
    node: Node,
    depth: usize,
    classes: &mut Vec<ClassScope>,
    caller: Option<&str>,
    ctx: &mut Ctx,
    guard: &mut WalkGuard,
) {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        walk(child, depth + 1, classes, caller, &[], ctx, guard);
    }
}

/// `@pkg.dec(args)` → `pkg.dec`.
fn decorator_name(decorator: Node, source: &[u8]) -> String {
    let mut cursor = decorator.walk();
    for child in decorator.named_children(&mut cursor) {
        return match child.kind() {
            "call" => child
                .child_by_field_name("function")
                .map(|f| node_text(f, source).to_string())
                .unwrap_or_default(),
            _ => node_text(child, source).to_string(),
        };
    }
    String::new()
}

fn is_async(node: Node, source: &[u8]) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor)
        .any(|c| !c.is_named() && node_text(c, source) == "async");
    result
}

fn callee_name(call: Node, source: &[u8]) -> Option<String> {
    let function = call.child_by_field_name("function")?;
    match function.kind() {
        "identifier" => Some(node_text(function, source).to_string()),
        "attribute" => function
            .child_by_field_name("attribute")
            .map(|a| node_text(a, source).to_string()),
        _ => None,
    }
}
