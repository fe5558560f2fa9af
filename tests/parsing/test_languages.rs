// One representative extraction per supported language, driven through the
// public parse path.

use atlas_core::types::{EntityKind, RelKind};
use atlas_parsers::incremental::{IncrementalParser, ParseOptions, ParseResult};

fn parse(path: &str, source: &str) -> ParseResult {
    IncrementalParser::new().parse_file(path, Some(source), &ParseOptions::default())
}

#[test]
fn javascript_functions_and_calls() {
    let result = parse("a.js", "function foo(){ bar(); }\nfunction bar(){}");
    assert!(result.errors.is_empty());
    let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"a.js:function:foo"));
    assert!(ids.contains(&"a.js:function:bar"));
    assert!(result.relationships.iter().any(|r| {
        r.from == "a.js:function:foo" && r.to == "a.js:function:bar" && r.kind == RelKind::Calls
    }));
}

#[test]
fn typescript_interface_and_class() {
    let result = parse(
        "s.ts",
        "export interface Store { get(k: string): string }\nclass MemStore implements Store {\n  get(k: string): string { return k; }\n}",
    );
    let store = result.entities.iter().find(|e| e.name == "Store").unwrap();
    assert_eq!(store.kind, EntityKind::Interface);
    assert!(result
        .relationships
        .iter()
        .any(|r| r.kind == RelKind::Implements && r.to == "Store"));
}

#[test]
fn python_module_class_method() {
    let result = parse(
        "svc/user.py",
        "import os\n\nclass User:\n    def save(self):\n        pass\n",
    );
    let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"svc/user.py:module:user"));
    assert!(ids.contains(&"svc/user.py:class:User"));
    assert!(ids.contains(&"svc/user.py:function:User.save"));
    assert!(result
        .relationships
        .iter()
        .any(|r| r.kind == RelKind::Imports && r.to == "os"));
}

#[test]
fn c_functions_and_includes() {
    let result = parse(
        "m.c",
        "#include <stdio.h>\nstatic void log_it(void) {}\nint main(void) { log_it(); return 0; }",
    );
    assert!(result
        .entities
        .iter()
        .any(|e| e.id == "m.c:function:main"));
    assert!(result
        .relationships
        .iter()
        .any(|r| r.kind == RelKind::Imports && r.to == "stdio.h"));
}

#[test]
fn cpp_class_with_method_and_friend() {
    let result = parse(
        "w.cpp",
        "namespace ui {\nclass Widget {\n  friend class Inspector;\npublic:\n  void draw() {}\n};\n}",
    );
    let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"w.cpp:class:ui::Widget"));
    assert!(ids.contains(&"w.cpp:method:ui::Widget::draw"));
    assert!(result
        .relationships
        .iter()
        .any(|r| r.kind == RelKind::FriendOf && r.to == "Inspector"));
}

#[test]
fn rust_impl_methods() {
    let result = parse(
        "src/eng.rs",
        "pub struct Engine;\nimpl Engine {\n    pub fn run(&self) {}\n}",
    );
    let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"src/eng.rs:class:Engine"));
    assert!(ids.contains(&"src/eng.rs:method:Engine::run"));
}

#[test]
fn go_package_type_method() {
    let result = parse(
        "p/user.go",
        "package p\ntype User struct{}\nfunc (u *User) Save(){}",
    );
    let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"p/user.go:package:p"));
    assert!(ids.contains(&"p/user.go:type:User"));
    assert!(ids.contains(&"p/user.go:method:User:Save"));
    assert!(result.relationships.iter().any(|r| {
        r.from == "p/user.go:method:User:Save"
            && r.to == "p/user.go:type:User"
            && r.kind == RelKind::MemberOf
    }));
}

#[test]
fn java_qualified_ids() {
    let result = parse(
        "User.java",
        "package com.acme;\npublic class User {\n  public void save() {}\n}",
    );
    let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"User.java:class:com.acme.User"));
    assert!(ids.contains(&"User.java:method:com.acme.User.save"));
}

#[test]
fn csharp_namespace_and_bases() {
    let result = parse(
        "Svc.cs",
        "namespace Acme {\n  public class Svc : Base, IRunnable {\n    public void Run() {}\n  }\n}",
    );
    let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"Svc.cs:class:Acme.Svc"));
    assert!(result
        .relationships
        .iter()
        .any(|r| r.kind == RelKind::Inherits && r.to == "Base"));
    assert!(result
        .relationships
        .iter()
        .any(|r| r.kind == RelKind::Implements && r.to == "IRunnable"));
}

#[test]
fn vba_module_and_procedures() {
    let result = parse(
        "billing.bas",
        "Attribute VB_Name = \"Billing\"\nPublic Sub Charge()\nEnd Sub\n",
    );
    let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"billing.bas:module:Billing"));
    assert!(ids.contains(&"billing.bas:function:Billing.Charge"));
}

#[test]
fn markdown_document_and_headings() {
    let result = parse("doc.md", "# A\n## B\ntext\n");
    let ids: Vec<&str> = result.entities.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"doc.md:document"));
    assert!(ids.contains(&"doc.md:heading:a"));
    assert!(ids.contains(&"doc.md:heading:b"));
    assert!(result.relationships.iter().any(|r| {
        r.from == "doc.md:document" && r.to == "doc.md:heading:a" && r.kind == RelKind::Contains
    }));
}

#[test]
fn deep_nesting_trips_recursion_guard_with_partial_results() {
    let mut source = String::from("function outer(){}\n");
    source.push_str(&"if (x) { ".repeat(60));
    source.push_str(&"}".repeat(60));

    let result = parse("deep.js", &source);
    // The shallow declaration survives; the guard reports the abort.
    assert!(result.entities.iter().any(|e| e.name == "outer"));
    assert!(result
        .errors
        .iter()
        .any(|d| d.message.contains("circuit breaker")));
}

#[test]
fn locations_are_one_based_lines() {
    let result = parse("a.js", "\nfunction second(){}\n");
    let second = result.entities.iter().find(|e| e.name == "second").unwrap();
    assert_eq!(second.location.start.line, 2);
    assert_eq!(second.location.start.column, 0);
}
