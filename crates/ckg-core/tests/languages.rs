//! Per-language coverage: each language fills only the tables it recognizes.

mod common;

use ckg_core::{EntityKind, ExtractorRegistry, FunctionScope, Language, RunRequest};
use common::{builder_with, fixture, open, populated, run};

/// One fixture per language, with the kinds it must populate.
const FIXTURES: &[(&str, &str, Language, &[EntityKind])] = &[
    (
        "app.py",
        "class Greeter:\n    def greet(self):\n        return 'hi'\n",
        Language::Python,
        &[EntityKind::Class, EntityKind::Function],
    ),
    (
        "lib.rs",
        "pub struct Point { x: i32 }\n\npub trait Shape { fn area(&self) -> f64; }\n\nfn origin() -> Point { Point { x: 0 } }\n",
        Language::Rust,
        &[EntityKind::Struct, EntityKind::Trait, EntityKind::Function],
    ),
    (
        "main.go",
        "package main\n\ntype Server struct {\n    Port int\n}\n\nfunc (s *Server) Start() {}\n",
        Language::Go,
        &[EntityKind::Struct, EntityKind::Function, EntityKind::Module],
    ),
    (
        "Calc.java",
        "public class Calc {\n    int add(int a, int b) { return a + b; }\n}\n",
        Language::Java,
        &[EntityKind::Class, EntityKind::Function],
    ),
    (
        "util.js",
        "function add(a, b) { return a + b; }\n",
        Language::JavaScript,
        &[EntityKind::Function],
    ),
    (
        "shape.ts",
        "interface Shape { area(): number; }\n\nfunction scale(factor: number): number { return factor * 2; }\n",
        Language::TypeScript,
        &[EntityKind::Interface, EntityKind::Function],
    ),
    (
        "math.c",
        "struct vec { int x; int y; };\n\nint dot(struct vec a, struct vec b) { return a.x * b.x + a.y * b.y; }\n",
        Language::C,
        &[EntityKind::Struct, EntityKind::Function],
    ),
    (
        "greeter.rb",
        "class Greeter\n  def greet\n    'hi'\n  end\nend\n",
        Language::Ruby,
        &[EntityKind::Class, EntityKind::Function],
    ),
    (
        "circle.dart",
        "class Circle {\n  double circumference() {\n    return 6.28;\n  }\n}\n",
        Language::Dart,
        &[EntityKind::Class, EntityKind::Function],
    ),
    (
        "shape.gleam",
        "pub type Shape {\n  Square\n  Round\n}\n\npub fn unit() -> Int {\n  1\n}\n",
        Language::Gleam,
        &[EntityKind::Enum, EntityKind::Function],
    ),
];

#[test]
fn test_each_language_fills_only_recognized_tables() {
    let registry = ExtractorRegistry::default();

    for (path, source, language, expected) in FIXTURES {
        let temp = fixture(&[(*path, *source)]);
        let summary = run(temp.path());
        assert_eq!(summary.files_failed, 0, "{} failed: {:?}", path, summary.failures);

        let db = open(&summary);
        let counts = populated(&db);
        for kind in *expected {
            assert!(
                counts.contains_key(kind),
                "{} produced no {} rows: {:?}",
                language,
                kind,
                counts
            );
        }

        let recognized = registry.get(*language).unwrap().recognized_kinds();
        for kind in counts.keys() {
            assert!(
                recognized.contains(kind),
                "{} wrote to the {} table",
                language,
                kind.table_name()
            );
        }
    }
}

#[test]
fn test_mixed_tree_in_one_database() {
    let files: Vec<(&str, &str)> = FIXTURES.iter().map(|(p, s, _, _)| (*p, *s)).collect();
    let temp = fixture(&files);

    let summary = run(temp.path());
    assert_eq!(summary.files_discovered, FIXTURES.len());
    assert_eq!(summary.files_succeeded, FIXTURES.len());

    let db = open(&summary);
    let greeters = db.query_class("Greeter").unwrap();
    let languages: Vec<Language> = greeters.iter().map(|c| c.language).collect();
    assert_eq!(languages, vec![Language::Python, Language::Ruby]);

    let methods = db.query_function("greet", FunctionScope::Method).unwrap();
    assert_eq!(methods.len(), 2);
    for method in &methods {
        assert_eq!(method.member_of_name.as_deref(), Some("Greeter"));
    }

    let start = db.query_function("Start", FunctionScope::Method).unwrap();
    assert_eq!(start.len(), 1);
    assert_eq!(db.member_of(&start[0]).unwrap().unwrap().name, "Server");

    let circumference = db
        .query_function("circumference", FunctionScope::Method)
        .unwrap();
    assert_eq!(circumference.len(), 1);
    assert_eq!(circumference[0].language, Language::Dart);
    assert_eq!(
        db.member_of(&circumference[0]).unwrap().unwrap().name,
        "Circle"
    );
}

#[test]
fn test_source_text_can_be_omitted() {
    let (path, source, _, _) = FIXTURES[0];
    let temp = fixture(&[(path, source)]);
    let summary = builder_with(|config| config.extract.include_source_text = false)
        .run(&RunRequest::new(temp.path()))
        .unwrap();

    let db = open(&summary);
    let functions = db.all(EntityKind::Function).unwrap();
    assert!(!functions.is_empty());
    for function in functions {
        assert_eq!(function.body, None);
    }
}
