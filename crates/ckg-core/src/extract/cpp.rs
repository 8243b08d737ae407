//! C++: the C shapes plus classes, namespaces, methods and templates.

use tree_sitter::Node;

use super::c::{
    aggregate_name, declarator_name, enumerators, field_names, function_parameters,
    is_function_declarator,
};
use super::{base_type_name, field_text, named_children, EntitySink, Extractor, Scope, Step};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct CppExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Class,
    EntityKind::Struct,
    EntityKind::Enum,
    EntityKind::Union,
    EntityKind::Namespace,
    EntityKind::GenericType,
];

impl Extractor for CppExtractor {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        match node.kind() {
            "namespace_definition" => {
                let Some(name) = node.child_by_field_name("name").map(|n| sink.text(n)) else {
                    // Anonymous namespace: members stay in the enclosing scope.
                    return Step::Descend(scope.clone());
                };
                let r = sink.emit(node, name, Payload::namespace(), scope);
                Step::Descend(scope.enter(sink, r))
            }
            "function_definition" => visit_function(node, sink, scope),
            "class_specifier" | "struct_specifier" | "union_specifier" | "enum_specifier" => {
                let Some(body) = node.child_by_field_name("body") else {
                    return Step::Descend(scope.clone());
                };
                let Some(name) = aggregate_name(node, sink) else {
                    sink.skip(node, "anonymous aggregate");
                    return Step::Descend(scope.clone());
                };
                let name = base_type_name(name);
                let payload = match node.kind() {
                    "class_specifier" => Payload::Class {
                        fields: field_names(body, sink),
                        methods: declared_methods(body, sink),
                    },
                    "struct_specifier" => Payload::Struct {
                        fields: field_names(body, sink),
                        methods: declared_methods(body, sink),
                    },
                    "union_specifier" => Payload::Union {
                        fields: field_names(body, sink),
                    },
                    _ => Payload::enumeration(enumerators(body, sink)),
                };
                let r = sink.emit(node, &name, payload, scope);
                Step::Descend(scope.enter(sink, r))
            }
            "template_declaration" => {
                if let Some(params) = node.child_by_field_name("parameters") {
                    match template_subject(node, sink) {
                        Some(name) => {
                            let payload = Payload::generic(
                                Some(sink.text(params).to_string()),
                                template_constraints(node, sink),
                            );
                            sink.emit(params, &name, payload, scope);
                        }
                        None => sink.skip(node, "template without named declaration"),
                    }
                }
                Step::Descend(scope.clone())
            }
            _ => Step::Descend(scope.clone()),
        }
    }
}

fn visit_function(node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
    let Some(declarator) = node.child_by_field_name("declarator") else {
        sink.skip(node, "function without declarator");
        return Step::Descend(scope.clone());
    };
    let Some(full_name) = declarator_name(declarator, sink) else {
        sink.skip(node, "function without name");
        return Step::Descend(scope.clone());
    };
    let payload = Payload::function(
        function_parameters(declarator, sink),
        field_text(node, "type", sink),
    );

    // `void Widget::draw() { ... }` belongs to Widget wherever it is declared.
    let (name, function_scope) = match full_name.rsplit_once("::") {
        Some((qualifier, name)) if !qualifier.is_empty() => {
            let owner = base_type_name(qualifier);
            let found = sink.find_type(&owner);
            (name, scope.enter_named_type(found, owner))
        }
        _ => (full_name, scope.clone()),
    };
    let r = sink.emit(node, name, payload, &function_scope);
    Step::Descend(function_scope.enter(sink, r))
}

/// Member functions declared (not defined) inside a class body.
fn declared_methods(body: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut methods: Vec<String> = Vec::new();
    for decl in named_children(body) {
        if !matches!(decl.kind(), "field_declaration" | "declaration") {
            continue;
        }
        let Some(declarator) = decl.child_by_field_name("declarator") else {
            continue;
        };
        if !is_function_declarator(declarator) {
            continue;
        }
        if let Some(name) = declarator_name(declarator, sink) {
            if !methods.iter().any(|m| m == name) {
                methods.push(name.to_string());
            }
        }
    }
    methods
}

/// Name of the class or function a template declares.
fn template_subject(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    for child in named_children(node) {
        match child.kind() {
            "class_specifier" | "struct_specifier" | "union_specifier" => {
                return child
                    .child_by_field_name("name")
                    .map(|n| base_type_name(sink.text(n)));
            }
            "function_definition" | "declaration" | "field_declaration" => {
                let declarator = child.child_by_field_name("declarator")?;
                let name = declarator_name(declarator, sink)?;
                return Some(name.rsplit("::").next().unwrap_or(name).to_string());
            }
            "alias_declaration" | "concept_definition" => {
                return child
                    .child_by_field_name("name")
                    .map(|n| sink.text(n).to_string());
            }
            _ => {}
        }
    }
    None
}

fn template_constraints(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    named_children(node)
        .into_iter()
        .find(|c| c.kind() == "requires_clause")
        .map(|c| sink.text(c).to_string())
}
