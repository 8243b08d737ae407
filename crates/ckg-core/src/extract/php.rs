//! PHP: namespaces, classes, interfaces, traits, enums and functions.

use tree_sitter::Node;

use super::{
    child_of_kind, field_text, member_names, name_of, named_children, EntitySink, Extractor,
    Scope, Step,
};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct PhpExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Class,
    EntityKind::Interface,
    EntityKind::Trait,
    EntityKind::Enum,
    EntityKind::Namespace,
];

impl Extractor for PhpExtractor {
    fn language(&self) -> Language {
        Language::Php
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        let payload = match node.kind() {
            // `namespace App;` without braces scopes the rest of the file.
            "program" => {
                let namespace = named_children(node)
                    .into_iter()
                    .find(|n| n.kind() == "namespace_definition" && n.child_by_field_name("body").is_none())
                    .and_then(|ns| {
                        let name = field_text(ns, "name", sink)?;
                        sink.emit(ns, &name, Payload::namespace(), scope)
                    });
                return match namespace {
                    Some(r) => Step::Descend(scope.enter_module(r)),
                    None => Step::Descend(scope.clone()),
                };
            }
            "namespace_definition" if node.child_by_field_name("body").is_none() => {
                return Step::Prune
            }
            "namespace_definition" => Payload::namespace(),
            "function_definition" | "method_declaration" => Payload::function(
                field_text(node, "parameters", sink),
                field_text(node, "return_type", sink)
                    .map(|t| t.trim_start_matches(':').trim().to_string()),
            ),
            "class_declaration" => Payload::class(
                node.child_by_field_name("body")
                    .map(|b| properties(b, sink))
                    .unwrap_or_default(),
            ),
            "interface_declaration" => Payload::interface(
                node.child_by_field_name("body")
                    .map(|b| member_names(b, &["method_declaration"], sink))
                    .unwrap_or_default(),
                Vec::new(),
            ),
            "trait_declaration" => Payload::Trait {
                methods: Vec::new(),
                associated_types: Vec::new(),
            },
            "enum_declaration" => Payload::enumeration(
                node.child_by_field_name("body")
                    .map(|b| member_names(b, &["enum_case"], sink))
                    .unwrap_or_default(),
            ),
            _ => return Step::Descend(scope.clone()),
        };

        let Some(name) = field_text(node, "name", sink) else {
            sink.skip(node, "declaration without name");
            return Step::Descend(scope.clone());
        };
        let r = sink.emit(node, &name, payload, scope);
        Step::Descend(scope.enter(sink, r))
    }
}

/// Declared property names, without the `$` sigil.
fn properties(body: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut names = Vec::new();
    for decl in named_children(body) {
        if decl.kind() != "property_declaration" {
            continue;
        }
        for element in named_children(decl) {
            if element.kind() != "property_element" {
                continue;
            }
            let variable = child_of_kind(element, "variable_name")
                .map(|v| sink.text(v))
                .or_else(|| name_of(element, sink));
            if let Some(variable) = variable {
                names.push(variable.trim_start_matches('$').to_string());
            }
        }
    }
    names
}
