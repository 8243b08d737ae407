//! Swift: type declarations share one node kind and are told apart by keyword.

use tree_sitter::Node;

use super::{
    base_type_name, child_of_kind, children_of_kind, field_text, first_child_of_kinds, has_token,
    member_names, named_children, EntitySink, Extractor, Scope, Step,
};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct SwiftExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Class,
    EntityKind::Struct,
    EntityKind::Enum,
    EntityKind::Interface,
    EntityKind::Extension,
    EntityKind::TypeAlias,
    EntityKind::GenericType,
    EntityKind::Module,
];

impl Extractor for SwiftExtractor {
    fn language(&self) -> Language {
        Language::Swift
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        let (name, payload) = match node.kind() {
            "import_declaration" => {
                if let Some(module) = child_of_kind(node, "identifier") {
                    let name = sink.text(module);
                    sink.emit(node, name, Payload::module(), scope);
                }
                return Step::Prune;
            }
            "class_declaration" => {
                let Some(name) = field_text(node, "name", sink) else {
                    sink.skip(node, "type without name");
                    return Step::Descend(scope.clone());
                };
                let body = node.child_by_field_name("body");
                let payload = match declaration_kind(node, sink) {
                    "extension" => Payload::Extension {
                        extended_type: Some(name.clone()),
                        methods: Vec::new(),
                    },
                    "struct" => Payload::structure(body.map(|b| properties(b, sink)).unwrap_or_default()),
                    "enum" => Payload::enumeration(body.map(|b| enum_cases(b, sink)).unwrap_or_default()),
                    _ => Payload::class(body.map(|b| properties(b, sink)).unwrap_or_default()),
                };
                (base_type_name(&name), payload)
            }
            "protocol_declaration" => {
                let Some(name) = field_text(node, "name", sink) else {
                    sink.skip(node, "protocol without name");
                    return Step::Descend(scope.clone());
                };
                let body = node.child_by_field_name("body");
                let payload = Payload::interface(
                    body.map(|b| member_names(b, &["protocol_function_declaration"], sink))
                        .unwrap_or_default(),
                    body.map(|b| member_names(b, &["protocol_property_declaration"], sink))
                        .unwrap_or_default(),
                );
                (name, payload)
            }
            "function_declaration" => {
                let Some(name) = field_text(node, "name", sink) else {
                    sink.skip(node, "function without name");
                    return Step::Descend(scope.clone());
                };
                let payload = Payload::function(parameters(node, sink), field_text(node, "return_type", sink));
                (name, payload)
            }
            "init_declaration" => ("init".to_string(), Payload::function(parameters(node, sink), None)),
            "deinit_declaration" => ("deinit".to_string(), Payload::function(None, None)),
            "typealias_declaration" => {
                let Some(name) = field_text(node, "name", sink) else {
                    sink.skip(node, "typealias without name");
                    return Step::Prune;
                };
                (name, Payload::type_alias(field_text(node, "value", sink)))
            }
            _ => return Step::Descend(scope.clone()),
        };

        let r = sink.emit(node, &name, payload, scope);
        if let Some(params) = first_child_of_kinds(node, &["type_parameters"]) {
            let constraints = child_of_kind(node, "type_constraints").map(|c| sink.text(c).to_string());
            let generic = Payload::generic(Some(sink.text(params).to_string()), constraints);
            sink.emit(params, &name, generic, scope);
        }
        Step::Descend(scope.enter(sink, r))
    }
}

/// `class`, `struct`, `enum`, `actor` or `extension`.
fn declaration_kind<'s>(node: Node<'_>, sink: &EntitySink<'s>) -> &'s str {
    if let Some(kind) = node.child_by_field_name("declaration_kind") {
        return sink.text(kind);
    }
    ["extension", "struct", "enum", "actor"]
        .into_iter()
        .find(|keyword| has_token(node, keyword))
        .unwrap_or("class")
}

fn parameters(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    let params: Vec<&str> = children_of_kind(node, "parameter")
        .into_iter()
        .map(|p| sink.text(p))
        .collect();
    Some(format!("({})", params.join(", ")))
}

fn properties(body: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    named_children(body)
        .into_iter()
        .filter(|m| m.kind() == "property_declaration")
        .filter_map(|m| m.child_by_field_name("name"))
        .map(|n| sink.text(n).to_string())
        .collect()
}

fn enum_cases(body: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut cases = Vec::new();
    for entry in children_of_kind(body, "enum_entry") {
        let mut cursor = entry.walk();
        cases.extend(
            entry
                .children_by_field_name("name", &mut cursor)
                .map(|n| sink.text(n).to_string()),
        );
    }
    cases
}
