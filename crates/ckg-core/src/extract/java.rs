//! Java: classes, interfaces, enums, records, methods and type parameters.

use tree_sitter::Node;

use super::{
    body_of, child_of_kind, field_text, member_names, name_of, named_children, EntitySink,
    Extractor, Scope, Step,
};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct JavaExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Class,
    EntityKind::Interface,
    EntityKind::Enum,
    EntityKind::GenericType,
];

impl Extractor for JavaExtractor {
    fn language(&self) -> Language {
        Language::Java
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        let payload = match node.kind() {
            "class_declaration" => {
                Payload::class(body_of(node).map(|b| fields(b, sink)).unwrap_or_default())
            }
            "record_declaration" => {
                let mut components = node
                    .child_by_field_name("parameters")
                    .map(|p| member_names(p, &["formal_parameter"], sink))
                    .unwrap_or_default();
                if let Some(body) = body_of(node) {
                    components.extend(fields(body, sink));
                }
                Payload::class(components)
            }
            "interface_declaration" | "annotation_type_declaration" => {
                let body = body_of(node);
                Payload::interface(
                    body.map(|b| {
                        member_names(b, &["method_declaration", "annotation_type_element_declaration"], sink)
                    })
                    .unwrap_or_default(),
                    body.map(|b| constants(b, sink)).unwrap_or_default(),
                )
            }
            "enum_declaration" => Payload::enumeration(
                body_of(node)
                    .map(|b| member_names(b, &["enum_constant"], sink))
                    .unwrap_or_default(),
            ),
            "method_declaration" => Payload::function(
                field_text(node, "parameters", sink),
                field_text(node, "type", sink),
            ),
            "constructor_declaration" | "compact_constructor_declaration" => {
                Payload::function(field_text(node, "parameters", sink), None)
            }
            _ => return Step::Descend(scope.clone()),
        };

        let Some(name) = name_of(node, sink) else {
            sink.skip(node, "declaration without name");
            return Step::Descend(scope.clone());
        };
        let r = sink.emit(node, name, payload, scope);

        if let Some(params) = node.child_by_field_name("type_parameters") {
            let bounds: Vec<&str> = named_children(params)
                .into_iter()
                .filter_map(|p| child_of_kind(p, "type_bound"))
                .map(|b| sink.text(b))
                .collect();
            let payload = Payload::generic(
                Some(sink.text(params).to_string()),
                (!bounds.is_empty()).then(|| bounds.join(", ")),
            );
            sink.emit(params, name, payload, scope);
        }

        Step::Descend(scope.enter(sink, r))
    }
}

fn fields(body: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    declared_variables(body, "field_declaration", sink)
}

fn constants(body: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    declared_variables(body, "constant_declaration", sink)
}

fn declared_variables(body: Node<'_>, kind: &str, sink: &EntitySink<'_>) -> Vec<String> {
    let mut names = Vec::new();
    for decl in named_children(body) {
        if decl.kind() != kind {
            continue;
        }
        let mut cursor = decl.walk();
        for declarator in decl.children_by_field_name("declarator", &mut cursor) {
            if let Some(name) = name_of(declarator, sink) {
                names.push(name.to_string());
            }
        }
    }
    names
}
