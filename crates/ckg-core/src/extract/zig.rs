//! Zig: functions, and container types bound to `const` declarations.

use tree_sitter::Node;

use super::{
    field_text, first_child_of_kinds, name_of, nested_member_names, EntitySink, Extractor, Scope,
    Step,
};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct ZigExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Struct,
    EntityKind::Enum,
    EntityKind::Union,
];

const CONTAINERS: &[&str] = &["struct_declaration", "enum_declaration", "union_declaration"];

impl Extractor for ZigExtractor {
    fn language(&self) -> Language {
        Language::Zig
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        match node.kind() {
            "function_declaration" => {
                let Some(name) = name_of(node, sink) else {
                    sink.skip(node, "function without name");
                    return Step::Descend(scope.clone());
                };
                let payload = Payload::function(
                    field_text(node, "parameters", sink),
                    field_text(node, "type", sink),
                );
                let r = sink.emit(node, name, payload, scope);
                Step::Descend(scope.enter(sink, r))
            }
            // `const Point = struct { ... };`
            "variable_declaration" => {
                let Some(container) = first_child_of_kinds(node, CONTAINERS) else {
                    return Step::Descend(scope.clone());
                };
                let Some(name) = name_of(node, sink) else {
                    sink.skip(node, "container without name");
                    return Step::Descend(scope.clone());
                };
                let members = nested_member_names(container, &["container_field"], sink);
                let payload = match container.kind() {
                    "struct_declaration" => Payload::structure(members),
                    "union_declaration" => Payload::Union { fields: members },
                    _ => Payload::enumeration(members),
                };
                let r = sink.emit(node, name, payload, scope);
                Step::Descend(scope.enter(sink, r))
            }
            _ => Step::Descend(scope.clone()),
        }
    }
}
