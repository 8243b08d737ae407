//! Gleam: functions, custom types, type aliases and imports.

use tree_sitter::Node;

use super::{
    child_of_kind, field_text, first_child_of_kinds, named_children, EntitySink, Extractor, Scope,
    Step,
};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct GleamExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Enum,
    EntityKind::TypeAlias,
    EntityKind::Module,
];

impl Extractor for GleamExtractor {
    fn language(&self) -> Language {
        Language::Gleam
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        match node.kind() {
            "function" | "function_definition" | "external_function" => {
                let Some(name) = node.child_by_field_name("name").map(|n| sink.text(n)) else {
                    sink.skip(node, "function without name");
                    return Step::Descend(scope.clone());
                };
                let payload = Payload::function(
                    field_text(node, "parameters", sink),
                    field_text(node, "return_type", sink),
                );
                let r = sink.emit(node, name, payload, scope);
                Step::Descend(scope.enter(sink, r))
            }
            "anonymous_function" => {
                let name = format!("anonymous_fn_line_{}", node.start_position().row + 1);
                let payload = Payload::function(
                    field_text(node, "parameters", sink),
                    field_text(node, "return_type", sink),
                );
                let r = sink.emit(node, &name, payload, scope);
                Step::Descend(scope.enter(sink, r))
            }
            // Custom types are sum types: their constructors are the variants.
            "type_definition" | "custom_type" => {
                let Some(name) = type_name(node, sink) else {
                    sink.skip(node, "type without name");
                    return Step::Prune;
                };
                let variants = first_child_of_kinds(node, &["data_constructors", "constructors"])
                    .map(|list| constructor_names(list, sink))
                    .unwrap_or_default();
                sink.emit(node, &name, Payload::enumeration(variants), scope);
                Step::Prune
            }
            "type_alias" => {
                let Some(name) = type_name(node, sink) else {
                    sink.skip(node, "type alias without name");
                    return Step::Prune;
                };
                sink.emit(node, &name, Payload::type_alias(aliased_type(node, sink)), scope);
                Step::Prune
            }
            "import" => {
                let module = node
                    .child_by_field_name("module")
                    .or_else(|| child_of_kind(node, "module"));
                match module {
                    Some(module) => {
                        let name = sink.text(module).to_string();
                        sink.emit(node, &name, Payload::module(), scope);
                    }
                    None => sink.skip(node, "import without module"),
                }
                Step::Prune
            }
            _ => Step::Descend(scope.clone()),
        }
    }
}

/// Name of a custom type or alias, without its type parameters.
fn type_name(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    let head = child_of_kind(node, "type_name").unwrap_or(node);
    let name = head
        .child_by_field_name("name")
        .or_else(|| first_child_of_kinds(head, &["type_identifier", "constructor_name"]))?;
    let name = sink.text(name);
    let name = name.split('(').next().unwrap_or(name).trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn constructor_names(list: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    named_children(list)
        .into_iter()
        .filter(|c| matches!(c.kind(), "data_constructor" | "constructor"))
        .filter_map(|c| {
            c.child_by_field_name("name")
                .or_else(|| child_of_kind(c, "constructor_name"))
        })
        .map(|n| sink.text(n).to_string())
        .collect()
}

/// The type after `=` in `type Name = Target`.
fn aliased_type(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    if let Some(target) = field_text(node, "aliased_type", sink) {
        return Some(target);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    let eq = children.iter().position(|child| child.kind() == "=")?;
    children[eq + 1..]
        .iter()
        .find(|child| child.is_named())
        .map(|ty| sink.text(*ty).trim().to_string())
}
