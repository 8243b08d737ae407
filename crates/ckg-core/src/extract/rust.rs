//! Rust: items, with `impl` methods bound to their target type.

use tree_sitter::Node;

use super::{
    child_of_kind, field_text, member_names, name_of, named_children, EntitySink, Extractor, Scope,
    Step,
};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct RustExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Struct,
    EntityKind::Enum,
    EntityKind::Trait,
    EntityKind::Module,
    EntityKind::Union,
    EntityKind::TypeAlias,
];

impl Extractor for RustExtractor {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        let payload = match node.kind() {
            "function_item" => Payload::function(
                field_text(node, "parameters", sink),
                field_text(node, "return_type", sink),
            ),
            "struct_item" => Payload::structure(struct_fields(node, sink)),
            "union_item" => Payload::Union {
                fields: struct_fields(node, sink),
            },
            "enum_item" => Payload::enumeration(
                node.child_by_field_name("body")
                    .map(|body| member_names(body, &["enum_variant"], sink))
                    .unwrap_or_default(),
            ),
            "trait_item" => {
                let body = node.child_by_field_name("body");
                Payload::Trait {
                    methods: body
                        .map(|b| member_names(b, &["function_signature_item"], sink))
                        .unwrap_or_default(),
                    associated_types: body
                        .map(|b| member_names(b, &["associated_type"], sink))
                        .unwrap_or_default(),
                }
            }
            // Associated type definitions inside impl blocks are not aliases
            "type_item" if scope.owner.is_some() || scope.owner_name.is_some() => {
                return Step::Prune
            }
            "type_item" => Payload::type_alias(field_text(node, "type", sink)),
            "mod_item" => Payload::module(),
            "impl_item" => return enter_impl(node, sink, scope),
            _ => return Step::Descend(scope.clone()),
        };

        let Some(name) = name_of(node, sink) else {
            sink.skip(node, "item without name");
            return Step::Descend(scope.clone());
        };
        let r = sink.emit(node, name, payload, scope);
        Step::Descend(scope.enter(sink, r))
    }
}

/// Methods of an `impl` block belong to the implementing type, which may be
/// declared in another file.
fn enter_impl(node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
    let Some(target) = impl_target(node, sink) else {
        sink.skip(node, "impl without target type");
        return Step::Descend(scope.clone());
    };
    let owner = sink.find_type(&target);
    Step::Descend(scope.enter_named_type(owner, target))
}

fn impl_target(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    let ty = node.child_by_field_name("type")?;
    let named = match ty.kind() {
        "generic_type" => ty
            .child_by_field_name("type")
            .or_else(|| child_of_kind(ty, "type_identifier")),
        "scoped_type_identifier" => ty.child_by_field_name("name"),
        "reference_type" => ty.child_by_field_name("type"),
        _ => Some(ty),
    }?;
    let text = sink.text(named);
    let base = text.rsplit("::").next().unwrap_or(text);
    let base = base.split('<').next().unwrap_or(base).trim();
    (!base.is_empty()).then(|| base.to_string())
}

fn struct_fields(node: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let Some(body) = node.child_by_field_name("body") else {
        return Vec::new();
    };
    match body.kind() {
        "field_declaration_list" => member_names(body, &["field_declaration"], sink),
        "ordered_field_declaration_list" => {
            let count = named_children(body)
                .into_iter()
                .filter(|c| c.kind() != "attribute_item" && c.kind() != "visibility_modifier")
                .count();
            (0..count).map(|i| i.to_string()).collect()
        }
        _ => Vec::new(),
    }
}
