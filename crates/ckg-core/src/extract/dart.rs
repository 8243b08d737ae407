//! Dart: classes, mixins, enums, extensions, functions and package imports.
//!
//! A Dart function body is a sibling of its signature, not a child. The
//! function entity spans both, and the body re-enters the function's scope
//! by looking the entity up by that span.

use tree_sitter::Node;

use super::{
    child_of_kind, first_child_of_kinds, has_token, member_names, name_of, named_children,
    EntitySink, Extractor, Scope, Step,
};
use crate::entity::{EntityKind, Payload, Span};
use crate::language::Language;

pub struct DartExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Class,
    EntityKind::Interface,
    EntityKind::Enum,
    EntityKind::Extension,
    EntityKind::Module,
];

const SIGNATURES: &[&str] = &[
    "function_signature",
    "getter_signature",
    "setter_signature",
    "operator_signature",
    "constructor_signature",
    "constant_constructor_signature",
    "factory_constructor_signature",
];

impl Extractor for DartExtractor {
    fn language(&self) -> Language {
        Language::Dart
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        match node.kind() {
            // Abstract classes are Dart's interfaces.
            "class_definition" => {
                let Some(name) = name_of(node, sink) else {
                    sink.skip(node, "class without name");
                    return Step::Descend(scope.clone());
                };
                let payload = if is_abstract(node) {
                    Payload::interface(Vec::new(), Vec::new())
                } else {
                    Payload::class(class_fields(node, sink))
                };
                let r = sink.emit(node, name, payload, scope);
                Step::Descend(scope.enter(sink, r))
            }
            "mixin_declaration" => {
                let Some(name) = name_of(node, sink) else {
                    sink.skip(node, "mixin without name");
                    return Step::Descend(scope.clone());
                };
                let r = sink.emit(node, name, Payload::class(class_fields(node, sink)), scope);
                Step::Descend(scope.enter(sink, r))
            }
            "enum_declaration" => {
                let Some(name) = name_of(node, sink) else {
                    sink.skip(node, "enum without name");
                    return Step::Descend(scope.clone());
                };
                let variants = child_of_kind(node, "enum_body")
                    .map(|body| member_names(body, &["enum_constant"], sink))
                    .unwrap_or_default();
                let r = sink.emit(node, name, Payload::enumeration(variants), scope);
                Step::Descend(scope.enter(sink, r))
            }
            "extension_declaration" => {
                let extended_type = extended_type(node, sink);
                // `extension on String` is named after the type it extends.
                let name = node
                    .child_by_field_name("name")
                    .map(|n| sink.text(n).to_string())
                    .or_else(|| extended_type.clone());
                let Some(name) = name else {
                    sink.skip(node, "extension without name or target");
                    return Step::Descend(scope.clone());
                };
                let payload = Payload::Extension {
                    extended_type,
                    methods: Vec::new(),
                };
                let r = sink.emit(node, &name, payload, scope);
                Step::Descend(scope.enter(sink, r))
            }
            kind if SIGNATURES.contains(&kind) => {
                let Some(name) = name_of(node, sink) else {
                    sink.skip(node, "signature without name");
                    return Step::Prune;
                };
                let anchor = signature_anchor(node);
                let span = match function_body(anchor) {
                    Some(body) => Span::between(&anchor, &body),
                    None => Span::of(&anchor),
                };
                let payload = Payload::function(parameters(node, sink), return_type(node, sink));
                sink.emit_span(node, span, name, payload, scope);
                Step::Prune
            }
            "function_body" => {
                let owner = node
                    .prev_named_sibling()
                    .and_then(|signature| sink.at_span(signature.start_byte(), node.end_byte()));
                match owner {
                    Some(r) => Step::Descend(scope.enter_function(r)),
                    None => Step::Descend(scope.clone()),
                }
            }
            "import_or_export" => {
                if let Some(uri) = import_uri(node, sink) {
                    if !uri.starts_with('.') {
                        sink.emit(node, &uri, Payload::module(), scope);
                    }
                }
                Step::Prune
            }
            _ => Step::Descend(scope.clone()),
        }
    }
}

/// Class members wrap their signature in a `method_signature`; the body
/// follows that wrapper.
fn signature_anchor(signature: Node<'_>) -> Node<'_> {
    match signature.parent() {
        Some(parent) if parent.kind() == "method_signature" => parent,
        _ => signature,
    }
}

fn function_body(anchor: Node<'_>) -> Option<Node<'_>> {
    anchor
        .next_named_sibling()
        .filter(|sibling| sibling.kind() == "function_body")
}

fn is_abstract(class: Node<'_>) -> bool {
    has_token(class, "abstract")
        || child_of_kind(class, "class_modifiers").is_some_and(|m| has_token(m, "abstract"))
}

/// Names declared by the field declarations of a class or mixin body.
fn class_fields(node: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let Some(body) = child_of_kind(node, "class_body") else {
        return Vec::new();
    };
    let mut fields = Vec::new();
    for decl in named_children(body) {
        if decl.kind() != "declaration" {
            continue;
        }
        let mut stack = vec![decl];
        while let Some(current) = stack.pop() {
            match current.kind() {
                "initialized_identifier"
                | "static_final_declaration"
                | "initialized_variable_definition" => {
                    if let Some(name) = child_of_kind(current, "identifier") {
                        let name = sink.text(name).to_string();
                        if !fields.contains(&name) {
                            fields.push(name);
                        }
                    }
                }
                kind if SIGNATURES.contains(&kind) => {}
                _ => {
                    let mut children = named_children(current);
                    children.reverse();
                    stack.extend(children);
                }
            }
        }
    }
    fields
}

fn parameters(signature: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    first_child_of_kinds(signature, &["formal_parameter_list", "formal_parameter_part"])
        .map(|p| sink.text(p).trim().to_string())
}

/// The type written before the name, if any.
fn return_type(signature: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    let name = signature.child_by_field_name("name")?;
    let ty = named_children(signature)
        .into_iter()
        .take_while(|child| child.start_byte() < name.start_byte())
        .find(|child| child.kind().contains("type") || child.kind() == "void_type")?;
    Some(sink.text(ty).trim().to_string())
}

/// `extension X on Type` target.
fn extended_type(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    if let Some(class) = node.child_by_field_name("class") {
        return Some(sink.text(class).trim().to_string());
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    let on = children.iter().position(|child| child.kind() == "on")?;
    children[on + 1..]
        .iter()
        .find(|child| child.is_named() && child.kind() != "extension_body")
        .map(|ty| sink.text(*ty).trim().to_string())
}

/// Imported library URI without its quotes.
fn import_uri(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if matches!(current.kind(), "uri" | "string_literal") {
            let uri = sink.text(current).trim().trim_matches(['\'', '"']).to_string();
            return (!uri.is_empty()).then_some(uri);
        }
        let mut children = named_children(current);
        children.reverse();
        stack.extend(children);
    }
    None
}
