//! JavaScript, TypeScript and TSX.
//!
//! One visitor serves the whole family; a [`Dialect`] switches on the
//! TypeScript declarations and the JSX component rule. Component files
//! (Vue, Svelte) reuse it for their script blocks.

use tree_sitter::Node;

use super::{
    contains_kind, field_text, member_names, named_children, EntitySink, Extractor, Scope, Step,
};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

const JSX_KINDS: &[&str] = &["jsx_element", "jsx_self_closing_element"];

/// Which parts of the family grammar a file may use.
#[derive(Debug, Clone, Copy)]
pub(super) struct Dialect {
    /// Interfaces, enums, type aliases, namespaces and generics.
    pub typescript: bool,
    /// PascalCase functions and classes rendering JSX are components.
    pub jsx: bool,
    /// Classes are emitted as Class entities.
    pub classes: bool,
}

impl Dialect {
    /// Script blocks of component files: only functions.
    pub(super) const SCRIPT_BLOCK: Dialect = Dialect {
        typescript: false,
        jsx: false,
        classes: false,
    };
}

pub struct JavaScriptExtractor;

const JS_KINDS: &[EntityKind] = &[EntityKind::Function, EntityKind::Class, EntityKind::Component];

impl Extractor for JavaScriptExtractor {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        JS_KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        visit_script(
            node,
            sink,
            scope,
            Dialect {
                typescript: false,
                jsx: true,
                classes: true,
            },
        )
    }
}

/// TypeScript, with or without JSX.
pub struct TypeScriptExtractor {
    language: Language,
}

const TS_KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Class,
    EntityKind::Interface,
    EntityKind::Enum,
    EntityKind::TypeAlias,
    EntityKind::Namespace,
    EntityKind::GenericType,
];

const TSX_KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Class,
    EntityKind::Interface,
    EntityKind::Enum,
    EntityKind::TypeAlias,
    EntityKind::Namespace,
    EntityKind::GenericType,
    EntityKind::Component,
];

impl TypeScriptExtractor {
    pub fn typescript() -> Self {
        Self {
            language: Language::TypeScript,
        }
    }

    pub fn tsx() -> Self {
        Self {
            language: Language::Tsx,
        }
    }

    fn dialect(&self) -> Dialect {
        Dialect {
            typescript: true,
            jsx: self.language == Language::Tsx,
            classes: true,
        }
    }
}

impl Extractor for TypeScriptExtractor {
    fn language(&self) -> Language {
        self.language
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        if self.language == Language::Tsx {
            TSX_KINDS
        } else {
            TS_KINDS
        }
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        visit_script(node, sink, scope, self.dialect())
    }
}

// ============================================================================
// Visitor
// ============================================================================

pub(super) fn visit_script(
    node: Node<'_>,
    sink: &mut EntitySink<'_>,
    scope: &Scope,
    dialect: Dialect,
) -> Step {
    match node.kind() {
        "function_declaration"
        | "generator_function_declaration"
        | "function_expression"
        | "function"
        | "generator_function"
        | "arrow_function" => visit_callable(node, sink, scope, dialect),
        "method_definition" | "abstract_method_signature" => {
            let Some(name) = field_text(node, "name", sink) else {
                sink.skip(node, "method without name");
                return Step::Descend(scope.clone());
            };
            let r = sink.emit(node, &name, signature(node, sink), scope);
            emit_type_parameters(node, &name, sink, scope, dialect);
            Step::Descend(scope.enter(sink, r))
        }
        "class_declaration" | "class" | "abstract_class_declaration" => {
            visit_class(node, sink, scope, dialect)
        }
        _ if dialect.typescript => visit_typescript(node, sink, scope, dialect),
        _ => Step::Descend(scope.clone()),
    }
}

fn visit_callable(
    node: Node<'_>,
    sink: &mut EntitySink<'_>,
    scope: &Scope,
    dialect: Dialect,
) -> Step {
    let Some(name) = declared_name(node, sink) else {
        // Anonymous callbacks are not entities; their bodies still are searched.
        return Step::Descend(scope.clone());
    };

    let renders_jsx = dialect.jsx
        && is_pascal_case(&name)
        && node
            .child_by_field_name("body")
            .is_some_and(|body| contains_kind(body, JSX_KINDS));
    let payload = if renders_jsx {
        Payload::Component {
            props: component_props(node, sink),
            methods: Vec::new(),
            template: None,
        }
    } else {
        signature(node, sink)
    };

    let r = sink.emit(node, &name, payload, scope);
    emit_type_parameters(node, &name, sink, scope, dialect);
    Step::Descend(scope.enter(sink, r))
}

fn visit_class(node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope, dialect: Dialect) -> Step {
    if !dialect.classes {
        return Step::Descend(scope.clone());
    }
    let Some(name) = declared_name(node, sink) else {
        return Step::Descend(scope.clone());
    };
    let body = node.child_by_field_name("body");

    let renders_jsx = dialect.jsx
        && is_pascal_case(&name)
        && body.is_some_and(|b| contains_kind(b, JSX_KINDS));
    let payload = if renders_jsx {
        Payload::Component {
            props: Vec::new(),
            methods: Vec::new(),
            template: None,
        }
    } else {
        Payload::class(body.map(|b| class_fields(b, sink)).unwrap_or_default())
    };

    let r = sink.emit(node, &name, payload, scope);
    emit_type_parameters(node, &name, sink, scope, dialect);
    Step::Descend(scope.enter(sink, r))
}

fn visit_typescript(
    node: Node<'_>,
    sink: &mut EntitySink<'_>,
    scope: &Scope,
    dialect: Dialect,
) -> Step {
    let payload = match node.kind() {
        "interface_declaration" => {
            let body = node.child_by_field_name("body");
            Payload::interface(
                body.map(|b| member_names(b, &["method_signature"], sink))
                    .unwrap_or_default(),
                body.map(|b| member_names(b, &["property_signature"], sink))
                    .unwrap_or_default(),
            )
        }
        "enum_declaration" => Payload::enumeration(
            node.child_by_field_name("body")
                .map(|b| enum_members(b, sink))
                .unwrap_or_default(),
        ),
        "type_alias_declaration" => Payload::type_alias(field_text(node, "value", sink)),
        "internal_module" | "module" => Payload::namespace(),
        _ => return Step::Descend(scope.clone()),
    };

    let Some(name) = field_text(node, "name", sink) else {
        sink.skip(node, "declaration without name");
        return Step::Descend(scope.clone());
    };
    let name = name.trim_matches(['"', '\'']).to_string();
    let r = sink.emit(node, &name, payload, scope);
    emit_type_parameters(node, &name, sink, scope, dialect);
    Step::Descend(scope.enter(sink, r))
}

// ============================================================================
// Helpers
// ============================================================================

/// Own name, or the variable a function or class expression is assigned to.
fn declared_name(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(sink.text(name).to_string());
    }
    let parent = node.parent()?;
    if parent.kind() != "variable_declarator" {
        return None;
    }
    let value = parent.child_by_field_name("value")?;
    if value.id() != node.id() {
        return None;
    }
    let target = parent.child_by_field_name("name")?;
    (target.kind() == "identifier").then(|| sink.text(target).to_string())
}

fn is_pascal_case(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

fn signature(node: Node<'_>, sink: &EntitySink<'_>) -> Payload {
    let parameters = field_text(node, "parameters", sink)
        .or_else(|| field_text(node, "parameter", sink));
    let return_type = field_text(node, "return_type", sink)
        .map(|t| t.trim_start_matches(':').trim().to_string());
    Payload::function(parameters, return_type)
}

/// Prop names destructured from the first parameter.
fn component_props(node: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let Some(params) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let Some(first) = named_children(params).into_iter().next() else {
        return Vec::new();
    };
    let pattern = match first.kind() {
        "required_parameter" | "optional_parameter" => first.child_by_field_name("pattern"),
        "assignment_pattern" => first.child_by_field_name("left"),
        _ => Some(first),
    };
    match pattern {
        Some(p) if p.kind() == "object_pattern" => pattern_names(p, sink),
        _ => Vec::new(),
    }
}

pub(super) fn pattern_names(pattern: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut names = Vec::new();
    for child in named_children(pattern) {
        let key = match child.kind() {
            "shorthand_property_identifier_pattern" => Some(child),
            "pair_pattern" => child.child_by_field_name("key"),
            "object_assignment_pattern" => child.child_by_field_name("left"),
            _ => None,
        };
        if let Some(key) = key {
            names.push(sink.text(key).trim_matches(['"', '\'']).to_string());
        }
    }
    names
}

fn class_fields(body: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    named_children(body)
        .into_iter()
        .filter(|m| matches!(m.kind(), "field_definition" | "public_field_definition"))
        .filter_map(|m| {
            m.child_by_field_name("property")
                .or_else(|| m.child_by_field_name("name"))
        })
        .map(|n| sink.text(n).to_string())
        .collect()
}

fn enum_members(body: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    named_children(body)
        .into_iter()
        .filter_map(|member| match member.kind() {
            "enum_assignment" => member.child_by_field_name("name"),
            "property_identifier" | "string" => Some(member),
            _ => None,
        })
        .map(|n| sink.text(n).trim_matches(['"', '\'']).to_string())
        .collect()
}

/// GenericType anchored on a `<T extends ...>` clause.
fn emit_type_parameters(
    node: Node<'_>,
    name: &str,
    sink: &mut EntitySink<'_>,
    scope: &Scope,
    dialect: Dialect,
) {
    if !dialect.typescript {
        return;
    }
    let Some(params) = node.child_by_field_name("type_parameters") else {
        return;
    };
    let constraints: Vec<&str> = named_children(params)
        .into_iter()
        .filter_map(|p| p.child_by_field_name("constraint"))
        .map(|c| sink.text(c))
        .collect();
    let payload = Payload::generic(
        Some(sink.text(params).to_string()),
        (!constraints.is_empty()).then(|| constraints.join(", ")),
    );
    sink.emit(params, name, payload, scope);
}
