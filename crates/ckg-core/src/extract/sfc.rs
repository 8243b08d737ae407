//! Vue and Svelte single-file components.
//!
//! The file itself is the component: one Component entity spans the whole
//! file, carries the markup as its template, and owns every function found
//! in the script blocks.

use std::path::Path;

use tree_sitter::Node;

use super::ecmascript::{pattern_names, visit_script, Dialect};
use super::{
    child_of_kind, has_token, member_names, named_children, walk, EntitySink, ExtractOptions,
    Extractor, Scope, Step,
};
use crate::entity::{EntityKind, FileEntities, Payload, Span};
use crate::grammar::{SfcLayout, SyntaxTree};
use crate::language::Language;

pub struct ComponentFileExtractor {
    language: Language,
}

const KINDS: &[EntityKind] = &[EntityKind::Component, EntityKind::Function];

impl ComponentFileExtractor {
    pub fn vue() -> Self {
        Self {
            language: Language::Vue,
        }
    }

    pub fn svelte() -> Self {
        Self {
            language: Language::Svelte,
        }
    }
}

impl Extractor for ComponentFileExtractor {
    fn language(&self) -> Language {
        self.language
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        visit_script(node, sink, scope, Dialect::SCRIPT_BLOCK)
    }

    fn extract(
        &self,
        tree: &SyntaxTree,
        source: &str,
        file_path: &str,
        options: &ExtractOptions,
    ) -> FileEntities {
        let mut sink = EntitySink::new(file_path, self.language, source, options);
        let layout = match &tree.sfc {
            Some(layout) => layout.clone(),
            None => SfcLayout::scan(source, self.language),
        };
        let root = tree.root();

        let props = if layout.scripts.is_empty() {
            Vec::new()
        } else {
            script_props(root, self.language, &sink)
        };
        let template = layout
            .template
            .and_then(|range| source.get(range))
            .map(|markup| markup.trim().to_string())
            .filter(|markup| !markup.is_empty());
        let payload = Payload::Component {
            props,
            methods: Vec::new(),
            template,
        };

        let name = component_name(file_path);
        let component = sink.emit_span(root, Span::whole(source), &name, payload, &Scope::default());
        let scope = Scope::default().enter(&sink, component);

        if !layout.scripts.is_empty() {
            walk(root, &mut sink, scope, &mut |node, sink, scope| {
                self.visit(node, sink, scope)
            });
        }
        sink.finish()
    }
}

/// `src/components/TodoItem.vue` is the `TodoItem` component.
fn component_name(file_path: &str) -> String {
    Path::new(file_path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(file_path)
        .to_string()
}

/// Props declared by the script blocks.
///
/// Vue: `defineProps(...)` (runtime or type-only) and the options `props` key.
/// Svelte: `export let` and `let { .. } = $props()`.
fn script_props(root: Node<'_>, language: Language, sink: &EntitySink<'_>) -> Vec<String> {
    let mut props: Vec<String> = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let found = match (language, node.kind()) {
            (Language::Vue, "call_expression") if callee(node, sink) == Some("defineProps") => {
                Some(define_props(node, sink))
            }
            (Language::Vue, "pair")
                if node
                    .child_by_field_name("key")
                    .is_some_and(|k| unquote(sink.text(k)) == "props") =>
            {
                node.child_by_field_name("value")
                    .map(|value| prop_list(value, sink))
            }
            (Language::Svelte, "export_statement") => Some(exported_lets(node, sink)),
            (Language::Svelte, "variable_declarator") => rune_props(node, sink),
            _ => None,
        };

        match found {
            Some(names) => {
                for name in names {
                    if !props.contains(&name) {
                        props.push(name);
                    }
                }
            }
            None => {
                let mut children = named_children(node);
                children.reverse();
                stack.extend(children);
            }
        }
    }
    props
}

fn callee<'s>(call: Node<'_>, sink: &EntitySink<'s>) -> Option<&'s str> {
    call.child_by_field_name("function").map(|f| sink.text(f))
}

fn unquote(text: &str) -> &str {
    text.trim_matches(['"', '\'', '`'])
}

fn define_props(call: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let type_arguments = call
        .child_by_field_name("type_arguments")
        .or_else(|| child_of_kind(call, "type_arguments"));
    if let Some(object) = type_arguments.and_then(|t| child_of_kind(t, "object_type")) {
        return member_names(object, &["property_signature"], sink);
    }
    call.child_by_field_name("arguments")
        .and_then(|args| named_children(args).into_iter().next())
        .map(|first| prop_list(first, sink))
        .unwrap_or_default()
}

/// `['a', 'b']` or `{ a: String, b: { type: Number } }`.
fn prop_list(value: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut names = Vec::new();
    for item in named_children(value) {
        let name = match (value.kind(), item.kind()) {
            ("array", "string") => Some(unquote(sink.text(item))),
            ("object", "pair") => item.child_by_field_name("key").map(|k| unquote(sink.text(k))),
            ("object", "shorthand_property_identifier") => Some(sink.text(item)),
            ("object", "method_definition") => {
                item.child_by_field_name("name").map(|n| sink.text(n))
            }
            _ => None,
        };
        if let Some(name) = name {
            names.push(name.to_string());
        }
    }
    names
}

fn exported_lets(export: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let Some(declaration) = export.child_by_field_name("declaration") else {
        return Vec::new();
    };
    if declaration.kind() != "lexical_declaration" || !has_token(declaration, "let") {
        return Vec::new();
    }
    named_children(declaration)
        .into_iter()
        .filter(|d| d.kind() == "variable_declarator")
        .filter_map(|d| d.child_by_field_name("name"))
        .filter(|n| n.kind() == "identifier")
        .map(|n| sink.text(n).to_string())
        .collect()
}

/// Svelte 5: `let { a, b } = $props();`
fn rune_props(declarator: Node<'_>, sink: &EntitySink<'_>) -> Option<Vec<String>> {
    let value = declarator.child_by_field_name("value")?;
    if value.kind() != "call_expression" || callee(value, sink) != Some("$props") {
        return None;
    }
    let pattern = declarator.child_by_field_name("name")?;
    (pattern.kind() == "object_pattern").then(|| pattern_names(pattern, sink))
}
