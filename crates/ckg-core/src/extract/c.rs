//! C: function definitions and aggregate types that carry a body.

use tree_sitter::Node;

use super::{field_text, named_children, EntitySink, Extractor, Scope, Step};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct CExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Struct,
    EntityKind::Enum,
    EntityKind::Union,
];

impl Extractor for CExtractor {
    fn language(&self) -> Language {
        Language::C
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        match node.kind() {
            "function_definition" => {
                let Some(declarator) = node.child_by_field_name("declarator") else {
                    sink.skip(node, "function without declarator");
                    return Step::Descend(scope.clone());
                };
                let Some(name) = declarator_name(declarator, sink) else {
                    sink.skip(node, "function without name");
                    return Step::Descend(scope.clone());
                };
                let payload = Payload::function(
                    function_parameters(declarator, sink),
                    field_text(node, "type", sink),
                );
                let r = sink.emit(node, name, payload, scope);
                Step::Descend(scope.enter(sink, r))
            }
            "struct_specifier" | "union_specifier" | "enum_specifier" => {
                let Some(body) = node.child_by_field_name("body") else {
                    // A reference such as `struct point *p`, not a definition.
                    return Step::Descend(scope.clone());
                };
                let Some(name) = aggregate_name(node, sink) else {
                    sink.skip(node, "anonymous aggregate");
                    return Step::Descend(scope.clone());
                };
                let payload = match node.kind() {
                    "struct_specifier" => Payload::structure(field_names(body, sink)),
                    "union_specifier" => Payload::Union {
                        fields: field_names(body, sink),
                    },
                    _ => Payload::enumeration(enumerators(body, sink)),
                };
                let r = sink.emit(node, name, payload, scope);
                Step::Descend(scope.enter(sink, r))
            }
            _ => Step::Descend(scope.clone()),
        }
    }
}

/// Innermost identifier of a declarator chain (`*name`, `name[4]`, `name(int)`).
pub(super) fn declarator_name<'s>(node: Node<'_>, sink: &EntitySink<'s>) -> Option<&'s str> {
    let mut current = node;
    loop {
        match current.kind() {
            "identifier" | "field_identifier" | "type_identifier" | "destructor_name"
            | "operator_name" | "qualified_identifier" | "template_function" => {
                return Some(sink.text(current));
            }
            _ => current = current.child_by_field_name("declarator")?,
        }
    }
}

/// Parameter list of the function declarator inside a declarator chain.
pub(super) fn function_parameters(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    let mut current = node;
    loop {
        if current.kind() == "function_declarator" {
            return field_text(current, "parameters", sink);
        }
        current = current.child_by_field_name("declarator")?;
    }
}

/// Tag name, or the typedef name for `typedef struct { ... } Name;`.
pub(super) fn aggregate_name<'s>(node: Node<'_>, sink: &EntitySink<'s>) -> Option<&'s str> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(sink.text(name));
    }
    let parent = node.parent()?;
    if parent.kind() != "type_definition" {
        return None;
    }
    let declarator = parent.child_by_field_name("declarator")?;
    declarator_name(declarator, sink)
}

/// Data members of a field declaration list; member function declarations excluded.
pub(super) fn field_names(list: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for decl in named_children(list) {
        if decl.kind() != "field_declaration" {
            continue;
        }
        let mut cursor = decl.walk();
        for declarator in decl.children_by_field_name("declarator", &mut cursor) {
            if is_function_declarator(declarator) {
                continue;
            }
            if let Some(name) = declarator_name(declarator, sink) {
                if !fields.iter().any(|f| f == name) {
                    fields.push(name.to_string());
                }
            }
        }
    }
    fields
}

pub(super) fn is_function_declarator(node: Node<'_>) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if n.kind() == "function_declarator" {
            return true;
        }
        current = n.child_by_field_name("declarator");
    }
    false
}

pub(super) fn enumerators(list: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    named_children(list)
        .into_iter()
        .filter(|n| n.kind() == "enumerator")
        .filter_map(|n| n.child_by_field_name("name"))
        .map(|n| sink.text(n).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::entity::{EntityKind, Payload};
    use crate::language::Language;

    const SOURCE: &str = r#"
#include <stdio.h>

struct point {
    int x, y;
    struct point *next;
};

typedef struct {
    double re;
    double im;
} complex_t;

union value {
    int i;
    float f;
};

enum color { RED, GREEN = 2, BLUE };

static char *name_of(struct point *p, int n) {
    return 0;
}

int main(void) {
    struct point p;
    return 0;
}
"#;

    #[test]
    fn test_c_definitions() {
        let entities = extract(Language::C, SOURCE);

        assert_eq!(
            names(&entities, EntityKind::Struct),
            vec!["point", "complex_t"]
        );
        assert_eq!(names(&entities, EntityKind::Union), vec!["value"]);
        assert_eq!(names(&entities, EntityKind::Enum), vec!["color"]);
        assert_eq!(
            names(&entities, EntityKind::Function),
            vec!["name_of", "main"]
        );
        assert_within_recognized(Language::C, &entities);
    }

    #[test]
    fn test_c_payloads() {
        let entities = extract(Language::C, SOURCE);

        let point = entities.find(EntityKind::Struct, "point").unwrap();
        assert_eq!(
            point.payload,
            Payload::Struct {
                fields: vec!["x".to_string(), "y".to_string(), "next".to_string()],
                methods: vec![],
            }
        );

        let color = entities.find(EntityKind::Enum, "color").unwrap();
        assert_eq!(
            color.payload,
            Payload::Enum {
                variants: vec!["RED".to_string(), "GREEN".to_string(), "BLUE".to_string()],
            }
        );

        let name_of = entities.find(EntityKind::Function, "name_of").unwrap();
        assert_eq!(
            name_of.payload,
            Payload::Function {
                parameters: Some("(struct point *p, int n)".to_string()),
                return_type: Some("char".to_string()),
            }
        );
    }
}
