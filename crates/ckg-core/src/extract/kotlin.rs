//! Kotlin: classes, interfaces, enum classes, objects, functions and aliases.

use tree_sitter::Node;

use super::{
    body_of, child_of_kind, has_token, name_of, named_children, nested_member_names, EntitySink,
    Extractor, Scope, Step,
};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct KotlinExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Class,
    EntityKind::Interface,
    EntityKind::Enum,
    EntityKind::TypeAlias,
];

impl Extractor for KotlinExtractor {
    fn language(&self) -> Language {
        Language::Kotlin
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        let payload = match node.kind() {
            "class_declaration" if has_token(node, "interface") => {
                let body = body_of(node);
                Payload::interface(
                    body.map(|b| nested_member_names(b, &["function_declaration"], sink))
                        .unwrap_or_default(),
                    body.map(|b| property_names(b, sink)).unwrap_or_default(),
                )
            }
            "class_declaration" if has_modifier(node, "enum", sink) => Payload::enumeration(
                body_of(node)
                    .map(|b| nested_member_names(b, &["enum_entry"], sink))
                    .unwrap_or_default(),
            ),
            "class_declaration" | "object_declaration" => {
                let mut fields = constructor_properties(node, sink);
                if let Some(body) = body_of(node) {
                    fields.extend(property_names(body, sink));
                }
                Payload::class(fields)
            }
            "function_declaration" => {
                Payload::function(parameters(node, sink), return_type(node, sink))
            }
            "type_alias" => {
                let target = named_children(node).last().map(|t| sink.text(*t).to_string());
                Payload::type_alias(target)
            }
            _ => return Step::Descend(scope.clone()),
        };

        let Some(name) = name_of(node, sink) else {
            sink.skip(node, "declaration without name");
            return Step::Descend(scope.clone());
        };
        let r = sink.emit(node, name, payload, scope);
        Step::Descend(scope.enter(sink, r))
    }
}

fn has_modifier(node: Node<'_>, modifier: &str, sink: &EntitySink<'_>) -> bool {
    child_of_kind(node, "modifiers")
        .is_some_and(|m| sink.text(m).split_whitespace().any(|word| word == modifier))
}

fn parameters(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    child_of_kind(node, "function_value_parameters").map(|p| sink.text(p).to_string())
}

/// The type written after the parameter list, if any.
fn return_type(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    let mut after_params = false;
    for child in named_children(node) {
        if child.kind() == "function_value_parameters" {
            after_params = true;
            continue;
        }
        if after_params && (child.kind().ends_with("_type") || child.kind() == "type") {
            return Some(sink.text(child).to_string());
        }
        if child.kind() == "function_body" {
            break;
        }
    }
    None
}

/// `val`/`var` parameters of the primary constructor.
fn constructor_properties(node: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut names = Vec::new();
    let Some(constructor) = child_of_kind(node, "primary_constructor") else {
        return names;
    };
    let mut stack = vec![constructor];
    while let Some(current) = stack.pop() {
        if current.kind() == "class_parameter" {
            if has_token(current, "val") || has_token(current, "var") {
                if let Some(name) = name_of(current, sink) {
                    names.push(name.to_string());
                }
            }
            continue;
        }
        let mut children = named_children(current);
        children.reverse();
        stack.extend(children);
    }
    names
}

fn property_names(body: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    named_children(body)
        .into_iter()
        .filter(|m| m.kind() == "property_declaration")
        .filter_map(|m| child_of_kind(m, "variable_declaration"))
        .filter_map(|v| name_of(v, sink))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::entity::EntityKind;
    use crate::language::Language;

    const SOURCE: &str = r#"
package app

interface Greeter {
    fun greet(name: String): String
}

data class User(val id: Int, val name: String) : Greeter {
    var visits = 0
    override fun greet(name: String): String = "hi $name"
}

enum class Color { RED, GREEN }

object Registry {
    fun register(user: User) {}
}

typealias Users = List<User>

fun main() {}
"#;

    #[test]
    fn test_kotlin_entities() {
        let entities = extract(Language::Kotlin, SOURCE);

        assert_eq!(names(&entities, EntityKind::Interface), vec!["Greeter"]);
        assert_eq!(
            names(&entities, EntityKind::Class),
            vec!["User", "Registry"]
        );
        assert_eq!(names(&entities, EntityKind::Enum), vec!["Color"]);
        assert_eq!(names(&entities, EntityKind::TypeAlias), vec!["Users"]);
        assert_eq!(
            names(&entities, EntityKind::Function),
            vec!["greet", "greet", "register", "main"]
        );
        assert_within_recognized(Language::Kotlin, &entities);
    }

    #[test]
    fn test_kotlin_members() {
        let entities = extract(Language::Kotlin, SOURCE);
        assert_eq!(
            owner(&entities, EntityKind::Function, "register").as_deref(),
            Some("Registry")
        );
        let main = entities.find(EntityKind::Function, "main").unwrap();
        assert!(!main.is_method());
    }
}
