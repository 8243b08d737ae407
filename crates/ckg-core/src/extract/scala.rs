//! Scala: classes and objects, traits, enums, type members and defs.

use tree_sitter::Node;

use super::{field_text, name_of, named_children, EntitySink, Extractor, Scope, Step};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct ScalaExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Class,
    EntityKind::Trait,
    EntityKind::Enum,
    EntityKind::TypeAlias,
];

impl Extractor for ScalaExtractor {
    fn language(&self) -> Language {
        Language::Scala
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        let payload = match node.kind() {
            "class_definition" | "object_definition" => Payload::class(class_fields(node, sink)),
            "trait_definition" => Payload::Trait {
                methods: Vec::new(),
                associated_types: node
                    .child_by_field_name("body")
                    .map(|b| type_members(b, sink))
                    .unwrap_or_default(),
            },
            "enum_definition" => Payload::enumeration(enum_cases(node, sink)),
            "type_definition" => Payload::type_alias(field_text(node, "type", sink)),
            "function_definition" | "function_declaration" => Payload::function(
                field_text(node, "parameters", sink),
                field_text(node, "return_type", sink),
            ),
            _ => return Step::Descend(scope.clone()),
        };

        let Some(name) = name_of(node, sink) else {
            sink.skip(node, "definition without name");
            return Step::Descend(scope.clone());
        };
        let r = sink.emit(node, name, payload, scope);
        Step::Descend(scope.enter(sink, r))
    }
}

/// Constructor parameters plus `val`/`var` members of the template body.
fn class_fields(node: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    let mut cursor = node.walk();
    for params in node.children_by_field_name("class_parameters", &mut cursor) {
        for param in named_children(params) {
            if param.kind() == "class_parameter" {
                if let Some(name) = name_of(param, sink) {
                    fields.push(name.to_string());
                }
            }
        }
    }
    if let Some(body) = node.child_by_field_name("body") {
        for member in named_children(body) {
            if matches!(member.kind(), "val_definition" | "var_definition") {
                if let Some(pattern) = member.child_by_field_name("pattern") {
                    fields.push(sink.text(pattern).to_string());
                }
            }
        }
    }
    fields
}

fn type_members(body: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    named_children(body)
        .into_iter()
        .filter(|m| m.kind() == "type_definition")
        .filter_map(|m| name_of(m, sink))
        .map(str::to_string)
        .collect()
}

fn enum_cases(node: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut cases = Vec::new();
    let Some(body) = node.child_by_field_name("body") else {
        return cases;
    };
    let mut stack = vec![body];
    while let Some(current) = stack.pop() {
        match current.kind() {
            "simple_enum_case" | "full_enum_case" => {
                if let Some(name) = name_of(current, sink) {
                    cases.push(name.to_string());
                }
            }
            "enum_body" | "enum_case_definitions" => {
                let mut children = named_children(current);
                children.reverse();
                stack.extend(children);
            }
            _ => {}
        }
    }
    cases
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::entity::{EntityKind, Payload};
    use crate::language::Language;

    const SOURCE: &str = r#"
package shop

trait Priced {
  def price: Double
}

case class Item(name: String, cost: Double) extends Priced {
  def price: Double = cost
}

object Catalog {
  type Index = Map[String, Item]
  def find(name: String): Option[Item] = None
}

enum Size {
  case Small, Large
}
"#;

    #[test]
    fn test_scala_entities() {
        let entities = extract(Language::Scala, SOURCE);

        assert_eq!(names(&entities, EntityKind::Trait), vec!["Priced"]);
        assert_eq!(
            names(&entities, EntityKind::Class),
            vec!["Item", "Catalog"]
        );
        assert_eq!(names(&entities, EntityKind::Enum), vec!["Size"]);
        assert_eq!(names(&entities, EntityKind::TypeAlias), vec!["Index"]);
        assert_eq!(
            names(&entities, EntityKind::Function),
            vec!["price", "price", "find"]
        );
        assert_within_recognized(Language::Scala, &entities);
    }

    #[test]
    fn test_scala_payloads() {
        let entities = extract(Language::Scala, SOURCE);

        let item = entities.find(EntityKind::Class, "Item").unwrap();
        assert_eq!(
            item.payload,
            Payload::Class {
                fields: vec!["name".to_string(), "cost".to_string()],
                methods: vec!["price".to_string()],
            }
        );
        assert_eq!(
            owner(&entities, EntityKind::Function, "find").as_deref(),
            Some("Catalog")
        );
    }
}
