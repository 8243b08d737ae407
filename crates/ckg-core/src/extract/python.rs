//! Python: functions, classes and imported modules.

use tree_sitter::Node;

use super::{field_text, name_of, named_children, EntitySink, Extractor, Scope, Step};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct PythonExtractor;

const KINDS: &[EntityKind] = &[EntityKind::Function, EntityKind::Class, EntityKind::Module];

impl Extractor for PythonExtractor {
    fn language(&self) -> Language {
        Language::Python
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        match node.kind() {
            "function_definition" => {
                let Some(name) = name_of(node, sink) else {
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
            "class_definition" => {
                let Some(name) = name_of(node, sink) else {
                    sink.skip(node, "class without name");
                    return Step::Descend(scope.clone());
                };
                let fields = class_fields(node, sink);
                let r = sink.emit(node, name, Payload::class(fields), scope);
                Step::Descend(scope.enter(sink, r))
            }
            "import_statement" => {
                for child in named_children(node) {
                    let target = match child.kind() {
                        "dotted_name" => Some(child),
                        "aliased_import" => child.child_by_field_name("name"),
                        _ => None,
                    };
                    if let Some(target) = target {
                        let name = sink.text(target);
                        sink.emit(target, name, Payload::module(), scope);
                    }
                }
                Step::Prune
            }
            "import_from_statement" => {
                if let Some(module) = node.child_by_field_name("module_name") {
                    let name = sink.text(module);
                    sink.emit(module, name, Payload::module(), scope);
                }
                Step::Prune
            }
            _ => Step::Descend(scope.clone()),
        }
    }
}

/// Class attributes plus `self.x` assignments made in `__init__`.
fn class_fields(class: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    let Some(body) = class.child_by_field_name("body") else {
        return fields;
    };

    for stmt in named_children(body) {
        let definition = match stmt.kind() {
            "decorated_definition" => stmt.child_by_field_name("definition"),
            "function_definition" => Some(stmt),
            "expression_statement" => {
                for assignment in named_children(stmt) {
                    if assignment.kind() != "assignment" {
                        continue;
                    }
                    if let Some(left) = assignment.child_by_field_name("left") {
                        if left.kind() == "identifier" {
                            push_field(&mut fields, sink.text(left));
                        }
                    }
                }
                None
            }
            _ => None,
        };

        let Some(def) = definition else { continue };
        if def.kind() != "function_definition" || name_of(def, sink) != Some("__init__") {
            continue;
        }
        if let Some(init_body) = def.child_by_field_name("body") {
            collect_self_assignments(init_body, sink, &mut fields);
        }
    }

    fields
}

fn collect_self_assignments(node: Node<'_>, sink: &EntitySink<'_>, fields: &mut Vec<String>) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        match current.kind() {
            "function_definition" | "class_definition" | "lambda" => continue,
            "assignment" | "augmented_assignment" => {
                if let Some(left) = current.child_by_field_name("left") {
                    if left.kind() == "attribute" {
                        let object = left.child_by_field_name("object").map(|o| sink.text(o));
                        let attr = left.child_by_field_name("attribute");
                        if let (Some("self"), Some(attr)) = (object, attr) {
                            push_field(fields, sink.text(attr));
                        }
                    }
                }
            }
            _ => {}
        }
        stack.extend(named_children(current));
    }
}

fn push_field(fields: &mut Vec<String>, name: &str) {
    if !fields.iter().any(|f| f == name) {
        fields.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::entity::{EntityKind, Payload};
    use crate::language::Language;

    const SOURCE: &str = r#"
import os
from collections import OrderedDict

def add(a, b):
    return a + b

class Calculator:
    precision = 2

    def __init__(self, start=0):
        self.total = start

    def divide(self, a, b) -> float:
        def check(x):
            return x != 0
        return a / b
"#;

    #[test]
    fn test_function_and_method_scenario() {
        let entities = extract(Language::Python, SOURCE);

        assert_eq!(
            names(&entities, EntityKind::Function),
            vec!["add", "__init__", "divide", "check"]
        );
        assert_eq!(names(&entities, EntityKind::Class), vec!["Calculator"]);

        let add = entities.find(EntityKind::Function, "add").unwrap();
        assert!(add.member_of.is_none());
        assert!(add.member_of_name.is_none());

        assert_eq!(
            owner(&entities, EntityKind::Function, "divide").as_deref(),
            Some("Calculator")
        );
    }

    #[test]
    fn test_nested_function_belongs_to_function_not_class() {
        let entities = extract(Language::Python, SOURCE);
        let check = entities.find(EntityKind::Function, "check").unwrap();
        assert!(check.member_of.is_none());
        let parent = check.parent_function.map(|r| entities.entities[r.index()].name.as_str());
        assert_eq!(parent, Some("divide"));
    }

    #[test]
    fn test_class_payload() {
        let entities = extract(Language::Python, SOURCE);
        let class = entities.find(EntityKind::Class, "Calculator").unwrap();
        assert_eq!(
            class.payload,
            Payload::Class {
                fields: vec!["precision".to_string(), "total".to_string()],
                methods: vec!["__init__".to_string(), "divide".to_string()],
            }
        );

        let divide = entities.find(EntityKind::Function, "divide").unwrap();
        assert_eq!(
            divide.payload,
            Payload::Function {
                parameters: Some("(self, a, b)".to_string()),
                return_type: Some("float".to_string()),
            }
        );
    }

    #[test]
    fn test_imports_are_modules() {
        let entities = extract(Language::Python, SOURCE);
        assert_eq!(
            names(&entities, EntityKind::Module),
            vec!["os", "collections"]
        );
        assert_within_recognized(Language::Python, &entities);
    }

    #[test]
    fn test_decorated_method() {
        let entities = extract(
            Language::Python,
            "class Api:\n    @staticmethod\n    def ping():\n        return 1\n",
        );
        assert_eq!(
            owner(&entities, EntityKind::Function, "ping").as_deref(),
            Some("Api")
        );
    }
}
