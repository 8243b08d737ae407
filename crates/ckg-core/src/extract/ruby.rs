//! Ruby: methods, classes and modules.

use tree_sitter::Node;

use super::{base_type_name, field_text, named_children, EntitySink, Extractor, Scope, Step};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct RubyExtractor;

const KINDS: &[EntityKind] = &[EntityKind::Function, EntityKind::Class, EntityKind::Module];

const ATTRIBUTE_MACROS: &[&str] = &["attr_reader", "attr_writer", "attr_accessor"];

impl Extractor for RubyExtractor {
    fn language(&self) -> Language {
        Language::Ruby
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        let payload = match node.kind() {
            "method" | "singleton_method" => {
                Payload::function(field_text(node, "parameters", sink), None)
            }
            "class" => Payload::class(class_fields(node, sink)),
            "module" => Payload::module(),
            _ => return Step::Descend(scope.clone()),
        };

        let Some(name) = field_text(node, "name", sink) else {
            sink.skip(node, "declaration without name");
            return Step::Descend(scope.clone());
        };
        let name = match node.kind() {
            "class" | "module" => base_type_name(&name),
            _ => name,
        };
        let r = sink.emit(node, &name, payload, scope);
        Step::Descend(scope.enter(sink, r))
    }
}

/// `attr_*` symbols plus instance variables assigned in `initialize`.
fn class_fields(class: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    let body = class
        .child_by_field_name("body")
        .unwrap_or(class);

    for stmt in named_children(body) {
        match stmt.kind() {
            "call" => {
                let is_attr = stmt
                    .child_by_field_name("method")
                    .is_some_and(|m| ATTRIBUTE_MACROS.contains(&sink.text(m)));
                if !is_attr {
                    continue;
                }
                let Some(args) = stmt.child_by_field_name("arguments") else {
                    continue;
                };
                for arg in named_children(args) {
                    if arg.kind() == "simple_symbol" {
                        push_unique(&mut fields, sink.text(arg).trim_start_matches(':'));
                    }
                }
            }
            "method" if field_text(stmt, "name", sink).as_deref() == Some("initialize") => {
                let mut stack = vec![stmt];
                while let Some(node) = stack.pop() {
                    if node.kind() == "assignment" {
                        if let Some(left) = node.child_by_field_name("left") {
                            if left.kind() == "instance_variable" {
                                push_unique(&mut fields, sink.text(left).trim_start_matches('@'));
                            }
                        }
                    }
                    let mut children = named_children(node);
                    children.reverse();
                    stack.extend(children);
                }
            }
            _ => {}
        }
    }
    fields
}

fn push_unique(fields: &mut Vec<String>, name: &str) {
    if !name.is_empty() && !fields.iter().any(|f| f == name) {
        fields.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::entity::{EntityKind, Payload};
    use crate::language::Language;

    const SOURCE: &str = r#"
module Billing
  class Invoice < Base
    attr_reader :total, :items

    def initialize(total)
      @total = total
      @paid = false
    end

    def self.build(items)
      new(items.sum)
    end

    def pay
      @paid = true
    end
  end

  def self.version
    "1.0"
  end
end

def helper(x)
  x * 2
end
"#;

    #[test]
    fn test_ruby_entities() {
        let entities = extract(Language::Ruby, SOURCE);

        assert_eq!(names(&entities, EntityKind::Module), vec!["Billing"]);
        assert_eq!(names(&entities, EntityKind::Class), vec!["Invoice"]);
        assert_eq!(
            names(&entities, EntityKind::Function),
            vec!["initialize", "build", "pay", "version", "helper"]
        );
        assert_within_recognized(Language::Ruby, &entities);
    }

    #[test]
    fn test_ruby_payloads() {
        let entities = extract(Language::Ruby, SOURCE);

        let invoice = entities.find(EntityKind::Class, "Invoice").unwrap();
        assert_eq!(
            invoice.payload,
            Payload::Class {
                fields: vec!["total".to_string(), "items".to_string(), "paid".to_string()],
                methods: vec!["initialize".to_string(), "build".to_string(), "pay".to_string()],
            }
        );

        let billing = entities.find(EntityKind::Module, "Billing").unwrap();
        assert_eq!(
            billing.payload,
            Payload::Module {
                exports: vec!["Invoice".to_string(), "version".to_string()],
            }
        );

        let helper = entities.find(EntityKind::Function, "helper").unwrap();
        assert!(!helper.is_method());
        assert!(helper.declared_in.is_none());
    }
}
