//! C#: namespaces, type declarations, members and generic parameter lists.

use tree_sitter::Node;

use super::{
    body_of, child_of_kind, field_text, first_child_of_kinds, member_names, name_of,
    named_children, EntitySink, Extractor, Scope, Step,
};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct CSharpExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Class,
    EntityKind::Struct,
    EntityKind::Interface,
    EntityKind::Enum,
    EntityKind::Namespace,
    EntityKind::GenericType,
];

impl Extractor for CSharpExtractor {
    fn language(&self) -> Language {
        Language::CSharp
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        let payload = match node.kind() {
            // `namespace App;` scopes the rest of the compilation unit.
            "compilation_unit" => {
                let namespace = child_of_kind(node, "file_scoped_namespace_declaration")
                    .and_then(|ns| {
                        let name = name_of(ns, sink)?;
                        sink.emit(ns, name, Payload::namespace(), scope)
                    });
                return match namespace {
                    Some(r) => Step::Descend(scope.enter_module(r)),
                    None => Step::Descend(scope.clone()),
                };
            }
            "file_scoped_namespace_declaration" => return Step::Descend(scope.clone()),
            "namespace_declaration" => Payload::namespace(),
            "class_declaration" | "record_declaration" => {
                let body = body_of(node);
                Payload::class(body.map(|b| data_members(b, sink)).unwrap_or_default())
            }
            "struct_declaration" | "record_struct_declaration" => {
                let body = body_of(node);
                Payload::structure(body.map(|b| data_members(b, sink)).unwrap_or_default())
            }
            "interface_declaration" => {
                let body = body_of(node);
                Payload::interface(
                    body.map(|b| member_names(b, &["method_declaration"], sink))
                        .unwrap_or_default(),
                    body.map(|b| member_names(b, &["property_declaration"], sink))
                        .unwrap_or_default(),
                )
            }
            "enum_declaration" => Payload::enumeration(
                body_of(node)
                    .map(|b| member_names(b, &["enum_member_declaration"], sink))
                    .unwrap_or_default(),
            ),
            "method_declaration" | "local_function_statement" => Payload::function(
                field_text(node, "parameters", sink),
                field_text(node, "returns", sink).or_else(|| field_text(node, "type", sink)),
            ),
            "constructor_declaration" | "destructor_declaration" => {
                Payload::function(field_text(node, "parameters", sink), None)
            }
            _ => return Step::Descend(scope.clone()),
        };

        let Some(name) = name_of(node, sink) else {
            sink.skip(node, "declaration without name");
            return Step::Descend(scope.clone());
        };
        let r = sink.emit(node, name, payload, scope);
        emit_type_parameters(node, name, sink, scope);
        Step::Descend(scope.enter(sink, r))
    }
}

/// Field and property names declared directly in a type body.
fn data_members(body: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut members: Vec<String> = Vec::new();
    for member in named_children(body) {
        match member.kind() {
            "field_declaration" | "event_field_declaration" => {
                let Some(declaration) = child_of_kind(member, "variable_declaration") else {
                    continue;
                };
                for declarator in named_children(declaration) {
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    if let Some(name) = name_of(declarator, sink) {
                        members.push(name.to_string());
                    }
                }
            }
            "property_declaration" => {
                if let Some(name) = name_of(member, sink) {
                    members.push(name.to_string());
                }
            }
            _ => {}
        }
    }
    members
}

/// `class Repo<T> where T : IEntity` yields a GenericType on `<T>`.
fn emit_type_parameters(node: Node<'_>, name: &str, sink: &mut EntitySink<'_>, scope: &Scope) {
    let Some(params) = node
        .child_by_field_name("type_parameters")
        .or_else(|| first_child_of_kinds(node, &["type_parameter_list"]))
    else {
        return;
    };
    let constraints: Vec<&str> = named_children(node)
        .into_iter()
        .filter(|c| c.kind() == "type_parameter_constraints_clause")
        .map(|c| sink.text(c))
        .collect();
    let payload = Payload::generic(
        Some(sink.text(params).to_string()),
        (!constraints.is_empty()).then(|| constraints.join(" ")),
    );
    sink.emit(params, name, payload, scope);
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::entity::{EntityKind, Payload};
    use crate::language::Language;

    const SOURCE: &str = r#"
namespace Shop.Orders
{
    public interface IRepository<T> where T : class
    {
        T Find(int id);
        int Count { get; }
    }

    public class OrderService
    {
        private readonly int retries = 3;
        public string Name { get; set; }

        public OrderService() {}

        public decimal Total(int orderId)
        {
            int Local(int x) => x * 2;
            return Local(orderId);
        }
    }

    public struct Money
    {
        public decimal Amount;
    }

    public enum Status { Open, Closed }
}
"#;

    #[test]
    fn test_csharp_types() {
        let entities = extract(Language::CSharp, SOURCE);

        assert_eq!(names(&entities, EntityKind::Namespace), vec!["Shop.Orders"]);
        assert_eq!(names(&entities, EntityKind::Interface), vec!["IRepository"]);
        assert_eq!(names(&entities, EntityKind::Class), vec!["OrderService"]);
        assert_eq!(names(&entities, EntityKind::Struct), vec!["Money"]);
        assert_eq!(names(&entities, EntityKind::Enum), vec!["Status"]);
        assert_eq!(
            names(&entities, EntityKind::GenericType),
            vec!["IRepository"]
        );
        assert_within_recognized(Language::CSharp, &entities);
    }

    #[test]
    fn test_csharp_members() {
        let entities = extract(Language::CSharp, SOURCE);

        let service = entities.find(EntityKind::Class, "OrderService").unwrap();
        assert_eq!(
            service.payload,
            Payload::Class {
                fields: vec!["retries".to_string(), "Name".to_string()],
                methods: vec!["OrderService".to_string(), "Total".to_string()],
            }
        );

        let local = entities.find(EntityKind::Function, "Local").unwrap();
        assert!(local.member_of.is_none());
        assert_eq!(
            local.parent_function.map(|r| entities.entities[r.index()].name.as_str()),
            Some("Total")
        );

        let repo = entities.find(EntityKind::Interface, "IRepository").unwrap();
        assert_eq!(
            repo.payload,
            Payload::Interface {
                methods: vec!["Find".to_string()],
                properties: vec!["Count".to_string()],
            }
        );

        let status = entities.find(EntityKind::Enum, "Status").unwrap();
        assert_eq!(
            status.payload,
            Payload::Enum {
                variants: vec!["Open".to_string(), "Closed".to_string()],
            }
        );
    }

    #[test]
    fn test_generic_constraints() {
        let entities = extract(Language::CSharp, SOURCE);
        let generic = entities.find(EntityKind::GenericType, "IRepository").unwrap();
        assert_eq!(
            generic.payload,
            Payload::GenericType {
                type_parameters: Some("<T>".to_string()),
                constraints: Some("where T : class".to_string()),
            }
        );
    }
}
