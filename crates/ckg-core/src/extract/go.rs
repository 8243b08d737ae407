//! Go: functions, receiver methods, type specs, the package and its imports.

use tree_sitter::Node;

use super::{
    base_type_name, child_of_kind, field_text, member_names, name_of, named_children, EntitySink,
    Extractor, Scope, Step,
};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct GoExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Function,
    EntityKind::Struct,
    EntityKind::Interface,
    EntityKind::TypeAlias,
    EntityKind::Module,
];

impl Extractor for GoExtractor {
    fn language(&self) -> Language {
        Language::Go
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        match node.kind() {
            // The package clause scopes every top-level declaration of the file.
            "source_file" => {
                let package = child_of_kind(node, "package_clause").and_then(|clause| {
                    let name = child_of_kind(clause, "package_identifier")?;
                    let name = sink.text(name);
                    sink.emit(clause, name, Payload::module(), scope)
                });
                match package {
                    Some(r) => Step::Descend(scope.enter_module(r)),
                    None => Step::Descend(scope.clone()),
                }
            }
            "package_clause" => Step::Prune,
            "import_spec" => {
                if let Some(path) = node.child_by_field_name("path") {
                    let name = sink.text(path).trim_matches(['"', '`']);
                    sink.emit(node, name, Payload::module(), scope);
                }
                Step::Prune
            }
            "function_declaration" => {
                let Some(name) = name_of(node, sink) else {
                    sink.skip(node, "function without name");
                    return Step::Descend(scope.clone());
                };
                let r = sink.emit(node, name, signature(node, sink), scope);
                Step::Descend(scope.enter(sink, r))
            }
            "method_declaration" => {
                let Some(name) = name_of(node, sink) else {
                    sink.skip(node, "method without name");
                    return Step::Descend(scope.clone());
                };
                let Some(receiver) = receiver_type(node, sink) else {
                    sink.skip(node, "method without receiver type");
                    return Step::Descend(scope.clone());
                };
                let owner = sink.find_type(&receiver);
                let method_scope = scope.enter_named_type(owner, receiver);
                let r = sink.emit(node, name, signature(node, sink), &method_scope);
                Step::Descend(method_scope.enter(sink, r))
            }
            "type_spec" => {
                let Some(name) = name_of(node, sink) else {
                    sink.skip(node, "type spec without name");
                    return Step::Descend(scope.clone());
                };
                let ty = node.child_by_field_name("type");
                let payload = match ty.map(|t| t.kind()) {
                    Some("struct_type") => {
                        Payload::structure(ty.map(|t| struct_fields(t, sink)).unwrap_or_default())
                    }
                    Some("interface_type") => Payload::interface(
                        ty.map(|t| member_names(t, &["method_elem", "method_spec"], sink))
                            .unwrap_or_default(),
                        Vec::new(),
                    ),
                    _ => Payload::type_alias(field_text(node, "type", sink)),
                };
                let r = sink.emit(node, name, payload, scope);
                Step::Descend(scope.enter(sink, r))
            }
            "type_alias" => {
                let Some(name) = name_of(node, sink) else {
                    sink.skip(node, "type alias without name");
                    return Step::Prune;
                };
                let payload = Payload::type_alias(field_text(node, "type", sink));
                sink.emit(node, name, payload, scope);
                Step::Prune
            }
            _ => Step::Descend(scope.clone()),
        }
    }
}

fn signature(node: Node<'_>, sink: &EntitySink<'_>) -> Payload {
    Payload::function(
        field_text(node, "parameters", sink),
        field_text(node, "result", sink),
    )
}

/// `func (s *Server[T]) Run()` binds to `Server`.
fn receiver_type(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let param = child_of_kind(receiver, "parameter_declaration")?;
    let ty = param.child_by_field_name("type")?;
    let name = base_type_name(sink.text(ty));
    (!name.is_empty()).then_some(name)
}

/// Field names of a struct type; embedded fields are named after their type.
fn struct_fields(struct_type: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut fields = Vec::new();
    let Some(list) = child_of_kind(struct_type, "field_declaration_list") else {
        return fields;
    };
    for decl in named_children(list) {
        if decl.kind() != "field_declaration" {
            continue;
        }
        let mut cursor = decl.walk();
        let named: Vec<String> = decl
            .children_by_field_name("name", &mut cursor)
            .map(|n| sink.text(n).to_string())
            .collect();
        if named.is_empty() {
            if let Some(ty) = decl.child_by_field_name("type") {
                fields.push(base_type_name(sink.text(ty)));
            }
        } else {
            fields.extend(named);
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::entity::{EntityKind, Payload};
    use crate::language::Language;

    const SOURCE: &str = r#"package shapes

import (
	"fmt"
	m "math"
)

type Drawable interface {
	Draw() string
	Area() float64
}

type Circle struct {
	Radius float64
	X, Y   int
	fmt.Stringer
}

type Celsius float64

type Alias = Circle

func (c *Circle) Area() float64 {
	return m.Pi * c.Radius * c.Radius
}

func NewCircle(r float64) *Circle {
	return &Circle{Radius: r}
}
"#;

    #[test]
    fn test_interface_is_not_a_class() {
        let entities = extract(Language::Go, SOURCE);
        assert_eq!(names(&entities, EntityKind::Interface), vec!["Drawable"]);
        assert_eq!(entities.of_kind(EntityKind::Class).count(), 0);

        let drawable = entities.find(EntityKind::Interface, "Drawable").unwrap();
        assert_eq!(
            drawable.payload,
            Payload::Interface {
                methods: vec!["Draw".to_string(), "Area".to_string()],
                properties: vec![],
            }
        );
        assert_within_recognized(Language::Go, &entities);
    }

    #[test]
    fn test_types_and_package() {
        let entities = extract(Language::Go, SOURCE);
        assert_eq!(names(&entities, EntityKind::Struct), vec!["Circle"]);
        assert_eq!(
            names(&entities, EntityKind::TypeAlias),
            vec!["Celsius", "Alias"]
        );
        assert_eq!(
            names(&entities, EntityKind::Module),
            vec!["shapes", "fmt", "math"]
        );

        let circle = entities.find(EntityKind::Struct, "Circle").unwrap();
        assert_eq!(
            circle.payload,
            Payload::Struct {
                fields: vec![
                    "Radius".to_string(),
                    "X".to_string(),
                    "Y".to_string(),
                    "Stringer".to_string()
                ],
                methods: vec!["Area".to_string()],
            }
        );
        assert_eq!(
            entities.scope_of(circle).map(|s| s.name.as_str()),
            Some("shapes")
        );
    }

    #[test]
    fn test_receiver_binds_method() {
        let entities = extract(Language::Go, SOURCE);
        let area = entities
            .of_kind(EntityKind::Function)
            .find(|f| f.name == "Area")
            .unwrap();
        assert!(area.is_method());
        assert_eq!(
            entities.owner_of(area).map(|o| o.name.as_str()),
            Some("Circle")
        );
        assert_eq!(
            area.payload,
            Payload::Function {
                parameters: Some("()".to_string()),
                return_type: Some("float64".to_string()),
            }
        );

        let ctor = entities.find(EntityKind::Function, "NewCircle").unwrap();
        assert!(!ctor.is_method());
    }

    #[test]
    fn test_method_before_receiver_type() {
        let entities = extract(
            Language::Go,
            "package main\n\nfunc (s *Server) Start() {}\n\ntype Server struct {\n\tPort int\n}\n",
        );
        let start = entities.find(EntityKind::Function, "Start").unwrap();
        assert!(start.is_method());
        assert_eq!(
            entities.owner_of(start).map(|o| o.name.as_str()),
            Some("Server")
        );

        let server = entities.find(EntityKind::Struct, "Server").unwrap();
        assert_eq!(
            server.payload,
            Payload::Struct {
                fields: vec!["Port".to_string()],
                methods: vec!["Start".to_string()],
            }
        );
    }
}
