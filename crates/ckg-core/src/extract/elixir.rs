//! Elixir: every definition is a macro call, told apart by its target.

use tree_sitter::Node;

use super::{child_of_kind, named_children, EntitySink, Extractor, Scope, Step};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct ElixirExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Module,
    EntityKind::Function,
    EntityKind::Struct,
    EntityKind::Interface,
    EntityKind::Extension,
];

impl Extractor for ElixirExtractor {
    fn language(&self) -> Language {
        Language::Elixir
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        if node.kind() != "call" {
            return Step::Descend(scope.clone());
        }
        let Some(target) = node.child_by_field_name("target") else {
            return Step::Descend(scope.clone());
        };
        let Some(args) = child_of_kind(node, "arguments") else {
            return Step::Descend(scope.clone());
        };
        let first = named_children(args).into_iter().next();

        let (name, payload) = match sink.text(target) {
            "defmodule" => {
                let Some(alias) = first else {
                    sink.skip(node, "defmodule without name");
                    return Step::Descend(scope.clone());
                };
                (sink.text(alias).to_string(), Payload::module())
            }
            "defprotocol" => {
                let Some(alias) = first else {
                    sink.skip(node, "defprotocol without name");
                    return Step::Descend(scope.clone());
                };
                (
                    sink.text(alias).to_string(),
                    Payload::interface(Vec::new(), Vec::new()),
                )
            }
            "defimpl" => {
                let Some(alias) = first else {
                    sink.skip(node, "defimpl without protocol");
                    return Step::Descend(scope.clone());
                };
                let payload = Payload::Extension {
                    extended_type: keyword_value(args, "for", sink),
                    methods: Vec::new(),
                };
                (sink.text(alias).to_string(), payload)
            }
            "defstruct" => {
                // A struct takes the name of the module defining it.
                let Some(module) = scope.module else {
                    sink.skip(node, "defstruct outside a module");
                    return Step::Prune;
                };
                let name = sink.entity(module).name.clone();
                let fields = first.map(|f| struct_fields(f, sink)).unwrap_or_default();
                sink.emit(node, &name, Payload::structure(fields), scope);
                return Step::Prune;
            }
            "def" | "defp" | "defmacro" | "defmacrop" | "defdelegate" | "defguard" => {
                let Some(head) = first else {
                    sink.skip(node, "definition without head");
                    return Step::Descend(scope.clone());
                };
                let Some((name, parameters)) = function_head(head, sink) else {
                    sink.skip(node, "definition without name");
                    return Step::Descend(scope.clone());
                };
                (name, Payload::function(parameters, None))
            }
            _ => return Step::Descend(scope.clone()),
        };

        let r = sink.emit(node, &name, payload, scope);
        Step::Descend(scope.enter(sink, r))
    }
}

/// Name and argument text of `name(args)`, `name` or `name(args) when guard`.
fn function_head(head: Node<'_>, sink: &EntitySink<'_>) -> Option<(String, Option<String>)> {
    match head.kind() {
        "identifier" => Some((sink.text(head).to_string(), None)),
        "call" => {
            let target = head.child_by_field_name("target")?;
            let args = child_of_kind(head, "arguments").map(|a| sink.text(a).to_string());
            Some((sink.text(target).to_string(), args))
        }
        "binary_operator" => function_head(head.child_by_field_name("left")?, sink),
        _ => None,
    }
}

/// `[:a, b: 1]` and `a: 1, b: 2` field lists.
fn struct_fields(list: Node<'_>, sink: &EntitySink<'_>) -> Vec<String> {
    let mut fields = Vec::new();
    let mut stack = vec![list];
    while let Some(current) = stack.pop() {
        match current.kind() {
            "atom" => fields.push(sink.text(current).trim_start_matches(':').to_string()),
            "keyword" => fields.push(sink.text(current).trim().trim_end_matches(':').to_string()),
            "list" | "keywords" | "pair" => {
                let mut children = named_children(current);
                children.reverse();
                stack.extend(children);
            }
            _ => {}
        }
    }
    fields
}

/// Value of `key: value` in a call's keyword arguments.
fn keyword_value(args: Node<'_>, key: &str, sink: &EntitySink<'_>) -> Option<String> {
    let keywords = child_of_kind(args, "keywords")?;
    named_children(keywords).into_iter().find_map(|pair| {
        let k = pair.child_by_field_name("key")?;
        let k = sink.text(k).trim().trim_end_matches(':');
        if k != key {
            return None;
        }
        pair.child_by_field_name("value")
            .map(|v| sink.text(v).to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::entity::{EntityKind, Payload};
    use crate::language::Language;

    const SOURCE: &str = r#"
defmodule Shop.Cart do
  defstruct [:items, total: 0]

  def new, do: %__MODULE__{}

  def add(cart, item) when is_map(item) do
    %{cart | items: [item | cart.items]}
  end

  defp helper(x), do: x
end

defprotocol Describable do
  def describe(value)
end

defimpl Describable, for: Shop.Cart do
  def describe(_cart), do: "cart"
end
"#;

    #[test]
    fn test_elixir_entities() {
        let entities = extract(Language::Elixir, SOURCE);

        assert_eq!(names(&entities, EntityKind::Module), vec!["Shop.Cart"]);
        assert_eq!(names(&entities, EntityKind::Struct), vec!["Shop.Cart"]);
        assert_eq!(names(&entities, EntityKind::Interface), vec!["Describable"]);
        assert_eq!(names(&entities, EntityKind::Extension), vec!["Describable"]);
        assert_eq!(
            names(&entities, EntityKind::Function),
            vec!["new", "add", "helper", "describe", "describe"]
        );
        assert_within_recognized(Language::Elixir, &entities);
    }

    #[test]
    fn test_elixir_payloads() {
        let entities = extract(Language::Elixir, SOURCE);

        let cart = entities.find(EntityKind::Struct, "Shop.Cart").unwrap();
        assert_eq!(
            cart.payload,
            Payload::Struct {
                fields: vec!["items".to_string(), "total".to_string()],
                methods: vec![],
            }
        );

        let implementation = entities.find(EntityKind::Extension, "Describable").unwrap();
        assert_eq!(
            implementation.payload,
            Payload::Extension {
                extended_type: Some("Shop.Cart".to_string()),
                methods: vec!["describe".to_string()],
            }
        );

        let add = entities.find(EntityKind::Function, "add").unwrap();
        assert_eq!(
            entities.scope_of(add).map(|m| m.name.as_str()),
            Some("Shop.Cart")
        );
        assert!(!add.is_method());
    }
}
