//! Solidity: contracts and libraries, interfaces, structs, enums and functions.

use tree_sitter::Node;

use super::{
    children_of_kind, field_text, name_of, nested_member_names, EntitySink, Extractor, Scope, Step,
};
use crate::entity::{EntityKind, Payload};
use crate::language::Language;

pub struct SolidityExtractor;

const KINDS: &[EntityKind] = &[
    EntityKind::Contract,
    EntityKind::Interface,
    EntityKind::Struct,
    EntityKind::Enum,
    EntityKind::Function,
];

impl Extractor for SolidityExtractor {
    fn language(&self) -> Language {
        Language::Solidity
    }

    fn recognized_kinds(&self) -> &'static [EntityKind] {
        KINDS
    }

    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step {
        let (name, payload) = match node.kind() {
            "contract_declaration" | "library_declaration" => {
                let body = node.child_by_field_name("body").unwrap_or(node);
                let payload = Payload::Contract {
                    functions: Vec::new(),
                    events: nested_member_names(body, &["event_definition"], sink),
                    modifiers: nested_member_names(body, &["modifier_definition"], sink),
                    state_variables: nested_member_names(body, &["state_variable_declaration"], sink),
                };
                (name_of(node, sink), payload)
            }
            "interface_declaration" => (
                name_of(node, sink),
                Payload::interface(Vec::new(), Vec::new()),
            ),
            "struct_declaration" => (
                name_of(node, sink),
                Payload::structure(nested_member_names(node, &["struct_member"], sink)),
            ),
            "enum_declaration" => (
                name_of(node, sink),
                Payload::enumeration(nested_member_names(node, &["enum_value"], sink)),
            ),
            "function_definition" => (
                name_of(node, sink),
                Payload::function(parameters(node, sink), field_text(node, "return_type", sink)),
            ),
            "constructor_definition" => (
                Some("constructor"),
                Payload::function(parameters(node, sink), None),
            ),
            _ => return Step::Descend(scope.clone()),
        };

        let Some(name) = name else {
            sink.skip(node, "declaration without name");
            return Step::Descend(scope.clone());
        };
        let r = sink.emit(node, name, payload, scope);
        Step::Descend(scope.enter(sink, r))
    }
}

/// Parameter list text; the grammar lists parameters as direct children.
fn parameters(node: Node<'_>, sink: &EntitySink<'_>) -> Option<String> {
    let params: Vec<&str> = children_of_kind(node, "parameter")
        .into_iter()
        .map(|p| sink.text(p))
        .collect();
    Some(format!("({})", params.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::entity::{EntityKind, Payload};
    use crate::language::Language;

    const SOURCE: &str = r#"
pragma solidity ^0.8.0;

interface IToken {
    function transfer(address to, uint256 amount) external returns (bool);
}

contract Token is IToken {
    struct Account { uint256 balance; bool frozen; }
    enum State { Active, Paused }

    mapping(address => uint256) public balances;
    uint256 public supply;

    event Transfer(address indexed from, address indexed to, uint256 value);

    modifier onlyActive() { _; }

    constructor() { supply = 0; }

    function transfer(address to, uint256 amount) external onlyActive returns (bool) {
        return true;
    }
}

library SafeMath {
    function add(uint a, uint b) internal pure returns (uint) { return a + b; }
}
"#;

    #[test]
    fn test_solidity_entities() {
        let entities = extract(Language::Solidity, SOURCE);

        assert_eq!(names(&entities, EntityKind::Interface), vec!["IToken"]);
        assert_eq!(
            names(&entities, EntityKind::Contract),
            vec!["Token", "SafeMath"]
        );
        assert_eq!(names(&entities, EntityKind::Struct), vec!["Account"]);
        assert_eq!(names(&entities, EntityKind::Enum), vec!["State"]);
        assert_eq!(
            names(&entities, EntityKind::Function),
            vec!["transfer", "constructor", "transfer", "add"]
        );
        assert_within_recognized(Language::Solidity, &entities);
    }

    #[test]
    fn test_contract_payload() {
        let entities = extract(Language::Solidity, SOURCE);
        let token = entities.find(EntityKind::Contract, "Token").unwrap();
        let Payload::Contract {
            functions,
            events,
            modifiers,
            state_variables,
        } = &token.payload
        else {
            panic!("contract payload expected");
        };
        assert_eq!(functions, &vec!["constructor".to_string(), "transfer".to_string()]);
        assert_eq!(events, &vec!["Transfer".to_string()]);
        assert_eq!(modifiers, &vec!["onlyActive".to_string()]);
        assert_eq!(
            state_variables,
            &vec!["balances".to_string(), "supply".to_string()]
        );
    }
}
