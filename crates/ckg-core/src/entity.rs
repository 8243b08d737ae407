//! Entity model for the code knowledge graph.
//!
//! Entities are flat records. Nesting is expressed through back-references
//! into the arena of the file that produced them, never through ownership:
//!
//! - **member of**: method/field → innermost enclosing type
//! - **declared in**: entity → innermost enclosing module or namespace
//! - **parent function**: nested function → enclosing function
//!
//! Within a run an entity is identified by `(file_path, span)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::language::Language;

// ============================================================================
// Entity kinds
// ============================================================================

/// The fourteen entity kinds. Run metadata is the fifteenth table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Function,
    Class,
    Struct,
    Enum,
    Interface,
    Trait,
    Module,
    Namespace,
    Contract,
    Component,
    TypeAlias,
    Extension,
    Union,
    GenericType,
}

impl EntityKind {
    /// All kinds, in table order.
    pub const ALL: [EntityKind; 14] = [
        EntityKind::Function,
        EntityKind::Class,
        EntityKind::Struct,
        EntityKind::Enum,
        EntityKind::Interface,
        EntityKind::Trait,
        EntityKind::Module,
        EntityKind::Namespace,
        EntityKind::Contract,
        EntityKind::Component,
        EntityKind::TypeAlias,
        EntityKind::Extension,
        EntityKind::Union,
        EntityKind::GenericType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Function => "function",
            EntityKind::Class => "class",
            EntityKind::Struct => "struct",
            EntityKind::Enum => "enum",
            EntityKind::Interface => "interface",
            EntityKind::Trait => "trait",
            EntityKind::Module => "module",
            EntityKind::Namespace => "namespace",
            EntityKind::Contract => "contract",
            EntityKind::Component => "component",
            EntityKind::TypeAlias => "type_alias",
            EntityKind::Extension => "extension",
            EntityKind::Union => "union",
            EntityKind::GenericType => "generic_type",
        }
    }

    /// Table holding entities of this kind.
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Function => "functions",
            EntityKind::Class => "classes",
            EntityKind::Struct => "structs",
            EntityKind::Enum => "enums",
            EntityKind::Interface => "interfaces",
            EntityKind::Trait => "traits",
            EntityKind::Module => "modules",
            EntityKind::Namespace => "namespaces",
            EntityKind::Contract => "contracts",
            EntityKind::Component => "components",
            EntityKind::TypeAlias => "type_aliases",
            EntityKind::Extension => "extensions",
            EntityKind::Union => "unions",
            EntityKind::GenericType => "generic_types",
        }
    }

    /// Kinds that can own methods or fields.
    pub fn is_type_like(&self) -> bool {
        matches!(
            self,
            EntityKind::Class
                | EntityKind::Struct
                | EntityKind::Enum
                | EntityKind::Interface
                | EntityKind::Trait
                | EntityKind::Contract
                | EntityKind::Component
                | EntityKind::Extension
                | EntityKind::Union
        )
    }

    /// Kinds that scope their declarations ("declared in" targets).
    pub fn is_scope(&self) -> bool {
        matches!(self, EntityKind::Module | EntityKind::Namespace)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.table_name() == s)
            .ok_or_else(|| format!("unknown entity kind '{}'", s))
    }
}

// ============================================================================
// Spans and references
// ============================================================================

/// Source location of an entity.
///
/// Lines are 1-based, columns are 0-based byte columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Span {
    /// Span of a syntax node.
    pub fn of(node: &tree_sitter::Node<'_>) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: start.row + 1,
            start_column: start.column,
            end_line: end.row + 1,
            end_column: end.column,
        }
    }

    /// Span from the start of `first` to the end of `last`.
    pub fn between(first: &tree_sitter::Node<'_>, last: &tree_sitter::Node<'_>) -> Self {
        let start = Self::of(first);
        let end = Self::of(last);
        Self {
            start_byte: start.start_byte,
            end_byte: end.end_byte,
            start_line: start.start_line,
            start_column: start.start_column,
            end_line: end.end_line,
            end_column: end.end_column,
        }
    }

    /// Span covering a whole source buffer.
    pub fn whole(source: &str) -> Self {
        let end_line = source.matches('\n').count() + 1;
        let end_column = source.rsplit('\n').next().map(str::len).unwrap_or(0);
        Self {
            start_byte: 0,
            end_byte: source.len(),
            start_line: 1,
            start_column: 0,
            end_line,
            end_column,
        }
    }

    /// The natural-key component of this span.
    pub fn key(&self) -> (usize, usize) {
        (self.start_byte, self.end_byte)
    }
}

/// Index of an entity in its file's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef(pub usize);

impl EntityRef {
    pub fn index(self) -> usize {
        self.0
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Kind-specific attributes. The variant determines the entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Function {
        parameters: Option<String>,
        return_type: Option<String>,
    },
    Class {
        fields: Vec<String>,
        methods: Vec<String>,
    },
    Struct {
        fields: Vec<String>,
        methods: Vec<String>,
    },
    Enum {
        variants: Vec<String>,
    },
    Interface {
        methods: Vec<String>,
        properties: Vec<String>,
    },
    Trait {
        methods: Vec<String>,
        associated_types: Vec<String>,
    },
    Module {
        exports: Vec<String>,
    },
    Namespace {
        members: Vec<String>,
    },
    Contract {
        functions: Vec<String>,
        events: Vec<String>,
        modifiers: Vec<String>,
        state_variables: Vec<String>,
    },
    Component {
        props: Vec<String>,
        methods: Vec<String>,
        template: Option<String>,
    },
    TypeAlias {
        target_type: Option<String>,
    },
    Extension {
        extended_type: Option<String>,
        methods: Vec<String>,
    },
    Union {
        fields: Vec<String>,
    },
    GenericType {
        type_parameters: Option<String>,
        constraints: Option<String>,
    },
}

impl Payload {
    pub fn kind(&self) -> EntityKind {
        match self {
            Payload::Function { .. } => EntityKind::Function,
            Payload::Class { .. } => EntityKind::Class,
            Payload::Struct { .. } => EntityKind::Struct,
            Payload::Enum { .. } => EntityKind::Enum,
            Payload::Interface { .. } => EntityKind::Interface,
            Payload::Trait { .. } => EntityKind::Trait,
            Payload::Module { .. } => EntityKind::Module,
            Payload::Namespace { .. } => EntityKind::Namespace,
            Payload::Contract { .. } => EntityKind::Contract,
            Payload::Component { .. } => EntityKind::Component,
            Payload::TypeAlias { .. } => EntityKind::TypeAlias,
            Payload::Extension { .. } => EntityKind::Extension,
            Payload::Union { .. } => EntityKind::Union,
            Payload::GenericType { .. } => EntityKind::GenericType,
        }
    }

    pub fn function(parameters: Option<String>, return_type: Option<String>) -> Self {
        Payload::Function {
            parameters,
            return_type,
        }
    }

    pub fn class(fields: Vec<String>) -> Self {
        Payload::Class {
            fields,
            methods: Vec::new(),
        }
    }

    pub fn structure(fields: Vec<String>) -> Self {
        Payload::Struct {
            fields,
            methods: Vec::new(),
        }
    }

    pub fn enumeration(variants: Vec<String>) -> Self {
        Payload::Enum { variants }
    }

    pub fn interface(methods: Vec<String>, properties: Vec<String>) -> Self {
        Payload::Interface {
            methods,
            properties,
        }
    }

    pub fn module() -> Self {
        Payload::Module {
            exports: Vec::new(),
        }
    }

    pub fn namespace() -> Self {
        Payload::Namespace {
            members: Vec::new(),
        }
    }

    pub fn type_alias(target_type: Option<String>) -> Self {
        Payload::TypeAlias { target_type }
    }

    pub fn generic(type_parameters: Option<String>, constraints: Option<String>) -> Self {
        Payload::GenericType {
            type_parameters,
            constraints,
        }
    }

    /// Record a member function name on an owning payload.
    ///
    /// Returns false when this kind keeps no method list.
    pub fn add_method(&mut self, name: &str) -> bool {
        let list = match self {
            Payload::Class { methods, .. }
            | Payload::Struct { methods, .. }
            | Payload::Interface { methods, .. }
            | Payload::Trait { methods, .. }
            | Payload::Component { methods, .. }
            | Payload::Extension { methods, .. } => methods,
            Payload::Contract { functions, .. } => functions,
            _ => return false,
        };
        push_unique(list, name);
        true
    }

    /// Record a declaration on a module or namespace payload.
    pub fn add_scoped(&mut self, name: &str) -> bool {
        match self {
            Payload::Module { exports } => push_unique(exports, name),
            Payload::Namespace { members } => push_unique(members, name),
            _ => return false,
        }
        true
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|existing| existing == name) {
        list.push(name.to_string());
    }
}

// ============================================================================
// Entities
// ============================================================================

/// One extracted structural fact about a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub file_path: String,
    pub language: Language,
    pub span: Span,
    /// Raw source slice, when enabled for the run.
    pub body: Option<String>,
    /// Innermost enclosing type in the same file.
    pub member_of: Option<EntityRef>,
    /// Name of the enclosing type, also set when the type lives elsewhere
    /// (Rust `impl` blocks, Go receivers, out-of-class C++ definitions).
    pub member_of_name: Option<String>,
    /// Innermost enclosing module or namespace.
    pub declared_in: Option<EntityRef>,
    /// Enclosing function for nested functions and local types.
    pub parent_function: Option<EntityRef>,
    pub payload: Payload,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    /// Whether this is a function bound to a type.
    pub fn is_method(&self) -> bool {
        self.kind() == EntityKind::Function && self.member_of_name.is_some()
    }
}

/// All entities extracted from one file.
///
/// Back-references index into `entities`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntities {
    pub file_path: String,
    pub entities: Vec<Entity>,
    /// Declaration shapes the extractor recognized but could not use.
    pub skipped: usize,
}

impl FileEntities {
    pub fn get(&self, r: EntityRef) -> Option<&Entity> {
        self.entities.get(r.index())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities of one kind, in document order.
    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(move |e| e.kind() == kind)
    }

    /// First entity of a kind with the given name.
    pub fn find(&self, kind: EntityKind, name: &str) -> Option<&Entity> {
        self.of_kind(kind).find(|e| e.name == name)
    }

    /// Resolve the "member of" reference of an entity.
    pub fn owner_of(&self, entity: &Entity) -> Option<&Entity> {
        entity.member_of.and_then(|r| self.get(r))
    }

    /// Resolve the "declared in" reference of an entity.
    pub fn scope_of(&self, entity: &Entity) -> Option<&Entity> {
        entity.declared_in.and_then(|r| self.get(r))
    }
}
