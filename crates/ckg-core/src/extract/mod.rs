//! Per-language entity extraction.
//!
//! Every language implements [`Extractor`]: a table mapping syntax node kinds
//! to entity kinds, applied during one top-down traversal. Nested declarations
//! are emitted as flat records that point back at their enclosing entity
//! through [`Scope`], never embedded in it.

mod c;
mod cpp;
mod csharp;
mod dart;
mod ecmascript;
mod elixir;
mod gleam;
mod go;
mod java;
mod kotlin;
mod php;
mod python;
mod ruby;
mod rust;
mod scala;
mod sfc;
mod solidity;
mod swift;
mod zig;

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use thiserror::Error;
use tracing::warn;
use tree_sitter::Node;

use crate::entity::{Entity, EntityKind, EntityRef, FileEntities, Payload, Span};
use crate::grammar::SyntaxTree;
use crate::language::Language;

pub use c::CExtractor;
pub use cpp::CppExtractor;
pub use csharp::CSharpExtractor;
pub use dart::DartExtractor;
pub use ecmascript::{JavaScriptExtractor, TypeScriptExtractor};
pub use elixir::ElixirExtractor;
pub use gleam::GleamExtractor;
pub use go::GoExtractor;
pub use java::JavaExtractor;
pub use kotlin::KotlinExtractor;
pub use php::PhpExtractor;
pub use python::PythonExtractor;
pub use ruby::RubyExtractor;
pub use rust::RustExtractor;
pub use scala::ScalaExtractor;
pub use sfc::ComponentFileExtractor;
pub use solidity::SolidityExtractor;
pub use swift::SwiftExtractor;
pub use zig::ZigExtractor;

// ============================================================================
// Errors and options
// ============================================================================

/// A declaration shape that was recognized but could not be extracted.
///
/// Never fatal: the node is skipped and, in strict mode, logged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("skipped `{node_kind}` at bytes {}..{}: {reason}", .byte_range.start, .byte_range.end)]
pub struct ExtractionError {
    pub node_kind: String,
    pub byte_range: Range<usize>,
    pub reason: &'static str,
}

/// Options shared by all extractors for one run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Keep the raw source slice of each entity.
    pub include_source_text: bool,
    /// Log skipped shapes.
    pub strict: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            include_source_text: true,
            strict: false,
        }
    }
}

// ============================================================================
// Scope
// ============================================================================

/// Enclosing entities at a point of the traversal.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Innermost enclosing type.
    pub owner: Option<EntityRef>,
    /// Enclosing type name when the type is declared elsewhere.
    pub owner_name: Option<String>,
    /// Innermost enclosing module or namespace.
    pub module: Option<EntityRef>,
    /// Innermost enclosing function.
    pub function: Option<EntityRef>,
}

impl Scope {
    /// Scope inside the body of a type.
    pub fn enter_type(&self, owner: EntityRef) -> Scope {
        Scope {
            owner: Some(owner),
            owner_name: None,
            module: self.module,
            function: self.function,
        }
    }

    /// Scope inside a type body whose entity may live in another file.
    pub fn enter_named_type(&self, owner: Option<EntityRef>, name: String) -> Scope {
        Scope {
            owner,
            owner_name: Some(name),
            module: self.module,
            function: self.function,
        }
    }

    /// Scope inside a module or namespace body.
    pub fn enter_module(&self, module: EntityRef) -> Scope {
        Scope {
            owner: None,
            owner_name: None,
            module: Some(module),
            function: self.function,
        }
    }

    /// Scope inside a function body: locals belong to no type.
    pub fn enter_function(&self, function: EntityRef) -> Scope {
        Scope {
            owner: None,
            owner_name: None,
            module: self.module,
            function: Some(function),
        }
    }

    /// Enter the scope opened by a freshly emitted entity.
    pub fn enter(&self, sink: &EntitySink<'_>, entity: Option<EntityRef>) -> Scope {
        let Some(r) = entity else {
            return self.clone();
        };
        let kind = sink.entity(r).kind();
        if kind == EntityKind::Function {
            self.enter_function(r)
        } else if kind.is_scope() {
            self.enter_module(r)
        } else if kind.is_type_like() {
            self.enter_type(r)
        } else {
            self.clone()
        }
    }
}

/// What the traversal does after visiting a node.
#[derive(Debug, Clone)]
pub enum Step {
    /// Visit the children with this scope.
    Descend(Scope),
    /// Do not visit the children.
    Prune,
}

// ============================================================================
// Sink
// ============================================================================

/// Arena builder for the entities of one file.
pub struct EntitySink<'s> {
    file_path: &'s str,
    language: Language,
    source: &'s str,
    options: &'s ExtractOptions,
    entities: Vec<Entity>,
    taken: HashSet<(usize, usize)>,
    skipped: Vec<ExtractionError>,
}

impl<'s> EntitySink<'s> {
    pub fn new(
        file_path: &'s str,
        language: Language,
        source: &'s str,
        options: &'s ExtractOptions,
    ) -> Self {
        Self {
            file_path,
            language,
            source,
            options,
            entities: Vec::new(),
            taken: HashSet::new(),
            skipped: Vec::new(),
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn file_path(&self) -> &'s str {
        self.file_path
    }

    /// Source text of a node.
    pub fn text(&self, node: Node<'_>) -> &'s str {
        self.source
            .get(node.start_byte()..node.end_byte())
            .unwrap_or("")
    }

    pub fn entity(&self, r: EntityRef) -> &Entity {
        &self.entities[r.index()]
    }

    pub fn entity_mut(&mut self, r: EntityRef) -> &mut Entity {
        &mut self.entities[r.index()]
    }

    /// Emit an entity spanning `node`.
    ///
    /// Returns `None` (and records a skip) when the name is empty or the span
    /// already belongs to another entity of this file.
    pub fn emit(
        &mut self,
        node: Node<'_>,
        name: &str,
        payload: Payload,
        scope: &Scope,
    ) -> Option<EntityRef> {
        self.emit_span(node, Span::of(&node), name, payload, scope)
    }

    /// Emit an entity with an explicit span; `node` is used for diagnostics.
    pub fn emit_span(
        &mut self,
        node: Node<'_>,
        span: Span,
        name: &str,
        payload: Payload,
        scope: &Scope,
    ) -> Option<EntityRef> {
        let name = name.trim();
        if name.is_empty() {
            self.skip(node, "declaration has no name");
            return None;
        }
        if !self.taken.insert(span.key()) {
            self.skip(node, "span already produced an entity");
            return None;
        }

        let member_of_name = scope
            .owner
            .map(|r| self.entities[r.index()].name.clone())
            .or_else(|| scope.owner_name.clone());
        let body = self
            .options
            .include_source_text
            .then(|| self.source.get(span.start_byte..span.end_byte))
            .flatten()
            .map(str::to_string);

        let r = EntityRef(self.entities.len());
        self.entities.push(Entity {
            name: name.to_string(),
            file_path: self.file_path.to_string(),
            language: self.language,
            span,
            body,
            member_of: scope.owner,
            member_of_name,
            declared_in: scope.module,
            parent_function: scope.function,
            payload,
        });
        Some(r)
    }

    /// Record a recognized node that could not be turned into an entity.
    pub fn skip(&mut self, node: Node<'_>, reason: &'static str) {
        let err = ExtractionError {
            node_kind: node.kind().to_string(),
            byte_range: node.start_byte()..node.end_byte(),
            reason,
        };
        if self.options.strict {
            warn!(file = self.file_path, "{}", err);
        }
        self.skipped.push(err);
    }

    /// Entity emitted on exactly this byte range.
    pub fn at_span(&self, start_byte: usize, end_byte: usize) -> Option<EntityRef> {
        if !self.taken.contains(&(start_byte, end_byte)) {
            return None;
        }
        self.entities
            .iter()
            .rposition(|e| e.span.key() == (start_byte, end_byte))
            .map(EntityRef)
    }

    /// Most recently emitted type-like entity with this name.
    pub fn find_type(&self, name: &str) -> Option<EntityRef> {
        self.entities
            .iter()
            .rposition(|e| e.kind().is_type_like() && e.name == name)
            .map(EntityRef)
    }

    fn bind_named_owners(&mut self) {
        for index in 0..self.entities.len() {
            if self.entities[index].member_of.is_some() {
                continue;
            }
            let Some(name) = self.entities[index].member_of_name.as_deref() else {
                continue;
            };
            if let Some(owner) = self.find_type(name).filter(|o| o.index() != index) {
                self.entities[index].member_of = Some(owner);
            }
        }
    }

    pub fn skipped(&self) -> &[ExtractionError] {
        &self.skipped
    }

    /// Close the arena, back-filling owner method lists and scope members.
    ///
    /// Members whose owner was only named (a Go receiver or a Rust `impl`
    /// that appears before its type) are bound to the same-file type of that
    /// name, so the owner may sit at a higher arena index than the member.
    pub fn finish(mut self) -> FileEntities {
        self.bind_named_owners();

        let mut methods: Vec<(usize, String)> = Vec::new();
        let mut scoped: Vec<(usize, String)> = Vec::new();
        for entity in &self.entities {
            if entity.kind() == EntityKind::Function {
                if let Some(owner) = entity.member_of {
                    methods.push((owner.index(), entity.name.clone()));
                }
            }
            if entity.member_of.is_none() && entity.parent_function.is_none() {
                if let Some(scope) = entity.declared_in {
                    scoped.push((scope.index(), entity.name.clone()));
                }
            }
        }
        for (owner, name) in methods {
            self.entities[owner].payload.add_method(&name);
        }
        for (scope, name) in scoped {
            self.entities[scope].payload.add_scoped(&name);
        }

        FileEntities {
            file_path: self.file_path.to_string(),
            entities: self.entities,
            skipped: self.skipped.len(),
        }
    }
}

// ============================================================================
// Traversal
// ============================================================================

/// Top-down traversal with an explicit stack.
///
/// Children are visited in document order, so syntactically enclosing
/// entities always sit at lower arena indices than their members.
pub fn walk<'t, F>(root: Node<'t>, sink: &mut EntitySink<'_>, scope: Scope, visit: &mut F)
where
    F: FnMut(Node<'t>, &mut EntitySink<'_>, &Scope) -> Step,
{
    let mut stack: Vec<(Node<'t>, Scope)> = vec![(root, scope)];
    while let Some((node, scope)) = stack.pop() {
        match visit(node, sink, &scope) {
            Step::Prune => {}
            Step::Descend(inner) => {
                let mut cursor = node.walk();
                let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
                for child in children.into_iter().rev() {
                    stack.push((child, inner.clone()));
                }
            }
        }
    }
}

/// A language's node-kind → entity-kind table.
pub trait Extractor: Send + Sync {
    /// Language tag this extractor serves.
    fn language(&self) -> Language;

    /// Entity kinds this language can produce.
    fn recognized_kinds(&self) -> &'static [EntityKind];

    /// Visit one node: emit entities and choose how to continue.
    fn visit(&self, node: Node<'_>, sink: &mut EntitySink<'_>, scope: &Scope) -> Step;

    /// Extract all entities of one parsed file.
    fn extract(
        &self,
        tree: &SyntaxTree,
        source: &str,
        file_path: &str,
        options: &ExtractOptions,
    ) -> FileEntities {
        let mut sink = EntitySink::new(file_path, self.language(), source, options);
        walk(tree.root(), &mut sink, Scope::default(), &mut |node, sink, scope| {
            self.visit(node, sink, scope)
        });
        sink.finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Extractors registered by language tag.
pub struct ExtractorRegistry {
    extractors: HashMap<Language, Box<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self {
            extractors: HashMap::new(),
        };
        registry.register(Box::new(PythonExtractor));
        registry.register(Box::new(JavaScriptExtractor));
        registry.register(Box::new(TypeScriptExtractor::typescript()));
        registry.register(Box::new(TypeScriptExtractor::tsx()));
        registry.register(Box::new(RustExtractor));
        registry.register(Box::new(GoExtractor));
        registry.register(Box::new(CExtractor));
        registry.register(Box::new(CppExtractor));
        registry.register(Box::new(CSharpExtractor));
        registry.register(Box::new(JavaExtractor));
        registry.register(Box::new(RubyExtractor));
        registry.register(Box::new(PhpExtractor));
        registry.register(Box::new(SwiftExtractor));
        registry.register(Box::new(KotlinExtractor));
        registry.register(Box::new(ScalaExtractor));
        registry.register(Box::new(ElixirExtractor));
        registry.register(Box::new(ZigExtractor));
        registry.register(Box::new(SolidityExtractor));
        registry.register(Box::new(DartExtractor));
        registry.register(Box::new(GleamExtractor));
        registry.register(Box::new(ComponentFileExtractor::vue()));
        registry.register(Box::new(ComponentFileExtractor::svelte()));
        registry
    }
}

impl ExtractorRegistry {
    /// Register (or replace) the extractor for its language.
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.insert(extractor.language(), extractor);
    }

    pub fn get(&self, language: Language) -> Option<&dyn Extractor> {
        self.extractors.get(&language).map(|e| e.as_ref())
    }

    /// Registered languages, sorted.
    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.extractors.keys().copied().collect();
        languages.sort();
        languages
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

// ============================================================================
// Node helpers
// ============================================================================

/// Node kinds accepted as a declaration name when no `name` field exists.
const NAME_KINDS: &[&str] = &[
    "identifier",
    "type_identifier",
    "simple_identifier",
    "field_identifier",
    "property_identifier",
    "constant",
    "name",
    "alias",
];

/// Name of a declaration: the `name` field, else the first identifier-like child.
pub(crate) fn name_of<'s>(node: Node<'_>, sink: &EntitySink<'s>) -> Option<&'s str> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(sink.text(name));
    }
    first_child_of_kinds(node, NAME_KINDS).map(|n| sink.text(n))
}

/// First named child whose kind is one of `kinds`.
pub(crate) fn first_child_of_kinds<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|child| kinds.contains(&child.kind()));
    found
}

/// First named child of one kind.
pub(crate) fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    first_child_of_kinds(node, &[kind])
}

/// Named children of one kind.
pub(crate) fn children_of_kind<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .filter(|child| child.kind() == kind)
        .collect();
    found
}

/// Named children of a node.
pub(crate) fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).collect();
    found
}

/// Whether any child token (named or anonymous) has the given kind.
pub(crate) fn has_token(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|child| child.kind() == kind);
    found
}

/// Text of a field, if present.
pub(crate) fn field_text<'s>(node: Node<'_>, field: &str, sink: &EntitySink<'s>) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| sink.text(n).trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Body of a declaration: the `body` field, else a child whose kind ends with `_body`.
pub(crate) fn body_of(node: Node<'_>) -> Option<Node<'_>> {
    if let Some(body) = node.child_by_field_name("body") {
        return Some(body);
    }
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .find(|child| child.kind().ends_with("_body") || child.kind() == "declaration_list");
    found
}

/// Whether a subtree contains a node of one of `kinds`.
pub(crate) fn contains_kind(node: Node<'_>, kinds: &[&str]) -> bool {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if kinds.contains(&current.kind()) {
            return true;
        }
        let mut cursor = current.walk();
        stack.extend(current.named_children(&mut cursor));
    }
    false
}

/// Names of the named children of `container` whose kind is one of `kinds`.
pub(crate) fn member_names(container: Node<'_>, kinds: &[&str], sink: &EntitySink<'_>) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = container.walk();
    for child in container.named_children(&mut cursor) {
        if kinds.contains(&child.kind()) {
            if let Some(name) = name_of(child, sink) {
                let name = name.trim();
                if !name.is_empty() && !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

/// [`member_names`] over a declaration and its body-like children.
pub(crate) fn nested_member_names(
    node: Node<'_>,
    kinds: &[&str],
    sink: &EntitySink<'_>,
) -> Vec<String> {
    let mut names = member_names(node, kinds, sink);
    for child in named_children(node) {
        let kind = child.kind();
        if kind.ends_with("_body") || kind.ends_with("_list") || kind == "block" {
            for name in member_names(child, kinds, sink) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }
    names
}

/// Strip generic arguments, pointer markers and qualification from a type name.
pub(crate) fn base_type_name(text: &str) -> String {
    let trimmed = text.trim().trim_start_matches(['*', '&']).trim();
    let trimmed = trimmed.strip_prefix("mut ").unwrap_or(trimmed);
    let head = trimmed
        .split(['<', '[', '(', ' '])
        .next()
        .unwrap_or(trimmed);
    head.rsplit(['.', ':', '\\'])
        .next()
        .unwrap_or(head)
        .to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::grammar::{GrammarAdapter, SyntaxErrorPolicy};

    /// Parse and extract a source snippet.
    pub fn extract(language: Language, source: &str) -> FileEntities {
        let registry = ExtractorRegistry::default();
        let extractor = registry.get(language).expect("extractor registered");
        let mut adapter =
            GrammarAdapter::new(language, SyntaxErrorPolicy::Tolerate).expect("grammar loads");
        let tree = adapter.parse(source.as_bytes()).expect("parses");
        extractor.extract(&tree, source, "fixture", &ExtractOptions::default())
    }

    /// Names of entities of one kind, in document order.
    pub fn names(entities: &FileEntities, kind: EntityKind) -> Vec<String> {
        entities.of_kind(kind).map(|e| e.name.clone()).collect()
    }

    /// Name of the entity an entity is a member of.
    pub fn owner(entities: &FileEntities, kind: EntityKind, name: &str) -> Option<String> {
        let entity = entities.find(kind, name)?;
        entities.owner_of(entity).map(|o| o.name.clone())
    }

    /// Produced kinds must be a subset of the recognized kinds.
    pub fn assert_within_recognized(language: Language, entities: &FileEntities) {
        let registry = ExtractorRegistry::default();
        let recognized = registry.get(language).unwrap().recognized_kinds();
        for entity in &entities.entities {
            assert!(
                recognized.contains(&entity.kind()),
                "{} produced unrecognized kind {}",
                language,
                entity.kind()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_registry_covers_every_language() {
        let registry = ExtractorRegistry::default();
        assert_eq!(registry.languages(), Language::ALL.to_vec());
        for language in Language::ALL {
            let extractor = registry.get(language).unwrap();
            assert_eq!(extractor.language(), language);
            assert!(!extractor.recognized_kinds().is_empty());
        }
    }

    #[test]
    fn test_base_type_name() {
        assert_eq!(base_type_name("*Server"), "Server");
        assert_eq!(base_type_name("Vec<T>"), "Vec");
        assert_eq!(base_type_name("pkg.Handler"), "Handler");
        assert_eq!(base_type_name("ns::Widget"), "Widget");
        assert_eq!(base_type_name("List[T]"), "List");
    }

    #[test]
    fn test_natural_key_is_unique_per_file() {
        let entities = extract(
            Language::Python,
            "import os, sys\n\ndef f():\n    pass\n",
        );
        let mut keys: Vec<(usize, usize)> =
            entities.entities.iter().map(|e| e.span.key()).collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(names(&entities, EntityKind::Module), vec!["os", "sys"]);
    }

    #[test]
    fn test_body_text_toggle() {
        let source = "def f():\n    return 1\n";
        let registry = ExtractorRegistry::default();
        let mut adapter = crate::grammar::GrammarAdapter::new(
            Language::Python,
            crate::grammar::SyntaxErrorPolicy::Reject,
        )
        .unwrap();
        let tree = adapter.parse(source.as_bytes()).unwrap();
        let options = ExtractOptions {
            include_source_text: false,
            strict: true,
        };
        let entities = registry
            .get(Language::Python)
            .unwrap()
            .extract(&tree, source, "f.py", &options);
        assert_eq!(entities.len(), 1);
        assert!(entities.entities[0].body.is_none());
        assert_eq!(entities.entities[0].file_path, "f.py");
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let mut source = String::new();
        for depth in 0..150 {
            source.push_str(&" ".repeat(depth));
            source.push_str(&format!("def f{}():\n", depth));
        }
        source.push_str(&" ".repeat(150));
        source.push_str("pass\n");

        let entities = extract(Language::Python, &source);
        assert_eq!(entities.of_kind(EntityKind::Function).count(), 150);
        let innermost = entities.find(EntityKind::Function, "f149").unwrap();
        let parent = innermost.parent_function.map(|r| entities.entities[r.index()].name.clone());
        assert_eq!(parent.as_deref(), Some("f148"));
    }
}
