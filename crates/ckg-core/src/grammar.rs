//! Tree-Sitter grammar adapter.
//!
//! Wraps one tree-sitter parser per language behind a uniform
//! `parse(bytes) -> SyntaxTree | ParseError` contract. Vue and Svelte files
//! are parsed as single-file components: only their `<script>` blocks are fed
//! to the ECMAScript grammar (via included ranges), so every node offset stays
//! relative to the whole file.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use thiserror::Error;
use tree_sitter::{Node, Parser, Point, Tree};

use crate::language::Language;

// ============================================================================
// Errors
// ============================================================================

/// Why a file could not be turned into a syntax tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// The tree contains ERROR or MISSING nodes.
    Syntax,
    /// The source is not valid UTF-8.
    Encoding,
    /// The parser exceeded the per-file timeout.
    Timeout,
    /// The grammar could not be loaded or configured.
    Grammar,
}

/// A per-file parse failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "{language} parse error at bytes {start}..{end}{detail}",
    start = .byte_range.start,
    end = .byte_range.end,
    detail = render_diagnostic(.diagnostic)
)]
pub struct ParseError {
    pub language: Language,
    pub failure: ParseFailure,
    /// Offending byte range within the file.
    pub byte_range: Range<usize>,
    pub diagnostic: Option<String>,
}

fn render_diagnostic(diagnostic: &Option<String>) -> String {
    diagnostic
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

impl ParseError {
    fn grammar(language: Language, message: impl Into<String>) -> Self {
        Self {
            language,
            failure: ParseFailure::Grammar,
            byte_range: 0..0,
            diagnostic: Some(message.into()),
        }
    }

    fn encoding(language: Language, err: std::str::Utf8Error) -> Self {
        let start = err.valid_up_to();
        let end = start + err.error_len().unwrap_or(1);
        Self {
            language,
            failure: ParseFailure::Encoding,
            byte_range: start..end,
            diagnostic: Some("source is not valid UTF-8".to_string()),
        }
    }

    fn timeout(language: Language, len: usize, timeout: Option<Duration>) -> Self {
        let diagnostic = match timeout {
            Some(t) => format!("parse exceeded {} ms", t.as_millis()),
            None => "parse was cancelled".to_string(),
        };
        Self {
            language,
            failure: ParseFailure::Timeout,
            byte_range: 0..len,
            diagnostic: Some(diagnostic),
        }
    }

    fn syntax(language: Language, node: Node<'_>) -> Self {
        let pos = node.start_position();
        let diagnostic = if node.is_missing() {
            format!(
                "missing `{}` at line {}, column {}",
                node.kind(),
                pos.row + 1,
                pos.column
            )
        } else {
            format!("syntax error at line {}, column {}", pos.row + 1, pos.column)
        };
        Self {
            language,
            failure: ParseFailure::Syntax,
            byte_range: node.start_byte()..node.end_byte(),
            diagnostic: Some(diagnostic),
        }
    }
}

// ============================================================================
// Grammars
// ============================================================================

/// Get the tree-sitter grammar used for a language.
///
/// Single-file components resolve to JavaScript; the adapter switches to
/// TypeScript per file when the script block declares `lang="ts"`.
pub fn tree_sitter_language(language: Language) -> tree_sitter::Language {
    match language {
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::JavaScript | Language::Vue | Language::Svelte => {
            tree_sitter_javascript::LANGUAGE.into()
        }
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        Language::Go => tree_sitter_go::LANGUAGE.into(),
        Language::C => tree_sitter_c::LANGUAGE.into(),
        Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
        Language::CSharp => tree_sitter_c_sharp::LANGUAGE.into(),
        Language::Java => tree_sitter_java::LANGUAGE.into(),
        Language::Ruby => tree_sitter_ruby::LANGUAGE.into(),
        Language::Php => tree_sitter_php::LANGUAGE_PHP.into(),
        Language::Swift => tree_sitter_swift::LANGUAGE.into(),
        Language::Kotlin => tree_sitter_kotlin_ng::LANGUAGE.into(),
        Language::Scala => tree_sitter_scala::LANGUAGE.into(),
        Language::Elixir => tree_sitter_elixir::LANGUAGE.into(),
        Language::Zig => tree_sitter_zig::LANGUAGE.into(),
        Language::Solidity => tree_sitter_solidity::LANGUAGE.into(),
        Language::Dart => tree_sitter_dart::LANGUAGE.into(),
        Language::Gleam => tree_sitter_gleam::LANGUAGE.into(),
    }
}

// ============================================================================
// Single-file components
// ============================================================================

/// Block layout of a Vue or Svelte file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SfcLayout {
    /// Byte ranges of `<script>` contents, in file order.
    pub scripts: Vec<Range<usize>>,
    /// Whether any script block is TypeScript.
    pub typescript: bool,
    /// Byte range of the markup (Vue `<template>` contents, Svelte markup).
    pub template: Option<Range<usize>>,
}

fn script_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<script\b([^>]*)>(.*?)</script\s*>"#).expect("valid script regex")
    })
}

fn style_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<style\b[^>]*>.*?</style\s*>"#).expect("valid style regex")
    })
}

fn template_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<template\b[^>]*>(.*)</template\s*>"#).expect("valid template regex")
    })
}

fn ts_lang_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\blang\s*=\s*["']?(ts|typescript)\b"#).expect("valid lang regex")
    })
}

impl SfcLayout {
    /// Locate the script and markup blocks of a component file.
    pub fn scan(source: &str, language: Language) -> Self {
        let mut layout = SfcLayout::default();

        for caps in script_regex().captures_iter(source) {
            if let (Some(attrs), Some(body)) = (caps.get(1), caps.get(2)) {
                if ts_lang_regex().is_match(attrs.as_str()) {
                    layout.typescript = true;
                }
                if !body.as_str().trim().is_empty() {
                    layout.scripts.push(body.start()..body.end());
                }
            }
        }

        layout.template = match language {
            Language::Vue => template_regex()
                .captures(source)
                .and_then(|caps| caps.get(1))
                .map(|m| m.start()..m.end()),
            _ => markup_range(source),
        };

        layout
    }
}

/// Markup of a Svelte file: what remains outside script and style blocks,
/// reported as the span from the first to the last markup byte.
fn markup_range(source: &str) -> Option<Range<usize>> {
    let mut blocked: Vec<Range<usize>> = script_regex()
        .find_iter(source)
        .chain(style_regex().find_iter(source))
        .map(|m| m.start()..m.end())
        .collect();
    blocked.sort_by_key(|r| r.start);

    let mut first = None;
    let mut last = 0;
    let mut cursor = 0;
    for block in blocked.iter().chain(std::iter::once(&(source.len()..source.len()))) {
        if block.start > cursor {
            let gap = &source[cursor..block.start];
            if let Some(offset) = gap.find(|c: char| !c.is_whitespace()) {
                first.get_or_insert(cursor + offset);
                last = cursor + gap.trim_end().len();
            }
        }
        cursor = cursor.max(block.end);
    }

    first.map(|start| start..last)
}

fn point_at(source: &str, byte: usize) -> Point {
    let before = &source[..byte];
    let row = before.matches('\n').count();
    let column = before.rfind('\n').map(|i| byte - i - 1).unwrap_or(byte);
    Point::new(row, column)
}

// ============================================================================
// Syntax trees
// ============================================================================

/// A parsed file.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    pub language: Language,
    pub tree: Tree,
    /// Block layout for single-file components.
    pub sfc: Option<SfcLayout>,
}

impl SyntaxTree {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// First ERROR or MISSING node in document order.
    pub fn first_error(&self) -> Option<Node<'_>> {
        let root = self.tree.root_node();
        if !root.has_error() {
            return None;
        }
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.is_error() || node.is_missing() {
                return Some(node);
            }
            if node.has_error() {
                let mut cursor = node.walk();
                let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
                stack.extend(children.into_iter().rev());
            }
        }
        Some(root)
    }
}

/// What to do with trees that contain syntax errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyntaxErrorPolicy {
    /// Fail the file with a ParseError.
    #[default]
    Reject,
    /// Hand the partial tree to the extractor.
    Tolerate,
}

// ============================================================================
// Adapter
// ============================================================================

/// Parser for one language, reusable across files.
pub struct GrammarAdapter {
    language: Language,
    parser: Parser,
    /// TypeScript parser for component files with `lang="ts"` scripts.
    ts_parser: Option<Parser>,
    policy: SyntaxErrorPolicy,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for GrammarAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammarAdapter")
            .field("language", &self.language)
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn new_parser(language: Language, grammar: &tree_sitter::Language) -> Result<Parser, ParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(grammar)
        .map_err(|e| ParseError::grammar(language, e.to_string()))?;
    Ok(parser)
}

impl GrammarAdapter {
    /// Create an adapter for the given language.
    pub fn new(language: Language, policy: SyntaxErrorPolicy) -> Result<Self, ParseError> {
        let parser = new_parser(language, &tree_sitter_language(language))?;
        let ts_parser = if language.is_single_file_component() {
            Some(new_parser(
                language,
                &tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            )?)
        } else {
            None
        };

        Ok(Self {
            language,
            parser,
            ts_parser,
            policy,
            timeout: None,
        })
    }

    /// Get the language this adapter parses.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Set the soft per-file timeout.
    #[allow(deprecated)]
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        let micros = timeout
            .map(|t| u64::try_from(t.as_micros()).unwrap_or(u64::MAX).max(1))
            .unwrap_or(0);
        self.parser.set_timeout_micros(micros);
        if let Some(ref mut ts) = self.ts_parser {
            ts.set_timeout_micros(micros);
        }
        self.timeout = timeout;
    }

    /// Parse a source buffer into a syntax tree.
    pub fn parse(&mut self, source: &[u8]) -> Result<SyntaxTree, ParseError> {
        let text =
            std::str::from_utf8(source).map_err(|e| ParseError::encoding(self.language, e))?;

        let (tree, sfc) = if self.language.is_single_file_component() {
            let layout = SfcLayout::scan(text, self.language);
            let tree = self.parse_component(text, &layout)?;
            (tree, Some(layout))
        } else {
            let tree = self.parser.parse(text, None);
            (self.finish_parse(tree, text.len())?, None)
        };

        let syntax = SyntaxTree {
            language: self.language,
            tree,
            sfc,
        };

        if self.policy == SyntaxErrorPolicy::Reject {
            if let Some(node) = syntax.first_error() {
                return Err(ParseError::syntax(self.language, node));
            }
        }

        Ok(syntax)
    }

    fn parse_component(&mut self, text: &str, layout: &SfcLayout) -> Result<Tree, ParseError> {
        let language = self.language;
        let parser = match (layout.typescript, self.ts_parser.as_mut()) {
            (true, Some(ts)) => ts,
            _ => &mut self.parser,
        };

        if layout.scripts.is_empty() {
            let tree = parser.parse("", None);
            return match tree {
                Some(tree) => Ok(tree),
                None => Err(ParseError::timeout(language, text.len(), self.timeout)),
            };
        }

        let ranges: Vec<tree_sitter::Range> = layout
            .scripts
            .iter()
            .map(|r| tree_sitter::Range {
                start_byte: r.start,
                end_byte: r.end,
                start_point: point_at(text, r.start),
                end_point: point_at(text, r.end),
            })
            .collect();

        parser
            .set_included_ranges(&ranges)
            .map_err(|e| ParseError::grammar(language, format!("{:?}", e)))?;
        let tree = parser.parse(text, None);
        parser
            .set_included_ranges(&[])
            .map_err(|e| ParseError::grammar(language, format!("{:?}", e)))?;

        match tree {
            Some(tree) => Ok(tree),
            None => {
                parser.reset();
                Err(ParseError::timeout(language, text.len(), self.timeout))
            }
        }
    }

    fn finish_parse(&mut self, tree: Option<Tree>, len: usize) -> Result<Tree, ParseError> {
        match tree {
            Some(tree) => Ok(tree),
            None => {
                self.parser.reset();
                Err(ParseError::timeout(self.language, len, self.timeout))
            }
        }
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Lends grammar adapters to worker threads for the duration of a run.
///
/// Each language's grammar is loaded once up front; adapters are created
/// lazily per concurrent worker and recycled.
pub struct ParserPool {
    policy: SyntaxErrorPolicy,
    timeout: Option<Duration>,
    idle: Mutex<HashMap<Language, Vec<GrammarAdapter>>>,
}

impl ParserPool {
    pub fn new(policy: SyntaxErrorPolicy, timeout: Option<Duration>) -> Self {
        Self {
            policy,
            timeout,
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Construct one adapter for each language up front.
    ///
    /// Returns the languages whose grammar failed to load.
    pub fn warm(&self, languages: impl IntoIterator<Item = Language>) -> Vec<ParseError> {
        let mut failures = Vec::new();
        for language in languages {
            if self
                .idle
                .lock()
                .get(&language)
                .is_some_and(|adapters| !adapters.is_empty())
            {
                continue;
            }
            match self.create(language) {
                Ok(adapter) => self.release(adapter),
                Err(e) => failures.push(e),
            }
        }
        failures
    }

    fn create(&self, language: Language) -> Result<GrammarAdapter, ParseError> {
        let mut adapter = GrammarAdapter::new(language, self.policy)?;
        adapter.set_timeout(self.timeout);
        Ok(adapter)
    }

    fn release(&self, adapter: GrammarAdapter) {
        self.idle
            .lock()
            .entry(adapter.language())
            .or_default()
            .push(adapter);
    }

    /// Parse a buffer with a pooled adapter.
    pub fn parse(&self, language: Language, source: &[u8]) -> Result<SyntaxTree, ParseError> {
        let pooled = self
            .idle
            .lock()
            .get_mut(&language)
            .and_then(|adapters| adapters.pop());
        let mut adapter = match pooled {
            Some(adapter) => adapter,
            None => self.create(language)?,
        };

        let result = adapter.parse(source);
        self.release(adapter);
        result
    }
}
