//! CKG Core - code knowledge graphs from source trees
//!
//! This crate turns a directory of source code into a SQLite database of
//! code entities (functions, classes, structs, interfaces, ...):
//! - File discovery honoring ignore files and exclusion patterns
//! - Content hashing of the whole file set, keying a database cache
//! - Tree-sitter parsing and per-language entity extraction
//! - Atomic publication of one database per run
//! - A read-only query surface over published databases

pub mod builder;
pub mod cache;
pub mod discovery;
pub mod entity;
pub mod extract;
pub mod grammar;
pub mod hasher;
pub mod language;
pub mod store;

// Run orchestration re-exports
pub use builder::{
    BuildConfig, CkgBuilder, FailureStage, FileFailure, RunError, RunRequest, RunState,
    RunSummary,
};

// Entity model re-exports
pub use entity::{Entity, EntityKind, EntityRef, FileEntities, Payload, Span};
pub use language::{Language, LanguageMap, UnknownLanguage};

// Pipeline stage re-exports
pub use cache::{CacheError, CacheManager, CachePolicy};
pub use discovery::{DiscoveredFile, DiscoveryError, DiscoveryOptions, FileDiscovery};
pub use extract::{ExtractOptions, Extractor, ExtractorRegistry};
pub use grammar::{ParseError, ParseFailure, ParserPool, SyntaxErrorPolicy};
pub use hasher::{CodebaseHash, CodebaseHasher, CodebaseSnapshot};

// Storage re-exports
pub use store::{
    CkgDatabase, DatabaseLocation, EntityRecord, FunctionScope, RunMetadata, StorageError,
    SCHEMA_VERSION,
};
