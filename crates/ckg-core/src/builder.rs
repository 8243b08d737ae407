//! Run orchestration.
//!
//! A run walks the input root, hashes the discovered file set and either
//! reuses the database cached for that hash or builds a fresh one:
//!
//! ```text
//! Discovering → Hashing → CacheHit → Done
//!                       ↘ Parsing → Extracting → Storing → Done
//! ```
//!
//! Files are parsed and extracted on a rayon pool; results flow over a
//! bounded channel to a single writer that owns the run transaction. A file
//! that fails to read, parse or extract is recorded and skipped. The run
//! fails only when no file at all could be processed.
//!
//! ## Usage
//!
//! ```ignore
//! use ckg_core::builder::{CkgBuilder, RunRequest};
//!
//! let builder = CkgBuilder::from_config(&config)?;
//! let summary = builder.run(&RunRequest::new("path/to/repo"))?;
//! println!("{} entities in {}", summary.total_entities(), summary.database);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use ckg_config::{CkgConfig, ConfigError};
use crossbeam_channel::bounded;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, CachePolicy};
use crate::discovery::{DiscoveryError, DiscoveryOptions, FileDiscovery};
use crate::entity::{EntityKind, FileEntities};
use crate::extract::{ExtractOptions, ExtractorRegistry};
use crate::grammar::{ParseFailure, ParserPool, SyntaxErrorPolicy};
use crate::hasher::{file_digest, CodebaseHash, CodebaseHasher, CodebaseSnapshot, HashedFile};
use crate::language::{LanguageMap, UnknownLanguage};
use crate::store::{
    CkgDatabase, DatabaseLocation, RunMetadata, RunWriter, StorageEngine, StorageError,
    SCHEMA_VERSION,
};

// ============================================================================
// Errors
// ============================================================================

/// Errors that end a run without a usable database.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("No supported source files found in {0}")]
    NoFiles(PathBuf),

    #[error("None of the {} attempted files could be processed", .failures.len())]
    NoSuccessfulFiles { failures: Vec<FileFailure> },

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker pool failed: {0}")]
    ThreadPool(String),

    #[error("Invalid language configuration: {0}")]
    Language(#[from] UnknownLanguage),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Where a file dropped out of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Read,
    Parse,
    Timeout,
    Extract,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::Read => "read",
            FailureStage::Parse => "parse",
            FailureStage::Timeout => "timeout",
            FailureStage::Extract => "extract",
        })
    }
}

/// A file that produced no entities because of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    /// Path relative to the input root.
    pub path: String,
    pub stage: FailureStage,
    pub reason: String,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.path, self.stage, self.reason)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the run builder.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub discovery: DiscoveryOptions,
    /// Worker threads (0 = one per core)
    pub concurrency: usize,
    /// Soft per-file parse timeout
    pub file_timeout: Option<Duration>,
    pub syntax_errors: SyntaxErrorPolicy,
    pub extract: ExtractOptions,
    pub cache: CachePolicy,
    /// Database directory; relative paths are resolved against the input root
    pub output_dir: PathBuf,
    /// Registry file (default: `<output_dir>/registry.json`)
    pub registry_file: Option<PathBuf>,
    /// Extraction results buffered ahead of the writer
    pub channel_capacity: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryOptions::default(),
            concurrency: 0,
            file_timeout: Some(Duration::from_secs(10)),
            syntax_errors: SyntaxErrorPolicy::Reject,
            extract: ExtractOptions::default(),
            cache: CachePolicy::default(),
            output_dir: PathBuf::from(".ckg"),
            registry_file: None,
            channel_capacity: 64,
        }
    }
}

impl BuildConfig {
    pub fn from_config(config: &CkgConfig) -> Result<Self, RunError> {
        config.validate()?;
        let languages = LanguageMap::from_config(&config.languages)?;
        let analysis = &config.analysis;
        Ok(Self {
            discovery: DiscoveryOptions::from_config(analysis, languages)?,
            concurrency: analysis.concurrency,
            file_timeout: (analysis.file_timeout_ms > 0)
                .then(|| Duration::from_millis(analysis.file_timeout_ms)),
            syntax_errors: if analysis.tolerate_syntax_errors {
                SyntaxErrorPolicy::Tolerate
            } else {
                SyntaxErrorPolicy::Reject
            },
            extract: ExtractOptions {
                include_source_text: analysis.include_source_text,
                strict: analysis.strict,
            },
            cache: CachePolicy::from_config(&config.storage),
            output_dir: config.storage.output_dir.clone(),
            registry_file: config.storage.registry_file.clone(),
            ..Self::default()
        })
    }
}

/// What to analyze and where to put the result.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input_root: PathBuf,
    /// Overrides the configured output directory
    pub output_dir: Option<PathBuf>,
    /// Database file name (default: `<hash>.db`)
    pub database_name: Option<String>,
    /// Rebuild even when a cached database exists
    pub force: bool,
}

impl RunRequest {
    pub fn new(input_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_dir: None,
            database_name: None,
            force: false,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Run states, in the order a run passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Discovering,
    Hashing,
    CacheHit,
    Parsing,
    Extracting,
    Storing,
    Done,
    Failed,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub codebase_hash: CodebaseHash,
    pub database: DatabaseLocation,
    pub cache_hit: bool,
    /// States passed through, ending in `Done`.
    pub states: Vec<RunState>,
    pub files_discovered: usize,
    pub files_attempted: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub failures: Vec<FileFailure>,
    /// Rows per kind in the database, every kind present.
    pub entity_counts: BTreeMap<EntityKind, usize>,
    pub skipped_nodes: usize,
    /// Cached databases evicted when this one was recorded.
    pub evicted: Vec<CodebaseHash>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn total_entities(&self) -> usize {
        self.entity_counts.values().sum()
    }
}

fn full_counts(counts: &BTreeMap<EntityKind, usize>) -> BTreeMap<EntityKind, usize> {
    EntityKind::ALL
        .into_iter()
        .map(|kind| (kind, counts.get(&kind).copied().unwrap_or(0)))
        .collect()
}

/// Result of one file on its way to the writer.
struct FileOutcome {
    path: String,
    result: Result<FileEntities, FileFailure>,
}

/// Aggregated by the writer while the pipeline runs.
#[derive(Default)]
struct Tally {
    attempted: usize,
    succeeded: usize,
    skipped_nodes: usize,
    failures: Vec<FileFailure>,
}

// ============================================================================
// Builder
// ============================================================================

/// Runs the extraction pipeline.
pub struct CkgBuilder {
    config: BuildConfig,
    registry: ExtractorRegistry,
    hasher: CodebaseHasher,
    storage: StorageEngine,
}

impl CkgBuilder {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            registry: ExtractorRegistry::default(),
            hasher: CodebaseHasher::new(),
            storage: StorageEngine::new(),
        }
    }

    pub fn from_config(config: &CkgConfig) -> Result<Self, RunError> {
        Ok(Self::new(BuildConfig::from_config(config)?))
    }

    /// Replace the extractor registry.
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Execute one run.
    pub fn run(&self, request: &RunRequest) -> Result<RunSummary, RunError> {
        let start = Instant::now();
        let mut states = Vec::new();
        let result = self.run_states(request, &mut states, start);
        if let Err(ref e) = result {
            enter(&mut states, RunState::Failed);
            warn!("Run over {} failed: {}", request.input_root.display(), e);
        }
        result
    }

    fn run_states(
        &self,
        request: &RunRequest,
        states: &mut Vec<RunState>,
        start: Instant,
    ) -> Result<RunSummary, RunError> {
        enter(states, RunState::Discovering);
        let discovery = FileDiscovery::new(self.config.discovery.clone());
        let files = discovery.discover(&request.input_root)?;
        let input_root = request
            .input_root
            .canonicalize()
            .map_err(|e| DiscoveryError::Unreadable {
                path: request.input_root.clone(),
                reason: e.to_string(),
            })?;
        if files.is_empty() {
            return Err(RunError::NoFiles(input_root));
        }

        enter(states, RunState::Hashing);
        let snapshot = self.hasher.hash(files);

        let output_dir = self.output_dir(&input_root, request);
        let location = DatabaseLocation::new(output_dir.join(
            request
                .database_name
                .clone()
                .unwrap_or_else(|| format!("{}.db", snapshot.hash)),
        ));
        let cache = CacheManager::new(
            self.registry_path(&input_root, &output_dir),
            self.config.cache.clone(),
        );

        if !request.force {
            if let Some(summary) = self.reuse(&cache, &snapshot, states, start) {
                return Ok(summary);
            }
        }

        enter(states, RunState::Parsing);
        let mut writer = self.storage.begin_run(&location)?;
        enter(states, RunState::Extracting);
        let tally = self.extract_all(&snapshot, &mut writer)?;

        if tally.succeeded == 0 {
            writer.abort()?;
            return Err(RunError::NoSuccessfulFiles {
                failures: tally.failures,
            });
        }

        enter(states, RunState::Storing);
        let entity_counts = full_counts(writer.counts());
        let duration = start.elapsed();
        writer.write_run_metadata(&RunMetadata {
            codebase_hash: snapshot.hash.to_string(),
            input_root: input_root.display().to_string(),
            created_at: Utc::now(),
            schema_version: SCHEMA_VERSION,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            files_discovered: snapshot.len(),
            files_attempted: tally.attempted,
            files_succeeded: tally.succeeded,
            files_failed: tally.failures.len(),
            skipped_nodes: tally.skipped_nodes,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            failures: tally.failures.clone(),
            entity_counts: entity_counts.clone(),
        })?;
        let database = writer.commit()?;

        let evicted = match cache.record(&snapshot.hash, &database, &input_root) {
            Ok(evicted) => evicted,
            Err(e) => {
                warn!("Failed to record database in cache: {}", e);
                Vec::new()
            }
        };

        enter(states, RunState::Done);
        let summary = RunSummary {
            codebase_hash: snapshot.hash.clone(),
            database,
            cache_hit: false,
            states: states.clone(),
            files_discovered: snapshot.len(),
            files_attempted: tally.attempted,
            files_succeeded: tally.succeeded,
            files_failed: tally.failures.len(),
            failures: tally.failures,
            entity_counts,
            skipped_nodes: tally.skipped_nodes,
            evicted,
            duration: start.elapsed(),
        };
        info!(
            "Run complete: {} entities from {}/{} files in {:.2}s",
            summary.total_entities(),
            summary.files_succeeded,
            summary.files_attempted,
            summary.duration.as_secs_f64()
        );
        Ok(summary)
    }

    /// Serve the run from the cache, if a readable database exists.
    fn reuse(
        &self,
        cache: &CacheManager,
        snapshot: &CodebaseSnapshot,
        states: &mut Vec<RunState>,
        start: Instant,
    ) -> Option<RunSummary> {
        let location = cache.lookup(&snapshot.hash)?;
        let metadata = match CkgDatabase::open(&location).and_then(|db| db.run_metadata()) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Cached database {} unusable, rebuilding: {}", location, e);
                return None;
            }
        };

        enter(states, RunState::CacheHit);
        enter(states, RunState::Done);
        Some(RunSummary {
            codebase_hash: snapshot.hash.clone(),
            database: location,
            cache_hit: true,
            states: states.clone(),
            files_discovered: snapshot.len(),
            files_attempted: 0,
            files_succeeded: 0,
            files_failed: 0,
            failures: Vec::new(),
            entity_counts: full_counts(&metadata.entity_counts),
            skipped_nodes: 0,
            evicted: Vec::new(),
            duration: start.elapsed(),
        })
    }

    /// Parse and extract every file in parallel, inserting results as they arrive.
    fn extract_all(
        &self,
        snapshot: &CodebaseSnapshot,
        writer: &mut RunWriter,
    ) -> Result<Tally, RunError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency)
            .thread_name(|i| format!("ckg-worker-{}", i))
            .build()
            .map_err(|e| RunError::ThreadPool(e.to_string()))?;

        let parsers = ParserPool::new(self.config.syntax_errors, self.config.file_timeout);
        let mut languages: Vec<_> = snapshot.files.iter().map(|f| f.file.language).collect();
        languages.sort();
        languages.dedup();
        for err in parsers.warm(languages) {
            warn!("Grammar unavailable: {}", err);
        }

        info!(
            "Extracting {} files with {} workers",
            snapshot.len(),
            pool.current_num_threads()
        );
        let cancelled = AtomicBool::new(false);
        let (tx, rx) = bounded::<FileOutcome>(self.config.channel_capacity.max(1));
        let mut tally = Tally::default();

        let stored: Result<(), StorageError> = std::thread::scope(|s| {
            let producer = s.spawn(|| {
                pool.install(|| {
                    snapshot.files.par_iter().for_each_with(tx, |tx, file| {
                        if cancelled.load(Ordering::Relaxed) {
                            return;
                        }
                        let outcome = self.process_file(file, &parsers);
                        // The writer only hangs up after a storage error.
                        let _ = tx.send(outcome);
                    })
                })
            });

            let mut stored = Ok(());
            for outcome in rx {
                tally.attempted += 1;
                match outcome.result {
                    Ok(entities) => {
                        debug!("{}: {} entities", outcome.path, entities.len());
                        tally.skipped_nodes += entities.skipped;
                        if let Err(e) = writer.insert_entities(&entities) {
                            cancelled.store(true, Ordering::Relaxed);
                            stored = Err(e);
                            break;
                        }
                        tally.succeeded += 1;
                    }
                    Err(failure) => {
                        warn!("Skipping {}", failure);
                        tally.failures.push(failure);
                    }
                }
            }

            if producer.join().is_err() {
                warn!("Extraction worker pool panicked");
            }
            stored
        });
        stored?;

        tally.failures.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(tally)
    }

    /// Read, re-check, parse and extract one file.
    fn process_file(&self, hashed: &HashedFile, parsers: &ParserPool) -> FileOutcome {
        let path = hashed.file.relative_path.clone();
        let fail = |stage: FailureStage, reason: String| FileOutcome {
            path: path.clone(),
            result: Err(FileFailure {
                path: path.clone(),
                stage,
                reason,
            }),
        };

        if !hashed.readable {
            return fail(FailureStage::Read, "file could not be read".to_string());
        }
        let bytes = match std::fs::read(&hashed.file.path) {
            Ok(bytes) => bytes,
            Err(e) => return fail(FailureStage::Read, e.to_string()),
        };
        if file_digest(&path, &bytes) != hashed.digest {
            return fail(
                FailureStage::Read,
                "file changed after the codebase was hashed".to_string(),
            );
        }

        let language = hashed.file.language;
        let Some(extractor) = self.registry.get(language) else {
            return fail(
                FailureStage::Extract,
                format!("no extractor registered for {}", language),
            );
        };

        let extracted = catch_unwind(AssertUnwindSafe(|| {
            let tree = parsers.parse(language, &bytes).map_err(|e| {
                let stage = match e.failure {
                    ParseFailure::Timeout => FailureStage::Timeout,
                    _ => FailureStage::Parse,
                };
                (stage, e.to_string())
            })?;
            let source = std::str::from_utf8(&bytes)
                .map_err(|e| (FailureStage::Parse, e.to_string()))?;
            Ok::<_, (FailureStage, String)>(extractor.extract(
                &tree,
                source,
                &path,
                &self.config.extract,
            ))
        }));

        match extracted {
            Ok(Ok(entities)) => FileOutcome {
                path: path.clone(),
                result: Ok(entities),
            },
            Ok(Err((stage, reason))) => fail(stage, reason),
            Err(panic) => fail(
                FailureStage::Extract,
                format!("extractor panicked: {}", panic_message(panic.as_ref())),
            ),
        }
    }

    fn output_dir(&self, input_root: &Path, request: &RunRequest) -> PathBuf {
        let dir = request
            .output_dir
            .as_ref()
            .unwrap_or(&self.config.output_dir);
        if dir.is_absolute() {
            dir.clone()
        } else {
            input_root.join(dir)
        }
    }

    fn registry_path(&self, input_root: &Path, output_dir: &Path) -> PathBuf {
        match self.config.registry_file {
            Some(ref file) if file.is_absolute() => file.clone(),
            Some(ref file) => input_root.join(file),
            None => output_dir.join("registry.json"),
        }
    }
}

fn enter(states: &mut Vec<RunState>, state: RunState) {
    info!("Run state: {:?}", state);
    states.push(state);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
