//! SQLite storage for run databases.
//!
//! Every run writes one complete database. Entities are inserted into a
//! staging file inside a single transaction, and the file is renamed onto
//! its final location only after the transaction commits, so a reader sees
//! either the previous database or the whole new one.
//!
//! - [`schema`]: table definitions
//! - [`writer`]: [`StorageEngine`] and [`RunWriter`], the write path
//! - [`query`]: [`CkgDatabase`], the read-only query surface

pub mod schema;
mod query;
mod writer;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::FileFailure;
use crate::entity::EntityKind;

pub use query::{CkgDatabase, EntityRecord, FunctionScope};
pub use schema::SCHEMA_VERSION;
pub use writer::{RunWriter, StorageEngine};

/// Errors that can occur while writing or reading a run database.
///
/// Any of them during a run is fatal: no partial database is published.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to publish database {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersion { expected: u32, found: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Where a run database lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseLocation(PathBuf);

impl DatabaseLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn exists(&self) -> bool {
        self.0.is_file()
    }

    /// Private file one run writes before publishing.
    ///
    /// Every call yields a fresh name, so concurrent runs targeting the same
    /// location never share a staging file.
    pub(crate) fn staging_path(&self) -> PathBuf {
        unique_sibling(&self.0, "staging")
    }
}

static SIBLING_SEQ: AtomicU64 = AtomicU64::new(0);

/// `<name>.<tag>-<pid>-<seq>` next to `path`, unique within this process
/// and distinct from other processes' names.
pub(crate) fn unique_sibling(path: &Path, tag: &str) -> PathBuf {
    let seq = SIBLING_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}-{}-{}", tag, std::process::id(), seq));
    path.with_file_name(name)
}

impl fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for DatabaseLocation {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// The run metadata row of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub codebase_hash: String,
    pub input_root: String,
    pub created_at: DateTime<Utc>,
    pub schema_version: u32,
    pub tool_version: String,
    pub files_discovered: usize,
    pub files_attempted: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub skipped_nodes: usize,
    pub duration_ms: u64,
    pub failures: Vec<FileFailure>,
    pub entity_counts: BTreeMap<EntityKind, usize>,
}

/// Connection settings for run databases being written.
fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    // Single-file journal: the staging database is published by rename.
    conn.pragma_update(None, "journal_mode", "DELETE")?;
    conn.pragma_update(None, "cache_size", -64000)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}
