//! Common test utilities for integration tests.
//!
//! Fixtures are written into temporary directories and run through the
//! builder with a small worker pool.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ckg_core::{BuildConfig, CkgBuilder, CkgDatabase, EntityKind, RunRequest, RunSummary};
use tempfile::TempDir;

/// Write `(relative path, content)` pairs under `root`, creating directories.
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }
}

/// A temporary source tree holding the given files.
pub fn fixture(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    write_files(temp.path(), files);
    temp
}

pub fn builder() -> CkgBuilder {
    CkgBuilder::new(BuildConfig {
        concurrency: 2,
        ..BuildConfig::default()
    })
}

/// Run the default builder over `root`.
pub fn run(root: &Path) -> RunSummary {
    builder()
        .run(&RunRequest::new(root))
        .expect("run should succeed")
}

pub fn open(summary: &RunSummary) -> CkgDatabase {
    CkgDatabase::open(&summary.database).expect("database should open")
}

/// Kinds with at least one row.
pub fn populated(db: &CkgDatabase) -> BTreeMap<EntityKind, usize> {
    db.counts()
        .unwrap()
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect()
}

/// A builder with an adjusted configuration.
pub fn builder_with(adjust: impl FnOnce(&mut BuildConfig)) -> CkgBuilder {
    let mut config = BuildConfig {
        concurrency: 2,
        ..BuildConfig::default()
    };
    adjust(&mut config);
    CkgBuilder::new(config)
}
