//! Whole-codebase content hashing.
//!
//! Every discovered file is hashed together with its relative path, in
//! parallel with rayon. The per-file digests are then combined in path order
//! into one codebase hash, which keys the database cache.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::discovery::DiscoveredFile;
use crate::store::SCHEMA_VERSION;

/// Bumped whenever per-file digests change. The database schema version is
/// mixed in too, so databases of an older layout are never reused.
pub const HASH_FORMAT: &str = "ckg-hash-v1";

/// Hex-encoded SHA-256 digest of a whole file set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodebaseHash(String);

impl CodebaseHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for CodebaseHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CodebaseHash {
    fn from(hex: String) -> Self {
        Self(hex)
    }
}

/// Digest of one file of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedFile {
    pub file: DiscoveredFile,
    pub digest: String,
    /// False when the file could not be read while hashing.
    pub readable: bool,
}

/// The file set of one run and its combined hash.
#[derive(Debug, Clone)]
pub struct CodebaseSnapshot {
    pub hash: CodebaseHash,
    /// Sorted by relative path.
    pub files: Vec<HashedFile>,
}

impl CodebaseSnapshot {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Digest of one file: SHA-256 over the relative path, a NUL byte and the content.
pub fn file_digest(rel_path: &str, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rel_path.as_bytes());
    hasher.update([0u8]);
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Stable digest for a file that exists but cannot be read.
fn unreadable_digest(rel_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rel_path.as_bytes());
    hasher.update([1u8]);
    hasher.update(b"unreadable");
    format!("{:x}", hasher.finalize())
}

fn stream_digest(rel_path: &str, path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(8192, file);
    let mut hasher = Sha256::new();
    hasher.update(rel_path.as_bytes());
    hasher.update([0u8]);

    let mut buffer = [0u8; 8192];
    loop {
        match reader.read(&mut buffer)? {
            0 => break,
            n => hasher.update(&buffer[..n]),
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Combine per-file digests (already in path order) into the codebase hash.
fn combine<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> CodebaseHash {
    let mut hasher = Sha256::new();
    hasher.update(HASH_FORMAT.as_bytes());
    hasher.update(format!("/schema-{}\n", SCHEMA_VERSION).as_bytes());
    for (path, digest) in entries {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(digest.as_bytes());
        hasher.update(b"\n");
    }
    CodebaseHash(format!("{:x}", hasher.finalize()))
}

/// Computes codebase hashes.
#[derive(Debug, Clone, Default)]
pub struct CodebaseHasher;

impl CodebaseHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hash a discovered file set.
    ///
    /// The result does not depend on the order of `files`.
    pub fn hash(&self, files: Vec<DiscoveredFile>) -> CodebaseSnapshot {
        let start = std::time::Instant::now();

        let mut hashed: Vec<HashedFile> = files
            .into_par_iter()
            .map(|file| match stream_digest(&file.relative_path, &file.path) {
                Ok(digest) => HashedFile {
                    file,
                    digest,
                    readable: true,
                },
                Err(e) => {
                    debug!("Cannot hash {}: {}", file.relative_path, e);
                    HashedFile {
                        digest: unreadable_digest(&file.relative_path),
                        file,
                        readable: false,
                    }
                }
            })
            .collect();
        hashed.sort_by(|a, b| a.file.relative_path.cmp(&b.file.relative_path));

        let unreadable = hashed.iter().filter(|h| !h.readable).count();
        if unreadable > 0 {
            warn!("{} files could not be read while hashing", unreadable);
        }

        let hash = combine(
            hashed
                .iter()
                .map(|h| (h.file.relative_path.as_str(), h.digest.as_str())),
        );
        info!(
            "Hashed {} files in {:.2}s: {}",
            hashed.len(),
            start.elapsed().as_secs_f64(),
            hash.short()
        );

        CodebaseSnapshot {
            hash,
            files: hashed,
        }
    }
}
