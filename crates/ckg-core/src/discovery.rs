//! Source file discovery.
//!
//! Walks an input root with the `ignore` crate (honoring `.gitignore` and
//! `.ckgignore`), applies the configured exclusions and keeps the files whose
//! extension maps to a supported language.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use ckg_config::AnalysisConfig;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::language::{Language, LanguageMap};

/// Errors that stop discovery altogether.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Input root does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("Input root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Input root cannot be read: {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Directories never descended into.
const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".ckg",
    "__pycache__",
    "node_modules",
    ".venv",
    "venv",
    "target",
    ".idea",
    ".vscode",
];

/// Name of the per-repository ignore file, in `.gitignore` syntax.
pub const IGNORE_FILE_NAME: &str = ".ckgignore";

/// Path-based exclusions applied on top of ignore files.
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    patterns: GlobSet,
    exclude_dirs: HashSet<String>,
    exclude_hidden: bool,
}

impl Default for ExclusionFilter {
    fn default() -> Self {
        Self {
            patterns: GlobSet::empty(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|d| d.to_string()).collect(),
            exclude_hidden: true,
        }
    }
}

impl ExclusionFilter {
    /// Build a filter from glob patterns relative to the input root.
    pub fn new(patterns: &[String], exclude_hidden: bool) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| DiscoveryError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let patterns = builder.build().map_err(|e| DiscoveryError::InvalidPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            patterns,
            exclude_hidden,
            ..Self::default()
        })
    }

    /// Check a relative path (`/` separated) against every exclusion.
    pub fn should_exclude(&self, rel_path: &Path) -> bool {
        for component in rel_path.components() {
            if let Component::Normal(name) = component {
                if let Some(name) = name.to_str() {
                    if self.exclude_dirs.contains(name) || self.is_hidden(name) {
                        return true;
                    }
                }
            }
        }
        if self.patterns.is_match(rel_path) {
            return true;
        }
        rel_path
            .file_name()
            .is_some_and(|name| self.patterns.is_match(Path::new(name)))
    }

    /// Check whether a directory should be skipped entirely.
    pub fn should_skip_dir(&self, dir_name: &str) -> bool {
        self.is_hidden(dir_name) || self.exclude_dirs.contains(dir_name)
    }

    fn is_hidden(&self, name: &str) -> bool {
        self.exclude_hidden && name.starts_with('.') && name != "." && name != ".."
    }
}

/// What to walk and what to keep.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub exclusions: ExclusionFilter,
    pub respect_gitignore: bool,
    /// Files larger than this are left out of the run.
    pub max_file_size: Option<u64>,
    pub languages: LanguageMap,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            exclusions: ExclusionFilter::default(),
            respect_gitignore: true,
            max_file_size: None,
            languages: LanguageMap::default(),
        }
    }
}

impl DiscoveryOptions {
    pub fn from_config(config: &AnalysisConfig, languages: LanguageMap) -> Result<Self> {
        Ok(Self {
            exclusions: ExclusionFilter::new(&config.exclude_patterns, config.exclude_hidden)?,
            respect_gitignore: config.respect_gitignore,
            max_file_size: (config.max_file_size_kb > 0).then(|| config.max_file_size_kb * 1024),
            languages,
        })
    }
}

/// A source file that is part of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the input root, `/` separated.
    pub relative_path: String,
    pub language: Language,
    pub size: u64,
}

/// Enumerates the files of one input root.
#[derive(Debug, Clone, Default)]
pub struct FileDiscovery {
    options: DiscoveryOptions,
}

impl FileDiscovery {
    pub fn new(options: DiscoveryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Discover source files under `root`, sorted by relative path.
    pub fn discover(&self, root: &Path) -> Result<Vec<DiscoveredFile>> {
        if !root.exists() {
            return Err(DiscoveryError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
        }
        let root = root
            .canonicalize()
            .map_err(|e| DiscoveryError::Unreadable {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;
        std::fs::read_dir(&root).map_err(|e| DiscoveryError::Unreadable {
            path: root.clone(),
            reason: e.to_string(),
        })?;

        info!("Discovering source files under {:?}", root);
        let start = std::time::Instant::now();

        let exclusions = self.options.exclusions.clone();
        let gitignore = self.options.respect_gitignore;
        let walker = WalkBuilder::new(&root)
            .follow_links(false)
            .hidden(false)
            .parents(gitignore)
            .ignore(gitignore)
            .git_ignore(gitignore)
            .git_global(gitignore)
            .git_exclude(gitignore)
            .require_git(false)
            .add_custom_ignore_filename(IGNORE_FILE_NAME)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                if !is_dir || entry.depth() == 0 {
                    return true;
                }
                entry
                    .file_name()
                    .to_str()
                    .is_none_or(|name| !exclusions.should_skip_dir(name))
            })
            .build();

        let mut files = Vec::new();
        let mut skipped_large = 0usize;
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error walking directory: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let abs_path = entry.path();
            let rel_path = abs_path
                .strip_prefix(&root)
                .unwrap_or(abs_path)
                .to_string_lossy()
                .replace('\\', "/");
            if self.options.exclusions.should_exclude(Path::new(&rel_path)) {
                continue;
            }
            let Some(language) = self.options.languages.resolve(abs_path) else {
                continue;
            };

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    // Still part of the run; reading it will fail and be recorded.
                    debug!("Cannot stat {}: {}", rel_path, e);
                    0
                }
            };
            if self.options.max_file_size.is_some_and(|max| size > max) {
                debug!("Skipping {} ({} bytes over size limit)", rel_path, size);
                skipped_large += 1;
                continue;
            }

            files.push(DiscoveredFile {
                path: abs_path.to_path_buf(),
                relative_path: rel_path,
                language,
                size,
            });
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        info!(
            "Discovered {} source files in {:.2}s ({} over size limit)",
            files.len(),
            start.elapsed().as_secs_f64(),
            skipped_large
        );
        Ok(files)
    }
}
