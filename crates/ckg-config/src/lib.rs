//! CKG Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.ckg/config.toml`
//! - Local config: `.ckg/config.toml` (in the analyzed codebase)
//! - Programmatic overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → overrides.

mod error;
mod loader;

pub use error::{ConfigError, ConfigLayer, FileAction};
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Root configuration for CKG.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CkgConfig {
    /// Database and cache registry placement
    pub storage: StorageConfig,

    /// Discovery and extraction behaviour
    pub analysis: AnalysisConfig,

    /// Extension mapping adjustments
    pub languages: LanguagesConfig,
}

/// Days a cached database may go unused before it expires.
pub const DEFAULT_MAX_AGE_DAYS: u64 = 7;

/// Storage configuration.
///
/// # Example TOML
///
/// ```toml
/// [storage]
/// output_dir = "/var/cache/ckg"
/// max_databases = 16
/// max_age_days = 7
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory receiving run databases (default: `.ckg`)
    pub output_dir: PathBuf,

    /// Cache registry file (default: `<output_dir>/registry.json`)
    pub registry_file: Option<PathBuf>,

    /// Upper bound on cached databases, least recently used evicted first
    pub max_databases: Option<usize>,

    /// Registry entries unused for this many days are evicted
    /// (default: 7, `0` disables expiry)
    pub max_age_days: Option<u64>,

    /// Keep databases of earlier snapshots of the same input root
    pub retain_superseded: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(".ckg"),
            registry_file: None,
            max_databases: None,
            max_age_days: Some(DEFAULT_MAX_AGE_DAYS),
            retain_superseded: false,
        }
    }
}

/// Analysis configuration for discovery and extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Worker threads for parsing and extraction (0 = auto-detect)
    pub concurrency: usize,

    /// Soft per-file parse timeout in milliseconds
    pub file_timeout_ms: u64,

    /// Maximum file size to analyze (in KB)
    pub max_file_size_kb: u64,

    /// Store the raw source slice of every entity
    pub include_source_text: bool,

    /// Log skipped declaration shapes
    pub strict: bool,

    /// Extract from trees containing syntax errors instead of failing the file
    pub tolerate_syntax_errors: bool,

    /// Skip dot-files and dot-directories
    pub exclude_hidden: bool,

    /// Honour `.gitignore` and `.ckgignore`
    pub respect_gitignore: bool,

    /// File patterns to exclude (glob patterns, relative to the input root)
    pub exclude_patterns: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            file_timeout_ms: 10_000,
            max_file_size_kb: 1024,
            include_source_text: true,
            strict: false,
            tolerate_syntax_errors: false,
            exclude_hidden: true,
            respect_gitignore: true,
            exclude_patterns: vec![
                "**/node_modules/**".to_string(),
                "**/target/**".to_string(),
                "**/vendor/**".to_string(),
                "**/__pycache__/**".to_string(),
                "**/dist/**".to_string(),
                "**/build/**".to_string(),
            ],
        }
    }
}

/// Extension mapping adjustments.
///
/// # Example TOML
///
/// ```toml
/// [languages]
/// disabled = ["php"]
///
/// [languages.extensions]
/// pyi = "python"
/// h = "cpp"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LanguagesConfig {
    /// Language tags excluded from analysis
    pub disabled: Vec<String>,

    /// Extension (without dot) → language tag, added to or replacing defaults
    pub extensions: BTreeMap<String, String>,
}

/// Programmatic overrides for configuration values.
///
/// Applied over file-based config by embedding front ends.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override output directory
    pub output_dir: Option<PathBuf>,

    /// Override worker count
    pub concurrency: Option<usize>,

    /// Override strict mode
    pub strict: Option<bool>,

    /// Override per-file timeout
    pub file_timeout_ms: Option<u64>,
}

impl CkgConfig {
    /// Apply overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref dir) = overrides.output_dir {
            self.storage.output_dir = dir.clone();
        }

        if let Some(concurrency) = overrides.concurrency {
            self.analysis.concurrency = concurrency;
        }

        if let Some(strict) = overrides.strict {
            self.analysis.strict = strict;
        }

        if let Some(timeout) = overrides.file_timeout_ms {
            self.analysis.file_timeout_ms = timeout;
        }
    }

    /// Validate the configuration.
    ///
    /// Language tags are checked where the extension map is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.file_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "analysis.file_timeout_ms",
                "must be greater than zero",
            ));
        }

        if self.storage.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid(
                "storage.output_dir",
                "must not be empty",
            ));
        }

        if self.storage.max_databases == Some(0) {
            return Err(ConfigError::invalid(
                "storage.max_databases",
                "must keep at least one database",
            ));
        }

        for pattern in &self.analysis.exclude_patterns {
            globset::Glob::new(pattern).map_err(|e| {
                ConfigError::invalid("analysis.exclude_patterns", e.to_string())
            })?;
        }

        for (ext, tag) in &self.languages.extensions {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(ConfigError::invalid(
                    "languages.extensions",
                    format!("extension '{}' must be non-empty and given without a dot", ext),
                ));
            }
            if tag.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "languages.extensions",
                    format!("extension '{}' maps to an empty language tag", ext),
                ));
            }
        }

        Ok(())
    }

    /// Get the effective output directory for a codebase.
    pub fn output_dir(&self, input_root: &Path) -> PathBuf {
        if self.storage.output_dir.is_absolute() {
            self.storage.output_dir.clone()
        } else {
            input_root.join(&self.storage.output_dir)
        }
    }

    /// Get the cache registry path for a codebase.
    pub fn registry_path(&self, input_root: &Path) -> PathBuf {
        match self.storage.registry_file {
            Some(ref file) if file.is_absolute() => file.clone(),
            Some(ref file) => input_root.join(file),
            None => self.output_dir(input_root).join("registry.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CkgConfig::default();
        assert_eq!(config.storage.output_dir, PathBuf::from(".ckg"));
        assert_eq!(config.analysis.file_timeout_ms, 10_000);
        assert!(config.analysis.include_source_text);
        assert!(config.analysis.exclude_hidden);
        assert!(!config.analysis.strict);
        assert!(config.languages.extensions.is_empty());
        assert_eq!(config.storage.max_age_days, Some(DEFAULT_MAX_AGE_DAYS));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = CkgConfig::default();
        let overrides = ConfigOverrides {
            output_dir: Some(PathBuf::from("/custom/ckg")),
            concurrency: Some(3),
            strict: Some(true),
            ..Default::default()
        };

        config.apply_overrides(&overrides);

        assert_eq!(config.storage.output_dir, PathBuf::from("/custom/ckg"));
        assert_eq!(config.analysis.concurrency, 3);
        assert!(config.analysis.strict);
        assert_eq!(config.analysis.file_timeout_ms, 10_000);
    }

    #[test]
    fn test_output_dir_resolution() {
        let config = CkgConfig::default();
        let root = PathBuf::from("/home/user/project");

        assert_eq!(
            config.output_dir(&root),
            PathBuf::from("/home/user/project/.ckg")
        );
        assert_eq!(
            config.registry_path(&root),
            PathBuf::from("/home/user/project/.ckg/registry.json")
        );
    }

    #[test]
    fn test_output_dir_absolute() {
        let mut config = CkgConfig::default();
        config.storage.output_dir = PathBuf::from("/var/cache/ckg");
        config.storage.registry_file = Some(PathBuf::from("/etc/ckg/registry.json"));
        let root = PathBuf::from("/home/user/project");

        assert_eq!(config.output_dir(&root), PathBuf::from("/var/cache/ckg"));
        assert_eq!(
            config.registry_path(&root),
            PathBuf::from("/etc/ckg/registry.json")
        );
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = CkgConfig::default();
        config.analysis.file_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.key(), Some("analysis.file_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let mut config = CkgConfig::default();
        config.analysis.exclude_patterns.push("src/[unclosed".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exclude_patterns"));
    }

    #[test]
    fn test_validate_rejects_dotted_extension() {
        let mut config = CkgConfig::default();
        config
            .languages
            .extensions
            .insert(".pyi".to_string(), "python".to_string());
        let err = config.validate().unwrap_err();
        assert_eq!(err.key(), Some("languages.extensions"));
    }

    #[test]
    fn test_toml_partial_section() {
        let toml_str = r#"
            [analysis]
            strict = true

            [languages.extensions]
            pyi = "python"
        "#;

        let config: CkgConfig = toml::from_str(toml_str).unwrap();
        assert!(config.analysis.strict);
        assert_eq!(config.analysis.max_file_size_kb, 1024);
        assert_eq!(
            config.languages.extensions.get("pyi").map(String::as_str),
            Some("python")
        );
        assert_eq!(config.storage, StorageConfig::default());
    }
}
