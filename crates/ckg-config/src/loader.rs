//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.ckg/config.toml`
//! 2. Local config: `.ckg/config.toml` (in the analyzed codebase)
//! 3. Programmatic overrides
//!
//! Later sources override earlier ones.

use crate::error::{ConfigError, ConfigLayer, FileAction};
use crate::{CkgConfig, ConfigOverrides};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".ckg";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".ckg";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.ckg`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<CkgConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.ckg`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a codebase.
    pub fn local_config_path(&self, input_root: &Path) -> PathBuf {
        input_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a codebase with optional overrides.
    ///
    /// Merges config in order: global → local → overrides, then validates.
    pub fn load(
        &mut self,
        input_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<CkgConfig, ConfigError> {
        let mut config = CkgConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(input_root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<CkgConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path, ConfigLayer::Global)?;
        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a codebase.
    pub fn load_local(&self, input_root: &Path) -> Result<Option<CkgConfig>, ConfigError> {
        let local_path = self.local_config_path(input_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path, ConfigLayer::Local).map(Some)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &CkgConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        save_config_file(&global_dir.join(CONFIG_FILE_NAME), config)
    }

    /// Save configuration to the local config file for a codebase.
    pub fn save_local(&self, input_root: &Path, config: &CkgConfig) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(input_root), config)
    }

    /// Initialize local configuration for a codebase.
    ///
    /// Creates `.ckg/config.toml` with default configuration unless present.
    pub fn init_local(&self, input_root: &Path) -> Result<PathBuf, ConfigError> {
        let config_path = self.local_config_path(input_root);
        if !config_path.exists() {
            save_config_file(&config_path, &CkgConfig::default())?;
        }
        Ok(config_path)
    }

    /// Clear cached global configuration.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path, layer: ConfigLayer) -> Result<CkgConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        action: FileAction::Read,
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        layer,
        path: path.to_path_buf(),
        source,
    })
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &CkgConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                action: FileAction::CreateDir,
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        action: FileAction::Write,
        path: path.to_path_buf(),
        source,
    })
}

/// Overlay value wins when it differs from the default.
fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// This performs a field-by-field merge, allowing partial configs.
fn merge_configs(base: CkgConfig, overlay: CkgConfig) -> CkgConfig {
    CkgConfig {
        storage: merge_storage(base.storage, overlay.storage),
        analysis: merge_analysis(base.analysis, overlay.analysis),
        languages: merge_languages(base.languages, overlay.languages),
    }
}

fn merge_storage(base: crate::StorageConfig, overlay: crate::StorageConfig) -> crate::StorageConfig {
    let defaults = crate::StorageConfig::default();
    crate::StorageConfig {
        output_dir: pick(base.output_dir, overlay.output_dir, defaults.output_dir),
        registry_file: overlay.registry_file.or(base.registry_file),
        max_databases: overlay.max_databases.or(base.max_databases),
        max_age_days: pick(base.max_age_days, overlay.max_age_days, defaults.max_age_days),
        retain_superseded: pick(
            base.retain_superseded,
            overlay.retain_superseded,
            defaults.retain_superseded,
        ),
    }
}

fn merge_analysis(
    base: crate::AnalysisConfig,
    overlay: crate::AnalysisConfig,
) -> crate::AnalysisConfig {
    let defaults = crate::AnalysisConfig::default();
    crate::AnalysisConfig {
        concurrency: pick(base.concurrency, overlay.concurrency, defaults.concurrency),
        file_timeout_ms: pick(
            base.file_timeout_ms,
            overlay.file_timeout_ms,
            defaults.file_timeout_ms,
        ),
        max_file_size_kb: pick(
            base.max_file_size_kb,
            overlay.max_file_size_kb,
            defaults.max_file_size_kb,
        ),
        include_source_text: pick(
            base.include_source_text,
            overlay.include_source_text,
            defaults.include_source_text,
        ),
        strict: pick(base.strict, overlay.strict, defaults.strict),
        tolerate_syntax_errors: pick(
            base.tolerate_syntax_errors,
            overlay.tolerate_syntax_errors,
            defaults.tolerate_syntax_errors,
        ),
        exclude_hidden: pick(
            base.exclude_hidden,
            overlay.exclude_hidden,
            defaults.exclude_hidden,
        ),
        respect_gitignore: pick(
            base.respect_gitignore,
            overlay.respect_gitignore,
            defaults.respect_gitignore,
        ),
        // Overlay patterns extend base patterns
        exclude_patterns: {
            let mut patterns = base.exclude_patterns;
            for pattern in overlay.exclude_patterns {
                if !patterns.contains(&pattern) {
                    patterns.push(pattern);
                }
            }
            patterns
        },
    }
}

fn merge_languages(
    base: crate::LanguagesConfig,
    overlay: crate::LanguagesConfig,
) -> crate::LanguagesConfig {
    let mut extensions = base.extensions;
    extensions.extend(overlay.extensions);

    let mut disabled = base.disabled;
    for tag in overlay.disabled {
        if !disabled.contains(&tag) {
            disabled.push(tag);
        }
    }

    crate::LanguagesConfig {
        extensions,
        disabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn create_local_config(content: &str, dir: &Path) -> PathBuf {
        let config_dir = dir.join(".ckg");
        std::fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn create_global_config(content: &str, dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config, CkgConfig::default());
    }

    #[test]
    fn test_load_local_config() {
        let temp = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        create_local_config(
            r#"
            [storage]
            output_dir = "graphs"

            [analysis]
            concurrency = 2
            "#,
            temp.path(),
        );

        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.storage.output_dir, PathBuf::from("graphs"));
        assert_eq!(config.analysis.concurrency, 2);
    }

    #[test]
    fn test_local_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");

        create_global_config(
            r#"
            [analysis]
            strict = true
            file_timeout_ms = 500

            [storage]
            max_databases = 4
            max_age_days = 30
            "#,
            &global_dir,
        );

        create_local_config(
            r#"
            [analysis]
            file_timeout_ms = 2000
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(&global_dir);
        let config = loader.load(temp.path(), None).unwrap();

        assert_eq!(config.analysis.file_timeout_ms, 2000);
        // Global values survive where local is silent
        assert!(config.analysis.strict);
        assert_eq!(config.storage.max_databases, Some(4));
        assert_eq!(config.storage.max_age_days, Some(30));
    }

    #[test]
    fn test_overrides_win() {
        let temp = TempDir::new().unwrap();
        create_local_config(
            r#"
            [analysis]
            concurrency = 8
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let overrides = ConfigOverrides {
            concurrency: Some(1),
            output_dir: Some(PathBuf::from("/tmp/ckg-out")),
            ..Default::default()
        };

        let config = loader.load(temp.path(), Some(&overrides)).unwrap();

        assert_eq!(config.analysis.concurrency, 1);
        assert_eq!(config.storage.output_dir, PathBuf::from("/tmp/ckg-out"));
    }

    #[test]
    fn test_invalid_local_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        create_local_config(
            r#"
            [analysis]
            file_timeout_ms = "soon"
            "#,
            temp.path(),
        );

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let err = loader.load(temp.path(), None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Parse {
                layer: ConfigLayer::Local,
                ..
            }
        ));
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let mut config = CkgConfig::default();
        config.storage.max_age_days = Some(30);
        config
            .languages
            .extensions
            .insert("pyi".to_string(), "python".to_string());

        loader.save_local(temp.path(), &config).unwrap();

        let mut loader = ConfigLoader::with_global_dir(temp.path().join("global"));
        let loaded = loader.load(temp.path(), None).unwrap();

        assert_eq!(loaded.storage.max_age_days, Some(30));
        assert_eq!(loaded.languages.extensions, config.languages.extensions);
    }

    #[test]
    fn test_init_local_creates_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(temp.path().join("global"));

        let config_path = loader.init_local(temp.path()).unwrap();

        assert!(config_path.exists());
        assert!(config_path.ends_with(".ckg/config.toml"));

        let content = std::fs::read_to_string(&config_path).unwrap();
        let _: CkgConfig = toml::from_str(&content).unwrap();
    }

    #[test]
    fn test_exclude_patterns_merge() {
        let base = crate::AnalysisConfig {
            exclude_patterns: vec!["**/node_modules/**".to_string()],
            ..Default::default()
        };

        let overlay = crate::AnalysisConfig {
            exclude_patterns: vec!["**/generated/**".to_string()],
            ..Default::default()
        };

        let merged = merge_analysis(base, overlay);

        assert!(merged
            .exclude_patterns
            .contains(&"**/node_modules/**".to_string()));
        assert!(merged
            .exclude_patterns
            .contains(&"**/generated/**".to_string()));
    }

    #[test]
    fn test_languages_merge() {
        let mut base = crate::LanguagesConfig::default();
        base.extensions.insert("h".to_string(), "c".to_string());
        base.disabled.push("php".to_string());

        let mut overlay = crate::LanguagesConfig::default();
        overlay.extensions.insert("h".to_string(), "cpp".to_string());
        overlay.disabled.push("php".to_string());
        overlay.disabled.push("ruby".to_string());

        let merged = merge_languages(base, overlay);

        assert_eq!(merged.extensions.get("h").map(String::as_str), Some("cpp"));
        assert_eq!(merged.disabled, vec!["php".to_string(), "ruby".to_string()]);
    }

    #[test]
    fn test_cache_clearing() {
        let temp = TempDir::new().unwrap();
        let global_dir = temp.path().join("global");
        create_global_config(
            r#"
            [analysis]
            strict = true
            "#,
            &global_dir,
        );

        let mut loader = ConfigLoader::with_global_dir(&global_dir);

        let _ = loader.load_global().unwrap();
        assert!(loader.global_config.is_some());

        loader.clear_cache();
        assert!(loader.global_config.is_none());
    }
}
