//! Configuration errors.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which configuration file a problem came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    /// `~/.ckg/config.toml`
    Global,
    /// `<root>/.ckg/config.toml`
    Local,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigLayer::Global => "global",
            ConfigLayer::Local => "local",
        })
    }
}

/// File operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Read,
    Write,
    CreateDir,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileAction::Read => "read",
            FileAction::Write => "write",
            FileAction::CreateDir => "create directory",
        })
    }
}

/// Errors from loading, saving or validating a CKG configuration.
///
/// A run refuses to start on any of them.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot {action} '{path}': {source}")]
    Io {
        action: FileAction,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {layer} config '{path}': {source}")]
    Parse {
        layer: ConfigLayer,
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot render config as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The global layer lives under the home directory.
    #[error("no home directory for the global config")]
    NoHomeDir,

    /// A setting failed validation; `key` is its dotted TOML path.
    #[error("invalid setting `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }

    /// Dotted path of the offending setting, for validation failures.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { key, .. } => Some(*key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_setting_names_key() {
        let err = ConfigError::invalid("storage.max_databases", "must keep at least one database");
        assert_eq!(err.key(), Some("storage.max_databases"));
        assert_eq!(
            err.to_string(),
            "invalid setting `storage.max_databases`: must keep at least one database"
        );
        assert_eq!(ConfigError::NoHomeDir.key(), None);
    }

    #[test]
    fn test_io_error_names_action_and_path() {
        let err = ConfigError::Io {
            action: FileAction::CreateDir,
            path: PathBuf::from("/srv/app/.ckg"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            err.to_string(),
            "cannot create directory '/srv/app/.ckg': denied"
        );
    }

    #[test]
    fn test_parse_error_names_layer() {
        let source = toml::from_str::<toml::Value>("storage = [").unwrap_err();
        let err = ConfigError::Parse {
            layer: ConfigLayer::Local,
            path: PathBuf::from("/srv/app/.ckg/config.toml"),
            source,
        };
        assert!(err
            .to_string()
            .starts_with("malformed local config '/srv/app/.ckg/config.toml': "));
    }
}
