//! Error types for docket operations

use crate::ModelType;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors.
///
/// These never abort the engine: loaders log them and fall back to defaults.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Config file {path:?} could not be read: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Config file {path:?} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Failures raised by persistence callbacks bound to the lazy loader.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Load failed for {model_type}: {reason}")]
    Failed { model_type: ModelType, reason: String },

    #[error("No data source registered for {model_type}")]
    NotRegistered { model_type: ModelType },
}

impl LoadError {
    /// Shorthand used by callback implementations.
    pub fn failed(model_type: ModelType, reason: impl Into<String>) -> Self {
        Self::Failed {
            model_type,
            reason: reason.into(),
        }
    }
}

/// Failures raised by injected preload hooks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreloadError {
    #[error("Preload of {target} failed: {reason}")]
    Failed { target: String, reason: String },
}

/// File content cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FileCacheError {
    #[error("File not found: {path:?}")]
    NotFound { path: PathBuf },

    #[error("I/O error on {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Failed to parse {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to serialize content for {path:?}: {reason}")]
    Serialize { path: PathBuf, reason: String },

    #[error("Compression failed for {path:?}: {reason}")]
    Compression { path: PathBuf, reason: String },
}

impl FileCacheError {
    /// Wrap an `io::Error`, mapping `NotFound` to its own variant.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io {
                path,
                reason: err.to_string(),
            }
        }
    }
}

/// Master error type for all docket errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocketError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Preload error: {0}")]
    Preload(#[from] PreloadError),

    #[error("File cache error: {0}")]
    FileCache(#[from] FileCacheError),
}

/// Result type alias for docket operations.
pub type DocketResult<T> = Result<T, DocketError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display_malformed() {
        let err = ConfigError::Malformed {
            path: PathBuf::from("cache_config.json"),
            reason: "expected value at line 1".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("malformed"));
        assert!(msg.contains("cache_config.json"));
        assert!(msg.contains("line 1"));
    }

    #[test]
    fn test_load_error_display() {
        let err = LoadError::failed(ModelType::Client, "disk unplugged");
        let msg = format!("{}", err);
        assert!(msg.contains("CLIENT"));
        assert!(msg.contains("disk unplugged"));

        let err = LoadError::NotRegistered {
            model_type: ModelType::Template,
        };
        assert!(format!("{}", err).contains("TEMPLATE"));
    }

    #[test]
    fn test_file_cache_error_from_io_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = FileCacheError::io("a.json", io);
        assert_eq!(
            err,
            FileCacheError::NotFound {
                path: PathBuf::from("a.json")
            }
        );

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = FileCacheError::io("a.json", io);
        assert!(matches!(err, FileCacheError::Io { .. }));
    }

    #[test]
    fn test_docket_error_from_variants() {
        let config = DocketError::from(ConfigError::InvalidValue {
            field: "ttl".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        });
        assert!(matches!(config, DocketError::Config(_)));

        let load = DocketError::from(LoadError::failed(ModelType::Document, "x"));
        assert!(matches!(load, DocketError::Load(_)));

        let preload = DocketError::from(PreloadError::Failed {
            target: "clients/c1".to_string(),
            reason: "timeout".to_string(),
        });
        assert!(matches!(preload, DocketError::Preload(_)));

        let file = DocketError::from(FileCacheError::NotFound {
            path: PathBuf::from("x.json"),
        });
        assert!(matches!(file, DocketError::FileCache(_)));
    }
}
