//! Error types for rollcall-core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which kind of name failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Service,
    Protocol,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Service => write!(f, "service"),
            NameKind::Protocol => write!(f, "protocol"),
        }
    }
}

/// All errors that can arise from core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A service or protocol name failed validation.
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: NameKind,
        name: String,
        reason: String,
    },

    /// The cache file is missing or could not be parsed. Informational only;
    /// callers fall back to live introspection.
    #[error("cache file unavailable at {path}: {reason}")]
    CacheUnavailable { path: PathBuf, reason: String },

    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on config load, with file path and line context.
    #[error("failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// `dirs::config_dir()` returned `None`.
    #[error("cannot determine config directory; set $HOME or $XDG_CONFIG_HOME")]
    ConfigDirNotFound,
}

impl CoreError {
    pub(crate) fn invalid_name(kind: NameKind, name: &str, reason: impl Into<String>) -> Self {
        CoreError::InvalidName {
            kind,
            name: name.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn cache_unavailable(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        CoreError::CacheUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
