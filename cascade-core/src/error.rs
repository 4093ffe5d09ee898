//! Error types for cascade-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading rule sets, reading the version
/// stream, or editing YAML documents.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path that failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A document the caller requires does not exist.
    #[error("configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// A required option was not supplied.
    #[error("missing option: --{0}")]
    MissingOption(String),

    /// An option was supplied with a value outside of its allowed set.
    #[error("invalid option --{name}: '{value}'; expected one of: {}", .allowed.join(", "))]
    InvalidOption {
        name: String,
        value: String,
        allowed: Vec<String>,
    },

    /// A YAML field path could not be created or set on a document.
    #[error("cannot set {path}: {message}")]
    Mutation { path: String, message: String },
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
