//! Error types for cascade-sync.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use cascade_core::CoreError;
use cascade_renderer::RenderError;

/// All errors that can arise from applying changes to repositories.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid or missing configuration for a change.
    #[error("configuration error: {0}")]
    Config(String),

    /// An error from loading rule sets or the version stream.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A glob expression could not be parsed or expanded.
    #[error("failed to evaluate glob {pattern}: {message}")]
    Glob { pattern: String, message: String },

    /// A version field could not be set on a document.
    #[error("failed to modify {path}: {message}")]
    Mutation { path: PathBuf, message: String },

    /// An external command failed or exited non-zero.
    #[error("failed to run command {command}: {output}")]
    Command {
        command: String,
        output: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A remote query (chart search, repository discovery) failed.
    #[error("request to {target} failed: {message}")]
    Network { target: String, message: String },

    /// An error from the version template engine.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// JSON decoding error (helm search output, reports).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A change pattern did not compile.
    #[error("failed to parse change regex {pattern}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// One or more units of a batch failed; every failure is kept.
    #[error("{}", BatchDisplay(.0))]
    Batch(Vec<SyncError>),

    /// Context wrapper naming the unit of work that failed.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Wrap `self` with a description of the work that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        SyncError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Combine collected errors: none is `Ok`, one is returned as is.
    pub fn combine(mut errors: Vec<SyncError>) -> Result<(), SyncError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(SyncError::Batch(errors)),
        }
    }
}

struct BatchDisplay<'a>(&'a [SyncError]);

impl fmt::Display for BatchDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.0.len())?;
        for err in self.0 {
            write!(f, "\n\t* {err}")?;
        }
        Ok(())
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
