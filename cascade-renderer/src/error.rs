//! Error types for cascade-renderer.

use thiserror::Error;

/// All errors that can arise from evaluating version templates.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// A version template failed to parse or render for a repository.
    #[error("failed to evaluate version template for {git_url}: {source}")]
    Evaluate {
        git_url: String,
        #[source]
        source: tera::Error,
    },

    /// JSON serialization error (building tera context).
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
