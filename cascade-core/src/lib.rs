//! cascade core library: rule documents, matching, version stream
//! persistence and YAML editing.
//!
//! - [`types`]: the rule set document model
//! - [`filter`]: [`Pattern`] and [`TextFilter`] matching
//! - [`config`]: rule set and version resolution
//! - [`version_stream`]: prefix registry and stable versions
//! - [`yaml_edit`]: text-preserving scalar edits
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod filter;
pub mod types;
pub mod version_stream;
pub mod yaml_edit;

pub use error::CoreError;
pub use filter::{trim_git_url_suffix, Pattern, TextFilter};
pub use types::{
    Change, ChangeKind, CommandChange, EnvVar, GoChange, RegexChange, Rule, UpdateConfig,
    UpdateConfigSpec, VersionStreamChange,
};
pub use version_stream::{ChartEntry, RepositoryPrefixes, StableVersion, VersionKind};
pub use yaml_edit::PathSegment;
