//! # cascade-sync
//!
//! The engines that find and rewrite versions in repository trees, and the
//! orchestrator that applies rule sets to repositories.
//!
//! - [`regex_change`]: regex substitution over glob-selected files
//! - [`version_stream`]: stable version upgrades from chart repositories
//! - [`sync`]: copy versions from one GitOps tree into another
//! - [`promote`]: set a released version in a GitOps tree
//! - [`godep`]: go module discovery and upgrades
//! - [`pipeline`]: [`RuleEngine`] and its collaborators
//!
//! All file edits go through a [`ChangeWriter`], which writes only changed
//! content and supports dry-runs.

pub mod command;
pub mod diff;
pub mod error;
pub mod godep;
pub mod manifest;
pub mod pipeline;
pub mod promote;
pub mod regex_change;
pub mod resource;
pub mod sync;
pub mod version_stream;
pub mod writer;

pub use command::{Command, CommandRunner, ProcessRunner};
pub use diff::{unified_diffs, FileDiff};
pub use error::SyncError;
pub use godep::{DiscoveredRepository, RepositoryDiscovery};
pub use pipeline::{
    ApplyOutcome, Collaborators, DirectoryPublisher, PullRequestDetails, PullRequestInfo,
    PullRequestPublisher, RuleEngine, RunContext, RunReport,
};
pub use promote::{promote_applications, promote_helm_releases};
pub use regex_change::apply_regex;
pub use resource::{KindFilter, Resource, ResourceKind, ResourceVersion};
pub use sync::{sync_versions, SyncOptions, SyncReport};
pub use version_stream::{update_charts, ChartRepository, HelmChartRepository};
pub use writer::{ChangeWriter, WriteResult};
