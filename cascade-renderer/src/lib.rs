//! # cascade-renderer
//!
//! Tera-based evaluation of the `versionTemplate` of a change.
//!
//! ## Usage
//!
//! ```rust
//! use cascade_renderer::{TemplateData, VersionContext, VersionTemplater};
//!
//! let mut data = TemplateData::default();
//! data.record_pull_request("jx-build-controller", "4f2a9c1");
//!
//! let ctx = VersionContext::new("1.2.3", "https://github.com/acme/env", &data);
//! let version = VersionTemplater::new()
//!     .evaluate("{{ version }}-{{ pull_requests['jx-build-controller'].sha }}", &ctx)
//!     .unwrap();
//! assert_eq!(version, "1.2.3-4f2a9c1");
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::{PullRequestData, TemplateData, VersionContext};
pub use engine::VersionTemplater;
pub use error::RenderError;
