//! Version stream persistence.
//!
//! # Storage layout
//!
//! ```text
//! <dir>/
//!   charts/
//!     repositories.yml              (prefix → chart repository URLs)
//!     <prefix>/
//!       <chart>/
//!         defaults.yaml             (stable version of <prefix>/<chart>)
//! ```
//!
//! Every function takes the version stream root explicitly.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::yaml_edit::{self, PathSegment};

/// File recording the stable version of a single entry.
pub const DEFAULTS_FILE: &str = "defaults.yaml";

/// Prefix registry, relative to the chart kind directory.
pub const REPOSITORIES_FILE: &str = "repositories.yml";

/// The kinds of entries recorded in a version stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    Charts,
    Packages,
    Git,
    Docker,
}

impl VersionKind {
    pub const ALL: [VersionKind; 4] = [
        VersionKind::Charts,
        VersionKind::Packages,
        VersionKind::Git,
        VersionKind::Docker,
    ];

    /// Directory name under the version stream root.
    pub fn dir_name(self) -> &'static str {
        match self {
            VersionKind::Charts => "charts",
            VersionKind::Packages => "packages",
            VersionKind::Git => "git",
            VersionKind::Docker => "docker",
        }
    }

    /// Parses a kind name as written in rule documents.
    ///
    /// An empty name is `CoreError::MissingOption`; anything unknown is
    /// `CoreError::InvalidOption`.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        if name.is_empty() {
            return Err(CoreError::MissingOption("kind".to_string()));
        }
        Self::ALL
            .into_iter()
            .find(|k| k.dir_name() == name)
            .ok_or_else(|| CoreError::InvalidOption {
                name: "kind".to_string(),
                value: name.to_string(),
                allowed: Self::ALL.iter().map(|k| k.dir_name().to_string()).collect(),
            })
    }
}

impl fmt::Display for VersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

// ---------------------------------------------------------------------------
// Repository prefixes
// ---------------------------------------------------------------------------

/// Maps a chart repository prefix (e.g. `jxgh`) to its repository URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPrefixes {
    #[serde(default)]
    pub repositories: Vec<RepositoryUrls>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryUrls {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl RepositoryPrefixes {
    /// URLs registered for `prefix`; empty if the prefix is unknown.
    pub fn urls_for_prefix(&self, prefix: &str) -> &[String] {
        self.repositories
            .iter()
            .find(|r| r.prefix == prefix)
            .map(|r| r.urls.as_slice())
            .unwrap_or(&[])
    }
}

/// `<dir>/charts/repositories.yml`. Pure, no I/O.
pub fn repositories_path_at(dir: &Path) -> PathBuf {
    dir.join(VersionKind::Charts.dir_name()).join(REPOSITORIES_FILE)
}

/// Load the prefix registry.
///
/// Returns `CoreError::ConfigNotFound` if the file is absent and
/// `CoreError::Parse` if it is malformed.
pub fn load_repository_prefixes_at(dir: &Path) -> Result<RepositoryPrefixes, CoreError> {
    let path = repositories_path_at(dir);
    if !path.exists() {
        return Err(CoreError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
}

// ---------------------------------------------------------------------------
// Stable versions
// ---------------------------------------------------------------------------

/// The approved version of one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StableVersion {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

impl StableVersion {
    /// Link for notes: the git URL, else the chart URL.
    pub fn link(&self) -> Option<&str> {
        [&self.git_url, &self.url]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
    }
}

/// `<dir>/<kind>/<name>/defaults.yaml`. Pure, no I/O.
pub fn stable_version_path_at(dir: &Path, kind: VersionKind, name: &str) -> PathBuf {
    name.split('/')
        .fold(dir.join(kind.dir_name()), |p, seg| p.join(seg))
        .join(DEFAULTS_FILE)
}

/// Parse the contents of the stable version file at `path`; blank contents
/// are an empty entry.
pub fn parse_stable_version(path: &Path, contents: &str) -> Result<StableVersion, CoreError> {
    if contents.trim().is_empty() {
        return Ok(StableVersion::default());
    }
    serde_yaml::from_str(contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// The new contents of a stable version file after setting `version`.
///
/// Other fields, comments and formatting in `current` are kept.
pub fn with_stable_version(current: &str, version: &str) -> Result<String, CoreError> {
    if current.trim().is_empty() {
        return Ok(format!("version: {}\n", yaml_edit::plain_or_quoted(version)));
    }
    yaml_edit::set_scalar(current, &[PathSegment::Key("version")], version)
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// A chart recorded in the version stream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChartEntry {
    pub prefix: String,
    pub chart: String,
}

impl ChartEntry {
    /// `prefix/chart`, the name used for filtering and repository search.
    pub fn name(&self) -> String {
        format!("{}/{}", self.prefix, self.chart)
    }
}

/// Charts recorded under `<dir>/charts/*/defaults.yaml` and
/// `<dir>/charts/*/*/defaults.yaml`.
///
/// Only entries at depth two (`<prefix>/<chart>`) are charts; a single-level
/// `defaults.yaml` carries no repository prefix and is skipped.
pub fn discover_charts_at(dir: &Path) -> Result<Vec<ChartEntry>, CoreError> {
    let kind_dir = dir.join(VersionKind::Charts.dir_name());
    let mut entries = Vec::new();
    for depth in ["*", "*/*"] {
        let pattern = format!(
            "{}/{depth}/{DEFAULTS_FILE}",
            glob::Pattern::escape(&kind_dir.to_string_lossy())
        );
        let paths = glob::glob(&pattern).map_err(|e| CoreError::InvalidOption {
            name: "glob".to_string(),
            value: format!("{pattern}: {e}"),
            allowed: vec![],
        })?;
        for path in paths.flatten() {
            let Ok(rel) = path.strip_prefix(&kind_dir) else {
                continue;
            };
            let segments: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            if segments.len() < 3 {
                continue;
            }
            entries.push(ChartEntry {
                prefix: segments[0].clone(),
                chart: segments[1].clone(),
            });
        }
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
