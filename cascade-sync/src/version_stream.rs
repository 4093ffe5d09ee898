//! Version stream chart upgrades.
//!
//! Charts recorded in a version stream are looked up in their chart
//! repositories and their stable versions bumped to the latest release.
//! The chart repository is a trait so runs can be faked in tests; the
//! production client shells out to `helm`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use cascade_core::version_stream::{
    discover_charts_at, load_repository_prefixes_at, parse_stable_version, stable_version_path_at,
    with_stable_version,
};
use cascade_core::{ChartEntry, Pattern, VersionKind};

use crate::command::{Command, CommandRunner};
use crate::error::SyncError;
use crate::writer::ChangeWriter;

/// Commit title used when a version stream is upgraded.
pub const COMMIT_TITLE: &str = "chore: upgrade charts";

// ---------------------------------------------------------------------------
// Chart repository client
// ---------------------------------------------------------------------------

/// A chart found in a repository index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChartSummary {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Client for chart repositories and their local index.
pub trait ChartRepository {
    /// Register `url` under `name` unless a repository with that URL exists.
    fn add_repo_if_missing(&self, url: &str, name: &str) -> Result<(), SyncError>;

    /// Refresh the local index of every registered repository.
    fn update_index(&self) -> Result<(), SyncError>;

    /// Latest releases matching `name`; with `exact` only the chart of that name.
    fn search(&self, name: &str, exact: bool) -> Result<Vec<ChartSummary>, SyncError>;
}

/// [`ChartRepository`] backed by the `helm` binary.
pub struct HelmChartRepository<R> {
    runner: R,
    dir: PathBuf,
}

#[derive(Deserialize)]
struct HelmRepo {
    #[serde(default)]
    url: String,
}

impl<R: CommandRunner> HelmChartRepository<R> {
    pub fn new(runner: R, dir: &Path) -> Self {
        Self {
            runner,
            dir: dir.to_path_buf(),
        }
    }

    fn helm<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Command {
        Command::new(&self.dir, "helm", args)
    }
}

impl<R: CommandRunner> ChartRepository for HelmChartRepository<R> {
    fn add_repo_if_missing(&self, url: &str, name: &str) -> Result<(), SyncError> {
        // helm fails to list when no repositories are configured yet
        let known: Vec<HelmRepo> = match self.runner.run(&self.helm(["repo", "list", "-o", "json"])) {
            Ok(out) if !out.trim().is_empty() => serde_json::from_str(&out)?,
            Ok(_) | Err(_) => Vec::new(),
        };
        let url = url.trim_end_matches('/');
        if known.iter().any(|r| r.url.trim_end_matches('/') == url) {
            return Ok(());
        }
        self.runner.run(&self.helm(["repo", "add", name, url]))?;
        Ok(())
    }

    fn update_index(&self) -> Result<(), SyncError> {
        self.runner.run(&self.helm(["repo", "update"]))?;
        Ok(())
    }

    fn search(&self, name: &str, exact: bool) -> Result<Vec<ChartSummary>, SyncError> {
        let out = self
            .runner
            .run(&self.helm(["search", "repo", name, "-o", "json"]))
            .map_err(|e| SyncError::Network {
                target: name.to_string(),
                message: e.to_string(),
            })?;
        if out.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut found: Vec<ChartSummary> = serde_json::from_str(&out)?;
        if exact {
            found.retain(|c| c.name == name);
        }
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Updater
// ---------------------------------------------------------------------------

/// One stable version that was bumped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartUpdate {
    pub name: String,
    pub from: String,
    pub to: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionStreamReport {
    pub updates: Vec<ChartUpdate>,
    /// Markdown lines describing each update, in processing order.
    pub notes: String,
}

/// Bump the stable version of every chart in `dir` selected by `pattern`.
///
/// Loading the prefix registry and registering a repository are fatal;
/// unresolved prefixes, failed searches and unreadable stable versions are
/// logged and skipped.
pub fn update_charts(
    dir: &Path,
    pattern: &Pattern,
    charts: &dyn ChartRepository,
    writer: &mut ChangeWriter,
) -> Result<VersionStreamReport, SyncError> {
    let prefixes = load_repository_prefixes_at(dir)
        .map_err(|e| SyncError::from(e).context("failed to load chart repository prefixes"))?;

    let mut by_prefix: BTreeMap<String, Vec<ChartEntry>> = BTreeMap::new();
    for entry in discover_charts_at(dir)? {
        if pattern.matches(&entry.name()) {
            by_prefix.entry(entry.prefix.clone()).or_default().push(entry);
        }
    }

    let mut resolved = Vec::new();
    for (prefix, entries) in &by_prefix {
        let Some(url) = prefixes.urls_for_prefix(prefix).first() else {
            tracing::warn!("repository prefix {prefix} has no URL in charts/repositories.yml");
            continue;
        };
        tracing::info!("updating helm repository {prefix} at {url}");
        charts.add_repo_if_missing(url, prefix).map_err(|e| {
            e.context(format!("failed to add helm repository {url} for prefix {prefix}"))
        })?;
        resolved.extend(entries.iter());
    }

    if let Err(err) = charts.update_index() {
        tracing::warn!("failed to update helm repositories: {err}");
    }

    let mut report = VersionStreamReport::default();
    for entry in resolved {
        let name = entry.name();
        let latest = match charts.search(&name, true) {
            Ok(found) => found.into_iter().next().map(|c| c.version).unwrap_or_default(),
            Err(err) => {
                tracing::warn!("failed to search for chart {name}: {err}");
                continue;
            }
        };
        if latest.is_empty() {
            tracing::warn!("no version found for chart {name}");
            continue;
        }

        let path = stable_version_path_at(dir, VersionKind::Charts, &name);
        let current = writer.read_optional(&path)?.unwrap_or_default();
        let stable = match parse_stable_version(&path, &current) {
            Ok(sv) => sv,
            Err(err) => {
                tracing::warn!("failed to load stable version for {name}: {err}");
                continue;
            }
        };
        if stable.version == latest {
            tracing::debug!("chart {name} is already at {latest}");
            continue;
        }

        let updated = with_stable_version(&current, &latest).map_err(|e| SyncError::Mutation {
            path: path.clone(),
            message: e.to_string(),
        })?;
        writer.write(&path, &updated)?;
        tracing::info!("updated chart {name} from {} to {latest}", stable.version);

        let text = match stable.link() {
            Some(link) => format!("[{name}]({link})"),
            None => name.clone(),
        };
        if !report.notes.is_empty() {
            report.notes.push('\n');
        }
        report
            .notes
            .push_str(&format!("* updated chart {text} from `{}` to `{latest}`", stable.version));
        report.updates.push(ChartUpdate {
            name,
            from: stable.version,
            to: latest,
            path,
        });
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    /// In-memory chart repository with fixed latest versions.
    #[derive(Default)]
    pub(crate) struct FakeCharts {
        pub(crate) latest: HashMap<String, String>,
        pub(crate) added: RefCell<Vec<(String, String)>>,
        pub(crate) updates: RefCell<usize>,
    }

    impl FakeCharts {
        pub(crate) fn with(mut self, name: &str, version: &str) -> Self {
            self.latest.insert(name.to_string(), version.to_string());
            self
        }
    }

    impl ChartRepository for FakeCharts {
        fn add_repo_if_missing(&self, url: &str, name: &str) -> Result<(), SyncError> {
            self.added.borrow_mut().push((url.to_string(), name.to_string()));
            Ok(())
        }

        fn update_index(&self) -> Result<(), SyncError> {
            *self.updates.borrow_mut() += 1;
            Ok(())
        }

        fn search(&self, name: &str, _exact: bool) -> Result<Vec<ChartSummary>, SyncError> {
            Ok(self
                .latest
                .get(name)
                .map(|v| ChartSummary {
                    name: name.to_string(),
                    version: v.clone(),
                })
                .into_iter()
                .collect())
        }
    }
}
