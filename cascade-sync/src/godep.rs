//! Go module dependency upgrades.
//!
//! Repositories whose `go.mod` references a package are discovered per
//! owner and appended to a rule's URLs; in each checkout the matching
//! modules are upgraded with `go get` and tidied.

use std::path::Path;

use cascade_core::GoChange;

use crate::command::{Command, CommandRunner};
use crate::error::SyncError;

/// Commit title used when dependencies are upgraded.
pub const COMMIT_TITLE: &str = "chore: upgrade go dependencies";

/// A repository returned by a discovery query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredRepository {
    pub owner: String,
    pub name: String,
    /// Text of the dependency manifest on the default branch; empty if absent.
    pub manifest: String,
    pub archived: bool,
}

impl DiscoveredRepository {
    pub fn url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

/// Read-only query of an owner's repositories and their dependency manifests.
pub trait RepositoryDiscovery {
    fn repositories(&self, owner: &str) -> Result<Vec<DiscoveredRepository>, SyncError>;
}

/// Append the URLs of repositories that depend on `change.package`.
///
/// URLs already present, with or without `.git`, are not repeated. A failed
/// query skips that owner; archived repositories are skipped. Returns the
/// number of URLs added.
pub fn find_dependent_urls(
    change: &GoChange,
    discovery: &dyn RepositoryDiscovery,
    urls: &mut Vec<String>,
) -> usize {
    let mut added = 0;
    for owner in &change.owners {
        let repositories = match discovery.repositories(owner) {
            Ok(repositories) => repositories,
            Err(err) => {
                tracing::warn!("failed to query repositories of {owner}: {err}");
                continue;
            }
        };
        for repo in repositories {
            if repo.manifest.is_empty() || !change.repositories.matches(&repo.name) {
                continue;
            }
            if repo.archived {
                tracing::warn!("skipping archived repository {}/{}", repo.owner, repo.name);
                continue;
            }
            if !strip_module_lines(&repo.manifest).contains(&change.package) {
                continue;
            }
            tracing::info!("about to process {}/{}", repo.owner, repo.name);
            let url = repo.url();
            let git_url = format!("{url}.git");
            if !urls.iter().any(|u| *u == url || *u == git_url) {
                urls.push(url);
                added += 1;
            }
        }
    }
    added
}

/// Manifest text without blank lines and the `module` declaration.
pub fn strip_module_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("module "))
        .fold(String::new(), |mut buf, line| {
            buf.push_str(line);
            buf.push('\n');
            buf
        })
}

/// Upgrade every module of the checkout at `dir` selected by `change.upgrade_packages`.
///
/// Listing modules must succeed; a failed `go get` or `go mod tidy` is
/// logged and the next module is tried. Returns the modules attempted.
pub fn upgrade_dependencies(
    dir: &Path,
    git_url: &str,
    change: &GoChange,
    runner: &dyn CommandRunner,
) -> Result<Vec<String>, SyncError> {
    tracing::info!("finding all the go dependencies for repository: {git_url}");
    let list = Command::new(dir, "go", ["list", "-m", "-f", "{{.Path}}", "all"]);
    let text = runner
        .run(&list)
        .map_err(|e| e.context(format!("failed to run command {} on {git_url}", list.cli())))?;

    let update = if change.no_patch { "-u" } else { "-u=patch" };
    let mut attempted = Vec::new();
    for module in text.lines().map(str::trim) {
        if module.is_empty() || !change.upgrade_packages.matches(module) {
            continue;
        }
        for command in [
            Command::new(dir, "go", ["get", update, module]),
            Command::new(dir, "go", ["mod", "tidy"]),
        ] {
            if let Err(err) = runner.run(&command) {
                tracing::warn!("failed to update {module}: {err}");
            }
        }
        attempted.push(module.to_string());
    }
    Ok(attempted)
}
