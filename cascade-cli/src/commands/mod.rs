//! Subcommands and the arguments they share.

pub mod batch;
pub mod diff;
pub mod pr;
pub mod promote;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use cascade_core::{config, UpdateConfig};
use cascade_sync::{
    Collaborators, CommandRunner, DirectoryPublisher, HelmChartRepository, ProcessRunner,
    PullRequestPublisher, RepositoryDiscovery, RunContext, RunReport,
};

use crate::checkout::CheckoutPublisher;
use crate::github::GithubDiscovery;

// ---------------------------------------------------------------------------
// Shared arguments
// ---------------------------------------------------------------------------

/// Where the rule set and the version come from.
#[derive(Args, Debug, Clone)]
pub struct RuleSetArgs {
    /// Directory the rule set and version file are resolved against.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Rule set file; defaults to `<dir>/.jx/updatebot.yaml`.
    #[arg(short = 'c', long)]
    pub config_file: Option<PathBuf>,

    /// Version to propagate; defaults to the version file, then `$VERSION`.
    #[arg(long)]
    pub version: Option<String>,

    /// File holding the version; defaults to `<dir>/VERSION`.
    #[arg(long)]
    pub version_file: Option<PathBuf>,
}

impl RuleSetArgs {
    /// The rule set, or an empty one with a warning when the file is missing.
    pub fn load_config(&self) -> Result<UpdateConfig> {
        let loaded = config::load_update_config_at(&self.dir, self.config_file.as_deref())
            .context("failed to load rule set")?;
        Ok(loaded.unwrap_or_else(|| {
            let path = self
                .config_file
                .clone()
                .unwrap_or_else(|| config::default_config_path_at(&self.dir));
            tracing::warn!("file {} does not exist so cannot create any updatebot Pull Requests", path.display());
            UpdateConfig::default()
        }))
    }

    pub fn resolve_version(&self) -> Result<String> {
        let env = std::env::var("VERSION").ok();
        let version = config::resolve_version_at(
            &self.dir,
            self.version.as_deref(),
            self.version_file.as_deref(),
            env.as_deref(),
        )?;
        Ok(version)
    }
}

/// Pull request wording and output options.
#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Pull request title; defaults to `fix: upgrade to version <version>`.
    #[arg(long)]
    pub pull_request_title: Option<String>,

    /// Pull request body.
    #[arg(long)]
    pub pull_request_body: Option<String>,

    /// Label to add to pull requests; repeat for several.
    #[arg(short, long = "label")]
    pub labels: Vec<String>,

    /// Treat `<DIR>/<repository name>` as the checkout of each repository instead of cloning.
    #[arg(long)]
    pub local_dir: Option<PathBuf>,

    /// Where repositories are cloned.
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Token for repository discovery; defaults to `$GIT_TOKEN`, then `$GITHUB_TOKEN`.
    #[arg(long)]
    pub git_token: Option<String>,

    /// Apply changes without writing files or publishing.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl PublishArgs {
    pub fn run_context(&self, version: String) -> RunContext {
        let mut ctx = RunContext::new(version);
        ctx.dry_run = self.dry_run;
        ctx.labels = self.labels.clone();
        ctx.pull_request_title = self.pull_request_title.clone().unwrap_or_default();
        ctx.pull_request_body = self.pull_request_body.clone().unwrap_or_default();
        ctx
    }

    pub fn git_token(&self) -> Option<String> {
        self.git_token
            .clone()
            .or_else(|| std::env::var("GIT_TOKEN").ok())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn work_dir(&self) -> Result<PathBuf> {
        match &self.work_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_work_dir(),
        }
    }

    /// Local checkouts with `--local-dir`, otherwise fresh clones.
    pub fn publisher(&self) -> Result<Box<dyn PullRequestPublisher>> {
        if let Some(root) = &self.local_dir {
            return Ok(Box::new(DirectoryPublisher::under(root)));
        }
        let work_dir = self.work_dir()?;
        tracing::debug!("cloning repositories into {}", work_dir.display());
        Ok(Box::new(CheckoutPublisher::new(ProcessRunner, &work_dir, self.dry_run)))
    }
}

/// `<cache dir>/cascade/repositories`
pub fn default_work_dir() -> Result<PathBuf> {
    let cache = dirs::cache_dir().context("could not determine cache directory")?;
    Ok(cache.join("cascade").join("repositories"))
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Concrete collaborators owned by a command for the length of a run.
pub struct Services {
    pub runner: ProcessRunner,
    pub charts: HelmChartRepository<ProcessRunner>,
    pub discovery: Option<GithubDiscovery>,
}

impl Services {
    pub fn new(dir: &Path, git_token: Option<String>) -> Self {
        Self {
            runner: ProcessRunner,
            charts: HelmChartRepository::new(ProcessRunner, dir),
            discovery: git_token.map(GithubDiscovery::new),
        }
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            runner: &self.runner as &dyn CommandRunner,
            charts: &self.charts,
            discovery: self.discovery.as_ref().map(|d| d as &dyn RepositoryDiscovery),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "repository")]
    repository: String,
    #[tabled(rename = "files")]
    files: usize,
    #[tabled(rename = "commit")]
    commit: String,
    #[tabled(rename = "pull request")]
    pull_request: String,
}

pub fn print_report(report: &RunReport, dry_run: bool, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("failed to serialize run report")?
        );
        return Ok(());
    }

    let prefix = if dry_run { "[dry-run] " } else { "" };
    if report.outcomes.is_empty() {
        println!("{prefix}No repositories to update.");
        return Ok(());
    }

    let rows: Vec<OutcomeRow> = report
        .outcomes
        .iter()
        .map(|o| OutcomeRow {
            repository: o.git_url.clone(),
            files: o.changed_files.len(),
            commit: o.commit_title.clone(),
            pull_request: o
                .pull_request
                .as_ref()
                .map(|pr| pr.url.clone())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let published = report.outcomes.iter().filter(|o| o.pull_request.is_some()).count();
    println!(
        "{prefix}{} {} file(s) changed across {} repositories, {} published",
        "✓".green().bold(),
        report.changed_files(),
        report.outcomes.len(),
        published,
    );
    Ok(())
}

/// One line per changed file: `✎` written, `~` would be written.
pub fn print_changed_files(files: &[PathBuf], dry_run: bool) {
    let mark = if dry_run { "~" } else { "✎" };
    for path in files {
        println!("  {mark}  {}", path.display());
    }
}

pub fn print_diffs(diffs: &[cascade_sync::FileDiff]) {
    for diff in diffs {
        print!("{}", diff.unified_diff);
        if !diff.unified_diff.ends_with('\n') {
            println!();
        }
    }
}
