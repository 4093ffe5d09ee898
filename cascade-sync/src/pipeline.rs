//! Rule orchestration.
//!
//! A [`RuleEngine`] walks the rules of an [`UpdateConfig`] and, for every
//! target repository, asks a [`PullRequestPublisher`] to prepare a checkout,
//! applies the rule's changes to it and hands the result back for
//! publishing. Everything a run accumulates lives in an explicit
//! [`RunContext`].
//!
//! Two policies apply:
//!
//! - [`RuleEngine::run`]: the repositories of a rule set are processed
//!   fail-fast; the first error aborts the run.
//! - [`RuleEngine::run_batch`]: independent repositories are all attempted
//!   and every failure is returned together as [`SyncError::Batch`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use cascade_core::{trim_git_url_suffix, Change, ChangeKind, UpdateConfig, VersionKind};
use cascade_renderer::{TemplateData, VersionContext, VersionTemplater};

use crate::command::{Command, CommandRunner};
use crate::diff::{unified_diffs, FileDiff};
use crate::error::{io_err, SyncError};
use crate::godep::{self, RepositoryDiscovery};
use crate::regex_change::apply_regex;
use crate::version_stream::{self, update_charts, ChartRepository};
use crate::writer::ChangeWriter;

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

/// State of one run, created before the first rule and dropped after the last.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// The version being propagated.
    pub version: String,
    /// Pull requests published so far, visible to version templates.
    pub template_data: TemplateData,
    pub dry_run: bool,
    pub labels: Vec<String>,
    /// Pull request title; defaults to `fix: upgrade to version <version>`.
    pub pull_request_title: String,
    pub pull_request_body: String,
}

impl RunContext {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn title(&self) -> String {
        if self.pull_request_title.is_empty() {
            format!("fix: upgrade to version {}", self.version)
        } else {
            self.pull_request_title.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// What a pull request for one repository should say.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestDetails {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// A published pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullRequestInfo {
    /// Repository name, the key under which templates see the pull request.
    pub repository: String,
    pub url: String,
    /// Head commit of the pull request branch.
    pub sha: String,
}

/// Result of applying a rule's changes to one checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Files modified through the change writer. Command and go changes run
    /// external programs, so their edits are only visible to the checkout.
    pub changed_files: Vec<PathBuf>,
    /// Overrides the pull request title as the commit title.
    pub commit_title: Option<String>,
    /// Markdown notes for the pull request body.
    pub notes: String,
    pub diffs: Vec<FileDiff>,
}

impl ApplyOutcome {
    pub fn commit_title<'a>(&'a self, details: &'a PullRequestDetails) -> &'a str {
        self.commit_title.as_deref().unwrap_or(&details.title)
    }

    /// The details body followed by the notes.
    pub fn body(&self, details: &PullRequestDetails) -> String {
        match (details.body.is_empty(), self.notes.is_empty()) {
            (_, true) => details.body.clone(),
            (true, false) => self.notes.clone(),
            (false, false) => format!("{}\n\n{}", details.body, self.notes),
        }
    }
}

/// Callback that applies changes to a prepared checkout.
pub type ApplyFn<'a> = dyn FnMut(&Path) -> Result<ApplyOutcome, SyncError> + 'a;

/// Prepares a working tree for a repository, applies changes to it and
/// publishes the result.
pub trait PullRequestPublisher {
    /// Returns `None` when nothing was published, e.g. the tree is unchanged.
    fn publish(
        &mut self,
        git_url: &str,
        details: &PullRequestDetails,
        apply: &mut ApplyFn<'_>,
    ) -> Result<Option<PullRequestInfo>, SyncError>;
}

/// Applies changes to local directories and publishes nothing.
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    root: PathBuf,
    per_repository: bool,
}

impl DirectoryPublisher {
    /// Every repository is the tree at `dir`.
    pub fn single(dir: &Path) -> Self {
        Self {
            root: dir.to_path_buf(),
            per_repository: false,
        }
    }

    /// Each repository is the tree at `<root>/<repository name>`.
    pub fn under(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            per_repository: true,
        }
    }

    pub fn dir_for(&self, git_url: &str) -> PathBuf {
        if self.per_repository {
            self.root.join(repository_name(git_url))
        } else {
            self.root.clone()
        }
    }
}

impl PullRequestPublisher for DirectoryPublisher {
    fn publish(
        &mut self,
        git_url: &str,
        _details: &PullRequestDetails,
        apply: &mut ApplyFn<'_>,
    ) -> Result<Option<PullRequestInfo>, SyncError> {
        let dir = self.dir_for(git_url);
        if !dir.is_dir() {
            return Err(io_err(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no working tree for repository"),
            ));
        }
        let outcome = apply(&dir)?;
        tracing::info!("{} file(s) changed for {git_url}", outcome.changed_files.len());
        Ok(None)
    }
}

/// Last path segment of a git URL without `.git`.
pub fn repository_name(git_url: &str) -> &str {
    let url = trim_git_url_suffix(git_url.trim());
    url.rsplit(['/', ':']).next().unwrap_or(url)
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// External services the engine talks to, constructed before the run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub runner: &'a dyn CommandRunner,
    pub charts: &'a dyn ChartRepository,
    /// Without discovery, `go` changes only apply to the URLs listed in the rule.
    pub discovery: Option<&'a dyn RepositoryDiscovery>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryOutcome {
    pub git_url: String,
    pub changed_files: Vec<PathBuf>,
    pub commit_title: String,
    pub notes: String,
    pub pull_request: Option<PullRequestInfo>,
    pub diffs: Vec<FileDiff>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<RepositoryOutcome>,
}

impl RunReport {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcomes: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn changed_files(&self) -> usize {
        self.outcomes.iter().map(|o| o.changed_files.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// RuleEngine
// ---------------------------------------------------------------------------

pub struct RuleEngine<'a> {
    collaborators: Collaborators<'a>,
    publisher: &'a mut dyn PullRequestPublisher,
}

impl<'a> RuleEngine<'a> {
    pub fn new(collaborators: Collaborators<'a>, publisher: &'a mut dyn PullRequestPublisher) -> Self {
        Self {
            collaborators,
            publisher,
        }
    }

    /// Apply every rule of `config` to its repositories, in order.
    pub fn run(&mut self, config: &UpdateConfig, ctx: &mut RunContext) -> Result<RunReport, SyncError> {
        let mut report = RunReport::start();
        for label in &config.spec.pull_request_labels {
            if !ctx.labels.contains(label) {
                ctx.labels.push(label.clone());
            }
        }

        for (i, rule) in config.spec.rules.iter().enumerate() {
            let urls = self.rule_urls(&rule.urls, &rule.changes);
            for git_url in &urls {
                if git_url.is_empty() {
                    tracing::warn!("missing out repository {i} as it has no git URL");
                    continue;
                }
                let outcome = self
                    .process(git_url, &rule.changes, ctx)
                    .map_err(|e| e.context(format!("failed to create Pull Request on repository {git_url}")))?;
                record(ctx, &outcome);
                report.outcomes.push(outcome);
            }
        }
        Ok(report.finish())
    }

    /// Apply `changes` to each of `urls`, attempting all of them.
    ///
    /// Duplicate and empty URLs are skipped. Failures are collected and
    /// returned together once every repository has been tried.
    pub fn run_batch(
        &mut self,
        urls: &[String],
        changes: &[Change],
        ctx: &mut RunContext,
    ) -> Result<RunReport, SyncError> {
        let mut report = RunReport::start();
        let mut seen = BTreeSet::new();
        let mut errors = Vec::new();
        for git_url in urls {
            if git_url.is_empty() || !seen.insert(trim_git_url_suffix(git_url)) {
                continue;
            }
            match self.process(git_url, changes, ctx) {
                Ok(outcome) => {
                    record(ctx, &outcome);
                    report.outcomes.push(outcome);
                }
                Err(err) => {
                    tracing::warn!("failed to upgrade repository {git_url}: {err}");
                    errors.push(err.context(format!("failed to upgrade repository {git_url}")));
                }
            }
        }
        SyncError::combine(errors)?;
        Ok(report.finish())
    }

    /// The rule's URLs plus repositories discovered for its `go` changes.
    fn rule_urls(&self, urls: &[String], changes: &[Change]) -> Vec<String> {
        let mut urls = urls.to_vec();
        for go in changes.iter().filter_map(|c| c.go.as_ref()) {
            if go.owners.is_empty() {
                continue;
            }
            match self.collaborators.discovery {
                Some(discovery) => {
                    godep::find_dependent_urls(go, discovery, &mut urls);
                }
                None => tracing::warn!("no repository discovery configured; not querying {}", go.owners.join(", ")),
            }
        }
        urls
    }

    fn process(
        &mut self,
        git_url: &str,
        changes: &[Change],
        ctx: &RunContext,
    ) -> Result<RepositoryOutcome, SyncError> {
        let details = PullRequestDetails {
            title: ctx.title(),
            body: ctx.pull_request_body.clone(),
            labels: ctx.labels.clone(),
        };
        let collaborators = self.collaborators;
        let mut applied = None;
        let pull_request = self.publisher.publish(git_url, &details, &mut |dir: &Path| {
            let outcome = apply_changes(dir, git_url, changes, ctx, collaborators)?;
            applied = Some(outcome.clone());
            Ok(outcome)
        })?;
        if pull_request.is_none() {
            tracing::info!("no Pull Request created for {git_url}");
        }

        let applied = applied.unwrap_or_default();
        Ok(RepositoryOutcome {
            git_url: git_url.to_string(),
            commit_title: applied.commit_title(&details).to_string(),
            changed_files: applied.changed_files,
            notes: applied.notes,
            pull_request,
            diffs: applied.diffs,
        })
    }
}

fn record(ctx: &mut RunContext, outcome: &RepositoryOutcome) {
    if let Some(pr) = &outcome.pull_request {
        ctx.template_data.record_pull_request(pr.repository.clone(), pr.sha.clone());
    }
}

// ---------------------------------------------------------------------------
// Changes
// ---------------------------------------------------------------------------

/// Apply `changes` in order to the checkout of `git_url` at `dir`.
///
/// Later changes see the edits of earlier ones, also in dry-run.
pub fn apply_changes(
    dir: &Path,
    git_url: &str,
    changes: &[Change],
    ctx: &RunContext,
    collaborators: Collaborators<'_>,
) -> Result<ApplyOutcome, SyncError> {
    let mut writer = ChangeWriter::new(ctx.dry_run);
    let mut outcome = ApplyOutcome::default();
    for change in changes {
        apply_change(dir, git_url, change, ctx, collaborators, &mut writer, &mut outcome)
            .map_err(|e| e.context("failed to apply change"))?;
    }
    outcome.changed_files = writer.changed_files();
    outcome.diffs = unified_diffs(&writer, dir);
    Ok(outcome)
}

fn apply_change(
    dir: &Path,
    git_url: &str,
    change: &Change,
    ctx: &RunContext,
    collaborators: Collaborators<'_>,
    writer: &mut ChangeWriter,
    outcome: &mut ApplyOutcome,
) -> Result<(), SyncError> {
    let Some(kind) = change.kind()? else {
        tracing::info!("ignoring change with nothing to do for {git_url}");
        return Ok(());
    };
    let version = VersionTemplater::new()
        .resolve(
            &change.version_template,
            &VersionContext::new(&ctx.version, git_url, &ctx.template_data),
        )
        .map_err(|e| {
            SyncError::from(e).context(format!("failed to evaluate version template {}", change.version_template))
        })?;

    match kind {
        ChangeKind::Regex(regex) => {
            apply_regex(dir, &regex.globs, &regex.pattern, &version, writer)?;
        }
        ChangeKind::VersionStream(vs) => {
            let kind = VersionKind::parse(&vs.kind)?;
            if kind != VersionKind::Charts {
                tracing::info!("version stream kind {kind} has no upgrades");
                return Ok(());
            }
            outcome.commit_title = Some(version_stream::COMMIT_TITLE.to_string());
            let report = update_charts(dir, &vs.pattern, collaborators.charts, writer)
                .map_err(|e| e.context(format!("failed to apply kind {kind}")))?;
            append_notes(&mut outcome.notes, &report.notes);
        }
        ChangeKind::Go(go) => {
            outcome.commit_title = Some(godep::COMMIT_TITLE.to_string());
            if ctx.dry_run {
                tracing::info!("[dry-run] skipping go dependency upgrades for {git_url}");
                return Ok(());
            }
            godep::upgrade_dependencies(dir, git_url, go, collaborators.runner)?;
        }
        ChangeKind::Command(command) => {
            let cmd = command
                .env
                .iter()
                .fold(Command::new(dir, &command.name, command.args.iter().cloned()), |cmd, e| {
                    cmd.with_env(e.name.clone(), e.value.clone())
                });
            if ctx.dry_run {
                tracing::info!("[dry-run] would run {}", cmd.cli());
                return Ok(());
            }
            let out = collaborators.runner.run(&cmd).map_err(|e| e.context(format!("failed to run command {}", cmd.cli())))?;
            tracing::debug!("{}", out.trim_end());
        }
    }
    Ok(())
}

fn append_notes(notes: &mut String, more: &str) {
    if more.is_empty() {
        return;
    }
    if !notes.is_empty() {
        notes.push('\n');
    }
    notes.push_str(more);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
