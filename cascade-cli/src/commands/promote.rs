//! `cascade promote` — set a released version in a GitOps tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use cascade_core::config::{resolve_version_at, with_version_prefix};
use cascade_sync::{promote_applications, promote_helm_releases, unified_diffs, ChangeWriter};

use super::{print_changed_files, print_diffs};

#[derive(Subcommand, Debug)]
pub enum PromoteCommand {
    /// Set `targetRevision` on Argo CD Applications deploying a repository.
    Argo(PromoteArgoArgs),

    /// Set the chart version on Flux HelmReleases of a chart.
    Flux(PromoteFluxArgs),
}

pub fn run(command: PromoteCommand) -> Result<()> {
    match command {
        PromoteCommand::Argo(args) => args.run(),
        PromoteCommand::Flux(args) => args.run(),
    }
}

/// Arguments for `cascade promote argo`.
#[derive(Args, Debug)]
pub struct PromoteArgoArgs {
    /// Tree to modify.
    #[arg(long, default_value = ".")]
    pub target_dir: PathBuf,

    /// Git URL of the released repository.
    #[arg(long)]
    pub source_git_url: String,

    /// Released version, used as given.
    #[arg(long)]
    pub version: Option<String>,

    /// File holding the version; defaults to `VERSION`, then `$VERSION`.
    #[arg(long)]
    pub version_file: Option<PathBuf>,

    /// Prefix added to a version that was not given with `--version`.
    #[arg(long, default_value = "v")]
    pub version_prefix: String,

    /// Show what would change without writing any files.
    #[arg(long)]
    pub dry_run: bool,
}

impl PromoteArgoArgs {
    pub fn run(self) -> Result<()> {
        let version = match self.version.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => v.to_string(),
            None => {
                let env = std::env::var("VERSION").ok();
                let v = resolve_version_at(Path::new("."), None, self.version_file.as_deref(), env.as_deref())?;
                with_version_prefix(&v, &self.version_prefix)
            }
        };

        let mut writer = ChangeWriter::new(self.dry_run);
        let changed = promote_applications(&self.target_dir, &self.source_git_url, &version, &mut writer)
            .with_context(|| format!("failed to promote {} in {}", self.source_git_url, self.target_dir.display()))?;
        print_promotion(&self.target_dir, &self.source_git_url, &version, &changed, &writer);
        Ok(())
    }
}

/// Arguments for `cascade promote flux`.
#[derive(Args, Debug)]
pub struct PromoteFluxArgs {
    /// Tree to modify.
    #[arg(long, default_value = ".")]
    pub target_dir: PathBuf,

    /// Chart name of the released chart.
    #[arg(long)]
    pub chart: String,

    /// Only releases whose sourceRef has this name.
    #[arg(long, default_value = "")]
    pub source_ref_name: String,

    /// Released chart version.
    #[arg(long)]
    pub version: String,

    /// Show what would change without writing any files.
    #[arg(long)]
    pub dry_run: bool,
}

impl PromoteFluxArgs {
    pub fn run(self) -> Result<()> {
        let mut writer = ChangeWriter::new(self.dry_run);
        let changed = promote_helm_releases(
            &self.target_dir,
            &self.chart,
            &self.source_ref_name,
            self.version.trim(),
            &mut writer,
        )
        .with_context(|| format!("failed to promote chart {} in {}", self.chart, self.target_dir.display()))?;
        print_promotion(&self.target_dir, &self.chart, self.version.trim(), &changed, &writer);
        Ok(())
    }
}

fn print_promotion(dir: &Path, what: &str, version: &str, changed: &[PathBuf], writer: &ChangeWriter) {
    let prefix = if writer.is_dry_run() { "[dry-run] " } else { "" };
    if changed.is_empty() {
        println!("{prefix}No resources for {what} need version {version} in {}.", dir.display());
        return;
    }
    println!(
        "{prefix}{} promoted {what} to {} ({} files)",
        "✓".green().bold(),
        version.bold(),
        changed.len()
    );
    print_changed_files(changed, writer.is_dry_run());
    if writer.is_dry_run() {
        print_diffs(&unified_diffs(writer, dir));
    }
}
