//! `cascade sync` — copy versions from a source GitOps tree into a target tree.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use cascade_core::TextFilter;
use cascade_sync::{sync_versions, unified_diffs, ChangeWriter, KindFilter, SyncOptions};

use super::{print_changed_files, print_diffs};

/// Which resources a sync reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKindArg {
    Argo,
    Flux,
    Helmfile,
}

impl FromStr for SyncKindArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "argo" | "argocd" => Ok(Self::Argo),
            "flux" => Ok(Self::Flux),
            "helmfile" => Ok(Self::Helmfile),
            other => Err(format!("unknown kind '{other}'; expected: argo, flux, helmfile")),
        }
    }
}

impl fmt::Display for SyncKindArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Argo => "argo",
            Self::Flux => "flux",
            Self::Helmfile => "helmfile",
        })
    }
}

impl From<SyncKindArg> for KindFilter {
    fn from(kind: SyncKindArg) -> Self {
        match kind {
            SyncKindArg::Argo => KindFilter::argo(),
            SyncKindArg::Flux => KindFilter::flux(),
            SyncKindArg::Helmfile => KindFilter::helmfile(),
        }
    }
}

/// Arguments for `cascade sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Resource kind to synchronise: argo, flux or helmfile.
    pub kind: SyncKindArg,

    /// Tree the versions are read from.
    #[arg(long)]
    pub source_dir: PathBuf,

    /// Tree the versions are written to.
    #[arg(long, default_value = ".")]
    pub target_dir: PathBuf,

    /// Repository URL or chart name patterns to include.
    #[arg(long = "primary-include")]
    pub primary_includes: Vec<String>,

    /// Repository URL or chart name patterns to exclude.
    #[arg(long = "primary-exclude")]
    pub primary_excludes: Vec<String>,

    /// Path, sourceRef name or namespace patterns to include.
    #[arg(long = "secondary-include")]
    pub secondary_includes: Vec<String>,

    /// Path, sourceRef name or namespace patterns to exclude.
    #[arg(long = "secondary-exclude")]
    pub secondary_excludes: Vec<String>,

    /// Only update entries marked for synchronisation.
    #[arg(long)]
    pub update_only_marked: bool,

    /// Show what would change without writing any files.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let mut options = SyncOptions::new(self.kind.into());
        options.primary = TextFilter::new(self.primary_includes, self.primary_excludes);
        options.secondary = TextFilter::new(self.secondary_includes, self.secondary_excludes);
        options.update_only_marked = self.update_only_marked;

        let mut writer = ChangeWriter::new(self.dry_run);
        let report = sync_versions(&self.source_dir, &self.target_dir, &options, &mut writer)
            .with_context(|| {
                format!(
                    "failed to sync {} versions from {} to {}",
                    self.kind,
                    self.source_dir.display(),
                    self.target_dir.display()
                )
            })?;

        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        if report.updated.is_empty() {
            println!(
                "{prefix}{} {} — nothing to do ({} source entries)",
                "✓".green().bold(),
                self.target_dir.display(),
                report.source_entries
            );
            return Ok(());
        }

        println!(
            "{prefix}{} {} synced ({} entries updated, {} files)",
            "✓".green().bold(),
            self.target_dir.display(),
            report.updated.len(),
            report.changed_files.len()
        );
        for entry in &report.updated {
            println!("  {} {} → {}", entry.name, entry.from.dimmed(), entry.to);
        }
        print_changed_files(&report.changed_files, self.dry_run);
        if self.dry_run {
            print_diffs(&unified_diffs(&writer, &self.target_dir));
        }
        Ok(())
    }
}
