//! Source → target version synchronisation.
//!
//! The source tree is scanned into a map keyed by [`ResourceVersion::key`]
//! (last entry wins). The target tree is then scanned and every entry that
//! passes the filters and has a source counterpart gets the source version.
//! Entries are never added or removed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cascade_core::TextFilter;

use crate::error::SyncError;
use crate::manifest::visit_manifests;
use crate::resource::{KindFilter, ResourceVersion};
use crate::writer::ChangeWriter;

/// Which target entries a sync may touch.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub kinds: KindFilter,
    /// Include/exclude test on the repository URL or chart name.
    pub primary: TextFilter,
    /// Include/exclude test on the path, sourceRef name or namespace.
    pub secondary: TextFilter,
    /// Only update entries carrying the sync marker.
    pub update_only_marked: bool,
}

impl SyncOptions {
    pub fn new(kinds: KindFilter) -> Self {
        Self {
            kinds,
            primary: TextFilter::default(),
            secondary: TextFilter::default(),
            update_only_marked: false,
        }
    }

    fn matches(&self, version: &ResourceVersion) -> bool {
        self.primary.matches(&version.primary) && self.secondary.matches(&version.secondary)
    }
}

/// A target entry whose version was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedEntry {
    pub path: PathBuf,
    pub name: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Distinct keys found in the source tree.
    pub source_entries: usize,
    pub updated: Vec<SyncedEntry>,
    pub changed_files: Vec<PathBuf>,
}

/// Copy versions from `source_dir` into the matching entries of `target_dir`.
///
/// A mutation failure aborts the whole sync.
pub fn sync_versions(
    source_dir: &Path,
    target_dir: &Path,
    options: &SyncOptions,
    writer: &mut ChangeWriter,
) -> Result<SyncReport, SyncError> {
    let sources = find_source_versions(source_dir, &options.kinds)
        .map_err(|e| e.context("failed to find source versions"))?;

    let mut report = SyncReport {
        source_entries: sources.len(),
        ..SyncReport::default()
    };
    let changed_files = visit_manifests(target_dir, &options.kinds, writer, |entry| {
        let target = &entry.version;
        if target.primary.is_empty() || !options.matches(target) {
            return Ok(None);
        }
        let Some(source) = sources.get(&target.key()) else {
            return Ok(None);
        };
        if options.update_only_marked && !entry.marked {
            tracing::debug!("skipping unmarked {target} in {}", entry.path.display());
            return Ok(None);
        }
        if source.version != target.version {
            report.updated.push(SyncedEntry {
                path: entry.path.to_path_buf(),
                name: target.primary.clone(),
                from: target.version.clone(),
                to: source.version.clone(),
            });
        }
        Ok(Some(source.version.clone()))
    })
    .map_err(|e| e.context("failed to modify target versions"))?;

    report.changed_files = changed_files;
    Ok(report)
}

/// Versions in `dir` keyed by identity; entries without identity or version are ignored.
pub fn find_source_versions(
    dir: &Path,
    kinds: &KindFilter,
) -> Result<HashMap<String, ResourceVersion>, SyncError> {
    let mut sources = HashMap::new();
    // source scans never write, so a dry-run writer keeps the tree untouched
    let mut writer = ChangeWriter::new(true);
    visit_manifests(dir, kinds, &mut writer, |entry| {
        let v = &entry.version;
        if v.primary.is_empty() || v.version.is_empty() {
            return Ok(None);
        }
        tracing::debug!("found source {v}");
        sources.insert(v.key(), v.clone());
        Ok(None)
    })?;
    Ok(sources)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
