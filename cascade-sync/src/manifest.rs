//! Manifest tree walker.
//!
//! Visits every `*.yaml` / `*.yml` file under a directory (hidden directories
//! such as `.git` are skipped), splits multi-document files on `---`, and
//! hands each versioned entry accepted by the [`KindFilter`] to a callback.
//! The callback may return a version to set; modified files go through the
//! [`ChangeWriter`].

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use walkdir::{DirEntry, WalkDir};

use crate::error::{io_err, SyncError};
use crate::resource::{KindFilter, Resource, ResourceVersion};
use crate::writer::ChangeWriter;

/// One versioned entry found while walking a tree.
#[derive(Debug)]
pub struct ManifestEntry<'a> {
    pub path: &'a Path,
    pub resource: Resource,
    pub version: ResourceVersion,
    /// Whether the entry carries the sync marker.
    pub marked: bool,
}

/// Walk `dir` and visit every entry accepted by `filter`.
///
/// Returns the files that were modified. Files that are not valid YAML are
/// not manifests and are skipped; read and write failures abort the walk.
pub fn visit_manifests<F>(
    dir: &Path,
    filter: &KindFilter,
    writer: &mut ChangeWriter,
    mut visit: F,
) -> Result<Vec<PathBuf>, SyncError>
where
    F: FnMut(&ManifestEntry<'_>) -> Result<Option<String>, SyncError>,
{
    let mut modified = Vec::new();
    for path in yaml_files(dir) {
        let path = path?;
        let text = writer.read(&path)?;
        let mut changed = false;
        let mut documents: Vec<String> = Vec::new();

        for chunk in split_documents(&text) {
            let doc: Value = match serde_yaml::from_str(chunk) {
                Ok(doc) => doc,
                Err(err) => {
                    tracing::debug!("skipping {}: not a manifest: {err}", path.display());
                    documents.push(chunk.to_string());
                    continue;
                }
            };
            let mut updated = chunk.to_string();
            for resource in Resource::discover(&doc) {
                if !filter.accepts(resource.kind()) {
                    continue;
                }
                let entry = ManifestEntry {
                    path: &path,
                    resource,
                    version: resource.get(&doc),
                    marked: resource.is_marked(&doc),
                };
                if let Some(version) = visit(&entry)? {
                    updated = resource.set(&updated, &version).map_err(|e| SyncError::Mutation {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                    tracing::debug!("modified the version in file {} to {version}", path.display());
                }
            }
            changed |= updated != chunk;
            documents.push(updated);
        }

        if changed && writer.write(&path, &documents.concat())?.is_change() {
            modified.push(path);
        }
    }
    Ok(modified)
}

/// Lazily yields the YAML files under `dir` in walk order.
pub fn yaml_files(dir: &Path) -> impl Iterator<Item = Result<PathBuf, SyncError>> {
    let root = dir.to_path_buf();
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        .filter_map(move |entry| match entry {
            Ok(entry) => {
                let is_yaml = entry.file_type().is_file()
                    && matches!(
                        entry.path().extension().and_then(|e| e.to_str()),
                        Some("yaml" | "yml")
                    );
                is_yaml.then(|| Ok(entry.into_path()))
            }
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                Some(Err(io_err(path, err.into())))
            }
        })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Splits a YAML stream into documents whose concatenation is the input.
///
/// Each document after the first starts with its `---` separator line.
pub fn split_documents(text: &str) -> Vec<&str> {
    let mut starts = vec![0];
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if offset > 0 && is_separator(line) {
            starts.push(offset);
        }
        offset += line.len();
    }
    starts.push(text.len());
    starts.windows(2).map(|w| &text[w[0]..w[1]]).collect()
}

fn is_separator(line: &str) -> bool {
    line.strip_prefix("---")
        .map(|rest| rest.is_empty() || rest.starts_with([' ', '\t', '\r', '\n']))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
