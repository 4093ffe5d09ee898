//! Unified diffs of the changes recorded by a [`ChangeWriter`].

use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;

use crate::writer::ChangeWriter;

/// A single file diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Render a diff for every file the writer changed, with headers relative to `root`.
pub fn unified_diffs(writer: &ChangeWriter, root: &Path) -> Vec<FileDiff> {
    writer
        .changes()
        .filter_map(|(path, change)| {
            let original = change.original.as_deref().unwrap_or("");
            if original == change.updated {
                return None;
            }
            let relative = path.strip_prefix(root).unwrap_or(path);
            let old_header = format!("a/{}", relative.display());
            let new_header = format!("b/{}", relative.display());
            let unified = TextDiff::from_lines(original, &change.updated)
                .unified_diff()
                .header(&old_header, &new_header)
                .context_radius(3)
                .to_string();
            Some(FileDiff {
                path: path.to_path_buf(),
                unified_diff: unified,
            })
        })
        .collect()
}
