//! Regex substitution over glob-selected files.
//!
//! When the pattern has a capture group named `version`, only those groups
//! are replaced and every other group is copied through. Otherwise every
//! capture group is replaced with the new version. Files are rewritten only
//! when their content changes, so reapplying the same version is a no-op.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{io_err, SyncError};
use crate::writer::ChangeWriter;

/// Capture group name that makes substitution selective.
pub const VERSION_GROUP: &str = "version";

/// Apply `pattern` to every file matched by `globs` under `dir`.
///
/// Returns the number of files changed. Files that are not UTF-8 text are
/// skipped with a warning. Every matched file is read and substituted before
/// anything is written, so a read or glob failure leaves the tree untouched.
pub fn apply_regex(
    dir: &Path,
    globs: &[String],
    pattern: &str,
    version: &str,
    writer: &mut ChangeWriter,
) -> Result<usize, SyncError> {
    let re = compile(pattern)?;

    let mut pending: Vec<(PathBuf, String)> = Vec::new();
    for path in matched_files(dir, globs) {
        let path = path?;
        if pending.iter().any(|(p, _)| *p == path) {
            continue;
        }
        tracing::debug!("found file {}", path.display());
        let text = match writer.read(&path) {
            Ok(text) => text,
            Err(SyncError::Io { source, .. }) if source.kind() == ErrorKind::InvalidData => {
                tracing::warn!("skipping non-UTF-8 file {}", path.display());
                continue;
            }
            Err(err) => return Err(err),
        };
        let updated = substitute(&re, &text, version);
        if updated != text {
            pending.push((path, updated));
        }
    }

    let mut changed = 0;
    for (path, updated) in pending {
        if writer.write(&path, &updated)?.is_change() {
            changed += 1;
        }
    }
    Ok(changed)
}

fn compile(pattern: &str) -> Result<Regex, SyncError> {
    if pattern.is_empty() {
        return Err(SyncError::Config("no pattern for regex change".to_string()));
    }
    Regex::new(pattern).map_err(|source| SyncError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Lazily yields regular files matched by `globs` relative to `dir`.
///
/// `**` matches any number of directories. Calling again restarts the walk.
pub fn matched_files<'a>(
    dir: &'a Path,
    globs: &'a [String],
) -> impl Iterator<Item = Result<PathBuf, SyncError>> + 'a {
    let root = glob::Pattern::escape(&dir.to_string_lossy());
    globs.iter().flat_map(move |g| {
        let pattern = format!("{root}/{}", g.trim_start_matches("./"));
        let paths: Box<dyn Iterator<Item = Result<PathBuf, SyncError>>> = match glob::glob(&pattern) {
            Ok(paths) => Box::new(paths.filter_map(|entry| match entry {
                Ok(path) if path.is_file() => Some(Ok(path)),
                Ok(_) => None,
                Err(err) => {
                    let path = err.path().to_path_buf();
                    Some(Err(io_err(path, std::io::Error::from(err))))
                }
            })),
            Err(err) => Box::new(std::iter::once(Err(SyncError::Glob {
                pattern: g.clone(),
                message: err.to_string(),
            }))),
        };
        paths
    })
}

/// Replace the version-bearing captures of every match in `text`.
pub fn substitute(re: &Regex, text: &str, version: &str) -> String {
    let selected: Vec<bool> = re.capture_names().map(|n| n == Some(VERSION_GROUP)).collect();
    let selective = selected.iter().any(|s| *s);

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        let mut pos = whole.start();
        for (i, group) in caps.iter().enumerate().skip(1) {
            let Some(group) = group else { continue };
            if (selective && !selected[i]) || group.start() < pos {
                continue;
            }
            out.push_str(&text[pos..group.start()]);
            out.push_str(version);
            pos = group.end();
        }
        out.push_str(&text[pos..whole.end()]);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
