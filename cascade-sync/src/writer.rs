//! Change writer shared by every engine.
//!
//! ## `write` protocol
//!
//! 1. Read the current content (pending overlay first, then disk).
//! 2. Compare bytes with the new content → `Unchanged` if identical.
//! 3. Dry-run: keep the new content in the overlay → `WouldWrite`.
//! 4. Write to `<path>.cascade.tmp`.
//! 5. Rename to the final path (atomic on POSIX) → `Written`.
//!
//! Every change is remembered with its original content so a run can report
//! which files changed and render diffs for them.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Write result
// ---------------------------------------------------------------------------

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped; new content matches the current content.
    Unchanged { path: PathBuf },
    /// `--dry-run` mode: the file *would* have been written.
    WouldWrite { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path }
            | WriteResult::Unchanged { path }
            | WriteResult::WouldWrite { path } => path,
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, WriteResult::Unchanged { .. })
    }
}

/// A file modified during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Content before the first modification; `None` if the file was created.
    pub original: Option<String>,
    pub updated: String,
}

// ---------------------------------------------------------------------------
// ChangeWriter
// ---------------------------------------------------------------------------

/// Reads and writes repository files for one unit of work.
#[derive(Debug, Default)]
pub struct ChangeWriter {
    dry_run: bool,
    changes: BTreeMap<PathBuf, FileChange>,
}

impl ChangeWriter {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            changes: BTreeMap::new(),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Current content of `path`, including changes not yet on disk.
    pub fn read(&self, path: &Path) -> Result<String, SyncError> {
        match self.changes.get(path) {
            Some(change) => Ok(change.updated.clone()),
            None => std::fs::read_to_string(path).map_err(|e| io_err(path, e)),
        }
    }

    /// Like [`read`](Self::read), but a missing file is `None`.
    pub fn read_optional(&self, path: &Path) -> Result<Option<String>, SyncError> {
        match self.changes.get(path) {
            Some(change) => Ok(Some(change.updated.clone())),
            None => read_if_exists(path),
        }
    }

    /// Replace the content of `path` when it differs.
    pub fn write(&mut self, path: &Path, content: &str) -> Result<WriteResult, SyncError> {
        let current = self.read_optional(path)?;
        if current.as_deref() == Some(content) {
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }

        let result = if self.dry_run {
            tracing::info!("[dry-run] would write: {}", path.display());
            WriteResult::WouldWrite {
                path: path.to_path_buf(),
            }
        } else {
            atomic_write(path, content)?;
            tracing::info!("modified file {}", path.display());
            WriteResult::Written {
                path: path.to_path_buf(),
            }
        };

        self.changes
            .entry(path.to_path_buf())
            .and_modify(|c| c.updated = content.to_string())
            .or_insert_with(|| FileChange {
                original: current,
                updated: content.to_string(),
            });
        Ok(result)
    }

    /// Files whose content differs from what was there at the start.
    pub fn changed_files(&self) -> Vec<PathBuf> {
        self.changes
            .iter()
            .filter(|(_, c)| c.original.as_deref() != Some(c.updated.as_str()))
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn changes(&self) -> impl Iterator<Item = (&Path, &FileChange)> {
        self.changes.iter().map(|(p, c)| (p.as_path(), c))
    }
}

fn read_if_exists(path: &Path) -> Result<Option<String>, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

// ---------------------------------------------------------------------------
// atomic_write
// ---------------------------------------------------------------------------

pub(crate) fn atomic_write(path: &Path, content: &str) -> Result<(), SyncError> {
    let tmp = PathBuf::from(format!("{}.cascade.tmp", path.display()));
    atomic_write_with_tmp(path, content, &tmp)
}

fn atomic_write_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn first_write_returns_written() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("VERSION");
        let mut writer = ChangeWriter::new(false);
        let result = writer.write(&path, "1.0.0").unwrap();
        assert!(matches!(result, WriteResult::Written { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "1.0.0");
        assert_eq!(writer.changed_files(), vec![path]);
    }

    #[test]
    fn same_content_returns_unchanged() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("VERSION");
        fs::write(&path, "1.0.0").unwrap();
        let mut writer = ChangeWriter::new(false);
        let result = writer.write(&path, "1.0.0").unwrap();
        assert!(matches!(result, WriteResult::Unchanged { .. }));
        assert!(writer.changed_files().is_empty());
    }

    #[test]
    fn dry_run_overlays_without_touching_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("values.yaml");
        fs::write(&path, "version: 1\n").unwrap();

        let mut writer = ChangeWriter::new(true);
        let result = writer.write(&path, "version: 2\n").unwrap();
        assert!(matches!(result, WriteResult::WouldWrite { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "version: 1\n");
        assert_eq!(writer.read(&path).unwrap(), "version: 2\n");

        let (_, change) = writer.changes().next().unwrap();
        assert_eq!(change.original.as_deref(), Some("version: 1\n"));
    }

    #[test]
    fn reverting_a_change_is_not_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("values.yaml");
        fs::write(&path, "a").unwrap();
        let mut writer = ChangeWriter::new(true);
        writer.write(&path, "b").unwrap();
        writer.write(&path, "a").unwrap();
        assert!(writer.changed_files().is_empty());
    }

    #[test]
    fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("clean.yaml");
        ChangeWriter::new(false).write(&path, "data").unwrap();
        let tmp_path = PathBuf::from(format!("{}.cascade.tmp", path.display()));
        assert!(!tmp_path.exists(), ".cascade.tmp must be cleaned up");
    }

    #[test]
    fn preserves_crlf_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("crlf.yaml");
        ChangeWriter::new(false).write(&path, "a: 1\r\nb: 2\r\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"a: 1\r\nb: 2\r\n");
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).unwrap();

        let path = readonly_dir.join("file.yaml");
        fs::write(&path, "original").unwrap();

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join("file.yaml.cascade.tmp");

        let result = atomic_write_with_tmp(&path, "new content", &tmp_path);

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        // Root ignores directory permissions, so only assert when the rename failed.
        if result.is_err() {
            assert_eq!(fs::read_to_string(&path).unwrap(), "original");
            assert!(!tmp_path.exists(), ".cascade.tmp should be cleaned up");
        }
    }
}
