//! Rule set and version loading.
//!
//! Loaders take the working directory explicitly (`_at` functions). Values
//! that come from the process environment are passed in by the caller.

use std::path::{Path, PathBuf};

use crate::error::{io_err, CoreError};
use crate::types::UpdateConfig;

/// `<dir>/.jx/updatebot.yaml`. Pure, no I/O.
pub fn default_config_path_at(dir: &Path) -> PathBuf {
    dir.join(".jx").join("updatebot.yaml")
}

/// `<dir>/VERSION`. Pure, no I/O.
pub fn default_version_file_at(dir: &Path) -> PathBuf {
    dir.join("VERSION")
}

/// Load the rule set from `config_file`, or from the default location under `dir`.
///
/// Returns `Ok(None)` when the file does not exist; the caller decides
/// whether that is worth a warning.
pub fn load_update_config_at(
    dir: &Path,
    config_file: Option<&Path>,
) -> Result<Option<UpdateConfig>, CoreError> {
    let path = config_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_config_path_at(dir));
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Some(UpdateConfig::default()));
    }
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|e| CoreError::Parse { path, source: e })
}

/// Resolve the version to propagate.
///
/// Order: `explicit`, then the trimmed contents of `version_file` (default
/// `<dir>/VERSION`) when it exists, then `env_value` (normally `$VERSION`).
/// Empty strings are treated as absent at every step.
pub fn resolve_version_at(
    dir: &Path,
    explicit: Option<&str>,
    version_file: Option<&Path>,
    env_value: Option<&str>,
) -> Result<String, CoreError> {
    if let Some(v) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
        return Ok(v.to_string());
    }
    let path = version_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_version_file_at(dir));
    if path.is_file() {
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let v = contents.trim();
        if !v.is_empty() {
            return Ok(v.to_string());
        }
    }
    env_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CoreError::MissingOption("version".to_string()))
}

/// Prefix `version` with `prefix` unless it already starts with it.
pub fn with_version_prefix(version: &str, prefix: &str) -> String {
    if prefix.is_empty() || version.starts_with(prefix) {
        version.to_string()
    } else {
        format!("{prefix}{version}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_prefix_is_added_once() {
        assert_eq!(with_version_prefix("1.2.3", "v"), "v1.2.3");
        assert_eq!(with_version_prefix("v1.2.3", "v"), "v1.2.3");
        assert_eq!(with_version_prefix("1.2.3", ""), "1.2.3");
    }

    #[test]
    fn explicit_version_wins() {
        let v = resolve_version_at(Path::new("/nonexistent"), Some("2.0.0"), None, Some("1.0.0"));
        assert_eq!(v.unwrap(), "2.0.0");
    }

    #[test]
    fn env_value_is_last_resort() {
        let v = resolve_version_at(Path::new("/nonexistent"), Some(""), None, Some(" 1.0.0\n"));
        assert_eq!(v.unwrap(), "1.0.0");
        let err = resolve_version_at(Path::new("/nonexistent"), None, None, None).unwrap_err();
        assert_eq!(err.to_string(), "missing option: --version");
    }
}
