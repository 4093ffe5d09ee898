//! Text matching used to select repositories, charts, packages and resources.
//!
//! Two shapes share one include/exclude test:
//!
//! - [`Pattern`]: `{name, include[], exclude[]}`. A non-empty `name` is an
//!   exact-match shortcut and the include/exclude lists are ignored.
//! - [`TextFilter`]: `{includes[], excludes[]}` without the shortcut; used for
//!   CLI filters over resources that are already identified.
//!
//! An include/exclude entry matches a candidate when it is a glob (`*`, `?`,
//! `[`) that matches the whole candidate, or otherwise when the candidate
//! contains it as a substring. Excludes win over includes; an empty include
//! list means "everything that is not excluded".

use serde::{Deserialize, Serialize};

/// Name or include/exclude matcher read from rule documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, rename = "include", skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(default, rename = "exclude", skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

impl Pattern {
    /// Exact-name pattern.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns true if `text` is selected by this pattern.
    pub fn matches(&self, text: &str) -> bool {
        if !self.name.is_empty() {
            return text == self.name;
        }
        matches_any(text, &self.includes, &self.excludes)
    }
}

/// Include/exclude filter without the exact-name shortcut.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFilter {
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

impl TextFilter {
    pub fn new(includes: Vec<String>, excludes: Vec<String>) -> Self {
        Self { includes, excludes }
    }

    pub fn matches(&self, text: &str) -> bool {
        matches_any(text, &self.includes, &self.excludes)
    }
}

/// Shared include/exclude test.
pub fn matches_any(text: &str, includes: &[String], excludes: &[String]) -> bool {
    if excludes.iter().any(|x| entry_matches(text, x)) {
        return false;
    }
    includes.is_empty() || includes.iter().any(|inc| entry_matches(text, inc))
}

fn entry_matches(text: &str, entry: &str) -> bool {
    if entry.is_empty() {
        return false;
    }
    if entry.contains(['*', '?', '[']) {
        if let Ok(glob) = glob::Pattern::new(entry) {
            return glob.matches(text);
        }
    }
    text.contains(entry)
}

/// Removes a trailing `/` and then a trailing `.git` so URLs written either way
/// compare equal.
pub fn trim_git_url_suffix(url: &str) -> &str {
    let url = url.strip_suffix('/').unwrap_or(url);
    url.strip_suffix(".git").unwrap_or(url)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
