//! Domain types for cascade rule sets.
//!
//! Field names follow the external camelCase document format so existing
//! `updatebot.yaml` files load unchanged. All types are serializable via
//! serde + serde_yaml.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::filter::Pattern;

// ---------------------------------------------------------------------------
// Rule set document
// ---------------------------------------------------------------------------

/// Root of a rule set document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: UpdateConfigSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// The rules to perform when updating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfigSpec {
    /// Labels applied to every created pull request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pull_request_labels: Vec<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// A set of target repositories and the changes to make on each of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Git URLs of the repositories to change, processed in order.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub fork: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub reuse_pull_request: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sparse_checkout: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pull_request_assignees: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub assign_author_to_pull_requests: bool,
}

// ---------------------------------------------------------------------------
// Changes
// ---------------------------------------------------------------------------

/// One transformation to apply to a repository.
///
/// At most one of the variant fields may be populated; use [`Change::kind`]
/// to dispatch on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub go: Option<GoChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<RegexChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_stream: Option<VersionStreamChange>,
    /// Template evaluated per target repository that replaces the literal version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version_template: String,
}

/// Borrowed view of the populated variant of a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind<'a> {
    Regex(&'a RegexChange),
    VersionStream(&'a VersionStreamChange),
    Go(&'a GoChange),
    Command(&'a CommandChange),
}

impl Change {
    /// The populated variant, `None` for a no-op change.
    ///
    /// Returns `CoreError::InvalidOption` when more than one variant is set.
    pub fn kind(&self) -> Result<Option<ChangeKind<'_>>, CoreError> {
        let mut kinds = Vec::with_capacity(1);
        if let Some(regex) = &self.regex {
            kinds.push(ChangeKind::Regex(regex));
        }
        if let Some(vs) = &self.version_stream {
            kinds.push(ChangeKind::VersionStream(vs));
        }
        if let Some(go) = &self.go {
            kinds.push(ChangeKind::Go(go));
        }
        if let Some(command) = &self.command {
            kinds.push(ChangeKind::Command(command));
        }
        match kinds.len() {
            0 => Ok(None),
            1 => Ok(kinds.pop()),
            _ => Err(CoreError::InvalidOption {
                name: "changes".to_string(),
                value: kinds
                    .iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join("+"),
                allowed: ChangeKind::NAMES.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}

impl ChangeKind<'_> {
    pub const NAMES: &'static [&'static str] = &["regex", "versionStream", "go", "command"];
}

impl fmt::Display for ChangeKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Regex(_) => write!(f, "regex"),
            ChangeKind::VersionStream(_) => write!(f, "versionStream"),
            ChangeKind::Go(_) => write!(f, "go"),
            ChangeKind::Command(_) => write!(f, "command"),
        }
    }
}

/// A regex based modification of the files selected by `files`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexChange {
    #[serde(default)]
    pub pattern: String,
    /// Glob expressions relative to the repository root; `**` is recursive.
    #[serde(default, rename = "files")]
    pub globs: Vec<String>,
}

/// Upgrades the stable versions recorded in a version stream repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStreamChange {
    #[serde(flatten)]
    pub pattern: Pattern,
    /// The kind of resources to change; only `charts` is upgraded.
    #[serde(default)]
    pub kind: String,
}

/// Upgrades go module dependencies across discovered repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoChange {
    /// Git owners (organisations) to query for repositories.
    #[serde(default, rename = "owner")]
    pub owners: Vec<String>,
    #[serde(default)]
    pub repositories: Pattern,
    /// Text in the dependency manifest that marks a repository for upgrade.
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub upgrade_packages: Pattern,
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_patch: bool,
}

/// Runs an arbitrary command line program in the repository checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandChange {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

fn is_false(b: &bool) -> bool {
    !*b
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_without_variant_is_noop() {
        let change = Change::default();
        assert!(change.kind().expect("kind").is_none());
    }

    #[test]
    fn change_with_two_variants_is_rejected() {
        let change = Change {
            regex: Some(RegexChange::default()),
            command: Some(CommandChange::default()),
            ..Change::default()
        };
        let err = change.kind().unwrap_err();
        assert!(err.to_string().contains("regex+command"), "got: {err}");
    }

    #[test]
    fn version_stream_change_flattens_pattern() {
        let yaml = "kind: charts\ninclude:\n  - jxgh/*\nexclude:\n  - jxgh/legacy\n";
        let vs: VersionStreamChange = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(vs.kind, "charts");
        assert_eq!(vs.pattern.includes, vec!["jxgh/*".to_string()]);
        assert_eq!(vs.pattern.excludes, vec!["jxgh/legacy".to_string()]);
        assert!(vs.pattern.name.is_empty());
    }

    #[test]
    fn rule_serde_roundtrip_keeps_camel_case() {
        let rule = Rule {
            urls: vec!["https://github.com/acme/env".into()],
            changes: vec![Change {
                regex: Some(RegexChange {
                    pattern: "version: (.*)".into(),
                    globs: vec!["charts/**/values.yaml".into()],
                }),
                version_template: "{{ version }}".into(),
                ..Change::default()
            }],
            reuse_pull_request: true,
            ..Rule::default()
        };
        let yaml = serde_yaml::to_string(&rule).expect("serialize");
        assert!(yaml.contains("reusePullRequest: true"));
        assert!(yaml.contains("versionTemplate"));
        assert!(yaml.contains("files:"));
        let back: Rule = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, rule);
    }
}
