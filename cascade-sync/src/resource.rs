//! Resource versions read from and written to GitOps manifests.
//!
//! | Resource                 | Version field                              | Identity                                  |
//! |--------------------------|--------------------------------------------|-------------------------------------------|
//! | Application              | `spec.source.targetRevision`               | repo URL (annotation first), `path`       |
//! | ApplicationSet           | `spec.template.spec.source.targetRevision` | same, under `spec.template`               |
//! | HelmRelease              | `spec.chart.spec.version`                  | `chart`, `sourceRef.name`                 |
//! | Helmfile release `i`     | `releases[i].version`                      | `chart`, namespace (release, else file)   |

use std::fmt;

use serde_yaml::Value;

use cascade_core::yaml_edit::{self, PathSegment, PathSegment::Index, PathSegment::Key};
use cascade_core::{trim_git_url_suffix, CoreError};

/// Annotation that overrides `spec.source.repoURL` as the repository identity.
pub const SOURCE_REPO_ANNOTATION: &str = "gitops.jenkins-x.io/sourceRepoUrl";

/// Annotation or label (`"true"`) marking an entry as eligible for sync updates.
pub const SYNC_MARKER: &str = "cascade.dev/sync";

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The manifest flavours that carry a deployable version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Application,
    ApplicationSet,
    HelmRelease,
    HelmfileRelease,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Application => "Application",
            ResourceKind::ApplicationSet => "ApplicationSet",
            ResourceKind::HelmRelease => "HelmRelease",
            ResourceKind::HelmfileRelease => "helmfile release",
        };
        f.write_str(name)
    }
}

/// Selects which resource kinds a scan visits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindFilter {
    pub kinds: Vec<ResourceKind>,
}

impl KindFilter {
    pub fn new(kinds: impl Into<Vec<ResourceKind>>) -> Self {
        Self { kinds: kinds.into() }
    }

    /// Argo CD `Application` and `ApplicationSet`.
    pub fn argo() -> Self {
        Self::new([ResourceKind::Application, ResourceKind::ApplicationSet])
    }

    /// Flux `HelmRelease`.
    pub fn flux() -> Self {
        Self::new([ResourceKind::HelmRelease])
    }

    pub fn helmfile() -> Self {
        Self::new([ResourceKind::HelmfileRelease])
    }

    pub fn accepts(&self, kind: ResourceKind) -> bool {
        self.kinds.contains(&kind)
    }
}

// ---------------------------------------------------------------------------
// ResourceVersion
// ---------------------------------------------------------------------------

/// Identity and version of one deployable entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceVersion {
    /// Repository URL or chart name.
    pub primary: String,
    /// Source path, sourceRef name or namespace.
    pub secondary: String,
    pub version: String,
}

impl ResourceVersion {
    /// Identity used to pair entries across trees.
    ///
    /// The primary key is trimmed and loses a trailing `/` and `.git`, so
    /// `https://host/org/repo.git` and `https://host/org/repo/` are equal.
    pub fn key(&self) -> String {
        format!("{}\n{}", trim_git_url_suffix(self.primary.trim()), self.secondary)
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        if !self.secondary.is_empty() {
            write!(f, " ({})", self.secondary)?;
        }
        write!(f, " version: {}", self.version)
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// A versioned entry located inside a parsed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Application,
    ApplicationSet,
    HelmRelease,
    /// Release at this index of a helmfile's `releases`.
    HelmfileRelease(usize),
}

const APP_SOURCE: [PathSegment<'static>; 2] = [Key("spec"), Key("source")];
const APPSET_SOURCE: [PathSegment<'static>; 4] =
    [Key("spec"), Key("template"), Key("spec"), Key("source")];
const HELM_CHART: [PathSegment<'static>; 4] = [Key("spec"), Key("chart"), Key("spec"), Key("chart")];
const HELM_VERSION: [PathSegment<'static>; 4] =
    [Key("spec"), Key("chart"), Key("spec"), Key("version")];
const HELM_SOURCE_REF: [PathSegment<'static>; 5] = [
    Key("spec"),
    Key("chart"),
    Key("spec"),
    Key("sourceRef"),
    Key("name"),
];

impl Resource {
    /// Every versioned entry in `doc`, classified by `apiVersion` and `kind`.
    pub fn discover(doc: &Value) -> Vec<Resource> {
        let api_version = doc.get("apiVersion").and_then(Value::as_str).unwrap_or("");
        let kind = doc.get("kind").and_then(Value::as_str).unwrap_or("");
        let group = api_version.split('/').next().unwrap_or("");
        match (group, kind) {
            ("argoproj.io", "Application") => vec![Resource::Application],
            ("argoproj.io", "ApplicationSet") => vec![Resource::ApplicationSet],
            ("helm.toolkit.fluxcd.io", "HelmRelease") => vec![Resource::HelmRelease],
            (_, "") => match doc.get("releases").and_then(Value::as_sequence) {
                Some(releases) => (0..releases.len()).map(Resource::HelmfileRelease).collect(),
                None => vec![],
            },
            _ => vec![],
        }
    }

    pub fn kind(self) -> ResourceKind {
        match self {
            Resource::Application => ResourceKind::Application,
            Resource::ApplicationSet => ResourceKind::ApplicationSet,
            Resource::HelmRelease => ResourceKind::HelmRelease,
            Resource::HelmfileRelease(_) => ResourceKind::HelmfileRelease,
        }
    }

    /// Path of the version scalar.
    pub fn version_path(self) -> Vec<PathSegment<'static>> {
        match self {
            Resource::Application => [&APP_SOURCE[..], &[Key("targetRevision")]].concat(),
            Resource::ApplicationSet => [&APPSET_SOURCE[..], &[Key("targetRevision")]].concat(),
            Resource::HelmRelease => HELM_VERSION.to_vec(),
            Resource::HelmfileRelease(i) => vec![Key("releases"), Index(i), Key("version")],
        }
    }

    /// Read the identity and version of this entry.
    pub fn get(self, doc: &Value) -> ResourceVersion {
        let field = |prefix: &[PathSegment<'static>], leaf: &'static str| {
            let path = [prefix, &[Key(leaf)]].concat();
            yaml_edit::get_string(doc, &path)
        };
        match self {
            Resource::Application => ResourceVersion {
                primary: repo_url(doc, None).unwrap_or_else(|| field(&APP_SOURCE, "repoURL")),
                secondary: field(&APP_SOURCE, "path"),
                version: field(&APP_SOURCE, "targetRevision"),
            },
            Resource::ApplicationSet => ResourceVersion {
                primary: repo_url(doc, Some(&[Key("spec"), Key("template")]))
                    .unwrap_or_else(|| field(&APPSET_SOURCE, "repoURL")),
                secondary: field(&APPSET_SOURCE, "path"),
                version: field(&APPSET_SOURCE, "targetRevision"),
            },
            Resource::HelmRelease => ResourceVersion {
                primary: yaml_edit::get_string(doc, &HELM_CHART),
                secondary: yaml_edit::get_string(doc, &HELM_SOURCE_REF),
                version: yaml_edit::get_string(doc, &HELM_VERSION),
            },
            Resource::HelmfileRelease(i) => {
                let release = [Key("releases"), Index(i)];
                let namespace = field(&release, "namespace");
                ResourceVersion {
                    primary: field(&release, "chart"),
                    secondary: if namespace.is_empty() {
                        yaml_edit::get_string(doc, &[Key("namespace")])
                    } else {
                        namespace
                    },
                    version: field(&release, "version"),
                }
            }
        }
    }

    /// Whether the entry carries the [`SYNC_MARKER`].
    pub fn is_marked(self, doc: &Value) -> bool {
        let marked = |path: &[PathSegment<'_>]| yaml_edit::get_string(doc, path) == "true";
        match self {
            Resource::HelmfileRelease(i) => marked(&[Key("releases"), Index(i), Key("labels"), Key(SYNC_MARKER)]),
            _ => {
                marked(&[Key("metadata"), Key("annotations"), Key(SYNC_MARKER)])
                    || marked(&[Key("metadata"), Key("labels"), Key(SYNC_MARKER)])
            }
        }
    }

    /// Set the version scalar in the document text, creating it if missing.
    ///
    /// Only the bytes of the version scalar change.
    pub fn set(self, text: &str, version: &str) -> Result<String, CoreError> {
        yaml_edit::set_scalar(text, &self.version_path(), version)
    }
}

/// The annotation identity, looked up on the template first when given.
fn repo_url(doc: &Value, template: Option<&[PathSegment<'static>]>) -> Option<String> {
    let annotation = [Key("metadata"), Key("annotations"), Key(SOURCE_REPO_ANNOTATION)];
    template
        .map(|t| yaml_edit::get_string(doc, &[t, &annotation[..]].concat()))
        .into_iter()
        .chain(std::iter::once(yaml_edit::get_string(doc, &annotation)))
        .find(|url| !url.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
