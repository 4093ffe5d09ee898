//! Promote a freshly released version into a GitOps tree.

use std::path::{Path, PathBuf};

use cascade_core::trim_git_url_suffix;

use crate::error::SyncError;
use crate::manifest::visit_manifests;
use crate::resource::KindFilter;
use crate::writer::ChangeWriter;

/// Set `targetRevision` on every Application and ApplicationSet deploying `repo_url`.
///
/// The repository identity is the source annotation when present, else
/// `repoURL`; both sides are compared without a trailing `/` or `.git`.
pub fn promote_applications(
    dir: &Path,
    repo_url: &str,
    version: &str,
    writer: &mut ChangeWriter,
) -> Result<Vec<PathBuf>, SyncError> {
    let wanted = trim_git_url_suffix(repo_url.trim());
    visit_manifests(dir, &KindFilter::argo(), writer, |entry| {
        if trim_git_url_suffix(entry.version.primary.trim()) != wanted {
            return Ok(None);
        }
        tracing::info!(
            "modified the {} version in file {} to {version}",
            entry.resource.kind(),
            entry.path.display()
        );
        Ok(Some(version.to_string()))
    })
}

/// Set `spec.chart.spec.version` on every HelmRelease of `chart`.
///
/// A non-empty `source_ref_name` must also equal the release's sourceRef name.
pub fn promote_helm_releases(
    dir: &Path,
    chart: &str,
    source_ref_name: &str,
    version: &str,
    writer: &mut ChangeWriter,
) -> Result<Vec<PathBuf>, SyncError> {
    visit_manifests(dir, &KindFilter::flux(), writer, |entry| {
        let v = &entry.version;
        if v.primary != chart || (!source_ref_name.is_empty() && v.secondary != source_ref_name) {
            return Ok(None);
        }
        tracing::info!(
            "modified the {} version in file {} to {version}",
            entry.resource.kind(),
            entry.path.display()
        );
        Ok(Some(version.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const APP: &str = "\
apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: app
  annotations:
    gitops.jenkins-x.io/sourceRepoUrl: https://github.com/acme/app
spec:
  source:
    repoURL: https://charts.acme.io
    chart: app
    targetRevision: 0.1.0 # pinned
";

    const RELEASE: &str = "\
apiVersion: helm.toolkit.fluxcd.io/v2beta1
kind: HelmRelease
metadata:
  name: redis
spec:
  chart:
    spec:
      chart: redis
      version: \"16.0.0\"
      sourceRef:
        kind: HelmRepository
        name: bitnami
";

    #[test]
    fn promotes_application_by_annotation_identity() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.yaml");
        fs::write(&path, APP).unwrap();

        let mut writer = ChangeWriter::new(false);
        let changed =
            promote_applications(tmp.path(), "https://github.com/acme/app.git", "v0.2.0", &mut writer).unwrap();
        assert_eq!(changed, vec![path.clone()]);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            APP.replace("0.1.0 # pinned", "v0.2.0 # pinned")
        );

        let changed = promote_applications(
            tmp.path(),
            "https://charts.acme.io",
            "v9.9.9",
            &mut ChangeWriter::new(false),
        )
        .unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn promotes_helm_release_matching_chart_and_source() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("redis.yaml");
        fs::write(&path, RELEASE).unwrap();

        let changed =
            promote_helm_releases(tmp.path(), "redis", "other", "17.0.0", &mut ChangeWriter::new(false)).unwrap();
        assert!(changed.is_empty());

        let changed =
            promote_helm_releases(tmp.path(), "redis", "bitnami", "17.0.0", &mut ChangeWriter::new(false)).unwrap();
        assert_eq!(changed, vec![path.clone()]);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            RELEASE.replace("\"16.0.0\"", "\"17.0.0\"")
        );
    }

    #[test]
    fn helm_release_promotion_skips_applications() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("all.yaml");
        fs::write(&path, format!("{APP}---\n{RELEASE}")).unwrap();

        let changed = promote_helm_releases(
            tmp.path(),
            "https://github.com/acme/app",
            "",
            "v9.9.9",
            &mut ChangeWriter::new(false),
        )
        .unwrap();
        assert!(changed.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{APP}---\n{RELEASE}"));
    }
}
