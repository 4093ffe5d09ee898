//! Version stream discovery and stable version persistence.

use assert_fs::prelude::*;
use cascade_core::version_stream::{self, ChartEntry, VersionKind};
use cascade_core::CoreError;
use predicates::prelude::predicate;

fn stream() -> assert_fs::TempDir {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("charts/repositories.yml")
        .write_str(
            "repositories:\n\
             - prefix: jxgh\n  urls:\n  - https://jenkins-x-charts.github.io/repo\n\
             - prefix: bitnami\n  urls:\n  - https://charts.bitnami.com/bitnami\n",
        )
        .expect("write");
    dir.child("charts/jxgh/lighthouse/defaults.yaml")
        .write_str("gitUrl: https://github.com/jenkins-x/lighthouse\nversion: 1.0.0\n")
        .expect("write");
    dir.child("charts/bitnami/redis/defaults.yaml")
        .write_str("version: 17.0.0\n")
        .expect("write");
    dir.child("charts/jxgh/defaults.yaml")
        .write_str("version: 0.0.1\n")
        .expect("write");
    dir
}

#[test]
fn discovers_prefixed_charts_only() {
    let dir = stream();
    let mut charts = version_stream::discover_charts_at(dir.path()).expect("discover");
    charts.sort();
    assert_eq!(
        charts,
        vec![
            ChartEntry { prefix: "bitnami".into(), chart: "redis".into() },
            ChartEntry { prefix: "jxgh".into(), chart: "lighthouse".into() },
        ]
    );
    assert_eq!(charts[1].name(), "jxgh/lighthouse");
}

#[test]
fn loads_prefix_registry() {
    let dir = stream();
    let prefixes = version_stream::load_repository_prefixes_at(dir.path()).expect("load");
    assert_eq!(
        prefixes.urls_for_prefix("bitnami"),
        &["https://charts.bitnami.com/bitnami".to_string()]
    );
}

#[test]
fn missing_prefix_registry_is_not_found() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let err = version_stream::load_repository_prefixes_at(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("repositories.yml"));
}

#[test]
fn stable_version_edit_rewrites_only_version() {
    let dir = stream();
    let path = version_stream::stable_version_path_at(dir.path(), VersionKind::Charts, "jxgh/lighthouse");
    let current = std::fs::read_to_string(&path).expect("read");
    let sv = version_stream::parse_stable_version(&path, &current).expect("parse");
    assert_eq!(sv.version, "1.0.0");
    assert_eq!(sv.link(), Some("https://github.com/jenkins-x/lighthouse"));

    let updated = version_stream::with_stable_version(&current, "1.1.0").expect("edit");
    assert_eq!(updated, "gitUrl: https://github.com/jenkins-x/lighthouse\nversion: 1.1.0\n");
}

#[test]
fn stable_version_path_for_new_entry() {
    let dir = stream();
    let path = version_stream::stable_version_path_at(dir.path(), VersionKind::Charts, "bitnami/postgresql");
    assert!(path.ends_with("charts/bitnami/postgresql/defaults.yaml"));
    dir.child("charts/bitnami/postgresql/defaults.yaml")
        .assert(predicate::path::missing());
    let created = version_stream::with_stable_version("", "12.1").expect("edit");
    assert_eq!(created, "version: \"12.1\"\n");
}
