//! Rule set loading and version resolution against scratch directories.

use assert_fs::prelude::*;
use cascade_core::{config, ChangeKind, CoreError};
use predicates::prelude::predicate;

const UPDATEBOT: &str = r#"apiVersion: updatebot.jenkins-x.io/v1alpha1
kind: UpdateConfig
spec:
  pullRequestLabels:
    - updatebot
  rules:
    - urls:
        - https://github.com/acme/env-staging
        - https://github.com/acme/env-production.git
      reusePullRequest: true
      changes:
        - regex:
            pattern: "version: (.*)"
            files:
              - "helmfiles/**/helmfile.yaml"
        - versionStream:
            kind: charts
            include:
              - "jxgh/*"
        - command:
            name: jx
            args: ["gitops", "upgrade"]
            env:
              - name: JX_DEBUG
                value: "true"
          versionTemplate: "{{ version }}-rc"
"#;

// ---------------------------------------------------------------------------
// 1. Rule set
// ---------------------------------------------------------------------------

#[test]
fn loads_default_location() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child(".jx/updatebot.yaml").write_str(UPDATEBOT).expect("write");

    let cfg = config::load_update_config_at(dir.path(), None)
        .expect("load")
        .expect("present");
    assert_eq!(cfg.spec.pull_request_labels, vec!["updatebot".to_string()]);
    let rule = &cfg.spec.rules[0];
    assert_eq!(rule.urls.len(), 2);
    assert!(rule.reuse_pull_request);
    assert!(matches!(rule.changes[0].kind(), Ok(Some(ChangeKind::Regex(_)))));
    assert!(matches!(rule.changes[1].kind(), Ok(Some(ChangeKind::VersionStream(_)))));
    match rule.changes[2].kind() {
        Ok(Some(ChangeKind::Command(cmd))) => {
            assert_eq!(cmd.name, "jx");
            assert_eq!(cmd.env[0].value, "true");
        }
        other => panic!("expected command change, got {other:?}"),
    }
    assert_eq!(rule.changes[2].version_template, "{{ version }}-rc");
}

#[test]
fn missing_config_is_none() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let cfg = config::load_update_config_at(dir.path(), None).expect("load");
    assert!(cfg.is_none());
}

#[test]
fn explicit_config_file_overrides_default() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child(".jx/updatebot.yaml").write_str("spec: {rules: []}\n").expect("write");
    let custom = dir.child("custom.yaml");
    custom.write_str(UPDATEBOT).expect("write");

    let cfg = config::load_update_config_at(dir.path(), Some(custom.path()))
        .expect("load")
        .expect("present");
    assert_eq!(cfg.spec.rules.len(), 1);
}

#[test]
fn malformed_config_names_the_file() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child(".jx/updatebot.yaml")
        .write_str("spec:\n  rules: [unclosed\n")
        .expect("write");

    let err = config::load_update_config_at(dir.path(), None).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("updatebot.yaml"), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Version
// ---------------------------------------------------------------------------

#[test]
fn version_file_is_trimmed_and_beats_env() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("VERSION").write_str("1.4.0\n").expect("write");

    let v = config::resolve_version_at(dir.path(), None, None, Some("9.9.9")).expect("version");
    assert_eq!(v, "1.4.0");
    dir.child("VERSION").assert(predicate::str::contains("1.4.0"));
}

#[test]
fn custom_version_file_is_used() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("build/version.txt");
    file.write_str("  2.1.0  ").expect("write");

    let v = config::resolve_version_at(dir.path(), None, Some(file.path()), None).expect("version");
    assert_eq!(v, "2.1.0");
}

#[test]
fn no_source_is_missing_option() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let err = config::resolve_version_at(dir.path(), None, None, None).unwrap_err();
    assert!(matches!(err, CoreError::MissingOption(ref name) if name == "version"));
}
