//! End-to-end propagation scenarios over scratch repository trees.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

use cascade_core::{Change, Pattern, RegexChange, Rule, TextFilter, UpdateConfig, VersionStreamChange};
use cascade_sync::{
    sync_versions, ChangeWriter, ChartRepository, Collaborators, Command, CommandRunner,
    DirectoryPublisher, KindFilter, RuleEngine, RunContext, SyncError, SyncOptions,
};
use cascade_sync::version_stream::ChartSummary;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write");
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).expect("read")
}

struct NoCommands;

impl CommandRunner for NoCommands {
    fn run(&self, command: &Command) -> Result<String, SyncError> {
        panic!("unexpected command {}", command.cli());
    }
}

#[derive(Default)]
struct StaticCharts {
    added: RefCell<Vec<String>>,
}

impl ChartRepository for StaticCharts {
    fn add_repo_if_missing(&self, url: &str, _name: &str) -> Result<(), SyncError> {
        self.added.borrow_mut().push(url.to_string());
        Ok(())
    }

    fn update_index(&self) -> Result<(), SyncError> {
        Err(SyncError::Network {
            target: "index".into(),
            message: "offline".into(),
        })
    }

    fn search(&self, name: &str, _exact: bool) -> Result<Vec<ChartSummary>, SyncError> {
        Ok(vec![ChartSummary {
            name: name.to_string(),
            version: "2.0.0".into(),
        }])
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

const SOURCE_APP: &str = "\
apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: app
spec:
  source:
    repoURL: https://github.com/acme/app
    path: charts/app
    targetRevision: 1.0.0
";

const TARGET_APP: &str = "\
# production
apiVersion: argoproj.io/v1alpha1
kind: Application
metadata:
  name: app
  labels:
    team: platform
spec:
  project: default
  source:
    repoURL: https://github.com/acme/app.git
    path: charts/app
    targetRevision: 0.9.0   # bumped by automation
  syncPolicy:
    automated: {}
";

#[test]
fn argo_sync_changes_only_the_target_revision() {
    init_logging();
    let source = TempDir::new().expect("source");
    let target = TempDir::new().expect("target");
    write(source.path(), "apps/app.yaml", SOURCE_APP);
    write(target.path(), "apps/app.yaml", TARGET_APP);
    write(target.path(), ".git/HEAD.yaml", "ref: refs/heads/main\n");

    let mut writer = ChangeWriter::new(false);
    let report = sync_versions(
        source.path(),
        target.path(),
        &SyncOptions::new(KindFilter::argo()),
        &mut writer,
    )
    .expect("sync");

    assert_eq!(report.updated.len(), 1);
    assert_eq!(
        read(target.path(), "apps/app.yaml"),
        TARGET_APP.replace("targetRevision: 0.9.0", "targetRevision: 1.0.0")
    );
}

#[test]
fn argo_sync_edits_inline_source_mapping() {
    init_logging();
    let source = TempDir::new().expect("source");
    let target = TempDir::new().expect("target");
    let inline = "apiVersion: argoproj.io/v1alpha1\nkind: Application\nmetadata:\n  name: app\nspec:\n  source: {repoURL: 'https://github.com/acme/app.git', path: charts/app, targetRevision: 0.9.0}\n";
    write(source.path(), "apps/app.yaml", SOURCE_APP);
    write(target.path(), "apps/app.yaml", inline);

    let mut writer = ChangeWriter::new(false);
    let report = sync_versions(
        source.path(),
        target.path(),
        &SyncOptions::new(KindFilter::argo()),
        &mut writer,
    )
    .expect("sync");

    assert_eq!(report.updated.len(), 1);
    assert_eq!(
        read(target.path(), "apps/app.yaml"),
        inline.replace("targetRevision: 0.9.0}", "targetRevision: 1.0.0}")
    );
}

#[test]
fn flux_sync_respects_source_ref_in_key_and_secondary_filter() {
    let release = |name: &str, source_ref: &str, version: &str| {
        format!(
            "apiVersion: helm.toolkit.fluxcd.io/v2beta1\nkind: HelmRelease\nmetadata:\n  name: {name}\nspec:\n  chart:\n    spec:\n      chart: {name}\n      version: {version}\n      sourceRef:\n        kind: HelmRepository\n        name: {source_ref}\n"
        )
    };
    let source = TempDir::new().expect("source");
    let target = TempDir::new().expect("target");
    write(
        source.path(),
        "releases.yaml",
        &format!("{}---\n{}", release("redis", "bitnami", "17.1.0"), release("nginx", "bitnami", "4.0.0")),
    );
    write(target.path(), "redis.yaml", &release("redis", "bitnami", "17.0.0"));
    write(target.path(), "redis-mirror.yaml", &release("redis", "mirror", "17.0.0"));
    write(target.path(), "nginx.yaml", &release("nginx", "bitnami", "3.0.0"));

    let mut options = SyncOptions::new(KindFilter::flux());
    options.primary = TextFilter::new(vec!["redis".into()], vec![]);
    let report =
        sync_versions(source.path(), target.path(), &options, &mut ChangeWriter::new(false)).expect("sync");

    assert_eq!(report.changed_files, vec![target.path().join("redis.yaml")]);
    assert!(read(target.path(), "redis.yaml").contains("version: 17.1.0"));
    assert!(read(target.path(), "redis-mirror.yaml").contains("version: 17.0.0"));
    assert!(read(target.path(), "nginx.yaml").contains("version: 3.0.0"));
}

#[test]
fn helmfile_sync_updates_only_marked_releases() {
    let source = TempDir::new().expect("source");
    let target = TempDir::new().expect("target");
    write(
        source.path(),
        "helmfile.yaml",
        "namespace: jx\nreleases:\n- chart: jxgh/lighthouse\n  version: 1.5.0\n- chart: jxgh/jx-preview\n  version: 0.3.0\n",
    );
    let target_text = "\
namespace: jx
releases:
- chart: jxgh/lighthouse
  version: 1.4.0
  labels:
    cascade.dev/sync: \"true\"
- chart: jxgh/jx-preview
  version: 0.2.0
";
    write(target.path(), "helmfile.yaml", target_text);

    let mut options = SyncOptions::new(KindFilter::helmfile());
    options.update_only_marked = true;
    sync_versions(source.path(), target.path(), &options, &mut ChangeWriter::new(false)).expect("sync");

    assert_eq!(
        read(target.path(), "helmfile.yaml"),
        target_text.replace("version: 1.4.0", "version: 1.5.0")
    );
}

// ---------------------------------------------------------------------------
// Rule engine
// ---------------------------------------------------------------------------

fn version_rule(url: &str) -> UpdateConfig {
    let mut config = UpdateConfig::default();
    config.spec.rules.push(Rule {
        urls: vec![url.to_string()],
        changes: vec![Change {
            regex: Some(RegexChange {
                pattern: r"(\d+\.\d+\.\d+)".into(),
                globs: vec!["**/VERSION".into()],
            }),
            ..Change::default()
        }],
        ..Rule::default()
    });
    config
}

#[test]
fn regex_rule_is_idempotent() {
    let repo = TempDir::new().expect("repo");
    write(repo.path(), "VERSION", "1.0.0\n");
    write(repo.path(), "sub/VERSION", "1.0.0\n");
    let charts = StaticCharts::default();
    let collaborators = Collaborators {
        runner: &NoCommands,
        charts: &charts,
        discovery: None,
    };
    let config = version_rule("https://github.com/acme/app");

    let mut publisher = DirectoryPublisher::single(repo.path());
    let report = RuleEngine::new(collaborators, &mut publisher)
        .run(&config, &mut RunContext::new("1.1.0"))
        .expect("first run");
    assert_eq!(report.changed_files(), 2);
    assert_eq!(read(repo.path(), "VERSION"), "1.1.0\n");
    assert_eq!(read(repo.path(), "sub/VERSION"), "1.1.0\n");

    let pinned = FileTime::from_unix_time(1_500_000_000, 0);
    set_file_mtime(repo.path().join("VERSION"), pinned).expect("mtime");

    let mut publisher = DirectoryPublisher::single(repo.path());
    let report = RuleEngine::new(collaborators, &mut publisher)
        .run(&config, &mut RunContext::new("1.1.0"))
        .expect("second run");
    assert_eq!(report.changed_files(), 0);
    let meta = fs::metadata(repo.path().join("VERSION")).expect("metadata");
    assert_eq!(FileTime::from_last_modification_time(&meta), pinned);
}

#[test]
fn version_stream_rule_sets_commit_title_and_notes() {
    let repo = TempDir::new().expect("repo");
    write(
        repo.path(),
        "charts/repositories.yml",
        "repositories:\n- prefix: jxgh\n  urls:\n  - https://jenkins-x-charts.github.io/repo\n",
    );
    write(repo.path(), "charts/jxgh/lighthouse/defaults.yaml", "version: 1.0.0\n");
    let charts = StaticCharts::default();
    let collaborators = Collaborators {
        runner: &NoCommands,
        charts: &charts,
        discovery: None,
    };
    let mut config = UpdateConfig::default();
    config.spec.rules.push(Rule {
        urls: vec!["https://github.com/jenkins-x/jx3-versions".into()],
        changes: vec![Change {
            version_stream: Some(VersionStreamChange {
                pattern: Pattern {
                    includes: vec!["jxgh/*".into()],
                    ..Pattern::default()
                },
                kind: "charts".into(),
            }),
            ..Change::default()
        }],
        ..Rule::default()
    });
    let mut ctx = RunContext::new("1.0.0");
    ctx.dry_run = true;

    let mut publisher = DirectoryPublisher::single(repo.path());
    let report = RuleEngine::new(collaborators, &mut publisher).run(&config, &mut ctx).expect("run");

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.commit_title, "chore: upgrade charts");
    assert_eq!(outcome.notes, "* updated chart jxgh/lighthouse from `1.0.0` to `2.0.0`");
    assert!(outcome.diffs[0].unified_diff.contains("+version: 2.0.0"));
    assert_eq!(read(repo.path(), "charts/jxgh/lighthouse/defaults.yaml"), "version: 1.0.0\n");
    assert_eq!(*charts.added.borrow(), vec!["https://jenkins-x-charts.github.io/repo".to_string()]);
}

#[test]
fn unknown_version_stream_kind_aborts() {
    let repo = TempDir::new().expect("repo");
    let charts = StaticCharts::default();
    let collaborators = Collaborators {
        runner: &NoCommands,
        charts: &charts,
        discovery: None,
    };
    let mut config = UpdateConfig::default();
    config.spec.rules.push(Rule {
        urls: vec!["https://github.com/acme/versions".into()],
        changes: vec![Change {
            version_stream: Some(VersionStreamChange {
                kind: "helm".into(),
                ..VersionStreamChange::default()
            }),
            ..Change::default()
        }],
        ..Rule::default()
    });

    let mut publisher = DirectoryPublisher::single(repo.path());
    let err = RuleEngine::new(collaborators, &mut publisher)
        .run(&config, &mut RunContext::new("1.0.0"))
        .unwrap_err();
    assert!(err.to_string().contains("invalid option --kind"), "got: {err}");
}
