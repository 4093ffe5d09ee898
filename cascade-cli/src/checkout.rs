//! Git checkouts as the publishing backend.
//!
//! Each repository is cloned shallowly into the work directory, changed in
//! place and, when the tree is dirty, committed on a fresh branch. The
//! branch is left for the hosting provider's pull request tooling to pick
//! up; its name and head commit are reported back to the engine.

use std::path::{Path, PathBuf};

use chrono::Utc;

use cascade_sync::pipeline::{repository_name, ApplyFn};
use cascade_sync::{
    Command, CommandRunner, PullRequestDetails, PullRequestInfo, PullRequestPublisher, SyncError,
};

pub struct CheckoutPublisher<R> {
    runner: R,
    work_dir: PathBuf,
    dry_run: bool,
}

impl<R: CommandRunner> CheckoutPublisher<R> {
    pub fn new(runner: R, work_dir: &Path, dry_run: bool) -> Self {
        Self {
            runner,
            work_dir: work_dir.to_path_buf(),
            dry_run,
        }
    }

    fn git<'a>(&self, dir: &Path, args: impl IntoIterator<Item = &'a str>) -> Result<String, SyncError> {
        self.runner.run(&Command::new(dir, "git", args))
    }

    fn clone_repository(&self, git_url: &str) -> Result<PathBuf, SyncError> {
        let dir = self.work_dir.join(repository_name(git_url));
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| SyncError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }
        std::fs::create_dir_all(&self.work_dir).map_err(|e| SyncError::Io {
            path: self.work_dir.clone(),
            source: e,
        })?;
        let target = dir.to_string_lossy().into_owned();
        self.git(&self.work_dir, ["clone", "--depth", "1", git_url, target.as_str()])?;
        Ok(dir)
    }
}

impl<R: CommandRunner> PullRequestPublisher for CheckoutPublisher<R> {
    fn publish(
        &mut self,
        git_url: &str,
        details: &PullRequestDetails,
        apply: &mut ApplyFn<'_>,
    ) -> Result<Option<PullRequestInfo>, SyncError> {
        let dir = self.clone_repository(git_url)?;
        let outcome = apply(&dir)?;

        let status = self.git(&dir, ["status", "--porcelain"])?;
        if status.trim().is_empty() {
            return Ok(None);
        }
        if self.dry_run {
            tracing::info!("[dry-run] not committing changes to {git_url}");
            return Ok(None);
        }

        let branch = format!("cascade-{}", Utc::now().format("%Y%m%d%H%M%S"));
        let title = outcome.commit_title(details).to_string();
        let body = outcome.body(details);
        self.git(&dir, ["checkout", "-b", branch.as_str()])?;
        self.git(&dir, ["add", "-A"])?;
        self.git(&dir, ["commit", "-m", title.as_str(), "-m", body.as_str()])?;
        let sha = self.git(&dir, ["rev-parse", "HEAD"])?.trim().to_string();
        if !details.labels.is_empty() {
            tracing::debug!("labels for {git_url}: {}", details.labels.join(", "));
        }
        tracing::info!("committed {title} to branch {branch} of {git_url}");

        Ok(Some(PullRequestInfo {
            repository: repository_name(git_url).to_string(),
            url: format!("{git_url}#{branch}"),
            sha,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;

    use cascade_sync::ApplyOutcome;
    use tempfile::TempDir;

    use super::*;

    struct FakeGit {
        status: &'static str,
        calls: RefCell<Vec<String>>,
    }

    impl CommandRunner for FakeGit {
        fn run(&self, command: &Command) -> Result<String, SyncError> {
            self.calls.borrow_mut().push(command.args.first().cloned().unwrap_or_default());
            match command.args.first().map(String::as_str) {
                Some("clone") => {
                    fs::create_dir_all(&command.args[4]).unwrap();
                    Ok(String::new())
                }
                Some("status") => Ok(self.status.to_string()),
                Some("rev-parse") => Ok("abc123\n".to_string()),
                _ => Ok(String::new()),
            }
        }
    }

    fn details() -> PullRequestDetails {
        PullRequestDetails {
            title: "fix: upgrade to version 1.0.0".into(),
            body: String::new(),
            labels: vec!["updatebot".into()],
        }
    }

    #[test]
    fn dirty_tree_is_committed_on_a_branch() {
        let tmp = TempDir::new().unwrap();
        let git = FakeGit {
            status: " M values.yaml\n",
            calls: RefCell::new(Vec::new()),
        };
        let mut publisher = CheckoutPublisher::new(&git, tmp.path(), false);
        let mut seen = None;
        let info = publisher
            .publish("https://github.com/acme/app.git", &details(), &mut |dir: &Path| {
                seen = Some(dir.to_path_buf());
                Ok(ApplyOutcome::default())
            })
            .unwrap()
            .unwrap();

        assert_eq!(seen.unwrap(), tmp.path().join("app"));
        assert_eq!(info.repository, "app");
        assert_eq!(info.sha, "abc123");
        assert!(info.url.starts_with("https://github.com/acme/app.git#cascade-"));
        assert_eq!(
            *git.calls.borrow(),
            vec!["clone", "status", "checkout", "add", "commit", "rev-parse"]
        );
    }

    #[test]
    fn clean_tree_publishes_nothing() {
        let tmp = TempDir::new().unwrap();
        let git = FakeGit {
            status: "",
            calls: RefCell::new(Vec::new()),
        };
        let mut publisher = CheckoutPublisher::new(&git, tmp.path(), false);
        let info = publisher
            .publish("https://github.com/acme/app", &details(), &mut |_: &Path| Ok(ApplyOutcome::default()))
            .unwrap();
        assert!(info.is_none());
        assert_eq!(*git.calls.borrow(), vec!["clone", "status"]);
    }

    #[test]
    fn stale_checkout_is_replaced() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("app")).unwrap();
        fs::write(tmp.path().join("app/stale.txt"), "old").unwrap();
        let git = FakeGit {
            status: "",
            calls: RefCell::new(Vec::new()),
        };
        let mut publisher = CheckoutPublisher::new(&git, tmp.path(), true);
        publisher
            .publish("https://github.com/acme/app", &details(), &mut |_: &Path| Ok(ApplyOutcome::default()))
            .unwrap();
        assert!(!tmp.path().join("app/stale.txt").exists());
    }
}
