//! `cascade batch` — apply every change of the rule set to an explicit list
//! of repositories, attempting all of them before reporting failures.

use anyhow::{bail, Result};
use clap::Args;

use cascade_core::Change;
use cascade_sync::RuleEngine;

use super::{print_report, PublishArgs, RuleSetArgs, Services};

/// Arguments for `cascade batch`.
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Repository to upgrade; repeat for several.
    #[arg(long = "git-url", required = true)]
    pub git_urls: Vec<String>,

    #[command(flatten)]
    pub rules: RuleSetArgs,

    #[command(flatten)]
    pub publish: PublishArgs,
}

impl BatchArgs {
    pub fn run(self) -> Result<()> {
        let version = self.rules.resolve_version()?;
        let config = self.rules.load_config()?;
        let changes: Vec<Change> = config
            .spec
            .rules
            .iter()
            .flat_map(|rule| rule.changes.iter().cloned())
            .collect();
        if changes.is_empty() {
            bail!("the rule set has no changes to apply");
        }

        let mut ctx = self.publish.run_context(version);
        for label in &config.spec.pull_request_labels {
            if !ctx.labels.contains(label) {
                ctx.labels.push(label.clone());
            }
        }

        let services = Services::new(&self.rules.dir, self.publish.git_token());
        let mut publisher = self.publish.publisher()?;
        let report = RuleEngine::new(services.collaborators(), publisher.as_mut())
            .run_batch(&self.git_urls, &changes, &mut ctx)?;

        print_report(&report, self.publish.dry_run, self.publish.json)
    }
}
