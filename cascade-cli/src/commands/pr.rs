//! `cascade pr` — apply the rule set to every repository it names.

use anyhow::Result;
use clap::Args;

use cascade_sync::RuleEngine;

use super::{print_report, PublishArgs, RuleSetArgs, Services};

/// Arguments for `cascade pr`.
#[derive(Args, Debug)]
pub struct PrArgs {
    #[command(flatten)]
    pub rules: RuleSetArgs,

    #[command(flatten)]
    pub publish: PublishArgs,
}

impl PrArgs {
    pub fn run(self) -> Result<()> {
        let version = self.rules.resolve_version()?;
        let config = self.rules.load_config()?;
        let mut ctx = self.publish.run_context(version);

        let services = Services::new(&self.rules.dir, self.publish.git_token());
        let mut publisher = self.publish.publisher()?;
        let report = RuleEngine::new(services.collaborators(), publisher.as_mut()).run(&config, &mut ctx)?;

        print_report(&report, self.publish.dry_run, self.publish.json)
    }
}
