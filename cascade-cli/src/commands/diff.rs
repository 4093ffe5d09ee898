//! `cascade diff` — show unified diffs for what the rule set would change
//! in a local tree.

use anyhow::{Context, Result};
use clap::Args;

use cascade_sync::{DirectoryPublisher, RuleEngine};

use super::{print_diffs, RuleSetArgs, Services};

/// Arguments for `cascade diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub rules: RuleSetArgs,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let version = self.rules.resolve_version()?;
        let config = self.rules.load_config()?;
        let services = Services::new(&self.rules.dir, None);
        let mut publisher = DirectoryPublisher::single(&self.rules.dir);
        let mut ctx = cascade_sync::RunContext::new(version);
        ctx.dry_run = true;

        let report = RuleEngine::new(services.collaborators(), &mut publisher)
            .run(&config, &mut ctx)
            .with_context(|| format!("diff failed for {}", self.rules.dir.display()))?;

        let mut any = false;
        for outcome in &report.outcomes {
            any |= !outcome.diffs.is_empty();
            print_diffs(&outcome.diffs);
        }
        if !any {
            println!("No differences for {}.", self.rules.dir.display());
        }
        Ok(())
    }
}
