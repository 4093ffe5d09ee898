//! cascade: propagate a released version across GitOps and source repositories.
//!
//! # Usage
//!
//! ```text
//! cascade pr      [--dir D] [--config-file F] [--version V] [--dry-run] [--json]
//! cascade batch   --git-url U... [--dir D] [--config-file F] [--version V]
//! cascade sync    argo|flux|helmfile --source-dir S --target-dir T [--dry-run]
//! cascade promote argo --target-dir T --source-git-url U [--version V]
//! cascade promote flux --target-dir T --chart C [--source-ref-name N] --version V
//! cascade diff    [--dir D] [--config-file F] [--version V]
//! ```

mod checkout;
mod commands;
mod github;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    batch::BatchArgs, diff::DiffArgs, pr::PrArgs, promote::PromoteCommand, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "cascade",
    version,
    about = "Propagate a new version across downstream git repositories",
    long_about = None,
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply the rule set to every repository it names.
    Pr(PrArgs),

    /// Apply every change of the rule set to the given repositories, attempting all of them.
    Batch(BatchArgs),

    /// Copy versions from a source GitOps tree into a target tree.
    Sync(SyncArgs),

    /// Set a released version in a GitOps tree.
    Promote {
        #[command(subcommand)]
        command: PromoteCommand,
    },

    /// Show the unified diff the rule set would produce on a local tree.
    Diff(DiffArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Pr(args) => args.run(),
        Commands::Batch(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Promote { command } => commands::promote::run(command),
        Commands::Diff(args) => args.run(),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    if let Err(e) = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to initialise logging: {e}");
    }
}
