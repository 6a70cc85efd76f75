use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "bidci",
    version,
    about = "Preprocess and sanity-check BIDS EEG datasets",
    long_about = "Load, filter and epoch every (subject, run) of a BIDS EEG dataset described by a\n\
                  YAML configuration, then save or show diagnostic figures.\n\
                  Signal processing runs in the bidci-bridge process. Set $BIDCI_BRIDGE_PATH or use --bridge."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the pipeline described by a configuration file
    Run(RunArgs),
    /// Check a configuration file and the recordings it names
    Validate(ValidateArgs),
    /// List EEG recordings present in a BIDS dataset
    Discover(DiscoverArgs),
    /// Show bridge path and version information
    Info(InfoArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: String,

    /// Path to the bidci-bridge executable
    #[arg(long, env = "BIDCI_BRIDGE_PATH")]
    pub bridge: Option<String>,

    /// Produce figures regardless of sanity_check.enable_plots
    #[arg(long, conflicts_with = "no_plots")]
    pub plots: bool,

    /// Skip figures regardless of sanity_check.enable_plots
    #[arg(long)]
    pub no_plots: bool,

    /// Record failing (subject, run) pairs and keep going
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Use the in-memory backend instead of the bridge. No signal processing runs
    /// and no figure files are written; reported figure paths are planned only,
    /// though output directories are still created.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Report file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

impl RunArgs {
    /// `None` defers to the configuration.
    pub fn with_plots(&self) -> Option<bool> {
        if self.plots {
            Some(true)
        } else if self.no_plots {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Args)]
pub struct ValidateArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct DiscoverArgs {
    /// BIDS dataset root
    #[arg(long)]
    pub root: String,

    /// Task label
    #[arg(long)]
    pub task: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Path to the bidci-bridge executable
    #[arg(long, env = "BIDCI_BRIDGE_PATH")]
    pub bridge: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
