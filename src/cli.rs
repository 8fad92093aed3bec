use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// provision-engine - fetch, install and verify a prebuilt chess engine
#[derive(Parser)]
#[command(name = "provision-engine")]
#[command(about = "Fetch a prebuilt chess engine, install it at a fixed path and install host dependencies")]
#[command(version)]
pub struct Cli {
    /// Provisioning configuration file (JSON); missing fields take defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Working directory the engine and dependencies are installed into
    /// [default: $ENGINE_PROVISION_WORKDIR or the current directory]
    #[arg(short = 'C', long, global = true)]
    pub workdir: Option<PathBuf>,

    /// Dry-run mode: validate and log each step without downloading,
    /// writing files or spawning processes.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full provisioning procedure (default)
    Provision(ProvisionArgs),
    /// Check the installed engine and run the UCI handshake
    Verify {
        /// Only check the file, skip the handshake
        #[arg(long)]
        no_handshake: bool,
    },
    /// Show where the host application would find an engine
    Locate,
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// Print the effective configuration as JSON
    ShowConfig,
}

#[derive(Args, Debug, Default, Clone)]
pub struct ProvisionArgs {
    /// Engine archive URL (http, https or file)
    #[arg(long)]
    pub url: Option<String>,

    /// Re-provision even if the installed engine matches the last run
    #[arg(short, long)]
    pub force: bool,

    /// Do not install the dependency manifest
    #[arg(long)]
    pub skip_deps: bool,

    /// Do not run the UCI handshake after installing
    #[arg(long)]
    pub skip_handshake: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
