use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clusterup")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision a small multi-node cluster, idempotently", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Bring the topology up and apply every step to every node
    Provision(ProvisionArgs),

    /// Report drift between the topology and the last recorded run
    Status(StatusArgs),

    /// Stop and remove the topology's containers
    Teardown(TeardownArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Provision
// ============================================================================

#[derive(Parser)]
pub struct ProvisionArgs {
    /// Topology file (TOML)
    #[arg(short, long, env = "CLUSTERUP_TOPOLOGY")]
    pub topology: PathBuf,

    /// Maximum nodes provisioned at once (default: one worker per node)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Run idempotency checks only, never apply
    #[arg(long)]
    pub dry_run: bool,

    /// Where to write the execution records
    #[arg(long)]
    pub records: Option<PathBuf>,

    /// Skip bringing up the container topology; use declared endpoints
    #[arg(long)]
    pub no_up: bool,

    /// Override the number of tries per step
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

// ============================================================================
// Status
// ============================================================================

#[derive(Parser)]
pub struct StatusArgs {
    /// Topology file (TOML)
    #[arg(short, long, env = "CLUSTERUP_TOPOLOGY")]
    pub topology: PathBuf,

    /// Execution records to compare against
    #[arg(long)]
    pub records: Option<PathBuf>,

    /// Print drift as JSON lines
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Teardown
// ============================================================================

#[derive(Parser)]
pub struct TeardownArgs {
    /// Topology file (TOML)
    #[arg(short, long, env = "CLUSTERUP_TOPOLOGY")]
    pub topology: PathBuf,
}
