use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nodeprep")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge a Linux host into a Kubernetes node", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/nodeprep/config.toml)
    #[arg(long, global = true, env = "NODEPREP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge the host to the recipe
    Apply(ApplyArgs),

    /// Show what apply would change without changing anything
    Plan(RecipeArgs),

    /// Compile the recipe and report validation errors
    Validate(RecipeArgs),

    /// List compiled resources and notification edges
    Show(RecipeArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Default)]
pub struct RecipeArgs {
    /// Recipe file (TOML or JSON); the built-in Kubernetes node recipe when omitted
    #[arg(short, long)]
    pub recipe: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    /// Keep going after a resource fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Exit non-zero when resources were skipped by cancellation
    #[arg(long)]
    pub strict: bool,

    /// Timeout for each external command, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Write the run report as JSON
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
