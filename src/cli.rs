//! CLI arguments for the CSP discovery commands.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "csp-flow",
    version,
    about = "Closed-loop crystal structure prediction orchestrator",
    after_help = "Commands:\n  csp:discover --objective <s> --workspace <dir>   Scout a chemistry, solve, validate\n  csp:iterate --run-id <id> --workspace <dir>      Relax/tighten constraints and re-solve\n  csp:validate --run-id <id> --workspace <dir>     Revalidate candidates already on disk\n  csp:export --run-id <id> --workspace <dir>       Export top candidates as cif/poscar\n\nExamples:\n  csp-flow csp:discover --dry-run --workspace /tmp/csp --seed 1 --objective \"Discover stable oxide\"\n  csp-flow csp:iterate --dry-run --workspace /tmp/csp --run-id run_1_8f41f2aa\n  csp-flow csp:export --workspace /tmp/csp --run-id run_1_8f41f2aa --format poscar --top-k 3",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "csp:discover")]
    Discover(DiscoverArgs),
    #[command(name = "csp:iterate")]
    Iterate(IterateArgs),
    #[command(name = "csp:validate")]
    Validate(ValidateArgs),
    #[command(name = "csp:export")]
    Export(ExportArgs),
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Workspace directory holding runs/
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Seed for the deterministic PRNG stream
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Path to a config JSON file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Force the deterministic stub tool client
    #[arg(long)]
    pub dry_run: bool,

    /// Emit a transcript of the workflow to stderr
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
#[command(about = "Run one full scout/solve/validate pass and record a run")]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Materials-science objective driving the run
    #[arg(long)]
    pub objective: String,

    /// Chemistry system (CSV or dashed, e.g. Li,Fe,P,O); skips the scout
    #[arg(long, value_name = "CSV")]
    pub chem_system: Option<String>,

    /// MILP solver backend (gurobi, cbc, highs)
    #[arg(long, value_name = "NAME")]
    pub solver: Option<String>,

    /// Iteration cap recorded in the run manifest
    #[arg(long, value_name = "N")]
    pub max_iters: Option<u32>,
}

#[derive(Args, Debug)]
#[command(about = "Apply the relax/tighten policy and re-solve an existing run")]
pub struct IterateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Run identifier from a prior discover
    #[arg(long, value_name = "ID")]
    pub run_id: String,
}

#[derive(Args, Debug)]
#[command(about = "Revalidate candidates already on disk and rewrite the summary")]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Run identifier from a prior discover
    #[arg(long, value_name = "ID")]
    pub run_id: String,

    /// Limit to the first N candidates in filename order
    #[arg(long, value_name = "N")]
    pub top_k: Option<usize>,
}

#[derive(Args, Debug)]
#[command(about = "Export top candidates under exports/")]
pub struct ExportArgs {
    /// Workspace directory holding runs/
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Path to a config JSON file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run identifier from a prior discover
    #[arg(long, value_name = "ID")]
    pub run_id: String,

    /// Output format
    #[arg(long, value_enum, default_value = "cif")]
    pub format: ExportFormatArg,

    /// Number of candidates to export, best first
    #[arg(long, value_name = "N")]
    pub top_k: Option<usize>,

    /// Emit a transcript of the workflow to stderr
    #[arg(long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormatArg {
    Cif,
    Poscar,
}
