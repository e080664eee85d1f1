#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use feedrank_core::{FunctionRegistry, builtins};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "feedrank: weighted scoring and ranking for content feeds",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format; overrides `--json` and the FORMAT env var.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Algorithm store directory; overrides `[store] dir` in the config.
    #[arg(long, global = true, value_name = "DIR")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Store",
        about = "Save the predefined algorithms",
        long_about = "Save the predefined algorithms (\"Simple Algo\", \"Random algo\") to the algorithm store.",
        after_help = "EXAMPLES:\n    # Save every predefined algorithm\n    feedrank save-builtins\n\n    # Save one of them\n    feedrank save-builtins --only \"Simple Algo\""
    )]
    SaveBuiltins(cmd::save::SaveArgs),

    #[command(
        next_help_heading = "Store",
        about = "List saved algorithms",
        long_about = "List saved algorithms from their metadata records, sorted by name.",
        after_help = "EXAMPLES:\n    # List algorithms\n    feedrank list\n\n    # Emit machine-readable output\n    feedrank list --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Store",
        about = "Show one saved algorithm",
        long_about = "Load a saved algorithm and show its weighted functions.",
        after_help = "EXAMPLES:\n    # Show an algorithm\n    feedrank show \"Simple Algo\""
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Store",
        about = "Remove a saved algorithm",
        after_help = "EXAMPLES:\n    # Remove an algorithm\n    feedrank remove \"Random algo\""
    )]
    Remove(cmd::remove::RemoveArgs),

    #[command(
        next_help_heading = "Ranking",
        about = "Rank a batch of items",
        long_about = "Rank a batch of items (JSON array or JSON lines) with a saved algorithm.",
        after_help = "EXAMPLES:\n    # Rank items from a file\n    feedrank rank \"Simple Algo\" --input tweets.json\n\n    # Rank from stdin on four workers, top 10 only\n    cat tweets.jsonl | feedrank rank \"Simple Algo\" --workers 4 --limit 10\n\n    # Abort on the first failing item\n    feedrank rank \"Simple Algo\" -i tweets.json --fail-fast --json"
    )]
    Rank(cmd::rank::RankArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    feedrank completions bash"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

/// Log line format used when `FEEDRANK_LOG_FORMAT` is unset. Machine-readable
/// output gets JSON log lines so both streams stay parseable.
const fn default_log_format(output: OutputMode) -> &'static str {
    if output.is_json() { "json" } else { "compact" }
}

fn init_tracing(verbose: bool, output: OutputMode) {
    let filter = EnvFilter::try_from_env("FEEDRANK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
                "feedrank=debug,info"
            } else {
                "feedrank=info,warn"
            })
        });

    let format = env::var("FEEDRANK_LOG_FORMAT")
        .unwrap_or_else(|_| default_log_format(output).to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let output = cli.output_mode();
    init_tracing(cli.verbose, output);

    let registry = FunctionRegistry::global();
    builtins::register_all(registry);
    debug!(implementations = registry.len(), "registered built-ins");

    let project_root = env::current_dir()?;
    let workspace = || cmd::open_workspace(&project_root, cli.store.as_ref());

    match &cli.command {
        Commands::SaveBuiltins(args) => cmd::save::run_save(args, output, &workspace()?, registry),
        Commands::List(args) => cmd::list::run_list(args, output, &workspace()?),
        Commands::Show(args) => cmd::show::run_show(args, output, &workspace()?, registry),
        Commands::Remove(args) => cmd::remove::run_remove(args, output, &workspace()?),
        Commands::Rank(args) => cmd::rank::run_rank(args, output, &workspace()?, registry),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}
