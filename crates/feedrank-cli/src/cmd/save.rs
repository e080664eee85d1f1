//! `feedrank save-builtins`: persist the predefined algorithms to the store.

use std::path::Path;

use clap::Args;
use feedrank_core::{FunctionRegistry, PersistedAlgorithmMetadata, builtins};
use serde::Serialize;
use tracing::info;

use crate::cmd::Workspace;
use crate::output::{CliError, OutputMode, fail, pretty_section, render_error, render_mode};

#[derive(Args, Debug)]
pub struct SaveArgs {
    /// Save only the predefined algorithm with this name.
    #[arg(long, value_name = "NAME")]
    pub only: Option<String>,
}

#[derive(Debug, Serialize)]
struct SaveReport {
    store: String,
    saved: Vec<PersistedAlgorithmMetadata>,
}

/// Execute `feedrank save-builtins`.
///
/// # Errors
///
/// Returns an error if `--only` names no predefined algorithm, or if any
/// artifact cannot be written.
pub fn run_save(
    args: &SaveArgs,
    output: OutputMode,
    workspace: &Workspace,
    registry: &FunctionRegistry,
) -> anyhow::Result<()> {
    let algorithms =
        builtins::predefined_algorithms(registry).map_err(|err| fail(output, &err))?;

    let selected: Vec<_> = algorithms
        .iter()
        .filter(|algorithm| args.only.as_deref().is_none_or(|only| algorithm.name() == only))
        .collect();

    if selected.is_empty() {
        let names: Vec<&str> = algorithms.iter().map(|a| a.name()).collect();
        render_error(
            output,
            &CliError::with_details(
                format!(
                    "no predefined algorithm named `{}`",
                    args.only.as_deref().unwrap_or_default()
                ),
                format!("choose one of: {}", names.join(", ")),
                "unknown_algorithm",
            ),
        )?;
        anyhow::bail!("unknown predefined algorithm");
    }

    let mut saved = Vec::with_capacity(selected.len());
    for algorithm in selected {
        saved.push(
            workspace
                .store
                .save(algorithm)
                .map_err(|err| fail(output, &err))?,
        );
    }
    info!(count = saved.len(), "saved predefined algorithms");

    let report = SaveReport {
        store: workspace.store.root().display().to_string(),
        saved,
    };
    render_mode(
        output,
        &report,
        |report, w| {
            for metadata in &report.saved {
                writeln!(
                    w,
                    "{}\t{}",
                    metadata.name,
                    Path::new(&report.store)
                        .join(&metadata.artifact_location)
                        .display()
                )?;
            }
            Ok(())
        },
        |report, w| {
            pretty_section(w, &format!("Saved to {}", report.store))?;
            for metadata in &report.saved {
                writeln!(
                    w,
                    "✓ {} ({} functions)",
                    metadata.name, metadata.function_count
                )?;
            }
            Ok(())
        },
    )
}
