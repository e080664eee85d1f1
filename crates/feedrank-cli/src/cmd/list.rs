//! `feedrank list`: discover saved algorithms from their metadata records.

use std::io::Write;

use clap::Args;
use feedrank_core::PersistedAlgorithmMetadata;

use crate::cmd::Workspace;
use crate::output::{OutputMode, fail, pretty_rule, render_mode};

#[derive(Args, Debug, Default)]
pub struct ListArgs {}

/// Execute `feedrank list`.
///
/// # Errors
///
/// Returns an error if the store index cannot be read.
pub fn run_list(_args: &ListArgs, output: OutputMode, workspace: &Workspace) -> anyhow::Result<()> {
    let records = workspace.store.list().map_err(|err| fail(output, &err))?;
    render_mode(
        output,
        &records,
        |records, w| write_text(records, w),
        |records, w| write_pretty(records, w),
    )
}

fn write_text(records: &[PersistedAlgorithmMetadata], w: &mut dyn Write) -> std::io::Result<()> {
    for record in records {
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            record.name,
            record.function_count,
            record.saved_at.to_rfc3339(),
            record.description
        )?;
    }
    Ok(())
}

fn write_pretty(
    records: &[PersistedAlgorithmMetadata],
    w: &mut dyn Write,
) -> std::io::Result<()> {
    if records.is_empty() {
        writeln!(w, "No saved algorithms. Run `feedrank save-builtins` to add some.")?;
        return Ok(());
    }

    writeln!(w, "{:<24} {:>9}  {:<19}  DESCRIPTION", "NAME", "FUNCTIONS", "SAVED")?;
    pretty_rule(w)?;
    for record in records {
        writeln!(
            w,
            "{:<24} {:>9}  {:<19}  {}",
            record.name,
            record.function_count,
            record.saved_at.format("%Y-%m-%d %H:%M:%S"),
            record.description
        )?;
    }
    Ok(())
}
