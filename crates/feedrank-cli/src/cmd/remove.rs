
use clap::Args;
use serde::Serialize;

use crate::cmd::Workspace;
use crate::output::{OutputMode, fail, render_mode};

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Saved algorithm name.
    pub name: String,
}

#[derive(Debug, Serialize)]
struct RemoveReport<'a> {
    name: &'a str,
    removed: bool,
}

/// Execute `feedrank remove <name>`. Removing a name that was never saved is
/// not an error; the report says nothing was removed.
///
/// # Errors
///
/// Returns an error if a stored file exists but cannot be deleted.
pub fn run_remove(args: &RemoveArgs, output: OutputMode, workspace: &Workspace) -> anyhow::Result<()> {
    let removed = workspace
        .store
        .remove(&args.name)
        .map_err(|err| fail(output, &err))?;

    let report = RemoveReport {
        name: &args.name,
        removed,
    };
    render_mode(
        output,
        &report,
        |report, w| writeln!(w, "{}\t{}", report.name, report.removed),
        |report, w| {
            if report.removed {
                writeln!(w, "✓ removed {}", report.name)
            } else {
                writeln!(w, "nothing saved under {}", report.name)
            }
        },
    )
}
