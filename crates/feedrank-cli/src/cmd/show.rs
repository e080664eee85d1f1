//! `feedrank show`: display one saved algorithm's definition.
//!
//! Loading goes through the registry, so `show` also verifies that every
//! implementation key the artifact references is available.

use std::io::Write;

use clap::Args;
use feedrank_core::{Algorithm, FunctionRegistry, PersistedAlgorithmMetadata};
use serde::Serialize;

use crate::cmd::Workspace;
use crate::output::{OutputMode, fail, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Saved algorithm name, e.g. "Simple Algo".
    pub name: String,
}

#[derive(Debug, Serialize)]
struct ShowFunction {
    display_name: String,
    weight: f64,
    function: String,
    description: String,
    implementation: String,
}

#[derive(Debug, Serialize)]
struct ShowAlgorithm {
    #[serde(flatten)]
    metadata: PersistedAlgorithmMetadata,
    functions: Vec<ShowFunction>,
}

impl ShowAlgorithm {
    fn new(metadata: PersistedAlgorithmMetadata, algorithm: &Algorithm) -> Self {
        let functions = algorithm
            .functions()
            .iter()
            .map(|weighted| ShowFunction {
                display_name: weighted.display_name().to_string(),
                weight: weighted.weight(),
                function: weighted.function().name().to_string(),
                description: weighted.function().description().to_string(),
                implementation: weighted.function().implementation().to_string(),
            })
            .collect();
        Self {
            metadata,
            functions,
        }
    }
}

/// Execute `feedrank show <name>`.
///
/// # Errors
///
/// Returns an error if the algorithm is not saved or cannot be loaded.
pub fn run_show(
    args: &ShowArgs,
    output: OutputMode,
    workspace: &Workspace,
    registry: &FunctionRegistry,
) -> anyhow::Result<()> {
    let metadata = workspace
        .store
        .metadata(&args.name)
        .map_err(|err| fail(output, &err))?;
    let algorithm = workspace
        .store
        .load(&metadata, registry)
        .map_err(|err| fail(output, &err))?;

    let view = ShowAlgorithm::new(metadata, &algorithm);
    render_mode(output, &view, write_text, write_pretty)
}

fn write_text(view: &ShowAlgorithm, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "{}\t{}", view.metadata.name, view.metadata.description)?;
    for function in &view.functions {
        writeln!(
            w,
            "{}\t{}\t{}",
            function.display_name, function.weight, function.implementation
        )?;
    }
    Ok(())
}

fn write_pretty(view: &ShowAlgorithm, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &view.metadata.name)?;
    pretty_kv(w, "Description", &view.metadata.description)?;
    pretty_kv(
        w,
        "Saved",
        view.metadata.saved_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )?;
    pretty_kv(w, "Artifact", view.metadata.artifact_location.display().to_string())?;
    pretty_kv(w, "Checksum", &view.metadata.checksum)?;
    writeln!(w)?;

    writeln!(w, "{:<20} {:>8}  {:<20}  DESCRIPTION", "DISPLAY NAME", "WEIGHT", "IMPLEMENTATION")?;
    for function in &view.functions {
        writeln!(
            w,
            "{:<20} {:>8.3}  {:<20}  {}",
            function.display_name, function.weight, function.implementation, function.description
        )?;
    }
    Ok(())
}
