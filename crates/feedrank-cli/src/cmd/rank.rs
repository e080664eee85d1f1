//! `feedrank rank`: rank a materialized batch of items with a saved algorithm.
//!
//! Items are read from `--input` (or stdin) either as one JSON array of
//! objects or as JSON lines, one object per line.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use feedrank_core::config::RankingConfig;
use feedrank_core::{BatchRanker, ExecutionOptions, FailurePolicy, FunctionRegistry, Item, RankedBatch};
use tracing::info;

use crate::cmd::Workspace;
use crate::output::{CliError, OutputMode, fail, pretty_rule, pretty_section, render_error, render_mode};

#[derive(Args, Debug, Default)]
pub struct RankArgs {
    /// Saved algorithm name, e.g. "Simple Algo".
    pub algorithm: String,

    /// Items file (JSON array or JSON lines). Reads stdin when omitted or `-`.
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Worker pool size; overrides `ranking.workers`.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Per-invocation timeout in milliseconds; `0` disables it.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Fail the whole batch on the first failing item instead of skipping it.
    #[arg(long)]
    pub fail_fast: bool,

    /// Show only the top N entries.
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,
}

impl RankArgs {
    fn execution_options(&self, ranking: &RankingConfig) -> ExecutionOptions {
        let mut options = ranking.execution_options();
        if let Some(workers) = self.workers {
            options = options.with_workers(workers.max(1));
        }
        if let Some(ms) = self.timeout_ms {
            options = options.with_timeout((ms > 0).then(|| Duration::from_millis(ms)));
        }
        if self.fail_fast {
            options = options.with_policy(FailurePolicy::FailFast);
        }
        options
    }
}

/// Execute `feedrank rank <algorithm>`.
///
/// # Errors
///
/// Returns an error if the input cannot be read or parsed, the algorithm
/// cannot be loaded, or ranking fails under `--fail-fast`.
pub fn run_rank(
    args: &RankArgs,
    output: OutputMode,
    workspace: &Workspace,
    registry: &FunctionRegistry,
) -> Result<()> {
    let items = match read_items(args.input.as_deref()) {
        Ok(items) => items,
        Err(err) => {
            render_error(
                output,
                &CliError::with_details(
                    format!("{err:#}"),
                    "pass a JSON array of objects or one JSON object per line",
                    "invalid_input",
                ),
            )?;
            return Err(err);
        }
    };

    let algorithm = workspace
        .store
        .load_by_name(&args.algorithm, registry)
        .map_err(|err| fail(output, &err))?;

    let options = args.execution_options(&workspace.config.ranking);
    info!(
        items = items.len(),
        workers = options.workers,
        policy = ?options.policy,
        "ranking batch"
    );

    let mut batch = BatchRanker::new(&algorithm)
        .with_options(options)
        .with_link_field(workspace.config.ranking.link_field.clone())
        .rank(&items)
        .map_err(|err| fail(output, &err))?;
    if let Some(limit) = args.limit {
        batch.entries.truncate(limit);
    }

    render_mode(output, &batch, write_text, write_pretty)
}

fn read_items(input: Option<&Path>) -> Result<Vec<Item>> {
    let text = match input {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read items from stdin")?;
            buf
        }
    };
    parse_items(&text)
}

/// Parse a JSON array of objects, or JSON lines with blank lines ignored.
fn parse_items(text: &str) -> Result<Vec<Item>> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).context("Failed to parse items array");
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Failed to parse item on line {}", index + 1))
        })
        .collect()
}

fn write_text(batch: &RankedBatch, w: &mut dyn Write) -> io::Result<()> {
    for entry in &batch.entries {
        writeln!(
            w,
            "{}\t{}\t{:.3}\t{}",
            entry.rank,
            entry.record.item_id,
            entry.record.aggregate_score,
            entry.link.as_deref().unwrap_or("-")
        )?;
    }
    for failure in &batch.failures {
        writeln!(
            w,
            "failed\t{}\t{}\t{}",
            failure.item_id,
            failure.error.code(),
            failure.error
        )?;
    }
    Ok(())
}

fn write_pretty(batch: &RankedBatch, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("{}: {}", batch.algorithm, batch.description))?;
    let weights: Vec<String> = batch
        .weights
        .iter()
        .map(|weight| format!("{} x{}", weight.display_name, weight.weight))
        .collect();
    writeln!(w, "weights: {}", weights.join(", "))?;
    writeln!(w)?;

    writeln!(w, "{:>5}  {:>9}  {:<24}  LINK", "RANK", "SCORE", "ITEM")?;
    for entry in &batch.entries {
        writeln!(
            w,
            "{:>5}  {:>9.3}  {:<24}  {}",
            entry.rank,
            entry.record.aggregate_score,
            entry.record.item_id,
            entry.link.as_deref().unwrap_or("")
        )?;
        let breakdown: Vec<String> = entry
            .record
            .per_function_scores
            .iter()
            .map(|(name, score)| format!("{name}={score:.3}"))
            .collect();
        writeln!(w, "{:>18}{}", "", breakdown.join("  "))?;
    }

    if !batch.failures.is_empty() {
        writeln!(w)?;
        pretty_rule(w)?;
        writeln!(w, "{} item(s) could not be scored:", batch.failures.len())?;
        for failure in &batch.failures {
            writeln!(
                w,
                "  #{} {}: [{}] {}",
                failure.original_index,
                failure.item_id,
                failure.error.code(),
                failure.error
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array() {
        let items = parse_items(r#" [{"id": "a", "text": "hi"}, {"id": "b"}]"#).expect("parses");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].str_field("text"), Some("hi"));
    }

    #[test]
    fn parses_json_lines_skipping_blanks() {
        let items = parse_items("{\"id\": 1}\n\n{\"id\": 2}\n").expect("parses");
        let ids: Vec<String> = items
            .iter()
            .filter_map(|item| item.identifier("id"))
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn json_lines_errors_name_the_line() {
        let err = parse_items("{\"id\": 1}\nnot json\n").expect_err("line 2 is broken");
        assert!(format!("{err:#}").contains("line 2"), "{err:#}");
    }

    #[test]
    fn non_object_items_are_rejected() {
        assert!(parse_items("[1, 2, 3]").is_err());
    }

    #[test]
    fn flags_override_config() {
        let ranking = RankingConfig {
            workers: 2,
            function_timeout_ms: 250,
            ..RankingConfig::default()
        };

        let defaults = RankArgs::default().execution_options(&ranking);
        assert_eq!(defaults.workers, 2);
        assert_eq!(defaults.timeout, Some(Duration::from_millis(250)));
        assert_eq!(defaults.policy, FailurePolicy::Isolate);

        let args = RankArgs {
            workers: Some(8),
            timeout_ms: Some(0),
            fail_fast: true,
            ..RankArgs::default()
        };
        let options = args.execution_options(&ranking);
        assert_eq!(options.workers, 8);
        assert_eq!(options.timeout, None);
        assert_eq!(options.policy, FailurePolicy::FailFast);
    }
}
