//! Weighted aggregation and batch ranking.
//!
//! # Ordering
//!
//! [`Algorithm::rank_batch`] sorts records by aggregate score, highest first.
//! Records with equal aggregate scores keep their relative input order, so a
//! ranking is reproducible for a given batch regardless of how many workers
//! scored it or in which order they finished.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use serde::ser::{SerializeMap, SerializeStruct, Serializer};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, InvalidAlgorithm};
use crate::exec::{ExecutionOptions, FailurePolicy, Watchdog};
use crate::function::{ScoringFunction, WeightedScoringFunction};
use crate::item::Item;

/// Weighted score per function, in declaration order.
///
/// Serializes as a JSON object keyed by display name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionScores(Vec<(String, f64)>);

impl FunctionScores {
    /// Weighted score of the function displayed as `display_name`.
    #[must_use]
    pub fn get(&self, display_name: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(name, _)| name == display_name)
            .map(|(_, score)| *score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, score)| (name.as_str(), *score))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, display_name: &str, score: f64) {
        self.0.push((display_name.to_string(), score));
    }
}

impl Serialize for FunctionScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, score) in &self.0 {
            map.serialize_entry(name, score)?;
        }
        map.end()
    }
}

/// Scores for one successfully ranked item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub item_id: String,
    pub per_function_scores: FunctionScores,
    pub aggregate_score: f64,
    /// Position of the item in the input batch.
    pub original_index: usize,
}

/// An item that could not be scored.
#[derive(Debug)]
pub struct ItemFailure {
    pub original_index: usize,
    pub item_id: String,
    pub error: Error,
}

impl Serialize for ItemFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ItemFailure", 5)?;
        state.serialize_field("original_index", &self.original_index)?;
        state.serialize_field("item_id", &self.item_id)?;
        state.serialize_field("code", self.error.code().code())?;
        state.serialize_field("function", &self.error.function())?;
        state.serialize_field("message", &self.error.to_string())?;
        state.end()
    }
}

/// Result of ranking a batch: sorted records plus isolated failures.
#[derive(Debug, Default, Serialize)]
pub struct BatchOutcome {
    pub records: Vec<ScoreRecord>,
    /// Failed items in input order. Always empty under
    /// [`FailurePolicy::FailFast`].
    pub failures: Vec<ItemFailure>,
}

/// A named, ordered set of weighted scoring functions.
///
/// Construction enforces the invariants: a non-empty name, at least one
/// function, unique display names and finite weights.
#[derive(Debug, Clone)]
pub struct Algorithm {
    name: String,
    description: String,
    functions: Vec<WeightedScoringFunction>,
}

impl Algorithm {
    /// Build an algorithm, validating its invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the name is empty, `functions` is
    /// empty, two functions share a display name, or a weight is not finite.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        functions: Vec<WeightedScoringFunction>,
    ) -> Result<Self, Error> {
        let name = name.into();
        validate(&functions, &name).map_err(|reason| Error::Configuration {
            algorithm: name.clone(),
            reason,
        })?;

        Ok(Self {
            name,
            description: description.into(),
            functions,
        })
    }

    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> AlgorithmBuilder {
        AlgorithmBuilder {
            name: name.into(),
            description: description.into(),
            functions: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn functions(&self) -> &[WeightedScoringFunction] {
        &self.functions
    }

    /// Declared `(display name, weight)` pairs, in declaration order.
    #[must_use]
    pub fn weights(&self) -> Vec<(&str, f64)> {
        self.functions
            .iter()
            .map(|f| (f.display_name(), f.weight()))
            .collect()
    }

    /// Aggregate score for one item: the sum of every weighted function score.
    ///
    /// # Errors
    ///
    /// Fails with the first failing function's error; no partial sum is
    /// returned. A sum that overflows is an [`Error::Validation`].
    pub fn score(&self, item: &Item) -> Result<f64, Error> {
        self.functions.iter().try_fold(0.0, |total, function| {
            function.accumulate(total, function.run(item)?)
        })
    }

    /// Score every item and return the records sorted by aggregate score.
    ///
    /// # Errors
    ///
    /// Under [`FailurePolicy::FailFast`], the error of the lowest-indexed item
    /// that failed. [`Error::WorkerPool`] if a worker pool was requested and
    /// could not be started. Under [`FailurePolicy::Isolate`] item failures
    /// are reported in [`BatchOutcome::failures`] instead.
    #[instrument(skip_all, fields(algorithm = %self.name, items = items.len()))]
    pub fn rank_batch(
        &self,
        items: &[Item],
        options: &ExecutionOptions,
    ) -> Result<BatchOutcome, Error> {
        let workers = options.effective_workers();
        let watchdog = options
            .timeout
            .map(|timeout| Watchdog::new(timeout, workers, self.functions.len()))
            .transpose()
            .map_err(|source| Error::WorkerPool { workers, source })?;
        if let Some(watchdog) = &watchdog {
            debug!(?watchdog, "bounding function calls");
        }

        let results = if workers == 1 || items.len() < 2 {
            self.score_sequential(items, options, watchdog.as_ref())
        } else {
            self.score_parallel(items, options, watchdog.as_ref(), workers)?
        };

        let mut outcome = BatchOutcome::default();
        for result in results {
            match result {
                Ok(record) => outcome.records.push(record),
                Err(failure) if options.policy == FailurePolicy::FailFast => {
                    return Err(failure.error);
                }
                Err(failure) => {
                    warn!(
                        item = %failure.item_id,
                        index = failure.original_index,
                        code = %failure.error.code(),
                        error = %failure.error,
                        "item excluded from ranking"
                    );
                    outcome.failures.push(failure);
                }
            }
        }

        sort_records(&mut outcome.records);
        info!(
            ranked = outcome.records.len(),
            failed = outcome.failures.len(),
            workers,
            "ranked batch"
        );
        Ok(outcome)
    }

    fn score_sequential(
        &self,
        items: &[Item],
        options: &ExecutionOptions,
        watchdog: Option<&Watchdog>,
    ) -> Vec<Result<ScoreRecord, ItemFailure>> {
        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let result = self.score_record(index, item, options, watchdog);
            let stop = result.is_err() && options.policy == FailurePolicy::FailFast;
            results.push(result);
            if stop {
                break;
            }
        }
        results
    }

    fn score_parallel(
        &self,
        items: &[Item],
        options: &ExecutionOptions,
        watchdog: Option<&Watchdog>,
        workers: usize,
    ) -> Result<Vec<Result<ScoreRecord, ItemFailure>>, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("feedrank-rank-{index}"))
            .build()
            .map_err(|source| Error::WorkerPool { workers, source })?;

        // Indexed collect keeps input order regardless of completion order.
        Ok(pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| self.score_record(index, item, options, watchdog))
                .collect()
        }))
    }

    fn score_record(
        &self,
        index: usize,
        item: &Item,
        options: &ExecutionOptions,
        watchdog: Option<&Watchdog>,
    ) -> Result<ScoreRecord, ItemFailure> {
        let item_id = item
            .identifier(&options.id_field)
            .unwrap_or_else(|| format!("#{index}"));
        // Watched calls hand the item to a helper thread, which needs an owned copy.
        let shared = watchdog.map(|watchdog| (watchdog, Arc::new(item.clone())));

        let mut per_function_scores = FunctionScores::default();
        let mut aggregate_score = 0.0;
        for function in &self.functions {
            let scored = match &shared {
                Some((watchdog, shared)) => function.run_watched(shared, watchdog),
                None => function.run(item),
            }
            .and_then(|score| {
                aggregate_score = function.accumulate(aggregate_score, score)?;
                Ok(score)
            });

            match scored {
                Ok(score) => per_function_scores.push(function.display_name(), score),
                Err(error) => {
                    return Err(ItemFailure {
                        original_index: index,
                        error: error.for_item(&item_id),
                        item_id,
                    });
                }
            }
        }

        debug!(item = %item_id, aggregate_score, "scored item");
        Ok(ScoreRecord {
            item_id,
            per_function_scores,
            aggregate_score,
            original_index: index,
        })
    }
}

/// Fluent assembly of an [`Algorithm`].
#[derive(Debug, Clone)]
pub struct AlgorithmBuilder {
    name: String,
    description: String,
    functions: Vec<WeightedScoringFunction>,
}

impl AlgorithmBuilder {
    /// Add `function` displayed under its own name.
    #[must_use]
    pub fn function(mut self, weight: f64, function: ScoringFunction) -> Self {
        self.functions
            .push(WeightedScoringFunction::new(weight, function));
        self
    }

    /// Add `function` under an explicit display name.
    #[must_use]
    pub fn named(
        mut self,
        display_name: impl Into<String>,
        weight: f64,
        function: ScoringFunction,
    ) -> Self {
        self.functions
            .push(WeightedScoringFunction::named(display_name, weight, function));
        self
    }

    #[must_use]
    pub fn weighted(mut self, function: WeightedScoringFunction) -> Self {
        self.functions.push(function);
        self
    }

    /// # Errors
    ///
    /// Same as [`Algorithm::new`].
    pub fn build(self) -> Result<Algorithm, Error> {
        Algorithm::new(self.name, self.description, self.functions)
    }
}

/// Sort by aggregate score descending, breaking ties by input position.
///
/// Aggregates produced by [`Algorithm::rank_batch`] are always finite, which
/// makes the score comparison a total order.
pub fn sort_records(records: &mut [ScoreRecord]) {
    records.sort_by(|a, b| {
        b.aggregate_score
            .partial_cmp(&a.aggregate_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.original_index.cmp(&b.original_index))
    });
}

fn validate(functions: &[WeightedScoringFunction], name: &str) -> Result<(), InvalidAlgorithm> {
    if name.trim().is_empty() {
        return Err(InvalidAlgorithm::EmptyName);
    }
    if functions.is_empty() {
        return Err(InvalidAlgorithm::NoFunctions);
    }

    let mut seen = HashSet::with_capacity(functions.len());
    for function in functions {
        if !seen.insert(function.display_name()) {
            return Err(InvalidAlgorithm::DuplicateDisplayName(
                function.display_name().to_string(),
            ));
        }
        if !function.weight().is_finite() {
            return Err(InvalidAlgorithm::NonFiniteWeight {
                display_name: function.display_name().to_string(),
                weight: function.weight(),
            });
        }
    }

    Ok(())
}
