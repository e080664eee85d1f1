//! Scoring functions and their weighted wrappers.
//!
//! A [`ScoringFunction`] wraps one registered [`Computation`] and enforces the
//! output contract: every score is a finite number in
//! [`SCORE_MIN`]`..=`[`SCORE_MAX`]. A [`WeightedScoringFunction`] multiplies a
//! validated score by its weight and never reinterprets a failure as a value.
//!
//! Implementations are expected to be pure: read-only access to the item and
//! no state shared between calls. The engine relies on this to score items
//! concurrently but cannot enforce it.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ExecutionFailure, InvalidScore};
use crate::exec::{self, Watchdog};
use crate::item::Item;

pub const SCORE_MIN: f64 = -100.0;
pub const SCORE_MAX: f64 = 100.0;

/// Signature every scoring implementation has.
pub type ScoreFn = dyn Fn(&Item) -> anyhow::Result<f64> + Send + Sync;

/// A named scoring implementation.
///
/// The key is what persisted algorithms refer to; the same key must be
/// registered in the loading environment for an artifact to load.
#[derive(Clone)]
pub struct Computation {
    key: String,
    func: Arc<ScoreFn>,
}

impl Computation {
    pub fn new<F>(key: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Item) -> anyhow::Result<f64> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            func: Arc::new(func),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ScoringFunction {
    name: String,
    description: String,
    computation: Computation,
}

impl ScoringFunction {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        computation: Computation,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            computation,
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
    pub const fn computation(&self) -> &Computation {
        &self.computation
    }

    /// Key of the registered implementation this function runs.
    #[must_use]
    pub fn implementation(&self) -> &str {
        self.computation.key()
    }

    /// Score `item`.
    ///
    /// # Errors
    ///
    /// [`Error::Execution`] if the implementation returns an error or panics,
    /// [`Error::Validation`] if the result is not finite or lies outside
    /// `[-100, 100]`.
    pub fn run(&self, item: &Item) -> Result<f64, Error> {
        let raw = exec::call_guarded(self.computation.func.as_ref(), item)
            .map_err(|cause| self.execution_error(cause))?;
        self.validate(raw)
    }

    /// Score a shared item under `watchdog`'s timeout.
    pub(crate) fn run_watched(&self, item: &Arc<Item>, watchdog: &Watchdog) -> Result<f64, Error> {
        let raw = watchdog
            .call(&self.computation.func, item)
            .map_err(|cause| self.execution_error(cause))?;
        self.validate(raw)
    }

    fn validate(&self, raw: f64) -> Result<f64, Error> {
        let reason = if !raw.is_finite() {
            InvalidScore::NonNumeric(raw)
        } else if !(SCORE_MIN..=SCORE_MAX).contains(&raw) {
            InvalidScore::OutOfRange(raw)
        } else {
            return Ok(raw);
        };

        Err(Error::Validation {
            function: self.name.clone(),
            item: None,
            reason,
        })
    }

    fn execution_error(&self, cause: ExecutionFailure) -> Error {
        Error::Execution {
            function: self.name.clone(),
            item: None,
            cause,
        }
    }
}

/// A [`ScoringFunction`] with a weight and the display name it is reported
/// under.
#[derive(Debug, Clone)]
pub struct WeightedScoringFunction {
    display_name: String,
    weight: f64,
    function: ScoringFunction,
}

impl WeightedScoringFunction {
    /// Wrap `function`, displayed under its own name.
    #[must_use]
    pub fn new(weight: f64, function: ScoringFunction) -> Self {
        Self {
            display_name: function.name().to_string(),
            weight,
            function,
        }
    }

    /// Wrap `function` under an explicit display name.
    pub fn named(display_name: impl Into<String>, weight: f64, function: ScoringFunction) -> Self {
        Self {
            display_name: display_name.into(),
            weight,
            function,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub const fn weight(&self) -> f64 {
        self.weight
    }

    #[must_use]
    pub const fn function(&self) -> &ScoringFunction {
        &self.function
    }

    /// Weighted score for `item`.
    ///
    /// # Errors
    ///
    /// Propagates the wrapped function's error unchanged. A finite score
    /// whose weighted product overflows is an [`Error::Validation`].
    pub fn run(&self, item: &Item) -> Result<f64, Error> {
        self.weigh(self.function.run(item)?)
    }

    pub(crate) fn run_watched(&self, item: &Arc<Item>, watchdog: &Watchdog) -> Result<f64, Error> {
        self.weigh(self.function.run_watched(item, watchdog)?)
    }

    /// Add this function's weighted `score` to a running aggregate.
    pub(crate) fn accumulate(&self, total: f64, score: f64) -> Result<f64, Error> {
        self.finite(total + score)
    }

    fn weigh(&self, score: f64) -> Result<f64, Error> {
        self.finite(score * self.weight)
    }

    fn finite(&self, value: f64) -> Result<f64, Error> {
        if value.is_finite() {
            return Ok(value);
        }

        Err(Error::Validation {
            function: self.function.name.clone(),
            item: None,
            reason: InvalidScore::NonNumeric(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;

    fn constant(value: f64) -> ScoringFunction {
        ScoringFunction::new(
            "constant",
            "always the same",
            Computation::new("constant", move |_| Ok(value)),
        )
    }

    #[test]
    fn accepts_scores_on_the_boundaries() {
        assert!((constant(100.0).run(&Item::new()).expect("100 is valid") - 100.0).abs() < 1e-12);
        assert!((constant(-100.0).run(&Item::new()).expect("-100 is valid") + 100.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let err = constant(101.0).run(&Item::new()).expect_err("101 is invalid");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(matches!(
            err,
            Error::Validation {
                reason: InvalidScore::OutOfRange(_),
                ..
            }
        ));
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn rejects_non_numeric_scores() {
        for raw in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = constant(raw).run(&Item::new()).expect_err("non-finite is invalid");
            assert!(matches!(
                err,
                Error::Validation {
                    reason: InvalidScore::NonNumeric(_),
                    ..
                }
            ));
            assert!(err.to_string().contains("non-numeric result"));
        }
    }

    #[test]
    fn implementation_failures_are_execution_errors() {
        let failing = ScoringFunction::new(
            "needs_text",
            "",
            Computation::new("needs_text", |item| {
                item.text()
                    .map(|_| 1.0)
                    .ok_or_else(|| anyhow::anyhow!("item has no text"))
            }),
        );

        let err = failing.run(&Item::new()).expect_err("missing text fails");
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(err.function(), Some("needs_text"));
        assert!(err.to_string().contains("item has no text"));
    }

    #[test]
    fn weighted_run_multiplies_validated_score() {
        let weighted = WeightedScoringFunction::new(0.25, constant(80.0));
        let value = weighted.run(&Item::new()).expect("valid");
        assert!((value - 20.0).abs() < 1e-12);
        assert_eq!(weighted.display_name(), "constant");
    }

    #[test]
    fn weighted_run_propagates_validation_errors() {
        let weighted = WeightedScoringFunction::named("boosted", 0.5, constant(150.0));
        let err = weighted.run(&Item::new()).expect_err("weight does not rescue 150");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.function(), Some("constant"));
    }

    #[test]
    fn weights_may_be_negative_or_large() {
        let item = Item::new();
        let negative = WeightedScoringFunction::new(-2.0, constant(10.0));
        let large = WeightedScoringFunction::new(40.0, constant(10.0));
        assert!((negative.run(&item).expect("valid") + 20.0).abs() < 1e-12);
        assert!((large.run(&item).expect("valid") - 400.0).abs() < 1e-12);
    }

    #[test]
    fn overflowing_weighted_score_is_rejected() {
        for weight in [f64::MAX, -f64::MAX] {
            let weighted = WeightedScoringFunction::named("huge", weight, constant(100.0));
            let err = weighted.run(&Item::new()).expect_err("product overflows");
            assert!(matches!(
                err,
                Error::Validation {
                    reason: InvalidScore::NonNumeric(_),
                    ..
                }
            ));
            assert_eq!(err.function(), Some("constant"));
        }

        let zero = WeightedScoringFunction::named("huge", f64::MAX, constant(0.0));
        assert!(zero.run(&Item::new()).expect("0 * MAX is finite").abs() < f64::EPSILON);
    }

    #[test]
    fn watched_run_matches_run() {
        let item = Arc::new(Item::new());
        let function = constant(12.0);
        let watchdog = Watchdog::new(Duration::from_secs(5), 1, 1).expect("pool starts");
        let watched = function.run_watched(&item, &watchdog).expect("valid");
        let direct = function.run(&item).expect("valid");
        assert!((watched - direct).abs() < f64::EPSILON);
    }

    #[test]
    fn watched_run_reports_timeouts_as_execution_errors() {
        let slow = ScoringFunction::new(
            "slow",
            "",
            Computation::new("slow", |_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(0.0)
            }),
        );
        let watchdog = Watchdog::new(Duration::from_millis(10), 1, 1).expect("pool starts");

        let err = slow
            .run_watched(&Arc::new(Item::new()), &watchdog)
            .expect_err("should time out");
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(err.to_string().contains("timed out"));
    }
}
