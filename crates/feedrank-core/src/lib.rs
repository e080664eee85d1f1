#![forbid(unsafe_code)]
//! feedrank-core library.
//!
//! Build [`ScoringFunction`]s, weight them into an [`Algorithm`], persist it
//! with an [`AlgorithmStore`], and rank batches of [`Item`]s with a
//! [`BatchRanker`].
//!
//! # Conventions
//!
//! - **Errors**: [`Error`] (`thiserror`) for everything the engine reports;
//!   `anyhow::Result` for config loading and scoring implementations.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod algorithm;
pub mod builtins;
pub mod config;
pub mod error;
pub mod exec;
pub mod function;
pub mod item;
pub mod ranker;
pub mod registry;
pub mod store;

pub use algorithm::{
    Algorithm, AlgorithmBuilder, BatchOutcome, FunctionScores, ItemFailure, ScoreRecord,
};
pub use error::{Error, ErrorCode, ErrorKind};
pub use exec::{ExecutionOptions, FailurePolicy};
pub use function::{Computation, SCORE_MAX, SCORE_MIN, ScoringFunction, WeightedScoringFunction};
pub use item::Item;
pub use ranker::{BatchRanker, DeclaredWeight, RankedBatch, RankedEntry};
pub use registry::FunctionRegistry;
pub use store::{AlgorithmStore, PersistedAlgorithmMetadata};
