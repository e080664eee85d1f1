//! Presentation-facing batch ranking.
//!
//! [`BatchRanker`] is the seam ingestion and display collaborators attach to:
//! it runs [`Algorithm::rank_batch`] and decorates each record with its rank
//! and the item's external link field, alongside the algorithm's declared
//! weights.

use serde::Serialize;
use tracing::instrument;

use crate::algorithm::{Algorithm, ItemFailure, ScoreRecord};
use crate::error::Error;
use crate::exec::ExecutionOptions;
use crate::item::Item;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclaredWeight {
    pub display_name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    /// 1-based position in the ranking.
    pub rank: usize,
    /// The item's external link (e.g. a source URL), when present.
    pub link: Option<String>,
    #[serde(flatten)]
    pub record: ScoreRecord,
}

#[derive(Debug, Serialize)]
pub struct RankedBatch {
    pub algorithm: String,
    pub description: String,
    pub weights: Vec<DeclaredWeight>,
    pub entries: Vec<RankedEntry>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone)]
pub struct BatchRanker<'a> {
    algorithm: &'a Algorithm,
    options: ExecutionOptions,
    link_field: Option<String>,
}

impl<'a> BatchRanker<'a> {
    #[must_use]
    pub fn new(algorithm: &'a Algorithm) -> Self {
        Self {
            algorithm,
            options: ExecutionOptions::default(),
            link_field: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Field copied from each item onto its ranked entry.
    #[must_use]
    pub fn with_link_field(mut self, field: impl Into<String>) -> Self {
        self.link_field = Some(field.into());
        self
    }

    #[must_use]
    pub const fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Rank `items`.
    ///
    /// # Errors
    ///
    /// Same as [`Algorithm::rank_batch`].
    #[instrument(skip_all, fields(algorithm = %self.algorithm.name()))]
    pub fn rank(&self, items: &[Item]) -> Result<RankedBatch, Error> {
        let outcome = self.algorithm.rank_batch(items, &self.options)?;

        let entries = outcome
            .records
            .into_iter()
            .enumerate()
            .map(|(position, record)| RankedEntry {
                rank: position + 1,
                link: self
                    .link_field
                    .as_deref()
                    .and_then(|field| items.get(record.original_index)?.identifier(field)),
                record,
            })
            .collect();

        Ok(RankedBatch {
            algorithm: self.algorithm.name().to_string(),
            description: self.algorithm.description().to_string(),
            weights: self
                .algorithm
                .weights()
                .into_iter()
                .map(|(display_name, weight)| DeclaredWeight {
                    display_name: display_name.to_string(),
                    weight,
                })
                .collect(),
            entries,
            failures: outcome.failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Computation, ScoringFunction};

    fn likes_algorithm() -> Algorithm {
        Algorithm::builder("Likes", "more likes first")
            .named(
                "likes",
                0.5,
                ScoringFunction::new(
                    "Likes",
                    "",
                    Computation::new("likes", |item| {
                        item.f64_field("likes")
                            .ok_or_else(|| anyhow::anyhow!("no likes"))
                    }),
                ),
            )
            .build()
            .expect("valid algorithm")
    }

    #[test]
    fn rank_attaches_rank_link_and_weights() {
        let algorithm = likes_algorithm();
        let items = vec![
            Item::new()
                .with("id", "a")
                .with("url", "https://example.com/a")
                .with("likes", 10.0),
            Item::new().with("id", "b").with("likes", 90.0),
        ];

        let batch = BatchRanker::new(&algorithm)
            .with_link_field("url")
            .rank(&items)
            .expect("ranks");

        assert_eq!(batch.algorithm, "Likes");
        assert_eq!(
            batch.weights,
            vec![DeclaredWeight {
                display_name: "likes".to_string(),
                weight: 0.5
            }]
        );
        assert_eq!(batch.entries[0].rank, 1);
        assert_eq!(batch.entries[0].record.item_id, "b");
        assert!(batch.entries[0].link.is_none());
        assert_eq!(batch.entries[1].rank, 2);
        assert_eq!(batch.entries[1].link.as_deref(), Some("https://example.com/a"));
    }

    #[test]
    fn ranked_batch_serializes_flat_entries() {
        let algorithm = likes_algorithm();
        let items = vec![Item::new().with("id", "a").with("likes", 10.0), Item::new()];

        let batch = BatchRanker::new(&algorithm).rank(&items).expect("ranks");
        let value = serde_json::to_value(&batch).expect("serializes");

        assert_eq!(value["entries"][0]["item_id"], "a");
        assert_eq!(value["entries"][0]["rank"], 1);
        assert_eq!(value["entries"][0]["per_function_scores"]["likes"], 5.0);
        assert_eq!(value["failures"][0]["item_id"], "#1");
        assert_eq!(value["failures"][0]["code"], "E1002");
    }
}
