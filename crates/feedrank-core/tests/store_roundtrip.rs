//! Save/load contract for algorithm artifacts.
//!
//! # Acceptance Criteria
//!
//! - ✅ `load(save(A))` keeps name, description, display names and weights
//! - ✅ A reloaded algorithm produces identical score records
//! - ✅ Saving an existing name replaces it (last write wins)
//! - ✅ `list()` discovers saved algorithms without loading artifacts

use std::fs;

use feedrank_core::builtins;
use feedrank_core::{
    Algorithm, AlgorithmStore, Error, ErrorKind, ExecutionOptions, FunctionRegistry, Item,
    ScoringFunction,
};

fn registry() -> FunctionRegistry {
    let registry = FunctionRegistry::new();
    builtins::register_all(&registry);
    registry.register_fn("likes", |item| {
        Ok(item.f64_field("likes").unwrap_or(0.0).clamp(0.0, 100.0))
    });
    registry
}

fn engagement_algorithm(registry: &FunctionRegistry, name: &str, likes_weight: f64) -> Algorithm {
    let likes = registry.resolve("likes").expect("registered");
    let simple = builtins::simple_algorithm(registry).expect("built-ins registered");

    let mut builder = Algorithm::builder(name, "likes, length and sentiment")
        .named("likes", likes_weight, ScoringFunction::new("Likes", "raw likes", likes));
    for function in simple.functions() {
        builder = builder.weighted(function.clone());
    }
    builder.build().expect("valid algorithm")
}

fn batch() -> Vec<Item> {
    vec![
        Item::new()
            .with("id", "a")
            .with("text", "what a wonderful day")
            .with("likes", 12),
        Item::new()
            .with("id", "b")
            .with("text", "terrible service, not good")
            .with("likes", 90),
        Item::new().with("id", "c").with("text", "ok").with("likes", 12),
        Item::new().with("id", "d").with("likes", 3),
    ]
}

#[test]
fn round_trip_preserves_definition_and_scores() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let store = AlgorithmStore::new(temp.path());
    let registry = registry();
    let original = engagement_algorithm(&registry, "Engagement", 0.4);

    let metadata = store.save(&original).expect("save should succeed");
    let loaded = store.load(&metadata, &registry).expect("load should succeed");

    assert_eq!(loaded.name(), original.name());
    assert_eq!(loaded.description(), original.description());
    assert_eq!(loaded.weights(), original.weights());
    for (a, b) in loaded.functions().iter().zip(original.functions()) {
        assert_eq!(a.function().name(), b.function().name());
        assert_eq!(a.function().description(), b.function().description());
        assert_eq!(a.function().implementation(), b.function().implementation());
    }

    let options = ExecutionOptions::default();
    let before = original.rank_batch(&batch(), &options).expect("ranks");
    let after = loaded.rank_batch(&batch(), &options).expect("ranks");
    assert_eq!(after.records, before.records);
    assert_eq!(after.failures.len(), 1);
    assert_eq!(after.failures[0].item_id, "d");
}

#[test]
fn saving_same_name_replaces_previous_artifact() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let store = AlgorithmStore::new(temp.path());
    let registry = registry();

    store
        .save(&engagement_algorithm(&registry, "Engagement", 0.4))
        .expect("first save");
    store
        .save(&engagement_algorithm(&registry, "Engagement", 0.9))
        .expect("second save");

    let listed = store.list().expect("list should succeed");
    assert_eq!(listed.len(), 1);

    let loaded = store
        .load_by_name("Engagement", &registry)
        .expect("load should succeed");
    assert_eq!(loaded.weights()[0], ("likes", 0.9));

    let artifacts = fs::read_dir(temp.path().join("artifacts/Engagement"))
        .expect("artifact dir exists")
        .count();
    assert_eq!(artifacts, 1, "superseded artifact is deleted");
}

#[test]
fn list_returns_metadata_sorted_by_name() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let store = AlgorithmStore::new(temp.path());
    let registry = registry();

    for algorithm in builtins::predefined_algorithms(&registry).expect("built-ins registered") {
        store.save(&algorithm).expect("save should succeed");
    }
    store
        .save(&engagement_algorithm(&registry, "Engagement/v2", 1.0))
        .expect("save should succeed");

    let listed = store.list().expect("list should succeed");
    let names: Vec<&str> = listed.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Engagement/v2", "Random algo", "Simple Algo"]);

    let simple = &listed[2];
    assert_eq!(simple.description, "Tweet Length and Sentiment");
    assert_eq!(simple.function_count, 2);
    assert!(temp.path().join(&simple.artifact_location).is_file());
}

#[test]
fn corrupt_index_record_is_reported_not_skipped() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let store = AlgorithmStore::new(temp.path());
    let registry = registry();
    store
        .save(&builtins::simple_algorithm(&registry).expect("built-ins registered"))
        .expect("save should succeed");

    fs::write(temp.path().join("index/broken.json"), "{").expect("write broken record");

    let err = store.list().expect_err("broken record surfaces");
    assert!(matches!(err, Error::Corrupt { .. }), "{err}");
}

#[test]
fn unsupported_format_version_is_a_schema_error() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let store = AlgorithmStore::new(temp.path());
    let registry = registry();
    let metadata = store
        .save(&builtins::simple_algorithm(&registry).expect("built-ins registered"))
        .expect("save should succeed");

    let artifact_path = temp.path().join(&metadata.artifact_location);
    let mut artifact: serde_json::Value =
        serde_json::from_slice(&fs::read(&artifact_path).expect("read artifact"))
            .expect("artifact is json");
    artifact["format_version"] = serde_json::json!(99);
    let body = serde_json::to_vec_pretty(&artifact).expect("serialize");
    fs::write(&artifact_path, &body).expect("rewrite artifact");

    let mut metadata = metadata;
    metadata.checksum = format!("blake3:{}", blake3::hash(&body).to_hex());

    let err = store
        .load(&metadata, &registry)
        .expect_err("version 99 is unknown");
    assert_eq!(err.kind(), ErrorKind::Schema);
}

#[test]
fn missing_artifact_is_a_persistence_error() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let store = AlgorithmStore::new(temp.path());
    let registry = registry();
    let metadata = store
        .save(&builtins::simple_algorithm(&registry).expect("built-ins registered"))
        .expect("save should succeed");

    fs::remove_file(temp.path().join(&metadata.artifact_location)).expect("delete artifact");

    let err = store.load(&metadata, &registry).expect_err("artifact is gone");
    assert!(matches!(err, Error::Io { .. }));
    assert_eq!(err.kind(), ErrorKind::Persistence);
}
