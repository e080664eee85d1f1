//! Built-in scoring implementations and predefined algorithms.

pub mod sentiment;

use anyhow::anyhow;
use rand::Rng;

use crate::algorithm::Algorithm;
use crate::error::Error;
use crate::function::{Computation, SCORE_MAX, SCORE_MIN, ScoringFunction};
use crate::item::Item;
use crate::registry::FunctionRegistry;

pub const TEXT_LENGTH: &str = "text_length";
pub const LEXICON_SENTIMENT: &str = "lexicon_sentiment";
pub const RANDOM_UNIFORM: &str = "random_uniform";
pub const CONSTANT_ZERO: &str = "constant_zero";

/// Texts at or beyond this many characters get the maximum length score.
pub const MAX_TEXT_CHARS: usize = 280;

/// Register every built-in implementation in `registry`.
pub fn register_all(registry: &FunctionRegistry) {
    registry.register_fn(TEXT_LENGTH, text_length);
    registry.register_fn(LEXICON_SENTIMENT, lexicon_sentiment);
    registry.register_fn(RANDOM_UNIFORM, random_uniform);
    registry.register_fn(CONSTANT_ZERO, |_| Ok(0.0));
}

/// `min(chars, 280) / 2.8`: longer texts score higher, up to 100.
///
/// # Errors
///
/// Fails if the item has no text field.
#[allow(clippy::cast_precision_loss)]
pub fn text_length(item: &Item) -> anyhow::Result<f64> {
    let text = item.text().ok_or_else(|| anyhow!("item has no text field"))?;
    let chars = text.chars().count().min(MAX_TEXT_CHARS);
    Ok(chars as f64 * SCORE_MAX / MAX_TEXT_CHARS as f64)
}

/// `100 * polarity(text)`, clamped to the score range.
///
/// # Errors
///
/// Fails if the item has no text field.
pub fn lexicon_sentiment(item: &Item) -> anyhow::Result<f64> {
    let text = item.text().ok_or_else(|| anyhow!("item has no text field"))?;
    Ok((SCORE_MAX * sentiment::polarity(text)).clamp(SCORE_MIN, SCORE_MAX))
}

/// Uniform integer score in `[-100, 100]`, ignoring the item.
///
/// # Errors
///
/// Never fails.
pub fn random_uniform(_item: &Item) -> anyhow::Result<f64> {
    Ok(f64::from(rand::thread_rng().gen_range(-100_i32..=100)))
}

/// "Simple Algo": text length plus sentiment, weight 1 each.
///
/// # Errors
///
/// [`Error::Registration`] if the built-ins are not registered in `registry`.
pub fn simple_algorithm(registry: &FunctionRegistry) -> Result<Algorithm, Error> {
    let length = ScoringFunction::new(
        "Tweet Length",
        "Longer tweets are more important",
        resolve(registry, TEXT_LENGTH, "Tweet Length")?,
    );
    let sentiment = ScoringFunction::new(
        "Lexicon Sentiment",
        "Positive tweets are higher",
        resolve(registry, LEXICON_SENTIMENT, "Lexicon Sentiment")?,
    );

    Algorithm::builder("Simple Algo", "Tweet Length and Sentiment")
        .named("tweet_length", 1.0, length)
        .named("lexicon_sentiment", 1.0, sentiment)
        .build()
}

/// "Random algo": one random function under three weights.
///
/// # Errors
///
/// [`Error::Registration`] if the built-ins are not registered in `registry`.
pub fn random_three_algorithm(registry: &FunctionRegistry) -> Result<Algorithm, Error> {
    let random = ScoringFunction::new(
        "Random Function",
        "Returns a random value",
        resolve(registry, RANDOM_UNIFORM, "Random Function")?,
    );

    Algorithm::builder("Random algo", "Return random score")
        .named("rand_func2", 0.2, random.clone())
        .named("rand_func3", 0.3, random.clone())
        .named("rand_func5", 0.5, random)
        .build()
}

/// Every predefined algorithm.
///
/// # Errors
///
/// [`Error::Registration`] if the built-ins are not registered in `registry`.
pub fn predefined_algorithms(registry: &FunctionRegistry) -> Result<Vec<Algorithm>, Error> {
    Ok(vec![
        simple_algorithm(registry)?,
        random_three_algorithm(registry)?,
    ])
}

fn resolve(registry: &FunctionRegistry, key: &str, function: &str) -> Result<Computation, Error> {
    registry.resolve(key).ok_or_else(|| Error::Registration {
        key: key.to_string(),
        function: function.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FunctionRegistry {
        let registry = FunctionRegistry::new();
        register_all(&registry);
        registry
    }

    #[test]
    fn text_length_caps_at_280_chars() {
        let short = Item::new().with("text", "a".repeat(140));
        let long = Item::new().with("text", "a".repeat(1000));

        assert!((text_length(&short).expect("has text") - 50.0).abs() < 1e-9);
        assert!((text_length(&long).expect("has text") - 100.0).abs() < 1e-9);
    }

    #[test]
    fn text_length_counts_chars_not_bytes() {
        let item = Item::new().with("text", "é".repeat(28));
        assert!((text_length(&item).expect("has text") - 10.0).abs() < 1e-9);
    }

    #[test]
    fn missing_text_is_an_error() {
        assert!(text_length(&Item::new()).is_err());
        assert!(lexicon_sentiment(&Item::new()).is_err());
    }

    #[test]
    fn random_uniform_stays_in_range() {
        for _ in 0..200 {
            let value = random_uniform(&Item::new()).expect("never fails");
            assert!((SCORE_MIN..=SCORE_MAX).contains(&value));
            assert!((value - value.round()).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn predefined_algorithms_need_registration() {
        let empty = FunctionRegistry::new();
        assert!(matches!(
            simple_algorithm(&empty),
            Err(Error::Registration { .. })
        ));

        let algorithms = predefined_algorithms(&registry()).expect("built-ins registered");
        let names: Vec<&str> = algorithms.iter().map(Algorithm::name).collect();
        assert_eq!(names, vec!["Simple Algo", "Random algo"]);
        assert_eq!(
            algorithms[1].weights(),
            vec![("rand_func2", 0.2), ("rand_func3", 0.3), ("rand_func5", 0.5)]
        );
    }

    #[test]
    fn constant_zero_is_registered() {
        let computation = registry().resolve(CONSTANT_ZERO).expect("registered");
        let function = ScoringFunction::new("zero", "", computation);
        assert!(function.run(&Item::new()).expect("valid").abs() < f64::EPSILON);
    }
}
