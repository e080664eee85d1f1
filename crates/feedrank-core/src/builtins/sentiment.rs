//! Lexicon-based polarity.
//!
//! Polarity is the mean score of the lexicon words found in the text, in
//! `[-1, 1]`. A negator ("not", "never", "no", "n't" contractions) halves and
//! flips the score of the next lexicon word. Text with no lexicon words is
//! neutral.

const LEXICON: &[(&str, f64)] = &[
    ("amazing", 0.6),
    ("awesome", 1.0),
    ("awful", -1.0),
    ("bad", -0.7),
    ("beautiful", 0.85),
    ("best", 1.0),
    ("boring", -1.0),
    ("brilliant", 0.9),
    ("broken", -0.4),
    ("cool", 0.35),
    ("disappointing", -0.6),
    ("excellent", 1.0),
    ("fantastic", 0.4),
    ("fun", 0.3),
    ("good", 0.7),
    ("great", 0.8),
    ("happy", 0.8),
    ("hate", -0.8),
    ("horrible", -1.0),
    ("interesting", 0.5),
    ("love", 0.5),
    ("nice", 0.6),
    ("perfect", 1.0),
    ("poor", -0.4),
    ("sad", -0.5),
    ("stupid", -0.8),
    ("terrible", -1.0),
    ("ugly", -0.7),
    ("useful", 0.3),
    ("wonderful", 1.0),
    ("worst", -1.0),
    ("wrong", -0.5),
];

const NEGATORS: &[&str] = &["not", "never", "no", "nor", "nothing"];
const NEGATION_FACTOR: f64 = -0.5;

/// Polarity of `text` in `[-1, 1]`.
#[must_use]
pub fn polarity(text: &str) -> f64 {
    let mut total = 0.0;
    let mut matched = 0_u32;
    let mut negate_next = false;

    for token in tokens(text) {
        if is_negator(&token) {
            negate_next = true;
            continue;
        }

        if let Some(score) = lookup(&token) {
            total += if negate_next {
                score * NEGATION_FACTOR
            } else {
                score
            };
            matched += 1;
            negate_next = false;
        }
    }

    if matched == 0 {
        return 0.0;
    }

    (total / f64::from(matched)).clamp(-1.0, 1.0)
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn is_negator(token: &str) -> bool {
    NEGATORS.contains(&token) || token.ends_with("n't")
}

fn lookup(token: &str) -> Option<f64> {
    LEXICON
        .binary_search_by(|(word, _)| (*word).cmp(token))
        .ok()
        .map(|index| LEXICON[index].1)
}
