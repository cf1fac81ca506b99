//! Compute collaborator interface
//!
//! A [`Classifier`] turns a batch of texts into one class id per text, same
//! length and order as the input. Calls are synchronous and may be
//! CPU/accelerator bound; the gateway only ever invokes them from worker
//! pool threads.

use crate::error::Result;
use crate::types::ClassId;

/// Negative sentiment class
pub const NEGATIVE: ClassId = 0;
/// Neutral sentiment class
pub const NEUTRAL: ClassId = 1;
/// Positive sentiment class
pub const POSITIVE: ClassId = 2;

/// Batch classifier backing the gateway
pub trait Classifier: Send + Sync {
    /// Classify every text of `batch`, preserving order
    fn predict(&self, batch: &[String]) -> Result<Vec<ClassId>>;

    /// Backend name for logs
    fn name(&self) -> &str {
        "classifier"
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "amazing", "awesome", "best", "brilliant", "enjoy", "enjoyed", "excellent", "fantastic",
    "good", "great", "happy", "helpful", "like", "liked", "love", "loved", "nice", "perfect",
    "recommend", "wonderful",
];

const NEGATIVE_WORDS: &[&str] = &[
    "annoying", "awful", "bad", "boring", "broken", "disappointing", "dislike", "hate", "hated",
    "horrible", "poor", "sad", "terrible", "useless", "waste", "worse", "worst", "wrong",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "dont", "didnt", "isnt", "wasnt"];

/// Deterministic word-list classifier
///
/// Stand-in backend so the service runs without a model. Each text is
/// lowercased, split on whitespace, stripped of punctuation and truncated to
/// `max_tokens` tokens. A negation flips the polarity of the next token.
#[derive(Debug, Clone)]
pub struct LexiconClassifier {
    max_tokens: usize,
}

impl LexiconClassifier {
    /// Create a classifier that reads at most `max_tokens` tokens per text
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
        }
    }

    fn score(&self, text: &str) -> i32 {
        let mut score = 0;
        let mut negate = false;

        for raw in text.split_whitespace().take(self.max_tokens) {
            let token: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();

            if NEGATIONS.contains(&token.as_str()) {
                negate = true;
                continue;
            }

            let polarity = if POSITIVE_WORDS.contains(&token.as_str()) {
                1
            } else if NEGATIVE_WORDS.contains(&token.as_str()) {
                -1
            } else {
                0
            };

            if polarity != 0 {
                score += if negate { -polarity } else { polarity };
            }
            negate = false;
        }

        score
    }

    fn classify(&self, text: &str) -> ClassId {
        match self.score(text) {
            s if s > 0 => POSITIVE,
            s if s < 0 => NEGATIVE,
            _ => NEUTRAL,
        }
    }
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self::new(128)
    }
}

impl Classifier for LexiconClassifier {
    fn predict(&self, batch: &[String]) -> Result<Vec<ClassId>> {
        Ok(batch.iter().map(|text| self.classify(text)).collect())
    }

    fn name(&self) -> &str {
        "lexicon"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predict(classifier: &LexiconClassifier, texts: &[&str]) -> Vec<ClassId> {
        let batch: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        classifier.predict(&batch).unwrap()
    }

    #[test]
    fn test_polarity() {
        let classifier = LexiconClassifier::default();
        let preds = predict(
            &classifier,
            &["This movie was fantastic!", "I did not like the film.", "It is a film."],
        );
        assert_eq!(preds, vec![POSITIVE, NEGATIVE, NEUTRAL]);
    }

    #[test]
    fn test_output_aligned_with_input() {
        let classifier = LexiconClassifier::default();
        let preds = predict(&classifier, &["great", "awful", "", "meh", "love it"]);
        assert_eq!(preds.len(), 5);
        assert_eq!(preds, vec![POSITIVE, NEGATIVE, NEUTRAL, NEUTRAL, POSITIVE]);
    }

    #[test]
    fn test_truncation_ignores_tail() {
        let classifier = LexiconClassifier::new(3);
        let preds = predict(&classifier, &["one two three terrible terrible"]);
        assert_eq!(preds, vec![NEUTRAL]);
    }

    #[test]
    fn test_deterministic() {
        let classifier = LexiconClassifier::default();
        let texts = ["so good", "worst ever", "not bad at all"];
        assert_eq!(predict(&classifier, &texts), predict(&classifier, &texts));
    }
}
