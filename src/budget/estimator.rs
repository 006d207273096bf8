//! Heuristic token estimation.
//!
//! Used only when no vocabulary can be loaded (offline runs, CI). Character
//! and word counts track the model's real context usage poorly, so the
//! estimate is padded with a safety margin.

use serde::{Deserialize, Serialize};

use super::tokenizer::{TokenCounter, TokenizerError};

/// Token estimation strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimationMethod {
    /// Simple character-based estimation (3.5 chars ≈ 1 token)
    CharacterBased,
    /// Word-based estimation (1 word ≈ 1.3 tokens)
    WordBased,
    /// Higher of the two, with a safety margin
    #[default]
    Conservative,
}

/// Token estimator for counting tokens from text.
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    method: EstimationMethod,
    /// Multiplier applied to the raw estimate
    safety_margin: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            method: EstimationMethod::Conservative,
            safety_margin: 1.2, // 20% safety margin
        }
    }
}

impl TokenEstimator {
    /// Create a new token estimator with the specified method.
    pub fn new(method: EstimationMethod) -> Self {
        let safety_margin = match method {
            EstimationMethod::CharacterBased => 1.0,
            EstimationMethod::WordBased => 1.0,
            EstimationMethod::Conservative => 1.2,
        };
        Self {
            method,
            safety_margin,
        }
    }

    /// Create a conservative estimator with custom safety margin.
    pub fn conservative(safety_margin: f64) -> Self {
        Self {
            method: EstimationMethod::Conservative,
            safety_margin: safety_margin.max(1.0),
        }
    }

    /// Estimate tokens from text.
    pub fn estimate(&self, text: &str) -> usize {
        let base_estimate = match self.method {
            EstimationMethod::CharacterBased => Self::estimate_by_chars(text),
            EstimationMethod::WordBased => Self::estimate_by_words(text),
            EstimationMethod::Conservative => {
                Self::estimate_by_chars(text).max(Self::estimate_by_words(text))
            }
        };

        (base_estimate as f64 * self.safety_margin).ceil() as usize
    }

    fn estimate_by_chars(text: &str) -> usize {
        let chars = text.chars().count();
        (chars as f64 / 3.5).ceil() as usize
    }

    fn estimate_by_words(text: &str) -> usize {
        let words = text.split_whitespace().count();
        (words as f64 * 1.3).ceil() as usize
    }
}

impl TokenCounter for TokenEstimator {
    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(self.estimate(text))
    }

    fn name(&self) -> &str {
        "estimate"
    }
}
