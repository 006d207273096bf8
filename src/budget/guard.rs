//! Prompt budget enforcement.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::config::BudgetConfig;
use super::tokenizer::{SharedTokenCounter, TokenizerError};
use crate::conversation::FormattedPrompt;

/// Status of budget usage for a measured prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetStatus {
    /// Under warning threshold, all good
    Ok,
    /// Approaching the ceiling (over warning threshold)
    Warning,
    /// Near the ceiling (over critical threshold)
    Critical,
    /// At or over the ceiling
    Exceeded,
}

impl BudgetStatus {
    /// Check if the prompt may be sent.
    pub fn should_continue(&self) -> bool {
        !matches!(self, BudgetStatus::Exceeded)
    }

    /// Check if the user should be told the conversation is getting long.
    pub fn should_warn(&self) -> bool {
        matches!(self, BudgetStatus::Warning | BudgetStatus::Critical)
    }
}

/// A prompt that fits under the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetPass {
    /// Measured prompt length in tokens
    pub measured: usize,
    /// Ceiling it was measured against
    pub ceiling: usize,
    /// How close the prompt is to the ceiling
    pub status: BudgetStatus,
}

impl BudgetPass {
    /// Tokens left before the ceiling is reached.
    pub fn remaining(&self) -> usize {
        self.ceiling.saturating_sub(self.measured)
    }

    /// Fraction of the ceiling used, in `0.0..1.0`.
    pub fn usage_fraction(&self) -> f64 {
        self.measured as f64 / self.ceiling as f64
    }
}

/// A prompt at or over the ceiling. Nothing was sent.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Conversation length too long. Please keep it under {ceiling} tokens.")]
pub struct BudgetExceeded {
    /// Measured prompt length in tokens
    pub measured: usize,
    /// Ceiling the prompt reached
    pub ceiling: usize,
}

/// Errors from checking a prompt against the budget.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error(transparent)]
    Exceeded(#[from] BudgetExceeded),

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
}

/// Measures formatted prompts and gates them against a token ceiling.
#[derive(Clone)]
pub struct BudgetGuard {
    config: BudgetConfig,
    counter: SharedTokenCounter,
}

impl std::fmt::Debug for BudgetGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetGuard")
            .field("config", &self.config)
            .field("tokenizer", &self.counter.name())
            .finish()
    }
}

impl BudgetGuard {
    pub fn new(config: BudgetConfig, counter: SharedTokenCounter) -> Self {
        Self { config, counter }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub fn ceiling(&self) -> usize {
        self.config.ceiling
    }

    /// Token length of a prompt.
    pub fn measure(&self, prompt: &FormattedPrompt) -> Result<usize, TokenizerError> {
        self.counter.count_tokens(prompt.as_str())
    }

    /// Check a prompt against the configured ceiling.
    pub fn check(&self, prompt: &FormattedPrompt) -> Result<BudgetPass, GuardError> {
        self.check_with_ceiling(prompt, self.config.ceiling)
    }

    /// Check a prompt against an explicit ceiling.
    pub fn check_with_ceiling(
        &self,
        prompt: &FormattedPrompt,
        ceiling: usize,
    ) -> Result<BudgetPass, GuardError> {
        let measured = self.measure(prompt)?;
        match self.decide(measured, ceiling) {
            Ok(pass) => {
                debug!(
                    measured,
                    ceiling,
                    status = ?pass.status,
                    "Prompt within budget"
                );
                Ok(pass)
            }
            Err(exceeded) => {
                warn!(measured, ceiling, "Prompt over budget, turn rejected");
                Err(exceeded.into())
            }
        }
    }

    /// Apply the decision rule to a measured length.
    ///
    /// A prompt measuring exactly `ceiling` tokens is rejected.
    pub fn decide(&self, measured: usize, ceiling: usize) -> Result<BudgetPass, BudgetExceeded> {
        if measured >= ceiling {
            return Err(BudgetExceeded { measured, ceiling });
        }
        Ok(BudgetPass {
            measured,
            ceiling,
            status: self.compute_status(measured as f64 / ceiling as f64),
        })
    }

    /// Compute status from usage percentage.
    fn compute_status(&self, usage: f64) -> BudgetStatus {
        if usage >= 1.0 {
            BudgetStatus::Exceeded
        } else if usage >= self.config.critical_threshold {
            BudgetStatus::Critical
        } else if usage >= self.config.warning_threshold {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::tokenizer::tests::WhitespaceCounter;
    use crate::conversation::{ConversationHistory, ConversationTurn, TurnFormatter};
    use std::sync::Arc;

    fn guard(ceiling: usize) -> BudgetGuard {
        BudgetGuard::new(
            BudgetConfig::new().with_ceiling(ceiling),
            Arc::new(WhitespaceCounter),
        )
    }

    /// History whose formatted prompt is exactly `tokens` whitespace tokens.
    fn prompt_of(tokens: usize) -> FormattedPrompt {
        // "assistant\nhi\nuser\n<words>\nassistant\n" = 4 fixed tokens
        let mut history = ConversationHistory::new("hi");
        history.push(ConversationTurn::user(vec!["w"; tokens - 4].join(" ")));
        TurnFormatter::format(&history)
    }

    #[test]
    fn test_prompt_at_ceiling_is_rejected() {
        let guard = guard(3072);
        let prompt = prompt_of(3072);
        assert_eq!(guard.measure(&prompt).unwrap(), 3072);

        match guard.check(&prompt) {
            Err(GuardError::Exceeded(exceeded)) => {
                assert_eq!(exceeded.measured, 3072);
                assert_eq!(exceeded.ceiling, 3072);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_prompt_below_ceiling_passes() {
        let guard = guard(3072);
        let pass = guard.check(&prompt_of(3071)).unwrap();
        assert_eq!(pass.measured, 3071);
        assert_eq!(pass.remaining(), 1);
        assert!(pass.usage_fraction() < 1.0);
        assert!(pass.usage_fraction() > 0.99);
        assert_eq!(pass.status, BudgetStatus::Critical);
    }

    #[test]
    fn test_prompt_over_ceiling_is_rejected() {
        assert!(guard(100).check(&prompt_of(250)).is_err());
    }

    #[test]
    fn test_decide_boundary() {
        let guard = guard(10);
        assert!(guard.decide(9, 10).is_ok());
        assert_eq!(
            guard.decide(10, 10).unwrap_err(),
            BudgetExceeded {
                measured: 10,
                ceiling: 10
            }
        );
    }

    #[test]
    fn test_explicit_ceiling_overrides_config() {
        let guard = guard(3072);
        let prompt = prompt_of(20);
        assert!(guard.check(&prompt).is_ok());
        assert!(guard.check_with_ceiling(&prompt, 20).is_err());
        assert!(guard.check_with_ceiling(&prompt, 21).is_ok());
    }

    #[test]
    fn test_status_bands() {
        let guard = guard(100);
        assert_eq!(guard.decide(10, 100).unwrap().status, BudgetStatus::Ok);
        assert_eq!(guard.decide(70, 100).unwrap().status, BudgetStatus::Warning);
        assert_eq!(guard.decide(90, 100).unwrap().status, BudgetStatus::Critical);
        assert!(guard.decide(100, 100).is_err());
    }

    #[test]
    fn test_status_helpers() {
        assert!(BudgetStatus::Ok.should_continue());
        assert!(!BudgetStatus::Ok.should_warn());
        assert!(BudgetStatus::Warning.should_warn());
        assert!(BudgetStatus::Critical.should_warn());
        assert!(!BudgetStatus::Exceeded.should_continue());
    }

    #[test]
    fn test_exceeded_message_names_ceiling() {
        let err = BudgetExceeded {
            measured: 4000,
            ceiling: 3072,
        };
        assert_eq!(
            err.to_string(),
            "Conversation length too long. Please keep it under 3072 tokens."
        );
    }
}
