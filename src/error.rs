//! Error taxonomy for a chat turn.
//!
//! Apart from configuration errors, every variant ends only the current turn:
//! it is reported to the user and the session carries on, either by
//! re-sending or by clearing the chat.

use std::time::Duration;

use thiserror::Error;

use crate::budget::{BudgetExceeded, GuardError, TokenizerError};
use crate::classify::ClassifyError;
use crate::completion::CompletionError;
use crate::config::ConfigError;
use crate::extract::ExtractionError;

/// Errors surfaced by a chat session.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The formatted prompt reached the token ceiling; nothing was sent.
    #[error(transparent)]
    BudgetExceeded(#[from] BudgetExceeded),

    /// Text could not be extracted from an upload.
    #[error("Could not read the upload: {0}")]
    Extraction(#[from] ExtractionError),

    /// The remote completion failed before or during streaming.
    #[error("The model stream failed: {0}")]
    RemoteStream(#[from] CompletionError),

    /// The tokenizer could not measure the prompt.
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),

    /// The classifier could not label the upload.
    #[error("Classification failed: {0}")]
    Classify(#[from] ClassifyError),

    /// A bounded wait on the remote model ran out.
    #[error("Timed out after {after:?} waiting for {stage}")]
    Timeout { stage: &'static str, after: Duration },

    /// The turn was abandoned by the user.
    #[error("Response cancelled")]
    Cancelled,

    /// Blank input was submitted.
    #[error("Message is empty")]
    EmptyInput,

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<GuardError> for ChatError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Exceeded(exceeded) => ChatError::BudgetExceeded(exceeded),
            GuardError::Tokenizer(err) => ChatError::Tokenizer(err),
        }
    }
}

impl ChatError {
    /// Whether the session can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ChatError::Config(_))
    }

    /// Whether the user should be offered to clear the chat.
    pub fn offers_reset(&self) -> bool {
        matches!(self, ChatError::BudgetExceeded(_) | ChatError::Timeout { .. })
    }

    /// Short stable label for logs.
    pub fn category(&self) -> &'static str {
        match self {
            ChatError::BudgetExceeded(_) => "budget_exceeded",
            ChatError::Extraction(_) => "extraction_failure",
            ChatError::RemoteStream(_) => "remote_stream_failure",
            ChatError::Tokenizer(_) => "tokenizer",
            ChatError::Classify(_) => "classify",
            ChatError::Timeout { .. } => "timeout",
            ChatError::Cancelled => "cancelled",
            ChatError::EmptyInput => "empty_input",
            ChatError::Config(_) => "config",
        }
    }
}

/// Result type for chat session operations.
pub type ChatResult<T> = Result<T, ChatError>;
