//! Streaming completion interface.
//!
//! A [`CompletionClient`] takes a formatted prompt plus sampling parameters
//! and returns a lazy, finite stream of text fragments. The stream cannot
//! be restarted; callers accumulate fragments and decide what to commit.

mod replicate;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::conversation::FormattedPrompt;

pub use replicate::{ReplicateClient, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Pass-through template: the prompt is sent to the model verbatim.
pub const PROMPT_TEMPLATE: &str = "{prompt}";

/// Accepted temperature range (inclusive).
pub const TEMPERATURE_RANGE: (f64, f64) = (0.01, 5.0);

/// Accepted top_p range (inclusive).
pub const TOP_P_RANGE: (f64, f64) = (0.01, 1.0);

/// Errors raised before or during a streamed completion.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// Transport failure talking to the inference API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("inference API returned {status}: {detail}")]
    Api { status: u16, detail: String },

    /// The prediction was created but no stream URL came back.
    #[error("prediction {0} has no stream URL")]
    MissingStreamUrl(String),

    /// The stream broke or reported an error mid-generation.
    #[error("stream failed: {0}")]
    Stream(String),
}

/// Sampling parameters forwarded to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
        }
    }
}

impl SamplingParams {
    /// Create validated sampling parameters.
    pub fn new(temperature: f64, top_p: f64) -> Result<Self, ConfigError> {
        let params = Self { temperature, top_p };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("sampling.temperature", self.temperature, TEMPERATURE_RANGE)?;
        check_range("sampling.top_p", self.top_p, TOP_P_RANGE)
    }
}

fn check_range(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is outside {min}..={max}"),
        });
    }
    Ok(())
}

/// Input for a single streamed completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub prompt_template: String,
    pub temperature: f64,
    pub top_p: f64,
}

impl CompletionRequest {
    /// Build a request carrying the prompt unmodified.
    pub fn new(prompt: &FormattedPrompt, params: SamplingParams) -> Self {
        Self {
            prompt: prompt.as_str().to_string(),
            prompt_template: PROMPT_TEMPLATE.to_string(),
            temperature: params.temperature,
            top_p: params.top_p,
        }
    }
}

/// Lazily produced text fragments of one generation.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// Remote model that streams generated text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Start a generation and return its fragment stream.
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, CompletionError>;
}
