//! Optional content classification for uploaded documents.
//!
//! Results are shown next to the extracted text and never enter the
//! conversation or the generation path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Hosted inference API root.
pub const DEFAULT_CLASSIFIER_URL: &str = "https://api-inference.huggingface.co";

/// Text-classification model used when none is configured.
pub const DEFAULT_CLASSIFIER_MODEL: &str = "distilbert/distilbert-base-uncased-finetuned-sst-2-english";

/// Errors from the classification service.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier returned {status}: {detail}")]
    Api { status: u16, detail: String },
}

/// One label and its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub score: f64,
}

/// Labels a piece of text.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Labels for `text`, highest score first.
    async fn classify(&self, text: &str) -> Result<Vec<Classification>, ClassifyError>;
}

/// The API answers with a flat list or a list per input.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Nested(Vec<Vec<Classification>>),
    Flat(Vec<Classification>),
}

impl ClassifyResponse {
    fn into_sorted(self) -> Vec<Classification> {
        let mut labels = match self {
            ClassifyResponse::Nested(batches) => batches.into_iter().next().unwrap_or_default(),
            ClassifyResponse::Flat(labels) => labels,
        };
        labels.sort_by(|a, b| b.score.total_cmp(&a.score));
        labels
    }
}

/// Classifier backed by the Hugging Face hosted inference API.
#[derive(Clone)]
pub struct HuggingFaceClassifier {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_token: Option<String>,
}

impl std::fmt::Debug for HuggingFaceClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceClassifier")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for HuggingFaceClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CLASSIFIER_MODEL)
    }
}

impl HuggingFaceClassifier {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_CLASSIFIER_URL.to_string(),
            model: model.into(),
            api_token: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        self.api_token = token;
        self
    }
}

#[async_trait]
impl Classifier for HuggingFaceClassifier {
    async fn classify(&self, text: &str) -> Result<Vec<Classification>, ClassifyError> {
        let url = format!("{}/models/{}", self.base_url, self.model);
        let mut request = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "inputs": text }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::Api {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }

        let labels = response.json::<ClassifyResponse>().await?.into_sorted();
        debug!(model = %self.model, labels = labels.len(), "Classified upload text");
        Ok(labels)
    }
}
