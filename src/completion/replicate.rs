//! Replicate streaming predictions.
//!
//! A prediction is created with `"stream": true`; the response carries a
//! `urls.stream` endpoint that serves Server-Sent Events:
//!
//! - `output`: a text fragment
//! - `error`: generation failed
//! - `done`: generation finished (`{"reason": "canceled" | "error"}` marks an abnormal end)

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{CompletionClient, CompletionError, CompletionRequest, CompletionStream};

/// Replicate REST API root.
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

/// Model the chat talks to.
pub const DEFAULT_MODEL: &str = "snowflake/snowflake-arctic-instruct";

#[derive(Debug, Serialize)]
struct PredictionBody<'a> {
    input: &'a CompletionRequest,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    stream: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    urls: PredictionUrls,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: String,
}

#[derive(Debug, Default, Deserialize)]
struct DoneEvent {
    #[serde(default)]
    reason: Option<String>,
}

/// What a single SSE event means for the fragment stream.
#[derive(Debug, PartialEq)]
enum StreamStep {
    Fragment(String),
    Skip,
    Done,
    Fail(String),
}

fn decode_event(event: &str, data: &str) -> StreamStep {
    match event {
        "output" => StreamStep::Fragment(data.to_string()),
        "error" => StreamStep::Fail(error_detail(data)),
        "done" => {
            let done: DoneEvent = serde_json::from_str(data).unwrap_or_default();
            match done.reason.as_deref() {
                Some(reason @ ("error" | "canceled")) => {
                    StreamStep::Fail(format!("prediction ended early: {reason}"))
                }
                _ => StreamStep::Done,
            }
        }
        _ => StreamStep::Skip,
    }
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|e| e.detail)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Streaming client for the Replicate predictions API.
#[derive(Clone)]
pub struct ReplicateClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_token: String,
}

impl std::fmt::Debug for ReplicateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl ReplicateClient {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_token: api_token.into(),
        }
    }

    /// Point the client at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a different `owner/name` model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Create a streaming prediction and return its stream URL.
    async fn create_prediction(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let url = format!("{}/models/{}/predictions", self.base_url, self.model);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&PredictionBody {
                input: request,
                stream: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        let prediction: Prediction = response.json().await?;
        debug!(prediction = %prediction.id, model = %self.model, "Prediction created");
        prediction
            .urls
            .stream
            .ok_or(CompletionError::MissingStreamUrl(prediction.id))
    }
}

#[async_trait]
impl CompletionClient for ReplicateClient {
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, CompletionError> {
        let stream_url = self.create_prediction(&request).await?;

        let response = self
            .http
            .get(&stream_url)
            .bearer_auth(&self.api_token)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }
        info!(model = %self.model, "Streaming completion started");

        let events = Box::pin(response.bytes_stream().eventsource());
        let fragments = futures::stream::unfold(Some(events), |state| async move {
            let mut events = state?;
            loop {
                match events.next().await {
                    None => {
                        let err = CompletionError::Stream("stream closed before completion".to_string());
                        return Some((Err(err), None));
                    }
                    Some(Err(err)) => {
                        return Some((Err(CompletionError::Stream(err.to_string())), None));
                    }
                    Some(Ok(event)) => match decode_event(&event.event, &event.data) {
                        StreamStep::Fragment(text) => return Some((Ok(text), Some(events))),
                        StreamStep::Skip => continue,
                        StreamStep::Done => return None,
                        StreamStep::Fail(detail) => {
                            return Some((Err(CompletionError::Stream(detail)), None));
                        }
                    },
                }
            }
        });

        Ok(Box::pin(fragments))
    }
}
