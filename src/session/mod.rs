//! Chat session: one conversation and its per-turn pass.
//!
//! A session owns its [`ConversationHistory`]. Collaborators (the budget
//! guard, the completion client, extractors) are passed in per call, so
//! several sessions can share one tokenizer and one HTTP client.
//!
//! A turn pass formats the history, gates it on the token budget and, when
//! admitted, streams the reply. The assistant turn is appended only when the
//! stream finishes normally; a failed, timed-out or cancelled stream leaves
//! the history exactly as it was.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::{BudgetExceeded, BudgetGuard, BudgetPass, GuardError, OverflowPolicy};
use crate::completion::{CompletionClient, CompletionRequest, SamplingParams};
use crate::conversation::{
    ConversationHistory, ConversationTurn, Role, TurnFormatter, DEFAULT_GREETING,
};
use crate::error::{ChatError, ChatResult};
use crate::extract::{Extractor, Upload};
use crate::timeout::TimeoutConfig;

/// Per-session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub sampling: SamplingParams,
    pub timeouts: TimeoutConfig,
    /// What happens to the history when a prompt is over budget
    pub overflow_policy: OverflowPolicy,
    pub greeting: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingParams::default(),
            timeouts: TimeoutConfig::default(),
            overflow_policy: OverflowPolicy::default(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }
}

/// Progress of a turn pass, for whoever renders it.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// The prompt passed the budget check and is being sent.
    Admitted(BudgetPass),
    /// A piece of the reply arrived.
    Fragment(String),
    /// The prompt reached the ceiling; nothing was sent.
    BudgetExceeded(BudgetExceeded),
    /// The reply finished and was appended to the history.
    Completed(ConversationTurn),
    /// The reply was abandoned and its partial text dropped.
    Discarded {
        reason: &'static str,
        partial_chars: usize,
    },
}

/// A single conversation.
#[derive(Debug, Clone)]
pub struct ChatSession {
    config: SessionConfig,
    history: ConversationHistory,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl ChatSession {
    /// Start a conversation seeded with the configured greeting.
    pub fn new(config: SessionConfig) -> Self {
        let history = ConversationHistory::new(config.greeting.clone());
        Self { config, history }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Append typed user text.
    ///
    /// Content is stored verbatim; only all-blank input is refused.
    pub fn submit_user(&mut self, text: impl Into<String>) -> ChatResult<()> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }
        self.history.push(ConversationTurn::user(text));
        Ok(())
    }

    /// Extract text from an upload and append it as a user turn.
    ///
    /// On failure the conversation does not advance.
    pub async fn submit_upload(
        &mut self,
        extractor: &dyn Extractor,
        upload: &Upload,
    ) -> ChatResult<String> {
        let text = match extractor.extract(upload).await {
            Ok(text) => text,
            Err(err) => {
                warn!(file = %upload.file_name, error = %err, "Upload extraction failed");
                return Err(err.into());
            }
        };
        info!(file = %upload.file_name, chars = text.len(), "Upload added to conversation");
        self.history.push(ConversationTurn::user(text.clone()));
        Ok(text)
    }

    /// True when the last turn is the user's and a reply is owed.
    pub fn needs_response(&self) -> bool {
        self.history.last().role() == Role::User
    }

    /// Clear the chat back to the greeting.
    pub fn reset(&mut self) {
        self.history.reset();
        info!("Conversation cleared");
    }

    /// Run one turn pass.
    ///
    /// Returns `Ok(None)` when no reply is owed, `Ok(Some(turn))` with the
    /// committed assistant turn, or the error that ended the pass.
    pub async fn respond(
        &mut self,
        guard: &BudgetGuard,
        client: &dyn CompletionClient,
        cancel: &CancellationToken,
        events: Option<&mpsc::UnboundedSender<TurnEvent>>,
    ) -> ChatResult<Option<ConversationTurn>> {
        if !self.needs_response() {
            debug!("Last turn is the assistant's, nothing to send");
            return Ok(None);
        }

        let prompt = TurnFormatter::format(&self.history);
        let pass = match guard.check(&prompt) {
            Ok(pass) => pass,
            Err(GuardError::Exceeded(exceeded)) => {
                emit(events, TurnEvent::BudgetExceeded(exceeded));
                if self.config.overflow_policy == OverflowPolicy::Reset {
                    self.reset();
                }
                return Err(exceeded.into());
            }
            Err(err) => return Err(err.into()),
        };
        emit(events, TurnEvent::Admitted(pass));

        let request = CompletionRequest::new(&prompt, self.config.sampling);
        let timeouts = self.config.timeouts;
        let mut reply = String::new();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            result = tokio::time::timeout(
                timeouts.turn_timeout,
                stream_reply(client, request, &timeouts, events, &mut reply),
            ) => result.unwrap_or(Err(ChatError::Timeout {
                stage: "the complete reply",
                after: timeouts.turn_timeout,
            })),
        };

        match outcome {
            Ok(()) => {
                let turn = ConversationTurn::assistant(reply);
                self.history.push(turn.clone());
                info!(chars = turn.content().len(), "Assistant turn committed");
                emit(events, TurnEvent::Completed(turn.clone()));
                Ok(Some(turn))
            }
            Err(err) => {
                warn!(
                    category = err.category(),
                    partial_chars = reply.len(),
                    error = %err,
                    "Turn abandoned, partial reply discarded"
                );
                emit(
                    events,
                    TurnEvent::Discarded {
                        reason: err.category(),
                        partial_chars: reply.len(),
                    },
                );
                Err(err)
            }
        }
    }
}

/// Open the stream and drain it into `reply`, bounding every wait.
async fn stream_reply(
    client: &dyn CompletionClient,
    request: CompletionRequest,
    timeouts: &TimeoutConfig,
    events: Option<&mpsc::UnboundedSender<TurnEvent>>,
    reply: &mut String,
) -> ChatResult<()> {
    let mut stream = bounded(
        timeouts.stream_start_timeout,
        "the stream to start",
        client.stream(request),
    )
    .await??;
    debug!("Completion stream opened");

    while let Some(fragment) = bounded(
        timeouts.fragment_idle_timeout,
        "the next fragment",
        stream.next(),
    )
    .await?
    {
        let fragment = fragment?;
        reply.push_str(&fragment);
        emit(events, TurnEvent::Fragment(fragment));
    }

    debug!(chars = reply.len(), "Completion stream finished");
    Ok(())
}

async fn bounded<F: std::future::Future>(
    after: Duration,
    stage: &'static str,
    future: F,
) -> ChatResult<F::Output> {
    tokio::time::timeout(after, future)
        .await
        .map_err(|_| ChatError::Timeout { stage, after })
}

/// Sends without waiting on the reader.
fn emit(events: Option<&mpsc::UnboundedSender<TurnEvent>>, event: TurnEvent) {
    if let Some(sender) = events {
        // A dropped receiver only means nobody is watching.
        let _ = sender.send(event);
    }
}
