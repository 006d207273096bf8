//! Food-label chat assistant.
//!
//! Conversation turns are formatted into a single role-tagged prompt,
//! measured against a token ceiling, and only then streamed to a hosted
//! model. Uploaded PDFs and label photos are turned into text first.

pub mod budget;
pub mod classify;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod error;
pub mod extract;
pub mod logging;
pub mod session;
pub mod timeout;

pub use budget::{BudgetConfig, BudgetExceeded, BudgetGuard, BudgetPass, TokenizerCell};
pub use completion::{CompletionClient, ReplicateClient, SamplingParams};
pub use config::AppConfig;
pub use conversation::{ConversationHistory, ConversationTurn, FormattedPrompt, Role, TurnFormatter};
pub use error::{ChatError, ChatResult};
pub use session::{ChatSession, SessionConfig, TurnEvent};
