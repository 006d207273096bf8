//! Conversation turns and prompt assembly.
//!
//! A [`ConversationHistory`] is the ordered list of turns owned by a chat
//! session. [`TurnFormatter`] flattens a history snapshot into the single
//! role-tagged prompt string the hosted model expects.
//!
//! # Example
//!
//! ```
//! use arcticchat::conversation::{ConversationHistory, ConversationTurn, TurnFormatter};
//!
//! let mut history = ConversationHistory::new("Hi, ask me anything.");
//! history.push(ConversationTurn::user("Does this contain aspartame?"));
//!
//! let prompt = TurnFormatter::format(&history);
//! assert_eq!(
//!     prompt.as_str(),
//!     "assistant\nHi, ask me anything.\nuser\nDoes this contain aspartame?\nassistant\n"
//! );
//! ```

mod format;
mod history;

pub use format::{FormattedPrompt, TurnFormatter, ASSISTANT_TAG, USER_TAG};
pub use history::{ConversationHistory, ConversationTurn, Role, DEFAULT_GREETING};
