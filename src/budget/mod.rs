//! Token budget enforcement for formatted prompts.
//!
//! Every generation request is measured with a real subword tokenizer and
//! rejected when it reaches the configured ceiling, before anything is sent
//! to the remote model.
//!
//! # Overview
//!
//! - **BudgetConfig**: the ceiling (3072 by default), status thresholds and overflow policy
//! - **TokenCounter**: measures text; backed by a pretrained vocabulary or, offline, the estimator
//! - **TokenizerCell**: loads the vocabulary once per process
//! - **BudgetGuard**: measures a prompt and returns `BudgetPass` or `BudgetExceeded`
//!
//! # Example
//!
//! ```ignore
//! use arcticchat::budget::{BudgetConfig, BudgetGuard, TokenizerCell, TokenizerSource};
//!
//! let tokenizers = TokenizerCell::new(TokenizerSource::default());
//! let guard = BudgetGuard::new(BudgetConfig::default(), tokenizers.get()?);
//!
//! match guard.check(&prompt) {
//!     Ok(pass) => println!("{} tokens left", pass.remaining()),
//!     Err(err) => eprintln!("{err}"),
//! }
//! ```

mod config;
mod estimator;
mod guard;
pub(crate) mod tokenizer;

pub use config::{BudgetConfig, OverflowPolicy, DEFAULT_CEILING};
pub use estimator::{EstimationMethod, TokenEstimator};
pub use guard::{BudgetExceeded, BudgetGuard, BudgetPass, BudgetStatus, GuardError};
pub use tokenizer::{
    PretrainedTokenizer, SharedTokenCounter, TokenCounter, TokenizerCell, TokenizerError,
    TokenizerSource, DEFAULT_TOKENIZER,
};
