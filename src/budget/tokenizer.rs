//! Subword tokenizer loading and token counting.
//!
//! The vocabulary is expensive to load, so [`TokenizerCell`] builds it at
//! most once and hands out shared handles afterwards.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::estimator::TokenEstimator;

/// Pretrained vocabulary used when nothing else is configured.
pub const DEFAULT_TOKENIZER: &str = "huggyllama/llama-7b";

/// Errors from loading a tokenizer or encoding text with it.
#[derive(Error, Debug)]
pub enum TokenizerError {
    /// The vocabulary could not be loaded.
    #[error("failed to load tokenizer from {source_name}: {message}")]
    Load {
        source_name: String,
        message: String,
    },

    /// Encoding a prompt failed.
    #[error("failed to tokenize prompt: {0}")]
    Encode(String),
}

/// Counts subword tokens in a piece of text.
pub trait TokenCounter: Send + Sync {
    /// Number of tokens `text` encodes to, without special tokens.
    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError>;

    /// Short human-readable name of the vocabulary.
    fn name(&self) -> &str;
}

/// Arc-wrapped token counter shared by every session in the process.
pub type SharedTokenCounter = Arc<dyn TokenCounter>;

/// Where the tokenizer vocabulary comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenizerSource {
    /// A named vocabulary fetched from the Hugging Face hub
    Pretrained { identifier: String },
    /// A local `tokenizer.json`
    File { path: PathBuf },
    /// Character/word heuristic, for offline use only
    Estimate,
}

impl Default for TokenizerSource {
    fn default() -> Self {
        Self::Pretrained {
            identifier: DEFAULT_TOKENIZER.to_string(),
        }
    }
}

impl TokenizerSource {
    /// Interpret a command-line value: `estimate`, an existing file, or a hub identifier.
    pub fn parse_arg(value: &str) -> Self {
        if value.eq_ignore_ascii_case("estimate") {
            return Self::Estimate;
        }
        let path = PathBuf::from(value);
        if path.is_file() {
            Self::File { path }
        } else {
            Self::Pretrained {
                identifier: value.to_string(),
            }
        }
    }

    /// Build the counter this source describes. Blocking; may hit the network.
    pub fn load(&self) -> Result<SharedTokenCounter, TokenizerError> {
        match self {
            Self::Pretrained { identifier } => {
                Ok(Arc::new(PretrainedTokenizer::from_pretrained(identifier)?))
            }
            Self::File { path } => Ok(Arc::new(PretrainedTokenizer::from_file(path)?)),
            Self::Estimate => {
                warn!("Using heuristic token estimation; budget checks are approximate");
                Ok(Arc::new(TokenEstimator::default()))
            }
        }
    }
}

impl std::fmt::Display for TokenizerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretrained { identifier } => write!(f, "{identifier}"),
            Self::File { path } => write!(f, "{}", path.display()),
            Self::Estimate => f.write_str("estimate"),
        }
    }
}

/// Token counter backed by a Hugging Face `tokenizers` vocabulary.
pub struct PretrainedTokenizer {
    inner: tokenizers::Tokenizer,
    name: String,
}

impl PretrainedTokenizer {
    /// Download (or read from the local hub cache) a named vocabulary.
    pub fn from_pretrained(identifier: &str) -> Result<Self, TokenizerError> {
        let inner = tokenizers::Tokenizer::from_pretrained(identifier, None).map_err(|e| {
            TokenizerError::Load {
                source_name: identifier.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            inner,
            name: identifier.to_string(),
        })
    }

    /// Read a serialized `tokenizer.json`.
    pub fn from_file(path: &std::path::Path) -> Result<Self, TokenizerError> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| TokenizerError::Load {
            source_name: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            inner,
            name: path.display().to_string(),
        })
    }
}

impl TokenCounter for PretrainedTokenizer {
    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
        self.inner
            .encode(text, false)
            .map(|encoding| encoding.len())
            .map_err(|e| TokenizerError::Encode(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Builds the process-wide tokenizer once and shares it afterwards.
pub struct TokenizerCell {
    source: TokenizerSource,
    cell: OnceCell<SharedTokenCounter>,
    loads: AtomicUsize,
}

impl TokenizerCell {
    pub fn new(source: TokenizerSource) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn source(&self) -> &TokenizerSource {
        &self.source
    }

    /// Get the tokenizer, loading it from the configured source on first use.
    pub fn get(&self) -> Result<SharedTokenCounter, TokenizerError> {
        self.get_with(TokenizerSource::load)
    }

    /// Get the tokenizer, using `loader` if it has not been built yet.
    ///
    /// A failed load leaves the cell empty so a later call can retry.
    pub fn get_with<F>(&self, loader: F) -> Result<SharedTokenCounter, TokenizerError>
    where
        F: FnOnce(&TokenizerSource) -> Result<SharedTokenCounter, TokenizerError>,
    {
        self.cell
            .get_or_try_init(|| {
                self.loads.fetch_add(1, Ordering::SeqCst);
                let started = Instant::now();
                let counter = loader(&self.source)?;
                info!(
                    tokenizer = %self.source,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tokenizer loaded"
                );
                Ok(counter)
            })
            .map(Arc::clone)
    }

    /// Number of times a load has actually been attempted.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}
