//! Application configuration.
//!
//! Values are layered, later sources winning:
//!
//! 1. built-in defaults
//! 2. `arcticchat.toml` in the working directory, or an explicit `--config` file
//! 3. `ARCTICCHAT_*` environment variables, `__` separating nested keys
//!    (e.g. `ARCTICCHAT_SAMPLING__TEMPERATURE=0.7`)
//!
//! The Replicate credential may also come from `REPLICATE_API_TOKEN`.

use std::collections::HashMap;
use std::path::Path;

use ::config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::{BudgetConfig, TokenizerSource};
use crate::classify::{DEFAULT_CLASSIFIER_MODEL, DEFAULT_CLASSIFIER_URL};
use crate::completion::{SamplingParams, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::conversation::DEFAULT_GREETING;
use crate::extract::{DEFAULT_OCR_BINARY, DEFAULT_OCR_LANGUAGE};
use crate::session::SessionConfig;
use crate::timeout::{TimeoutConfig, TimeoutSettings};

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "arcticchat.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "ARCTICCHAT";

/// Conventional variable holding the Replicate credential.
pub const TOKEN_ENV_VAR: &str = "REPLICATE_API_TOKEN";

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A value is out of range.
    #[error("invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// No Replicate credential was supplied.
    #[error("Please enter your Replicate API token (set {TOKEN_ENV_VAR}).")]
    MissingCredential,
}

/// Replicate endpoint and credential.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicateSettings {
    /// Opaque bearer token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// `owner/name` of the model
    pub model: String,
    /// API root
    pub base_url: String,
}

impl Default for ReplicateSettings {
    fn default() -> Self {
        Self {
            api_token: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl std::fmt::Debug for ReplicateSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateSettings")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// OCR engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub binary: String,
    pub language: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            binary: DEFAULT_OCR_BINARY.to_string(),
            language: DEFAULT_OCR_LANGUAGE.to_string(),
        }
    }
}

/// Optional upload classifier.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub enabled: bool,
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            base_url: DEFAULT_CLASSIFIER_URL.to_string(),
            api_token: None,
        }
    }
}

impl std::fmt::Debug for ClassifierSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierSettings")
            .field("enabled", &self.enabled)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub replicate: ReplicateSettings,
    pub sampling: SamplingParams,
    pub budget: BudgetConfig,
    pub tokenizer: TokenizerSource,
    pub timeouts: TimeoutSettings,
    pub ocr: OcrSettings,
    pub classifier: ClassifierSettings,
    /// First assistant turn of every conversation
    pub greeting: String,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            replicate: ReplicateSettings::default(),
            sampling: SamplingParams::default(),
            budget: BudgetConfig::default(),
            tokenizer: TokenizerSource::default(),
            timeouts: TimeoutSettings::default(),
            ocr: OcrSettings::default(),
            classifier: ClassifierSettings::default(),
            greeting: DEFAULT_GREETING.to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from the config file (explicit or default) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(path, None)
    }

    /// Load with an explicit environment map instead of the process environment.
    pub fn load_from(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::new(CONFIG_FILE_NAME, FileFormat::Toml).required(false),
        };

        let token_fallback = match &env {
            Some(vars) => vars.get(TOKEN_ENV_VAR).cloned(),
            None => std::env::var(TOKEN_ENV_VAR).ok(),
        };

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env);

        let mut config: AppConfig = ::config::Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        if config.replicate.api_token.is_none() {
            config.replicate.api_token = token_fallback;
        }
        config.replicate.api_token = config
            .replicate
            .api_token
            .take()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        config.validate()?;
        Ok(config)
    }

    /// Check ranges of every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sampling.validate()?;
        self.budget.validate()?;
        if !self.replicate.model.contains('/') {
            return Err(ConfigError::Invalid {
                field: "replicate.model",
                reason: format!("`{}` is not an owner/name pair", self.replicate.model),
            });
        }
        for (field, secs) in [
            ("timeouts.stream_start_secs", self.timeouts.stream_start_secs),
            ("timeouts.fragment_idle_secs", self.timeouts.fragment_idle_secs),
            ("timeouts.turn_secs", self.timeouts.turn_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least one second".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The credential, or an error telling the user to provide one.
    pub fn require_api_token(&self) -> Result<&str, ConfigError> {
        self.replicate
            .api_token
            .as_deref()
            .ok_or(ConfigError::MissingCredential)
    }

    /// A notice for the user when the credential is absent or oddly shaped.
    ///
    /// Replicate tokens start with `r8_` and are 40 characters long; other
    /// shapes are allowed but flagged.
    pub fn credential_warning(&self) -> Option<&'static str> {
        match self.replicate.api_token.as_deref() {
            None => Some("Please enter your Replicate API token."),
            Some(token) if !(token.starts_with("r8_") && token.len() == 40) => {
                Some("The Replicate API token does not look like an r8_ token of 40 characters.")
            }
            Some(_) => None,
        }
    }

    pub fn timeout_config(&self) -> TimeoutConfig {
        self.timeouts.into()
    }

    /// Per-session settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_sampling(self.sampling)
            .with_timeouts(self.timeout_config())
            .with_overflow_policy(self.budget.overflow_policy)
            .with_greeting(self.greeting.clone())
    }

    /// Copy with every secret replaced, safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |token: &mut Option<String>| {
            if token.is_some() {
                *token = Some("<redacted>".to_string());
            }
        };
        mask(&mut copy.replicate.api_token);
        mask(&mut copy.classifier.api_token);
        copy
    }
}
