//! Timeout configuration for streamed turns.
//!
//! The remote completion is the only place a turn can stall, so every wait on
//! it is bounded: starting the stream, each gap between fragments, and the
//! turn as a whole. Running out of any of these fails the turn without
//! committing partial text.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for timeout behavior during a streamed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Maximum time to create the prediction and open its stream.
    /// Default: 30 seconds
    pub stream_start_timeout: Duration,

    /// Maximum silence between two fragments.
    /// Default: 60 seconds
    pub fragment_idle_timeout: Duration,

    /// Maximum time for the whole turn, from request to last fragment.
    /// Default: 300 seconds (5 minutes)
    pub turn_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stream_start_timeout: Duration::from_secs(30),
            fragment_idle_timeout: Duration::from_secs(60),
            turn_timeout: Duration::from_secs(300),
        }
    }
}

impl TimeoutConfig {
    /// Creates a new TimeoutConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stream start timeout.
    pub fn with_stream_start_timeout(mut self, timeout: Duration) -> Self {
        self.stream_start_timeout = timeout;
        self
    }

    /// Sets the idle timeout between fragments.
    pub fn with_fragment_idle_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_idle_timeout = timeout;
        self
    }

    /// Sets the whole-turn timeout.
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }
}

/// Timeouts as whole seconds, the shape used in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub stream_start_secs: u64,
    pub fragment_idle_secs: u64,
    pub turn_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        let defaults = TimeoutConfig::default();
        Self {
            stream_start_secs: defaults.stream_start_timeout.as_secs(),
            fragment_idle_secs: defaults.fragment_idle_timeout.as_secs(),
            turn_secs: defaults.turn_timeout.as_secs(),
        }
    }
}

impl From<TimeoutSettings> for TimeoutConfig {
    fn from(settings: TimeoutSettings) -> Self {
        TimeoutConfig::new()
            .with_stream_start_timeout(Duration::from_secs(settings.stream_start_secs))
            .with_fragment_idle_timeout(Duration::from_secs(settings.fragment_idle_secs))
            .with_turn_timeout(Duration::from_secs(settings.turn_secs))
    }
}
