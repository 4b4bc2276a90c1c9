//! Coordinator configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Coordinator settings
///
/// Loaded with priority ENV (`LIFECYCLE_*`) > YAML file > default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on a single participant's `graceful_close`, in ms.
    /// Unset (or 0) waits indefinitely.
    pub participant_timeout_ms: Option<u64>,
    /// Log each participant's registration, start and finish
    pub log_participants: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            participant_timeout_ms: None,
            log_participants: true,
        }
    }
}

impl LifecycleConfig {
    pub const ENV_PREFIX: &'static str = "LIFECYCLE_";

    /// Load from an optional YAML file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Ok(common::load_layered(file, Self::ENV_PREFIX)?)
    }

    /// Load from the environment only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn with_participant_timeout(mut self, timeout: Duration) -> Self {
        self.participant_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_participant_logging(mut self, enabled: bool) -> Self {
        self.log_participants = enabled;
        self
    }

    pub fn participant_timeout(&self) -> Option<Duration> {
        match self.participant_timeout_ms {
            Some(0) | None => None,
            Some(ms) => Some(Duration::from_millis(ms)),
        }
    }
}
