//! TOML configuration: outbox retry policy and the local actor directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::TraceError;
use crate::history::ActorProfile;

/// Top-level config file shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoamConfig {
    #[serde(default)]
    pub outbox: OutboxConfig,
    /// Actor id -> display profile, used by the CLI's history view.
    #[serde(default)]
    pub actors: BTreeMap<String, ActorProfile>,
}

impl LoamConfig {
    /// Load config from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// [`TraceError::Config`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TraceError::Config(format!("read {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| TraceError::Config(format!("parse {}: {e}", path.display())))
    }
}

/// Retry policy for queued offline actions.
///
/// Transient flush failures back off exponentially
/// (`base * 2^attempts`, capped) and actions older than the max age are
/// evicted with a warning instead of retrying forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// First retry delay after a transient failure, in seconds. Zero means
    /// the action is due again on the next flush.
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    /// Upper bound on the retry delay, in seconds.
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    /// Queued actions older than this are evicted on flush, in hours.
    #[serde(default = "default_max_action_age_hours")]
    pub max_action_age_hours: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            base_backoff_secs: default_base_backoff_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            max_action_age_hours: default_max_action_age_hours(),
        }
    }
}

const fn default_base_backoff_secs() -> u64 {
    60
}

const fn default_backoff_cap_secs() -> u64 {
    3600
}

const fn default_max_action_age_hours() -> u64 {
    168 // one week
}
