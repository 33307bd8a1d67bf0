use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::substrate::BlockNumber;

/// Tunables of the funder, adjudicator and their subscriptions.
///
/// Missing fields take their default when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many blocks event subscriptions and storage queries look back.
    pub past_blocks: BlockNumber,
    /// How often a chain timeout polls the chain time.
    pub timeout_poll_interval_ms: u64,
    /// Adjudicator events closer together than this are coalesced.
    pub quiescence_window_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            past_blocks: 100,
            timeout_poll_interval_ms: 1000,
            quiescence_window_ms: 100,
        }
    }
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn timeout_poll_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_poll_interval_ms)
    }

    pub fn quiescence_window(&self) -> Duration {
        Duration::from_millis(self.quiescence_window_ms)
    }
}
