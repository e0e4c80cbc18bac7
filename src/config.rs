//! Session configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::state::DEFAULT_HISTORY_LIMIT;

/// Tunables for a session. Every field has a default, so a partial JSON
/// document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Courts created by `Session::start`
    pub court_count: u32,

    /// Players created by `Session::start`
    pub initial_players: u32,

    /// Roster limit for `AddPlayer`
    pub max_players: usize,

    /// Delay before a full planned game's queue position is computed
    pub settle_delay_ms: u64,

    /// Past snapshots kept for undo
    pub history_limit: usize,

    /// Saved snapshots older than this are ignored on restore
    pub snapshot_max_age_hours: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            court_count: 4,
            initial_players: 0,
            max_players: 999,
            settle_delay_ms: 1000,
            history_limit: DEFAULT_HISTORY_LIMIT,
            snapshot_max_age_hours: 24,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.settle_delay_ms).unwrap_or(i64::MAX))
    }

    pub fn snapshot_max_age(&self) -> Duration {
        Duration::hours(i64::from(self.snapshot_max_age_hours))
    }
}
