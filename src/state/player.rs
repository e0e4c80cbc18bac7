//! Player roster and location state machine.
//!
//! Tracks where each player is and validates location changes.
//!
//! # State Diagram
//!
//! ```text
//!                 take_court
//!   ┌───────────┐ ─────────────▶ ┌───────────┐
//!   │   Queue   │                │   Court   │
//!   │ (block n) │ ◀───────────── │ (court n) │
//!   └─────┬─────┘   join_queue   └─────┬─────┘
//!         │  ▲                         │
//!   bench │  │ join_queue (restore)    │ bench
//!         ▼  │                         │
//!   ┌───────────┐                      │
//!   │   Bench   │ ◀────────────────────┘
//!   │(rest/left)│ ── take_court ──▶ Court
//!   └───────────┘
//! ```
//!
//! A player is always in exactly one location. Players are never removed
//! from the roster during a session.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::queue::{BlockId, BlockShape};
use crate::error::EngineError;

/// Stable, sequential player identifier (1-based).
pub type PlayerId = u32;

/// A player's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Player {
    pub fn new(id: PlayerId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: default_name(id),
            created_at,
        }
    }
}

/// Name given to a player until an operator renames them.
pub fn default_name(id: PlayerId) -> String {
    format!("Player #{}", id)
}

/// Why a player is off the rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchReason {
    Resting,
    Left,
}

impl BenchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resting => "resting",
            Self::Left => "left",
        }
    }
}

/// Where a player currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "location", rename_all = "snake_case")]
pub enum PlayerLocation {
    Court { court_number: u32 },
    Queue { block_id: BlockId },
    Bench { reason: BenchReason },
}

impl PlayerLocation {
    pub fn is_on_court(&self) -> bool {
        matches!(self, Self::Court { .. })
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queue { .. })
    }

    pub fn is_benched(&self) -> bool {
        matches!(self, Self::Bench { .. })
    }

    pub fn court_number(&self) -> Option<u32> {
        match self {
            Self::Court { court_number } => Some(*court_number),
            _ => None,
        }
    }

    pub fn block_id(&self) -> Option<BlockId> {
        match self {
            Self::Queue { block_id } => Some(*block_id),
            _ => None,
        }
    }
}

impl fmt::Display for PlayerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Court { court_number } => write!(f, "Court({})", court_number),
            Self::Queue { block_id } => write!(f, "Queue({})", block_id),
            Self::Bench { reason } => write!(f, "Bench({})", reason.as_str()),
        }
    }
}

/// Result tag carried by a player between games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Winner,
    Loser,
    Waiting,
    Ready,
}

/// Location transition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    TakeCourt { court_number: u32 },
    JoinQueue { block_id: BlockId },
    Bench { reason: BenchReason },
}

/// Error when a location transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid transition from {from} via {event:?}: {reason}")]
pub struct InvalidTransition {
    pub from: PlayerLocation,
    pub event: PlayerEvent,
    pub reason: &'static str,
}

/// Full per-player status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub location: PlayerLocation,

    /// Outcome of the last game, or waiting/ready tags
    #[serde(default)]
    pub state: Option<PlayerState>,

    /// Queue block the player was taken from when last assigned to a court
    #[serde(default)]
    pub return_ticket: Option<BlockShape>,
}

impl PlayerStatus {
    /// Status for a player sitting in a queue block.
    pub fn queued(block_id: BlockId) -> Self {
        Self {
            location: PlayerLocation::Queue { block_id },
            state: None,
            return_ticket: None,
        }
    }

    /// Apply an event, returning the new status or an error.
    pub fn apply(&self, event: PlayerEvent) -> Result<Self, InvalidTransition> {
        let location = self.transition(&event)?;
        Ok(Self {
            location,
            ..self.clone()
        })
    }

    /// Apply an event in place.
    pub fn apply_mut(&mut self, event: PlayerEvent) -> Result<(), InvalidTransition> {
        self.location = self.transition(&event)?;
        Ok(())
    }

    fn transition(&self, event: &PlayerEvent) -> Result<PlayerLocation, InvalidTransition> {
        use PlayerEvent::{JoinQueue, TakeCourt};
        use PlayerLocation::{Court, Queue};

        let invalid = |reason: &'static str| InvalidTransition {
            from: self.location,
            event: *event,
            reason,
        };

        match (&self.location, event) {
            (Court { .. }, TakeCourt { .. }) => Err(invalid("Already on a court")),
            (_, TakeCourt { court_number }) => Ok(Court {
                court_number: *court_number,
            }),

            (Queue { block_id: current }, JoinQueue { block_id }) if current == block_id => {
                Err(invalid("Already in that queue block"))
            }
            (_, JoinQueue { block_id }) => Ok(Queue {
                block_id: *block_id,
            }),

            (PlayerLocation::Bench { reason: current }, PlayerEvent::Bench { reason })
                if current == reason =>
            {
                Err(invalid("Already benched for that reason"))
            }
            (_, PlayerEvent::Bench { reason }) => Ok(PlayerLocation::Bench { reason: *reason }),
        }
    }

    pub fn is_on_court(&self) -> bool {
        self.location.is_on_court()
    }

    pub fn is_queued(&self) -> bool {
        self.location.is_queued()
    }

    pub fn is_benched(&self) -> bool {
        self.location.is_benched()
    }
}

/// Roster of every player created in the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    players: BTreeMap<PlayerId, Player>,
    statuses: BTreeMap<PlayerId, PlayerStatus>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next added player will receive.
    pub fn next_id(&self) -> PlayerId {
        self.players.len() as PlayerId + 1
    }

    /// Create a player with the next sequential id.
    pub fn add(&mut self, status: PlayerStatus, now: DateTime<Utc>) -> PlayerId {
        let id = self.next_id();
        self.players.insert(id, Player::new(id, now));
        self.statuses.insert(id, status);
        id
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.get(&player_id)
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.players.contains_key(&player_id)
    }

    pub fn status(&self, player_id: PlayerId) -> Option<&PlayerStatus> {
        self.statuses.get(&player_id)
    }

    pub fn status_mut(&mut self, player_id: PlayerId) -> Option<&mut PlayerStatus> {
        self.statuses.get_mut(&player_id)
    }

    /// Status of an existing player, or `PlayerNotFound`.
    pub fn require(&self, player_id: PlayerId) -> Result<&PlayerStatus, EngineError> {
        self.statuses
            .get(&player_id)
            .ok_or(EngineError::PlayerNotFound(player_id))
    }

    /// Mutable status of an existing player, or `PlayerNotFound`.
    pub fn require_mut(&mut self, player_id: PlayerId) -> Result<&mut PlayerStatus, EngineError> {
        self.statuses
            .get_mut(&player_id)
            .ok_or(EngineError::PlayerNotFound(player_id))
    }

    /// Rename a player. Surrounding whitespace is trimmed.
    pub fn rename(&mut self, player_id: PlayerId, name: &str) -> Result<(), EngineError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidState("Player name cannot be empty"));
        }
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or(EngineError::PlayerNotFound(player_id))?;
        player.name = trimmed.to_string();
        Ok(())
    }

    /// Rename several players at once. Unknown ids and blank names are skipped.
    ///
    /// Returns how many players were renamed.
    pub fn bulk_rename(&mut self, names: &BTreeMap<PlayerId, String>) -> usize {
        names
            .iter()
            .filter(|(id, name)| self.rename(**id, name).is_ok())
            .count()
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn statuses(&self) -> impl Iterator<Item = (PlayerId, &PlayerStatus)> {
        self.statuses.iter().map(|(id, s)| (*id, s))
    }

    /// Ids of players benched for `reason`.
    pub fn benched(&self, reason: BenchReason) -> impl Iterator<Item = PlayerId> + '_ {
        self.statuses
            .iter()
            .filter(move |(_, s)| s.location == PlayerLocation::Bench { reason })
            .map(|(id, _)| *id)
    }

    pub fn count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_to_court_and_back() {
        let mut status = PlayerStatus::queued(1);
        assert!(status.is_queued());

        status
            .apply_mut(PlayerEvent::TakeCourt { court_number: 2 })
            .unwrap();
        assert!(status.is_on_court());
        assert_eq!(status.location.court_number(), Some(2));

        status.apply_mut(PlayerEvent::JoinQueue { block_id: 5 }).unwrap();
        assert_eq!(status.location.block_id(), Some(5));
    }

    #[test]
    fn test_invalid_transitions() {
        let on_court = PlayerStatus::queued(1)
            .apply(PlayerEvent::TakeCourt { court_number: 1 })
            .unwrap();
        let result = on_court.apply(PlayerEvent::TakeCourt { court_number: 2 });
        assert_eq!(result.unwrap_err().reason, "Already on a court");

        let queued = PlayerStatus::queued(3);
        assert!(queued.apply(PlayerEvent::JoinQueue { block_id: 3 }).is_err());

        let resting = queued
            .apply(PlayerEvent::Bench {
                reason: BenchReason::Resting,
            })
            .unwrap();
        assert!(resting
            .apply(PlayerEvent::Bench {
                reason: BenchReason::Resting
            })
            .is_err());
        assert!(resting
            .apply(PlayerEvent::Bench {
                reason: BenchReason::Left
            })
            .is_ok());
    }

    #[test]
    fn test_bench_from_court_and_queue() {
        let on_court = PlayerStatus::queued(1)
            .apply(PlayerEvent::TakeCourt { court_number: 1 })
            .unwrap();
        let left = on_court
            .apply(PlayerEvent::Bench {
                reason: BenchReason::Left,
            })
            .unwrap();
        assert_eq!(
            left.location,
            PlayerLocation::Bench {
                reason: BenchReason::Left
            }
        );

        let back = left.apply(PlayerEvent::JoinQueue { block_id: 4 }).unwrap();
        assert_eq!(back.location, PlayerLocation::Queue { block_id: 4 });
    }

    #[test]
    fn test_apply_keeps_state_tag() {
        let mut status = PlayerStatus::queued(1);
        status.state = Some(PlayerState::Winner);
        let moved = status
            .apply(PlayerEvent::TakeCourt { court_number: 1 })
            .unwrap();
        assert_eq!(moved.state, Some(PlayerState::Winner));
    }

    #[test]
    fn test_roster_sequential_ids() {
        let mut roster = Roster::new();
        let now = Utc::now();
        assert_eq!(roster.add(PlayerStatus::queued(1), now), 1);
        assert_eq!(roster.add(PlayerStatus::queued(1), now), 2);
        assert_eq!(roster.next_id(), 3);
        assert_eq!(roster.get(2).unwrap().name, "Player #2");
    }

    #[test]
    fn test_rename() {
        let mut roster = Roster::new();
        let id = roster.add(PlayerStatus::queued(1), Utc::now());

        roster.rename(id, "  Alice ").unwrap();
        assert_eq!(roster.get(id).unwrap().name, "Alice");

        assert!(matches!(
            roster.rename(id, "   "),
            Err(EngineError::InvalidState(_))
        ));
        assert_eq!(roster.rename(9, "Bob"), Err(EngineError::PlayerNotFound(9)));
    }

    #[test]
    fn test_bulk_rename_skips_unknown() {
        let mut roster = Roster::new();
        let now = Utc::now();
        roster.add(PlayerStatus::queued(1), now);
        roster.add(PlayerStatus::queued(1), now);

        let names = BTreeMap::from([
            (1, "Ann".to_string()),
            (2, "Ben".to_string()),
            (7, "Ghost".to_string()),
        ]);
        assert_eq!(roster.bulk_rename(&names), 2);
        assert_eq!(roster.get(2).unwrap().name, "Ben");
    }

    #[test]
    fn test_display() {
        let loc = PlayerLocation::Bench {
            reason: BenchReason::Left,
        };
        assert_eq!(format!("{}", loc), "Bench(left)");
    }
}
