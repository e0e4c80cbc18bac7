//! Session state for a multi-court rotation.
//!
//! This module provides the entity store and the engines that mutate it:
//!
//! - `player` - Roster and per-player location state machine
//! - `queue` - Queue blocks (cohorts of up to four players)
//! - `court` - Courts, pairings, priority court
//! - `assign` - Moving players between queue, court and bench
//! - `game` - Resolving finished games back into the queue
//! - `planned` - Operator-curated planned games
//! - `history` - Snapshot undo/redo
//! - `intent` - The intent contract consumed by collaborators
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          SessionState                            │
//! │                                                                  │
//! │  ┌───────────────┐   ┌────────────────┐   ┌──────────────────┐   │
//! │  │    Roster     │   │  CourtManager  │   │   QueueManager   │   │
//! │  │               │   │                │   │                  │   │
//! │  │ player_id →   │   │ court_number → │   │ block_id →       │   │
//! │  │   Player      │   │   Court        │   │   QueueBlock     │   │
//! │  │ player_id →   │   │  (≤4 ids,      │   │  (≤4 ids, or 4   │   │
//! │  │   Status      │   │   pairing)     │   │   planned slots) │   │
//! │  └───────────────┘   └────────────────┘   └──────────────────┘   │
//! │                                                                  │
//! │  Status.location ──▶ Court(n) | Queue(block) | Bench(reason)     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Relations are stored as ids only. A snapshot of `SessionState` is a
//! plain clone, which is what the history keeps.

pub mod assign;
pub mod court;
pub mod game;
pub mod history;
pub mod intent;
pub mod planned;
pub mod player;
pub mod queue;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub use court::{generate_pairings, Court, CourtManager, Pairing, COURT_CAPACITY};
pub use game::CompletedGame;
pub use history::{History, Snapshot, DEFAULT_HISTORY_LIMIT};
pub use intent::{reduce, ApplyContext, Intent};
pub use planned::{BlockedReason, SendReadiness, SlotSelection};
pub use player::{
    BenchReason, InvalidTransition, Player, PlayerEvent, PlayerId, PlayerLocation, PlayerState,
    PlayerStatus, Roster,
};
pub use queue::{
    BlockId, BlockKind, BlockShape, PlannedPosition, QueueBlock, QueueManager, MAX_BLOCK_PLAYERS,
    PLANNED_SLOTS,
};

/// The entity store: single source of truth for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Whether `start_session` has run
    pub started: bool,

    pub roster: Roster,

    pub courts: CourtManager,

    pub queue: QueueManager,

    /// Planned-game slot the next picked player goes into
    #[serde(default)]
    pub selection: Option<SlotSelection>,

    /// Every game finished this session, oldest first
    #[serde(default)]
    pub completed_games: Vec<CompletedGame>,
}

impl SessionState {
    /// Pre-session state: no courts, no players.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session with `court_count` empty courts and `player_count`
    /// fresh players in a single new-players block.
    ///
    /// Anything from a previous session is discarded.
    pub fn start_session(
        &mut self,
        court_count: u32,
        player_count: u32,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if court_count == 0 {
            return Err(EngineError::InvalidState("A session needs at least one court"));
        }

        let mut state = Self {
            started: true,
            courts: CourtManager::with_courts(court_count),
            ..Self::default()
        };

        if player_count > 0 {
            let ids: Vec<PlayerId> = (1..=player_count).collect();
            let block_id = state.queue.create(BlockKind::NewPlayers, None, &ids, now);
            for _ in &ids {
                state.roster.add(PlayerStatus::queued(block_id), now);
            }
        }

        log::info!(
            "Session started with {} courts and {} players",
            court_count,
            player_count
        );
        *self = state;
        Ok(())
    }

    /// Drop everything and return to the pre-session state.
    pub fn reset_session(&mut self) {
        *self = Self::default();
        log::info!("Session reset");
    }

    /// Add a fresh player at the back of the new-players cohort.
    pub fn add_player(
        &mut self,
        max_players: usize,
        now: DateTime<Utc>,
    ) -> Result<PlayerId, EngineError> {
        self.require_started()?;
        if self.roster.count() >= max_players {
            return Err(EngineError::CapacityExceeded { what: "Roster" });
        }

        let player_id = self.roster.next_id();
        let block_id = self
            .queue
            .enqueue(&[player_id], BlockKind::NewPlayers, None, now);
        let added = self.roster.add(PlayerStatus::queued(block_id), now);
        debug_assert_eq!(added, player_id);
        Ok(player_id)
    }

    pub fn require_started(&self) -> Result<(), EngineError> {
        if self.started {
            Ok(())
        } else {
            Err(EngineError::SessionNotStarted)
        }
    }

    /// Court the engine recommends filling next.
    pub fn priority_court(&self) -> Option<u32> {
        self.courts.priority_court()
    }

    /// Queue blocks front to back.
    pub fn ordered_blocks(&self) -> Vec<&QueueBlock> {
        self.queue.ordered()
    }

    /// Queued players front to back, skipping planned-game listings.
    pub fn waiting_players(&self) -> Vec<PlayerId> {
        self.queue
            .ordered()
            .into_iter()
            .filter(|b| !b.is_planned())
            .flat_map(|b| b.members())
            .collect()
    }

    /// Check every structural invariant of the store.
    ///
    /// A violation means an engine bug, never bad input.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let fail = |message: String| Err(InvariantViolation { message });

        let mut seats: HashMap<PlayerId, u32> = HashMap::new();
        for court in self.courts.courts() {
            if court.player_count() > COURT_CAPACITY {
                return fail(format!("court {} holds {} players", court.number, court.player_count()));
            }
            if court.start_time.is_some() != court.is_full() {
                return fail(format!("court {} start time out of step with occupancy", court.number));
            }
            for player_id in &court.player_ids {
                if seats.insert(*player_id, court.number).is_some() {
                    return fail(format!("player {} seated twice", player_id));
                }
            }
        }

        let mut queued: HashMap<PlayerId, BlockId> = HashMap::new();
        let mut planned_members: HashSet<PlayerId> = HashSet::new();
        for block in self.queue.blocks() {
            if block.is_planned() {
                if block.player_ids.len() != PLANNED_SLOTS {
                    return fail(format!("planned game {} has {} slots", block.id, block.player_ids.len()));
                }
                if block.closed != (block.len() == PLANNED_SLOTS) {
                    return fail(format!("planned game {} closed flag is wrong", block.id));
                }
                let mut seen = HashSet::new();
                for player_id in block.members() {
                    if !seen.insert(player_id) || !planned_members.insert(player_id) {
                        return fail(format!("player {} planned twice", player_id));
                    }
                }
                continue;
            }

            if block.is_empty() {
                return fail(format!("block {} is empty", block.id));
            }
            if block.player_ids.iter().any(Option::is_none) {
                return fail(format!("block {} has an empty slot", block.id));
            }
            if block.is_full() && !block.closed {
                return fail(format!("block {} is full but open", block.id));
            }
            for player_id in block.members() {
                if seats.contains_key(&player_id) {
                    return fail(format!("player {} is on a court and in block {}", player_id, block.id));
                }
                if queued.insert(player_id, block.id).is_some() {
                    return fail(format!("player {} queued twice", player_id));
                }
            }
        }

        for player in self.roster.players() {
            let status = match self.roster.status(player.id) {
                Some(status) => status,
                None => return fail(format!("player {} has no status", player.id)),
            };
            let consistent = match status.location {
                PlayerLocation::Court { court_number } => {
                    seats.get(&player.id) == Some(&court_number) && !queued.contains_key(&player.id)
                }
                PlayerLocation::Queue { block_id } => {
                    queued.get(&player.id) == Some(&block_id) && !seats.contains_key(&player.id)
                }
                PlayerLocation::Bench { .. } => {
                    !queued.contains_key(&player.id) && !seats.contains_key(&player.id)
                }
            };
            if !consistent {
                return fail(format!("player {} status {} disagrees with store", player.id, status.location));
            }
        }

        if seats.len() + queued.len() > self.roster.count() {
            return fail("unknown player ids in courts or queue".to_string());
        }

        Ok(())
    }
}

/// Internal consistency failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invariant violated: {message}")]
pub struct InvariantViolation {
    pub message: String,
}
