//! Court state.
//!
//! Courts hold up to four players in click order. The order seeds the
//! doubles pairing: slots `[a, b, c, d]` split three ways.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::game::CompletedGame;
use super::player::PlayerId;
use crate::error::EngineError;

/// Players needed for a doubles game.
pub const COURT_CAPACITY: usize = 4;

/// Distinct ways to split four players into two pairs.
pub const PAIRING_COUNT: u8 = 3;

/// One doubles split of a full court.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub team_a: [PlayerId; 2],
    pub team_b: [PlayerId; 2],
}

impl Pairing {
    /// Check whether two players are partners in this pairing.
    pub fn are_partners(&self, first: PlayerId, second: PlayerId) -> bool {
        let same = |team: &[PlayerId; 2]| team.contains(&first) && team.contains(&second);
        first != second && (same(&self.team_a) || same(&self.team_b))
    }
}

/// The three pairings of `[a, b, c, d]`: `ab|cd`, `ac|bd`, `ad|bc`.
pub fn generate_pairings(players: [PlayerId; 4]) -> [Pairing; 3] {
    let [a, b, c, d] = players;
    [
        Pairing {
            team_a: [a, b],
            team_b: [c, d],
        },
        Pairing {
            team_a: [a, c],
            team_b: [b, d],
        },
        Pairing {
            team_a: [a, d],
            team_b: [b, c],
        },
    ]
}

/// A single court.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Court {
    /// 1-based court number
    pub number: u32,

    /// Occupants in click order
    pub player_ids: Vec<PlayerId>,

    /// Selected pairing (0..3)
    pub pairing_index: u8,

    /// Set when the fourth player joins
    pub start_time: Option<DateTime<Utc>>,

    /// Most recent game finished on this court
    #[serde(default)]
    pub last_game: Option<CompletedGame>,
}

impl Court {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            player_ids: Vec::with_capacity(COURT_CAPACITY),
            pairing_index: 0,
            start_time: None,
            last_game: None,
        }
    }

    pub fn player_count(&self) -> usize {
        self.player_ids.len()
    }

    pub fn is_full(&self) -> bool {
        self.player_ids.len() >= COURT_CAPACITY
    }

    pub fn is_empty(&self) -> bool {
        self.player_ids.is_empty()
    }

    pub fn free_slots(&self) -> usize {
        COURT_CAPACITY.saturating_sub(self.player_ids.len())
    }

    pub fn has_player(&self, player_id: PlayerId) -> bool {
        self.player_ids.contains(&player_id)
    }

    /// Occupants as a fixed array, if the court is full.
    pub fn lineup(&self) -> Option<[PlayerId; 4]> {
        self.player_ids.as_slice().try_into().ok()
    }

    /// All three pairings, if the court is full.
    pub fn pairings(&self) -> Option<[Pairing; 3]> {
        self.lineup().map(generate_pairings)
    }

    /// Pairing currently selected, if the court is full.
    pub fn current_pairing(&self) -> Option<Pairing> {
        self.pairings()
            .map(|p| p[self.pairing_index as usize % p.len()])
    }

    /// How long the current game has been running.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.start_time.map(|start| now - start)
    }

    /// Seat a player in the next free slot.
    pub fn seat(&mut self, player_id: PlayerId, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.is_full() {
            return Err(EngineError::CapacityExceeded { what: "Court" });
        }
        if self.has_player(player_id) {
            return Err(EngineError::InvalidState("Player is already on this court"));
        }
        self.player_ids.push(player_id);
        if self.is_full() {
            self.start_time = Some(now);
        }
        Ok(())
    }

    /// Take a player off the court. The game never happened, so the clock stops.
    pub fn unseat(&mut self, player_id: PlayerId) -> Result<(), EngineError> {
        if !self.has_player(player_id) {
            return Err(EngineError::InvalidState("Player is not on this court"));
        }
        self.player_ids.retain(|p| *p != player_id);
        self.start_time = None;
        Ok(())
    }

    /// Swap one occupant for another in the same slot.
    pub fn replace(&mut self, outgoing: PlayerId, incoming: PlayerId) -> Result<(), EngineError> {
        if self.has_player(incoming) {
            return Err(EngineError::InvalidState("Player is already on this court"));
        }
        let slot = self
            .player_ids
            .iter_mut()
            .find(|p| **p == outgoing)
            .ok_or(EngineError::InvalidState("Player is not on this court"))?;
        *slot = incoming;
        Ok(())
    }

    /// Advance to the next pairing.
    pub fn rotate_pairing(&mut self) -> Result<u8, EngineError> {
        if !self.is_full() {
            return Err(EngineError::InvalidState("Only a full court can rotate pairings"));
        }
        self.pairing_index = (self.pairing_index + 1) % PAIRING_COUNT;
        Ok(self.pairing_index)
    }

    /// Jump to the pairing where `first` and `second` are partners.
    pub fn pair_partners(&mut self, first: PlayerId, second: PlayerId) -> Result<u8, EngineError> {
        let pairings = self
            .pairings()
            .ok_or(EngineError::InvalidState("Only a full court can change pairings"))?;
        let index = pairings
            .iter()
            .position(|p| p.are_partners(first, second))
            .ok_or(EngineError::InvalidState("Both players must be on this court"))?;
        self.pairing_index = index as u8;
        Ok(self.pairing_index)
    }

    /// Empty the court after a finished game.
    pub fn clear(&mut self) -> Vec<PlayerId> {
        self.pairing_index = 0;
        self.start_time = None;
        std::mem::take(&mut self.player_ids)
    }
}

/// Court manager - owns the fixed set of courts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourtManager {
    courts: BTreeMap<u32, Court>,
}

impl CourtManager {
    /// Create courts numbered `1..=count`.
    pub fn with_courts(count: u32) -> Self {
        Self {
            courts: (1..=count).map(|n| (n, Court::new(n))).collect(),
        }
    }

    pub fn get(&self, number: u32) -> Option<&Court> {
        self.courts.get(&number)
    }

    pub fn get_mut(&mut self, number: u32) -> Option<&mut Court> {
        self.courts.get_mut(&number)
    }

    pub fn require(&self, number: u32) -> Result<&Court, EngineError> {
        self.courts
            .get(&number)
            .ok_or(EngineError::CourtNotFound(number))
    }

    pub fn require_mut(&mut self, number: u32) -> Result<&mut Court, EngineError> {
        self.courts
            .get_mut(&number)
            .ok_or(EngineError::CourtNotFound(number))
    }

    /// Courts in number order.
    pub fn courts(&self) -> impl Iterator<Item = &Court> {
        self.courts.values()
    }

    /// Court the player is seated on, if any.
    pub fn court_of(&self, player_id: PlayerId) -> Option<&Court> {
        self.courts.values().find(|c| c.has_player(player_id))
    }

    /// The court to fill next.
    ///
    /// Partially filled courts come first, then empty ones; `None` when
    /// every court is full.
    pub fn priority_court(&self) -> Option<u32> {
        self.courts
            .values()
            .find(|c| !c.is_empty() && !c.is_full())
            .or_else(|| self.courts.values().find(|c| c.is_empty()))
            .map(|c| c.number)
    }

    /// First court with all four slots free.
    pub fn first_empty(&self) -> Option<u32> {
        self.courts.values().find(|c| c.is_empty()).map(|c| c.number)
    }

    pub fn count(&self) -> usize {
        self.courts.len()
    }
}
