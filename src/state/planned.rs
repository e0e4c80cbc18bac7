//! Planned games.
//!
//! An operator can stage a specific four-player matchup ahead of arrival
//! order. A planned game is a queue block with four addressable slots.
//! Listing a player in a planned game does not move them: they stay in
//! their regular block (or on court) until the game is sent.
//!
//! # Lifecycle
//!
//! ```text
//!  create ──▶ Floating ──(4th slot filled)──▶ Settling { due_at }
//!                ▲                                  │ settle_due(now)
//!                │ slot cleared                     ▼
//!                └──────────────── BehindMembers | BackOfQueue
//!                                                   │ members all queued
//!                                                   ▼
//!                                            Settling (recompute)
//! ```

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::game::BEHIND;
use super::player::{PlayerId, PlayerLocation};
use super::queue::{BlockId, PlannedPosition, QueueBlock, Removal, PLANNED_SLOTS};
use super::SessionState;
use crate::error::EngineError;

/// Cursor pointing at the planned-game slot the next pick fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSelection {
    pub block_id: BlockId,
    pub slot_index: usize,
}

/// Why a planned game cannot go to court yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedReason {
    SlotsOpen,
    PlayersBusy,
    NoEmptyCourt,
}

impl fmt::Display for BlockedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotsOpen => write!(f, "Select all four players"),
            Self::PlayersBusy => write!(f, "Waiting for players to finish..."),
            Self::NoEmptyCourt => write!(f, "Waiting for an empty court"),
        }
    }
}

/// Whether a planned game can be sent to court right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendReadiness {
    Ready { court_number: u32 },
    Blocked { reason: BlockedReason },
}

impl SendReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

impl SessionState {
    /// Create an empty planned game and point the cursor at its first slot.
    pub fn create_planned_game(&mut self, now: DateTime<Utc>) -> Result<BlockId, EngineError> {
        self.require_started()?;
        self.sweep_empty_planned_games(None);
        let block_id = self.queue.create_planned(now);
        self.selection = Some(SlotSelection {
            block_id,
            slot_index: 0,
        });
        Ok(block_id)
    }

    /// Set or clear one slot of a planned game.
    pub fn set_planned_slot(
        &mut self,
        block_id: BlockId,
        slot_index: usize,
        player_id: Option<PlayerId>,
        settle_delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        match player_id {
            Some(player_id) => self.fill_slot(block_id, slot_index, player_id, settle_delay, now),
            None => self.clear_slot(block_id, slot_index),
        }
    }

    /// Put a player into an empty slot.
    ///
    /// A player can be listed once per game and in one planned game at a
    /// time. The cursor advances to the next empty slot, or clears once
    /// the game is full.
    pub fn fill_slot(
        &mut self,
        block_id: BlockId,
        slot_index: usize,
        player_id: PlayerId,
        settle_delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let status = self.roster.require(player_id)?;
        if status.is_benched() {
            return Err(EngineError::InvalidState("Benched players cannot be planned"));
        }
        let block = self.planned_block(block_id)?;
        check_slot(slot_index)?;
        if block.contains(player_id) {
            return Err(EngineError::InvalidState("Player is already in this planned game"));
        }
        if block.player_ids[slot_index].is_some() {
            return Err(EngineError::CapacityExceeded {
                what: "Planned game slot",
            });
        }
        if self
            .queue
            .planned_containing(player_id)
            .iter()
            .any(|other| *other != block_id)
        {
            return Err(EngineError::InvalidState("Player is already in another planned game"));
        }

        let block = self.queue.require_mut(block_id)?;
        block.player_ids[slot_index] = Some(player_id);

        let next_empty = (1..PLANNED_SLOTS)
            .map(|offset| (slot_index + offset) % PLANNED_SLOTS)
            .find(|i| block.player_ids[*i].is_none());

        match next_empty {
            Some(slot_index) => {
                self.selection = Some(SlotSelection {
                    block_id,
                    slot_index,
                });
            }
            None => {
                block.closed = true;
                block.position = Some(PlannedPosition::Settling {
                    due_at: now + settle_delay,
                });
                self.clear_selection_for(block_id);
            }
        }
        Ok(())
    }

    /// Empty a slot, reopening the game. A game with no players left is deleted.
    pub fn clear_slot(&mut self, block_id: BlockId, slot_index: usize) -> Result<(), EngineError> {
        let block = self.planned_block(block_id)?;
        check_slot(slot_index)?;
        let player_id = block.player_ids[slot_index]
            .ok_or(EngineError::InvalidState("Slot is already empty"))?;

        if let Removal::Deleted(_) = self.queue.remove_player(block_id, player_id)? {
            self.clear_selection_for(block_id);
        }
        Ok(())
    }

    /// Discard a planned game; its players stay where they are.
    pub fn delete_planned_game(&mut self, block_id: BlockId) -> Result<(), EngineError> {
        self.planned_block(block_id)?;
        self.queue.remove(block_id);
        self.clear_selection_for(block_id);
        Ok(())
    }

    /// Move the slot cursor; `None` leaves selection mode.
    pub fn select_planned_slot(
        &mut self,
        selection: Option<SlotSelection>,
    ) -> Result<(), EngineError> {
        if let Some(selection) = selection {
            self.planned_block(selection.block_id)?;
            check_slot(selection.slot_index)?;
        }
        self.selection = selection;
        Ok(())
    }

    /// Whether the planned game can go to court, and where.
    pub fn send_readiness(&self, block_id: BlockId) -> Result<SendReadiness, EngineError> {
        let block = self.planned_block(block_id)?;
        if block.len() < PLANNED_SLOTS {
            return Ok(SendReadiness::Blocked {
                reason: BlockedReason::SlotsOpen,
            });
        }
        let all_queued = block
            .members()
            .all(|p| self.roster.status(p).map_or(false, |s| s.is_queued()));
        if !all_queued {
            return Ok(SendReadiness::Blocked {
                reason: BlockedReason::PlayersBusy,
            });
        }
        Ok(match self.courts.first_empty() {
            Some(court_number) => SendReadiness::Ready { court_number },
            None => SendReadiness::Blocked {
                reason: BlockedReason::NoEmptyCourt,
            },
        })
    }

    /// Seat all four players of a planned game, in slot order.
    ///
    /// Without an explicit court the first empty court is used. The
    /// planned game is consumed.
    pub fn send_planned_game(
        &mut self,
        block_id: BlockId,
        court_number: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<u32, EngineError> {
        let target = match self.send_readiness(block_id)? {
            SendReadiness::Blocked { reason } => match reason {
                BlockedReason::SlotsOpen => {
                    return Err(EngineError::InvalidState("Planned game is not full"))
                }
                BlockedReason::PlayersBusy => {
                    return Err(EngineError::InvalidState("Planned players are still playing"))
                }
                BlockedReason::NoEmptyCourt => {
                    return Err(EngineError::CapacityExceeded { what: "Every court" })
                }
            },
            SendReadiness::Ready { court_number: first_empty } => court_number.unwrap_or(first_empty),
        };
        if !self.courts.require(target)?.is_empty() {
            return Err(EngineError::CapacityExceeded { what: "Court" });
        }

        let players: Vec<PlayerId> = self.queue.require(block_id)?.members().collect();
        for player_id in &players {
            self.assign_to_court(*player_id, target, now)?;
        }
        self.queue.remove(block_id);
        self.clear_selection_for(block_id);

        log::info!("Planned game {} sent to court {}", block_id, target);
        Ok(target)
    }

    /// Queue position a full planned game should take right now.
    ///
    /// Behind everyone if a member is still playing, else just behind the
    /// member who joined the queue last.
    pub fn planned_position(&self, block_id: BlockId) -> Result<(f64, PlannedPosition), EngineError> {
        let block = self.planned_block(block_id)?;
        let back = self.queue.max_display_order().unwrap_or(0.0) + BEHIND;

        let mut furthest_back: Option<f64> = None;
        for player_id in block.members() {
            match self.roster.status(player_id).map(|s| s.location) {
                Some(PlayerLocation::Court { .. }) => {
                    return Ok((back, PlannedPosition::BackOfQueue));
                }
                Some(PlayerLocation::Queue { block_id }) => {
                    let order = self
                        .queue
                        .get(block_id)
                        .and_then(|b| b.display_order)
                        .unwrap_or(0.0);
                    furthest_back = Some(furthest_back.map_or(order, |f| f.max(order)));
                }
                _ => {}
            }
        }

        Ok(match furthest_back {
            Some(order) => (order + BEHIND, PlannedPosition::BehindMembers),
            None => (back, PlannedPosition::BackOfQueue),
        })
    }

    /// Resolve every settle timer that is due at `now`, reading the state
    /// as it is now. Returns how many planned games were positioned.
    pub fn settle_due(&mut self, now: DateTime<Utc>) -> usize {
        let due: Vec<BlockId> = self
            .queue
            .planned()
            .filter(|b| b.closed)
            .filter(|b| matches!(b.position, Some(PlannedPosition::Settling { due_at }) if due_at <= now))
            .map(|b| b.id)
            .collect();

        let mut settled = 0;
        for block_id in due {
            if let Ok((order, position)) = self.planned_position(block_id) {
                if let Some(block) = self.queue.get_mut(block_id) {
                    block.display_order = Some(order);
                    block.position = Some(position);
                    settled += 1;
                }
            }
        }
        settled
    }

    /// Restart the settle timer of games parked at the back whose members
    /// are all waiting again.
    pub fn rearm_parked_planned_games(&mut self, settle_delay: Duration, now: DateTime<Utc>) {
        let rearm: Vec<BlockId> = self
            .queue
            .planned()
            .filter(|b| b.closed && b.position == Some(PlannedPosition::BackOfQueue))
            .filter(|b| {
                b.members()
                    .all(|p| self.roster.status(p).map_or(false, |s| s.is_queued()))
            })
            .map(|b| b.id)
            .collect();

        for block_id in rearm {
            if let Some(block) = self.queue.get_mut(block_id) {
                block.position = Some(PlannedPosition::Settling {
                    due_at: now + settle_delay,
                });
            }
        }
    }

    /// Delete planned games with no players, except `keep`.
    pub fn sweep_empty_planned_games(&mut self, keep: Option<BlockId>) -> usize {
        let empty: Vec<BlockId> = self
            .queue
            .planned()
            .filter(|b| b.is_empty() && Some(b.id) != keep)
            .map(|b| b.id)
            .collect();

        for block_id in &empty {
            self.queue.remove(*block_id);
            self.clear_selection_for(*block_id);
        }
        empty.len()
    }

    /// Whether any planned game has every slot empty.
    pub fn has_empty_planned_game(&self) -> bool {
        self.queue.planned().any(|b| b.is_empty())
    }

    /// Drop the cursor if it points at a block that no longer exists.
    pub fn clean_selection(&mut self) {
        if let Some(selection) = self.selection {
            let valid = self
                .queue
                .get(selection.block_id)
                .map_or(false, |b| b.is_planned());
            if !valid {
                self.selection = None;
            }
        }
    }

    pub(crate) fn clear_selection_for(&mut self, block_id: BlockId) {
        if self.selection.map(|s| s.block_id) == Some(block_id) {
            self.selection = None;
        }
    }

    fn planned_block(&self, block_id: BlockId) -> Result<&QueueBlock, EngineError> {
        let block = self.queue.require(block_id)?;
        if !block.is_planned() {
            return Err(EngineError::InvalidState("Block is not a planned game"));
        }
        Ok(block)
    }
}

fn check_slot(slot_index: usize) -> Result<(), EngineError> {
    if slot_index < PLANNED_SLOTS {
        Ok(())
    } else {
        Err(EngineError::InvalidState("Slot index out of range"))
    }
}
