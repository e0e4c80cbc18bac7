//! Moving players between queue, court and bench.
//!
//! Each operation validates before it mutates, so a rejected move leaves
//! the store untouched.

use chrono::{DateTime, Utc};

use super::player::{BenchReason, PlayerEvent, PlayerId, PlayerLocation, PlayerState};
use super::queue::{BlockId, BlockKind, Removal};
use super::SessionState;
use crate::error::EngineError;

impl SessionState {
    /// Seat a player in the next free slot of a court.
    ///
    /// The player's queue block is remembered so a later `remove_from_court`
    /// can put them back where they were. Any planned game listing the
    /// player loses them.
    pub fn assign_to_court(
        &mut self,
        player_id: PlayerId,
        court_number: u32,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let court = self.courts.require(court_number)?;
        if court.is_full() {
            return Err(EngineError::CapacityExceeded { what: "Court" });
        }
        let status = self.roster.require(player_id)?;
        let mut next = status.apply(PlayerEvent::TakeCourt { court_number })?;

        next.return_ticket = match status.location {
            PlayerLocation::Queue { block_id } => {
                let shape = self.queue.require(block_id)?.shape();
                self.queue.remove_player(block_id, player_id)?;
                Some(shape)
            }
            _ => None,
        };

        self.drop_from_planned(player_id);
        self.courts.require_mut(court_number)?.seat(player_id, now)?;
        *self.roster.require_mut(player_id)? = next;
        Ok(())
    }

    /// Take a player off their court before the game completed.
    ///
    /// The player goes back to the block they came from if it still
    /// exists, to a reconstituted copy of it if it was deleted, or else to
    /// a fresh returning block. Returns the block they landed in.
    pub fn remove_from_court(
        &mut self,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<BlockId, EngineError> {
        let status = self.roster.require(player_id)?.clone();
        let court_number = status
            .location
            .court_number()
            .ok_or(EngineError::InvalidState("Player is not on a court"))?;

        self.courts.require_mut(court_number)?.unseat(player_id)?;

        let block_id = match &status.return_ticket {
            Some(shape) if self.queue.get(shape.block_id).is_some() => {
                self.queue.append(shape.block_id, player_id)?;
                shape.block_id
            }
            Some(shape) => self.queue.reconstitute(shape, player_id),
            None => self
                .queue
                .create(BlockKind::Returning, Some(court_number), &[player_id], now),
        };

        let mut next = status.apply(PlayerEvent::JoinQueue { block_id })?;
        next.return_ticket = None;
        *self.roster.require_mut(player_id)? = next;
        Ok(block_id)
    }

    /// Move a player to the bench, from the queue or from a court.
    pub fn mark_benched(
        &mut self,
        player_id: PlayerId,
        reason: BenchReason,
    ) -> Result<(), EngineError> {
        let status = self.roster.require(player_id)?;
        let mut next = status.apply(PlayerEvent::Bench { reason })?;

        match status.location {
            PlayerLocation::Queue { block_id } => {
                self.queue.remove_player(block_id, player_id)?;
            }
            PlayerLocation::Court { court_number } => {
                self.courts.require_mut(court_number)?.unseat(player_id)?;
            }
            PlayerLocation::Bench { .. } => {}
        }

        self.drop_from_planned(player_id);
        next.state = None;
        next.return_ticket = None;
        *self.roster.require_mut(player_id)? = next;
        Ok(())
    }

    /// Bring a benched player back into the queue as a returning player.
    pub fn restore_player(
        &mut self,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<BlockId, EngineError> {
        let status = self.roster.require(player_id)?;
        if !status.is_benched() {
            return Err(EngineError::InvalidState("Player is not benched"));
        }

        let block_id = self
            .queue
            .enqueue(&[player_id], BlockKind::Returning, None, now);
        let status = self.roster.require_mut(player_id)?;
        status.apply_mut(PlayerEvent::JoinQueue { block_id })?;
        status.state = Some(PlayerState::Waiting);
        Ok(block_id)
    }

    /// Swap a court occupant for a waiting or benched player.
    ///
    /// The incoming player takes the outgoing player's slot, so the
    /// pairing and game clock carry on. The outgoing player joins a
    /// substitution block tagged with the court.
    pub fn substitute_player(
        &mut self,
        outgoing_id: PlayerId,
        incoming_id: PlayerId,
        court_number: u32,
        now: DateTime<Utc>,
    ) -> Result<BlockId, EngineError> {
        if outgoing_id == incoming_id {
            return Err(EngineError::InvalidState("Cannot substitute a player for themselves"));
        }
        self.courts.require(court_number)?;

        let outgoing = self.roster.require(outgoing_id)?;
        if outgoing.location.court_number() != Some(court_number) {
            return Err(EngineError::InvalidState("Outgoing player is not on that court"));
        }
        let incoming = self.roster.require(incoming_id)?;
        let mut incoming_next = incoming.apply(PlayerEvent::TakeCourt { court_number })?;
        incoming_next.return_ticket = None;
        let incoming_location = incoming.location;

        if let PlayerLocation::Queue { block_id } = incoming_location {
            self.queue.remove_player(block_id, incoming_id)?;
        }
        self.drop_from_planned(incoming_id);
        self.courts
            .require_mut(court_number)?
            .replace(outgoing_id, incoming_id)?;
        *self.roster.require_mut(incoming_id)? = incoming_next;

        let block_id = self
            .queue
            .enqueue(&[outgoing_id], BlockKind::Substituted, Some(court_number), now);
        let outgoing = self.roster.require_mut(outgoing_id)?;
        outgoing.apply_mut(PlayerEvent::JoinQueue { block_id })?;
        outgoing.state = Some(PlayerState::Waiting);
        outgoing.return_ticket = None;
        Ok(block_id)
    }

    /// Remove a player from every planned game that lists them.
    pub(crate) fn drop_from_planned(&mut self, player_id: PlayerId) {
        for block_id in self.queue.planned_containing(player_id) {
            if let Ok(Removal::Deleted(_)) = self.queue.remove_player(block_id, player_id) {
                self.clear_selection_for(block_id);
            }
        }
    }
}
