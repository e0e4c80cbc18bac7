//! The intent contract.
//!
//! Collaborators never call the engines directly; they describe what the
//! operator did as an `Intent` and hand it to a `Session` (or to `reduce`
//! when they keep their own history).

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::planned::SlotSelection;
use super::player::{BenchReason, PlayerId};
use super::queue::BlockId;
use super::SessionState;
use crate::error::EngineError;

/// Everything an operator can ask of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    StartSession {
        court_count: u32,
        player_count: u32,
    },
    ResetSession,
    AddPlayer,
    RenamePlayer {
        player_id: PlayerId,
        name: String,
    },
    BulkRenamePlayers {
        names: BTreeMap<PlayerId, String>,
    },
    AssignToCourt {
        player_id: PlayerId,
        court_number: u32,
    },
    RemoveFromCourt {
        player_id: PlayerId,
    },
    RotatePairing {
        court_number: u32,
    },
    PairPartners {
        court_number: u32,
        first: PlayerId,
        second: PlayerId,
    },
    CompleteGame {
        court_number: u32,
        winning_pair: [PlayerId; 2],
        losing_pair: [PlayerId; 2],
    },
    MarkBenched {
        player_id: PlayerId,
        reason: BenchReason,
    },
    RestorePlayer {
        player_id: PlayerId,
    },
    SubstitutePlayer {
        outgoing_id: PlayerId,
        incoming_id: PlayerId,
        court_number: u32,
    },
    CreatePlannedGame,
    SetPlannedSlot {
        block_id: BlockId,
        slot_index: usize,
        player_id: Option<PlayerId>,
    },
    DeletePlannedGame {
        block_id: BlockId,
    },
    SendPlannedGame {
        block_id: BlockId,
        #[serde(default)]
        court_number: Option<u32>,
    },
    SelectPlannedSlot {
        selection: Option<SlotSelection>,
    },
    Undo,
    Redo,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartSession { .. } => "start_session",
            Self::ResetSession => "reset_session",
            Self::AddPlayer => "add_player",
            Self::RenamePlayer { .. } => "rename_player",
            Self::BulkRenamePlayers { .. } => "bulk_rename_players",
            Self::AssignToCourt { .. } => "assign_to_court",
            Self::RemoveFromCourt { .. } => "remove_from_court",
            Self::RotatePairing { .. } => "rotate_pairing",
            Self::PairPartners { .. } => "pair_partners",
            Self::CompleteGame { .. } => "complete_game",
            Self::MarkBenched { .. } => "mark_benched",
            Self::RestorePlayer { .. } => "restore_player",
            Self::SubstitutePlayer { .. } => "substitute_player",
            Self::CreatePlannedGame => "create_planned_game",
            Self::SetPlannedSlot { .. } => "set_planned_slot",
            Self::DeletePlannedGame { .. } => "delete_planned_game",
            Self::SendPlannedGame { .. } => "send_planned_game",
            Self::SelectPlannedSlot { .. } => "select_planned_slot",
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }

    /// Whether a successful application is recorded in history.
    ///
    /// Renames and cursor moves change the present without a history entry.
    pub fn is_undoable(&self) -> bool {
        matches!(
            self,
            Self::AddPlayer
                | Self::AssignToCourt { .. }
                | Self::RemoveFromCourt { .. }
                | Self::RotatePairing { .. }
                | Self::PairPartners { .. }
                | Self::CompleteGame { .. }
                | Self::MarkBenched { .. }
                | Self::RestorePlayer { .. }
                | Self::SubstitutePlayer { .. }
                | Self::CreatePlannedGame
                | Self::SetPlannedSlot { .. }
                | Self::DeletePlannedGame { .. }
                | Self::SendPlannedGame { .. }
        )
    }

    /// Whether the intent wipes undo/redo history.
    pub fn resets_history(&self) -> bool {
        matches!(self, Self::StartSession { .. } | Self::ResetSession)
    }

    /// Whether the intent navigates history instead of changing state.
    pub fn is_history_navigation(&self) -> bool {
        matches!(self, Self::Undo | Self::Redo)
    }

    /// Planned game the intent edits; it is spared by the empty sweep.
    fn planned_target(&self) -> Option<BlockId> {
        match self {
            Self::SetPlannedSlot { block_id, .. }
            | Self::DeletePlannedGame { block_id }
            | Self::SendPlannedGame { block_id, .. } => Some(*block_id),
            Self::SelectPlannedSlot { selection } => selection.map(|s| s.block_id),
            _ => None,
        }
    }

    /// Apply the intent to `state` in place.
    ///
    /// On error `state` may be partially modified; callers work on a copy
    /// and discard it.
    pub fn apply(&self, state: &mut SessionState, ctx: &ApplyContext) -> Result<(), EngineError> {
        let now = ctx.now;

        if !self.resets_history() && !self.is_history_navigation() {
            state.require_started()?;
            state.sweep_empty_planned_games(self.planned_target());
        }

        match self {
            Self::StartSession {
                court_count,
                player_count,
            } => state.start_session(*court_count, *player_count, now)?,
            Self::ResetSession => state.reset_session(),
            Self::AddPlayer => {
                state.add_player(ctx.max_players, now)?;
            }
            Self::RenamePlayer { player_id, name } => state.roster.rename(*player_id, name)?,
            Self::BulkRenamePlayers { names } => {
                state.roster.bulk_rename(names);
            }
            Self::AssignToCourt {
                player_id,
                court_number,
            } => state.assign_to_court(*player_id, *court_number, now)?,
            Self::RemoveFromCourt { player_id } => {
                state.remove_from_court(*player_id, now)?;
            }
            Self::RotatePairing { court_number } => {
                state.courts.require_mut(*court_number)?.rotate_pairing()?;
            }
            Self::PairPartners {
                court_number,
                first,
                second,
            } => {
                state
                    .courts
                    .require_mut(*court_number)?
                    .pair_partners(*first, *second)?;
            }
            Self::CompleteGame {
                court_number,
                winning_pair,
                losing_pair,
            } => {
                state.complete_game(*court_number, *winning_pair, *losing_pair, now)?;
            }
            Self::MarkBenched { player_id, reason } => state.mark_benched(*player_id, *reason)?,
            Self::RestorePlayer { player_id } => {
                state.restore_player(*player_id, now)?;
            }
            Self::SubstitutePlayer {
                outgoing_id,
                incoming_id,
                court_number,
            } => {
                state.substitute_player(*outgoing_id, *incoming_id, *court_number, now)?;
            }
            Self::CreatePlannedGame => {
                state.create_planned_game(now)?;
            }
            Self::SetPlannedSlot {
                block_id,
                slot_index,
                player_id,
            } => state.set_planned_slot(*block_id, *slot_index, *player_id, ctx.settle_delay, now)?,
            Self::DeletePlannedGame { block_id } => state.delete_planned_game(*block_id)?,
            Self::SendPlannedGame {
                block_id,
                court_number,
            } => {
                state.send_planned_game(*block_id, *court_number, now)?;
            }
            Self::SelectPlannedSlot { selection } => state.select_planned_slot(*selection)?,
            Self::Undo | Self::Redo => {
                return Err(EngineError::InvalidState("Undo and redo need a session history"))
            }
        }

        state.rearm_parked_planned_games(ctx.settle_delay, now);
        Ok(())
    }
}

/// Inputs an intent needs besides the state itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyContext {
    pub now: DateTime<Utc>,
    /// Wait between a planned game filling up and its position being computed
    pub settle_delay: Duration,
    pub max_players: usize,
}

impl ApplyContext {
    pub fn new(now: DateTime<Utc>, settle_delay: Duration, max_players: usize) -> Self {
        Self {
            now,
            settle_delay,
            max_players,
        }
    }
}

/// Pure reducer: the next state, or `state` unchanged if the intent is
/// rejected.
pub fn reduce(state: &SessionState, intent: &Intent, ctx: &ApplyContext) -> SessionState {
    let mut next = state.clone();
    match intent.apply(&mut next, ctx) {
        Ok(()) => next,
        Err(e) => {
            log::debug!("Rejected {}: {}", intent.name(), e);
            state.clone()
        }
    }
}
