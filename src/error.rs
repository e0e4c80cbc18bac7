//! Error types.
//!
//! Every engine failure is a precondition failure: the operation that
//! produced it left the session state untouched.

use thiserror::Error;

use crate::state::player::{InvalidTransition, PlayerId};
use crate::state::queue::BlockId;

/// A rejected engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Player {0} not found")]
    PlayerNotFound(PlayerId),

    #[error("Court {0} not found")]
    CourtNotFound(u32),

    #[error("Queue block {0} not found")]
    BlockNotFound(BlockId),

    #[error("{what} is full")]
    CapacityExceeded { what: &'static str },

    #[error("{0}")]
    InvalidState(&'static str),

    #[error("Game on court {court} was already completed")]
    DuplicateCompletion { court: u32 },

    #[error("Session has not been started")]
    SessionNotStarted,

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl EngineError {
    /// Short machine-readable category, for collaborators that map errors to messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerNotFound(_) | Self::CourtNotFound(_) | Self::BlockNotFound(_) => {
                "not_found"
            }
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::InvalidState(_)
            | Self::SessionNotStarted
            | Self::NothingToUndo
            | Self::NothingToRedo
            | Self::Transition(_) => "invalid_state",
            Self::DuplicateCompletion { .. } => "already_in_progress",
        }
    }
}

/// Failure of the persistence side channel.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("snapshot io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}
