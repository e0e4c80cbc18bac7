//! Game completion.
//!
//! A finished doubles game sends all four players back into the queue as
//! one closed cohort, tagged with the court they came off.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::player::{PlayerEvent, PlayerId, PlayerState};
use super::queue::{BlockId, BlockKind, PlannedPosition};
use super::SessionState;
use crate::error::EngineError;

/// Offset that parks a planned game just behind a regular block.
pub(crate) const BEHIND: f64 = 0.5;

/// Record of a finished game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedGame {
    pub court_number: u32,
    pub winners: [PlayerId; 2],
    pub losers: [PlayerId; 2],
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
}

impl CompletedGame {
    /// All four participants, winners first.
    pub fn players(&self) -> [PlayerId; 4] {
        [self.winners[0], self.winners[1], self.losers[0], self.losers[1]]
    }

    pub fn duration(&self) -> Option<Duration> {
        self.started_at.map(|start| self.ended_at - start)
    }

    fn same_lineup(&self, players: &BTreeSet<PlayerId>) -> bool {
        self.players().iter().copied().collect::<BTreeSet<_>>() == *players
    }
}

impl SessionState {
    /// Resolve the game on a full court.
    ///
    /// The pairs must cover exactly the court's four players. The court is
    /// cleared and a closed game-ended block holding winners then losers is
    /// appended to the queue. Resubmitting a game that was already applied
    /// fails with `DuplicateCompletion` and changes nothing.
    pub fn complete_game(
        &mut self,
        court_number: u32,
        winning_pair: [PlayerId; 2],
        losing_pair: [PlayerId; 2],
        now: DateTime<Utc>,
    ) -> Result<BlockId, EngineError> {
        let submitted: BTreeSet<PlayerId> =
            winning_pair.iter().chain(losing_pair.iter()).copied().collect();

        let court = self.courts.require(court_number)?;
        if !court.is_full() {
            return match &court.last_game {
                Some(last) if last.same_lineup(&submitted) => {
                    Err(EngineError::DuplicateCompletion { court: court_number })
                }
                _ => Err(EngineError::InvalidState("Court does not have four players")),
            };
        }
        let on_court: BTreeSet<PlayerId> = court.player_ids.iter().copied().collect();
        if submitted.len() != 4 || submitted != on_court {
            return Err(EngineError::InvalidState(
                "Pairs must be exactly the four players on the court",
            ));
        }

        let court = self.courts.require_mut(court_number)?;
        let started_at = court.start_time;
        court.clear();

        let players = [winning_pair[0], winning_pair[1], losing_pair[0], losing_pair[1]];
        let block_id = self
            .queue
            .enqueue(&players, BlockKind::GameEnded, Some(court_number), now);

        for (player_id, outcome) in winning_pair
            .iter()
            .map(|p| (*p, PlayerState::Winner))
            .chain(losing_pair.iter().map(|p| (*p, PlayerState::Loser)))
        {
            let status = self.roster.require_mut(player_id)?;
            status.apply_mut(PlayerEvent::JoinQueue { block_id })?;
            status.state = Some(outcome);
            status.return_ticket = None;
        }

        let game = CompletedGame {
            court_number,
            winners: winning_pair,
            losers: losing_pair,
            started_at,
            ended_at: now,
        };
        self.courts.require_mut(court_number)?.last_game = Some(game.clone());
        self.completed_games.push(game);

        self.park_planned_games_with_players_on_court();

        log::info!(
            "Court {} finished: {:?} beat {:?}",
            court_number,
            winning_pair,
            losing_pair
        );
        Ok(block_id)
    }

    /// Push positioned planned games that still wait on a playing member
    /// behind the newest regular block.
    fn park_planned_games_with_players_on_court(&mut self) {
        let back = self.queue.max_display_order().unwrap_or(0.0) + BEHIND;
        let parked: Vec<BlockId> = self
            .queue
            .planned()
            .filter(|b| b.closed && b.display_order.is_some())
            .filter(|b| b.members().any(|p| self.courts.court_of(p).is_some()))
            .map(|b| b.id)
            .collect();

        for block_id in parked {
            if let Some(block) = self.queue.get_mut(block_id) {
                block.display_order = Some(back);
                block.position = Some(PlannedPosition::BackOfQueue);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::queue::QueueBlock;

    fn full_court(players: u32) -> SessionState {
        let mut state = SessionState::new();
        let now = Utc::now();
        state.start_session(2, players, now).unwrap();
        for id in 1..=4 {
            state.assign_to_court(id, 1, now).unwrap();
        }
        state
    }

    #[test]
    fn test_complete_game() {
        let mut state = full_court(8);
        let block_id = state.complete_game(1, [1, 2], [3, 4], Utc::now()).unwrap();

        let court = state.courts.get(1).unwrap();
        assert!(court.is_empty());
        assert_eq!(court.pairing_index, 0);
        assert!(court.start_time.is_none());

        let block = state.queue.get(block_id).unwrap();
        assert_eq!(block.kind, BlockKind::GameEnded);
        assert!(block.closed);
        assert_eq!(block.source_court, Some(1));
        assert_eq!(block.members().collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        assert_eq!(state.roster.status(1).unwrap().state, Some(PlayerState::Winner));
        assert_eq!(state.roster.status(4).unwrap().state, Some(PlayerState::Loser));
        assert_eq!(state.completed_games.len(), 1);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn test_winners_listed_first() {
        let mut state = full_court(4);
        let block_id = state.complete_game(1, [4, 1], [2, 3], Utc::now()).unwrap();
        let block: &QueueBlock = state.queue.get(block_id).unwrap();
        assert_eq!(block.members().collect::<Vec<_>>(), vec![4, 1, 2, 3]);
    }

    #[test]
    fn test_complete_requires_full_court() {
        let mut state = SessionState::new();
        let now = Utc::now();
        state.start_session(1, 4, now).unwrap();
        state.assign_to_court(1, 1, now).unwrap();
        let before = state.clone();
        assert_eq!(
            state.complete_game(1, [1, 2], [3, 4], now),
            Err(EngineError::InvalidState("Court does not have four players"))
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_complete_rejects_foreign_players() {
        let mut state = full_court(8);
        assert!(state.complete_game(1, [1, 2], [3, 5], Utc::now()).is_err());
        assert!(state.complete_game(1, [1, 1], [3, 4], Utc::now()).is_err());
        assert!(state.courts.get(1).unwrap().is_full());
    }

    #[test]
    fn test_duplicate_completion_is_rejected() {
        let mut state = full_court(8);
        let now = Utc::now();
        state.complete_game(1, [1, 2], [3, 4], now).unwrap();
        let once = state.clone();

        assert_eq!(
            state.complete_game(1, [1, 2], [3, 4], now),
            Err(EngineError::DuplicateCompletion { court: 1 })
        );
        assert_eq!(state, once);
    }

    #[test]
    fn test_duration() {
        let mut state = full_court(4);
        let start = state.courts.get(1).unwrap().start_time.unwrap();
        state
            .complete_game(1, [1, 2], [3, 4], start + Duration::minutes(12))
            .unwrap();
        assert_eq!(
            state.completed_games[0].duration(),
            Some(Duration::minutes(12))
        );
    }
}
