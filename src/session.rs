//! Single-writer session dispatcher.
//!
//! A `Session` owns the undo/redo history around the present
//! `SessionState`, resolves planned-game settle timers and feeds every
//! committed state to its persistence. One intent is applied at a time;
//! each runs against a copy that is committed only if the intent succeeds.

use chrono::{DateTime, Utc};

use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::persistence::{NoopPersistence, Persistence};
use crate::state::{ApplyContext, History, Intent, SessionState};

pub struct Session<P: Persistence = NoopPersistence> {
    config: SessionConfig,
    history: History<SessionState>,
    persistence: P,
}

impl Session<NoopPersistence> {
    /// An unstarted, unsaved session.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_persistence(config, NoopPersistence)
    }
}

impl<P: Persistence> Session<P> {
    pub fn with_persistence(config: SessionConfig, persistence: P) -> Self {
        let history = History::with_limit(SessionState::new(), config.history_limit);
        Self {
            config,
            history,
            persistence,
        }
    }

    /// Seed the session from whatever `persistence` has saved.
    ///
    /// A missing, stale or unreadable snapshot yields a fresh session.
    /// History always starts empty.
    pub fn restore(config: SessionConfig, persistence: P) -> Self {
        let mut session = Self::with_persistence(config, persistence);
        match session.persistence.restore() {
            Ok(Some(state)) => {
                log::info!(
                    "Restored session with {} players on {} courts",
                    state.roster.count(),
                    state.courts.count()
                );
                session.history.reset(state);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Could not restore session: {}", e),
        }
        session
    }

    /// Start a session using the configured court and player counts.
    pub fn start(&mut self) -> Result<&SessionState, EngineError> {
        self.dispatch(Intent::StartSession {
            court_count: self.config.court_count,
            player_count: self.config.initial_players,
        })
    }

    pub fn state(&self) -> &SessionState {
        self.history.present()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn dispatch(&mut self, intent: Intent) -> Result<&SessionState, EngineError> {
        self.dispatch_at(intent, Utc::now())
    }

    /// Apply `intent` as of `now`.
    ///
    /// On error the present state is unchanged and nothing is recorded.
    pub fn dispatch_at(
        &mut self,
        intent: Intent,
        now: DateTime<Utc>,
    ) -> Result<&SessionState, EngineError> {
        log::debug!("Dispatching {}", intent.name());

        match intent {
            Intent::Undo => {
                if !self.history.undo() {
                    return Err(EngineError::NothingToUndo);
                }
                self.history.present_mut().clean_selection();
            }
            Intent::Redo => {
                if !self.history.redo() {
                    return Err(EngineError::NothingToRedo);
                }
                self.history.present_mut().clean_selection();
            }
            intent => {
                let ctx = ApplyContext::new(now, self.config.settle_delay(), self.config.max_players);
                let mut next = self.history.present().clone();
                if let Err(e) = intent.apply(&mut next, &ctx) {
                    log::debug!("Rejected {}: {}", intent.name(), e);
                    return Err(e);
                }
                self.check(&next);

                if intent.resets_history() {
                    self.history.reset(next);
                } else if next == *self.history.present() {
                    return Ok(self.history.present());
                } else if intent.is_undoable() {
                    self.history.record(next);
                } else {
                    self.history.replace_present(next);
                }
            }
        }

        self.persist();
        Ok(self.history.present())
    }

    /// Resolve planned-game settle timers due at `now`.
    ///
    /// Timer resolution is not an operator action, so it edits the present
    /// without a history entry. Returns how many games were positioned.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> usize {
        let settled = self.history.present_mut().settle_due(now);
        if settled > 0 {
            log::debug!("Settled {} planned games", settled);
            self.check(self.history.present());
            self.persist();
        }
        settled
    }

    pub fn tick(&mut self) -> usize {
        self.tick_at(Utc::now())
    }

    fn check(&self, state: &SessionState) {
        if !cfg!(debug_assertions) {
            return;
        }
        let result = state.check_invariants();
        if let Err(violation) = &result {
            log::error!("{}", violation);
        }
        debug_assert!(result.is_ok(), "committed an inconsistent session state");
    }

    fn persist(&self) {
        if let Err(e) = self.persistence.persist(self.history.present()) {
            log::warn!("Failed to persist session: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::Duration;

    use super::*;
    use crate::error::PersistError;
    use crate::state::{PlannedPosition, SlotSelection};

    /// Keeps the last persisted state in memory.
    #[derive(Default)]
    struct MemoryPersistence {
        saved: RefCell<Option<SessionState>>,
        writes: RefCell<usize>,
    }

    impl Persistence for MemoryPersistence {
        fn persist(&self, state: &SessionState) -> Result<(), PersistError> {
            *self.saved.borrow_mut() = Some(state.clone());
            *self.writes.borrow_mut() += 1;
            Ok(())
        }

        fn restore(&self) -> Result<Option<SessionState>, PersistError> {
            Ok(self.saved.borrow().clone())
        }
    }

    struct FailingPersistence;

    impl Persistence for FailingPersistence {
        fn persist(&self, _state: &SessionState) -> Result<(), PersistError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }

        fn restore(&self) -> Result<Option<SessionState>, PersistError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into())
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            court_count: 2,
            initial_players: 8,
            settle_delay_ms: 0,
            ..SessionConfig::default()
        }
    }

    fn started() -> Session {
        let mut session = Session::new(config());
        session.start().unwrap();
        session
    }

    #[test]
    fn test_start_uses_config() {
        let session = started();
        assert_eq!(session.state().courts.count(), 2);
        assert_eq!(session.state().roster.count(), 8);
        assert!(!session.can_undo());
    }

    #[test]
    fn test_rejected_intent_leaves_state() {
        let mut session = started();
        let before = session.state().clone();
        let result = session.dispatch(Intent::RotatePairing { court_number: 1 });
        assert!(matches!(result, Err(EngineError::InvalidState(_))));
        assert_eq!(session.state(), &before);
        assert!(!session.can_undo());
    }

    #[test]
    fn test_undo_redo() {
        let mut session = started();
        let before = session.state().clone();
        session
            .dispatch(Intent::AssignToCourt {
                player_id: 1,
                court_number: 1,
            })
            .unwrap();
        let after = session.state().clone();

        session.dispatch(Intent::Undo).unwrap();
        assert_eq!(session.state(), &before);
        session.dispatch(Intent::Redo).unwrap();
        assert_eq!(session.state(), &after);
        assert_eq!(session.dispatch(Intent::Redo), Err(EngineError::NothingToRedo));
    }

    #[test]
    fn test_rename_is_not_recorded() {
        let mut session = started();
        session
            .dispatch(Intent::RenamePlayer {
                player_id: 1,
                name: "Ana".to_string(),
            })
            .unwrap();
        assert!(!session.can_undo());
        assert_eq!(session.state().roster.get(1).unwrap().name, "Ana");
    }

    #[test]
    fn test_start_clears_history() {
        let mut session = started();
        session.dispatch(Intent::AddPlayer).unwrap();
        assert!(session.can_undo());
        session.dispatch(Intent::ResetSession).unwrap();
        assert!(!session.can_undo());
        assert_eq!(session.state(), &SessionState::new());
    }

    #[test]
    fn test_undo_clears_dangling_selection() {
        let mut session = started();
        session.dispatch(Intent::CreatePlannedGame).unwrap();
        let block_id = session.state().selection.unwrap().block_id;
        session
            .dispatch(Intent::SetPlannedSlot {
                block_id,
                slot_index: 0,
                player_id: Some(5),
            })
            .unwrap();

        // creating and filling is undone in one step past the empty state
        session.dispatch(Intent::Undo).unwrap();
        assert!(session.state().queue.get(block_id).is_none());
        assert!(session.state().selection.is_none());
    }

    #[test]
    fn test_tick_settles_planned_game() {
        let mut session = Session::new(SessionConfig {
            settle_delay_ms: 1000,
            ..config()
        });
        session.start().unwrap();
        let now = Utc::now();
        session.dispatch_at(Intent::CreatePlannedGame, now).unwrap();
        let block_id = session.state().selection.unwrap().block_id;
        for (slot_index, player_id) in [5, 6, 7, 8].into_iter().enumerate() {
            session
                .dispatch_at(
                    Intent::SetPlannedSlot {
                        block_id,
                        slot_index,
                        player_id: Some(player_id),
                    },
                    now,
                )
                .unwrap();
        }

        assert_eq!(session.tick_at(now), 0);
        assert_eq!(session.tick_at(now + Duration::seconds(1)), 1);
        let block = session.state().queue.get(block_id).unwrap();
        assert_eq!(block.display_order, Some(0.5));
        assert_eq!(block.position, Some(PlannedPosition::BehindMembers));
    }

    #[test]
    fn test_select_slot_is_not_recorded() {
        let mut session = started();
        session.dispatch(Intent::CreatePlannedGame).unwrap();
        let block_id = session.state().selection.unwrap().block_id;
        let depth_before = session.can_undo();
        session
            .dispatch(Intent::SelectPlannedSlot {
                selection: Some(SlotSelection {
                    block_id,
                    slot_index: 2,
                }),
            })
            .unwrap();
        assert_eq!(session.state().selection.unwrap().slot_index, 2);
        assert_eq!(session.can_undo(), depth_before);
    }

    #[test]
    fn test_persists_after_commit() {
        let mut session = Session::with_persistence(config(), MemoryPersistence::default());
        session.start().unwrap();
        session.dispatch(Intent::AddPlayer).unwrap();
        assert_eq!(*session.persistence().writes.borrow(), 2);

        // rejected intents are not persisted
        let _ = session.dispatch(Intent::RemoveFromCourt { player_id: 1 });
        assert_eq!(*session.persistence().writes.borrow(), 2);

        let saved = session.persistence().saved.borrow().clone();
        assert_eq!(saved.as_ref(), Some(session.state()));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "inconsistent session state")]
    fn test_check_flags_inconsistent_state() {
        let session = started();
        let mut broken = session.state().clone();
        // seated while still listed in the queue
        broken.courts.get_mut(1).unwrap().seat(1, Utc::now()).unwrap();
        session.check(&broken);
    }

    #[test]
    fn test_check_accepts_consistent_state() {
        let session = started();
        session.check(session.state());
    }

    #[test]
    fn test_restore_seeds_state() {
        let store = MemoryPersistence::default();
        let mut state = SessionState::new();
        state.start_session(3, 5, Utc::now()).unwrap();
        store.persist(&state).unwrap();

        let session = Session::restore(config(), store);
        assert_eq!(session.state(), &state);
        assert!(!session.can_undo());
    }

    #[test]
    fn test_persistence_failures_are_swallowed() {
        let mut session = Session::restore(config(), FailingPersistence);
        assert!(!session.state().started);
        session.start().unwrap();
        session.dispatch(Intent::AddPlayer).unwrap();
        assert_eq!(session.state().roster.count(), 9);
    }
}
