//! Court Queue State Library
//!
//! This crate provides state management for running a badminton club
//! night: several doubles courts fed from one shared waiting queue.
//!
//! # Overview
//!
//! The state module provides:
//!
//! - **Player State Machine** - Tracks where each player is (on a court, in
//!   a queue block, on the bench) with validated transitions.
//!
//! - **Queue Blocks** - Players wait in cohorts of up to four, grouped by
//!   where they came from (new arrivals, a finished game, a substitution).
//!
//! - **Courts** - Four slots per court, the three doubles pairings, and the
//!   priority court that should be filled next.
//!
//! - **Planned Games** - Operator-curated matchups that take a fair place in
//!   the queue and can be sent to an empty court in one step.
//!
//! - **History** - Snapshot undo/redo of operator actions.
//!
//! # Design Principles
//!
//! 1. **Intents in, snapshots out** - Every operator action is an `Intent`;
//!    a rejected intent leaves the state exactly as it was.
//!
//! 2. **Managers provide indexed access** - Look up by player id, court
//!    number or block id. Relations are stored as ids only.
//!
//! 3. **No UI, no storage** - Persistence is a trait the host supplies.
//!
//! 4. **Serialization-ready** - All state converts to JSON for clients.
//!
//! # Example
//!
//! ```rust
//! use court_queue_state::{Intent, Session, SessionConfig};
//!
//! let mut session = Session::new(SessionConfig::default());
//! session
//!     .dispatch(Intent::StartSession { court_count: 2, player_count: 8 })
//!     .unwrap();
//!
//! for player_id in 1..=4 {
//!     session
//!         .dispatch(Intent::AssignToCourt { player_id, court_number: 1 })
//!         .unwrap();
//! }
//!
//! let state = session
//!     .dispatch(Intent::CompleteGame {
//!         court_number: 1,
//!         winning_pair: [1, 2],
//!         losing_pair: [3, 4],
//!     })
//!     .unwrap();
//! assert!(state.courts.get(1).unwrap().is_empty());
//!
//! session.dispatch(Intent::Undo).unwrap();
//! assert!(session.state().courts.get(1).unwrap().is_full());
//! ```

pub mod config;
pub mod error;
pub mod persistence;
pub mod session;
pub mod state;

pub use config::SessionConfig;
pub use error::{EngineError, PersistError};
pub use persistence::{JsonFilePersistence, NoopPersistence, Persistence};
pub use session::Session;

// Re-export everything from state module at crate root
pub use state::*;
