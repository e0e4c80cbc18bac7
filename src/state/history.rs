//! Snapshot undo/redo.
//!
//! Every undoable change pushes the previous state onto `past`. Undo and
//! redo swap whole snapshots; nothing is re-derived.
//!
//! Both stacks are kept in chronological order: the back of `past` is the
//! state just before `present`, the front of `future` is the state just
//! after it.
//!
//! Transient snapshots (a planned game that exists but has no players)
//! are stepped over, since the engine sweeps such games on the next
//! action anyway.

use std::collections::VecDeque;

use super::SessionState;

/// How many past snapshots are kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// A value the history can store.
pub trait Snapshot: Clone {
    /// Whether undo/redo should step over this snapshot.
    fn is_transient(&self) -> bool {
        false
    }
}

impl Snapshot for SessionState {
    fn is_transient(&self) -> bool {
        self.has_empty_planned_game()
    }
}

/// Bounded undo/redo history around a present value.
#[derive(Debug, Clone)]
pub struct History<S: Snapshot> {
    past: VecDeque<S>,
    present: S,
    future: VecDeque<S>,
    limit: usize,
}

impl<S: Snapshot> History<S> {
    pub fn new(present: S) -> Self {
        Self::with_limit(present, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limit(present: S, limit: usize) -> Self {
        Self {
            past: VecDeque::new(),
            present,
            future: VecDeque::new(),
            limit,
        }
    }

    pub fn present(&self) -> &S {
        &self.present
    }

    pub fn present_mut(&mut self) -> &mut S {
        &mut self.present
    }

    /// Make `next` the present, remembering the old present.
    ///
    /// Clears the redo stack. The oldest snapshot is dropped once the
    /// limit is reached.
    pub fn record(&mut self, next: S) {
        let previous = std::mem::replace(&mut self.present, next);
        self.past.push_back(previous);
        while self.past.len() > self.limit {
            self.past.pop_front();
        }
        self.future.clear();
    }

    /// Overwrite the present without touching either stack.
    pub fn replace_present(&mut self, next: S) {
        self.present = next;
    }

    /// Forget everything and start over from `present`.
    pub fn reset(&mut self, present: S) {
        self.past.clear();
        self.future.clear();
        self.present = present;
    }

    /// Step back to the most recent stable snapshot.
    ///
    /// If every past snapshot is transient, steps back exactly one.
    /// Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let stable = match self.past.iter().rposition(|s| !s.is_transient()) {
            Some(index) => index,
            None => match self.past.len().checked_sub(1) {
                Some(index) => index,
                None => return false,
            },
        };

        // past: [.. target, skipped...]
        let skipped: Vec<S> = self.past.drain(stable + 1..).collect();
        let target = match self.past.pop_back() {
            Some(target) => target,
            None => return false,
        };

        let previous = std::mem::replace(&mut self.present, target);
        self.future.push_front(previous);
        for state in skipped.into_iter().rev() {
            self.future.push_front(state);
        }
        true
    }

    /// Step forward to the next stable snapshot.
    ///
    /// If every future snapshot is transient, steps forward exactly one.
    /// Returns false when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let stable = match self.future.iter().position(|s| !s.is_transient()) {
            Some(index) => index,
            None if self.future.is_empty() => return false,
            None => 0,
        };

        // future: [skipped..., target, ..]
        let skipped: Vec<S> = self.future.drain(..stable).collect();
        let target = match self.future.pop_front() {
            Some(target) => target,
            None => return false,
        };

        let previous = std::mem::replace(&mut self.present, target);
        self.past.push_back(previous);
        self.past.extend(skipped);
        while self.past.len() > self.limit {
            self.past.pop_front();
        }
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }
}
