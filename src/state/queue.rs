//! Queue block management.
//!
//! The queue is a set of blocks, each an ordered cohort of up to four
//! players sharing an origin. Blocks are rendered and consumed in
//! ascending `display_order`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::player::PlayerId;
use crate::error::EngineError;

/// Monotonic queue block identifier.
pub type BlockId = u64;

/// Players a regular block accepts before it closes.
pub const MAX_BLOCK_PLAYERS: usize = 4;

/// Slots in a planned game.
pub const PLANNED_SLOTS: usize = 4;

/// Sort key for planned games that have no position yet.
const FLOATING_ORDER: f64 = -1.0;

/// Where a block's players came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    NewPlayers,
    GameEnded,
    Returning,
    Substituted,
    PlannedGame,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewPlayers => "new_players",
            Self::GameEnded => "game_ended",
            Self::Returning => "returning",
            Self::Substituted => "substituted",
            Self::PlannedGame => "planned_game",
        }
    }
}

/// How a planned game's queue position was (or will be) decided.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlannedPosition {
    /// Not full yet; floats at the top of the queue
    Floating,
    /// Full; position is computed once `due_at` passes
    Settling { due_at: DateTime<Utc> },
    /// A member was on court; parked behind everyone
    BackOfQueue,
    /// Placed just behind the member who has waited least
    BehindMembers,
}

/// Metadata of a block, kept so the block can be reconstituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockShape {
    pub block_id: BlockId,
    pub kind: BlockKind,
    pub source_court: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub display_order: Option<f64>,
    #[serde(default)]
    pub closed: bool,
}

/// A queue block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueBlock {
    pub id: BlockId,

    pub kind: BlockKind,

    /// Members in arrival order; `None` entries only occur in planned games
    pub player_ids: Vec<Option<PlayerId>>,

    /// Court the players came off, if any
    pub source_court: Option<u32>,

    pub timestamp: DateTime<Utc>,

    /// No longer accepts players opportunistically
    pub closed: bool,

    /// Queue position; `None` only for planned games without a position
    pub display_order: Option<f64>,

    /// Position lifecycle, planned games only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PlannedPosition>,
}

impl QueueBlock {
    /// Create a regular block holding `players`.
    pub fn new(
        id: BlockId,
        kind: BlockKind,
        source_court: Option<u32>,
        players: &[PlayerId],
        display_order: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let mut block = Self {
            id,
            kind,
            player_ids: players.iter().copied().map(Some).collect(),
            source_court,
            timestamp: now,
            closed: kind == BlockKind::GameEnded,
            display_order: Some(display_order),
            position: None,
        };
        block.close_if_full();
        block
    }

    /// Create an empty planned game.
    pub fn planned(id: BlockId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: BlockKind::PlannedGame,
            player_ids: vec![None; PLANNED_SLOTS],
            source_court: None,
            timestamp: now,
            closed: false,
            display_order: None,
            position: Some(PlannedPosition::Floating),
        }
    }

    /// Recreate a block from its shape, holding a single player.
    ///
    /// A block that was closed stays closed, so newcomers cannot join it
    /// at its old place in the queue.
    pub fn from_shape(shape: &BlockShape, player_id: PlayerId) -> Self {
        Self {
            id: shape.block_id,
            kind: shape.kind,
            player_ids: vec![Some(player_id)],
            source_court: shape.source_court,
            timestamp: shape.timestamp,
            closed: shape.closed || shape.kind == BlockKind::GameEnded,
            display_order: shape.display_order,
            position: None,
        }
    }

    pub fn shape(&self) -> BlockShape {
        BlockShape {
            block_id: self.id,
            kind: self.kind,
            source_court: self.source_court,
            timestamp: self.timestamp,
            display_order: self.display_order,
            closed: self.closed,
        }
    }

    pub fn is_planned(&self) -> bool {
        self.kind == BlockKind::PlannedGame
    }

    /// Occupied entries, in slot order.
    pub fn members(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.player_ids.iter().flatten().copied()
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.player_ids.contains(&Some(player_id))
    }

    /// Number of real occupants.
    pub fn len(&self) -> usize {
        self.player_ids.iter().filter(|p| p.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= MAX_BLOCK_PLAYERS
    }

    /// Sort key used to order the queue front to back.
    pub fn sort_key(&self) -> f64 {
        match (self.is_planned(), self.display_order) {
            (true, None) => FLOATING_ORDER,
            (_, order) => order.unwrap_or(0.0),
        }
    }

    fn close_if_full(&mut self) {
        if self.is_full() {
            self.closed = true;
        }
    }

    fn push(&mut self, player_id: PlayerId) {
        self.player_ids.push(Some(player_id));
        self.close_if_full();
    }
}

/// What happened to a block when a player left it.
#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    /// Block still has players
    Remaining,
    /// Block became empty and was deleted
    Deleted(QueueBlock),
}

/// Queue manager - owns every queue block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueManager {
    blocks: BTreeMap<BlockId, QueueBlock>,
    next_block_id: BlockId,
}

impl Default for QueueManager {
    fn default() -> Self {
        Self {
            blocks: BTreeMap::new(),
            next_block_id: 1,
        }
    }
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> BlockId {
        let id = self.next_block_id;
        self.next_block_id += 1;
        id
    }

    /// Highest display order among regular blocks.
    pub fn max_display_order(&self) -> Option<f64> {
        self.blocks
            .values()
            .filter(|b| !b.is_planned())
            .filter_map(|b| b.display_order)
            .max_by(f64::total_cmp)
    }

    /// Display order the next regular block receives.
    pub fn next_display_order(&self) -> f64 {
        self.max_display_order().map_or(0.0, |max| max.floor() + 1.0)
    }

    /// Create a regular block holding `players`, regardless of size.
    pub fn create(
        &mut self,
        kind: BlockKind,
        source_court: Option<u32>,
        players: &[PlayerId],
        now: DateTime<Utc>,
    ) -> BlockId {
        let id = self.allocate_id();
        let order = self.next_display_order();
        self.blocks.insert(
            id,
            QueueBlock::new(id, kind, source_court, players, order, now),
        );
        id
    }

    /// Create an empty planned game.
    pub fn create_planned(&mut self, now: DateTime<Utc>) -> BlockId {
        let id = self.allocate_id();
        self.blocks.insert(id, QueueBlock::planned(id, now));
        id
    }

    /// Put players into the queue, grouped by origin.
    ///
    /// Joins the first open block of the same kind and source court that
    /// has room for all of them, else starts a new block at the back.
    /// Game-ended cohorts always get their own closed block.
    pub fn enqueue(
        &mut self,
        players: &[PlayerId],
        kind: BlockKind,
        source_court: Option<u32>,
        now: DateTime<Utc>,
    ) -> BlockId {
        debug_assert!(!players.is_empty());
        debug_assert!(kind != BlockKind::PlannedGame);

        if kind != BlockKind::GameEnded {
            let target = self
                .ordered()
                .into_iter()
                .find(|b| {
                    !b.closed
                        && b.kind == kind
                        && b.source_court == source_court
                        && b.len() + players.len() <= MAX_BLOCK_PLAYERS
                })
                .map(|b| b.id);

            if let Some(id) = target {
                if let Some(block) = self.blocks.get_mut(&id) {
                    for player_id in players {
                        block.push(*player_id);
                    }
                    return id;
                }
            }
        }

        self.create(kind, source_court, players, now)
    }

    /// Append a player to an existing regular block.
    pub fn append(&mut self, block_id: BlockId, player_id: PlayerId) -> Result<(), EngineError> {
        let block = self.require_mut(block_id)?;
        if block.is_planned() {
            return Err(EngineError::InvalidState("Cannot append to a planned game"));
        }
        block.push(player_id);
        Ok(())
    }

    /// Reconstitute a deleted block around a single returning player.
    pub fn reconstitute(&mut self, shape: &BlockShape, player_id: PlayerId) -> BlockId {
        let mut block = QueueBlock::from_shape(shape, player_id);
        if block.display_order.is_none() {
            block.display_order = Some(self.next_display_order());
        }
        self.next_block_id = self.next_block_id.max(shape.block_id + 1);
        self.blocks.insert(block.id, block);
        shape.block_id
    }

    /// Take a player out of a block, deleting the block if it empties.
    ///
    /// Planned games keep their slot layout; the slot is cleared and the
    /// game reopens.
    pub fn remove_player(
        &mut self,
        block_id: BlockId,
        player_id: PlayerId,
    ) -> Result<Removal, EngineError> {
        let block = self.require_mut(block_id)?;
        if !block.contains(player_id) {
            return Err(EngineError::InvalidState("Player is not in that queue block"));
        }

        if block.is_planned() {
            for slot in block.player_ids.iter_mut() {
                if *slot == Some(player_id) {
                    *slot = None;
                }
            }
            block.closed = false;
            block.display_order = None;
            block.position = Some(PlannedPosition::Floating);
        } else {
            block.player_ids.retain(|p| *p != Some(player_id));
        }

        if block.is_empty() {
            let removed = self.blocks.remove(&block_id);
            return Ok(removed.map_or(Removal::Remaining, Removal::Deleted));
        }
        Ok(Removal::Remaining)
    }

    /// Delete a block outright.
    pub fn remove(&mut self, block_id: BlockId) -> Option<QueueBlock> {
        self.blocks.remove(&block_id)
    }

    pub fn get(&self, block_id: BlockId) -> Option<&QueueBlock> {
        self.blocks.get(&block_id)
    }

    pub fn get_mut(&mut self, block_id: BlockId) -> Option<&mut QueueBlock> {
        self.blocks.get_mut(&block_id)
    }

    pub fn require(&self, block_id: BlockId) -> Result<&QueueBlock, EngineError> {
        self.blocks
            .get(&block_id)
            .ok_or(EngineError::BlockNotFound(block_id))
    }

    pub fn require_mut(&mut self, block_id: BlockId) -> Result<&mut QueueBlock, EngineError> {
        self.blocks
            .get_mut(&block_id)
            .ok_or(EngineError::BlockNotFound(block_id))
    }

    pub fn blocks(&self) -> impl Iterator<Item = &QueueBlock> {
        self.blocks.values()
    }

    pub fn planned(&self) -> impl Iterator<Item = &QueueBlock> {
        self.blocks.values().filter(|b| b.is_planned())
    }

    /// Ids of planned games listing `player_id`.
    pub fn planned_containing(&self, player_id: PlayerId) -> Vec<BlockId> {
        self.planned()
            .filter(|b| b.contains(player_id))
            .map(|b| b.id)
            .collect()
    }

    /// Blocks front to back.
    pub fn ordered(&self) -> Vec<&QueueBlock> {
        let mut blocks: Vec<&QueueBlock> = self.blocks.values().collect();
        blocks.sort_by(|a, b| a.sort_key().total_cmp(&b.sort_key()).then(a.id.cmp(&b.id)));
        blocks
    }

    pub fn count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_first_block_order_is_zero() {
        let mut queue = QueueManager::new();
        let id = queue.enqueue(&[1], BlockKind::NewPlayers, None, now());
        assert_eq!(id, 1);
        assert_eq!(queue.get(id).unwrap().display_order, Some(0.0));
    }

    #[test]
    fn test_enqueue_joins_open_block_of_same_origin() {
        let mut queue = QueueManager::new();
        let first = queue.enqueue(&[1, 2], BlockKind::Returning, None, now());
        let second = queue.enqueue(&[3], BlockKind::Returning, None, now());
        assert_eq!(first, second);

        // different origin starts a new block
        let other = queue.enqueue(&[4], BlockKind::Substituted, Some(2), now());
        assert_ne!(other, first);
        assert_eq!(queue.get(other).unwrap().display_order, Some(1.0));
    }

    #[test]
    fn test_block_closes_at_four() {
        let mut queue = QueueManager::new();
        let id = queue.enqueue(&[1, 2, 3], BlockKind::Returning, None, now());
        assert!(!queue.get(id).unwrap().closed);

        queue.enqueue(&[4], BlockKind::Returning, None, now());
        assert!(queue.get(id).unwrap().closed);

        let next = queue.enqueue(&[5], BlockKind::Returning, None, now());
        assert_ne!(next, id);
    }

    #[test]
    fn test_enqueue_respects_room() {
        let mut queue = QueueManager::new();
        let id = queue.enqueue(&[1, 2, 3], BlockKind::Returning, None, now());
        let next = queue.enqueue(&[4, 5], BlockKind::Returning, None, now());
        assert_ne!(id, next);
        assert_eq!(queue.get(id).unwrap().len(), 3);
    }

    #[test]
    fn test_game_ended_block_is_closed_and_never_shared() {
        let mut queue = QueueManager::new();
        let a = queue.enqueue(&[1, 2], BlockKind::GameEnded, Some(1), now());
        let b = queue.enqueue(&[3], BlockKind::GameEnded, Some(1), now());
        assert_ne!(a, b);
        assert!(queue.get(a).unwrap().closed);
    }

    #[test]
    fn test_remove_player_deletes_empty_block() {
        let mut queue = QueueManager::new();
        let id = queue.enqueue(&[1, 2], BlockKind::NewPlayers, None, now());

        assert_eq!(queue.remove_player(id, 1).unwrap(), Removal::Remaining);
        match queue.remove_player(id, 2).unwrap() {
            Removal::Deleted(block) => assert_eq!(block.id, id),
            other => panic!("expected deletion, got {:?}", other),
        }
        assert!(queue.get(id).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_player_errors() {
        let mut queue = QueueManager::new();
        let id = queue.enqueue(&[1], BlockKind::NewPlayers, None, now());
        assert_eq!(
            queue.remove_player(99, 1),
            Err(EngineError::BlockNotFound(99))
        );
        assert!(matches!(
            queue.remove_player(id, 5),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn test_planned_removal_keeps_slots() {
        let mut queue = QueueManager::new();
        let id = queue.create_planned(now());
        {
            let block = queue.get_mut(id).unwrap();
            block.player_ids = vec![Some(1), Some(2), Some(3), Some(4)];
            block.closed = true;
        }
        queue.remove_player(id, 2).unwrap();
        let block = queue.get(id).unwrap();
        assert_eq!(block.player_ids, vec![Some(1), None, Some(3), Some(4)]);
        assert!(!block.closed);
        assert_eq!(block.position, Some(PlannedPosition::Floating));
    }

    #[test]
    fn test_display_order_skips_planned_games() {
        let mut queue = QueueManager::new();
        queue.enqueue(&[1], BlockKind::NewPlayers, None, now());
        let planned = queue.create_planned(now());
        queue.get_mut(planned).unwrap().display_order = Some(0.5);
        assert_eq!(queue.next_display_order(), 1.0);
    }

    #[test]
    fn test_ordered_puts_floating_planned_first() {
        let mut queue = QueueManager::new();
        let a = queue.enqueue(&[1], BlockKind::NewPlayers, None, now());
        let b = queue.enqueue(&[2], BlockKind::GameEnded, Some(1), now());
        let p = queue.create_planned(now());

        let ids: Vec<BlockId> = queue.ordered().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![p, a, b]);

        queue.get_mut(p).unwrap().display_order = Some(0.5);
        let ids: Vec<BlockId> = queue.ordered().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![a, p, b]);
    }

    #[test]
    fn test_reconstitute_restores_shape() {
        let mut queue = QueueManager::new();
        let id = queue.enqueue(&[1], BlockKind::GameEnded, Some(3), now());
        queue.enqueue(&[2], BlockKind::NewPlayers, None, now());
        let shape = queue.get(id).unwrap().shape();

        queue.remove_player(id, 1).unwrap();
        let restored = queue.reconstitute(&shape, 1);

        let block = queue.get(restored).unwrap();
        assert_eq!(block.id, id);
        assert_eq!(block.source_court, Some(3));
        assert_eq!(block.display_order, Some(0.0));
        assert_eq!(queue.ordered()[0].id, id);
    }

    #[test]
    fn test_reconstituted_closed_block_stays_closed() {
        let mut queue = QueueManager::new();
        let id = queue.enqueue(&[1, 2, 3, 4], BlockKind::NewPlayers, None, now());
        queue.enqueue(&[5], BlockKind::GameEnded, Some(1), now());
        let shape = queue.get(id).unwrap().shape();
        assert!(shape.closed);

        for player_id in 1..=4 {
            queue.remove_player(id, player_id).unwrap();
        }
        queue.reconstitute(&shape, 1);
        assert!(queue.get(id).unwrap().closed);

        // a newcomer starts a block at the back instead of joining the front
        let newcomer = queue.enqueue(&[9], BlockKind::NewPlayers, None, now());
        assert_ne!(newcomer, id);
        assert_eq!(queue.get(newcomer).unwrap().display_order, Some(2.0));
    }
}
