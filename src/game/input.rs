//! Input Commands and Queues
//!
//! Commands from any producer (local controller, network transport, bot)
//! land in a per-entity queue in arrival order. Every fixed step drains each
//! queue into one merged input:
//!
//! - movement: the most recent command's vector
//! - action: the FIRST action-flagged command in the batch wins
//!
//! No command outlives the step that drains it.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use crate::core::vec2::Vec2;
use crate::game::state::EntityId;

/// One input sample for one entity.
///
/// Magnitudes are not validated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InputCommand {
    /// Stick vector, each axis nominally in [-1, 1]
    pub movement: Vec2,
    /// Action button pressed
    pub action: bool,
    /// Action strength in [0, 1]
    pub action_power: f64,
    /// Producer-side arrival timestamp (ms)
    pub timestamp_ms: f64,
}

impl InputCommand {
    /// Movement-only command.
    pub const fn movement(x: f64, y: f64) -> Self {
        Self {
            movement: Vec2::new(x, y),
            action: false,
            action_power: 0.0,
            timestamp_ms: 0.0,
        }
    }

    /// Movement plus action.
    pub const fn with_action(x: f64, y: f64, power: f64) -> Self {
        Self {
            movement: Vec2::new(x, y),
            action: true,
            action_power: power,
            timestamp_ms: 0.0,
        }
    }

    /// Set the arrival timestamp.
    pub fn at(mut self, timestamp_ms: f64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

/// Input applied to an entity for one fixed step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MergedInput {
    /// Movement vector (zero when nothing was queued)
    pub movement: Vec2,
    /// Power of the first action in the batch, if any
    pub action_power: Option<f64>,
}

impl MergedInput {
    /// Merge a batch of commands in arrival order.
    pub fn merge(commands: &[InputCommand]) -> Self {
        let movement = commands.last().map(|c| c.movement).unwrap_or(Vec2::ZERO);
        let action_power = commands.iter().find(|c| c.action).map(|c| c.action_power);
        Self { movement, action_power }
    }
}

/// Pending commands per entity.
#[derive(Clone, Debug, Default)]
pub struct InputQueue {
    queues: BTreeMap<EntityId, Vec<InputCommand>>,
}

impl InputQueue {
    /// Empty queue set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command for an entity.
    pub fn push(&mut self, entity: EntityId, command: InputCommand) {
        self.queues.entry(entity).or_default().push(command);
    }

    /// Drain and merge one entity's queue.
    pub fn drain_merged(&mut self, entity: &EntityId) -> MergedInput {
        match self.queues.remove(entity) {
            Some(commands) => MergedInput::merge(&commands),
            None => MergedInput::default(),
        }
    }

    /// Drop one entity's queue.
    pub fn remove(&mut self, entity: &EntityId) {
        self.queues.remove(entity);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.queues.clear();
    }

    /// Commands waiting for an entity.
    pub fn pending(&self, entity: &EntityId) -> usize {
        self.queues.get(entity).map_or(0, Vec::len)
    }

    /// Whether no commands are waiting.
    pub fn is_empty(&self) -> bool {
        self.queues.values().all(Vec::is_empty)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::GroupId;

    fn entity(member: u8) -> EntityId {
        EntityId::new(GroupId::new([7; 16]), member)
    }

    #[test]
    fn test_merge_latest_movement_wins() {
        let merged = MergedInput::merge(&[
            InputCommand::movement(1.0, 0.0),
            InputCommand::movement(0.0, -1.0),
        ]);
        assert_eq!(merged.movement, Vec2::new(0.0, -1.0));
        assert_eq!(merged.action_power, None);
    }

    #[test]
    fn test_merge_first_action_wins() {
        let merged = MergedInput::merge(&[
            InputCommand::movement(1.0, 0.0),
            InputCommand::with_action(1.0, 0.0, 0.25),
            InputCommand::with_action(0.0, 1.0, 0.9),
            InputCommand::movement(-1.0, 0.0),
        ]);
        assert_eq!(merged.action_power, Some(0.25));
        assert_eq!(merged.movement, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn test_empty_batch_is_zero_movement() {
        let merged = MergedInput::merge(&[]);
        assert_eq!(merged, MergedInput::default());
        assert!(merged.movement.is_zero());
    }

    #[test]
    fn test_drain_clears_queue() {
        let mut queue = InputQueue::new();
        queue.push(entity(0), InputCommand::movement(1.0, 1.0).at(5.0));
        queue.push(entity(0), InputCommand::movement(0.5, 0.5).at(6.0));
        queue.push(entity(1), InputCommand::movement(-1.0, 0.0));
        assert_eq!(queue.pending(&entity(0)), 2);

        let merged = queue.drain_merged(&entity(0));
        assert_eq!(merged.movement, Vec2::new(0.5, 0.5));
        assert_eq!(queue.pending(&entity(0)), 0);
        assert_eq!(queue.drain_merged(&entity(0)), MergedInput::default());

        queue.remove(&entity(1));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_magnitude_not_validated() {
        let merged = MergedInput::merge(&[InputCommand::movement(3.0, -7.0)]);
        assert_eq!(merged.movement, Vec2::new(3.0, -7.0));
    }
}
