//! Match Recording and Replay
//!
//! A match is fully described by the ordered calls made on the engine and
//! the `delta_ms` of every `update`. Recording those and feeding them to a
//! fresh engine on a manual clock reproduces the final state bit for bit.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::clock::Clock;
use crate::game::config::MatchConfig;
use crate::game::events::GameEvent;
use crate::game::input::InputCommand;
use crate::game::state::{EntityId, GroupId, Team};
use crate::game::tick::MatchEngine;

/// One engine call between updates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReplayAction {
    /// `queue_input`
    Input(EntityId, InputCommand),
    /// `add_entity_set`
    AddGroup {
        /// New group
        group: GroupId,
        /// Its side
        team: Team,
        /// Human controlled
        is_human: bool,
    },
    /// `remove_entity_set`
    RemoveGroup(GroupId),
    /// `assign_control`
    AssignControl(EntityId),
    /// `start`
    Start,
}

/// Calls made before one `update`, plus that update's delta.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    /// Calls in the order they were made
    pub actions: Vec<ReplayAction>,
    /// Argument of the `update` that closed the frame
    pub delta_ms: f64,
}

/// A recorded match.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayLog {
    /// Frames in update order
    pub frames: Vec<ReplayFrame>,
}

impl ReplayLog {
    /// Number of recorded updates.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Collects calls as the engine receives them.
#[derive(Clone, Debug, Default)]
pub struct ReplayRecorder {
    pending: Vec<ReplayAction>,
    log: ReplayLog,
}

impl ReplayRecorder {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a call.
    pub fn record(&mut self, action: ReplayAction) {
        self.pending.push(action);
    }

    /// Close the current frame with the update's delta.
    pub fn end_frame(&mut self, delta_ms: f64) {
        let actions = std::mem::take(&mut self.pending);
        self.log.frames.push(ReplayFrame { actions, delta_ms });
    }

    /// Finish recording. Calls made after the last update land in a
    /// trailing zero-delta frame.
    pub fn finish(mut self) -> ReplayLog {
        if !self.pending.is_empty() {
            self.end_frame(0.0);
        }
        self.log
    }
}

/// Re-run a recorded match on a manual clock.
///
/// Returns the engine in its final state and every event emitted.
pub fn replay_match(config: MatchConfig, log: &ReplayLog) -> (MatchEngine, Vec<GameEvent>) {
    let mut engine = MatchEngine::new(config, Clock::manual());
    let mut events = Vec::new();

    for frame in &log.frames {
        for action in &frame.actions {
            apply_action(&mut engine, action);
        }
        let result = engine.update(frame.delta_ms);
        events.extend(result.events);
    }

    debug!(
        frames = log.len(),
        final_frame = engine.state().frame,
        "replay finished"
    );
    (engine, events)
}

fn apply_action(engine: &mut MatchEngine, action: &ReplayAction) {
    match action {
        ReplayAction::Input(entity, command) => {
            engine.queue_input(*entity, *command);
        }
        ReplayAction::AddGroup { group, team, is_human } => {
            engine.add_entity_set(*group, *team, *is_human);
        }
        ReplayAction::RemoveGroup(group) => {
            engine.remove_entity_set(*group);
        }
        ReplayAction::AssignControl(entity) => {
            engine.assign_control(*entity);
        }
        ReplayAction::Start => {
            engine.start();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::FIXED_STEP_MS;
    use crate::game::state::GROUP_SIZE;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn scripted_match(seed: u64, updates: usize) -> MatchEngine {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut engine = MatchEngine::new(MatchConfig::default(), Clock::manual());
        engine.start_recording();

        let home = GroupId::new([1; 16]);
        let away = GroupId::new([2; 16]);
        engine.add_entity_set(home, Team::A, true);
        engine.add_entity_set(away, Team::B, false);
        engine.start();

        for _ in 0..updates {
            for group in [home, away] {
                for member in 0..GROUP_SIZE {
                    if rng.gen_bool(0.6) {
                        let x = rng.gen_range(-1.0..=1.0);
                        let y = rng.gen_range(-1.0..=1.0);
                        let command = if rng.gen_bool(0.05) {
                            InputCommand::with_action(x, y, rng.gen_range(0.0..=1.0))
                        } else {
                            InputCommand::movement(x, y)
                        };
                        engine.queue_input(EntityId::new(group, member), command);
                    }
                }
            }
            // Jittery host frame times, occasionally a stall.
            let delta = if rng.gen_bool(0.01) {
                rng.gen_range(100.0..400.0)
            } else {
                FIXED_STEP_MS + rng.gen_range(-4.0..4.0)
            };
            engine.update(delta);
        }
        engine
    }

    #[test]
    fn test_replay_reproduces_final_hash() {
        let mut live = scripted_match(7, 600);
        let log = live.take_recording().unwrap();
        assert_eq!(log.len(), 600);

        let (replayed, _) = replay_match(MatchConfig::default(), &log);
        assert_eq!(replayed.state().frame, live.state().frame);
        assert_eq!(replayed.state().compute_hash(), live.state().compute_hash());
    }

    #[test]
    fn test_replay_survives_json() {
        let mut live = scripted_match(11, 200);
        let log = live.take_recording().unwrap();

        let json = log.to_json().unwrap();
        let restored = ReplayLog::from_json(&json).unwrap();
        assert_eq!(restored, log);

        let (first, events1) = replay_match(MatchConfig::default(), &log);
        let (second, events2) = replay_match(MatchConfig::default(), &restored);
        assert_eq!(first.state().compute_hash(), second.state().compute_hash());
        assert_eq!(second.state().compute_hash(), live.state().compute_hash());
        assert_eq!(events1, events2);
    }

    #[test]
    fn test_json_keeps_float_bits() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut recorder = ReplayRecorder::new();
        for _ in 0..2_000 {
            let x: f64 = rng.gen_range(-1.0..=1.0);
            let y: f64 = rng.gen_range(-1.0..=1.0);
            recorder.record(ReplayAction::Input(
                EntityId::new(GroupId::new([1; 16]), 0),
                InputCommand::movement(x, y),
            ));
            recorder.end_frame(FIXED_STEP_MS + rng.gen_range(-4.0..4.0));
        }
        let log = recorder.finish();

        let restored = ReplayLog::from_json(&log.to_json().unwrap()).unwrap();
        for (a, b) in log.frames.iter().zip(&restored.frames) {
            assert_eq!(a.delta_ms.to_bits(), b.delta_ms.to_bits());
        }
        assert_eq!(restored, log);
    }

    #[test]
    fn test_different_inputs_diverge() {
        let a = scripted_match(1, 300);
        let b = scripted_match(2, 300);
        assert_ne!(a.state().compute_hash(), b.state().compute_hash());
    }

    #[test]
    fn test_recorder_trailing_actions() {
        let mut recorder = ReplayRecorder::new();
        recorder.record(ReplayAction::Start);
        recorder.end_frame(16.0);
        recorder.record(ReplayAction::RemoveGroup(GroupId::new([3; 16])));

        let log = recorder.finish();
        assert_eq!(log.len(), 2);
        assert_eq!(log.frames[0].delta_ms, 16.0);
        assert_eq!(log.frames[1].delta_ms, 0.0);
        assert!(!log.is_empty());
    }
}
