//! Game Events
//!
//! Events generated during simulation, and the observer hooks fired
//! synchronously from inside `update`.

use serde::{Serialize, Deserialize};
use crate::game::state::{EntityId, GoalSide, MatchPhase, Team};

/// Why the ball changed hands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PossessionReason {
    /// Free ball picked up
    Captured,
    /// Taken by an opponent through the contest
    Contested,
    /// Holder drifted too far from the ball
    Strayed,
    /// Holder shot
    Shot,
    /// Holder left the match
    Removed,
}

/// Goal details handed to observers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalInfo {
    /// Scoring team
    pub team: Team,
    /// Goal the ball entered
    pub side: GoalSide,
    /// Match clock at the moment of the goal
    pub time_remaining_ms: f64,
    /// Team A goals after this one
    pub score_a: u32,
    /// Team B goals after this one
    pub score_b: u32,
}

/// Final result handed to observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    /// Team A goals
    pub score_a: u32,
    /// Team B goals
    pub score_b: u32,
    /// Frame the match ended on
    pub frame: u64,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Match phase changed
    PhaseChanged {
        old_phase: MatchPhase,
        new_phase: MatchPhase,
    },

    /// Ball changed hands (either side may be nobody)
    PossessionChanged {
        from: Option<EntityId>,
        to: Option<EntityId>,
        reason: PossessionReason,
    },

    /// Holder released a shot
    ShotTaken {
        shooter: EntityId,
        power: f64,
        speed: f64,
    },

    /// Goal scored; play is paused
    GoalScored(GoalInfo),

    /// Goal pause over
    PlayResumed,

    /// Match over
    MatchEnded(FinalScore),
}

/// A game event stamped with the frame it happened on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Frame counter when the event occurred
    pub frame: u64,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(frame: u64, data: GameEventData) -> Self {
        Self { frame, data }
    }

    /// Create phase changed event.
    pub fn phase_changed(frame: u64, old_phase: MatchPhase, new_phase: MatchPhase) -> Self {
        Self::new(frame, GameEventData::PhaseChanged { old_phase, new_phase })
    }

    /// Create possession changed event.
    pub fn possession_changed(
        frame: u64,
        from: Option<EntityId>,
        to: Option<EntityId>,
        reason: PossessionReason,
    ) -> Self {
        Self::new(frame, GameEventData::PossessionChanged { from, to, reason })
    }

    /// Create shot event.
    pub fn shot_taken(frame: u64, shooter: EntityId, power: f64, speed: f64) -> Self {
        Self::new(frame, GameEventData::ShotTaken { shooter, power, speed })
    }

    /// Create goal event.
    pub fn goal_scored(frame: u64, goal: GoalInfo) -> Self {
        Self::new(frame, GameEventData::GoalScored(goal))
    }

    /// Create match ended event.
    pub fn match_ended(frame: u64, result: FinalScore) -> Self {
        Self::new(frame, GameEventData::MatchEnded(result))
    }
}

/// Synchronous match callbacks.
///
/// Invoked from inside `MatchEngine::update`. Every call also has a matching
/// [`GameEvent`] in the tick result, so observers are optional.
pub trait MatchObserver {
    /// A goal was scored.
    fn on_goal(&mut self, _goal: &GoalInfo) {}

    /// The match clock ran out.
    fn on_match_end(&mut self, _result: &FinalScore) {}

    /// An entity shot the ball.
    fn on_shot(&mut self, _shooter: EntityId, _power: f64) {}
}
