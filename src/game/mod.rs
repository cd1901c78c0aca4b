//! Game Logic Module
//!
//! All match simulation code. Deterministic under a manual clock.
//!
//! ## Module Structure
//!
//! - `config`: Tuning constants and JSON overrides
//! - `state`: Match state, player and ball entities
//! - `input`: Input commands, per-entity queues, merge policy
//! - `physics`: Player steering, ball friction and bounces, goal detection
//! - `possession`: Magnetism, lockouts, contest strategies, shooting
//! - `tick`: Fixed-timestep match engine
//! - `events`: Game events and observer callbacks
//! - `replay`: Call recording and deterministic re-run

pub mod config;
pub mod state;
pub mod input;
pub mod physics;
pub mod possession;
pub mod tick;
pub mod events;
pub mod replay;

// Re-export key types
pub use config::{ConfigError, ContestKind, MatchConfig};
pub use state::{
    BallEntity, EntityId, GoalSide, GroupId, MatchPhase, MatchSnapshot, MatchState,
    MovementState, PlayerEntity, Role, Team,
};
pub use input::InputCommand;
pub use possession::{ContestStrategy, InstantTackle, PossessionResolver, PressureContest};
pub use tick::{MatchEngine, TickResult};
pub use events::{GameEvent, GameEventData, MatchObserver};
pub use replay::{replay_match, ReplayLog};
