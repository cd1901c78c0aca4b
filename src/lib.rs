//! # Goalrush Match Core
//!
//! Authoritative, deterministic simulation for a 3-a-side style team sports
//! match. The same engine runs on the locally rendered client and on the
//! network-authoritative server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      GOALRUSH CORE                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Deterministic primitives                │
//! │  ├── vec2.rs       - 2D vector math                          │
//! │  ├── clock.rs      - Injectable real/scaled/manual clock     │
//! │  └── hash.rs       - State hashing for verification          │
//! │                                                              │
//! │  game/             - Match logic                             │
//! │  ├── config.rs     - Tuning and JSON overrides               │
//! │  ├── state.rs      - Match, player and ball state            │
//! │  ├── input.rs      - Input queues and merge policy           │
//! │  ├── physics.rs    - Movement, friction, bounces, goals      │
//! │  ├── possession.rs - Lockouts, contests, shooting            │
//! │  ├── tick.rs       - Fixed-timestep match engine             │
//! │  ├── events.rs     - Events and observer callbacks           │
//! │  └── replay.rs     - Recording and re-run                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! Given a manual [`Clock`], two engines fed identical calls and identical
//! `update` deltas reach bit-identical state:
//! - No HashMap (BTreeMap for sorted iteration)
//! - Wall time only through the injected clock
//! - No randomness
//!
//! [`MatchState::compute_hash`] fingerprints state for cross-checking.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;

// Re-export commonly used types
pub use crate::core::clock::{Clock, ClockMode};
pub use crate::core::vec2::Vec2;
pub use game::config::MatchConfig;
pub use game::input::InputCommand;
pub use game::state::{EntityId, GroupId, MatchState, Team};
pub use game::tick::{MatchEngine, TickResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
