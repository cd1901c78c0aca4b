//! Core deterministic primitives.
//!
//! Vector math, the injectable clock, and state hashing. Nothing here reads
//! wall time except through [`clock::MonotonicSource`].

pub mod vec2;
pub mod clock;
pub mod hash;

// Re-export core types
pub use vec2::Vec2;
pub use clock::{Clock, ClockError, ClockMode, MonotonicSource, TimerToken};
pub use hash::{StateHash, StateHasher, compute_state_hash};
