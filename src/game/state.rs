//! Game State Definitions
//!
//! All state types for match simulation.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::core::hash::{StateHash, StateHasher, compute_state_hash};
use crate::game::config::FieldConfig;
use crate::game::events::GameEvent;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Roster group identifier (UUID as bytes).
///
/// One group is one roster-add call: a primary entity and two auxiliaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct GroupId(pub [u8; 16]);

impl GroupId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Random group id for callers without their own identity scheme.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Short hex prefix for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

/// Stable entity identifier: owning group plus member index (0..3).
///
/// Ordered by group, then member, so arena iteration is deterministic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId {
    /// Owning group
    pub group: GroupId,
    /// Member index within the group; 0 is the primary
    pub member: u8,
}

impl EntityId {
    /// Create an entity id.
    pub const fn new(group: GroupId, member: u8) -> Self {
        Self { group, member }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.group.short(), self.member)
    }
}

/// Entities created per roster-add call.
pub const GROUP_SIZE: u8 = 3;

// =============================================================================
// TEAMS & ROLES
// =============================================================================

/// Team side. `A` defends the left goal, `B` the right one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    /// Left side
    A,
    /// Right side
    B,
}

impl Team {
    /// The other team.
    pub fn opponent(self) -> Team {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }

    /// Facing at kickoff: toward the opponent goal.
    pub fn attack_angle(self) -> f64 {
        match self {
            Team::A => 0.0,
            Team::B => PI,
        }
    }
}

/// Goal mouth on one end of the field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalSide {
    /// x = 0 end, defended by team A
    Left,
    /// x = width end, defended by team B
    Right,
}

impl GoalSide {
    /// Team credited when the ball enters this goal.
    pub fn scoring_team(self) -> Team {
        match self {
            GoalSide::Left => Team::B,
            GoalSide::Right => Team::A,
        }
    }
}

/// Tag for external decision layers. The simulation never reads it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Primary entity of a group
    Forward,
    /// First auxiliary
    Midfielder,
    /// Second auxiliary
    Defender,
}

impl Role {
    /// Role by member index.
    pub fn for_member(member: u8) -> Role {
        match member {
            0 => Role::Forward,
            1 => Role::Midfielder,
            _ => Role::Defender,
        }
    }
}

/// Movement animation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MovementState {
    /// Not moving
    #[default]
    Idle,
    /// Moving under input
    Running,
    /// Kick animation lock active
    Kicking,
}

// =============================================================================
// FORMATION
// =============================================================================

/// Team A kickoff spots as fractions of the field, indexed by squad slot.
const FORMATION: [(f64, f64); 6] = [
    (0.40, 0.50), // forward
    (0.28, 0.30),
    (0.28, 0.70),
    (0.15, 0.50),
    (0.42, 0.22),
    (0.42, 0.78),
];

/// Kickoff position for a squad slot. Pure function of (team, slot).
///
/// Slots beyond the table reuse it, stepped back toward the own goal.
/// Team B mirrors team A across the halfway line.
pub fn formation_position(team: Team, slot: u16, field: &FieldConfig) -> Vec2 {
    let (fx, fy) = FORMATION[slot as usize % FORMATION.len()];
    let wrap = (slot as usize / FORMATION.len()) as f64;
    let fx = (fx - 0.06 * wrap).max(0.05);

    let x = fx * field.width;
    let y = fy * field.height;
    match team {
        Team::A => Vec2::new(x, y),
        Team::B => Vec2::new(field.width - x, y),
    }
}

// =============================================================================
// PLAYER ENTITY
// =============================================================================

/// State of a single player-controlled body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntity {
    /// Stable id
    pub id: EntityId,
    /// Team side
    pub team: Team,
    /// Owned by a human (presentation only)
    pub is_human: bool,
    /// Currently steered entity of its group (presentation only)
    pub is_controlled: bool,
    /// Team-wide formation slot
    pub squad_slot: u16,
    /// Position (px)
    pub position: Vec2,
    /// Velocity (px/s)
    pub velocity: Vec2,
    /// Facing angle (radians)
    pub facing: f64,
    /// Animation state
    pub movement: MovementState,
    /// Clock time until which the kick animation lock holds
    pub kicking_until_ms: f64,
    /// Decision-layer tag
    pub role: Option<Role>,
}

impl PlayerEntity {
    /// Create a player at its kickoff spot.
    pub fn new(id: EntityId, team: Team, squad_slot: u16, is_human: bool, field: &FieldConfig) -> Self {
        Self {
            id,
            team,
            is_human,
            is_controlled: false,
            squad_slot,
            position: formation_position(team, squad_slot, field),
            velocity: Vec2::ZERO,
            facing: team.attack_angle(),
            movement: MovementState::Idle,
            kicking_until_ms: 0.0,
            role: Some(Role::for_member(id.member)),
        }
    }

    /// Unit vector along the facing angle.
    #[inline]
    pub fn facing_dir(&self) -> Vec2 {
        Vec2::from_angle(self.facing)
    }

    /// Hash this player's state for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_bytes(&self.id.group.0);
        hasher.update_u8(self.id.member);
        hasher.update_u8(self.team as u8);
        hasher.update_bool(self.is_human);
        hasher.update_bool(self.is_controlled);
        hasher.update_u32(self.squad_slot as u32);
        hasher.update_vec2(self.position);
        hasher.update_vec2(self.velocity);
        hasher.update_f64(self.facing);
        hasher.update_u8(self.movement as u8);
        hasher.update_f64(self.kicking_until_ms);
    }
}

// =============================================================================
// BALL ENTITY
// =============================================================================

/// The match ball.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BallEntity {
    /// Position (px)
    pub position: Vec2,
    /// Velocity (px/s)
    pub velocity: Vec2,
    /// Current holder, if any
    pub possessor: Option<EntityId>,
    /// Contest meter in [0, 1]; zero whenever the ball is free
    pub pressure: f64,
    /// Clock time of the last shot
    pub last_shot_ms: Option<f64>,
    /// Entity that took the last shot
    pub last_shooter: Option<EntityId>,
    /// Frozen inside a goal until reset
    pub in_goal: bool,
}

impl BallEntity {
    /// Free, motionless ball at `position`.
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            possessor: None,
            pressure: 0.0,
            last_shot_ms: None,
            last_shooter: None,
            in_goal: false,
        }
    }

    /// Whether nobody holds the ball.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.possessor.is_none()
    }

    /// Hash ball state for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_vec2(self.position);
        hasher.update_vec2(self.velocity);
        match self.possessor {
            Some(id) => {
                hasher.update_u8(1);
                hasher.update_bytes(&id.group.0);
                hasher.update_u8(id.member);
            }
            None => hasher.update_u8(0),
        }
        hasher.update_f64(self.pressure);
        hasher.update_opt_f64(self.last_shot_ms);
        match self.last_shooter {
            Some(id) => {
                hasher.update_u8(1);
                hasher.update_bytes(&id.group.0);
                hasher.update_u8(id.member);
            }
            None => hasher.update_u8(0),
        }
        hasher.update_bool(self.in_goal);
    }
}

// =============================================================================
// MATCH PHASE
// =============================================================================

/// Current phase of the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Default)]
pub enum MatchPhase {
    /// Waiting for the roster
    #[default]
    Waiting,
    /// Active gameplay
    Playing,
    /// Match over; state frozen
    Ended,
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Complete state of a match.
///
/// Uses BTreeMap for deterministic iteration order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchState {
    /// Deterministic fixed-step counter
    pub frame: u64,

    /// Current match phase
    pub phase: MatchPhase,

    /// All players (BTreeMap for deterministic iteration)
    #[serde(with = "players_as_seq")]
    pub players: BTreeMap<EntityId, PlayerEntity>,

    /// The ball
    pub ball: BallEntity,

    /// Team A goals
    pub score_a: u32,

    /// Team B goals
    pub score_b: u32,

    /// Match clock remaining
    pub time_remaining_ms: f64,

    /// Events generated since the last drain
    #[serde(skip)]
    pub pending_events: Vec<GameEvent>,
}

impl MatchState {
    /// Create an empty match with the ball at centre.
    pub fn new(field: &FieldConfig, match_duration_ms: f64) -> Self {
        Self {
            frame: 0,
            phase: MatchPhase::Waiting,
            players: BTreeMap::new(),
            ball: BallEntity::new(field.center()),
            score_a: 0,
            score_b: 0,
            time_remaining_ms: match_duration_ms,
            pending_events: Vec::new(),
        }
    }

    /// Get a player by ID.
    pub fn get_player(&self, id: &EntityId) -> Option<&PlayerEntity> {
        self.players.get(id)
    }

    /// Get a player mutably by ID.
    pub fn get_player_mut(&mut self, id: &EntityId) -> Option<&mut PlayerEntity> {
        self.players.get_mut(id)
    }

    /// Players on one team, in id order.
    pub fn players_on(&self, team: Team) -> impl Iterator<Item = &PlayerEntity> {
        self.players.values().filter(move |p| p.team == team)
    }

    /// Members of a group, in member order.
    pub fn group_members(&self, group: GroupId) -> impl Iterator<Item = &PlayerEntity> {
        self.players.values().filter(move |p| p.id.group == group)
    }

    /// Score for one team.
    pub fn score(&self, team: Team) -> u32 {
        match team {
            Team::A => self.score_a,
            Team::B => self.score_b,
        }
    }

    /// Credit a goal.
    pub fn add_goal(&mut self, team: Team) {
        match team {
            Team::A => self.score_a += 1,
            Team::B => self.score_b += 1,
        }
    }

    /// Check if match has ended.
    pub fn is_ended(&self) -> bool {
        matches!(self.phase, MatchPhase::Ended)
    }

    /// Owned copy for decision layers and presentation.
    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            frame: self.frame,
            phase: self.phase,
            score_a: self.score_a,
            score_b: self.score_b,
            time_remaining_ms: self.time_remaining_ms,
            team_a: self.players_on(Team::A).cloned().collect(),
            team_b: self.players_on(Team::B).cloned().collect(),
            ball: self.ball.clone(),
        }
    }

    /// Compute hash of current state for verification.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.frame, |hasher| {
            hasher.update_u8(self.phase as u8);
            hasher.update_u32(self.score_a);
            hasher.update_u32(self.score_b);
            hasher.update_f64(self.time_remaining_ms);

            // Hash all players in sorted order (BTreeMap guarantees this)
            for player in self.players.values() {
                player.hash_into(hasher);
            }

            self.ball.hash_into(hasher);
        })
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Push a game event.
    pub fn push_event(&mut self, event: GameEvent) {
        self.pending_events.push(event);
    }
}

/// Players serialize as a list; JSON map keys must be strings.
mod players_as_seq {
    use std::collections::BTreeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use super::{EntityId, PlayerEntity};

    pub fn serialize<S: Serializer>(
        players: &BTreeMap<EntityId, PlayerEntity>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(players.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<EntityId, PlayerEntity>, D::Error> {
        let players = Vec::<PlayerEntity>::deserialize(deserializer)?;
        Ok(players.into_iter().map(|p| (p.id, p)).collect())
    }
}

/// Read-only copy of the match for external consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// Frame counter
    pub frame: u64,
    /// Phase
    pub phase: MatchPhase,
    /// Team A goals
    pub score_a: u32,
    /// Team B goals
    pub score_b: u32,
    /// Match clock remaining
    pub time_remaining_ms: f64,
    /// Team A players, in id order
    pub team_a: Vec<PlayerEntity>,
    /// Team B players, in id order
    pub team_b: Vec<PlayerEntity>,
    /// Ball
    pub ball: BallEntity,
}

// =============================================================================
// TESTS
// =============================================================================
