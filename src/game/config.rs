//! Match Configuration
//!
//! All tuning constants in one place. `Default` carries the canonical values;
//! a JSON file may override any subset of them.
//!
//! Units: pixels, px/s, milliseconds.

use std::path::Path;
use serde::{Serialize, Deserialize};

// =============================================================================
// CANONICAL CONSTANTS
// =============================================================================

/// Simulation step: 1/60 second.
pub const FIXED_STEP_MS: f64 = 1000.0 / 60.0;

/// Maximum fixed steps executed by a single `update` call.
pub const MAX_STEPS_PER_UPDATE: u32 = 5;

/// Default match length: 3 minutes.
pub const MATCH_DURATION_MS: f64 = 180_000.0;

/// Freeze after a goal before play resumes.
pub const GOAL_PAUSE_MS: f64 = 2_000.0;

/// Field geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Field width (x in [0, width])
    pub width: f64,
    /// Field height (y in [0, height])
    pub height: f64,
    /// Lower y of both goal mouths
    pub goal_mouth_min_y: f64,
    /// Upper y of both goal mouths
    pub goal_mouth_max_y: f64,
    /// Player body radius, used for field clamping
    pub player_radius: f64,
    /// Ball radius
    pub ball_radius: f64,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
            goal_mouth_min_y: 360.0,
            goal_mouth_max_y: 720.0,
            player_radius: 15.0,
            ball_radius: 8.0,
        }
    }
}

impl FieldConfig {
    /// Field centre.
    pub fn center(&self) -> crate::core::vec2::Vec2 {
        crate::core::vec2::Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Whether `y` lies within the goal mouth.
    #[inline]
    pub fn in_goal_mouth(&self, y: f64) -> bool {
        y >= self.goal_mouth_min_y && y <= self.goal_mouth_max_y
    }
}

/// Movement and ball physics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Player top speed (px/s) at full stick deflection
    pub max_player_speed: f64,
    /// Fraction of the velocity gap closed per step
    pub inertia_blend: f64,
    /// Stick magnitude below which input counts as idle
    pub movement_deadzone: f64,
    /// Ball velocity multiplier per step
    pub ball_friction: f64,
    /// Ball speed (px/s) below which the ball stops dead
    pub ball_stop_speed: f64,
    /// Fraction of perpendicular speed kept on a wall bounce
    pub wall_restitution: f64,
    /// Shot speed at power 0
    pub min_shot_speed: f64,
    /// Shot speed at power 1
    pub max_shot_speed: f64,
    /// Kick animation lock
    pub kick_animation_ms: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            max_player_speed: 250.0,
            inertia_blend: 0.15,
            movement_deadzone: 0.1,
            ball_friction: 0.98,
            ball_stop_speed: 1.0,
            wall_restitution: 0.8,
            min_shot_speed: 300.0,
            max_shot_speed: 900.0,
            kick_animation_ms: 300.0,
        }
    }
}

/// Which contest model decides dispossession.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContestKind {
    /// Opponent proximity fills a 0..1 meter; full meter transfers the ball.
    #[default]
    Pressure,
    /// Nearest opponent in range takes the ball as soon as lockouts allow.
    InstantTackle,
}

/// Possession tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PossessionConfig {
    /// Max player-ball distance for a capture
    pub capture_radius: f64,
    /// Holder-ball distance beyond which possession is lost
    pub release_distance: f64,
    /// Distance in front of the holder where the ball is pinned
    pub dribble_offset: f64,
    /// Fresh holder immunity
    pub capture_lockout_ms: f64,
    /// Recapture ban after losing the ball
    pub loss_lockout_ms: f64,
    /// Recapture ban on your own shot
    pub shot_immunity_ms: f64,
    /// Opponents inside this radius add pressure
    pub pressure_radius: f64,
    /// Pressure gained per second per pressing opponent
    pub pressure_buildup_per_sec: f64,
    /// Pressure lost per second with nobody pressing
    pub pressure_decay_per_sec: f64,
    /// Instant tackle reach
    pub tackle_radius: f64,
    /// Contest model
    pub contest: ContestKind,
}

impl Default for PossessionConfig {
    fn default() -> Self {
        Self {
            capture_radius: 30.0,
            release_distance: 60.0,
            dribble_offset: 20.0,
            capture_lockout_ms: 300.0,
            loss_lockout_ms: 300.0,
            shot_immunity_ms: 300.0,
            pressure_radius: 40.0,
            pressure_buildup_per_sec: 2.0,
            pressure_decay_per_sec: 1.0,
            tackle_radius: 30.0,
            contest: ContestKind::Pressure,
        }
    }
}

/// Configuration for match simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Field geometry
    pub field: FieldConfig,
    /// Movement and ball physics
    pub physics: PhysicsConfig,
    /// Possession tuning
    pub possession: PossessionConfig,
    /// Length of one fixed step
    pub fixed_step_ms: f64,
    /// Step cap per `update`
    pub max_steps_per_update: u32,
    /// Match length
    pub match_duration_ms: f64,
    /// Freeze after a goal
    pub goal_pause_ms: f64,
    /// Entity groups required before `start()` is accepted
    pub min_groups_to_start: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            field: FieldConfig::default(),
            physics: PhysicsConfig::default(),
            possession: PossessionConfig::default(),
            fixed_step_ms: FIXED_STEP_MS,
            max_steps_per_update: MAX_STEPS_PER_UPDATE,
            match_duration_ms: MATCH_DURATION_MS,
            goal_pause_ms: GOAL_PAUSE_MS,
            min_groups_to_start: 2,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for `MatchConfig`.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}

impl MatchConfig {
    /// Fixed step length in seconds.
    #[inline]
    pub fn step_secs(&self) -> f64 {
        self.fixed_step_ms / 1000.0
    }

    /// Parse and validate a JSON document. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid { field, reason: "must be finite and > 0" })
            }
        }
        fn unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Invalid { field, reason: "must be within [0, 1]" })
            }
        }

        positive("field.width", self.field.width)?;
        positive("field.height", self.field.height)?;
        positive("field.ball_radius", self.field.ball_radius)?;
        positive("field.player_radius", self.field.player_radius)?;
        if self.field.goal_mouth_min_y > self.field.goal_mouth_max_y
            || self.field.goal_mouth_min_y < 0.0
            || self.field.goal_mouth_max_y > self.field.height
        {
            return Err(ConfigError::Invalid {
                field: "field.goal_mouth",
                reason: "must be an ordered range inside the field height",
            });
        }

        positive("physics.max_player_speed", self.physics.max_player_speed)?;
        unit("physics.inertia_blend", self.physics.inertia_blend)?;
        unit("physics.ball_friction", self.physics.ball_friction)?;
        unit("physics.wall_restitution", self.physics.wall_restitution)?;
        if self.physics.min_shot_speed > self.physics.max_shot_speed {
            return Err(ConfigError::Invalid {
                field: "physics.min_shot_speed",
                reason: "must not exceed max_shot_speed",
            });
        }

        positive("possession.capture_radius", self.possession.capture_radius)?;
        if self.possession.release_distance <= self.possession.dribble_offset {
            return Err(ConfigError::Invalid {
                field: "possession.release_distance",
                reason: "must exceed dribble_offset",
            });
        }

        positive("fixed_step_ms", self.fixed_step_ms)?;
        positive("match_duration_ms", self.match_duration_ms)?;
        if self.max_steps_per_update == 0 {
            return Err(ConfigError::Invalid {
                field: "max_steps_per_update",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(MatchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = MatchConfig::from_json_str(
            r#"{ "match_duration_ms": 60000, "possession": { "contest": "instant_tackle" } }"#,
        )
        .unwrap();

        assert_eq!(config.match_duration_ms, 60_000.0);
        assert_eq!(config.possession.contest, ContestKind::InstantTackle);
        assert_eq!(config.possession.capture_radius, 30.0);
        assert_eq!(config.fixed_step_ms, FIXED_STEP_MS);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = MatchConfig::from_json_str(r#"{ "physics": { "ball_friction": 1.5 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "physics.ball_friction", .. }));

        let err = MatchConfig::from_json_str(r#"{ "max_steps_per_update": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        assert!(matches!(
            MatchConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = MatchConfig::from_json_file("/nonexistent/goalrush.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
