//! Player and Ball Physics
//!
//! Per-step state transitions with no hidden state. Time comes in only as
//! `dt` (seconds) and `now` (clock milliseconds) arguments.

use std::collections::BTreeMap;
use tracing::debug;

use crate::core::vec2::Vec2;
use crate::game::config::MatchConfig;
use crate::game::state::{
    BallEntity, EntityId, GoalSide, MovementState, PlayerEntity, formation_position,
};

/// Steer a player for one step.
///
/// Velocity eases toward `movement * max_speed` instead of snapping to it.
/// While the kick animation lock holds, the player keeps moving but its
/// facing is frozen and its state stays `Kicking`.
pub fn apply_player_input(
    player: &mut PlayerEntity,
    movement: Vec2,
    dt: f64,
    now: f64,
    config: &MatchConfig,
) {
    let physics = &config.physics;
    let field = &config.field;
    let movement = movement.finite_or_zero();

    let target = movement.scale(physics.max_player_speed);
    player.velocity = player.velocity + (target - player.velocity).scale(physics.inertia_blend);
    player.position = player.position + player.velocity.scale(dt);

    let r = field.player_radius;
    player.position.x = player.position.x.clamp(r, field.width - r);
    player.position.y = player.position.y.clamp(r, field.height - r);

    let moving = movement.length() > physics.movement_deadzone;
    if now < player.kicking_until_ms {
        player.movement = MovementState::Kicking;
        return;
    }
    if moving {
        player.facing = movement.angle();
        player.movement = MovementState::Running;
    } else {
        player.movement = MovementState::Idle;
    }
}

/// Move a free ball for one step: friction, stop floor, integration, walls.
///
/// No-op while the ball is held or frozen in a goal.
pub fn advance_ball(ball: &mut BallEntity, dt: f64, config: &MatchConfig) {
    if ball.in_goal || ball.possessor.is_some() {
        return;
    }
    let physics = &config.physics;
    let field = &config.field;

    ball.velocity = ball.velocity.scale(physics.ball_friction);
    if ball.velocity.length() < physics.ball_stop_speed {
        ball.velocity = Vec2::ZERO;
    }
    ball.position = ball.position + ball.velocity.scale(dt);

    let r = field.ball_radius;
    let bounce = -physics.wall_restitution;
    let open_ends = field.in_goal_mouth(ball.position.y);

    if !open_ends {
        if ball.position.x - r < 0.0 {
            ball.position.x = r;
            if ball.velocity.x < 0.0 {
                ball.velocity.x *= bounce;
            }
        } else if ball.position.x + r > field.width {
            ball.position.x = field.width - r;
            if ball.velocity.x > 0.0 {
                ball.velocity.x *= bounce;
            }
        }
    }

    if ball.position.y - r < 0.0 {
        ball.position.y = r;
        if ball.velocity.y < 0.0 {
            ball.velocity.y *= bounce;
        }
    } else if ball.position.y + r > field.height {
        ball.position.y = field.height - r;
        if ball.velocity.y > 0.0 {
            ball.velocity.y *= bounce;
        }
    }
}

/// Detect a ball fully across a goal line inside the mouth.
///
/// Freezes the ball (`in_goal`, zero velocity) when it reports a goal.
pub fn check_goal(ball: &mut BallEntity, config: &MatchConfig) -> Option<GoalSide> {
    if ball.in_goal {
        return None;
    }
    let field = &config.field;
    if !field.in_goal_mouth(ball.position.y) {
        return None;
    }

    let r = field.ball_radius;
    let side = if ball.position.x + r < 0.0 {
        GoalSide::Left
    } else if ball.position.x - r > field.width {
        GoalSide::Right
    } else {
        return None;
    };

    ball.in_goal = true;
    ball.velocity = Vec2::ZERO;
    debug!(?side, x = ball.position.x, y = ball.position.y, "ball crossed goal line");
    Some(side)
}

/// Put the ball back on the centre spot, free and still.
pub fn reset_ball(ball: &mut BallEntity, config: &MatchConfig) {
    *ball = BallEntity::new(config.field.center());
}

/// Put every player back on its kickoff spot.
pub fn reset_players(players: &mut BTreeMap<EntityId, PlayerEntity>, config: &MatchConfig) {
    for player in players.values_mut() {
        player.position = formation_position(player.team, player.squad_slot, &config.field);
        player.velocity = Vec2::ZERO;
        player.facing = player.team.attack_angle();
        player.movement = MovementState::Idle;
        player.kicking_until_ms = 0.0;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::FIXED_STEP_MS;
    use crate::game::state::{GroupId, Team};
    use proptest::prelude::*;

    const DT: f64 = FIXED_STEP_MS / 1000.0;

    fn player_at(x: f64, y: f64) -> PlayerEntity {
        let config = MatchConfig::default();
        let id = EntityId::new(GroupId::new([1; 16]), 0);
        let mut player = PlayerEntity::new(id, Team::A, 0, true, &config.field);
        player.position = Vec2::new(x, y);
        player
    }

    fn free_ball(x: f64, y: f64, vx: f64, vy: f64) -> BallEntity {
        let mut ball = BallEntity::new(Vec2::new(x, y));
        ball.velocity = Vec2::new(vx, vy);
        ball
    }

    #[test]
    fn test_ball_friction_scenario() {
        let config = MatchConfig::default();
        let mut ball = free_ball(100.0, 100.0, 200.0, 0.0);

        advance_ball(&mut ball, DT, &config);

        assert!((ball.velocity.x - 196.0).abs() < 1e-9);
        assert_eq!(ball.velocity.y, 0.0);
        assert!((ball.position.x - 103.27).abs() < 0.01);
        assert_eq!(ball.position.y, 100.0);
    }

    #[test]
    fn test_ball_snaps_to_rest() {
        let config = MatchConfig::default();
        let mut ball = free_ball(500.0, 500.0, 0.9, 0.3);
        advance_ball(&mut ball, DT, &config);
        assert_eq!(ball.velocity, Vec2::ZERO);
        assert_eq!(ball.position, Vec2::new(500.0, 500.0));
    }

    #[test]
    fn test_ball_bounces_off_side_wall() {
        let config = MatchConfig::default();
        // Outside the goal mouth, heading into the top wall.
        let mut ball = free_ball(800.0, 9.0, 0.0, -300.0);
        advance_ball(&mut ball, DT, &config);

        assert_eq!(ball.position.y, config.field.ball_radius);
        assert!(ball.velocity.y > 0.0);
        assert!((ball.velocity.y - 300.0 * 0.98 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_ball_bounces_off_end_line_outside_mouth() {
        let config = MatchConfig::default();
        let mut ball = free_ball(10.0, 100.0, -600.0, 0.0);
        advance_ball(&mut ball, DT, &config);

        assert_eq!(ball.position.x, config.field.ball_radius);
        assert!(ball.velocity.x > 0.0);
    }

    #[test]
    fn test_goal_mouth_is_open() {
        let config = MatchConfig::default();
        let mut ball = free_ball(10.0, 500.0, -600.0, 0.0);
        advance_ball(&mut ball, DT, &config);

        assert!(ball.position.x < config.field.ball_radius);
        assert!(ball.velocity.x < 0.0);
    }

    #[test]
    fn test_held_or_scored_ball_does_not_move() {
        let config = MatchConfig::default();
        let mut held = free_ball(300.0, 300.0, 100.0, 0.0);
        held.possessor = Some(EntityId::new(GroupId::new([1; 16]), 0));
        advance_ball(&mut held, DT, &config);
        assert_eq!(held.position, Vec2::new(300.0, 300.0));

        let mut scored = free_ball(-20.0, 500.0, 0.0, 0.0);
        scored.in_goal = true;
        advance_ball(&mut scored, DT, &config);
        assert_eq!(scored.position, Vec2::new(-20.0, 500.0));
    }

    #[test]
    fn test_left_goal_requires_full_crossing() {
        let config = MatchConfig::default();
        let r = config.field.ball_radius;

        // Centre past the line but the ball still overlaps it (-5 + 8 > 0).
        let mut ball = free_ball(-5.0, 500.0, 0.0, 0.0);
        assert_eq!(check_goal(&mut ball, &config), None);
        assert!(!ball.in_goal);

        let mut ball = free_ball(-r - 0.01, 500.0, -50.0, 0.0);
        assert_eq!(check_goal(&mut ball, &config), Some(GoalSide::Left));
        assert!(ball.in_goal);
        assert_eq!(ball.velocity, Vec2::ZERO);

        // Already frozen: no second report.
        assert_eq!(check_goal(&mut ball, &config), None);
    }

    #[test]
    fn test_goal_with_small_ball_radius() {
        let mut config = MatchConfig::default();
        config.field.ball_radius = 4.0;
        let mut ball = free_ball(-5.0, 500.0, 0.0, 0.0);
        assert_eq!(check_goal(&mut ball, &config), Some(GoalSide::Left));
    }

    #[test]
    fn test_right_goal_and_mouth_range() {
        let config = MatchConfig::default();
        let width = config.field.width;
        let r = config.field.ball_radius;

        let mut ball = free_ball(width + r + 1.0, 700.0, 0.0, 0.0);
        assert_eq!(check_goal(&mut ball, &config), Some(GoalSide::Right));

        let mut wide = free_ball(width + r + 1.0, 200.0, 0.0, 0.0);
        assert_eq!(check_goal(&mut wide, &config), None);
    }

    #[test]
    fn test_player_velocity_eases_toward_target() {
        let config = MatchConfig::default();
        let mut player = player_at(500.0, 500.0);

        apply_player_input(&mut player, Vec2::new(1.0, 0.0), DT, 0.0, &config);

        let expected = config.physics.max_player_speed * config.physics.inertia_blend;
        assert!((player.velocity.x - expected).abs() < 1e-9);
        assert!((player.position.x - (500.0 + expected * DT)).abs() < 1e-9);
        assert_eq!(player.movement, MovementState::Running);
        assert_eq!(player.facing, 0.0);
    }

    #[test]
    fn test_player_decays_without_input() {
        let config = MatchConfig::default();
        let mut player = player_at(500.0, 500.0);
        player.velocity = Vec2::new(200.0, 0.0);
        player.facing = 1.0;

        apply_player_input(&mut player, Vec2::ZERO, DT, 0.0, &config);

        assert!((player.velocity.x - 170.0).abs() < 1e-9);
        assert_eq!(player.movement, MovementState::Idle);
        assert_eq!(player.facing, 1.0, "facing kept inside the deadzone");
    }

    #[test]
    fn test_deadzone_keeps_facing() {
        let config = MatchConfig::default();
        let mut player = player_at(500.0, 500.0);
        player.facing = 2.0;
        apply_player_input(&mut player, Vec2::new(0.05, 0.05), DT, 0.0, &config);
        assert_eq!(player.facing, 2.0);
        assert_eq!(player.movement, MovementState::Idle);
    }

    #[test]
    fn test_kick_lock_freezes_facing() {
        let config = MatchConfig::default();
        let mut player = player_at(500.0, 500.0);
        player.facing = 0.0;
        player.kicking_until_ms = 300.0;

        apply_player_input(&mut player, Vec2::new(0.0, 1.0), DT, 100.0, &config);
        assert_eq!(player.movement, MovementState::Kicking);
        assert_eq!(player.facing, 0.0);
        assert!(player.velocity.y > 0.0, "movement still applies during the lock");

        apply_player_input(&mut player, Vec2::new(0.0, 1.0), DT, 300.0, &config);
        assert_eq!(player.movement, MovementState::Running);
        assert!((player.facing - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_player_clamped_to_field() {
        let config = MatchConfig::default();
        let mut player = player_at(16.0, 16.0);
        player.velocity = Vec2::new(-5000.0, -5000.0);
        apply_player_input(&mut player, Vec2::new(-1.0, -1.0), DT, 0.0, &config);
        assert_eq!(player.position, Vec2::new(config.field.player_radius, config.field.player_radius));
    }

    #[test]
    fn test_non_finite_movement_is_ignored() {
        let config = MatchConfig::default();
        let mut player = player_at(500.0, 500.0);
        apply_player_input(&mut player, Vec2::new(f64::NAN, f64::INFINITY), DT, 0.0, &config);
        assert_eq!(player.velocity, Vec2::ZERO);
        assert_eq!(player.position, Vec2::new(500.0, 500.0));
    }

    #[test]
    fn test_reset_restores_formation() {
        let config = MatchConfig::default();
        let mut players = BTreeMap::new();
        let mut player = player_at(10.0, 10.0);
        player.velocity = Vec2::new(50.0, -20.0);
        player.movement = MovementState::Kicking;
        player.kicking_until_ms = 999.0;
        players.insert(player.id, player);

        let mut ball = free_ball(3.0, 4.0, 10.0, 10.0);
        ball.in_goal = true;
        ball.pressure = 0.7;

        reset_players(&mut players, &config);
        reset_ball(&mut ball, &config);

        let player = players.values().next().unwrap();
        assert_eq!(player.position, formation_position(Team::A, 0, &config.field));
        assert_eq!(player.velocity, Vec2::ZERO);
        assert_eq!(player.kicking_until_ms, 0.0);
        assert_eq!(ball, BallEntity::new(config.field.center()));
    }

    proptest! {
        #[test]
        fn prop_friction_never_speeds_up(
            x in 100.0f64..1800.0,
            y in 100.0f64..980.0,
            vx in -2000.0f64..2000.0,
            vy in -2000.0f64..2000.0,
        ) {
            let config = MatchConfig::default();
            let mut ball = free_ball(x, y, vx, vy);
            let before = ball.velocity.length();
            advance_ball(&mut ball, DT, &config);
            let after = ball.velocity.length();

            prop_assert!(after <= before);
            if before * config.physics.ball_friction < config.physics.ball_stop_speed {
                prop_assert_eq!(ball.velocity, Vec2::ZERO);
            }
        }

        #[test]
        fn prop_player_stays_on_field(
            x in 0.0f64..1920.0,
            y in 0.0f64..1080.0,
            mx in -5.0f64..5.0,
            my in -5.0f64..5.0,
        ) {
            let config = MatchConfig::default();
            let mut player = player_at(x, y);
            for _ in 0..30 {
                apply_player_input(&mut player, Vec2::new(mx, my), DT, 0.0, &config);
            }
            let r = config.field.player_radius;
            prop_assert!(player.position.x >= r && player.position.x <= config.field.width - r);
            prop_assert!(player.position.y >= r && player.position.y <= config.field.height - r);
        }
    }
}
