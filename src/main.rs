//! Goalrush Match Server
//!
//! Runs the authoritative match core headless. A scripted match is played
//! on a manual clock, then replayed from its recording to check the final
//! state hash, then a short match runs against the real clock.
//!
//! Environment:
//! - `RUST_LOG`: tracing filter (default `info`)
//! - `GOALRUSH_CONFIG`: optional JSON file overriding `MatchConfig`
//! - `GOALRUSH_REALTIME_SECS`: length of the real-clock run (default 2, 0 skips it)

use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use goalrush::{
    Clock, EntityId, InputCommand, MatchConfig, MatchEngine, Team, Vec2, TICK_RATE, VERSION,
    core::StateHash,
    game::{
        events::GameEventData,
        replay::{replay_match, ReplayLog},
        state::{GroupId, MatchSnapshot, PlayerEntity},
        config::FIXED_STEP_MS,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Goalrush Server v{}", VERSION);
    info!("Tick Rate: {} Hz", TICK_RATE);

    let config = load_config()?;
    info!(
        "Match Duration: {} s, contest: {:?}",
        config.match_duration_ms / 1000.0,
        config.possession.contest
    );

    let (hash, log) = demo_match(&config);
    verify_replay(&config, &log, hash)?;

    let secs: u64 = match std::env::var("GOALRUSH_REALTIME_SECS") {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("GOALRUSH_REALTIME_SECS is not a number: {raw}"))?,
        Err(_) => 2,
    };
    if secs > 0 {
        realtime_match(&config, Duration::from_secs(secs)).await;
    }
    Ok(())
}

fn load_config() -> anyhow::Result<MatchConfig> {
    match std::env::var("GOALRUSH_CONFIG") {
        Ok(path) => {
            let config = MatchConfig::from_json_file(&path)
                .with_context(|| format!("loading match config from {path}"))?;
            info!("Loaded config from {}", path);
            Ok(config)
        }
        Err(_) => Ok(MatchConfig::default()),
    }
}

// =============================================================================
// SCRIPTED PLAYERS
// =============================================================================

/// Home and away group ids used by the demo.
const HOME: GroupId = GroupId::new([0x11; 16]);
const AWAY: GroupId = GroupId::new([0x22; 16]);

/// Chase the ball; carry it toward the opponent goal and shoot when close.
///
/// Reads only the snapshot, like any external decision layer would.
fn scripted_command(player: &PlayerEntity, snapshot: &MatchSnapshot, config: &MatchConfig) -> InputCommand {
    let field = &config.field;
    let ball = &snapshot.ball;
    let target_goal = match player.team {
        Team::A => Vec2::new(field.width, field.height / 2.0),
        Team::B => Vec2::new(0.0, field.height / 2.0),
    };

    if ball.possessor == Some(player.id) {
        let dir = (target_goal - player.position).normalize();
        if player.position.distance(target_goal) < 450.0 {
            return InputCommand::with_action(dir.x, dir.y, 0.9);
        }
        return InputCommand::movement(dir.x, dir.y);
    }

    // Member 0 chases, the others hold a loose shape behind the ball.
    let target = if player.id.member == 0 {
        ball.position
    } else {
        let spread = if player.id.member == 1 { -180.0 } else { 180.0 };
        let back = match player.team {
            Team::A => -220.0,
            Team::B => 220.0,
        };
        ball.position + Vec2::new(back, spread)
    };
    let to_target = target - player.position;
    if to_target.length() < 5.0 {
        return InputCommand::movement(0.0, 0.0);
    }
    let dir = to_target.normalize();
    InputCommand::movement(dir.x, dir.y)
}

fn drive(engine: &mut MatchEngine) {
    let snapshot = engine.snapshot();
    let commands: Vec<(EntityId, InputCommand)> = snapshot
        .team_a
        .iter()
        .chain(snapshot.team_b.iter())
        .map(|p| (p.id, scripted_command(p, &snapshot, engine.config())))
        .collect();
    for (id, command) in commands {
        engine.queue_input(id, command);
    }
}

fn log_events(result: &goalrush::TickResult) {
    for event in &result.events {
        match &event.data {
            GameEventData::GoalScored(goal) => {
                info!(
                    "Goal for {:?} at frame {} ({} - {}), {:.1}s left",
                    goal.team,
                    event.frame,
                    goal.score_a,
                    goal.score_b,
                    goal.time_remaining_ms / 1000.0
                );
            }
            GameEventData::ShotTaken { shooter, speed, .. } => {
                debug!("Shot by {} at {:.0} px/s", shooter, speed);
            }
            GameEventData::MatchEnded(score) => {
                info!(
                    "Match ended at frame {}: {} - {}",
                    score.frame, score.score_a, score.score_b
                );
            }
            _ => {}
        }
    }
}

// =============================================================================
// DEMO RUNS
// =============================================================================

/// Play a full scripted match on a manual clock.
fn demo_match(config: &MatchConfig) -> (StateHash, ReplayLog) {
    info!("=== Starting Demo Match ===");

    let mut engine = MatchEngine::new(config.clone(), Clock::manual());
    engine.start_recording();
    engine.add_entity_set(HOME, Team::A, true);
    engine.add_entity_set(AWAY, Team::B, false);
    engine.start();

    for player in engine.state().players.values() {
        info!(
            "Added {} ({:?}) at ({:.1}, {:.1})",
            player.id, player.team, player.position.x, player.position.y
        );
    }

    // Uneven host frames: mostly 60 Hz, a stall every ~10 seconds.
    let mut update = 0u64;
    let mut total_events = 0;
    loop {
        drive(&mut engine);
        let delta = if update % 600 == 599 {
            250.0
        } else {
            FIXED_STEP_MS + ((update % 7) as f64 - 3.0)
        };
        let result = engine.update(delta);
        total_events += result.events.len();
        log_events(&result);
        update += 1;

        if result.match_ended {
            break;
        }
    }

    let state = engine.state();
    let hash = state.compute_hash();
    info!("=== Match Results ===");
    info!("Score: {} - {}", state.score(Team::A), state.score(Team::B));
    info!("Frames: {}, updates: {}, events: {}", state.frame, update, total_events);
    info!("Final State Hash: {}", hex::encode(hash));

    let log = engine.take_recording().unwrap_or_default();
    (hash, log)
}

/// Re-run the recording and compare hashes.
fn verify_replay(config: &MatchConfig, log: &ReplayLog, expected: StateHash) -> anyhow::Result<()> {
    info!("=== Verifying Determinism ===");
    let (replayed, events) = replay_match(config.clone(), log);
    let replay_hash = replayed.state().compute_hash();
    info!("Replay State Hash: {} ({} events)", hex::encode(replay_hash), events.len());

    if replay_hash != expected {
        bail!(
            "determinism failure: {} != {}",
            hex::encode(replay_hash),
            hex::encode(expected)
        );
    }
    info!("DETERMINISM VERIFIED: Hashes match!");
    Ok(())
}

/// Drive a match from the host clock for `length`.
async fn realtime_match(config: &MatchConfig, length: Duration) {
    info!("=== Real-Clock Match ({:?}) ===", length);

    let mut engine = MatchEngine::new(config.clone(), Clock::real());
    engine.add_entity_set(GroupId::random(), Team::A, true);
    engine.add_entity_set(GroupId::random(), Team::B, false);
    engine.start();

    let started = tokio::time::Instant::now();
    let mut last = started;
    let mut interval = tokio::time::interval(Duration::from_millis(16));
    let mut steps = 0u64;

    while started.elapsed() < length {
        interval.tick().await;
        let now = tokio::time::Instant::now();
        let delta = now.duration_since(last).as_secs_f64() * 1000.0;
        last = now;

        drive(&mut engine);
        let result = engine.update(delta);
        steps += result.steps as u64;
        log_events(&result);
        if result.match_ended {
            break;
        }
    }

    let snapshot = engine.snapshot();
    info!(
        "Real-clock run: {} steps, clock at {:.0} ms, frame {}, score {} - {}",
        steps,
        engine.clock().now(),
        snapshot.frame,
        snapshot.score_a,
        snapshot.score_b
    );
    match serde_json::to_string(&snapshot) {
        Ok(json) => debug!("Final snapshot: {}", json),
        Err(err) => debug!("Snapshot not serializable: {}", err),
    }
}
