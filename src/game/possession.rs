//! Ball Possession
//!
//! Magnetism, capture, contests and shooting. Every transition is gated by
//! three lockouts:
//!
//! - capture lockout: a fresh holder cannot be dispossessed
//! - loss lockout: a player who just lost the ball cannot take it back
//! - shot immunity: a shooter cannot recapture their own shot
//!
//! The resolver owns the lockout deadlines. Everything else lives on the
//! ball and player entities passed in.
//!
//! Who wins a contest against the holder is delegated to a
//! [`ContestStrategy`]. Two ship here: [`PressureContest`] (default) and
//! [`InstantTackle`].

use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::core::vec2::{lerp, Vec2};
use crate::game::config::{ContestKind, MatchConfig, PossessionConfig};
use crate::game::events::PossessionReason;
use crate::game::state::{BallEntity, EntityId, MovementState, PlayerEntity};

// =============================================================================
// CONTEST STRATEGIES
// =============================================================================

/// An opponent close enough to matter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Challenger {
    /// Challenging entity
    pub id: EntityId,
    /// Distance to the holder
    pub distance: f64,
}

/// Everything a strategy may look at for one contest.
#[derive(Debug)]
pub struct Contest<'a> {
    /// Current holder
    pub holder: EntityId,
    /// Eligible opponents, nearest first (ties by id)
    pub challengers: &'a [Challenger],
    /// Holder is inside its capture lockout
    pub holder_protected: bool,
    /// Possession tuning
    pub config: &'a PossessionConfig,
}

/// Verdict of a contest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContestOutcome {
    /// Holder keeps the ball
    Hold,
    /// Ball goes straight to this challenger
    Transfer(EntityId),
    /// Ball is knocked loose
    Release,
}

/// Decides whether a held ball changes hands this step.
///
/// Implementations may update `ball.pressure` but must not touch the
/// possessor; the resolver applies the outcome.
pub trait ContestStrategy: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Resolve one step of contest.
    fn resolve(&self, contest: &Contest<'_>, ball: &mut BallEntity, dt: f64) -> ContestOutcome;
}

/// Opponents near the holder fill a pressure meter; a full meter transfers
/// the ball to the nearest of them.
#[derive(Clone, Copy, Debug, Default)]
pub struct PressureContest;

impl ContestStrategy for PressureContest {
    fn name(&self) -> &'static str {
        "pressure"
    }

    fn resolve(&self, contest: &Contest<'_>, ball: &mut BallEntity, dt: f64) -> ContestOutcome {
        if contest.holder_protected {
            ball.pressure = 0.0;
            return ContestOutcome::Hold;
        }

        let cfg = contest.config;
        let pressing: Vec<&Challenger> = contest
            .challengers
            .iter()
            .filter(|c| c.distance <= cfg.pressure_radius)
            .collect();

        if pressing.is_empty() {
            ball.pressure = (ball.pressure - cfg.pressure_decay_per_sec * dt).max(0.0);
            return ContestOutcome::Hold;
        }

        let gain = cfg.pressure_buildup_per_sec * dt * pressing.len() as f64;
        ball.pressure = (ball.pressure + gain).min(1.0);

        if ball.pressure >= 1.0 {
            ContestOutcome::Transfer(pressing[0].id)
        } else {
            ContestOutcome::Hold
        }
    }
}

/// The nearest opponent inside tackle range takes the ball as soon as the
/// holder's capture lockout is over.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstantTackle;

impl ContestStrategy for InstantTackle {
    fn name(&self) -> &'static str {
        "instant_tackle"
    }

    fn resolve(&self, contest: &Contest<'_>, _ball: &mut BallEntity, _dt: f64) -> ContestOutcome {
        if contest.holder_protected {
            return ContestOutcome::Hold;
        }
        contest
            .challengers
            .iter()
            .find(|c| c.distance <= contest.config.tackle_radius)
            .map_or(ContestOutcome::Hold, |c| ContestOutcome::Transfer(c.id))
    }
}

/// Build the strategy named in config.
pub fn strategy_for(kind: ContestKind) -> Box<dyn ContestStrategy> {
    match kind {
        ContestKind::Pressure => Box::new(PressureContest),
        ContestKind::InstantTackle => Box::new(InstantTackle),
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// A possession transition produced by the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PossessionChange {
    /// Previous holder
    pub from: Option<EntityId>,
    /// New holder
    pub to: Option<EntityId>,
    /// Cause
    pub reason: PossessionReason,
}

/// Result of an action press.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActionOutcome {
    /// Holder kicked the ball
    Shot {
        /// Clamped power in [0, 1]
        power: f64,
        /// Launch speed (px/s)
        speed: f64,
    },
    /// Free ball picked up by the press
    Captured,
    /// Nothing happened
    None,
}

/// Possession state machine.
pub struct PossessionResolver {
    strategy: Box<dyn ContestStrategy>,
    capture_lockout_until: f64,
    loss_lockout_until: BTreeMap<EntityId, f64>,
}

impl std::fmt::Debug for PossessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PossessionResolver")
            .field("strategy", &self.strategy.name())
            .field("capture_lockout_until", &self.capture_lockout_until)
            .field("loss_lockout_until", &self.loss_lockout_until)
            .finish()
    }
}

impl PossessionResolver {
    /// Resolver using the given contest strategy.
    pub fn new(strategy: Box<dyn ContestStrategy>) -> Self {
        Self {
            strategy,
            capture_lockout_until: f64::NEG_INFINITY,
            loss_lockout_until: BTreeMap::new(),
        }
    }

    /// Resolver using the strategy named in config.
    pub fn from_config(config: &PossessionConfig) -> Self {
        Self::new(strategy_for(config.contest))
    }

    /// Active strategy name.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Drop every lockout (kickoff).
    pub fn clear_lockouts(&mut self) {
        self.capture_lockout_until = f64::NEG_INFINITY;
        self.loss_lockout_until.clear();
    }

    /// Forget a removed entity.
    pub fn forget(&mut self, id: &EntityId) {
        self.loss_lockout_until.remove(id);
    }

    /// Whether `id` is serving a loss lockout.
    pub fn is_loss_locked(&self, id: &EntityId, now: f64) -> bool {
        self.loss_lockout_until
            .get(id)
            .is_some_and(|&until| now < until)
    }

    /// Whether `id` is barred from its own recent shot.
    pub fn is_shot_immune(
        &self,
        id: &EntityId,
        ball: &BallEntity,
        now: f64,
        cfg: &PossessionConfig,
    ) -> bool {
        ball.last_shooter == Some(*id)
            && ball
                .last_shot_ms
                .is_some_and(|shot| now < shot + cfg.shot_immunity_ms)
    }

    /// Whether `id` may take possession right now.
    pub fn can_capture(
        &self,
        id: &EntityId,
        ball: &BallEntity,
        now: f64,
        cfg: &PossessionConfig,
    ) -> bool {
        !self.is_loss_locked(id, now) && !self.is_shot_immune(id, ball, now, cfg)
    }

    /// Whether the current holder is inside its capture lockout.
    pub fn holder_protected(&self, now: f64) -> bool {
        now < self.capture_lockout_until
    }

    /// Give the ball to `holder` and start its capture lockout.
    pub fn attach(
        &mut self,
        holder: &PlayerEntity,
        ball: &mut BallEntity,
        now: f64,
        cfg: &PossessionConfig,
    ) {
        ball.possessor = Some(holder.id);
        ball.pressure = 0.0;
        self.capture_lockout_until = now + cfg.capture_lockout_ms;
        Self::pin_ball(holder, ball, cfg);
    }

    /// Free the ball. The previous holder serves a loss lockout.
    pub fn release(&mut self, ball: &mut BallEntity, now: f64, cfg: &PossessionConfig) {
        if let Some(holder) = ball.possessor.take() {
            self.loss_lockout_until.insert(holder, now + cfg.loss_lockout_ms);
        }
        ball.pressure = 0.0;
    }

    /// Free the ball without any lockout (holder removed).
    pub fn force_release(&mut self, ball: &mut BallEntity) -> Option<EntityId> {
        ball.pressure = 0.0;
        ball.possessor.take()
    }

    /// Hold the ball in front of its holder.
    pub fn pin_ball(holder: &PlayerEntity, ball: &mut BallEntity, cfg: &PossessionConfig) {
        ball.position = holder.position + holder.facing_dir().scale(cfg.dribble_offset);
        ball.velocity = Vec2::ZERO;
    }

    /// One step of possession: magnetism, straying, contest, free capture.
    pub fn resolve(
        &mut self,
        players: &BTreeMap<EntityId, PlayerEntity>,
        ball: &mut BallEntity,
        now: f64,
        dt: f64,
        cfg: &PossessionConfig,
    ) -> Option<PossessionChange> {
        if ball.in_goal {
            return None;
        }
        match ball.possessor {
            Some(holder_id) => self.resolve_held(holder_id, players, ball, now, dt, cfg),
            None => self.resolve_free(players, ball, now, cfg),
        }
    }

    fn resolve_held(
        &mut self,
        holder_id: EntityId,
        players: &BTreeMap<EntityId, PlayerEntity>,
        ball: &mut BallEntity,
        now: f64,
        dt: f64,
        cfg: &PossessionConfig,
    ) -> Option<PossessionChange> {
        let Some(holder) = players.get(&holder_id) else {
            self.force_release(ball);
            return Some(PossessionChange {
                from: Some(holder_id),
                to: None,
                reason: PossessionReason::Removed,
            });
        };

        if holder.position.distance(ball.position) > cfg.release_distance {
            debug!(holder = %holder_id, "holder strayed from ball");
            self.release(ball, now, cfg);
            return Some(PossessionChange {
                from: Some(holder_id),
                to: None,
                reason: PossessionReason::Strayed,
            });
        }

        let challengers = self.challengers(holder, players, ball, now, cfg);
        let contest = Contest {
            holder: holder_id,
            challengers: &challengers,
            holder_protected: self.holder_protected(now),
            config: cfg,
        };

        match self.strategy.resolve(&contest, ball, dt) {
            ContestOutcome::Hold => {
                Self::pin_ball(holder, ball, cfg);
                None
            }
            ContestOutcome::Transfer(winner_id) => {
                let winner = players.get(&winner_id)?;
                self.release(ball, now, cfg);
                self.attach(winner, ball, now, cfg);
                debug!(from = %holder_id, to = %winner_id, strategy = self.strategy.name(), "ball contested away");
                Some(PossessionChange {
                    from: Some(holder_id),
                    to: Some(winner_id),
                    reason: PossessionReason::Contested,
                })
            }
            ContestOutcome::Release => {
                self.release(ball, now, cfg);
                Some(PossessionChange {
                    from: Some(holder_id),
                    to: None,
                    reason: PossessionReason::Contested,
                })
            }
        }
    }

    fn resolve_free(
        &mut self,
        players: &BTreeMap<EntityId, PlayerEntity>,
        ball: &mut BallEntity,
        now: f64,
        cfg: &PossessionConfig,
    ) -> Option<PossessionChange> {
        ball.pressure = 0.0;

        let mut best: Option<(f64, &PlayerEntity)> = None;
        for player in players.values() {
            let distance = player.position.distance(ball.position);
            if distance > cfg.capture_radius || !self.can_capture(&player.id, ball, now, cfg) {
                continue;
            }
            // Strict `<` keeps the lowest id on ties since iteration is ordered.
            match best {
                Some((d, _)) if d <= distance => {}
                _ => best = Some((distance, player)),
            }
        }

        let (_, player) = best?;
        self.attach(player, ball, now, cfg);
        trace!(holder = %player.id, "free ball captured");
        Some(PossessionChange {
            from: None,
            to: Some(player.id),
            reason: PossessionReason::Captured,
        })
    }

    /// Eligible opponents of `holder`, nearest to the holder first.
    fn challengers(
        &self,
        holder: &PlayerEntity,
        players: &BTreeMap<EntityId, PlayerEntity>,
        ball: &BallEntity,
        now: f64,
        cfg: &PossessionConfig,
    ) -> Vec<Challenger> {
        let rivals = holder.team.opponent();
        let mut challengers: Vec<Challenger> = players
            .values()
            .filter(|p| p.team == rivals && self.can_capture(&p.id, ball, now, cfg))
            .map(|p| Challenger { id: p.id, distance: p.position.distance(holder.position) })
            .collect();
        challengers.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        challengers
    }

    /// Handle an action press from `player`.
    ///
    /// A holder shoots along its facing; anyone else tries to pick up a
    /// free ball in reach.
    pub fn resolve_action(
        &mut self,
        player: &mut PlayerEntity,
        ball: &mut BallEntity,
        power: f64,
        now: f64,
        config: &MatchConfig,
    ) -> ActionOutcome {
        let cfg = &config.possession;
        if ball.in_goal {
            return ActionOutcome::None;
        }

        if ball.possessor == Some(player.id) {
            let power = if power.is_finite() { power.clamp(0.0, 1.0) } else { 0.0 };
            let physics = &config.physics;
            let speed = lerp(physics.min_shot_speed, physics.max_shot_speed, power);

            ball.velocity = player.facing_dir().scale(speed);
            ball.possessor = None;
            ball.pressure = 0.0;
            ball.last_shot_ms = Some(now);
            ball.last_shooter = Some(player.id);

            player.kicking_until_ms = now + physics.kick_animation_ms;
            player.movement = MovementState::Kicking;
            return ActionOutcome::Shot { power, speed };
        }

        if ball.is_free()
            && player.position.distance(ball.position) <= cfg.capture_radius
            && self.can_capture(&player.id, ball, now, cfg)
        {
            self.attach(player, ball, now, cfg);
            return ActionOutcome::Captured;
        }

        ActionOutcome::None
    }
}

// =============================================================================
// TESTS
// =============================================================================
