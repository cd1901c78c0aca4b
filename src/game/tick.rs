//! Authoritative Simulation Tick
//!
//! The fixed-timestep match loop. Host frames of any length go in through
//! [`MatchEngine::update`]; physics only ever advances in whole
//! `fixed_step_ms` slices, at most `max_steps_per_update` of them per call.
//!
//! # Determinism
//!
//! Two engines on manual clocks fed the same calls in the same order reach
//! bit-identical state:
//! - entities and input queues live in BTreeMaps keyed by [`EntityId`]
//! - wall time is only read through the injected [`Clock`]
//! - no randomness
//!
//! The goal pause is a deferred record `{fire_at_ms, token}` checked at the
//! start of every update, so it resolves identically under manual time.

use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};

use crate::core::clock::Clock;
use crate::game::config::MatchConfig;
use crate::game::events::{
    FinalScore, GameEvent, GameEventData, GoalInfo, MatchObserver, PossessionReason,
};
use crate::game::input::{InputCommand, InputQueue};
use crate::game::physics;
use crate::game::possession::{ActionOutcome, PossessionChange, PossessionResolver};
use crate::game::replay::{ReplayAction, ReplayLog, ReplayRecorder};
use crate::game::state::{
    EntityId, GoalSide, GroupId, MatchPhase, MatchSnapshot, MatchState, PlayerEntity, Team,
    GROUP_SIZE,
};

/// Result of one `update` call.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated during this call
    pub events: Vec<GameEvent>,
    /// Fixed steps executed
    pub steps: u32,
    /// Whether the match is over
    pub match_ended: bool,
    /// Accumulated time dropped by the step cap
    pub discarded_ms: f64,
}

/// Pending end of a goal pause.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResumeRecord {
    /// Clock time at which play resumes
    pub fire_at_ms: f64,
    /// Identifies the goal that scheduled it
    pub token: u64,
}

/// Roster bookkeeping for one entity group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct GroupInfo {
    team: Team,
    base_slot: u16,
}

/// Owns and advances one match.
///
/// The engine is the only writer of [`MatchState`]. Callers read it through
/// [`MatchEngine::state`] or take an owned [`MatchSnapshot`].
pub struct MatchEngine {
    config: MatchConfig,
    clock: Clock,
    state: MatchState,
    resolver: PossessionResolver,
    queues: InputQueue,
    groups: BTreeMap<GroupId, GroupInfo>,
    accumulator_ms: f64,
    goal_pause: Option<ResumeRecord>,
    next_resume_token: u64,
    observer: Option<Box<dyn MatchObserver>>,
    recorder: Option<ReplayRecorder>,
}

impl MatchEngine {
    /// New match in the `Waiting` phase.
    pub fn new(config: MatchConfig, clock: Clock) -> Self {
        let state = MatchState::new(&config.field, config.match_duration_ms);
        let resolver = PossessionResolver::from_config(&config.possession);
        debug!(
            contest = resolver.strategy_name(),
            clock = ?clock.mode(),
            "match engine created"
        );
        Self {
            config,
            clock,
            state,
            resolver,
            queues: InputQueue::new(),
            groups: BTreeMap::new(),
            accumulator_ms: 0.0,
            goal_pause: None,
            next_resume_token: 0,
            observer: None,
            recorder: None,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Live match state. Copy before mutating.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> MatchSnapshot {
        self.state.snapshot()
    }

    /// Match configuration.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Injected clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Injected clock, mutably (scale, pause, manual ticks between updates).
    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    /// Whether a goal pause is running.
    pub fn is_paused(&self) -> bool {
        self.goal_pause.is_some()
    }

    /// Pending resume, if any.
    pub fn pending_resume(&self) -> Option<ResumeRecord> {
        self.goal_pause
    }

    /// Physics time waiting for the next step.
    pub fn accumulator_ms(&self) -> f64 {
        self.accumulator_ms
    }

    /// Install the synchronous callback sink.
    pub fn set_observer(&mut self, observer: Box<dyn MatchObserver>) {
        self.observer = Some(observer);
    }

    /// Start (or restart) recording calls for replay.
    pub fn start_recording(&mut self) {
        self.recorder = Some(ReplayRecorder::new());
    }

    /// Stop recording and hand back the log.
    pub fn take_recording(&mut self) -> Option<ReplayLog> {
        self.recorder.take().map(ReplayRecorder::finish)
    }

    fn record(&mut self, action: ReplayAction) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(action);
        }
    }

    // =========================================================================
    // ROSTER AND INPUT
    // =========================================================================

    /// Queue a command for an entity. Magnitudes are not validated.
    ///
    /// Returns false (with a warning) for unknown entities.
    pub fn queue_input(&mut self, entity: EntityId, command: InputCommand) -> bool {
        self.record(ReplayAction::Input(entity, command));
        if !self.state.players.contains_key(&entity) {
            warn!(%entity, "input for unknown entity dropped");
            return false;
        }
        self.queues.push(entity, command);
        true
    }

    /// Create three entities for `group` at their kickoff spots.
    ///
    /// Member 0 starts as the controlled entity. Each group takes the lowest
    /// free block of three formation slots on its team.
    pub fn add_entity_set(&mut self, group: GroupId, team: Team, is_human: bool) -> bool {
        self.record(ReplayAction::AddGroup { group, team, is_human });
        if self.groups.contains_key(&group) {
            warn!(group = %group.short(), "duplicate entity set ignored");
            return false;
        }
        if self.state.is_ended() {
            warn!(group = %group.short(), "entity set added after match end ignored");
            return false;
        }

        let base_slot = self.free_slot_block(team);
        for member in 0..GROUP_SIZE {
            let id = EntityId::new(group, member);
            let mut player = PlayerEntity::new(
                id,
                team,
                base_slot + member as u16,
                is_human,
                &self.config.field,
            );
            player.is_controlled = member == 0;
            self.state.players.insert(id, player);
        }
        self.groups.insert(group, GroupInfo { team, base_slot });

        info!(
            group = %group.short(),
            ?team,
            is_human,
            base_slot,
            groups = self.groups.len(),
            "entity set added"
        );
        true
    }

    fn free_slot_block(&self, team: Team) -> u16 {
        let step = GROUP_SIZE as u16;
        let mut base = 0;
        while self
            .groups
            .values()
            .any(|g| g.team == team && g.base_slot == base)
        {
            base += step;
        }
        base
    }

    /// Delete a group's entities, releasing the ball if one of them holds it.
    pub fn remove_entity_set(&mut self, group: GroupId) -> bool {
        self.record(ReplayAction::RemoveGroup(group));
        let Some(info) = self.groups.remove(&group) else {
            warn!(group = %group.short(), "remove for unknown entity set ignored");
            return false;
        };

        if self.state.ball.possessor.is_some_and(|holder| holder.group == group) {
            let from = self.resolver.force_release(&mut self.state.ball);
            self.state.push_event(GameEvent::possession_changed(
                self.state.frame,
                from,
                None,
                PossessionReason::Removed,
            ));
        }

        for member in 0..GROUP_SIZE {
            let id = EntityId::new(group, member);
            self.state.players.remove(&id);
            self.queues.remove(&id);
            self.resolver.forget(&id);
        }

        info!(group = %group.short(), team = ?info.team, "entity set removed");
        true
    }

    /// Make `entity` the controlled member of its group.
    pub fn assign_control(&mut self, entity: EntityId) -> bool {
        self.record(ReplayAction::AssignControl(entity));
        if !self.state.players.contains_key(&entity) {
            warn!(%entity, "control assigned to unknown entity ignored");
            return false;
        }
        for player in self.state.players.values_mut() {
            if player.id.group == entity.group {
                player.is_controlled = player.id == entity;
            }
        }
        true
    }

    // =========================================================================
    // PHASES
    // =========================================================================

    /// Leave `Waiting` and kick off.
    ///
    /// Refused unless enough groups have joined.
    pub fn start(&mut self) -> bool {
        self.record(ReplayAction::Start);
        if self.state.phase != MatchPhase::Waiting {
            warn!(phase = ?self.state.phase, "start ignored outside waiting phase");
            return false;
        }
        if self.groups.len() < self.config.min_groups_to_start {
            warn!(
                groups = self.groups.len(),
                required = self.config.min_groups_to_start,
                "start ignored, not enough entity sets"
            );
            return false;
        }

        self.kickoff();
        self.queues.clear();
        self.accumulator_ms = 0.0;
        self.state.time_remaining_ms = self.config.match_duration_ms;
        self.set_phase(MatchPhase::Playing);
        info!(groups = self.groups.len(), "match started");
        true
    }

    fn set_phase(&mut self, new_phase: MatchPhase) {
        let old_phase = self.state.phase;
        self.state.phase = new_phase;
        self.state
            .push_event(GameEvent::phase_changed(self.state.frame, old_phase, new_phase));
    }

    fn kickoff(&mut self) {
        physics::reset_ball(&mut self.state.ball, &self.config);
        physics::reset_players(&mut self.state.players, &self.config);
        self.resolver.clear_lockouts();
    }

    // =========================================================================
    // UPDATE LOOP
    // =========================================================================

    /// Advance the match by one host frame of `delta_ms`.
    ///
    /// 1. No-op unless playing
    /// 2. During a goal pause only match time runs
    /// 3. Otherwise run whole fixed steps from the accumulator, at most
    ///    `max_steps_per_update`; any excess beyond the cap is discarded
    /// 4. Match time drops by `delta_ms` regardless of steps run
    pub fn update(&mut self, delta_ms: f64) -> TickResult {
        let delta_ms = if delta_ms.is_finite() && delta_ms >= 0.0 {
            delta_ms
        } else {
            warn!(delta_ms, "invalid frame delta treated as zero");
            0.0
        };
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.end_frame(delta_ms);
        }

        let mut result = TickResult::default();
        if self.state.phase != MatchPhase::Playing {
            result.match_ended = self.state.is_ended();
            result.events = self.state.take_events();
            return result;
        }

        if self.clock.is_manual() {
            self.clock.tick(delta_ms);
        } else {
            self.clock.run_due();
        }
        let now = self.clock.now();
        self.poll_resume(now);

        if self.goal_pause.is_some() {
            self.queues.clear();
            self.accumulator_ms = 0.0;
        } else {
            self.run_steps(delta_ms, now, &mut result);
        }

        self.advance_match_time(delta_ms);

        result.match_ended = self.state.is_ended();
        result.events = self.state.take_events();
        result
    }

    fn run_steps(&mut self, delta_ms: f64, now: f64, result: &mut TickResult) {
        let step = self.config.fixed_step_ms;
        self.accumulator_ms += delta_ms;

        while self.accumulator_ms >= step && result.steps < self.config.max_steps_per_update {
            self.accumulator_ms -= step;
            result.steps += 1;
            // Time at the end of this slice; later slices of the same frame
            // see later readings.
            let step_now = now - self.accumulator_ms;
            if let Some(side) = self.run_step(step_now) {
                self.handle_goal(side, step_now);
                return;
            }
        }

        if self.accumulator_ms >= step {
            result.discarded_ms = self.accumulator_ms;
            debug!(
                discarded_ms = self.accumulator_ms,
                steps = result.steps,
                "step cap hit, dropping backlog"
            );
            self.accumulator_ms = 0.0;
        }
    }

    /// One fixed step. Returns the goal side if the ball went in.
    fn run_step(&mut self, now: f64) -> Option<GoalSide> {
        let dt = self.config.step_secs();

        // 0. Advance frame counter
        self.state.frame += 1;

        // 1. Apply merged input to every entity, including idle ones
        let ids: Vec<EntityId> = self.state.players.keys().copied().collect();
        for id in ids {
            let merged = self.queues.drain_merged(&id);
            let Some(player) = self.state.players.get_mut(&id) else {
                continue;
            };
            physics::apply_player_input(player, merged.movement, dt, now, &self.config);

            let Some(power) = merged.action_power else {
                continue;
            };
            let outcome = self.resolver.resolve_action(
                player,
                &mut self.state.ball,
                power,
                now,
                &self.config,
            );
            self.on_action(id, outcome);
        }
        self.queues.clear();

        // 2. Possession: magnetism, contests, free captures
        if let Some(change) = self.resolver.resolve(
            &self.state.players,
            &mut self.state.ball,
            now,
            dt,
            &self.config.possession,
        ) {
            self.on_possession_change(change);
        }

        // 3. Ball physics
        physics::advance_ball(&mut self.state.ball, dt, &self.config);

        // 4. Goal check
        physics::check_goal(&mut self.state.ball, &self.config)
    }

    fn on_action(&mut self, id: EntityId, outcome: ActionOutcome) {
        let frame = self.state.frame;
        match outcome {
            ActionOutcome::Shot { power, speed } => {
                trace!(shooter = %id, power, speed, "shot");
                self.state.push_event(GameEvent::possession_changed(
                    frame,
                    Some(id),
                    None,
                    PossessionReason::Shot,
                ));
                self.state.push_event(GameEvent::shot_taken(frame, id, power, speed));
                if let Some(observer) = self.observer.as_mut() {
                    observer.on_shot(id, power);
                }
            }
            ActionOutcome::Captured => {
                self.state.push_event(GameEvent::possession_changed(
                    frame,
                    None,
                    Some(id),
                    PossessionReason::Captured,
                ));
            }
            ActionOutcome::None => {}
        }
    }

    fn on_possession_change(&mut self, change: PossessionChange) {
        self.state.push_event(GameEvent::possession_changed(
            self.state.frame,
            change.from,
            change.to,
            change.reason,
        ));
    }

    // =========================================================================
    // GOALS AND MATCH END
    // =========================================================================

    /// Score, reset to kickoff, and pause until `now + goal_pause_ms`.
    ///
    /// A resume already pending is replaced, never stacked.
    fn handle_goal(&mut self, side: GoalSide, now: f64) {
        let team = side.scoring_team();
        self.state.add_goal(team);

        let goal = GoalInfo {
            team,
            side,
            time_remaining_ms: self.state.time_remaining_ms,
            score_a: self.state.score_a,
            score_b: self.state.score_b,
        };
        info!(
            ?team,
            ?side,
            score_a = goal.score_a,
            score_b = goal.score_b,
            frame = self.state.frame,
            "goal"
        );

        self.kickoff();
        self.queues.clear();
        self.accumulator_ms = 0.0;

        self.state.push_event(GameEvent::goal_scored(self.state.frame, goal));
        if let Some(observer) = self.observer.as_mut() {
            observer.on_goal(&goal);
        }

        self.schedule_resume(now);
    }

    fn schedule_resume(&mut self, now: f64) {
        if let Some(stale) = self.goal_pause.take() {
            debug!(token = stale.token, "pending resume replaced");
        }
        let token = self.next_resume_token;
        self.next_resume_token += 1;
        self.goal_pause = Some(ResumeRecord {
            fire_at_ms: now + self.config.goal_pause_ms,
            token,
        });
    }

    fn poll_resume(&mut self, now: f64) {
        let Some(record) = self.goal_pause else {
            return;
        };
        if now < record.fire_at_ms {
            return;
        }
        self.goal_pause = None;
        self.state
            .push_event(GameEvent::new(self.state.frame, GameEventData::PlayResumed));
        debug!(token = record.token, now, "play resumed");
    }

    fn advance_match_time(&mut self, delta_ms: f64) {
        self.state.time_remaining_ms = (self.state.time_remaining_ms - delta_ms).max(0.0);
        if self.state.time_remaining_ms <= 0.0 && self.state.phase == MatchPhase::Playing {
            self.end_match();
        }
    }

    /// End the match. Further updates are no-ops.
    fn end_match(&mut self) {
        self.goal_pause = None;
        self.accumulator_ms = 0.0;
        self.queues.clear();
        self.set_phase(MatchPhase::Ended);

        let result = FinalScore {
            score_a: self.state.score_a,
            score_b: self.state.score_b,
            frame: self.state.frame,
        };
        self.state.push_event(GameEvent::match_ended(self.state.frame, result));
        if let Some(observer) = self.observer.as_mut() {
            observer.on_match_end(&result);
        }
        info!(
            score_a = result.score_a,
            score_b = result.score_b,
            frame = result.frame,
            "match ended"
        );
    }
}

impl std::fmt::Debug for MatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchEngine")
            .field("phase", &self.state.phase)
            .field("frame", &self.state.frame)
            .field("groups", &self.groups.len())
            .field("accumulator_ms", &self.accumulator_ms)
            .field("goal_pause", &self.goal_pause)
            .field("resolver", &self.resolver)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
