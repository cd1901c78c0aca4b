//! Controllable Time Source
//!
//! The only place the simulation reads time. Three modes:
//!
//! ```text
//! Real        now = base + host_elapsed
//! Scaled(f)   now = base + host_elapsed * f
//! Manual      now = base, advanced only by tick(delta)
//! ```
//!
//! Timers are stored as `{deadline, callback}` in registration order. Manual
//! mode fires them from `tick()`; real/scaled modes fire them from
//! `run_due()`, which the host pumps once per frame. Everything runs on the
//! caller's thread.

use std::fmt;
use std::time::Instant;
use tracing::{debug, warn};

/// Milliseconds of clock time.
pub type Millis = f64;

/// Host-side monotonic time, in milliseconds since an arbitrary origin.
pub trait MonotonicSource {
    /// Elapsed milliseconds. Must never decrease.
    fn elapsed_ms(&self) -> Millis;
}

/// `std::time::Instant` backed monotonic source.
pub struct SystemMonotonic {
    origin: Instant,
}

impl SystemMonotonic {
    /// Start counting from now.
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemMonotonic {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicSource for SystemMonotonic {
    fn elapsed_ms(&self) -> Millis {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// How the clock advances.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClockMode {
    /// Follows the host clock 1:1.
    Real,
    /// Follows the host clock multiplied by a positive factor.
    Scaled(f64),
    /// Advances only through [`Clock::tick`].
    Manual,
}

impl ClockMode {
    fn factor(self) -> f64 {
        match self {
            ClockMode::Real | ClockMode::Manual => 1.0,
            ClockMode::Scaled(f) => f,
        }
    }
}

/// Clock errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClockError {
    /// Scale factor must be finite and strictly positive.
    #[error("invalid time scale {0}: must be finite and > 0")]
    InvalidScale(f64),
}

/// Handle for a scheduled callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerToken(u64);

struct PendingTimer {
    token: TimerToken,
    deadline: Millis,
    callback: Box<dyn FnOnce()>,
}

/// Injectable simulation clock.
pub struct Clock {
    mode: ClockMode,
    source: Box<dyn MonotonicSource>,
    /// Clock reading at `anchor`.
    base: Millis,
    /// Host reading when `base` was captured.
    anchor: Millis,
    paused: bool,
    timers: Vec<PendingTimer>,
    next_token: u64,
}

impl Clock {
    /// Real-time clock on the host's monotonic clock.
    pub fn real() -> Self {
        Self::with_source(ClockMode::Real, Box::new(SystemMonotonic::new()))
    }

    /// Scaled real-time clock. Rejects non-positive factors.
    pub fn scaled(factor: f64) -> Result<Self, ClockError> {
        validate_scale(factor)?;
        Ok(Self::with_source(ClockMode::Scaled(factor), Box::new(SystemMonotonic::new())))
    }

    /// Manual clock starting at zero.
    pub fn manual() -> Self {
        Self::with_source(ClockMode::Manual, Box::new(SystemMonotonic::new()))
    }

    /// Clock over an arbitrary monotonic source.
    pub fn with_source(mode: ClockMode, source: Box<dyn MonotonicSource>) -> Self {
        let anchor = source.elapsed_ms();
        Self {
            mode,
            source,
            base: 0.0,
            anchor,
            paused: false,
            timers: Vec::new(),
            next_token: 0,
        }
    }

    /// Current mode.
    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Whether the clock only moves through `tick()`.
    pub fn is_manual(&self) -> bool {
        matches!(self.mode, ClockMode::Manual)
    }

    /// Whether real-time advancement is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Current reading in milliseconds.
    pub fn now(&self) -> Millis {
        if self.is_manual() || self.paused {
            return self.base;
        }
        let host_delta = (self.source.elapsed_ms() - self.anchor).max(0.0);
        self.base + host_delta * self.mode.factor()
    }

    /// Switch mode, keeping the current reading.
    ///
    /// Entering manual mode drops any pause, so a later switch back to
    /// real time starts running immediately.
    pub fn set_mode(&mut self, mode: ClockMode) -> Result<(), ClockError> {
        if let ClockMode::Scaled(factor) = mode {
            validate_scale(factor)?;
        }
        self.rebase();
        self.mode = mode;
        if self.is_manual() {
            self.paused = false;
        }
        debug!(?mode, now = self.base, "clock mode changed");
        Ok(())
    }

    /// Switch to scaled real time with the given factor.
    pub fn set_scale(&mut self, factor: f64) -> Result<(), ClockError> {
        self.set_mode(ClockMode::Scaled(factor))
    }

    /// Stop real-time advancement. Accumulated time is kept.
    pub fn pause(&mut self) {
        if self.is_manual() || self.paused {
            return;
        }
        self.base = self.now();
        self.paused = true;
    }

    /// Restart real-time advancement from the paused reading.
    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.anchor = self.source.elapsed_ms();
        self.paused = false;
    }

    /// Advance a manual clock and fire due timers.
    ///
    /// No-op with a warning in real/scaled mode.
    pub fn tick(&mut self, delta_ms: Millis) {
        if !self.is_manual() {
            warn!(mode = ?self.mode, "Clock::tick ignored outside manual mode");
            return;
        }
        if !delta_ms.is_finite() || delta_ms < 0.0 {
            warn!(delta_ms, "Clock::tick ignored non-monotonic delta");
            return;
        }
        self.base += delta_ms;
        self.fire_due();
    }

    /// Fire timers whose deadline has passed. Returns how many fired.
    pub fn run_due(&mut self) -> usize {
        self.fire_due()
    }

    /// Run `callback` once `delay_ms` of clock time has elapsed.
    pub fn schedule<F>(&mut self, callback: F, delay_ms: Millis) -> TimerToken
    where
        F: FnOnce() + 'static,
    {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        let delay = if delay_ms.is_finite() { delay_ms.max(0.0) } else { 0.0 };
        self.timers.push(PendingTimer {
            token,
            deadline: self.now() + delay,
            callback: Box::new(callback),
        });
        token
    }

    /// Remove a pending timer. Returns whether one was removed.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.token != token);
        before != self.timers.len()
    }

    /// Number of timers still waiting.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    fn rebase(&mut self) {
        self.base = self.now();
        self.anchor = self.source.elapsed_ms();
    }

    fn fire_due(&mut self) -> usize {
        let now = self.now();
        if !self.timers.iter().any(|t| t.deadline <= now) {
            return 0;
        }
        // Split preserving registration order on both sides.
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.timers)
            .into_iter()
            .partition(|t| t.deadline <= now);
        self.timers = pending;
        let fired = due.len();
        for timer in due {
            (timer.callback)();
        }
        fired
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("mode", &self.mode)
            .field("now", &self.now())
            .field("paused", &self.paused)
            .field("pending_timers", &self.timers.len())
            .finish()
    }
}

fn validate_scale(factor: f64) -> Result<(), ClockError> {
    if factor.is_finite() && factor > 0.0 {
        Ok(())
    } else {
        Err(ClockError::InvalidScale(factor))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Host clock the test moves by hand.
    #[derive(Clone, Default)]
    struct FakeHost(Rc<Cell<f64>>);

    impl FakeHost {
        fn advance(&self, ms: f64) {
            self.0.set(self.0.get() + ms);
        }
    }

    impl MonotonicSource for FakeHost {
        fn elapsed_ms(&self) -> Millis {
            self.0.get()
        }
    }

    fn fake_clock(mode: ClockMode) -> (Clock, FakeHost) {
        let host = FakeHost::default();
        (Clock::with_source(mode, Box::new(host.clone())), host)
    }

    #[test]
    fn test_manual_advances_only_on_tick() {
        let (mut clock, host) = fake_clock(ClockMode::Manual);
        host.advance(500.0);
        assert_eq!(clock.now(), 0.0);

        clock.tick(16.0);
        clock.tick(4.0);
        assert_eq!(clock.now(), 20.0);
    }

    #[test]
    fn test_tick_ignored_in_real_mode() {
        let (mut clock, host) = fake_clock(ClockMode::Real);
        host.advance(100.0);
        clock.tick(1000.0);
        assert_eq!(clock.now(), 100.0);
    }

    #[test]
    fn test_negative_tick_ignored() {
        let mut clock = Clock::manual();
        clock.tick(10.0);
        clock.tick(-5.0);
        clock.tick(f64::NAN);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn test_scaled_multiplies_host_delta() {
        let (clock, host) = fake_clock(ClockMode::Scaled(2.0));
        host.advance(50.0);
        assert_eq!(clock.now(), 100.0);
    }

    #[test]
    fn test_rejects_non_positive_scale() {
        assert_eq!(Clock::scaled(0.0).unwrap_err(), ClockError::InvalidScale(0.0));
        assert!(Clock::scaled(-1.0).is_err());
        assert!(Clock::scaled(f64::NAN).is_err());

        let (mut clock, host) = fake_clock(ClockMode::Real);
        host.advance(10.0);
        assert!(clock.set_scale(-2.0).is_err());
        assert_eq!(clock.mode(), ClockMode::Real);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn test_mode_switch_keeps_reading() {
        let (mut clock, host) = fake_clock(ClockMode::Real);
        host.advance(40.0);
        clock.set_scale(0.5).unwrap();
        assert_eq!(clock.now(), 40.0);
        host.advance(40.0);
        assert_eq!(clock.now(), 60.0);

        clock.set_mode(ClockMode::Manual).unwrap();
        host.advance(1000.0);
        assert_eq!(clock.now(), 60.0);
    }

    #[test]
    fn test_manual_detour_clears_pause() {
        let (mut clock, host) = fake_clock(ClockMode::Real);
        host.advance(20.0);
        clock.pause();
        host.advance(50.0);

        clock.set_mode(ClockMode::Manual).unwrap();
        assert!(!clock.is_paused());
        assert_eq!(clock.now(), 20.0);
        clock.tick(5.0);

        clock.set_mode(ClockMode::Real).unwrap();
        assert_eq!(clock.now(), 25.0);
        host.advance(10.0);
        assert_eq!(clock.now(), 35.0);
    }

    #[test]
    fn test_pause_survives_real_to_scaled_switch() {
        let (mut clock, host) = fake_clock(ClockMode::Real);
        host.advance(10.0);
        clock.pause();
        clock.set_scale(2.0).unwrap();
        host.advance(100.0);
        assert!(clock.is_paused());
        assert_eq!(clock.now(), 10.0);

        clock.resume();
        host.advance(5.0);
        assert_eq!(clock.now(), 20.0);
    }

    #[test]
    fn test_pause_resume_keeps_scaled_time() {
        let (mut clock, host) = fake_clock(ClockMode::Scaled(3.0));
        host.advance(10.0);
        clock.pause();
        assert!(clock.is_paused());
        host.advance(100.0);
        assert_eq!(clock.now(), 30.0);

        clock.resume();
        host.advance(10.0);
        assert_eq!(clock.now(), 60.0);
    }

    #[test]
    fn test_manual_timers_fire_in_registration_order() {
        let mut clock = Clock::manual();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (name, delay) in [("b", 30.0), ("a", 10.0), ("c", 30.0)] {
            let log = Rc::clone(&log);
            clock.schedule(move || log.borrow_mut().push(name), delay);
        }

        clock.tick(5.0);
        assert!(log.borrow().is_empty());

        clock.tick(100.0);
        assert_eq!(*log.borrow(), vec!["b", "a", "c"]);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn test_cancel_removes_timer() {
        let mut clock = Clock::manual();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let token = clock.schedule(move || flag.set(true), 10.0);

        assert!(clock.cancel(token));
        assert!(!clock.cancel(token));
        clock.tick(20.0);
        assert!(!fired.get());
    }

    #[test]
    fn test_scaled_timer_fires_on_run_due() {
        let (mut clock, host) = fake_clock(ClockMode::Scaled(2.0));
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        clock.schedule(move || counter.set(counter.get() + 1), 100.0);

        host.advance(49.0);
        assert_eq!(clock.run_due(), 0);
        host.advance(1.0);
        assert_eq!(clock.run_due(), 1);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_now_monotonic_in_manual_mode() {
        let mut clock = Clock::manual();
        let mut last = clock.now();
        for delta in [0.0, 1.5, 16.667, 0.0, 250.0] {
            clock.tick(delta);
            assert!(clock.now() >= last);
            last = clock.now();
        }
    }
}
