use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Timings;
use crate::scheduler::{Action, Scheduler, SequenceHandle, Step};

pub const LIGHT_COUNT: usize = 5;

/// Authoritative round state; exactly one variant is live at a time
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GameState {
    Ready,
    Signaling { lit_count: u8 },
    Waiting,
    TapNow { go_timestamp: Instant },
    Result { reaction_millis: f64 },
}

/// Payload-free name of a [`GameState`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    Ready,
    Signaling,
    Waiting,
    TapNow,
    Result,
}

impl GameState {
    pub fn phase(&self) -> Phase {
        match self {
            GameState::Ready => Phase::Ready,
            GameState::Signaling { .. } => Phase::Signaling,
            GameState::Waiting => Phase::Waiting,
            GameState::TapNow { .. } => Phase::TapNow,
            GameState::Result { .. } => Phase::Result,
        }
    }

    pub fn lit_count(&self) -> usize {
        match self {
            GameState::Signaling { lit_count } => *lit_count as usize,
            _ => 0,
        }
    }
}

/// What the presentation layer gets to see
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Snapshot {
    pub phase: Phase,
    pub lights: [bool; LIGHT_COUNT],
    pub reaction_millis: Option<f64>,
}

/// The reaction game. Owns the round state and the scheduler that drives
/// the light sequence; the event loop must call [`Game::tick`] regularly.
#[derive(Debug)]
pub struct Game<K = SystemClock> {
    state: GameState,
    timings: Timings,
    clock: K,
    rng: StdRng,
    scheduler: Scheduler<Game<K>>,
    round: Vec<SequenceHandle>,
    go_delay: Option<Duration>,
}

impl Game<SystemClock> {
    pub fn new(timings: Timings) -> Self {
        Self::with_clock(timings, SystemClock, None)
    }
}

impl<K: Clock + 'static> Game<K> {
    /// `seed` makes the go delays reproducible
    pub fn with_clock(timings: Timings, clock: K, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            state: GameState::Ready,
            timings,
            clock,
            rng,
            scheduler: Scheduler::new(),
            round: Vec::new(),
            go_delay: None,
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn lights(&self) -> [bool; LIGHT_COUNT] {
        let lit = self.state.lit_count();
        std::array::from_fn(|i| i < lit)
    }

    pub fn reaction_millis(&self) -> Option<f64> {
        match self.state {
            GameState::Result { reaction_millis } => Some(reaction_millis),
            _ => None,
        }
    }

    /// Delay drawn for the current round's go signal, once the lights are out
    pub fn go_delay(&self) -> Option<Duration> {
        self.go_delay
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.state.phase(),
            lights: self.lights(),
            reaction_millis: self.reaction_millis(),
        }
    }

    /// True while any step of the current round is still scheduled
    pub fn has_pending_timers(&self) -> bool {
        !self.scheduler.is_idle()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Begin a round. Only valid from `Ready`; returns whether it took effect.
    pub fn start(&mut self) -> bool {
        if self.state != GameState::Ready {
            debug!(state = %self.state.phase(), "start ignored");
            return false;
        }

        self.state = GameState::Signaling { lit_count: 0 };

        let t = self.timings;
        let mut steps = Vec::with_capacity(LIGHT_COUNT + 1);
        steps.push(Self::step(t.initial_light_delay, Self::advance_light));
        for _ in 1..LIGHT_COUNT {
            steps.push(Self::step(t.inter_light_delay, Self::advance_light));
        }
        steps.push(Self::step(t.extinguish_hold, Self::extinguish_all));

        let handle = self.scheduler.schedule_sequence(self.clock.now(), steps);
        self.round.push(handle);
        info!(?handle, "round started");
        true
    }

    fn step(delay: Duration, f: fn(&mut Self)) -> Step<Self> {
        let action: Action<Self> = Box::new(f);
        (delay, action)
    }

    /// Run every scheduler step that is due
    pub fn tick(&mut self) {
        let now = self.clock.now();
        for fired in self.scheduler.poll(now) {
            let handle = fired.handle();
            if self.scheduler.is_cancelled(handle) || !self.round.contains(&handle) {
                warn!(?handle, "discarding stale timer");
                continue;
            }
            fired.fire(self);
        }
    }

    pub(crate) fn advance_light(&mut self) {
        match self.state {
            GameState::Signaling { lit_count } if (lit_count as usize) < LIGHT_COUNT => {
                self.state = GameState::Signaling {
                    lit_count: lit_count + 1,
                };
                debug!(lit = lit_count + 1, "light on");
            }
            other => warn!(state = ?other, "advance_light outside of signaling"),
        }
    }

    pub(crate) fn extinguish_all(&mut self) {
        if self.state.lit_count() != LIGHT_COUNT {
            warn!(state = ?self.state, "extinguish_all before all lights were lit");
            return;
        }

        self.state = GameState::Waiting;

        let delay = self.draw_go_delay();
        self.go_delay = Some(delay);
        let (delay, action) = Self::step(delay, Self::signal_go);
        let handle = self.scheduler.schedule_go(self.clock.now(), delay, action);
        self.round.push(handle);
        debug!(?delay, "lights out");
    }

    pub(crate) fn signal_go(&mut self) {
        if self.state != GameState::Waiting {
            warn!(state = ?self.state, "signal_go outside of waiting");
            return;
        }
        self.state = GameState::TapNow {
            go_timestamp: self.clock.now(),
        };
        info!("go");
    }

    /// Record a response. Only counts in `TapNow`; early or late taps are
    /// dropped without penalty.
    pub fn tap(&mut self) -> Option<f64> {
        match self.state {
            GameState::TapNow { go_timestamp } => {
                let elapsed = self.clock.now().saturating_duration_since(go_timestamp);
                let reaction_millis = elapsed.as_nanos() as f64 / 1_000_000.0;
                self.state = GameState::Result { reaction_millis };
                info!(reaction_millis, "tap");
                Some(reaction_millis)
            }
            other => {
                debug!(state = %other.phase(), "tap ignored");
                None
            }
        }
    }

    /// Back to `Ready` from anywhere. Pending timers die first.
    pub fn reset(&mut self) {
        for handle in self.round.drain(..) {
            self.scheduler.cancel(handle);
        }
        self.state = GameState::Ready;
        self.go_delay = None;
        debug!("reset");
    }

    fn draw_go_delay(&mut self) -> Duration {
        let t = &self.timings;
        if !t.randomize_go {
            return t.announce_gap;
        }
        let (lo, hi) = if t.min_go_delay <= t.max_go_delay {
            (t.min_go_delay, t.max_go_delay)
        } else {
            (t.max_go_delay, t.min_go_delay)
        };
        self.rng.gen_range(lo..=hi)
    }
}
