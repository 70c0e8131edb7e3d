//! Cancelable chains of delayed actions.
//!
//! The scheduler never owns a thread or a clock. The event loop calls
//! [`Scheduler::poll`] with the current instant and runs whatever comes
//! back, so every action executes on the caller's thread. Actions receive
//! their context at fire time instead of capturing it.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

pub type Action<C> = Box<dyn FnOnce(&mut C)>;

/// One link of a chain: wait `delay` after the previous link fired, then run
pub type Step<C> = (Duration, Action<C>);

/// Opaque token for cancelling an in-flight chain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceHandle(u64);

struct Chain<C> {
    handle: SequenceHandle,
    // None when `now + delay` is not representable; such a step never fires
    deadline: Option<Instant>,
    armed_in: u64,
    action: Action<C>,
    rest: VecDeque<Step<C>>,
}

/// An action released by [`Scheduler::poll`], ready to run
pub struct Fired<C> {
    handle: SequenceHandle,
    deadline: Instant,
    action: Action<C>,
}

impl<C> Fired<C> {
    pub fn handle(&self) -> SequenceHandle {
        self.handle
    }

    pub fn fire(self, ctx: &mut C) {
        (self.action)(ctx)
    }
}

impl<C> fmt::Debug for Fired<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fired")
            .field("handle", &self.handle)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

pub struct Scheduler<C> {
    chains: Vec<Chain<C>>,
    next_id: u64,
    generation: u64,
    // Chains cancelled since the last poll. Anything from the batch the
    // last poll released that belongs to one of these must not run.
    cancelled: HashSet<SequenceHandle>,
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self {
            chains: Vec::new(),
            next_id: 0,
            generation: 0,
            cancelled: HashSet::new(),
        }
    }

    /// Register a chain. The first step is armed relative to `now`; every
    /// later step is armed only once its predecessor has been released.
    /// An empty chain yields a handle that is already complete.
    pub fn schedule_sequence(&mut self, now: Instant, steps: Vec<Step<C>>) -> SequenceHandle {
        let handle = SequenceHandle(self.next_id);
        self.next_id += 1;

        let mut rest: VecDeque<Step<C>> = steps.into();
        if let Some((delay, action)) = rest.pop_front() {
            trace!(?handle, steps = rest.len() + 1, ?delay, "sequence scheduled");
            self.chains.push(Chain {
                handle,
                deadline: arm(handle, now, delay),
                armed_in: self.generation,
                action,
                rest,
            });
        }

        handle
    }

    /// Single-shot chain, used for the go signal
    pub fn schedule_go(&mut self, now: Instant, after: Duration, action: Action<C>) -> SequenceHandle {
        self.schedule_sequence(now, vec![(after, action)])
    }

    /// Drop every not-yet-released step of `handle`. Unknown, finished and
    /// already-cancelled handles are fine.
    pub fn cancel(&mut self, handle: SequenceHandle) {
        let before = self.chains.len();
        self.chains.retain(|chain| chain.handle != handle);
        if self.chains.len() != before {
            trace!(?handle, "sequence cancelled");
        }
        self.cancelled.insert(handle);
    }

    /// True if `handle` was cancelled after the most recent poll
    pub fn is_cancelled(&self, handle: SequenceHandle) -> bool {
        self.cancelled.contains(&handle)
    }

    /// Release every armed step whose deadline has passed, in deadline
    /// order. Steps armed during this call (including zero-delay ones) wait
    /// for the next poll.
    pub fn poll(&mut self, now: Instant) -> Vec<Fired<C>> {
        self.generation += 1;
        self.cancelled.clear();
        let generation = self.generation;

        let mut fired = Vec::new();
        let mut remaining = Vec::with_capacity(self.chains.len());

        for mut chain in self.chains.drain(..) {
            let due = chain
                .deadline
                .filter(|deadline| chain.armed_in < generation && *deadline <= now);
            let Some(deadline) = due else {
                remaining.push(chain);
                continue;
            };

            match chain.rest.pop_front() {
                Some((delay, next)) => {
                    let action = std::mem::replace(&mut chain.action, next);
                    fired.push(Fired {
                        handle: chain.handle,
                        deadline,
                        action,
                    });
                    chain.deadline = arm(chain.handle, now, delay);
                    chain.armed_in = generation;
                    remaining.push(chain);
                }
                None => fired.push(Fired {
                    handle: chain.handle,
                    deadline,
                    action: chain.action,
                }),
            }
        }

        self.chains = remaining;
        fired.sort_by_key(|f| (f.deadline, f.handle));
        fired
    }

    /// Number of steps that have not been released yet
    pub fn pending(&self) -> usize {
        self.chains.iter().map(|chain| chain.rest.len() + 1).sum()
    }

    pub fn is_idle(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.chains.iter().filter_map(|chain| chain.deadline).min()
    }
}

fn arm(handle: SequenceHandle, now: Instant, delay: Duration) -> Option<Instant> {
    let deadline = now.checked_add(delay);
    if deadline.is_none() {
        warn!(?handle, ?delay, "delay overflows the clock, step will never fire");
    }
    deadline
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("chains", &self.chains.len())
            .field("pending", &self.pending())
            .field("generation", &self.generation)
            .finish()
    }
}
