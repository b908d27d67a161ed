//! Tick clock and timed sleeps.
//!
//! The timer interrupt calls [`Clock::on_tick`] once per period. Each tick
//! advances the clock, wakes every sleeper whose deadline has passed and,
//! on every `reschedule_every`-th tick, preempts the running task.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

use log::trace;

use crate::arch::Arch;
use crate::scheduler::{Scheduler, WaitReason};
use crate::sync::WaitQueue;

pub struct Clock<A: Arch> {
    sched: &'static Scheduler<A>,
    ticks: AtomicU64,
    now_ns: AtomicU64,
    period_ns: u64,
    reschedule_every: u64,
    sleepers: WaitQueue,
}

impl<A: Arch> Clock<A> {
    /// Clock at time zero, ticking at the scheduler's configured rate.
    pub const fn new(sched: &'static Scheduler<A>) -> Self {
        let config = sched.config();
        Self {
            sched,
            ticks: AtomicU64::new(0),
            now_ns: AtomicU64::new(0),
            period_ns: config.clock_period_ns(),
            reschedule_every: config.reschedule_every,
            sleepers: WaitQueue::new(),
        }
    }

    /// Timer interrupt handler.
    pub fn on_tick(&self) {
        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let now = self.now_ns.fetch_add(self.period_ns, Ordering::Relaxed) + self.period_ns;

        if !self.sleepers.is_empty(self.sched.arch()) {
            let woken = self.sched.wake_where(&self.sleepers, |reason| {
                matches!(reason, WaitReason::Deadline(deadline) if *deadline <= now)
            });
            if woken > 0 {
                trace!(target: "clock", "tick {}: woke {} sleeper(s)", ticks, woken);
            }
        }

        if self.reschedule_every != 0 && ticks % self.reschedule_every == 0 {
            self.sched.schedule();
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Nanoseconds since the clock started.
    pub fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::Relaxed)
    }

    pub fn gettime(&self) -> Duration {
        Duration::from_nanos(self.now_ns())
    }

    /// Sleeps until the clock reaches `deadline_ns`.
    ///
    /// Returns immediately if it already has.
    pub fn sleep_until(&self, deadline_ns: u64) {
        if deadline_ns <= self.now_ns() {
            return;
        }
        self.sched
            .sleep_on(&self.sleepers, WaitReason::Deadline(deadline_ns));
    }

    /// Sleeps for at least `delay`, rounded up to the next tick.
    pub fn sleep_for(&self, delay: Duration) {
        let delay_ns = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        self.sleep_until(self.now_ns().saturating_add(delay_ns));
    }

    /// Tasks currently in a timed sleep.
    pub fn sleeper_count(&self) -> usize {
        self.sleepers.len(self.sched.arch())
    }
}
