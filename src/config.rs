//! Scheduler tunables.

use crate::scheduler::{Priority, DEFAULT_PRIORITY};

/// Stack size of kernel threads started without an explicit size.
pub const DEFAULT_STACK_SIZE: usize = 2046;

/// Stack size of the idle thread.
pub const IDLE_STACK_SIZE: usize = 510;

/// Priority of the idle thread: below anything a caller would pick.
pub const IDLE_PRIORITY: Priority = -32767;

/// Tick period of the system clock.
pub const CLOCK_PERIOD_MS: u64 = 10;

/// The clock preempts the running task on every n-th tick.
pub const RESCHEDULE_EVERY: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub default_stack_size: usize,
    pub idle_stack_size: usize,
    pub idle_priority: Priority,
    /// Priority of the boot context adopted as the root task.
    pub root_priority: Priority,
    pub clock_period_ms: u64,
    pub reschedule_every: u64,
}

impl SchedulerConfig {
    pub const DEFAULT: Self = Self {
        default_stack_size: DEFAULT_STACK_SIZE,
        idle_stack_size: IDLE_STACK_SIZE,
        idle_priority: IDLE_PRIORITY,
        root_priority: DEFAULT_PRIORITY,
        clock_period_ms: CLOCK_PERIOD_MS,
        reschedule_every: RESCHEDULE_EVERY,
    };

    pub const fn with_default_stack_size(mut self, size: usize) -> Self {
        self.default_stack_size = size;
        self
    }

    pub const fn with_idle_priority(mut self, priority: Priority) -> Self {
        self.idle_priority = priority;
        self
    }

    pub const fn with_root_priority(mut self, priority: Priority) -> Self {
        self.root_priority = priority;
        self
    }

    pub const fn with_clock_period_ms(mut self, period_ms: u64) -> Self {
        self.clock_period_ms = period_ms;
        self
    }

    /// `0` disables preemption from the clock.
    pub const fn with_reschedule_every(mut self, ticks: u64) -> Self {
        self.reschedule_every = ticks;
        self
    }

    pub const fn clock_period_ns(&self) -> u64 {
        self.clock_period_ms * 1_000_000
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
