//! Caller-owned queue of sleeping tasks.
//!
//! A `WaitQueue` only records which tasks sleep on it. Why a task sleeps is
//! kept on the task itself as a [`WaitReason`], which wakers inspect through
//! [`Scheduler::wake_where`] or [`Scheduler::wait_reason`].
//!
//! **Sleeping** (task context):
//! ```ignore
//! while !data_available() {
//!     sched.sleep_on(&QUEUE, WaitReason::Io(id));
//! }
//! ```
//!
//! **Waking** (IRQ or task context):
//! ```ignore
//! produce_data();
//! sched.wake_where(&QUEUE, |reason| *reason == WaitReason::Io(id));
//! ```
//!
//! A single known sleeper is unlinked and woken with [`Scheduler::wake_one`].
//! Manual wakers may instead [`WaitQueue::remove`] or
//! [`WaitQueue::pop_front`] it before calling [`Scheduler::wake_up`].
//!
//! Interrupt handlers touch the same queues, so every access masks
//! interrupts through the `irq` argument for as long as the lock is held.
//!
//! [`WaitReason`]: crate::scheduler::WaitReason
//! [`Scheduler::wake_where`]: crate::scheduler::Scheduler::wake_where
//! [`Scheduler::wait_reason`]: crate::scheduler::Scheduler::wait_reason
//! [`Scheduler::wake_one`]: crate::scheduler::Scheduler::wake_one
//! [`Scheduler::wake_up`]: crate::scheduler::Scheduler::wake_up

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use super::IrqSpinLock;
use crate::arch::Interrupts;
use crate::scheduler::Pid;

pub struct WaitQueue {
    sleepers: IrqSpinLock<VecDeque<Pid>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            sleepers: IrqSpinLock::new(VecDeque::new()),
        }
    }

    pub fn len<I: Interrupts + ?Sized>(&self, irq: &I) -> usize {
        self.sleepers.lock(irq).len()
    }

    pub fn is_empty<I: Interrupts + ?Sized>(&self, irq: &I) -> bool {
        self.sleepers.lock(irq).is_empty()
    }

    pub fn contains<I: Interrupts + ?Sized>(&self, irq: &I, pid: Pid) -> bool {
        self.sleepers.lock(irq).contains(&pid)
    }

    /// Sleepers in the order they went to sleep.
    pub fn pids<I: Interrupts + ?Sized>(&self, irq: &I) -> Vec<Pid> {
        self.sleepers.lock(irq).iter().copied().collect()
    }

    /// Unlinks the longest sleeper.
    pub fn pop_front<I: Interrupts + ?Sized>(&self, irq: &I) -> Option<Pid> {
        self.sleepers.lock(irq).pop_front()
    }

    pub(crate) fn push<I: Interrupts + ?Sized>(&self, irq: &I, pid: Pid) {
        self.sleepers.lock(irq).push_back(pid);
    }

    /// Unlinks `pid`; returns whether it was queued here.
    pub fn remove<I: Interrupts + ?Sized>(&self, irq: &I, pid: Pid) -> bool {
        let mut sleepers = self.sleepers.lock(irq);
        match sleepers.iter().position(|&p| p == pid) {
            Some(index) => {
                sleepers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Keeps the sleepers for which `keep` returns `true`, in order.
    pub(crate) fn retain<I: Interrupts + ?Sized>(&self, irq: &I, keep: impl FnMut(&Pid) -> bool) {
        self.sleepers.lock(irq).retain(keep);
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
