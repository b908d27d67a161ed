//! Request/completion handshake between a task and a device interrupt.
//!
//! A task submits a request, starts the device and waits on the request id.
//! The device's completion handler records the result and wakes exactly the
//! task waiting on that id. Completing before the wait is fine: the result
//! is kept until collected.

use alloc::collections::BTreeMap;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use log::{debug, warn};

use crate::arch::{Arch, IrqGuard};
use crate::scheduler::{SchedError, Scheduler, WaitReason};
use crate::sync::{IrqSpinLock, WaitQueue};

/// Identifies one outstanding I/O request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u32);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestSlot {
    Pending,
    Done(i32),
}

pub struct RequestQueue {
    next_id: AtomicU32,
    requests: IrqSpinLock<BTreeMap<RequestId, RequestSlot>>,
    sleepers: WaitQueue,
}

impl RequestQueue {
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            requests: IrqSpinLock::new(BTreeMap::new()),
            sleepers: WaitQueue::new(),
        }
    }

    /// Registers a new pending request.
    pub fn submit<A: Arch>(&self, sched: &Scheduler<A>) -> RequestId {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.requests.lock(sched.arch()).insert(id, RequestSlot::Pending);
        debug!(target: "io", "submitted {}", id);
        id
    }

    /// Blocks until `id` completes and returns its result.
    ///
    /// The request is retired on return. Unknown (or already collected) ids
    /// are [`SchedError::NoEntry`].
    pub fn wait<A: Arch>(&self, sched: &Scheduler<A>, id: RequestId) -> Result<i32, SchedError> {
        loop {
            // Checking the slot and going to sleep must not be split by the
            // completion interrupt.
            let _irq = IrqGuard::new(sched.arch());
            {
                let mut requests = self.requests.lock(sched.arch());
                match requests.get(&id).copied() {
                    None => return Err(SchedError::NoEntry),
                    Some(RequestSlot::Done(result)) => {
                        requests.remove(&id);
                        return Ok(result);
                    }
                    Some(RequestSlot::Pending) => {}
                }
            }
            sched.sleep_on(&self.sleepers, WaitReason::Io(id));
        }
    }

    /// Records the result of `id` and wakes its waiter. Interrupt safe.
    ///
    /// Unknown ids are [`SchedError::NoEntry`]; completing twice is
    /// [`SchedError::InvalidArgument`].
    pub fn complete<A: Arch>(&self, sched: &Scheduler<A>, id: RequestId, result: i32) -> Result<(), SchedError> {
        let _irq = IrqGuard::new(sched.arch());
        {
            let mut requests = self.requests.lock(sched.arch());
            match requests.get_mut(&id) {
                None => {
                    warn!(target: "io", "completion for unknown request {}", id);
                    return Err(SchedError::NoEntry);
                }
                Some(RequestSlot::Done(_)) => {
                    warn!(target: "io", "request {} completed twice", id);
                    return Err(SchedError::InvalidArgument);
                }
                Some(slot) => *slot = RequestSlot::Done(result),
            }
        }

        let woken = sched.wake_where(&self.sleepers, |reason| *reason == WaitReason::Io(id));
        debug!(target: "io", "completed {} ({}), woke {}", id, result, woken);
        Ok(())
    }

    /// Requests submitted and not yet collected by `wait`.
    pub fn outstanding<A: Arch>(&self, sched: &Scheduler<A>) -> usize {
        self.requests.lock(sched.arch()).len()
    }

    /// Tasks currently blocked in `wait`.
    pub fn sleeper_count<A: Arch>(&self, sched: &Scheduler<A>) -> usize {
        self.sleepers.len(sched.arch())
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}
