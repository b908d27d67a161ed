//! Task exit and zombie reaping.
//!
//! An exiting task becomes a zombie that keeps its status and stack until a
//! waiter reaps it. The zombie's own stack is still in use while it switches
//! away, so it is never freed by the exiting task itself.

use bitflags::bitflags;
use log::{debug, warn};

use super::priority::SchedState;
use super::task::{Membership, Task};
use super::{Pid, SchedError, Scheduler, TaskState, WaitReason, WaitTarget};
use crate::arch::{Arch, IrqGuard};

bitflags! {
    /// Modifiers for [`Scheduler::wait`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WaitOptions: u32 {
        /// Return `Ok(None)` instead of sleeping when no child has exited.
        const WNOHANG = 1;
    }
}

/// A child collected by [`Scheduler::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    pub pid: Pid,
    /// Status the child passed to `exit` (or returned from its entry).
    pub status: i32,
}

impl Reaped {
    /// Status word in the `waitpid` encoding: low status byte shifted into
    /// bits 8..16.
    pub const fn wait_status(&self) -> i32 {
        (self.status & 0xff) << 8
    }
}

enum ExitRefused {
    NotInitialized,
    Root,
}

impl<S> SchedState<S> {
    /// Turns the current task into a zombie and wakes the first exit waiter
    /// interested in it.
    ///
    /// Returns the exiting pid and the woken waiter, if any.
    fn retire_current(&mut self, status: i32) -> Result<(Pid, Option<Pid>), ExitRefused> {
        let pid = self.current.ok_or(ExitRefused::NotInitialized)?;
        if pid == Pid::ROOT {
            return Err(ExitRefused::Root);
        }

        let Some(task) = self.tasks.get_mut(&pid) else {
            panic!("scheduler: current pid {} not in the task table", pid);
        };
        debug_assert_eq!(task.state, TaskState::Running);
        task.state = TaskState::Zombie;
        task.status = status;
        task.linked = Membership::Zombies;
        let parent = task.parent;
        self.zombies.push_back(pid);

        let waiter = self.waiters.iter().copied().find(|&waiter| {
            match self.tasks.get(&waiter).and_then(|t| t.wait_state) {
                Some(WaitReason::Child(WaitTarget::Pid(target))) => target == pid,
                Some(WaitReason::Child(WaitTarget::AnyChild)) => parent == Some(waiter),
                _ => false,
            }
        });
        // Unlinks it from `waiters` too.
        if let Some(waiter) = waiter {
            self.wake(waiter);
        }
        Ok((pid, waiter))
    }

    /// Unlinks the first zombie matching `target` from the queue and the
    /// task table.
    ///
    /// `AnyChild` only matches children of `caller`; an exact pid matches
    /// regardless of parenthood.
    fn take_zombie(&mut self, caller: Pid, target: WaitTarget) -> Option<Task<S>> {
        let index = self.zombies.iter().position(|&zombie| match target {
            WaitTarget::Pid(pid) => zombie == pid,
            WaitTarget::AnyChild => self
                .tasks
                .get(&zombie)
                .is_some_and(|task| task.parent == Some(caller)),
        })?;
        let pid = self.zombies.remove(index)?;
        let task = self.tasks.remove(&pid)?;
        debug_assert_eq!(task.state, TaskState::Zombie);
        debug_assert_eq!(task.linked, Membership::Zombies);
        Some(task)
    }

    /// Puts the current task to sleep in the exit-waiter queue.
    fn park_waiter(&mut self, target: WaitTarget) -> Option<Pid> {
        let pid = self.suspend_current(WaitReason::Child(target), Membership::Waiters)?;
        self.waiters.push_back(pid);
        Some(pid)
    }
}

impl<A: Arch> Scheduler<A> {
    /// Terminates the calling task with `status`.
    ///
    /// The task becomes a zombie, the first waiter interested in it is
    /// woken, and the CPU moves on. This only returns, with no effect, for
    /// the root task or before [`Scheduler::init`].
    pub fn exit(&self, status: i32) {
        let _irq = IrqGuard::new(self.arch());
        let (pid, waiter) = match self.with_state(|state| state.retire_current(status)) {
            Ok(exited) => exited,
            Err(ExitRefused::Root) => {
                warn!(target: "sched", "can't exit kernel main process");
                return;
            }
            Err(ExitRefused::NotInitialized) => {
                warn!(target: "sched", "exit before init");
                return;
            }
        };

        match waiter {
            Some(waiter) => debug!(target: "sched", "pid {} exited ({}), waking {}", pid, status, waiter),
            None => debug!(target: "sched", "pid {} exited ({})", pid, status),
        }

        // A zombie is never picked again, so this loop only spins while
        // nothing at all is ready.
        loop {
            self.schedule();
            self.idle_once();
        }
    }

    /// Collects an exited task.
    ///
    /// `pid == -1` waits for any child of the caller, `pid >= 0` for that
    /// exact task; `pid < -1` is [`SchedError::NotSupported`]. Without
    /// [`WaitOptions::WNOHANG`] the caller sleeps until a match exits. With
    /// it, `Ok(None)` means nothing matching has exited yet (or never will).
    ///
    /// The reaped task's stack and control block are freed here, once.
    pub fn wait(&self, pid: i32, options: WaitOptions) -> Result<Option<Reaped>, SchedError> {
        let target = WaitTarget::from_raw(pid)?;
        let _irq = IrqGuard::new(self.arch());

        loop {
            let (caller, zombie) = self.with_state(|state| {
                let caller = state.current.ok_or(SchedError::NotInitialized)?;
                Ok::<_, SchedError>((caller, state.take_zombie(caller, target)))
            })?;

            if let Some(task) = zombie {
                let reaped = Reaped {
                    pid: task.pid,
                    status: task.status,
                };
                // Frees the stack and context outside the lock.
                drop(task);
                debug!(target: "sched", "pid {} reaped pid {} ({})", caller, reaped.pid, reaped.status);
                return Ok(Some(reaped));
            }

            if options.contains(WaitOptions::WNOHANG) {
                return Ok(None);
            }

            if self.with_state(|state| state.park_waiter(target)).is_some() {
                self.switch_away(caller);
            }
        }
    }
}
