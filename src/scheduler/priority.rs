//! Priority scheduler core.
//!
//! A [`Scheduler`] owns every task control block, the ready queue and the
//! two lifecycle queues (zombies and exit waiters). All of it sits behind an
//! interrupt-masking spinlock; the lock is always released before the
//! context switch, while interrupts stay masked across it.
//!
//! Every queue the scheduler links tasks into has capacity reserved for all
//! live tasks at creation time, so the paths reachable from interrupt
//! context (`schedule`, `wake_up`, `exit`) never allocate.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;

use log::{debug, info, trace, warn};

use super::task::{ContextSlot, Membership, Task};
use super::{
    Bootstrap, Pid, Priority, ReadyEntry, ReadyQueue, SchedError, TaskContext, TaskStack,
    TaskState, WaitReason,
};
use crate::arch::{Arch, IrqGuard};
use crate::config::SchedulerConfig;
use crate::sync::{IrqSpinLock, WaitQueue};

pub(super) struct SchedState<S> {
    pub(super) current: Option<Pid>,
    next_pid: u32,
    pub(super) tasks: BTreeMap<Pid, Task<S>>,
    pub(super) ready: ReadyQueue,
    pub(super) zombies: VecDeque<Pid>,
    pub(super) waiters: VecDeque<Pid>,
}

/// Outcome of [`SchedState::pick_next`]: who gives up the CPU to whom.
struct Switch<S> {
    prev: Pid,
    next: Pid,
    prev_ctx: *mut TaskContext<S>,
    next_ctx: *mut TaskContext<S>,
}

impl<S> SchedState<S> {
    const fn new() -> Self {
        Self {
            current: None,
            next_pid: 0,
            tasks: BTreeMap::new(),
            ready: ReadyQueue::new(),
            zombies: VecDeque::new(),
            waiters: VecDeque::new(),
        }
    }

    /// Next unused pid, or `NoMemory` once the pid space is used up.
    fn allocate_pid(&mut self) -> Result<Pid, SchedError> {
        if self.next_pid > Pid::MAX.as_raw() as u32 {
            return Err(SchedError::NoMemory);
        }
        let pid = Pid::new(self.next_pid);
        self.next_pid += 1;
        Ok(pid)
    }

    /// Grows every scheduler-owned queue to hold one more live task.
    fn reserve_task_slot(&mut self) -> Result<(), SchedError> {
        let live = self.tasks.len() + 1;
        self.ready
            .try_reserve(live.saturating_sub(self.ready.len()))?;
        self.zombies
            .try_reserve(live.saturating_sub(self.zombies.len()))
            .map_err(|_| SchedError::NoMemory)?;
        self.waiters
            .try_reserve(live.saturating_sub(self.waiters.len()))
            .map_err(|_| SchedError::NoMemory)?;
        Ok(())
    }

    pub(super) fn task(&self, pid: Pid) -> Option<&Task<S>> {
        self.tasks.get(&pid)
    }

    fn task_mut_or_fault(&mut self, pid: Pid) -> &mut Task<S> {
        match self.tasks.get_mut(&pid) {
            Some(task) => task,
            None => panic!("scheduler: pid {} linked but not in the task table", pid),
        }
    }

    /// Pops the next task and rotates the current one back into the ready
    /// queue if it is still runnable.
    ///
    /// Returns `None`, changing nothing, when not initialized or when the
    /// ready queue is empty.
    fn pick_next(&mut self) -> Option<Switch<S>> {
        let prev = self.current?;
        let next = self.ready.pop_highest()?.pid;
        debug_assert_ne!(prev, next, "scheduler: current task found in ready queue");

        let next_task = self.task_mut_or_fault(next);
        debug_assert_eq!(next_task.linked, Membership::Ready);
        next_task.state = TaskState::Running;
        next_task.linked = Membership::Unlinked;
        let next_ctx = next_task.context.as_ptr();

        let prev_task = self.task_mut_or_fault(prev);
        let prev_ctx = prev_task.context.as_ptr();
        if prev_task.state == TaskState::Running {
            prev_task.state = TaskState::Ready;
            prev_task.linked = Membership::Ready;
            let priority = prev_task.priority;
            self.ready.insert(prev, priority);
        }

        self.current = Some(next);
        Some(Switch {
            prev,
            next,
            prev_ctx,
            next_ctx,
        })
    }

    /// Marks the current task `Waiting` for `reason`, linked into `membership`.
    pub(super) fn suspend_current(&mut self, reason: WaitReason, membership: Membership) -> Option<Pid> {
        let pid = self.current?;
        let task = self.task_mut_or_fault(pid);
        debug_assert_eq!(task.state, TaskState::Running);
        task.state = TaskState::Waiting;
        task.wait_state = Some(reason);
        task.linked = membership;
        Some(pid)
    }

    /// Makes a waiting task runnable.
    ///
    /// A task parked in the exit-waiter queue is unlinked from it here; a
    /// task on a caller-owned queue must already have been unlinked.
    pub(super) fn wake(&mut self, pid: Pid) -> bool {
        let current = self.current;
        let Some(task) = self.tasks.get_mut(&pid) else {
            warn!(target: "sched", "wake_up: no task with pid {}", pid);
            return false;
        };
        if task.state != TaskState::Waiting {
            warn!(target: "sched", "wake_up: pid {} is {:?}, not waiting", pid, task.state);
            return false;
        }

        if task.linked == Membership::Waiters {
            if let Some(index) = self.waiters.iter().position(|&waiter| waiter == pid) {
                self.waiters.remove(index);
            }
        }
        task.wait_state = None;
        if current == Some(pid) {
            // Woken before it managed to switch away (idle halt).
            task.state = TaskState::Running;
            task.linked = Membership::Unlinked;
            return true;
        }

        task.state = TaskState::Ready;
        task.linked = Membership::Ready;
        let priority = task.priority;
        self.ready.insert(pid, priority);
        true
    }

    fn is_waiting(&self, pid: Pid) -> bool {
        self.task(pid)
            .is_some_and(|task| task.state == TaskState::Waiting)
    }
}

/// Single-CPU priority scheduler.
///
/// Tasks capture `&'static Scheduler`, so instances live in a `static` (or
/// are leaked) before tasks are created.
pub struct Scheduler<A: Arch> {
    arch: A,
    config: SchedulerConfig,
    state: IrqSpinLock<SchedState<A::Saved>>,
}

impl<A: Arch> Scheduler<A> {
    pub const fn new(arch: A, config: SchedulerConfig) -> Self {
        Self {
            arch,
            config,
            state: IrqSpinLock::new(SchedState::new()),
        }
    }

    pub const fn arch(&self) -> &A {
        &self.arch
    }

    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[inline]
    pub(super) fn with_state<R>(&self, f: impl FnOnce(&mut SchedState<A::Saved>) -> R) -> R {
        let mut state = self.state.lock(&self.arch);
        f(&mut state)
    }

    /// Adopts the running boot context as the root task (pid 0).
    ///
    /// A second call is ignored.
    pub fn init(&self) {
        let root = self.with_state(|state| {
            if state.current.is_some() {
                return None;
            }
            let pid = Pid::ROOT;
            state.next_pid = 1;
            let root = Task::root(pid, self.config.root_priority, self.arch.root_context());
            state.tasks.insert(pid, root);
            state.current = Some(pid);
            Some(pid)
        });

        match root {
            Some(pid) => info!(target: "sched", "initialized, root pid {}", pid),
            None => warn!(target: "sched", "init called twice, ignoring"),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.with_state(|state| state.current.is_some())
    }

    /// Creates a ready task running `entry` on `stack`.
    ///
    /// The new task's parent is the calling task. It does not run until a
    /// later `schedule` picks it; the return value of `entry` becomes its
    /// exit status.
    pub fn create<F>(&'static self, entry: F, stack: TaskStack, priority: Priority) -> Result<Pid, SchedError>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        if !self.is_initialized() {
            return Err(SchedError::NotInitialized);
        }
        if stack.len() < A::BOOTSTRAP_FRAME_SIZE {
            warn!(
                target: "sched",
                "create: {} byte stack cannot hold the {} byte bootstrap frame",
                stack.len(),
                A::BOOTSTRAP_FRAME_SIZE
            );
            return Err(SchedError::InvalidArgument);
        }

        let bootstrap = Bootstrap::new(move || self.run_task(entry), stack.region());
        let context = ContextSlot::new(TaskContext::Fresh(bootstrap));

        let (pid, parent) = self.with_state(|state| {
            // Re-check under lock.
            let parent = state.current.ok_or(SchedError::NotInitialized)?;
            state.reserve_task_slot()?;
            let pid = state.allocate_pid()?;
            state
                .tasks
                .insert(pid, Task::fresh(pid, parent, priority, context, stack));
            state.ready.insert(pid, priority);
            Ok::<_, SchedError>((pid, parent))
        })?;

        debug!(target: "sched", "created pid {} (parent {}, priority {})", pid, parent, priority);
        Ok(pid)
    }

    /// Allocates a stack of `stack_size` bytes and creates a task on it.
    ///
    /// Nothing is allocated when the size is rejected.
    pub fn spawn<F>(&'static self, entry: F, stack_size: usize, priority: Priority) -> Result<Pid, SchedError>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        if !self.is_initialized() {
            return Err(SchedError::NotInitialized);
        }
        if stack_size < A::BOOTSTRAP_FRAME_SIZE {
            return Err(SchedError::InvalidArgument);
        }
        let stack = TaskStack::allocate(stack_size)?;
        self.create(entry, stack, priority)
    }

    /// Body run by the bootstrap trampoline.
    fn run_task(&self, entry: impl FnOnce() -> i32) {
        self.arch.enable();
        let status = entry();
        self.exit(status);
    }

    /// Hands the CPU to the head of the ready queue.
    ///
    /// The current task goes back into the ready queue if it is still
    /// running; a task that has just gone to sleep or exited does not.
    /// Returns immediately when not initialized or nothing is ready, and
    /// otherwise when this task is next switched back in.
    pub fn schedule(&self) {
        let _irq = IrqGuard::new(&self.arch);
        let Some(switch) = self.with_state(|state| state.pick_next()) else {
            return;
        };

        trace!(target: "sched", "switch {} -> {}", switch.prev, switch.next);
        // SAFETY:
        // - Both contexts live in boxed slots owned by tasks in the table. A
        //   task is only removed once it is a zombie, and zombies are never
        //   switched to.
        // - `pick_next` returns two distinct tasks.
        // - Interrupts are masked by `_irq` and the state lock is released.
        unsafe { self.arch.context_switch(switch.prev_ctx, switch.next_ctx) };
    }

    pub fn current_pid(&self) -> Result<Pid, SchedError> {
        self.with_state(|state| state.current)
            .ok_or(SchedError::NotInitialized)
    }

    /// Puts the calling task to sleep on `queue` until someone wakes it.
    ///
    /// `reason` is recorded on the task for wakers to match against.
    pub fn sleep_on(&self, queue: &WaitQueue, reason: WaitReason) {
        let _irq = IrqGuard::new(&self.arch);
        let Some(pid) = self.with_state(|state| state.suspend_current(reason, Membership::Foreign)) else {
            warn!(target: "sched", "sleep_on before init");
            return;
        };
        queue.push(&self.arch, pid);
        self.switch_away(pid);
    }

    /// Makes a sleeping task ready again.
    ///
    /// A task asleep on a [`WaitQueue`] must already have been removed from
    /// it; one asleep in `wait` is unlinked here. Returns `false` (and
    /// changes nothing) if it was not asleep.
    pub fn wake_up(&self, pid: Pid) -> bool {
        self.with_state(|state| state.wake(pid))
    }

    /// Unlinks `pid` from `queue` and wakes it in one critical section.
    ///
    /// Returns `false` if `pid` was not asleep on `queue`.
    pub fn wake_one(&self, queue: &WaitQueue, pid: Pid) -> bool {
        let mut state = self.state.lock(&self.arch);
        queue.remove(&self.arch, pid) && state.wake(pid)
    }

    /// Unlinks and wakes every sleeper on `queue` whose reason matches.
    ///
    /// Returns how many tasks were woken.
    pub fn wake_where(&self, queue: &WaitQueue, mut matches: impl FnMut(&WaitReason) -> bool) -> usize {
        let mut state = self.state.lock(&self.arch);
        let mut woken = 0;
        queue.retain(&self.arch, |&pid| {
            let hit = state
                .task(pid)
                .and_then(|task| task.wait_state.as_ref())
                .is_some_and(&mut matches);
            if hit && state.wake(pid) {
                woken += 1;
            }
            !hit
        });
        woken
    }

    /// Reason `pid` is asleep, or `None` if it is not waiting.
    pub fn wait_reason(&self, pid: Pid) -> Option<WaitReason> {
        self.with_state(|state| state.task(pid).and_then(|task| task.wait_state))
    }

    /// Switches away and keeps the caller (`pid`) off the CPU until it has
    /// been woken.
    ///
    /// With nothing else ready the switch is a no-op, so the CPU idles with
    /// interrupts enabled until a handler wakes someone.
    pub(super) fn switch_away(&self, pid: Pid) {
        self.schedule();
        while self.with_state(|state| state.is_waiting(pid)) {
            self.idle_once();
            self.schedule();
        }
    }

    pub(super) fn idle_once(&self) {
        self.arch.enable();
        self.arch.halt();
        self.arch.disable();
    }

    pub fn task_state(&self, pid: Pid) -> Option<TaskState> {
        self.with_state(|state| state.task(pid).map(|task| task.state))
    }

    pub fn task_priority(&self, pid: Pid) -> Option<Priority> {
        self.with_state(|state| state.task(pid).map(|task| task.priority))
    }

    /// Parent of `pid`. `Some(None)` for the root task.
    pub fn parent_of(&self, pid: Pid) -> Option<Option<Pid>> {
        self.with_state(|state| state.task(pid).map(|task| task.parent))
    }

    /// Size of the stack `pid` runs on, `None` for the root task.
    pub fn stack_len(&self, pid: Pid) -> Option<usize> {
        self.with_state(|state| {
            state
                .task(pid)
                .and_then(|task| task.stack.as_ref())
                .map(TaskStack::len)
        })
    }

    /// Ready queue contents, head first.
    pub fn ready_snapshot(&self) -> Vec<ReadyEntry> {
        self.with_state(|state| state.ready.iter().copied().collect())
    }

    pub fn zombie_count(&self) -> usize {
        self.with_state(|state| state.zombies.len())
    }

    /// Tasks asleep in `wait` for a child to exit.
    pub fn waiter_count(&self) -> usize {
        self.with_state(|state| state.waiters.len())
    }

    /// Live task control blocks, zombies included.
    pub fn task_count(&self) -> usize {
        self.with_state(|state| state.tasks.len())
    }
}
