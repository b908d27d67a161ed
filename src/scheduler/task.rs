//! Task control block and the pieces a task is built from.

use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::fmt;
use core::ptr::NonNull;

use alloc::alloc as heap_alloc;
use alloc::boxed::Box;

use super::SchedError;
use crate::io::RequestId;

/// Scheduling priority. Larger values run first.
pub type Priority = i32;

/// Priority used when a caller has no opinion.
pub const DEFAULT_PRIORITY: Priority = 0;

const STACK_ALIGNMENT: usize = 16;

/// Process identifier. Allocated monotonically from 0 and never reused.
///
/// Pids stay within `0..=Pid::MAX`, so every pid has a system-call value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u32);

impl Pid {
    /// The boot context adopted by [`Scheduler::init`](super::Scheduler::init).
    pub const ROOT: Pid = Pid(0);

    /// Highest pid the scheduler hands out.
    pub const MAX: Pid = Pid(i32::MAX as u32);

    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Pid from its system-call value; `None` for negative values.
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }

    /// Value as seen across the system-call boundary.
    pub const fn as_raw(self) -> i32 {
        // Lossless: pids never exceed `Pid::MAX`.
        self.0 as i32
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Linked into the ready queue.
    Ready,

    /// The one task executing on the CPU.
    Running,

    /// Asleep on some wait queue until explicitly woken.
    Waiting,

    /// Exited. Status and stack are kept until a waiter reaps it.
    Zombie,
}

/// Which children a `wait` call is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    /// Exactly this task.
    Pid(Pid),

    /// Any child of the waiting task.
    AnyChild,
}

impl WaitTarget {
    /// Decodes the raw `pid` argument of `wait`.
    ///
    /// `-1` selects any child, non-negative values select one task. Process
    /// group selectors (`< -1`) are [`SchedError::NotSupported`].
    pub fn from_raw(pid: i32) -> Result<Self, SchedError> {
        match pid {
            -1 => Ok(Self::AnyChild),
            pid if pid >= 0 => Ok(Self::Pid(Pid(pid as u32))),
            _ => Err(SchedError::NotSupported),
        }
    }
}

/// Why a task is asleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Timed sleep until the clock reaches this many nanoseconds.
    Deadline(u64),

    /// Parent waiting for a child to exit.
    Child(WaitTarget),

    /// Waiting for an I/O request to complete.
    Io(RequestId),
}

/// Address range of a task stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    base: usize,
    len: usize,
}

impl StackRegion {
    pub const fn new(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    pub const fn base(&self) -> usize {
        self.base
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    /// One past the highest address; stacks grow down from here.
    pub const fn top(&self) -> usize {
        self.base + self.len
    }
}

/// Heap-allocated task stack, freed when dropped.
pub struct TaskStack {
    base: NonNull<u8>,
    layout: Layout,
}

impl TaskStack {
    /// Allocates a zero-filled stack of `size` bytes.
    pub fn allocate(size: usize) -> Result<Self, SchedError> {
        if size == 0 {
            return Err(SchedError::InvalidArgument);
        }
        let layout = Layout::from_size_align(size, STACK_ALIGNMENT)
            .map_err(|_| SchedError::InvalidArgument)?;
        // SAFETY:
        // - Layout has non-zero size.
        let ptr = unsafe { heap_alloc::alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(SchedError::NoMemory)?;
        Ok(Self { base, layout })
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn region(&self) -> StackRegion {
        StackRegion::new(self.base.as_ptr() as usize, self.layout.size())
    }
}

impl Drop for TaskStack {
    fn drop(&mut self) {
        // SAFETY:
        // - `base` was returned by `alloc_zeroed` with exactly this layout.
        // - Ownership guarantees this runs once.
        unsafe { heap_alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

// SAFETY:
// - The stack is plain memory exclusively owned by this value.
unsafe impl Send for TaskStack {}

impl fmt::Debug for TaskStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStack")
            .field("base", &self.base)
            .field("len", &self.layout.size())
            .finish()
    }
}

type BootstrapFn = Box<dyn FnOnce() + Send>;

/// Everything a fresh task needs to get going: where its stack is and what
/// to run on it.
pub struct Bootstrap {
    body: BootstrapFn,
    stack: StackRegion,
}

impl Bootstrap {
    pub(crate) fn new(body: impl FnOnce() + Send + 'static, stack: StackRegion) -> Self {
        Self {
            body: Box::new(body),
            stack,
        }
    }

    pub fn stack(&self) -> StackRegion {
        self.stack
    }

    /// Leaks the body into a thin pointer for [`bootstrap_trampoline`].
    pub fn into_raw(self) -> *mut () {
        Box::into_raw(Box::new(self.body)).cast::<()>()
    }
}

/// First code every task runs.
///
/// The body enables interrupts, runs the entry function and hands its
/// return value to `exit`, so this never gets past the call.
///
/// # Safety
///
/// `raw` must come from [`Bootstrap::into_raw`] and is consumed.
pub unsafe extern "C" fn bootstrap_trampoline(raw: *mut ()) -> ! {
    // SAFETY:
    // - The caller guarantees `raw` is an unconsumed `Bootstrap::into_raw`
    //   pointer.
    let body = unsafe { Box::from_raw(raw.cast::<BootstrapFn>()) };
    body();
    loop {
        core::hint::spin_loop();
    }
}

/// Execution state of a task as seen by the context switch.
pub enum TaskContext<S> {
    /// Never run; the switch must start it through the trampoline.
    Fresh(Bootstrap),

    /// Suspended inside a previous switch.
    Suspended(S),
}

impl<S> TaskContext<S> {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }

    /// Swaps a fresh context for `saved` and hands out the bootstrap.
    ///
    /// Returns `None`, leaving the context untouched, when already started.
    pub fn start(&mut self, saved: S) -> Option<Bootstrap> {
        if !self.is_fresh() {
            return None;
        }
        match core::mem::replace(self, Self::Suspended(saved)) {
            Self::Fresh(bootstrap) => Some(bootstrap),
            Self::Suspended(_) => None,
        }
    }
}

/// Heap cell giving a context a stable address for the switch.
pub(crate) struct ContextSlot<S>(Box<UnsafeCell<TaskContext<S>>>);

impl<S> ContextSlot<S> {
    pub(crate) fn new(context: TaskContext<S>) -> Self {
        Self(Box::new(UnsafeCell::new(context)))
    }

    pub(crate) fn as_ptr(&self) -> *mut TaskContext<S> {
        self.0.get()
    }
}

/// The one scheduler-owned collection a task is linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Membership {
    Unlinked,
    Ready,
    Zombies,
    Waiters,
    /// A caller-owned [`WaitQueue`](crate::sync::WaitQueue).
    Foreign,
}

/// Task control block.
pub(crate) struct Task<S> {
    pub(crate) pid: Pid,
    /// `None` only for the root task.
    pub(crate) parent: Option<Pid>,
    pub(crate) priority: Priority,
    pub(crate) state: TaskState,
    /// Exit status, meaningful once `Zombie`.
    pub(crate) status: i32,
    pub(crate) wait_state: Option<WaitReason>,
    pub(crate) linked: Membership,
    pub(crate) context: ContextSlot<S>,
    /// `None` for the root task, which runs on the boot stack.
    pub(crate) stack: Option<TaskStack>,
}

impl<S> Task<S> {
    pub(crate) fn root(pid: Pid, priority: Priority, saved: S) -> Self {
        Self {
            pid,
            parent: None,
            priority,
            state: TaskState::Running,
            status: 0,
            wait_state: None,
            linked: Membership::Unlinked,
            context: ContextSlot::new(TaskContext::Suspended(saved)),
            stack: None,
        }
    }

    pub(crate) fn fresh(
        pid: Pid,
        parent: Pid,
        priority: Priority,
        context: ContextSlot<S>,
        stack: TaskStack,
    ) -> Self {
        Self {
            pid,
            parent: Some(parent),
            priority,
            state: TaskState::Ready,
            status: 0,
            wait_state: None,
            linked: Membership::Ready,
            context,
            stack: Some(stack),
        }
    }
}
