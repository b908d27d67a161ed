//! Architecture seam consumed by the scheduler.
//!
//! The scheduler never touches the interrupt flag, the halt instruction or
//! the stack pointer itself. Everything machine-specific is reached through
//! an [`Arch`] implementation handed to [`crate::scheduler::Scheduler::new`].

pub mod frame;
mod irq;

pub use irq::IrqGuard;

use crate::scheduler::TaskContext;

/// Control over the (single) CPU's maskable interrupt flag.
pub trait Interrupts {
    /// Returns whether maskable interrupts are currently enabled.
    fn are_enabled(&self) -> bool;

    /// Enable interrupts globally.
    fn enable(&self);

    /// Disable interrupts globally.
    fn disable(&self);

    /// Idle the CPU until the next interrupt has been serviced.
    ///
    /// Callers enable interrupts before halting; halting with interrupts
    /// masked never returns on real hardware.
    fn halt(&self);
}

/// Machine-specific half of the scheduler.
///
/// # Safety
///
/// `context_switch` must save the execution state of the caller into `prev`,
/// then resume `next`. When `next` holds [`TaskContext::Fresh`], the
/// implementation takes the bootstrap out of it, stores its own resumable
/// state in its place, and starts execution in
/// [`crate::scheduler::bootstrap_trampoline`] on the task's stack. The call
/// returns only once some later switch names `prev` as its `next`.
pub unsafe trait Arch: Interrupts + Send + Sync + 'static {
    /// Saved execution state of a suspended task (stack pointer on hardware).
    type Saved: Send;

    /// Minimum stack size able to hold the synthesized bootstrap frame.
    const BOOTSTRAP_FRAME_SIZE: usize;

    /// Saved-state placeholder for the already-running boot context that
    /// becomes the root task. It is overwritten by the first switch away.
    fn root_context(&self) -> Self::Saved;

    /// Suspend `prev` and resume `next`.
    ///
    /// # Safety
    ///
    /// Both pointers must reference live, distinct task contexts owned by
    /// the scheduler and interrupts must be disabled. Neither context may be
    /// touched by anyone else until the switch back into `prev`.
    unsafe fn context_switch(
        &self,
        prev: *mut TaskContext<Self::Saved>,
        next: *mut TaskContext<Self::Saved>,
    );
}
