//! Initial stack frame of a task that has never run.
//!
//! A fresh task is started by the same restore path that resumes a suspended
//! one: the switch loads the task's stack pointer, pops the saved registers
//! and returns. The frame below is what that restore path finds on a brand
//! new stack, so the return lands in the bootstrap trampoline with the
//! bootstrap pointer as its only argument.

use core::mem::{align_of, size_of};
use core::ptr;

use crate::scheduler::{bootstrap_trampoline, StackRegion};

/// FLAGS bit 9: Interrupt Enable Flag.
pub const FLAGS_IF: usize = 1 << 9;

/// Size in bytes of [`BootstrapFrame`].
pub const BOOTSTRAP_FRAME_SIZE: usize = size_of::<BootstrapFrame>();

/// Saved-register image at the top of a fresh task stack, lowest address
/// first, one machine word per slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapFrame {
    /// Popped into FLAGS. IF is set so the task starts preemptible.
    pub flags: usize,
    pub es: usize,
    pub ds: usize,
    pub di: usize,
    pub si: usize,
    pub bp: usize,
    /// Return address of the switch: the bootstrap trampoline.
    pub ret: usize,
    /// Return address slot of the trampoline itself. Never used.
    pub trampoline_ret: usize,
    /// Trampoline argument: the raw bootstrap pointer.
    pub arg: usize,
}

impl BootstrapFrame {
    /// Frame that returns into [`bootstrap_trampoline`] with `arg`.
    ///
    /// `data_selector` seeds both data segment slots.
    pub fn new(arg: *mut (), data_selector: usize) -> Self {
        Self {
            flags: FLAGS_IF,
            es: data_selector,
            ds: data_selector,
            di: 0,
            si: 0,
            bp: 0,
            ret: bootstrap_trampoline as *const () as usize,
            trampoline_ret: 0,
            arg: arg as usize,
        }
    }
}

/// Writes `frame` at the top of `stack` and returns the initial stack
/// pointer, which addresses the frame.
///
/// Returns `None` when the region cannot hold the frame.
///
/// # Safety
///
/// `stack` must describe writable memory owned by the task being prepared
/// and nothing else may use it until the task is first switched to.
pub unsafe fn write_bootstrap_frame(
    stack: StackRegion,
    frame: BootstrapFrame,
) -> Option<*mut BootstrapFrame> {
    let top = align_down(stack.top(), align_of::<BootstrapFrame>());
    let sp = top.checked_sub(BOOTSTRAP_FRAME_SIZE)?;
    if sp < stack.base() {
        return None;
    }

    let frame_ptr = sp as *mut BootstrapFrame;
    // SAFETY:
    // - `sp..top` lies within `stack`, checked above.
    // - `sp` is aligned for `BootstrapFrame`.
    // - The caller guarantees exclusive access to the stack memory.
    unsafe { ptr::write(frame_ptr, frame) };
    Some(frame_ptr)
}

const fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}
