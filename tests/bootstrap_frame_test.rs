//! Bootstrap frame layout tests.

use std::mem::size_of;

use kaos_sched::arch::frame::{self, BootstrapFrame, BOOTSTRAP_FRAME_SIZE, FLAGS_IF};
use kaos_sched::scheduler::{bootstrap_trampoline, StackRegion, TaskStack};

const DATA_SELECTOR: usize = 0x10;

/// Contract: the frame is nine machine words: six saved registers, the
/// trampoline return address, its unused return slot and its argument.
#[test]
fn test_frame_layout() {
    assert!(
        BOOTSTRAP_FRAME_SIZE == 9 * size_of::<usize>(),
        "bootstrap frame must be nine words"
    );
    assert!(FLAGS_IF == 0x200, "IF is FLAGS bit 9");
}

/// Contract: a new frame enables interrupts, seeds the data segments and
/// returns into the trampoline with the bootstrap pointer.
#[test]
fn test_frame_defaults() {
    let arg = 0x1234usize as *mut ();
    let frame = BootstrapFrame::new(arg, DATA_SELECTOR);

    assert!(frame.flags & FLAGS_IF != 0, "fresh task must start preemptible");
    assert!(frame.es == DATA_SELECTOR && frame.ds == DATA_SELECTOR, "data segments seeded");
    assert!(frame.di == 0 && frame.si == 0 && frame.bp == 0, "scratch registers zeroed");
    assert!(
        frame.ret == bootstrap_trampoline as *const () as usize,
        "switch must return into the trampoline"
    );
    assert!(frame.arg == 0x1234, "trampoline argument must be the bootstrap pointer");
}

/// Contract: the frame is written at the aligned top of the task stack and
/// the returned stack pointer addresses it.
#[test]
fn test_frame_written_at_stack_top() {
    let stack = TaskStack::allocate(256).expect("host allocation should succeed");
    let region = stack.region();
    let frame = BootstrapFrame::new(0x40usize as *mut (), DATA_SELECTOR);

    let sp = unsafe { frame::write_bootstrap_frame(region, frame) }
        .expect("256 bytes must hold the frame");

    let sp_addr = sp as usize;
    assert!(sp_addr >= region.base(), "frame must lie inside the stack");
    assert!(sp_addr + BOOTSTRAP_FRAME_SIZE <= region.top(), "frame must not pass the top");
    assert!(
        region.top() - (sp_addr + BOOTSTRAP_FRAME_SIZE) < std::mem::align_of::<BootstrapFrame>(),
        "frame must sit at the top of the stack"
    );
    let written = unsafe { std::ptr::read(sp) };
    assert!(written == frame, "stored frame must match what was written");
}

/// Contract: a region smaller than the frame is refused.
#[test]
fn test_frame_rejected_on_tiny_region() {
    let stack = TaskStack::allocate(16).expect("host allocation should succeed");
    let region = StackRegion::new(stack.region().base(), 16);

    let sp = unsafe {
        frame::write_bootstrap_frame(region, BootstrapFrame::new(std::ptr::null_mut(), 0))
    };
    assert!(sp.is_none(), "16 bytes cannot hold the frame");
}
