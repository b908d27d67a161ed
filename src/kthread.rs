//! Kernel threads and the idle thread.

use log::info;

use crate::arch::{Arch, Interrupts};
use crate::scheduler::{Pid, Priority, SchedError, Scheduler};

/// Starts `entry` as a kernel thread with its own `stack_size` byte stack.
///
/// The thread's return value becomes its exit status.
pub fn spawn_kernel_thread<A: Arch>(
    sched: &'static Scheduler<A>,
    entry: fn() -> i32,
    stack_size: usize,
    priority: Priority,
) -> Result<Pid, SchedError> {
    let pid = sched.spawn(entry, stack_size, priority)?;
    info!(target: "kthread", "started pid {} ({} byte stack, priority {})", pid, stack_size, priority);
    Ok(pid)
}

/// [`spawn_kernel_thread`] with the configured default stack size.
pub fn spawn_default<A: Arch>(
    sched: &'static Scheduler<A>,
    entry: fn() -> i32,
    priority: Priority,
) -> Result<Pid, SchedError> {
    spawn_kernel_thread(sched, entry, sched.config().default_stack_size, priority)
}

/// Starts the idle thread: lowest priority, halts the CPU forever.
///
/// Keeps the ready queue non-empty once everything else is asleep, so a
/// sleeping task always has somewhere to switch to.
pub fn start_idle_thread<A: Arch>(sched: &'static Scheduler<A>) -> Result<Pid, SchedError> {
    let config = sched.config();
    let pid = sched.spawn(
        move || idle_loop(sched.arch()),
        config.idle_stack_size,
        config.idle_priority,
    )?;
    info!(target: "kthread", "idle thread is pid {}", pid);
    Ok(pid)
}

fn idle_loop(irq: &impl Interrupts) -> i32 {
    loop {
        irq.halt();
    }
}

/// Kernel-thread subsystem bring-up.
pub fn initialize<A: Arch>(sched: &'static Scheduler<A>) -> Result<Pid, SchedError> {
    start_idle_thread(sched)
}
