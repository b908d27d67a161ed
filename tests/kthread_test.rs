//! Kernel thread and idle thread tests.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::{boot, boot_with, unbooted};
use kaos_sched::config::{SchedulerConfig, DEFAULT_STACK_SIZE, IDLE_PRIORITY, IDLE_STACK_SIZE};
use kaos_sched::kthread;
use kaos_sched::scheduler::{Pid, SchedError, TaskState, WaitOptions, DEFAULT_PRIORITY};

static ANSWER_RUNS: AtomicUsize = AtomicUsize::new(0);

fn answer() -> i32 {
    ANSWER_RUNS.fetch_add(1, Ordering::SeqCst);
    42
}

fn idle_body() -> i32 {
    0
}

/// Contract: a kernel thread runs its entry function and exits with its
/// return value.
#[test]
fn test_kernel_thread_runs_and_exits() {
    let sched = boot();

    let pid = kthread::spawn_kernel_thread(sched, answer, 1024, 1).expect("spawn");
    assert!(sched.stack_len(pid) == Some(1024), "thread must get the requested stack");

    let reaped = sched
        .wait(pid.as_raw(), WaitOptions::empty())
        .expect("wait")
        .expect("reaped");
    assert!(reaped.status == 42, "exit status must be the entry's return value");
    assert!(ANSWER_RUNS.load(Ordering::SeqCst) >= 1, "entry must have run");
}

/// Contract: default kernel threads use the configured default stack size.
#[test]
fn test_default_stack_size_from_config() {
    let sched = boot();
    let pid = kthread::spawn_default(sched, idle_body, 0).expect("spawn");
    assert!(
        sched.stack_len(pid) == Some(DEFAULT_STACK_SIZE),
        "default stack must be {} bytes",
        DEFAULT_STACK_SIZE
    );

    let custom = boot_with(SchedulerConfig::DEFAULT.with_default_stack_size(4096));
    let pid = kthread::spawn_default(custom, idle_body, 0).expect("spawn");
    assert!(custom.stack_len(pid) == Some(4096), "configured size must be honoured");
}

/// Contract: kernel thread creation reports scheduler errors.
#[test]
fn test_kernel_thread_errors() {
    let sched = unbooted();
    assert!(
        kthread::spawn_kernel_thread(sched, answer, 1024, 0) == Err(SchedError::NotInitialized),
        "spawn before init must fail"
    );

    let sched = boot();
    assert!(
        kthread::spawn_kernel_thread(sched, answer, 4, 0) == Err(SchedError::InvalidArgument),
        "stack below the bootstrap frame must be rejected"
    );
}

/// Contract: the idle thread sits at the idle priority behind every other
/// ready task.
#[test]
fn test_idle_thread_is_lowest_priority() {
    let sched = boot();
    let worker = kthread::spawn_default(sched, idle_body, -10).expect("spawn worker");

    let idle = kthread::initialize(sched).expect("start idle");

    assert!(sched.task_priority(idle) == Some(IDLE_PRIORITY), "idle priority");
    assert!(sched.stack_len(idle) == Some(IDLE_STACK_SIZE), "idle stack size");
    let ready: Vec<Pid> = sched.ready_snapshot().iter().map(|e| e.pid).collect();
    assert!(ready == vec![worker, idle], "idle must queue behind the worker");
}

/// Contract: the idle thread halts and gives the CPU back on the next
/// interrupt.
/// Given: The interrupt handler reschedules.
/// When: Root yields to the idle thread.
/// Then: Idle halts, the interrupt switches back to root and idle is ready
/// again.
#[test]
fn test_idle_thread_yields_on_interrupt() {
    let sched = boot();
    sched.arch().set_interrupt_handler(move || sched.schedule());
    let idle = kthread::start_idle_thread(sched).expect("start idle");

    sched.schedule();

    assert!(sched.arch().halt_count() >= 1, "idle must have halted");
    assert!(sched.current_pid() == Ok(Pid::ROOT), "root must be back on the CPU");
    assert!(sched.task_state(idle) == Some(TaskState::Ready), "idle must be ready again");
}

/// Contract: the idle thread and the root task take their priorities from
/// the configuration.
#[test]
fn test_configured_idle_and_root_priorities() {
    let sched = boot();
    assert!(
        sched.task_priority(Pid::ROOT) == Some(DEFAULT_PRIORITY),
        "root must default to the default priority"
    );

    let custom = boot_with(
        SchedulerConfig::DEFAULT
            .with_idle_priority(-5)
            .with_root_priority(3),
    );
    assert!(custom.task_priority(Pid::ROOT) == Some(3), "root priority must be configurable");

    let idle = kthread::start_idle_thread(custom).expect("idle");
    assert!(custom.task_priority(idle) == Some(-5), "idle priority must be configurable");

    let worker = kthread::spawn_kernel_thread(custom, idle_body, 1024, -1).expect("spawn");
    let ready: Vec<Pid> = custom.ready_snapshot().iter().map(|e| e.pid).collect();
    assert!(ready == vec![worker, idle], "idle must still trail a worker above it");
    custom.wait(worker.as_raw(), WaitOptions::empty()).expect("wait");
}
