//! Hosted test architecture.
//!
//! Every task runs on its own OS thread. A context switch hands a baton to
//! the incoming thread and parks the outgoing one until its own baton comes
//! back, so exactly one task executes at a time and `exit`, `wait` and
//! `sleep_on` behave as real coroutine switches. The test thread itself is
//! the root task.
//!
//! Fresh tasks are started the way hardware starts them: the bootstrap frame
//! is written onto the task's stack and then popped, "returning" into the
//! trampoline.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use kaos_sched::arch::frame::{self, BootstrapFrame, BOOTSTRAP_FRAME_SIZE, FLAGS_IF};
use kaos_sched::arch::{Arch, Interrupts, IrqGuard};
use kaos_sched::config::SchedulerConfig;
use kaos_sched::scheduler::{Scheduler, TaskContext};

pub const HOSTED_DATA_SELECTOR: usize = 0x10;

pub type HostedScheduler = Scheduler<HostedArch>;

/// Binary semaphore one suspended task parks on.
pub struct Baton {
    permit: Mutex<bool>,
    handed: Condvar,
}

impl Baton {
    fn new() -> Self {
        Self {
            permit: Mutex::new(false),
            handed: Condvar::new(),
        }
    }

    fn release(&self) {
        *self.permit.lock().unwrap() = true;
        self.handed.notify_one();
    }

    fn acquire(&self) {
        let mut permit = self.permit.lock().unwrap();
        while !*permit {
            permit = self.handed.wait(permit).unwrap();
        }
        *permit = false;
    }
}

type InterruptHandler = Arc<dyn Fn() + Send + Sync>;

pub struct HostedArch {
    irq_enabled: AtomicBool,
    switches: AtomicUsize,
    halts: AtomicUsize,
    interrupt: Mutex<Option<InterruptHandler>>,
}

impl HostedArch {
    /// Boots with interrupts enabled and no interrupt source.
    pub fn new() -> Self {
        Self {
            irq_enabled: AtomicBool::new(true),
            switches: AtomicUsize::new(0),
            halts: AtomicUsize::new(0),
            interrupt: Mutex::new(None),
        }
    }

    /// Handler "fired" by every halt executed with interrupts enabled.
    pub fn set_interrupt_handler(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.interrupt.lock().unwrap() = Some(Arc::new(handler));
    }

    pub fn switch_count(&self) -> usize {
        self.switches.load(Ordering::SeqCst)
    }

    pub fn halt_count(&self) -> usize {
        self.halts.load(Ordering::SeqCst)
    }
}

impl Interrupts for HostedArch {
    fn are_enabled(&self) -> bool {
        self.irq_enabled.load(Ordering::SeqCst)
    }

    fn enable(&self) {
        self.irq_enabled.store(true, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.irq_enabled.store(false, Ordering::SeqCst);
    }

    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
        let handler = self.interrupt.lock().unwrap().clone();
        match handler {
            Some(handler) if self.are_enabled() => {
                // Interrupt entry masks interrupts, the return restores them.
                let _irq = IrqGuard::new(self);
                handler();
            }
            _ => std::thread::yield_now(),
        }
    }
}

// SAFETY:
// - `context_switch` parks the calling thread until its baton is handed
//   back, and starts or resumes exactly one other thread.
unsafe impl Arch for HostedArch {
    type Saved = Arc<Baton>;

    const BOOTSTRAP_FRAME_SIZE: usize = BOOTSTRAP_FRAME_SIZE;

    fn root_context(&self) -> Arc<Baton> {
        Arc::new(Baton::new())
    }

    unsafe fn context_switch(
        &self,
        prev: *mut TaskContext<Arc<Baton>>,
        next: *mut TaskContext<Arc<Baton>>,
    ) {
        assert!(!self.are_enabled(), "context switch with interrupts enabled");
        self.switches.fetch_add(1, Ordering::SeqCst);

        // Clone before handing over: once `next` runs it may reap `prev`.
        let resume = match unsafe { &*prev } {
            TaskContext::Suspended(baton) => Arc::clone(baton),
            TaskContext::Fresh(_) => panic!("switching away from a task that never ran"),
        };

        let next = unsafe { &mut *next };
        if let Some(bootstrap) = next.start(Arc::new(Baton::new())) {
            let stack = bootstrap.stack();
            let frame = BootstrapFrame::new(bootstrap.into_raw(), HOSTED_DATA_SELECTOR);
            let sp = unsafe { frame::write_bootstrap_frame(stack, frame) }
                .expect("task stack cannot hold the bootstrap frame") as usize;
            std::thread::spawn(move || {
                unsafe { pop_bootstrap_frame(sp) };
            });
        } else if let TaskContext::Suspended(baton) = next {
            baton.release();
        }

        resume.acquire();
    }
}

/// Restore path of a fresh stack: pop the frame and return into it.
unsafe fn pop_bootstrap_frame(sp: usize) -> ! {
    let frame = unsafe { std::ptr::read(sp as *const BootstrapFrame) };
    assert!(frame.flags & FLAGS_IF != 0, "fresh task must start with IF set");
    let ret: unsafe extern "C" fn(*mut ()) -> ! = unsafe { std::mem::transmute(frame.ret) };
    unsafe { ret(frame.arg as *mut ()) }
}

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// Scheduler that has not been initialized.
pub fn unbooted() -> &'static HostedScheduler {
    leak(Scheduler::new(HostedArch::new(), SchedulerConfig::DEFAULT))
}

/// Initialized scheduler; the calling test thread is its root task.
pub fn boot() -> &'static HostedScheduler {
    boot_with(SchedulerConfig::DEFAULT)
}

pub fn boot_with(config: SchedulerConfig) -> &'static HostedScheduler {
    let sched = leak(Scheduler::new(HostedArch::new(), config));
    sched.init();
    sched
}

/// Ordered record of what tasks did, shared between them and the test.
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<&'static str>>>);

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: &'static str) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}
