//! Scheduler module facade.
//!
//! The task model lives in `task.rs`, the ready queue in `ready.rs`, the
//! scheduler core in `priority.rs` and exit/wait in `lifecycle.rs`.
//! Everything is re-exported here so `crate::scheduler::*` call sites stay
//! clean.

mod error;
mod lifecycle;
mod priority;
mod ready;
mod task;

pub use error::SchedError;
pub use lifecycle::{Reaped, WaitOptions};
pub use priority::Scheduler;
pub use ready::{ReadyEntry, ReadyQueue};
pub use task::{
    bootstrap_trampoline, Bootstrap, Pid, Priority, StackRegion, TaskContext, TaskStack,
    TaskState, WaitReason, WaitTarget, DEFAULT_PRIORITY,
};
