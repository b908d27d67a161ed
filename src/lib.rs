//! KAOS scheduler core.
//!
//! Single-CPU priority scheduler with cooperative blocking: tasks sleep on
//! wait queues, exit into zombies and are reaped by their parents. Kernel
//! threads, the tick clock and blocking I/O completion are built on top of
//! the same wait substrate.
//!
//! Everything machine-specific sits behind [`arch::Arch`], so the crate runs
//! unchanged on hardware and under the hosted test architecture in `tests/`.

#![no_std]

extern crate alloc;

pub mod arch;
pub mod clock;
pub mod config;
pub mod io;
pub mod kthread;
pub mod logging;
pub mod scheduler;
pub mod sync;
