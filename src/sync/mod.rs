//! Synchronization primitives.

pub mod irqlock;
pub mod waitqueue;

pub use irqlock::{IrqSpinLock, IrqSpinLockGuard};
pub use waitqueue::WaitQueue;
