//! Spinlock with interrupt masking.
//!
//! On a single CPU the spinning never actually spins: the only other
//! contender is an interrupt handler, and interrupts stay masked for as long
//! as the guard lives.

use core::ops::{Deref, DerefMut};

use crate::arch::{Interrupts, IrqGuard};

pub struct IrqSpinLock<T> {
    inner: spin::Mutex<T>,
}

impl<T> IrqSpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
        }
    }

    /// Masks interrupts through `irq`, then takes the lock.
    pub fn lock<'a, I: Interrupts + ?Sized>(&'a self, irq: &'a I) -> IrqSpinLockGuard<'a, T, I> {
        let irq = IrqGuard::new(irq);
        IrqSpinLockGuard {
            guard: self.inner.lock(),
            _irq: irq,
        }
    }

    /// Whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

/// Releases the lock first, then restores the interrupt state.
pub struct IrqSpinLockGuard<'a, T, I: Interrupts + ?Sized> {
    // Field order is drop order.
    guard: spin::MutexGuard<'a, T>,
    _irq: IrqGuard<'a, I>,
}

impl<T, I: Interrupts + ?Sized> Deref for IrqSpinLockGuard<'_, T, I> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<T, I: Interrupts + ?Sized> DerefMut for IrqSpinLockGuard<'_, T, I> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}
