//! Scoped interrupt masking.

use super::Interrupts;

/// Disables interrupts for its lifetime and restores the previous state on
/// drop.
///
/// Guards nest: an inner guard created while interrupts are already masked
/// leaves them masked when it goes away.
pub struct IrqGuard<'a, I: Interrupts + ?Sized> {
    irq: &'a I,
    interrupts_were_enabled: bool,
}

impl<'a, I: Interrupts + ?Sized> IrqGuard<'a, I> {
    pub fn new(irq: &'a I) -> Self {
        let interrupts_were_enabled = irq.are_enabled();
        irq.disable();
        Self {
            irq,
            interrupts_were_enabled,
        }
    }

    /// Whether interrupts were enabled when the guard was taken.
    pub fn interrupts_were_enabled(&self) -> bool {
        self.interrupts_were_enabled
    }
}

impl<I: Interrupts + ?Sized> Drop for IrqGuard<'_, I> {
    fn drop(&mut self) {
        if self.interrupts_were_enabled {
            self.irq.enable();
        }
    }
}
