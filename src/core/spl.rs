//! # Spl
//!
//! Interrupt priority guard. Raises the local CPU to splhigh for as long as
//! the guard lives, then restores whatever level was active before.
//! ---
//! Change log:
//!   - 2024/03/19: File created as InterruptSafeCell.
//!   - 2024/05/02: Reworked into an RAII guard over the machine's spl.

use crate::arch::Machine;

pub const IPL_NONE: usize = 0;
pub const IPL_HIGH: usize = 1;

pub struct SplGuard<'a> {
    machine: &'a dyn Machine,
    old: usize,
}

impl<'a> SplGuard<'a> {
    pub fn raise(machine: &'a dyn Machine) -> Self {
        let old = machine.splhigh();
        Self {
            machine,
            old,
        }
    }

    /// Level that will be restored on drop.
    pub fn previous(&self) -> usize {
        self.old
    }
}

impl<'a> Drop for SplGuard<'a> {
    fn drop(&mut self) {
        self.machine.splx(self.old);
    }
}
