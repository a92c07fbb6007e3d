//! # TLB
//!
//! Refill and flush of the software-managed TLB. Every read-modify-write of
//! the TLB runs at splhigh.
//! ---
//! Change log:
//!   - 2024/05/02: File created.

use log::debug;
use crate::arch::{EntryLo, TlbEntry};
use crate::config::NUM_TLB;
use crate::core::SplGuard;
use crate::memory::{PhyAddr, VirtAddr};
use super::Vm;

impl Vm {
    /// Map `vpage` to `ppage`, taking the first invalid slot and falling back
    /// to the random register when every slot is in use.
    pub(crate) fn tlb_install(&self, vpage: VirtAddr, ppage: PhyAddr) {
        let machine = self.machine();
        let _spl = SplGuard::raise(machine);
        // every page is writable, see RegionFlags
        let entry = TlbEntry::new(vpage, ppage, EntryLo::VALID | EntryLo::DIRTY);
        if let Some(index) = (0..NUM_TLB).find(|i| !machine.tlb_read(*i).is_valid()) {
            debug!("TLB[{}] <- {}", index, entry);
            machine.tlb_write(entry, index);
        } else if machine.tlb_random(entry) {
            debug!("TLB[random] <- {}", entry);
        } else {
            panic!("Ran out of TLB entries, cannot handle fault at {}.", vpage);
        }
    }

    pub fn tlb_invalidate_all(&self) {
        let machine = self.machine();
        let _spl = SplGuard::raise(machine);
        for index in 0..NUM_TLB {
            machine.tlb_write(TlbEntry::invalid(index), index);
        }
    }
}

/// Cross-CPU invalidation request.
#[derive(Copy, Clone, Debug)]
pub struct TlbShootdown {
    pub vaddr: VirtAddr,
}

pub fn tlb_shootdown_all() -> ! {
    panic!("TLB shootdown requested, this VM only runs on one CPU.");
}

pub fn tlb_shootdown(ts: &TlbShootdown) -> ! {
    panic!("TLB shootdown of {} requested, this VM only runs on one CPU.", ts.vaddr);
}
