//! # TLB
//!
//! R3000 TLB entry layout
//! ---
//! Change log:
//!   - 2024/05/02: File created.

use core::fmt::{Display, Formatter};
use bitflags::bitflags;
use crate::memory::{PhyAddr, VirtAddr};

pub const TLBHI_VPAGE: usize = 0xffff_f000;
pub const TLBLO_PPAGE: usize = 0xffff_f000;
pub const TLBLO_INVALID: usize = 0;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct EntryLo: usize {
        const GLOBAL = 1 << 8;
        const VALID = 1 << 9;
        const DIRTY = 1 << 10; // writable
        const NOCACHE = 1 << 11;
    }
}

/// EntryHi value that can never match a user page: each slot gets a distinct
/// kseg0 page, so no two invalid entries collide either.
pub const fn tlbhi_invalid(index: usize) -> usize {
    (0x80000 + index) << 12
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TlbEntry {
    pub hi: usize,
    pub lo: usize,
}

impl TlbEntry {
    pub fn new(vpage: VirtAddr, ppage: PhyAddr, flags: EntryLo) -> Self {
        Self {
            hi: vpage.addr & TLBHI_VPAGE,
            lo: (ppage.addr & TLBLO_PPAGE) | flags.bits(),
        }
    }

    pub const fn invalid(index: usize) -> Self {
        Self {
            hi: tlbhi_invalid(index),
            lo: TLBLO_INVALID,
        }
    }

    pub fn flags(&self) -> EntryLo {
        EntryLo::from_bits_truncate(self.lo)
    }

    pub fn is_valid(&self) -> bool {
        self.flags().contains(EntryLo::VALID)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags().contains(EntryLo::DIRTY)
    }

    pub fn vpage(&self) -> VirtAddr {
        VirtAddr::from(self.hi & TLBHI_VPAGE)
    }

    pub fn ppage(&self) -> PhyAddr {
        PhyAddr::from(self.lo & TLBLO_PPAGE)
    }

    pub fn matches(&self, vaddr: VirtAddr) -> bool {
        self.is_valid() && self.hi & TLBHI_VPAGE == vaddr.addr & TLBHI_VPAGE
    }
}

impl Display for TlbEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "[TLB: {:#010x} -> {:#010x}]", self.hi, self.lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_packs_frame_and_flags() {
        let e = TlbEntry::new(VirtAddr::from(0x0040_1234), PhyAddr::from(0x0003_2000), EntryLo::VALID | EntryLo::DIRTY);
        assert_eq!(e.hi, 0x0040_1000);
        assert_eq!(e.lo, 0x0003_2000 | 0x200 | 0x400);
        assert!(e.is_valid() && e.is_dirty());
        assert_eq!(e.ppage(), PhyAddr::from(0x0003_2000));
        assert!(e.matches(VirtAddr::from(0x0040_1ffc)));
        assert!(!e.matches(VirtAddr::from(0x0040_2000)));
    }

    #[test]
    fn invalid_entries_live_in_kseg0() {
        for i in [0usize, 1, 63] {
            let e = TlbEntry::invalid(i);
            assert!(!e.is_valid());
            assert!(e.hi >= crate::config::MIPS_KSEG0);
        }
        assert_ne!(tlbhi_invalid(0), tlbhi_invalid(1));
    }
}
