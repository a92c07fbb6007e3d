//! # Address
//!
//! Implementation of idiomatic address for Rust
//! ---
//! Change log:
//!   - 2024/03/17: File created.
//!   - 2024/05/02: kseg0 conversions, drop Sv39 index helpers and page ids.

use core::fmt::{Debug, Display, Formatter};
use crate::config::MIPS_KSEG0;
use crate::memory::PAGE_SIZE;

// Declarations
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhyAddr {
    pub addr: usize,
}

#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtAddr {
    pub addr: usize,
}

// Implementations for physical part
impl From<usize> for PhyAddr {
    fn from(addr: usize) -> Self {
        Self {
            addr
        }
    }
}

// Virt part
impl From<usize> for VirtAddr {
    fn from(addr: usize) -> Self {
        Self {
            addr
        }
    }
}

// Implementation of Display
impl Display for PhyAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("[PhyAddr: {:#x}]", &self.addr))
    }
}

impl Display for VirtAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("[VirtAddr: {:#x}]", &self.addr))
    }
}

impl Debug for PhyAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Debug for VirtAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Display::fmt(self, f)
    }
}

pub trait Addr: Sized + From<usize> {
    fn get_addr(&self) -> usize;

    fn round_up_to(&self, to: usize) -> Self {
        ((self.get_addr() + (to - 1)) & !(to - 1)).into()
    }

    fn round_down_to(&self, to: usize) -> Self {
        (self.get_addr() & !(to - 1)).into()
    }

    fn round_up(&self) -> Self {
        self.round_up_to(PAGE_SIZE)
    }

    fn round_down(&self) -> Self {
        self.round_down_to(PAGE_SIZE)
    }

    fn page_offset(&self) -> usize {
        self.get_addr() & (PAGE_SIZE - 1)
    }

    fn is_page_aligned(&self) -> bool {
        self.page_offset() == 0
    }

    fn to_offset(self, offset: isize) -> Self {
        let addr = if offset < 0 {
            self.get_addr().saturating_sub(offset.unsigned_abs())
        } else {
            self.get_addr() + offset.unsigned_abs()
        };
        Self::from(addr)
    }
}

impl PhyAddr {
    /// PADDR_TO_KVADDR: where the kernel sees this frame through kseg0.
    pub fn to_kvaddr(&self) -> VirtAddr {
        VirtAddr::from(self.addr + MIPS_KSEG0)
    }
}

impl Addr for PhyAddr {
    fn get_addr(&self) -> usize {
        self.addr
    }
}

impl VirtAddr {
    pub fn is_kseg0(&self) -> bool {
        self.addr >= MIPS_KSEG0
    }

    /// Inverse of `PhyAddr::to_kvaddr`.
    pub fn kvaddr_to_paddr(&self) -> Option<PhyAddr> {
        if self.is_kseg0() {
            Some(PhyAddr::from(self.addr - MIPS_KSEG0))
        } else {
            None
        }
    }
}

impl Addr for VirtAddr {
    fn get_addr(&self) -> usize {
        self.addr
    }
}
