//! # Arch
//!
//! What the VM core needs from the machine it runs on: the physical RAM
//! bounds, the software-managed TLB, the interrupt priority level and access
//! to physical memory through the kernel's direct-mapped window.
//! ---
//! Change log:
//!   - 2024/05/02: File created.

mod tlb;
mod sim;

pub use tlb::{EntryLo, TlbEntry, tlbhi_invalid, TLBHI_VPAGE, TLBLO_INVALID, TLBLO_PPAGE};
pub use sim::{SimMachine, SimMachineBuilder};

use crate::memory::PhyAddr;

pub trait Machine: Send + Sync {
    /* RAM */

    /// Returns `(first free, end)` of physical RAM. After this call
    /// `ram_stealmem` can no longer hand out memory.
    fn ram_getsize(&self) -> (PhyAddr, PhyAddr);

    /// Reserve `npages` raw frames. Only meaningful before the coremap exists.
    fn ram_stealmem(&self, npages: usize) -> Option<PhyAddr>;

    /* TLB */

    fn tlb_read(&self, index: usize) -> TlbEntry;

    fn tlb_write(&self, entry: TlbEntry, index: usize);

    /// Write `entry` into a slot picked by the random register. Returns false
    /// when the machine has no random replacement.
    fn tlb_random(&self, entry: TlbEntry) -> bool;

    /* Interrupts */

    /// Disable interrupts, returning the previous level.
    fn splhigh(&self) -> usize;

    fn splx(&self, level: usize);

    /* Physical memory */

    fn zero_page(&self, page: PhyAddr);

    fn copy_page(&self, dst: PhyAddr, src: PhyAddr);

    fn write_phys(&self, addr: PhyAddr, data: &[u8]);

    fn read_phys(&self, addr: PhyAddr, buf: &mut [u8]);
}
