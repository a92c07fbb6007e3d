//! # Coremap
//!
//! Physical frame allocator
//! Until `bootstrap` runs, frames are stolen straight from RAM and can never
//! be given back. Afterwards every frame between the end of stolen memory and
//! the top of RAM has one entry in the coremap, and allocation is first-fit
//! over contiguous runs.
//! The table itself sits in the first frames of that range and is accessed
//! through the machine's physical window, so the allocator never touches
//! the kernel heap.
//! ---
//! Change log:
//!   - 2024/03/17: File created as page_allocator.
//!   - 2024/05/02: Replace the buddy allocator with a coremap of runs.
//!   - 2024/05/09: Keep the table in the frames reserved for it.

use alloc::sync::Arc;
use core::mem::size_of;
use core::ops::Range;
use log::{debug, info, trace, warn};
use crate::arch::Machine;
use crate::core::Spinlock;
use crate::memory::{Addr, PhyAddr, VirtAddr, PAGE_SIZE};
use crate::utils::div_round_up;
use crate::utils::error::{KernelError, Result};

// In RAM an entry is one word: bit 31 set when free, low bits the run length.
const ENTRY_SIZE: usize = size_of::<u32>();
const ENTRY_FREE: u32 = 1 << 31;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct CoreEntry {
    free: bool,
    // frames in the run starting here, 0 unless this is a run head
    run_length: usize,
}

impl CoreEntry {
    const FREE: Self = Self { free: true, run_length: 0 };
    const TAKEN: Self = Self { free: false, run_length: 0 };

    fn encode(self) -> u32 {
        (if self.free { ENTRY_FREE } else { 0 }) | self.run_length as u32
    }

    fn decode(raw: u32) -> Self {
        Self {
            free: raw & ENTRY_FREE != 0,
            run_length: (raw & !ENTRY_FREE) as usize,
        }
    }
}

struct CoreTable {
    base: PhyAddr,
    nframes: usize,
    reserved: usize,
    // physical range handed out by ram_stealmem before bootstrap
    stolen: Range<usize>,
}

impl CoreTable {
    fn addr_of(&self, index: usize) -> PhyAddr {
        self.base.to_offset((index * PAGE_SIZE) as isize)
    }

    fn index_of(&self, paddr: PhyAddr) -> Option<usize> {
        if !paddr.is_page_aligned() || paddr < self.base {
            return None;
        }
        let index = (paddr.addr - self.base.addr) / PAGE_SIZE;
        (index < self.nframes).then_some(index)
    }

    fn entry_addr(&self, index: usize) -> PhyAddr {
        self.base.to_offset((index * ENTRY_SIZE) as isize)
    }

    fn read(&self, machine: &dyn Machine, index: usize) -> CoreEntry {
        let mut raw = [0u8; ENTRY_SIZE];
        machine.read_phys(self.entry_addr(index), &mut raw);
        CoreEntry::decode(u32::from_ne_bytes(raw))
    }

    fn write(&self, machine: &dyn Machine, index: usize, entry: CoreEntry) {
        machine.write_phys(self.entry_addr(index), &entry.encode().to_ne_bytes());
    }

    /// First-fit, lowest address first.
    fn find_run(&self, machine: &dyn Machine, npages: usize) -> Option<usize> {
        let mut run = 0;
        for i in 0..self.nframes {
            if self.read(machine, i).free {
                run += 1;
                if run == npages {
                    return Some(i + 1 - npages);
                }
            } else {
                run = 0;
            }
        }
        None
    }

    fn mark_allocated(&self, machine: &dyn Machine, head: usize, npages: usize) {
        for i in head..head + npages {
            let run_length = if i == head { npages } else { 0 };
            self.write(machine, i, CoreEntry { free: false, run_length });
        }
    }

    fn mark_free(&self, machine: &dyn Machine, head: usize) -> usize {
        let npages = self.read(machine, head).run_length;
        for i in head..head + npages {
            assert!(!self.read(machine, i).free, "Coremap corrupted: free frame inside an allocated run.");
            self.write(machine, i, CoreEntry::FREE);
        }
        npages
    }

    fn count_free(&self, machine: &dyn Machine) -> usize {
        (0..self.nframes).filter(|i| self.read(machine, *i).free).count()
    }
}

enum CoremapState {
    Stealing {
        first: Option<PhyAddr>,
    },
    Ready(CoreTable),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CoremapStats {
    pub total: usize,
    pub free: usize,
    pub reserved: usize,
}

pub struct Coremap {
    machine: Arc<dyn Machine>,
    state: Spinlock<CoremapState>,
}

impl Coremap {
    pub fn new(machine: Arc<dyn Machine>) -> Self {
        Self {
            machine,
            state: Spinlock::new(CoremapState::Stealing { first: None }),
        }
    }

    fn machine(&self) -> &dyn Machine {
        self.machine.as_ref()
    }

    /// Build the coremap over whatever RAM is still unclaimed. The first
    /// frames of that range hold the table itself.
    pub fn bootstrap(&self) {
        let mut state = self.state.lock();
        let first_stolen = match &*state {
            CoremapState::Stealing { first } => *first,
            CoremapState::Ready(_) => panic!("Coremap bootstrapped twice."),
        };
        let (lo, hi) = self.machine.ram_getsize();
        let lo = lo.round_up();
        let hi = hi.round_down();
        let nframes = if hi > lo { (hi.addr - lo.addr) / PAGE_SIZE } else { 0 };
        let table_pages = div_round_up(nframes * ENTRY_SIZE, PAGE_SIZE);
        if table_pages >= nframes {
            panic!("No memory for core map: {} frames, table needs {}.", nframes, table_pages);
        }
        assert!(nframes < ENTRY_FREE as usize, "Too many frames for the coremap: {}.", nframes);

        let table = CoreTable {
            base: lo,
            nframes,
            reserved: table_pages,
            stolen: first_stolen.map_or(lo.addr..lo.addr, |first| first.addr..lo.addr),
        };
        for i in 0..nframes {
            table.write(self.machine(), i, if i < table_pages { CoreEntry::TAKEN } else { CoreEntry::FREE });
        }

        info!("Coremap: {} to {}, {} frames, {} reserved for the table, {:#x} bytes stolen at boot.",
            lo, hi, nframes, table_pages, table.stolen.len());
        *state = CoremapState::Ready(table);
    }

    pub fn is_bootstrapped(&self) -> bool {
        matches!(&*self.state.lock(), CoremapState::Ready(_))
    }

    /// Allocate `npages` physically contiguous frames.
    pub fn allocate(&self, npages: usize) -> Result<PhyAddr> {
        if npages == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let mut state = self.state.lock();
        match &mut *state {
            CoremapState::Stealing { first } => {
                let paddr = self.machine.ram_stealmem(npages).ok_or(KernelError::OutOfMemory)?;
                first.get_or_insert(paddr);
                trace!("Stole {} page(s) at {}.", npages, paddr);
                Ok(paddr)
            }
            CoremapState::Ready(table) => {
                let head = table.find_run(self.machine(), npages).ok_or_else(|| {
                    debug!("No run of {} free frame(s) left.", npages);
                    KernelError::OutOfMemory
                })?;
                table.mark_allocated(self.machine(), head, npages);
                trace!("Allocated {} page(s) at {}.", npages, table.addr_of(head));
                Ok(table.addr_of(head))
            }
        }
    }

    /// Give back a run previously returned by `allocate`.
    pub fn release(&self, paddr: PhyAddr) {
        let state = self.state.lock();
        match &*state {
            CoremapState::Stealing { .. } => {
                // nothing to record it in yet
                trace!("Leaking {}, coremap not ready.", paddr);
            }
            CoremapState::Ready(table) => {
                if table.stolen.contains(&paddr.addr) {
                    warn!("{} was stolen before bootstrap and cannot be released.", paddr);
                    return;
                }
                let index = table.index_of(paddr)
                    .unwrap_or_else(|| panic!("Release of {}: not a coremap frame.", paddr));
                let head = table.read(self.machine(), index);
                assert!(!head.free && head.run_length > 0,
                        "Release of {}: not the head of an allocated run.", paddr);
                let npages = table.mark_free(self.machine(), index);
                trace!("Released {} page(s) at {}.", npages, paddr);
            }
        }
    }

    /// Allocate kernel pages, returned as kseg0 addresses.
    pub fn alloc_kpages(&self, npages: usize) -> Result<VirtAddr> {
        self.allocate(npages).map(|paddr| paddr.to_kvaddr())
    }

    pub fn free_kpages(&self, kvaddr: VirtAddr) {
        let paddr = kvaddr.kvaddr_to_paddr()
            .unwrap_or_else(|| panic!("free_kpages of {}: not a kernel address.", kvaddr));
        self.release(paddr);
    }

    pub fn stats(&self) -> Option<CoremapStats> {
        match &*self.state.lock() {
            CoremapState::Stealing { .. } => None,
            CoremapState::Ready(table) => Some(CoremapStats {
                total: table.nframes,
                free: table.count_free(self.machine()),
                reserved: table.reserved,
            }),
        }
    }

    /// Physical range covered by the coremap, table frames included.
    pub fn managed_range(&self) -> Option<Range<PhyAddr>> {
        match &*self.state.lock() {
            CoremapState::Stealing { .. } => None,
            CoremapState::Ready(table) => Some(table.base..table.addr_of(table.nframes)),
        }
    }

    pub fn is_free(&self, paddr: PhyAddr) -> Option<bool> {
        match &*self.state.lock() {
            CoremapState::Stealing { .. } => None,
            CoremapState::Ready(table) => table.index_of(paddr).map(|i| table.read(self.machine(), i).free),
        }
    }

    /// Length of the run headed at `paddr`, 0 if it is not a run head.
    pub fn run_length(&self, paddr: PhyAddr) -> Option<usize> {
        match &*self.state.lock() {
            CoremapState::Stealing { .. } => None,
            CoremapState::Ready(table) => table.index_of(paddr).map(|i| table.read(self.machine(), i).run_length),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use super::*;
    use crate::arch::SimMachine;

    // 256 frames of RAM, kernel image in the first 16.
    fn coremap() -> Coremap {
        let machine = Arc::new(SimMachine::builder().build());
        let coremap = Coremap::new(machine);
        coremap.bootstrap();
        coremap
    }

    const FIRST_FREE: usize = 17 * PAGE_SIZE;

    #[test]
    fn bootstrap_reserves_table_frames() {
        let coremap = coremap();
        let stats = coremap.stats().unwrap();
        assert_eq!(stats.total, 240);
        assert_eq!(stats.reserved, 1);
        assert_eq!(stats.free, 239);
        assert_eq!(coremap.is_free(PhyAddr::from(16 * PAGE_SIZE)), Some(false));
        assert_eq!(coremap.allocate(1), Ok(PhyAddr::from(FIRST_FREE)));
    }

    #[test]
    fn table_lives_in_reserved_frames() {
        let machine = Arc::new(SimMachine::builder().build());
        let coremap = Coremap::new(machine.clone());
        coremap.bootstrap();
        let raw = |index: usize| {
            let mut word = [0u8; ENTRY_SIZE];
            machine.read_phys(PhyAddr::from(16 * PAGE_SIZE + index * ENTRY_SIZE), &mut word);
            u32::from_ne_bytes(word)
        };
        assert_eq!(raw(0), CoreEntry::TAKEN.encode());
        assert_eq!(raw(1), ENTRY_FREE);

        let head = coremap.allocate(3).unwrap();
        assert_eq!(head, PhyAddr::from(FIRST_FREE));
        assert_eq!(CoreEntry::decode(raw(1)), CoreEntry { free: false, run_length: 3 });
        assert_eq!(CoreEntry::decode(raw(2)), CoreEntry::TAKEN);
        assert_eq!(raw(4), ENTRY_FREE);
        coremap.release(head);
        assert!((1..4).all(|i| raw(i) == ENTRY_FREE));
    }

    #[test]
    fn runs_are_first_fit() {
        let coremap = coremap();
        let a = coremap.allocate(2).unwrap();
        let b = coremap.allocate(3).unwrap();
        assert_eq!(b, a.to_offset(2 * PAGE_SIZE as isize));
        assert_eq!(coremap.run_length(a), Some(2));
        assert_eq!(coremap.run_length(a.to_offset(PAGE_SIZE as isize)), Some(0));
        coremap.release(a);
        // the hole left by `a` is reused first
        assert_eq!(coremap.allocate(1), Ok(a));
        // one frame is left in the hole, too small for two
        assert_eq!(coremap.allocate(2), Ok(b.to_offset(3 * PAGE_SIZE as isize)));
        assert_eq!(coremap.allocate(1), Ok(a.to_offset(PAGE_SIZE as isize)));
    }

    #[test]
    fn allocate_then_release_restores_state() {
        let coremap = coremap();
        let _keep = coremap.allocate(5).unwrap();
        let before = coremap.stats();
        let pa = coremap.allocate(7).unwrap();
        coremap.release(pa);
        assert_eq!(coremap.stats(), before);
        assert_eq!(coremap.run_length(pa), Some(0));
        assert_eq!(coremap.allocate(7), Ok(pa));
    }

    #[test]
    fn exhaustion_is_an_error_not_an_address() {
        let coremap = coremap();
        let free = coremap.stats().unwrap().free;
        assert_eq!(coremap.allocate(free + 1), Err(KernelError::OutOfMemory));
        let all = coremap.allocate(free).unwrap();
        assert_eq!(coremap.allocate(1), Err(KernelError::OutOfMemory));
        coremap.release(all);
        assert!(coremap.allocate(1).is_ok());
    }

    #[test]
    fn zero_pages_is_invalid() {
        assert_eq!(coremap().allocate(0), Err(KernelError::InvalidArgument));
    }

    #[test]
    #[should_panic(expected = "not the head")]
    fn release_of_run_tail_panics() {
        let coremap = coremap();
        let pa = coremap.allocate(3).unwrap();
        coremap.release(pa.to_offset(PAGE_SIZE as isize));
    }

    #[test]
    #[should_panic(expected = "not the head")]
    fn double_free_panics() {
        let coremap = coremap();
        let pa = coremap.allocate(1).unwrap();
        coremap.release(pa);
        coremap.release(pa);
    }

    #[test]
    #[should_panic(expected = "not the head")]
    fn release_of_table_frame_panics() {
        coremap().release(PhyAddr::from(16 * PAGE_SIZE));
    }

    #[test]
    #[should_panic(expected = "not a coremap frame")]
    fn release_outside_ram_panics() {
        coremap().release(PhyAddr::from(4096 * PAGE_SIZE));
    }

    #[test]
    fn stolen_frames_are_never_reclaimed() {
        let machine = Arc::new(SimMachine::builder().build());
        let coremap = Coremap::new(machine);
        assert!(!coremap.is_bootstrapped());
        let stolen = coremap.allocate(2).unwrap();
        assert_eq!(stolen, PhyAddr::from(16 * PAGE_SIZE));
        // releasing before the coremap exists simply leaks
        coremap.release(stolen);
        assert_eq!(coremap.stats(), None);

        coremap.bootstrap();
        let range = coremap.managed_range().unwrap();
        assert_eq!(range.start, PhyAddr::from(18 * PAGE_SIZE));
        let before = coremap.stats();
        coremap.release(stolen);
        coremap.release(stolen.to_offset(PAGE_SIZE as isize));
        assert_eq!(coremap.stats(), before);
        assert!(coremap.allocate(1).unwrap() >= range.start);
    }

    #[test]
    #[should_panic(expected = "bootstrapped twice")]
    fn bootstrap_twice_panics() {
        coremap().bootstrap();
    }

    #[test]
    #[should_panic(expected = "No memory for core map")]
    fn bootstrap_without_room_panics() {
        let machine = Arc::new(SimMachine::builder()
            .with_ram_size(17 * PAGE_SIZE)
            .with_kernel_end(16 * PAGE_SIZE)
            .build());
        Coremap::new(machine).bootstrap();
    }

    #[test]
    fn kernel_pages_go_through_kseg0() {
        let coremap = coremap();
        let kva = coremap.alloc_kpages(2).unwrap();
        assert!(kva.is_kseg0());
        assert_eq!(kva.kvaddr_to_paddr(), Some(PhyAddr::from(FIRST_FREE)));
        coremap.free_kpages(kva);
        assert_eq!(coremap.is_free(PhyAddr::from(FIRST_FREE)), Some(true));
    }

    #[test]
    fn concurrent_callers_never_share_frames() {
        let coremap = Arc::new(coremap());
        let before = coremap.stats();
        let workers: Vec<_> = (0..4).map(|_| {
            let coremap = coremap.clone();
            thread::spawn(move || {
                let mut held = Vec::new();
                for round in 0..200 {
                    held.push(coremap.allocate(1 + round % 3).unwrap());
                    if held.len() > 5 {
                        coremap.release(held.remove(0));
                    }
                }
                held
            })
        }).collect();
        let mut outstanding: Vec<PhyAddr> = workers.into_iter().flat_map(|w| w.join().unwrap()).collect();
        let n = outstanding.len();
        outstanding.sort();
        outstanding.dedup();
        assert_eq!(outstanding.len(), n);
        outstanding.into_iter().for_each(|pa| coremap.release(pa));
        assert_eq!(coremap.stats(), before);
    }
}
