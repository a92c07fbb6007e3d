//! # Sim
//!
//! Software model of the machine: byte-addressed RAM starting at physical 0,
//! a 64-slot fully associative TLB with a random register, and a single
//! interrupt priority level. `translate` does what the CPU does on every
//! user access, so callers can observe hits and misses.
//! ---
//! Change log:
//!   - 2024/05/02: File created.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use crate::arch::{Machine, TlbEntry};
use crate::config::{NUM_TLB, PAGE_SIZE, TLB_WIRED};
use crate::core::{Spinlock, IPL_HIGH, IPL_NONE};
use crate::memory::{Addr, PhyAddr, VirtAddr};
use crate::utils::print::Console;

struct RamBounds {
    firstpaddr: usize,
    lastpaddr: usize,
}

pub struct SimMachine {
    ram: Spinlock<Vec<u8>>,
    bounds: Spinlock<RamBounds>,
    tlb: Spinlock<[TlbEntry; NUM_TLB]>,
    random: AtomicUsize,
    has_random: bool,
    spl: AtomicUsize,
    unprotected_tlb_writes: AtomicUsize,
    console: Spinlock<String>,
}

pub struct SimMachineBuilder {
    ram_size: usize,
    kernel_end: usize,
    has_random: bool,
}

impl SimMachineBuilder {
    /// Total RAM in bytes. Physical addresses run from 0 to this value.
    pub fn with_ram_size(self, ram_size: usize) -> Self {
        Self {
            ram_size,
            ..self
        }
    }

    /// First physical address not occupied by the kernel image.
    pub fn with_kernel_end(self, kernel_end: usize) -> Self {
        Self {
            kernel_end,
            ..self
        }
    }

    pub fn without_random_replacement(self) -> Self {
        Self {
            has_random: false,
            ..self
        }
    }

    pub fn build(self) -> SimMachine {
        assert!(self.kernel_end <= self.ram_size, "Kernel image larger than RAM.");
        let tlb: [TlbEntry; NUM_TLB] = core::array::from_fn(TlbEntry::invalid);
        SimMachine {
            ram: Spinlock::new(vec![0xa5; self.ram_size]), // garbage, never assume zeroed RAM
            bounds: Spinlock::new(RamBounds {
                firstpaddr: self.kernel_end,
                lastpaddr: self.ram_size,
            }),
            tlb: Spinlock::new(tlb),
            random: AtomicUsize::new(NUM_TLB - 1),
            has_random: self.has_random,
            spl: AtomicUsize::new(IPL_NONE),
            unprotected_tlb_writes: AtomicUsize::new(0),
            console: Spinlock::new(String::new()),
        }
    }
}

impl SimMachine {
    pub fn builder() -> SimMachineBuilder {
        SimMachineBuilder {
            ram_size: 1024 * 1024,
            kernel_end: 16 * PAGE_SIZE,
            has_random: true,
        }
    }

    pub fn spl(&self) -> usize {
        self.spl.load(Ordering::SeqCst)
    }

    /// TLB lookup as the CPU performs it. `None` is a TLB miss.
    pub fn translate(&self, vaddr: VirtAddr) -> Option<PhyAddr> {
        let tlb = self.tlb.lock();
        tlb.iter().find(|e| e.matches(vaddr)).map(|e| {
            e.ppage().to_offset((vaddr.addr - vaddr.round_down().addr) as isize)
        })
    }

    pub fn tlb_snapshot(&self) -> [TlbEntry; NUM_TLB] {
        *self.tlb.lock()
    }

    pub fn valid_tlb_entries(&self) -> usize {
        self.tlb.lock().iter().filter(|e| e.is_valid()).count()
    }

    /// TLB writes observed while interrupts were enabled.
    pub fn unprotected_tlb_writes(&self) -> usize {
        self.unprotected_tlb_writes.load(Ordering::SeqCst)
    }

    pub fn console_output(&self) -> String {
        self.console.lock().clone()
    }

    fn note_tlb_write(&self) {
        if self.spl() == IPL_NONE {
            self.unprotected_tlb_writes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn check_range(&self, ram_len: usize, addr: PhyAddr, len: usize) {
        assert!(addr.addr.checked_add(len).is_some_and(|end| end <= ram_len),
                "Bus error: physical access {} + {:#x} outside RAM.", addr, len);
    }
}

impl Machine for SimMachine {
    fn ram_getsize(&self) -> (PhyAddr, PhyAddr) {
        let mut bounds = self.bounds.lock();
        let range = (PhyAddr::from(bounds.firstpaddr), PhyAddr::from(bounds.lastpaddr));
        bounds.firstpaddr = 0;
        bounds.lastpaddr = 0;
        range
    }

    fn ram_stealmem(&self, npages: usize) -> Option<PhyAddr> {
        let mut bounds = self.bounds.lock();
        let size = npages.checked_mul(PAGE_SIZE)?;
        if bounds.firstpaddr.checked_add(size)? > bounds.lastpaddr {
            return None;
        }
        let paddr = bounds.firstpaddr;
        bounds.firstpaddr += size;
        Some(PhyAddr::from(paddr))
    }

    fn tlb_read(&self, index: usize) -> TlbEntry {
        self.tlb.lock()[index]
    }

    fn tlb_write(&self, entry: TlbEntry, index: usize) {
        self.note_tlb_write();
        self.tlb.lock()[index] = entry;
    }

    fn tlb_random(&self, entry: TlbEntry) -> bool {
        if !self.has_random {
            return false;
        }
        // Random register counts down through the unwired slots.
        let index = self.random.load(Ordering::SeqCst);
        let next = if index <= TLB_WIRED { NUM_TLB - 1 } else { index - 1 };
        self.random.store(next, Ordering::SeqCst);
        self.tlb_write(entry, index);
        true
    }

    fn splhigh(&self) -> usize {
        self.spl.swap(IPL_HIGH, Ordering::SeqCst)
    }

    fn splx(&self, level: usize) {
        self.spl.store(level, Ordering::SeqCst);
    }

    fn zero_page(&self, page: PhyAddr) {
        let mut ram = self.ram.lock();
        self.check_range(ram.len(), page, PAGE_SIZE);
        ram[page.addr..page.addr + PAGE_SIZE].fill(0);
    }

    fn copy_page(&self, dst: PhyAddr, src: PhyAddr) {
        let mut ram = self.ram.lock();
        self.check_range(ram.len(), dst, PAGE_SIZE);
        self.check_range(ram.len(), src, PAGE_SIZE);
        ram.copy_within(src.addr..src.addr + PAGE_SIZE, dst.addr);
    }

    fn write_phys(&self, addr: PhyAddr, data: &[u8]) {
        let mut ram = self.ram.lock();
        self.check_range(ram.len(), addr, data.len());
        ram[addr.addr..addr.addr + data.len()].copy_from_slice(data);
    }

    fn read_phys(&self, addr: PhyAddr, buf: &mut [u8]) {
        let ram = self.ram.lock();
        self.check_range(ram.len(), addr, buf.len());
        buf.copy_from_slice(&ram[addr.addr..addr.addr + buf.len()]);
    }
}

impl Console for SimMachine {
    fn putch(&self, c: u8) {
        self.console.lock().push(c as char);
    }
}
