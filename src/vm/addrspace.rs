//! # Address Space
//!
//! Per-process user mapping: up to two program regions in definition order,
//! then a fixed-size stack just below `USERSTACK`. Every page owns one frame,
//! frames of a region need not be physically adjacent.
//! ---
//! Change log:
//!   - 2024/03/19: File created as process_memory.
//!   - 2024/05/02: Page-table maps replaced by fixed regions with frame lists.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::iter;
use core::ops::Range;
use bitflags::bitflags;
use log::{debug, trace, warn};
use crate::config::{MAX_REGIONS, PAGE_FRAME, STACK_PAGES, USERSPACE_TOP, USERSTACK};
use crate::memory::{Addr, PhyAddr, VirtAddr, PAGE_SIZE};
use crate::utils::error::{EmptyResult, KernelError, Result};
use super::Vm;

bitflags! {
    /// Recorded for the loader's benefit. Not enforced: every mapped page is
    /// installed readable, writable and executable.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct RegionFlags: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

pub struct Region {
    vbase: VirtAddr,
    npages: usize,
    flags: RegionFlags,
    frames: Vec<PhyAddr>,
}

impl Region {
    fn new(vbase: VirtAddr, npages: usize, flags: RegionFlags) -> Self {
        Self {
            vbase,
            npages,
            flags,
            frames: Vec::new(),
        }
    }

    fn stack() -> Self {
        Self::new(VirtAddr::from(USERSTACK - STACK_PAGES * PAGE_SIZE), STACK_PAGES,
                  RegionFlags::READ | RegionFlags::WRITE)
    }

    /// Same layout, no frames.
    fn layout(&self) -> Self {
        Self::new(self.vbase, self.npages, self.flags)
    }

    pub fn vbase(&self) -> VirtAddr {
        self.vbase
    }

    pub fn npages(&self) -> usize {
        self.npages
    }

    pub fn flags(&self) -> RegionFlags {
        self.flags
    }

    pub fn frames(&self) -> &[PhyAddr] {
        &self.frames
    }

    pub fn range(&self) -> Range<VirtAddr> {
        // bounded by USERSPACE_TOP when defined
        self.vbase..VirtAddr::from(self.vbase.addr + self.npages * PAGE_SIZE)
    }

    pub fn contains(&self, vaddr: VirtAddr) -> bool {
        self.range().contains(&vaddr)
    }

    fn frame_for(&self, vpage: VirtAddr) -> Option<PhyAddr> {
        if !self.contains(vpage) {
            return None;
        }
        self.frames.get((vpage.addr - self.vbase.addr) / PAGE_SIZE).copied()
    }

    /// One zeroed frame per page. Frames are recorded as they are obtained,
    /// so a failure part way leaves them to be released with the region.
    fn populate(&mut self, vm: &Vm) -> EmptyResult {
        assert!(self.frames.is_empty(), "Region at {} already has frames.", self.vbase);
        self.frames.try_reserve_exact(self.npages).map_err(|_| KernelError::OutOfMemory)?;
        for _ in 0..self.npages {
            let frame = vm.coremap().allocate(1)?;
            vm.machine().zero_page(frame);
            self.frames.push(frame);
        }
        Ok(())
    }

    fn release(&mut self, vm: &Vm) {
        self.frames.drain(..).for_each(|frame| vm.coremap().release(frame));
    }
}

pub struct AddressSpace {
    vm: Arc<Vm>,
    regions: [Option<Region>; MAX_REGIONS],
    stack: Region,
    loaded: bool,
}

impl AddressSpace {
    /// as_create
    pub fn create(vm: Arc<Vm>) -> Result<Self> {
        let mut stack = Region::stack();
        stack.frames.try_reserve_exact(STACK_PAGES).map_err(|_| KernelError::OutOfMemory)?;
        Ok(Self {
            vm,
            regions: [None, None],
            stack,
            loaded: false,
        })
    }

    pub fn vm(&self) -> &Arc<Vm> {
        &self.vm
    }

    /// Program regions in definition order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().flatten()
    }

    pub fn stack(&self) -> &Region {
        &self.stack
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    // lookup order: region 1, region 2, stack
    fn all_regions(&self) -> impl Iterator<Item = &Region> {
        self.regions().chain(iter::once(&self.stack))
    }

    fn all_regions_mut(&mut self) -> impl Iterator<Item = &mut Region> {
        self.regions.iter_mut().flatten().chain(iter::once(&mut self.stack))
    }

    /// as_define_region. `[vaddr, vaddr + size)` is widened to whole pages.
    pub fn define_region(&mut self, vaddr: VirtAddr, size: usize, flags: RegionFlags) -> EmptyResult {
        let size = size.checked_add(vaddr.page_offset())
            .and_then(|size| size.checked_add(PAGE_SIZE - 1))
            .map(|size| size & PAGE_FRAME)
            .ok_or(KernelError::InvalidArgument)?;
        let vbase = vaddr.round_down();
        vbase.addr.checked_add(size)
            .filter(|end| *end <= USERSPACE_TOP)
            .ok_or(KernelError::InvalidArgument)?;

        let Some(slot) = self.regions.iter_mut().find(|r| r.is_none()) else {
            warn!("Third region at {} rejected, only {} supported.", vbase, MAX_REGIONS);
            return Err(KernelError::Unsupported);
        };
        trace!("Region {} + {} pages ({:?})", vbase, size / PAGE_SIZE, flags);
        *slot = Some(Region::new(vbase, size / PAGE_SIZE, flags));
        Ok(())
    }

    /// as_prepare_load. On failure the frames obtained so far stay with the
    /// address space and go back to the coremap when it is destroyed.
    pub fn prepare_load(&mut self) -> EmptyResult {
        let vm = self.vm.clone();
        for region in self.all_regions_mut() {
            region.populate(&vm)?;
        }
        Ok(())
    }

    pub fn complete_load(&mut self) {
        self.loaded = true;
    }

    /// Initial user stack pointer.
    pub fn define_stack(&self) -> VirtAddr {
        assert_eq!(self.stack.frames.len(), STACK_PAGES, "define_stack before prepare_load.");
        VirtAddr::from(USERSTACK)
    }

    /// as_copy: same layout, fresh frames, contents copied page by page.
    pub fn copy(&self) -> Result<Self> {
        let mut new = Self::create(self.vm.clone())?;
        for (dst, src) in new.regions.iter_mut().zip(&self.regions) {
            *dst = src.as_ref().map(Region::layout);
        }
        new.loaded = self.loaded;
        // `new` is dropped on error, releasing whatever it got
        new.prepare_load().inspect_err(|e| debug!("as_copy failed: {}", e))?;

        let machine = self.vm.machine();
        for (dst, src) in new.all_regions().zip(self.all_regions()) {
            for (to, from) in dst.frames.iter().zip(&src.frames) {
                machine.copy_page(*to, *from);
            }
        }
        Ok(new)
    }

    /// as_destroy. Dropping has the same effect.
    pub fn destroy(self) {}

    /// No translation of the previous address space may survive a switch.
    pub fn activate(&self) {
        self.vm.tlb_invalidate_all();
    }

    pub fn deactivate(&self) {}

    /// Frame backing the page containing `vaddr`.
    pub fn lookup_page(&self, vaddr: VirtAddr) -> Result<PhyAddr> {
        let vpage = vaddr.round_down();
        self.all_regions()
            .find(|r| r.contains(vpage))
            .and_then(|r| r.frame_for(vpage))
            .ok_or(KernelError::AccessFault)
    }

    pub fn translate(&self, vaddr: VirtAddr) -> Option<PhyAddr> {
        self.lookup_page(vaddr).ok().map(|frame| frame.to_offset(vaddr.page_offset() as isize))
    }

    fn for_each_chunk(&self, vaddr: VirtAddr, len: usize, mut f: impl FnMut(PhyAddr, Range<usize>)) -> EmptyResult {
        let mut done = 0;
        while done < len {
            let va = VirtAddr::from(vaddr.addr.checked_add(done).ok_or(KernelError::AccessFault)?);
            let pa = self.lookup_page(va)?.to_offset(va.page_offset() as isize);
            let n = (PAGE_SIZE - va.page_offset()).min(len - done);
            f(pa, done..done + n);
            done += n;
        }
        Ok(())
    }

    /// Copy `data` into user memory. Stops at the first unmapped page, bytes
    /// before it have already been written.
    pub fn write_bytes(&mut self, vaddr: VirtAddr, data: &[u8]) -> EmptyResult {
        let machine = self.vm.machine();
        self.for_each_chunk(vaddr, data.len(), |pa, range| machine.write_phys(pa, &data[range]))
    }

    pub fn read_bytes(&self, vaddr: VirtAddr, buf: &mut [u8]) -> EmptyResult {
        let machine = self.vm.machine();
        self.for_each_chunk(vaddr, buf.len(), |pa, range| machine.read_phys(pa, &mut buf[range]))
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        let vm = self.vm.clone();
        self.all_regions_mut().for_each(|region| region.release(&vm));
    }
}
