//! # Loader
//!
//! Puts a parsed program image into an address space. Parsing the executable
//! format is the caller's job; what arrives here is a list of segments.
//! ---
//! Change log:
//!   - 2024/03/21: File created as load_from_elf.
//!   - 2024/05/02: Work on segments and the region API.

use alloc::vec::Vec;
use log::debug;
use crate::memory::VirtAddr;
use crate::utils::error::{KernelError, Result};
use crate::vm::{AddressSpace, RegionFlags};

/// One loadable segment. `data` is the file content, the rest of `mem_size`
/// stays zero.
#[derive(Clone, Debug)]
pub struct Segment<'a> {
    pub vaddr: VirtAddr,
    pub mem_size: usize,
    pub data: &'a [u8],
    pub flags: RegionFlags,
}

#[derive(Clone, Debug)]
pub struct ProgramImage<'a> {
    pub entry: VirtAddr,
    pub segments: Vec<Segment<'a>>,
}

impl<'a> ProgramImage<'a> {
    pub fn new(entry: VirtAddr) -> Self {
        Self {
            entry,
            segments: Vec::new(),
        }
    }

    pub fn with_segment(mut self, vaddr: VirtAddr, mem_size: usize, data: &'a [u8], flags: RegionFlags) -> Self {
        self.segments.push(Segment { vaddr, mem_size, data, flags });
        self
    }
}

/// Define one region per segment, allocate, copy file content in and mark the
/// space loaded. Returns the entry point.
pub fn load_program(addrspace: &mut AddressSpace, image: &ProgramImage) -> Result<VirtAddr> {
    for segment in &image.segments {
        if segment.data.len() > segment.mem_size {
            debug!("Segment at {}: file size {:#x} exceeds memory size {:#x}.",
                segment.vaddr, segment.data.len(), segment.mem_size);
            return Err(KernelError::InvalidArgument);
        }
        addrspace.define_region(segment.vaddr, segment.mem_size, segment.flags)?;
    }
    addrspace.prepare_load()?;
    for segment in &image.segments {
        addrspace.write_bytes(segment.vaddr, segment.data)?;
    }
    addrspace.complete_load();
    Ok(image.entry)
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use super::*;
    use crate::arch::SimMachine;
    use crate::memory::PAGE_SIZE;
    use crate::vm::Vm;

    fn addrspace() -> AddressSpace {
        let vm = Vm::new(Arc::new(SimMachine::builder().build()));
        vm.bootstrap();
        AddressSpace::create(vm).unwrap()
    }

    #[test]
    fn segments_become_regions_with_content() {
        let text = [0x27u8, 0xbd, 0xff, 0xe8];
        let image = ProgramImage::new(VirtAddr::from(0x0040_0010))
            .with_segment(VirtAddr::from(0x0040_0000), 0x20, &text, RegionFlags::READ | RegionFlags::EXEC)
            .with_segment(VirtAddr::from(0x1000_0000), 3 * PAGE_SIZE, b"data", RegionFlags::READ | RegionFlags::WRITE);
        let mut space = addrspace();
        assert_eq!(load_program(&mut space, &image), Ok(VirtAddr::from(0x0040_0010)));
        assert!(space.is_loaded());
        assert_eq!(space.regions().map(|r| r.npages()).collect::<Vec<_>>(), [1, 3]);

        let mut buf = [0u8; 8];
        space.read_bytes(VirtAddr::from(0x0040_0000), &mut buf).unwrap();
        assert_eq!(buf, [0x27, 0xbd, 0xff, 0xe8, 0, 0, 0, 0]);
        space.read_bytes(VirtAddr::from(0x1000_2ff8), &mut buf).unwrap();
        assert_eq!(buf, [0; 8]);
    }

    #[test]
    fn oversized_file_data_is_rejected() {
        let image = ProgramImage::new(VirtAddr::from(0x1000))
            .with_segment(VirtAddr::from(0x1000), 2, b"abc", RegionFlags::READ);
        assert_eq!(load_program(&mut addrspace(), &image), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn three_segments_are_unsupported() {
        let mut image = ProgramImage::new(VirtAddr::from(0x1000));
        for i in 1..=3 {
            image = image.with_segment(VirtAddr::from(i * 0x0010_0000), 0x10, b"", RegionFlags::READ);
        }
        let mut space = addrspace();
        assert_eq!(load_program(&mut space, &image), Err(KernelError::Unsupported));
        assert!(!space.is_loaded());
    }
}
