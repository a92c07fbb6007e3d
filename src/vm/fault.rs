//! # Fault
//!
//! TLB miss handling
//! ---
//! Change log:
//!   - 2024/05/02: File created.

use log::trace;
use crate::memory::{Addr, VirtAddr};
use crate::process::Process;
use crate::utils::error::{EmptyResult, KernelError};

pub const VM_FAULT_READ: usize = 0;
pub const VM_FAULT_WRITE: usize = 1;
pub const VM_FAULT_READONLY: usize = 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultType {
    Read,
    Write,
    /// Write to a page installed without DIRTY.
    ReadOnly,
}

impl TryFrom<usize> for FaultType {
    type Error = KernelError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            VM_FAULT_READ => Ok(FaultType::Read),
            VM_FAULT_WRITE => Ok(FaultType::Write),
            VM_FAULT_READONLY => Ok(FaultType::ReadOnly),
            _ => Err(KernelError::InvalidArgument),
        }
    }
}

/// Resolve a TLB miss at `fault_address` for `curproc` and load the
/// translation into the TLB.
pub fn vm_fault(fault_type: usize, fault_address: VirtAddr, curproc: Option<&Process>) -> EmptyResult {
    let vpage = fault_address.round_down();
    trace!("Fault type {} at {}", fault_type, fault_address);

    match FaultType::try_from(fault_type)? {
        FaultType::ReadOnly => panic!("Read-only fault at {}, no page is ever installed read-only.", fault_address),
        FaultType::Read | FaultType::Write => {}
    }

    // no process: fault during early boot
    let process = curproc.ok_or(KernelError::AccessFault)?;
    let addrspace = process.getas();
    let addrspace = addrspace.as_ref().ok_or(KernelError::AccessFault)?;

    let ppage = addrspace.lookup_page(vpage)?;
    assert!(ppage.is_page_aligned(), "Frame {} for {} is misaligned.", ppage, vpage);
    addrspace.vm().tlb_install(vpage, ppage);
    Ok(())
}
