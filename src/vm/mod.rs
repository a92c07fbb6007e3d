//! # VM
//!
//! Kernel-wide VM service. Owns the machine handle and the coremap; address
//! spaces hold an `Arc<Vm>` instead of reaching for global state, and the
//! kernel installs one instance at boot for code that has no handle.
//! ---
//! Change log:
//!   - 2024/05/02: File created.

mod addrspace;
mod fault;
mod tlb;

use alloc::sync::Arc;
use log::info;
use spin::Once;
use crate::arch::Machine;
use crate::config::{SYS_MACHINE, SYS_NAME};
use crate::memory::{Coremap, VirtAddr};
use crate::utils::error::Result;

pub use addrspace::{AddressSpace, Region, RegionFlags};
pub use fault::{vm_fault, FaultType, VM_FAULT_READ, VM_FAULT_READONLY, VM_FAULT_WRITE};
pub use tlb::{tlb_shootdown, tlb_shootdown_all, TlbShootdown};

pub struct Vm {
    machine: Arc<dyn Machine>,
    coremap: Coremap,
}

impl Vm {
    pub fn new(machine: Arc<dyn Machine>) -> Arc<Self> {
        Arc::new(Self {
            coremap: Coremap::new(machine.clone()),
            machine,
        })
    }

    /// vm_bootstrap
    pub fn bootstrap(&self) {
        self.coremap.bootstrap();
    }

    pub fn machine(&self) -> &dyn Machine {
        self.machine.as_ref()
    }

    pub fn coremap(&self) -> &Coremap {
        &self.coremap
    }

    pub fn alloc_kpages(&self, npages: usize) -> Result<VirtAddr> {
        self.coremap.alloc_kpages(npages)
    }

    pub fn free_kpages(&self, kvaddr: VirtAddr) {
        self.coremap.free_kpages(kvaddr)
    }
}

static VM: Once<Arc<Vm>> = Once::new();

/// Create and bootstrap the global VM. Later calls return the first instance
/// and ignore `machine`.
pub fn init(machine: Arc<dyn Machine>) -> Arc<Vm> {
    VM.call_once(|| {
        info!("{} VM on {}: bootstrapping.", SYS_NAME, SYS_MACHINE);
        let vm = Vm::new(machine);
        vm.bootstrap();
        vm
    }).clone()
}

pub fn get() -> Option<Arc<Vm>> {
    VM.get().cloned()
}
