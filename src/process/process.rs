//! # Process
//!
//! The part of a process the VM cares about: its address space slot, and
//! fork / exec / exit as they touch it.
//! ---
//! Change log:
//!   - 2024/03/19: File created.
//!   - 2024/05/02: Trim to the address space slot. Scheduling lives elsewhere.

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, info};
use crate::config::{STACK_PAGES, USER_PTR_SIZE};
use crate::core::{Spinlock, SpinlockGuard};
use crate::memory::{Addr, VirtAddr, PAGE_SIZE};
use crate::utils::error::{KernelError, Result};
use crate::vm::{AddressSpace, Vm};
use super::loader::{load_program, ProgramImage};
use super::pid::Pid;

pub struct Process {
    pid: Pid,
    name: String,
    addrspace: Spinlock<Option<AddressSpace>>,
}

/// Where a freshly exec'd program starts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExecState {
    pub entry: VirtAddr,
    pub stack_pointer: VirtAddr,
    pub argc: usize,
    pub argv: VirtAddr,
}

impl Process {
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            pid: Pid::new()?,
            name: name.to_string(),
            addrspace: Spinlock::new(None),
        })
    }

    pub fn pid(&self) -> usize {
        self.pid.pid()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// curproc_getas
    pub fn getas(&self) -> SpinlockGuard<Option<AddressSpace>> {
        self.addrspace.lock()
    }

    /// curproc_setas, returns the previous address space.
    pub fn setas(&self, new: Option<AddressSpace>) -> Option<AddressSpace> {
        core::mem::replace(&mut *self.addrspace.lock(), new)
    }

    /// Called on every switch to this process.
    pub fn activate(&self) {
        if let Some(addrspace) = self.getas().as_ref() {
            addrspace.activate();
        }
    }

    /// Child with a deep copy of this process's address space.
    pub fn fork(&self, name: &str) -> Result<Process> {
        let child = Process::new(name)?;
        let copy = self.getas().as_ref().map(AddressSpace::copy).transpose()?;
        child.setas(copy);
        debug!("Forked {} ({}) from {} ({}).", child.name, child.pid(), self.name, self.pid());
        Ok(child)
    }

    pub fn exit(&self) {
        if let Some(addrspace) = self.getas().as_ref() {
            addrspace.deactivate();
        }
        if let Some(old) = self.setas(None) {
            old.destroy();
        }
        debug!("{} ({}) released its address space.", self.name, self.pid());
    }

    /// Replace the address space with `image`, arguments copied onto the new
    /// stack. The old address space survives until the new one is complete,
    /// so a failed exec leaves the caller untouched.
    pub fn exec(&self, vm: &Arc<Vm>, image: &ProgramImage, args: &[&str]) -> Result<ExecState> {
        let mut addrspace = AddressSpace::create(vm.clone())?;
        let entry = load_program(&mut addrspace, image)?;
        let stack_top = addrspace.define_stack();
        let (argv, stack_pointer) = copyout_args(&mut addrspace, stack_top, args)?;

        if let Some(old) = self.setas(Some(addrspace)) {
            old.deactivate();
            old.destroy();
        }
        self.activate();
        info!("{} ({}) exec: entry {}, sp {}.", self.name, self.pid(), entry, stack_pointer);
        Ok(ExecState {
            entry,
            stack_pointer,
            argc: args.len(),
            argv,
        })
    }
}

/// Lay out `args` below `stack_top`: the strings, each NUL terminated and
/// padded to a pointer boundary, then the argv array ending in a NULL
/// pointer. Returns `(argv, sp)`, which coincide.
fn copyout_args(addrspace: &mut AddressSpace, stack_top: VirtAddr, args: &[&str]) -> Result<(VirtAddr, VirtAddr)> {
    let strings: usize = args.iter().map(|a| (a.len() + 1).next_multiple_of(USER_PTR_SIZE)).sum();
    let pointers = (args.len() + 1) * USER_PTR_SIZE;
    // worst case alignment loss below the pointer array
    if strings + pointers + 2 * USER_PTR_SIZE > STACK_PAGES * PAGE_SIZE {
        return Err(KernelError::InvalidArgument);
    }

    let mut sp = stack_top;
    let mut user_ptrs = Vec::new();
    user_ptrs.try_reserve_exact(args.len()).map_err(|_| KernelError::OutOfMemory)?;
    for arg in args {
        let len = (arg.len() + 1).next_multiple_of(USER_PTR_SIZE);
        sp = sp.to_offset(-(len as isize));
        addrspace.write_bytes(sp, arg.as_bytes())?;
        addrspace.write_bytes(sp.to_offset(arg.len() as isize), &[0])?;
        user_ptrs.push(sp);
    }

    sp = sp.to_offset(-(pointers as isize)).round_down_to(8);
    let argv = sp;
    let mut slot = argv;
    for ptr in user_ptrs.iter().map(|p| p.addr as u32).chain(core::iter::once(0)) {
        addrspace.write_bytes(slot, &ptr.to_be_bytes())?;
        slot = slot.to_offset(USER_PTR_SIZE as isize);
    }
    Ok((argv, sp))
}
