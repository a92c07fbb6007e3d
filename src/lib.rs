//! # vmcore
//!
//! Virtual memory core for a single-TLB MIPS kernel: coremap frame allocator,
//! two-region address spaces and the TLB refill fault handler.
//! ---
//! Change log:
//!   - 2024/03/13: File created.
//!   - 2024/05/02: Split into a library so the VM core can be tested on host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod utils;
pub mod config;
pub mod core;
pub mod arch;
pub mod memory;
pub mod vm;
pub mod process;

pub use utils::error::{EmptyResult, KernelError, Result};
