//! # Pid
//!
//! ---
//! Change log:
//!   - 2024/03/19: File created.
//!   - 2024/05/02: Bounded range, exhaustion is an error.

use alloc::vec::Vec;
use lazy_static::lazy_static;
use crate::config::{PID_MAX, PID_MIN};
use crate::core::Spinlock;
use crate::utils::error::{KernelError, Result};

#[derive(Debug, PartialEq)]
pub struct Pid(usize);

pub struct RecycleAllocator {
    next: usize,
    max: usize,
    free: Vec<usize>,
}

impl RecycleAllocator {
    pub fn new(min: usize, max: usize) -> Self {
        RecycleAllocator {
            next: min,
            max,
            free: Vec::new(),
        }
    }

    pub fn alloc(&mut self) -> Option<usize> {
        if let Some(id) = self.free.pop() {
            Some(id)
        } else if self.next <= self.max {
            self.next += 1;
            Some(self.next - 1)
        } else {
            None
        }
    }

    pub fn free(&mut self, id: usize) {
        assert!(id < self.next);
        assert!(!self.free.iter().any(|i| *i == id), "{} already freed.", id);
        self.free.push(id);
    }
}

lazy_static! {
    static ref PID_ALLOCATOR: Spinlock<RecycleAllocator> = Spinlock::new(RecycleAllocator::new(PID_MIN, PID_MAX));
}

impl Pid {
    pub fn new() -> Result<Self> {
        PID_ALLOCATOR.lock().alloc().map(Self).ok_or(KernelError::OutOfMemory)
    }

    pub fn pid(&self) -> usize { self.0 }
}

impl Drop for Pid {
    fn drop(&mut self) {
        PID_ALLOCATOR.lock().free(self.0);
    }
}
