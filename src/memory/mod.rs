//! # Memory
//!
//! Physical memory management
//! ---
//! Change log:
//!   - 2024/03/15: File created.
//!   - 2024/05/02: Page allocator replaced by the coremap.

mod address;
mod coremap;
#[cfg(test)]
mod tests_prop;

pub use address::{PhyAddr, VirtAddr, Addr};
pub use coremap::{Coremap, CoremapStats};

pub use crate::config::PAGE_SIZE;
