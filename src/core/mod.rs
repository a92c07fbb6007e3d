//! # Core
//!
//! Core component for kernel, like Environment.
//! Core should keep arch-independent.
//! ---
//! Change log:
//!   - 2024/03/15: File created.

mod spinlock;
mod spl;

pub use spinlock::{Spinlock, SpinlockGuard};
pub use spl::{SplGuard, IPL_HIGH, IPL_NONE};
