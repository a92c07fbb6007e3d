//! # Utils
//!
//! Utilities for kernel development
//! ---
//! Change log:
//!   - 2024/03/13: File created.

#[macro_use]
pub mod print;
pub mod logger;
pub mod error;

pub fn div_round_up(value: usize, by: usize) -> usize {
    (value + by - 1) / by
}
