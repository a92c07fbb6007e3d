//! # Process
//!
//! Process control
//! ---
//! Change log:
//!   - 2024/03/18: File created.
//!   - 2024/05/02: Only the address space lifecycle is kept here.

mod pid;
mod process;
mod loader;

pub use pid::Pid;
pub use process::{ExecState, Process};
pub use loader::{load_program, ProgramImage, Segment};
