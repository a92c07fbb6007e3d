//! # Print
//!
//! Macro for print and println
//! ---
//! Change log:
//!   - 2024/03/14: File created.
//!   - 2024/05/02: Console is registered by the platform instead of being a fixed device.

use core::fmt::{Arguments, Write};
use spin::Once;

/// Byte sink the platform provides for kernel output.
pub trait Console: Send + Sync {
    fn putch(&self, c: u8);
}

static CONSOLE: Once<&'static dyn Console> = Once::new();

/// Register the kernel console. Only the first registration takes effect.
pub fn set_console(console: &'static dyn Console) {
    CONSOLE.call_once(|| console);
}

/// `fmt::Write` over the registered console. Output before the console
/// exists is dropped.
pub struct KernelOut;

impl Write for KernelOut {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        if let Some(console) = CONSOLE.get() {
            s.bytes().for_each(|c| console.putch(c));
        }
        Ok(())
    }
}

pub fn print(args: Arguments) {
    let _ = KernelOut.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::utils::print::print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
