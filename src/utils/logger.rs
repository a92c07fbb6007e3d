//! # Logger
//!
//! Logger for kernel routine.
//! ---
//! Change log:
//!   - 2024/03/15: File created.
//!   - 2024/05/02: Drop the timer prefix, the VM core has no clock.

use core::fmt::{self, Write};
use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Once;
use crate::utils::print::KernelOut;

struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = format_record(&mut KernelOut, record.level(), *record.args());
        }
    }

    fn flush(&self) {
    }
}

fn level_from(name: Option<&str>) -> LevelFilter {
    match name {
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info
    }
}

pub fn init() {
    static LOGGER: Logger = Logger;
    static INIT: Once<()> = Once::new();
    INIT.call_once(|| {
        // Another logger may already be installed by the embedding kernel.
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(level_from(option_env!("LOG_LEVEL")));
        }
    });
}

/// Write one record the same way the logger prints it.
pub fn format_record<W: Write>(w: &mut W, level: Level, args: fmt::Arguments) -> fmt::Result {
    writeln!(w, "[{: <5}] {}", level, args)
}
