pub const SYS_NAME: &'static str = "vmcore";
pub const SYS_MACHINE: &'static str = "MIPS-R3000";

pub const PAGE_SIZE: usize = 4096;
pub const PAGE_FRAME: usize = !(PAGE_SIZE - 1); // mask for getting page number from addr

pub const NUM_TLB: usize = 64;
pub const TLB_WIRED: usize = 8; // random register never picks a slot below this

pub const MIPS_KSEG0: usize = 0x8000_0000; // direct-mapped, cached kernel window
pub const USERSPACE_TOP: usize = MIPS_KSEG0;
pub const USERSTACK: usize = USERSPACE_TOP;
pub const STACK_PAGES: usize = 1; // fixed size user stack, in pages

pub const MAX_REGIONS: usize = 2;

// sys161 is a big-endian 32-bit machine
pub const USER_PTR_SIZE: usize = 4;

pub const PID_MIN: usize = 2;
pub const PID_MAX: usize = 32767;
