use core::error::Error;
use core::fmt::{Debug, Display, Formatter};

// errno values as the syscall layer reports them
pub const EUNIMP: isize = 1;
pub const ENOMEM: isize = 3;
pub const EFAULT: isize = 6;
pub const EINVAL: isize = 8;

#[derive(Copy, Clone, Eq, PartialEq)]
pub enum KernelError {
    /// No physical frames left, or no memory for bookkeeping.
    OutOfMemory,
    /// Request the VM system does not implement, e.g. a third region.
    Unsupported,
    /// Address outside every mapped range, or a fault with no address space.
    AccessFault,
    InvalidArgument,
}

impl KernelError {
    pub fn errno(&self) -> isize {
        match self {
            KernelError::OutOfMemory => ENOMEM,
            KernelError::Unsupported => EUNIMP,
            KernelError::AccessFault => EFAULT,
            KernelError::InvalidArgument => EINVAL,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            KernelError::OutOfMemory => "out of memory",
            KernelError::Unsupported => "not implemented",
            KernelError::AccessFault => "bad memory reference",
            KernelError::InvalidArgument => "invalid argument",
        }
    }
}

impl Debug for KernelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "Kernel Error: {} (errno {})", self.describe(), self.errno())
    }
}

impl Display for KernelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "Kernel Error: {}", self.describe())
    }
}

impl Error for KernelError {}

pub type Result<T> = core::result::Result<T, KernelError>;
pub type EmptyResult = Result<()>;

#[cfg(test)]
mod tests {
    use alloc::string::ToString;
    use super::*;

    #[test]
    fn errno_mapping_is_distinct() {
        let all = [
            KernelError::OutOfMemory,
            KernelError::Unsupported,
            KernelError::AccessFault,
            KernelError::InvalidArgument,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.errno(), b.errno());
            }
        }
        assert_eq!(KernelError::OutOfMemory.errno(), ENOMEM);
    }

    #[test]
    fn display_names_the_condition() {
        assert_eq!(KernelError::Unsupported.to_string(), "Kernel Error: not implemented");
    }
}
