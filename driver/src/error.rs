//! Driver errors and their POSIX error numbers.

use ctr_hw::FieldError;

/// A failed access on the module bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// Read at byte offset faulted
    Read { offset: usize },
    /// Write at byte offset faulted
    Write { offset: usize },
}

impl core::fmt::Display for BusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BusError::Read { offset } => write!(f, "bus error reading offset {:#x}", offset),
            BusError::Write { offset } => write!(f, "bus error writing offset {:#x}", offset),
        }
    }
}

/// Errors returned by driver operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrError {
    /// Bad argument, size or value
    InvalidArgument,
    /// Minor device number outside the client table
    BadAddress,
    /// File handle not open
    NotOpen,
    /// No such module, or the driver is not installed
    NoDevice,
    /// Object in use or already exists, or no timer available
    Busy,
    /// Table full
    NoMemory,
    /// Nothing matched the connection request
    NoSuchConnection,
    /// Read timed out
    TimedOut,
    /// Wait interrupted by a signal or by uninstall
    Interrupted,
    /// Module did not answer a ping
    Bus(BusError),
}

impl CtrError {
    /// POSIX error number.
    pub const fn errno(&self) -> i32 {
        match self {
            CtrError::InvalidArgument => 22,
            CtrError::BadAddress => 14,
            CtrError::NotOpen => 9,
            CtrError::NoDevice => 19,
            CtrError::Busy => 16,
            CtrError::NoMemory => 12,
            CtrError::NoSuchConnection => 6,
            CtrError::TimedOut => 62,
            CtrError::Interrupted => 4,
            CtrError::Bus(_) => 5,
        }
    }
}

impl From<BusError> for CtrError {
    fn from(e: BusError) -> Self {
        CtrError::Bus(e)
    }
}

impl From<FieldError> for CtrError {
    fn from(_: FieldError) -> Self {
        CtrError::InvalidArgument
    }
}

impl core::fmt::Display for CtrError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CtrError::InvalidArgument => write!(f, "Invalid argument"),
            CtrError::BadAddress => write!(f, "Bad address"),
            CtrError::NotOpen => write!(f, "Bad file number"),
            CtrError::NoDevice => write!(f, "No such device"),
            CtrError::Busy => write!(f, "Device or resource busy"),
            CtrError::NoMemory => write!(f, "Not enough space"),
            CtrError::NoSuchConnection => write!(f, "No such device or address"),
            CtrError::TimedOut => write!(f, "Timer expired"),
            CtrError::Interrupted => write!(f, "Interrupted system call"),
            CtrError::Bus(e) => write!(f, "I/O error: {}", e),
        }
    }
}

/// Driver result type.
pub type CtrResult<T> = Result<T, CtrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_values() {
        assert_eq!(CtrError::InvalidArgument.errno(), 22);
        assert_eq!(CtrError::NoSuchConnection.errno(), 6);
        assert_eq!(CtrError::TimedOut.errno(), 62);
        assert_eq!(CtrError::from(BusError::Read { offset: 4 }).errno(), 5);
    }

    #[test]
    fn test_field_error_is_invalid_argument() {
        let e = FieldError {
            field: "mode",
            value: 9,
        };
        assert_eq!(CtrError::from(e), CtrError::InvalidArgument);
    }
}
