#![no_std]
#![forbid(unsafe_code)]

//! # Fermon Core
//!
//! Shared vocabulary for the fermentation monitor firmware: the error
//! taxonomy every layer returns, tick and microsecond time types, and the
//! logging macros that forward to `defmt` when it is enabled.

use core::fmt;

pub mod log;
pub mod time;

pub use time::*;

/// Fermon crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the firmware
pub type FmResult<T> = Result<T, FmError>;

/// Error types for kernel and storage operations
///
/// Nothing here is fatal. Callers degrade (run without a timer, run without
/// persistence) or retry on the next main-loop pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmError {
    /// A fixed-size pool (timers, callback slots, task table) is full
    ResourceExhausted,
    /// The exact-wait lock is held or a condition is not met yet
    WouldBlock,
    /// Persistence hardware did not come up within the retry budget
    InitFailed,
    /// Persistence is disabled for this boot
    Unavailable,
    /// Slot index or address past the end of the device
    OutOfRange,
    /// Misaligned address or a value outside its domain
    InvalidArgument,
    /// The storage device rejected a program operation
    WriteFailed,
}

impl FmError {
    /// Errors the caller should simply retry on its next pass.
    pub const fn is_transient(self) -> bool {
        matches!(self, FmError::WouldBlock)
    }

    /// Errors meaning "no persistence this session".
    pub const fn disables_persistence(self) -> bool {
        matches!(self, FmError::InitFailed | FmError::Unavailable)
    }
}

impl fmt::Display for FmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FmError::ResourceExhausted => write!(f, "Resource pool exhausted"),
            FmError::WouldBlock => write!(f, "Operation would block"),
            FmError::InitFailed => write!(f, "Storage initialization failed"),
            FmError::Unavailable => write!(f, "Storage unavailable"),
            FmError::OutOfRange => write!(f, "Index or address out of range"),
            FmError::InvalidArgument => write!(f, "Invalid argument"),
            FmError::WriteFailed => write!(f, "Storage write failed"),
        }
    }
}

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
impl std::error::Error for FmError {}

#[cfg(feature = "defmt")]
impl defmt::Format for FmError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            FmError::ResourceExhausted => defmt::write!(fmt, "ResourceExhausted"),
            FmError::WouldBlock => defmt::write!(fmt, "WouldBlock"),
            FmError::InitFailed => defmt::write!(fmt, "InitFailed"),
            FmError::Unavailable => defmt::write!(fmt, "Unavailable"),
            FmError::OutOfRange => defmt::write!(fmt, "OutOfRange"),
            FmError::InvalidArgument => defmt::write!(fmt, "InvalidArgument"),
            FmError::WriteFailed => defmt::write!(fmt, "WriteFailed"),
        }
    }
}
