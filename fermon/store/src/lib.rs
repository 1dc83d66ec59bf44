#![no_std]
#![forbid(unsafe_code)]

//! # Fermon Store
//!
//! Power-loss tolerant record log on byte-addressable NVM:
//!
//! - [`Nvm`]: the device abstraction
//! - [`LogRecord`] / [`ConfigRecord`]: fixed-size little-endian codecs
//! - [`LogStore`]: the ring of sequence-numbered records, its recovery
//!   scan and the config slot
//!
//! Every operation reports failure through [`fermon_core::FmResult`]; a
//! store that failed to initialize answers `Unavailable` and the caller
//! keeps sampling without persistence.

pub mod config;
pub mod nvm;
pub mod record;
pub mod ring;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::*;
pub use nvm::*;
pub use record::*;
pub use ring::*;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MemNvm, MemNvmError};

#[cfg(test)]
mod tests;
