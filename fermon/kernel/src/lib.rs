#![no_std]
#![forbid(unsafe_code)]

//! # Fermon Kernel
//!
//! Timing primitives for a single-core, OS-less data logger:
//!
//! - [`TickSource`]: the 1 ms tick flag and overrun accounting
//! - [`CoarseTimerPool`]: seven millisecond countdowns, allocated once
//! - [`CallbackTimers`]: five fast-tick countdowns that fire a callback
//! - [`ExactWait`]: the single hardware one-shot timer behind a
//!   Free/Locked/Running lock
//! - [`Timed`]: resumable operations continued from the one-shot interrupt
//! - [`Kernel`]: all of the above behind critical-section mutexes

pub mod callbacks;
pub mod exact;
pub mod kernel;
pub mod tick;
pub mod timed;
pub mod timers;
pub mod timing;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use callbacks::*;
pub use exact::*;
pub use kernel::*;
pub use tick::*;
pub use timed::*;
pub use timers::*;
pub use timing::*;

#[cfg(any(test, feature = "sim"))]
pub use sim::SimOneShot;
