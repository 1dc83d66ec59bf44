#![no_std]
#![forbid(unsafe_code)]

//! # Fermon Sensors
//!
//! Sensor tasks for the fermentation monitor, each a [`fermon_coop::Task`]
//! over the [`fermon_kernel::Kernel`]:
//!
//! - [`Ds18b20`]: temperature over a bit-banged [`OneWire`] bus
//! - [`Hx711Task`]: weight from an [`Hx711`] load-cell amplifier
//! - [`Bubble`]: airlock bubble integral and CO2 fill/dump count
//! - [`Mq3`]: ethanol level
//!
//! Bit-banged protocols run as timed operations and have to live in statics
//! (`&'static Timed<_>`) so the one-shot interrupt can resume them. Each
//! task publishes readings with a new-data flag consumed by `take_new`.

pub mod adc;
pub mod bubble;
pub mod ds18b20;
pub mod hx711;
pub mod mq3;
pub mod onewire;

pub use adc::*;
pub use bubble::*;
pub use ds18b20::*;
pub use hx711::*;
pub use mq3::*;
pub use onewire::*;
