#![no_std]
#![forbid(unsafe_code)]

//! # Fermon Monitor
//!
//! Main-loop composition of the fermentation monitor. Sensor tasks are
//! wrapped in [`Publishing`] so their readings land in the [`Station`]'s
//! [`Latest`] record; the [`Monitor`] runs last in every pass and appends
//! that record to the log whenever the store interval runs out.
//!
//! ```ignore
//! static KERNEL: Kernel<Timer1> = Kernel::new(Timer1::new());
//!
//! let mut monitor = Monitor::boot(eeprom, &mut delay, &KERNEL);
//! let mut bubble = Bubble::new(adc2, hall, &KERNEL);
//! monitor.configure_bubble(&mut bubble);
//!
//! let mut bubble = Publishing(bubble);
//! let mut scale = Publishing(Hx711Task::new(SCALE.init(..), &KERNEL));
//! let mut ethanol = Publishing(Mq3::new(adc0, &KERNEL));
//! let mut thermo = Publishing(Ds18b20::new(BUS.init(..), &KERNEL));
//!
//! let station = Station::new(&KERNEL);
//! let mut sched: Scheduler<Station<'_, Timer1>> = Scheduler::new();
//! sched.register(&mut bubble)?;
//! sched.register(&mut scale)?;
//! sched.register(&mut ethanol)?;
//! sched.register(&mut thermo)?;
//! sched.register(&mut monitor)?;
//! sched.run(&station, |_| {});
//! ```

pub mod latest;
pub mod monitor;
pub mod station;

pub use latest::*;
pub use monitor::*;
pub use station::*;
