//! Scheduler context shared by the sensor tasks and the monitor

use core::cell::Cell;

use embedded_hal::digital::{InputPin, OutputPin};
use fermon_coop::Task;
use fermon_kernel::{Kernel, OneShotTimer};
use fermon_sensors::{AdcChannel, Bubble, Ds18b20, Hx711Task, Mq3};

use crate::latest::Latest;

/// Kernel plus the latest readings, handed to every task each pass
pub struct Station<'k, T> {
    kernel: &'k Kernel<T>,
    latest: Cell<Latest>,
}

impl<'k, T: OneShotTimer> Station<'k, T> {
    pub const fn new(kernel: &'k Kernel<T>) -> Self {
        Self {
            kernel,
            latest: Cell::new(Latest::new()),
        }
    }

    pub fn kernel(&self) -> &'k Kernel<T> {
        self.kernel
    }

    /// Snapshot of the latest readings
    pub fn latest(&self) -> Latest {
        self.latest.get()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Latest) -> R) -> R {
        let mut latest = self.latest.get();
        let r = f(&mut latest);
        self.latest.set(latest);
        r
    }
}

/// A sensor task whose readings go into the log
pub trait Publish {
    /// Move any new reading into `latest`.
    fn publish(&mut self, latest: &mut Latest);
}

/// Runs a sensor task against the kernel, then publishes what it produced.
pub struct Publishing<S>(pub S);

impl<S> Publishing<S> {
    pub fn inner(&self) -> &S {
        &self.0
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.0
    }
}

impl<'k, T, S> Task<Station<'k, T>> for Publishing<S>
where
    T: OneShotTimer,
    S: Task<Kernel<T>> + Publish,
{
    fn poll(&mut self, station: &Station<'k, T>) {
        self.0.poll(station.kernel);
        station.update(|latest| self.0.publish(latest));
    }

    fn name(&self) -> &'static str {
        self.0.name()
    }
}

impl<P> Publish for Ds18b20<P>
where
    P: InputPin + OutputPin + Send + 'static,
{
    fn publish(&mut self, latest: &mut Latest) {
        if let Some(raw) = self.take_new() {
            latest.set_temperature(raw);
        }
    }
}

impl<CLK, DAT> Publish for Hx711Task<CLK, DAT>
where
    CLK: OutputPin + Send + 'static,
    DAT: InputPin + Send + 'static,
{
    fn publish(&mut self, latest: &mut Latest) {
        if let Some(weight) = self.take_new() {
            latest.set_weight(weight);
        }
    }
}

impl<A: AdcChannel, H: InputPin> Publish for Bubble<A, H> {
    fn publish(&mut self, latest: &mut Latest) {
        if let Some(reading) = self.take_new() {
            latest.set_bubble(reading, self.last_value(), self.threshold());
        }
    }
}

impl<A: AdcChannel> Publish for Mq3<A> {
    fn publish(&mut self, latest: &mut Latest) {
        if let Some(level) = self.take_new() {
            latest.set_ethanol(level);
        }
    }
}
