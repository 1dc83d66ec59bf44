//! MQ-3 ethanol sensor task

use fermon_coop::Task;
use fermon_core::{fm_debug, fm_warn};
use fermon_kernel::{Kernel, OneShotTimer, TimerHandle};

use crate::adc::AdcChannel;

/// Time between readings
pub const MQ3_INTERVAL_MS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mq3State {
    Start,
    Waiting,
    Convert,
}

/// Samples the ethanol sensor once per interval, after waiting it out.
pub struct Mq3<A> {
    adc: A,
    timer: Option<TimerHandle>,
    interval: u32,
    state: Mq3State,
    value: u16,
    valid: bool,
    new: bool,
    faults: u32,
}

impl<A: AdcChannel> Mq3<A> {
    pub fn new<T: OneShotTimer>(adc: A, kernel: &Kernel<T>) -> Self {
        let timer = kernel.acquire_timer().ok();
        if timer.is_none() {
            fm_warn!("mq3: no free timer, sampling every pass");
        }
        Self {
            adc,
            timer,
            interval: MQ3_INTERVAL_MS,
            state: Mq3State::Start,
            value: 0,
            valid: false,
            new: false,
            faults: 0,
        }
    }

    pub fn with_interval(mut self, ms: u32) -> Self {
        self.interval = ms;
        self
    }

    pub fn last(&self) -> u16 {
        self.value
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn faults(&self) -> u32 {
        self.faults
    }

    pub fn take_new(&mut self) -> Option<u16> {
        if core::mem::take(&mut self.new) {
            Some(self.value)
        } else {
            None
        }
    }
}

impl<A, T> Task<Kernel<T>> for Mq3<A>
where
    A: AdcChannel,
    T: OneShotTimer,
{
    fn poll(&mut self, kernel: &Kernel<T>) {
        loop {
            match self.state {
                Mq3State::Start => {
                    self.state = Mq3State::Convert;
                    if let Some(t) = self.timer {
                        if kernel.set_timer(t, self.interval).is_err() {
                            fm_warn!("mq3: timer rejected");
                        }
                        self.state = Mq3State::Waiting;
                    }
                }
                Mq3State::Waiting => match self.timer {
                    Some(t) if !kernel.timer_elapsed(t) => return,
                    _ => self.state = Mq3State::Convert,
                },
                Mq3State::Convert => {
                    match self.adc.read() {
                        Ok(value) => {
                            self.value = value;
                            self.valid = true;
                            self.new = true;
                            fm_debug!("mq3: {}", value);
                        }
                        Err(nb::Error::WouldBlock) => return,
                        Err(nb::Error::Other(_)) => self.faults += 1,
                    }
                    self.state = Mq3State::Start;
                    if self.timer.is_none() {
                        return;
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "mq3"
    }
}
