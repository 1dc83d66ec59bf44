//! Airlock bubble detector and CO2 volume counter
//!
//! An optical sensor across the airlock is sampled every 10 ms. Every sample
//! on the bubble side of the threshold adds one to the bubble integral. In
//! auto-level mode the threshold sits halfway between the largest and
//! smallest values seen, and those limits are slowly pulled together so the
//! threshold follows drift.
//!
//! A hall sensor on a fill-and-dump volumetric counter shares the task; each
//! change of its level counts one fill or one dump.

use embedded_hal::digital::InputPin;
use fermon_coop::Task;
use fermon_core::fm_warn;
use fermon_kernel::{Kernel, OneShotTimer, TimerHandle};
use fermon_store::{Threshold, THRESHOLD_SHIFT};

use crate::adc::{AdcChannel, ADC_MAX};

/// Sampling period
pub const BUBBLE_INTERVAL_MS: u32 = 10;

/// Samples between pulls of the auto-level limits
pub const AUTOLEVEL_CYCLES: u16 = 200;

/// Gap kept between the auto-level limits
pub const LEVEL_MARGIN: u16 = 200;

/// Threshold before any configuration is applied
pub const INITIAL_LEVEL: u16 = 820;

/// Snapshot handed to the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BubbleReading {
    pub integral: u32,
    pub co2: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BubbleState {
    Convert,
    Waiting,
}

/// Bubble sampling task on an ADC channel plus the hall sensor input
pub struct Bubble<A, H> {
    adc: A,
    hall: H,
    timer: Option<TimerHandle>,
    state: BubbleState,
    level: u16,
    auto: bool,
    invert: bool,
    max: u16,
    min: u16,
    level_timer: u16,
    value: u16,
    detected: bool,
    integral: u32,
    co2: u16,
    co2_level: bool,
    valid: bool,
    new: bool,
    faults: u32,
}

impl<A: AdcChannel, H: InputPin> Bubble<A, H> {
    pub fn new<T: OneShotTimer>(adc: A, hall: H, kernel: &Kernel<T>) -> Self {
        let timer = kernel.acquire_timer().ok();
        if timer.is_none() {
            fm_warn!("bubble: no free timer, sampling every pass");
        }
        Self {
            adc,
            hall,
            timer,
            state: BubbleState::Convert,
            level: INITIAL_LEVEL,
            auto: true,
            invert: false,
            max: ADC_MAX,
            min: 0,
            level_timer: AUTOLEVEL_CYCLES,
            value: 0,
            detected: false,
            integral: 0,
            co2: 0,
            co2_level: false,
            valid: false,
            new: false,
            faults: 0,
        }
    }

    /// Set the threshold from a stored byte.
    ///
    /// 0 turns auto-level on and re-centers the limits around the current
    /// threshold; any other value fixes the threshold at `threshold << 5`.
    pub fn set_threshold(&mut self, threshold: u8) {
        if threshold == 0 {
            self.auto = true;
            self.max = if self.level < ADC_MAX - LEVEL_MARGIN {
                self.level + LEVEL_MARGIN
            } else {
                ADC_MAX
            };
            self.min = self.level.saturating_sub(LEVEL_MARGIN);
        } else {
            self.auto = false;
            self.level = (threshold as u16) << THRESHOLD_SHIFT;
        }
    }

    /// Apply a configured threshold.
    pub fn apply(&mut self, threshold: Threshold) {
        match threshold {
            Threshold::Auto { around } => {
                if let Some(level) = around {
                    self.level = level.min(ADC_MAX);
                }
                self.set_threshold(0);
            }
            Threshold::Level(level) => {
                self.auto = false;
                self.level = level;
            }
        }
    }

    /// Bubbles read above the threshold instead of below.
    pub fn set_invert(&mut self, invert: bool) {
        self.invert = invert;
    }

    pub fn threshold(&self) -> u16 {
        self.level
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }

    /// Auto-level `(min, max)`
    pub fn limits(&self) -> (u16, u16) {
        (self.min, self.max)
    }

    pub fn last_value(&self) -> u16 {
        self.value
    }

    /// The last sample was a bubble
    pub fn bubble_detected(&self) -> bool {
        self.detected
    }

    pub fn integral(&self) -> u32 {
        self.integral
    }

    pub fn co2(&self) -> u16 {
        self.co2
    }

    /// Current hall sensor level
    pub fn co2_sensor(&self) -> bool {
        self.co2_level
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// ADC read failures
    pub fn faults(&self) -> u32 {
        self.faults
    }

    pub fn take_new(&mut self) -> Option<BubbleReading> {
        if core::mem::take(&mut self.new) {
            Some(BubbleReading {
                integral: self.integral,
                co2: self.co2,
            })
        } else {
            None
        }
    }

    fn process(&mut self, value: u16) {
        self.value = value;
        self.detected = if self.invert {
            value >= self.level
        } else {
            value <= self.level
        };
        if self.detected {
            self.integral = self.integral.wrapping_add(1);
        }

        self.max = self.max.max(value);
        self.min = self.min.min(value);
        if self.auto {
            self.level = self.max / 2 + self.min / 2;
        }

        if self.level_timer == 0 {
            self.level_timer = AUTOLEVEL_CYCLES;
            // The limit on the bubble side moves three times as fast
            let (max_steps, min_steps) = if self.invert { (1, 3) } else { (3, 1) };
            for _ in 0..max_steps {
                if self.max > self.min.saturating_add(LEVEL_MARGIN) {
                    self.max -= 1;
                }
            }
            for _ in 0..min_steps {
                if self.min < self.max.saturating_sub(LEVEL_MARGIN) {
                    self.min += 1;
                }
            }
        } else {
            self.level_timer -= 1;
        }

        match self.hall.is_high() {
            Ok(level) if level != self.co2_level => {
                self.co2 = self.co2.wrapping_add(1);
                self.co2_level = level;
            }
            Ok(_) => {}
            Err(_) => self.faults += 1,
        }

        self.valid = true;
        self.new = true;
    }
}

impl<A, H, T> Task<Kernel<T>> for Bubble<A, H>
where
    A: AdcChannel,
    H: InputPin,
    T: OneShotTimer,
{
    fn poll(&mut self, kernel: &Kernel<T>) {
        loop {
            match self.state {
                BubbleState::Convert => {
                    match self.adc.read() {
                        Ok(value) => self.process(value),
                        Err(nb::Error::WouldBlock) => return,
                        Err(nb::Error::Other(_)) => {
                            self.valid = false;
                            self.faults += 1;
                        }
                    }
                    match self.timer {
                        Some(t) => {
                            if kernel.set_timer(t, BUBBLE_INTERVAL_MS).is_err() {
                                fm_warn!("bubble: timer rejected");
                            }
                            self.state = BubbleState::Waiting;
                        }
                        None => return,
                    }
                }
                BubbleState::Waiting => match self.timer {
                    Some(t) if !kernel.timer_elapsed(t) => return,
                    _ => self.state = BubbleState::Convert,
                },
            }
        }
    }

    fn name(&self) -> &'static str {
        "bubble"
    }
}
