//! DS18B20 thermometer task
//!
//! Cycle: reset, CONVERT T, poll the bus until the conversion reports done,
//! reset, READ SCRATCHPAD, reset. A reading is published only when the
//! scratchpad CRC matches. The cycle repeats every [`DS_INTERVAL_MS`].

use crc::{Crc, CRC_8_MAXIM_DOW};
use embedded_hal::digital::{InputPin, OutputPin};
use fermon_coop::Task;
use fermon_core::{fm_debug, fm_warn};
use fermon_kernel::{Kernel, OneShotTimer, Step, Timed, TimerHandle};

use crate::onewire::{OneWire, Transfer};

/// Start a temperature conversion
pub const CONVERT_T: u8 = 0x44;

/// Read the 9-byte scratchpad
pub const READ_SCRATCHPAD: u8 = 0xBE;

pub const SCRATCHPAD_LEN: usize = 9;

/// Conversion-done polls before giving up on a cycle
pub const CONVERSION_POLLS: u8 = 100;

/// Time between conversions
pub const DS_INTERVAL_MS: u32 = 20_000;

/// Dallas/Maxim CRC-8 (x^8 + x^5 + x^4 + 1, reflected)
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

/// Scratchpad checksum; a block followed by its own CRC sums to zero.
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DsState {
    Start,
    Reset,
    Convert,
    Poll,
    ResetBeforeRead,
    ReadScratchpad,
    ResetAfterRead,
    Publish,
    Sleep,
    Waiting,
}

/// Temperature task on a dedicated one-wire bus
pub struct Ds18b20<P: 'static> {
    bus: &'static Timed<OneWire<P>>,
    timer: Option<TimerHandle>,
    interval: u32,
    state: DsState,
    issued: bool,
    polls: u8,
    scratchpad: [u8; SCRATCHPAD_LEN],
    raw: u16,
    valid: bool,
    new: bool,
    crc_errors: u32,
    timeouts: u32,
}

impl<P> Ds18b20<P>
where
    P: InputPin + OutputPin + Send + 'static,
{
    /// Without a free coarse timer the task converts back to back.
    pub fn new<T: OneShotTimer>(bus: &'static Timed<OneWire<P>>, kernel: &Kernel<T>) -> Self {
        let timer = kernel.acquire_timer().ok();
        if timer.is_none() {
            fm_warn!("ds18b20: no free timer, running unpaced");
        }
        Self {
            bus,
            timer,
            interval: DS_INTERVAL_MS,
            state: DsState::Start,
            issued: false,
            polls: 0,
            scratchpad: [0; SCRATCHPAD_LEN],
            raw: 0,
            valid: false,
            new: false,
            crc_errors: 0,
            timeouts: 0,
        }
    }

    pub fn with_interval(mut self, ms: u32) -> Self {
        self.interval = ms;
        self
    }

    /// Raw reading of the last good conversion, 1/16 °C per LSB
    pub fn last(&self) -> u16 {
        self.raw
    }

    /// The current cycle produced a reading
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Reading not yet handed out, clearing the new-data flag.
    pub fn take_new(&mut self) -> Option<u16> {
        if core::mem::take(&mut self.new) {
            Some(self.raw)
        } else {
            None
        }
    }

    pub fn crc_errors(&self) -> u32 {
        self.crc_errors
    }

    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    /// Start or continue one bus transfer. True once it has finished.
    fn transfer<T: OneShotTimer>(&mut self, kernel: &Kernel<T>, transfer: Transfer) -> bool {
        if !self.issued {
            if !self.bus.with(|bus| bus.begin(transfer)) {
                return false;
            }
            self.issued = true;
        }
        match kernel.drive(self.bus) {
            Step::Done => {
                self.issued = false;
                true
            }
            Step::Pending => false,
        }
    }
}

impl<P, T> Task<Kernel<T>> for Ds18b20<P>
where
    P: InputPin + OutputPin + Send + 'static,
    T: OneShotTimer,
{
    fn poll(&mut self, kernel: &Kernel<T>) {
        loop {
            match self.state {
                DsState::Start => {
                    self.valid = false;
                    self.state = DsState::Reset;
                }
                DsState::Reset => {
                    if !self.transfer(kernel, Transfer::Reset) {
                        return;
                    }
                    self.state = if self.bus.with(|bus| bus.presence()) {
                        DsState::Convert
                    } else {
                        fm_debug!("ds18b20: no device");
                        DsState::Sleep
                    };
                }
                DsState::Convert => {
                    if !self.transfer(kernel, Transfer::Command(CONVERT_T)) {
                        return;
                    }
                    self.polls = CONVERSION_POLLS;
                    self.state = DsState::Poll;
                }
                DsState::Poll => {
                    if !self.transfer(kernel, Transfer::ReadBit) {
                        return;
                    }
                    // The device holds the line low while converting
                    if self.bus.with(|bus| bus.bit()) {
                        self.state = DsState::ResetBeforeRead;
                    } else {
                        self.polls -= 1;
                        if self.polls == 0 {
                            fm_warn!("ds18b20: conversion timed out");
                            self.timeouts += 1;
                            self.state = DsState::Sleep;
                        }
                    }
                }
                DsState::ResetBeforeRead => {
                    if !self.transfer(kernel, Transfer::Reset) {
                        return;
                    }
                    self.state = DsState::ReadScratchpad;
                }
                DsState::ReadScratchpad => {
                    let read = Transfer::CommandRead {
                        cmd: READ_SCRATCHPAD,
                        len: SCRATCHPAD_LEN as u8,
                    };
                    if !self.transfer(kernel, read) {
                        return;
                    }
                    let scratchpad = &mut self.scratchpad;
                    self.bus.with(|bus| scratchpad.copy_from_slice(bus.data()));
                    self.state = DsState::ResetAfterRead;
                }
                DsState::ResetAfterRead => {
                    if !self.transfer(kernel, Transfer::Reset) {
                        return;
                    }
                    self.state = DsState::Publish;
                }
                DsState::Publish => {
                    let pad = &self.scratchpad;
                    if crc8(&pad[..SCRATCHPAD_LEN - 1]) == pad[SCRATCHPAD_LEN - 1] {
                        self.raw = u16::from_le_bytes([pad[0], pad[1]]);
                        self.valid = true;
                        self.new = true;
                        fm_debug!("ds18b20: raw {=u16:#x}", self.raw);
                    } else {
                        fm_warn!("ds18b20: scratchpad crc mismatch");
                        self.crc_errors += 1;
                    }
                    self.state = DsState::Sleep;
                }
                DsState::Sleep => match self.timer {
                    Some(t) => {
                        if kernel.set_timer(t, self.interval).is_err() {
                            fm_warn!("ds18b20: timer rejected");
                        }
                        self.state = DsState::Waiting;
                    }
                    None => {
                        self.state = DsState::Start;
                        return;
                    }
                },
                DsState::Waiting => match self.timer {
                    Some(t) if !kernel.timer_elapsed(t) => return,
                    _ => self.state = DsState::Start,
                },
            }
        }
    }

    fn name(&self) -> &'static str {
        "ds18b20"
    }
}
