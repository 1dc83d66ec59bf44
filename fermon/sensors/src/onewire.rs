//! Bit-banged one-wire bus master
//!
//! The bus pin is open-drain: `set_low` pulls the line down, `set_high`
//! releases it and the external pull-up takes it high. Every slot is a
//! sequence of exact waits, so a [`OneWire`] is a [`TimedOperation`] and
//! runs from the one-shot interrupt once started.
//!
//! Only single-drop buses are driven: every command is addressed with
//! SKIP ROM.

use embedded_hal::digital::{InputPin, OutputPin};
use fermon_core::fm_warn;
use fermon_kernel::{Step, TimedCx, TimedOperation, TimingStep, TimingTable};

/// Address the only device on the bus
pub const SKIP_ROM: u8 = 0xCC;

/// Longest read a transfer can return
pub const MAX_READ: usize = 9;

const UNBOUNDED: u32 = u32::MAX;

/// What to put on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Reset pulse and presence detect
    Reset,
    /// SKIP ROM then a function command
    Command(u8),
    /// SKIP ROM, a function command, then `len` bytes read back
    CommandRead { cmd: u8, len: u8 },
    /// One read slot
    ReadBit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Lock,
    ResetLow,
    ResetRelease,
    ResetSample,
    WriteOneLow,
    WriteOneRelease,
    WriteZeroLow,
    WriteZeroRelease,
    WriteNext,
    ReadLow,
    ReadRelease,
    ReadSample,
    ReadNext,
    Release,
    Report,
}

/// Slot timings. Each step drives the line for its `from` phase, then waits.
static TIMING: TimingTable<Phase> = TimingTable::new(&[
    TimingStep::new(Phase::ResetLow, 500, 960, Phase::ResetRelease),
    // Presence pulse starts 15-60 us after release and lasts at least 60 us
    TimingStep::new(Phase::ResetRelease, 65, 75, Phase::ResetSample),
    TimingStep::new(Phase::ResetSample, 430, UNBOUNDED, Phase::Release),
    TimingStep::new(Phase::WriteOneLow, 5, 15, Phase::WriteOneRelease),
    TimingStep::new(Phase::WriteOneRelease, 75, UNBOUNDED, Phase::WriteNext),
    TimingStep::new(Phase::WriteZeroLow, 70, 120, Phase::WriteZeroRelease),
    TimingStep::new(Phase::WriteZeroRelease, 10, UNBOUNDED, Phase::WriteNext),
    TimingStep::new(Phase::ReadLow, 3, 10, Phase::ReadRelease),
    // Sample inside 15 us of the falling edge
    TimingStep::new(Phase::ReadRelease, 10, 12, Phase::ReadSample),
    TimingStep::new(Phase::ReadSample, 53, UNBOUNDED, Phase::ReadNext),
]);

/// Check the slot timings against a one-shot timer clock.
pub fn validate_bus_timing(tick_hz: u32) -> fermon_core::FmResult<()> {
    TIMING.validate(tick_hz)
}

/// One-wire bus master on an open-drain pin
pub struct OneWire<P> {
    pin: P,
    phase: Phase,
    reset: bool,
    tx: [u8; 2],
    tx_bits: u16,
    rx_bits: u16,
    bit: u16,
    rx: [u8; MAX_READ],
    presence: bool,
    fault: bool,
}

impl<P> OneWire<P> {
    pub const fn new(pin: P) -> Self {
        Self {
            pin,
            phase: Phase::Idle,
            reset: false,
            tx: [0; 2],
            tx_bits: 0,
            rx_bits: 0,
            bit: 0,
            rx: [0; MAX_READ],
            presence: false,
            fault: false,
        }
    }

    /// Load the next transfer. False while one is still in flight.
    pub fn begin(&mut self, transfer: Transfer) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.tx_bits = 0;
        self.rx_bits = 0;
        match transfer {
            Transfer::Reset => self.presence = false,
            Transfer::Command(cmd) => {
                self.tx = [SKIP_ROM, cmd];
                self.tx_bits = 16;
            }
            Transfer::CommandRead { cmd, len } => {
                self.tx = [SKIP_ROM, cmd];
                self.tx_bits = 16;
                self.rx_bits = (len as usize).min(MAX_READ) as u16 * 8;
            }
            Transfer::ReadBit => self.rx_bits = 1,
        }
        self.reset = transfer == Transfer::Reset;
        self.bit = 0;
        self.rx = [0; MAX_READ];
        self.phase = Phase::Lock;
        true
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// A device answered the last reset
    pub fn presence(&self) -> bool {
        self.presence
    }

    /// Bytes from the last read transfer
    pub fn data(&self) -> &[u8] {
        let len = (self.rx_bits as usize).div_ceil(8);
        &self.rx[..len]
    }

    /// Level of the last [`Transfer::ReadBit`] slot
    pub fn bit(&self) -> bool {
        self.rx[0] & 1 != 0
    }

    /// True once if a pin access failed since the last call
    pub fn take_fault(&mut self) -> bool {
        core::mem::take(&mut self.fault)
    }

    pub fn pin_mut(&mut self) -> &mut P {
        &mut self.pin
    }
}

impl<P: InputPin + OutputPin> OneWire<P> {
    fn drive_low(&mut self) {
        if self.pin.set_low().is_err() {
            self.fault = true;
        }
    }

    fn release_bus(&mut self) {
        if self.pin.set_high().is_err() {
            self.fault = true;
        }
    }

    fn sample(&mut self) -> bool {
        match self.pin.is_high() {
            Ok(level) => level,
            Err(_) => {
                self.fault = true;
                true
            }
        }
    }

    fn write_phase(&self) -> Phase {
        let byte = self.tx[(self.bit / 8) as usize];
        if (byte >> (self.bit % 8)) & 1 != 0 {
            Phase::WriteOneLow
        } else {
            Phase::WriteZeroLow
        }
    }

    /// First phase after the lock is taken
    fn first_phase(&mut self) -> Phase {
        if self.reset {
            Phase::ResetLow
        } else if self.tx_bits > 0 {
            self.write_phase()
        } else if self.rx_bits > 0 {
            Phase::ReadLow
        } else {
            Phase::Release
        }
    }

    fn timed(&mut self, cx: &mut TimedCx<'_>) -> Step {
        match TIMING.lookup(self.phase) {
            Some(step) => {
                self.phase = step.to;
                cx.wait_step(step)
            }
            None => {
                self.phase = Phase::Release;
                Step::Pending
            }
        }
    }
}

impl<P: InputPin + OutputPin + Send> TimedOperation for OneWire<P> {
    fn step(&mut self, cx: &mut TimedCx<'_>) -> Step {
        loop {
            match self.phase {
                Phase::Idle => return Step::Done,
                Phase::Lock => {
                    if !cx.lock_timer() {
                        return Step::Pending;
                    }
                    self.phase = self.first_phase();
                }
                Phase::ResetLow | Phase::WriteOneLow | Phase::WriteZeroLow | Phase::ReadLow => {
                    self.drive_low();
                    return self.timed(cx);
                }
                Phase::ResetRelease
                | Phase::WriteOneRelease
                | Phase::WriteZeroRelease
                | Phase::ReadRelease => {
                    self.release_bus();
                    return self.timed(cx);
                }
                Phase::ResetSample => {
                    self.presence = !self.sample();
                    return self.timed(cx);
                }
                Phase::ReadSample => {
                    if self.sample() {
                        self.rx[(self.bit / 8) as usize] |= 1 << (self.bit % 8);
                    }
                    return self.timed(cx);
                }
                Phase::WriteNext => {
                    self.bit += 1;
                    if self.bit < self.tx_bits {
                        self.phase = self.write_phase();
                    } else if self.rx_bits > 0 {
                        self.bit = 0;
                        self.tx_bits = 0;
                        self.phase = Phase::ReadLow;
                    } else {
                        self.phase = Phase::Release;
                    }
                }
                Phase::ReadNext => {
                    self.bit += 1;
                    self.phase = if self.bit < self.rx_bits {
                        Phase::ReadLow
                    } else {
                        Phase::Release
                    };
                }
                Phase::Release => {
                    if self.fault {
                        fm_warn!("one-wire pin fault");
                    }
                    self.phase = Phase::Report;
                    if cx.release_timer() == Step::Pending {
                        return Step::Pending;
                    }
                }
                Phase::Report => {
                    self.phase = Phase::Idle;
                    return Step::Done;
                }
            }
        }
    }
}
