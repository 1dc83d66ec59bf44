//! HX711 load-cell amplifier
//!
//! Serial protocol: DOUT goes low when a conversion is ready. Each PD_SCK
//! pulse shifts out one bit, MSB first; 24 data pulses are followed by one
//! to three more that select the gain for the next conversion. Holding
//! PD_SCK high for 60 us or longer powers the chip down; taking it low
//! again wakes it, and the first conversion settles after 400 ms.

use embedded_hal::digital::{InputPin, OutputPin};
use fermon_coop::Task;
use fermon_core::{fm_debug, fm_warn};
use fermon_kernel::{
    Kernel, OneShotTimer, Step, Timed, TimedCx, TimedOperation, TimerHandle, TimingStep,
    TimingTable,
};

/// PD_SCK high and low time
pub const CLOCK_US: u32 = 10;

/// PD_SCK high time that enters power-down
pub const SLEEP_US: u32 = 60;

/// Poll period while DOUT is not ready
pub const WAIT_US: u32 = 1_000;

/// Ready polls before a read gives up
pub const RETRIES: u8 = 100;

/// Output settling after wake-up
pub const SETTLING_MS: u32 = 400;

/// Time between weighings
pub const HX711_INTERVAL_MS: u32 = 60_000;

/// Intervals longer than this power the chip down in between
pub const SLEEP_THRESHOLD_MS: u32 = 10_000;

/// Conversions summed per weighing
pub const SAMPLES: u8 = 16;

const DATA_BITS: u8 = 24;

const UNBOUNDED: u32 = u32::MAX;

/// Input channel and gain of the next conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    /// Channel A, gain 128
    #[default]
    A128,
    /// Channel B, gain 32
    B32,
    /// Channel A, gain 64
    A64,
}

impl Gain {
    /// Total PD_SCK pulses per read
    pub const fn pulses(self) -> u8 {
        match self {
            Gain::A128 => 25,
            Gain::B32 => 26,
            Gain::A64 => 27,
        }
    }
}

/// Work for the next run of the [`Hx711`] operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hx711Request {
    /// Wait for DOUT, clock out one conversion
    Read,
    /// Enter power-down
    SleepOn,
    /// Leave power-down and wait out settling; no-op when awake
    SleepOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Lock,
    WaitReady,
    ClockHigh,
    ClockLow,
    NextPulse,
    SleepHigh,
    Asleep,
    WakeLow,
    Awake,
    Release,
    Report,
}

static TIMING: TimingTable<Phase> = TimingTable::new(&[
    TimingStep::new(Phase::WaitReady, WAIT_US, UNBOUNDED, Phase::WaitReady),
    // Past 60 us high the chip powers down mid-read
    TimingStep::new(Phase::ClockHigh, CLOCK_US, 50, Phase::ClockLow),
    TimingStep::new(Phase::ClockLow, CLOCK_US, UNBOUNDED, Phase::NextPulse),
    TimingStep::new(Phase::SleepHigh, SLEEP_US, UNBOUNDED, Phase::Asleep),
    TimingStep::new(Phase::WakeLow, SETTLING_MS * 1000, UNBOUNDED, Phase::Awake),
]);

/// Check the clock timings against a one-shot timer clock.
pub fn validate_clock_timing(tick_hz: u32) -> fermon_core::FmResult<()> {
    TIMING.validate(tick_hz)
}

/// Sign-extend a 24-bit two's complement sample.
pub const fn sign_extend(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}

/// HX711 driver as a timed operation on PD_SCK (`clk`) and DOUT (`dat`)
pub struct Hx711<CLK, DAT> {
    clk: CLK,
    dat: DAT,
    phase: Phase,
    request: Hx711Request,
    gain: Gain,
    retries: u8,
    pulse: u8,
    raw: u32,
    value: i32,
    valid: bool,
    sleeping: bool,
    fault: bool,
}

impl<CLK, DAT> Hx711<CLK, DAT> {
    /// The chip is assumed powered down until the first
    /// [`Hx711Request::SleepOff`].
    pub const fn new(clk: CLK, dat: DAT) -> Self {
        Self {
            clk,
            dat,
            phase: Phase::Idle,
            request: Hx711Request::Read,
            gain: Gain::A128,
            retries: 0,
            pulse: 0,
            raw: 0,
            value: 0,
            valid: false,
            sleeping: true,
            fault: false,
        }
    }

    /// Load the next request. False while one is still in flight.
    pub fn begin(&mut self, request: Hx711Request) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.phase = match request {
            Hx711Request::Read => {
                self.valid = false;
                self.retries = RETRIES;
                Phase::Lock
            }
            Hx711Request::SleepOn => Phase::Lock,
            Hx711Request::SleepOff if !self.sleeping => Phase::Report,
            Hx711Request::SleepOff => Phase::Lock,
        };
        self.request = request;
        true
    }

    /// Select the channel for the conversion after the next read.
    ///
    /// Returns the previous setting.
    pub fn set_gain(&mut self, gain: Gain) -> Gain {
        core::mem::replace(&mut self.gain, gain)
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }

    /// Result of the last read, if it completed
    pub fn value(&self) -> Option<i32> {
        self.valid.then_some(self.value)
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// True once if a pin access failed since the last call
    pub fn take_fault(&mut self) -> bool {
        core::mem::take(&mut self.fault)
    }

    pub fn pins_mut(&mut self) -> (&mut CLK, &mut DAT) {
        (&mut self.clk, &mut self.dat)
    }
}

impl<CLK: OutputPin, DAT: InputPin> Hx711<CLK, DAT> {
    /// DOUT low: a conversion is waiting to be clocked out.
    pub fn data_ready(&mut self) -> bool {
        match self.dat.is_low() {
            Ok(ready) => ready,
            Err(_) => {
                self.fault = true;
                false
            }
        }
    }

    fn clock(&mut self, high: bool) {
        let r = if high { self.clk.set_high() } else { self.clk.set_low() };
        if r.is_err() {
            self.fault = true;
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

impl<CLK, DAT> TimedOperation for Hx711<CLK, DAT>
where
    CLK: OutputPin + Send,
    DAT: InputPin + Send,
{
    fn step(&mut self, cx: &mut TimedCx<'_>) -> Step {
        loop {
            match self.phase {
                Phase::Idle => return Step::Done,
                Phase::Lock => {
                    if !cx.lock_timer() {
                        return Step::Pending;
                    }
                    self.phase = match self.request {
                        Hx711Request::Read => Phase::WaitReady,
                        Hx711Request::SleepOn => Phase::SleepHigh,
                        Hx711Request::SleepOff => Phase::WakeLow,
                    };
                }
                Phase::WaitReady => {
                    if self.data_ready() {
                        self.raw = 0;
                        self.pulse = 0;
                        self.phase = Phase::ClockHigh;
                    } else if self.retries == 0 {
                        fm_warn!("hx711: no conversion ready");
                        self.phase = Phase::Release;
                    } else {
                        self.retries -= 1;
                        return self.timed(cx);
                    }
                }
                Phase::ClockHigh => {
                    self.clock(true);
                    return self.timed(cx);
                }
                Phase::ClockLow => {
                    // Gain-select pulses carry no data
                    if self.pulse < DATA_BITS {
                        let bit = match self.dat.is_high() {
                            Ok(b) => b,
                            Err(_) => {
                                self.fault = true;
                                false
                            }
                        };
                        self.raw = (self.raw << 1) | bit as u32;
                    }
                    self.clock(false);
                    return self.timed(cx);
                }
                Phase::NextPulse => {
                    self.pulse += 1;
                    if self.pulse < self.gain.pulses() {
                        self.phase = Phase::ClockHigh;
                    } else {
                        self.value = sign_extend(self.raw);
                        self.valid = true;
                        self.phase = Phase::Release;
                    }
                }
                Phase::SleepHigh => {
                    self.clock(true);
                    return self.timed(cx);
                }
                Phase::Asleep => {
                    self.sleeping = true;
                    self.phase = Phase::Release;
                }
                Phase::WakeLow => {
                    self.clock(false);
                    return self.timed(cx);
                }
                Phase::Awake => {
                    self.sleeping = false;
                    self.phase = Phase::Release;
                }
                Phase::Release => {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScaleState {
    Start,
    Waiting,
    Wake,
    WaitReady,
    Read,
    Publish,
    Sleep,
}

/// Weighing task: every interval, wake the HX711, sum [`SAMPLES`]
/// conversions, and power it down again when the interval is long.
pub struct Hx711Task<CLK: 'static, DAT: 'static> {
    hx: &'static Timed<Hx711<CLK, DAT>>,
    timer: Option<TimerHandle>,
    interval: u32,
    state: ScaleState,
    issued: bool,
    samples: u8,
    good: u8,
    sum: i32,
    weight: i32,
    valid: bool,
    new: bool,
}

impl<CLK, DAT> Hx711Task<CLK, DAT>
where
    CLK: OutputPin + Send + 'static,
    DAT: InputPin + Send + 'static,
{
    pub fn new<T: OneShotTimer>(hx: &'static Timed<Hx711<CLK, DAT>>, kernel: &Kernel<T>) -> Self {
        let timer = kernel.acquire_timer().ok();
        if timer.is_none() {
            fm_warn!("hx711: no free timer, running unpaced");
        }
        Self {
            hx,
            timer,
            interval: HX711_INTERVAL_MS,
            state: ScaleState::Start,
            issued: false,
            samples: 0,
            good: 0,
            sum: 0,
            weight: 0,
            valid: false,
            new: false,
        }
    }

    pub fn with_interval(mut self, ms: u32) -> Self {
        self.interval = ms;
        self
    }

    /// Sum of the last weighing's conversions
    pub fn last(&self) -> i32 {
        self.weight
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn take_new(&mut self) -> Option<i32> {
        if core::mem::take(&mut self.new) {
            Some(self.weight)
        } else {
            None
        }
    }

    fn request<T: OneShotTimer>(&mut self, kernel: &Kernel<T>, request: Hx711Request) -> bool {
        if !self.issued {
            if !self.hx.with(|hx| hx.begin(request)) {
                return false;
            }
            self.issued = true;
        }
        match kernel.drive(self.hx) {
            Step::Done => {
                self.issued = false;
                true
            }
            Step::Pending => false,
        }
    }
}

impl<CLK, DAT, T> Task<Kernel<T>> for Hx711Task<CLK, DAT>
where
    CLK: OutputPin + Send + 'static,
    DAT: InputPin + Send + 'static,
    T: OneShotTimer,
{
    fn poll(&mut self, kernel: &Kernel<T>) {
        loop {
            match self.state {
                ScaleState::Start => {
                    self.state = ScaleState::Wake;
                    if let Some(t) = self.timer {
                        if kernel.set_timer(t, self.interval).is_err() {
                            fm_warn!("hx711: timer rejected");
                        }
                        self.state = ScaleState::Waiting;
                    }
                }
                ScaleState::Waiting => match self.timer {
                    Some(t) if !kernel.timer_elapsed(t) => return,
                    _ => self.state = ScaleState::Wake,
                },
                ScaleState::Wake => {
                    if !self.request(kernel, Hx711Request::SleepOff) {
                        return;
                    }
                    self.valid = false;
                    self.samples = SAMPLES;
                    self.good = 0;
                    self.sum = 0;
                    self.state = ScaleState::WaitReady;
                }
                ScaleState::WaitReady => {
                    if !self.hx.with(|hx| hx.data_ready()) {
                        return;
                    }
                    self.state = ScaleState::Read;
                }
                ScaleState::Read => {
                    if !self.request(kernel, Hx711Request::Read) {
                        return;
                    }
                    if let Some(v) = self.hx.with(|hx| hx.value()) {
                        self.sum = self.sum.wrapping_add(v);
                        self.good += 1;
                    }
                    self.samples -= 1;
                    self.state = if self.samples == 0 {
                        ScaleState::Publish
                    } else {
                        ScaleState::WaitReady
                    };
                    // One conversion per pass
                    return;
                }
                ScaleState::Publish => {
                    if self.good > 0 {
                        self.weight = self.sum;
                        self.valid = true;
                        self.new = true;
                        fm_debug!("hx711: weight {} from {} samples", self.weight, self.good);
                    }
                    self.state = ScaleState::Sleep;
                }
                ScaleState::Sleep => {
                    if self.interval > SLEEP_THRESHOLD_MS
                        && !self.request(kernel, Hx711Request::SleepOn)
                    {
                        return;
                    }
                    self.state = ScaleState::Start;
                    if self.timer.is_none() {
                        return;
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "hx711"
    }
}
