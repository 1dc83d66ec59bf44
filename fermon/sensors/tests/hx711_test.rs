//! HX711 operation and weighing task tests

use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};
use fermon_coop::Task;
use fermon_kernel::{Kernel, LockState, SimOneShot, Step, Timed};
use fermon_sensors::{Gain, Hx711, Hx711Request, Hx711Task, RETRIES, SAMPLES, SETTLING_MS};

const CPU_HZ: u32 = 80_000_000;

type Scale = Timed<Hx711<PinMock, PinMock>>;

fn kernel() -> Kernel<SimOneShot> {
    Kernel::new(SimOneShot::new(CPU_HZ))
}

fn scale(clk: &PinMock, dat: &PinMock) -> &'static Scale {
    Box::leak(Box::new(Timed::new(Hx711::new(clk.clone(), dat.clone()))))
}

fn level(high: bool) -> State {
    if high {
        State::High
    } else {
        State::Low
    }
}

fn clock_pulses(n: u8) -> Vec<Transaction> {
    (0..n)
        .flat_map(|_| [Transaction::set(State::High), Transaction::set(State::Low)])
        .collect()
}

/// Ready check followed by 24 data bits, MSB first
fn conversion(raw: u32) -> Vec<Transaction> {
    let mut t = vec![Transaction::get(State::Low)];
    t.extend((0..24).rev().map(|i| Transaction::get(level((raw >> i) & 1 != 0))));
    t
}

fn run(kernel: &Kernel<SimOneShot>, hx: &'static Scale, request: Hx711Request) {
    assert!(hx.with(|h| h.begin(request)));
    let mut guard = 0;
    while kernel.drive(hx) == Step::Pending {
        kernel.run_exact(10_000);
        guard += 1;
        assert!(guard < 10, "request never finished");
    }
}

#[test]
fn test_read_sign_extends() {
    let kernel = kernel();
    let mut clk = PinMock::new(&clock_pulses(Gain::A128.pulses()));
    let mut dat = PinMock::new(&conversion(0x80_0001));
    let hx = scale(&clk, &dat);

    run(&kernel, hx, Hx711Request::Read);
    assert_eq!(hx.with(|h| h.value()), Some(-8_388_607));
    assert_eq!(kernel.exact_state(), LockState::Free);
    clk.done();
    dat.done();
}

#[test]
fn test_gain_selects_extra_pulses() {
    let kernel = kernel();
    let mut clk = PinMock::new(&clock_pulses(Gain::A64.pulses()));
    let mut dat = PinMock::new(&conversion(0x00_1234));
    let hx = scale(&clk, &dat);

    assert_eq!(hx.with(|h| h.set_gain(Gain::A64)), Gain::A128);
    run(&kernel, hx, Hx711Request::Read);
    assert_eq!(hx.with(|h| h.value()), Some(0x1234));
    clk.done();
    dat.done();
}

#[test]
fn test_clock_high_is_short() {
    let kernel = kernel();
    let mut clk = PinMock::new(&clock_pulses(Gain::A128.pulses()));
    let mut dat = PinMock::new(&conversion(0));
    let hx = scale(&clk, &dat);

    assert!(hx.with(|h| h.begin(Hx711Request::Read)));
    kernel.drive(hx);
    assert_eq!(kernel.with_timer(|t| t.last_ticks()), Some(10 * 80));
    kernel.run_exact(1_000);
    kernel.drive(hx);
    clk.done();
    dat.done();
}

#[test]
fn test_read_gives_up_when_never_ready() {
    let kernel = kernel();
    let mut clk = PinMock::new(&[]);
    let not_ready: Vec<_> = (0..=RETRIES).map(|_| Transaction::get(State::High)).collect();
    let mut dat = PinMock::new(&not_ready);
    let hx = scale(&clk, &dat);

    assert!(hx.with(|h| h.begin(Hx711Request::Read)));
    assert_eq!(kernel.drive(hx), Step::Pending);
    assert_eq!(kernel.with_timer(|t| t.last_ticks()), Some(1_000 * 80));
    assert_eq!(kernel.run_exact(1_000), RETRIES as usize);
    assert_eq!(kernel.drive(hx), Step::Done);
    assert_eq!(hx.with(|h| h.value()), None);
    clk.done();
    dat.done();
}

#[test]
fn test_sleep_and_wake() {
    let kernel = kernel();
    let mut clk = PinMock::new(&[Transaction::set(State::Low), Transaction::set(State::High)]);
    let mut dat = PinMock::new(&[]);
    let hx = scale(&clk, &dat);
    assert!(hx.with(|h| h.is_sleeping()));

    assert!(hx.with(|h| h.begin(Hx711Request::SleepOff)));
    kernel.drive(hx);
    assert_eq!(kernel.with_timer(|t| t.last_ticks()), Some(SETTLING_MS as u64 * 80_000));
    kernel.run_exact(10);
    assert_eq!(kernel.drive(hx), Step::Done);
    assert!(!hx.with(|h| h.is_sleeping()));

    // Already awake: finishes without touching the clock
    run(&kernel, hx, Hx711Request::SleepOff);

    run(&kernel, hx, Hx711Request::SleepOn);
    assert!(hx.with(|h| h.is_sleeping()));
    clk.done();
    dat.done();
}

#[test]
fn test_task_sums_samples() {
    let kernel = kernel();

    let mut clk_expect = vec![Transaction::set(State::Low)];
    let mut dat_expect = Vec::new();
    for _ in 0..SAMPLES {
        clk_expect.extend(clock_pulses(Gain::A128.pulses()));
        // The task checks DOUT before starting the read
        dat_expect.push(Transaction::get(State::Low));
        dat_expect.extend(conversion(100));
    }
    let mut clk = PinMock::new(&clk_expect);
    let mut dat = PinMock::new(&dat_expect);
    let mut task = Hx711Task::new(scale(&clk, &dat), &kernel).with_interval(1_000);

    task.poll(&kernel);
    assert_eq!(task.take_new(), None);
    for _ in 0..1_000 {
        kernel.on_tick();
    }

    let mut weight = None;
    for _ in 0..100 {
        task.poll(&kernel);
        kernel.run_exact(10_000);
        weight = task.take_new();
        if weight.is_some() {
            break;
        }
    }
    assert_eq!(weight, Some(100 * SAMPLES as i32));
    assert!(task.is_valid());
    clk.done();
    dat.done();
}

#[test]
fn test_task_sleeps_on_long_interval() {
    let kernel = kernel();

    let mut clk_expect = vec![Transaction::set(State::Low)];
    let mut dat_expect = Vec::new();
    for _ in 0..SAMPLES {
        clk_expect.extend(clock_pulses(Gain::A128.pulses()));
        dat_expect.push(Transaction::get(State::Low));
        dat_expect.extend(conversion(0xFF_FFFF));
    }
    clk_expect.push(Transaction::set(State::High));
    let mut clk = PinMock::new(&clk_expect);
    let mut dat = PinMock::new(&dat_expect);
    let hx = scale(&clk, &dat);
    let mut task = Hx711Task::new(hx, &kernel).with_interval(20_000);

    task.poll(&kernel);
    for _ in 0..20_000 {
        kernel.on_tick();
    }
    for _ in 0..100 {
        task.poll(&kernel);
        kernel.run_exact(10_000);
        if hx.with(|h| h.is_sleeping()) && kernel.exact_state() == LockState::Free {
            break;
        }
    }
    assert_eq!(task.take_new(), Some(-(SAMPLES as i32)));
    assert!(hx.with(|h| h.is_sleeping()));
    clk.done();
    dat.done();
}
