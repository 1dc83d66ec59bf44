//! One-wire bus and DS18B20 task tests

use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};
use fermon_coop::Task;
use fermon_core::FmError;
use fermon_kernel::{Kernel, LockState, SimOneShot, Step, Timed};
use fermon_sensors::{
    crc8, validate_bus_timing, Ds18b20, OneWire, Transfer, CONVERSION_POLLS, CONVERT_T,
    DS_INTERVAL_MS, READ_SCRATCHPAD, SKIP_ROM,
};

const CPU_HZ: u32 = 80_000_000;

type Bus = Timed<OneWire<PinMock>>;

fn kernel() -> Kernel<SimOneShot> {
    Kernel::new(SimOneShot::new(CPU_HZ))
}

fn bus(pin: &PinMock) -> &'static Bus {
    Box::leak(Box::new(Timed::new(OneWire::new(pin.clone()))))
}

fn reset(present: bool) -> Vec<Transaction> {
    let answer = if present { State::Low } else { State::High };
    vec![
        Transaction::set(State::Low),
        Transaction::set(State::High),
        Transaction::get(answer),
    ]
}

fn write_byte(_byte: u8) -> Vec<Transaction> {
    // Bit values only change slot timing, not the pin sequence
    (0..8)
        .flat_map(|_| [Transaction::set(State::Low), Transaction::set(State::High)])
        .collect()
}

fn read_bit(high: bool) -> Vec<Transaction> {
    let level = if high { State::High } else { State::Low };
    vec![
        Transaction::set(State::Low),
        Transaction::set(State::High),
        Transaction::get(level),
    ]
}

fn read_bytes(bytes: &[u8]) -> Vec<Transaction> {
    bytes
        .iter()
        .flat_map(|&b| (0..8).flat_map(move |i| read_bit((b >> i) & 1 != 0)))
        .collect()
}

fn scratchpad() -> [u8; 9] {
    let mut pad = [0x91, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x0F, 0x10, 0];
    pad[8] = crc8(&pad[..8]);
    pad
}

/// Run one transfer to completion from the thread side.
fn run(kernel: &Kernel<SimOneShot>, bus: &'static Bus, transfer: Transfer) {
    assert!(bus.with(|b| b.begin(transfer)));
    let mut guard = 0;
    while kernel.drive(bus) == Step::Pending {
        kernel.run_exact(10_000);
        guard += 1;
        assert!(guard < 10, "transfer never finished");
    }
}

fn cycle(pad: &[u8; 9], converted: bool) -> Vec<Transaction> {
    let mut t = reset(true);
    t.extend(write_byte(SKIP_ROM));
    t.extend(write_byte(CONVERT_T));
    t.extend(read_bit(converted));
    t.extend(reset(true));
    t.extend(write_byte(SKIP_ROM));
    t.extend(write_byte(READ_SCRATCHPAD));
    t.extend(read_bytes(pad));
    t.extend(reset(true));
    t
}

fn poll_until_new(ds: &mut Ds18b20<PinMock>, kernel: &Kernel<SimOneShot>, passes: usize) -> Option<u16> {
    for _ in 0..passes {
        ds.poll(kernel);
        kernel.run_exact(100_000);
        if let Some(t) = ds.take_new() {
            return Some(t);
        }
    }
    None
}

#[test]
fn test_reset_detects_presence() {
    let kernel = kernel();
    let mut pin = PinMock::new(&reset(true));
    let bus = bus(&pin);

    assert!(bus.with(|b| b.begin(Transfer::Reset)));
    assert_eq!(kernel.drive(bus), Step::Pending);
    assert_eq!(kernel.with_timer(|t| t.last_ticks()), Some(500 * 80));
    assert_eq!(kernel.exact_state(), LockState::Running);

    // Release, sample, recovery
    assert_eq!(kernel.run_exact(10), 3);
    assert_eq!(kernel.drive(bus), Step::Done);
    assert!(bus.with(|b| b.presence()));
    assert_eq!(kernel.exact_state(), LockState::Free);
    pin.done();
}

#[test]
fn test_reset_without_device() {
    let kernel = kernel();
    let mut pin = PinMock::new(&reset(false));
    let bus = bus(&pin);
    run(&kernel, bus, Transfer::Reset);
    assert!(!bus.with(|b| b.presence()));
    pin.done();
}

#[test]
fn test_command_slot_timing() {
    let kernel = kernel();
    let mut expected = write_byte(SKIP_ROM);
    expected.extend(write_byte(CONVERT_T));
    let mut pin = PinMock::new(&expected);
    let bus = bus(&pin);

    assert!(bus.with(|b| b.begin(Transfer::Command(CONVERT_T))));
    kernel.drive(bus);
    // 0xCC goes out LSB first: bit 0 is a zero, a 70 us low slot
    assert_eq!(kernel.with_timer(|t| t.last_ticks()), Some(70 * 80));
    kernel.on_exact_interrupt();
    assert_eq!(kernel.with_timer(|t| t.last_ticks()), Some(10 * 80));
    kernel.on_exact_interrupt();
    kernel.on_exact_interrupt();
    kernel.on_exact_interrupt();
    // Bit 2 of 0xCC is a one, a 5 us low slot
    assert_eq!(kernel.with_timer(|t| t.last_ticks()), Some(5 * 80));

    kernel.run_exact(1_000);
    assert_eq!(kernel.drive(bus), Step::Done);
    assert!(bus.with(|b| b.data().is_empty()));
    pin.done();
}

#[test]
fn test_command_read_collects_bytes() {
    let kernel = kernel();
    let mut expected = write_byte(SKIP_ROM);
    expected.extend(write_byte(READ_SCRATCHPAD));
    expected.extend(read_bytes(&[0xA5, 0x3C]));
    let mut pin = PinMock::new(&expected);
    let bus = bus(&pin);

    run(
        &kernel,
        bus,
        Transfer::CommandRead {
            cmd: READ_SCRATCHPAD,
            len: 2,
        },
    );
    assert_eq!(bus.with(|b| b.data().to_vec()), vec![0xA5, 0x3C]);
    assert!(!bus.with(|b| b.take_fault()));
    pin.done();
}

#[test]
fn test_begin_rejected_while_busy() {
    let kernel = kernel();
    let mut pin = PinMock::new(&reset(true));
    let bus = bus(&pin);
    assert!(bus.with(|b| b.begin(Transfer::Reset)));
    assert!(!bus.with(|b| b.begin(Transfer::ReadBit)));
    kernel.drive(bus);
    kernel.run_exact(10);
    kernel.drive(bus);
    assert!(bus.with(|b| b.is_idle()));
    pin.done();
}

#[test]
fn test_bus_timing_validation() {
    assert_eq!(validate_bus_timing(CPU_HZ), Ok(()));
    assert_eq!(validate_bus_timing(100_000), Ok(()));
    // 3 us rounds up to 20 us, past the read slot's 10 us bound
    assert_eq!(validate_bus_timing(50_000), Err(FmError::InvalidArgument));
}

#[test]
fn test_ds18b20_full_cycle() {
    let kernel = kernel();
    let pad = scratchpad();
    let mut pin = PinMock::new(&cycle(&pad, true));
    let mut ds = Ds18b20::new(bus(&pin), &kernel);

    assert_eq!(poll_until_new(&mut ds, &kernel, 50), Some(0x0191));
    assert!(ds.is_valid());
    assert_eq!(ds.last(), 0x0191);
    assert_eq!(ds.take_new(), None);

    // Parked on the interval timer; no bus traffic
    ds.poll(&kernel);
    assert_eq!(kernel.exact_state(), LockState::Free);
    pin.done();
}

#[test]
fn test_ds18b20_crc_mismatch_is_dropped() {
    let kernel = kernel();
    let mut pad = scratchpad();
    pad[8] ^= 0xFF;
    let mut pin = PinMock::new(&cycle(&pad, true));
    let mut ds = Ds18b20::new(bus(&pin), &kernel);

    assert_eq!(poll_until_new(&mut ds, &kernel, 50), None);
    assert_eq!(ds.crc_errors(), 1);
    assert!(!ds.is_valid());
    pin.done();
}

#[test]
fn test_ds18b20_conversion_timeout() {
    let kernel = kernel();
    let mut expected = reset(true);
    expected.extend(write_byte(SKIP_ROM));
    expected.extend(write_byte(CONVERT_T));
    for _ in 0..CONVERSION_POLLS {
        expected.extend(read_bit(false));
    }
    let mut pin = PinMock::new(&expected);
    let mut ds = Ds18b20::new(bus(&pin), &kernel);

    assert_eq!(poll_until_new(&mut ds, &kernel, 300), None);
    assert_eq!(ds.timeouts(), 1);
    pin.done();
}

#[test]
fn test_ds18b20_retries_after_interval() {
    let kernel = kernel();
    let mut expected = reset(false);
    expected.extend(reset(false));
    let mut pin = PinMock::new(&expected);
    let mut ds = Ds18b20::new(bus(&pin), &kernel);

    assert_eq!(poll_until_new(&mut ds, &kernel, 5), None);
    for _ in 0..DS_INTERVAL_MS - 1 {
        kernel.on_tick();
    }
    ds.poll(&kernel);
    assert_eq!(kernel.exact_state(), LockState::Free);

    kernel.on_tick();
    assert_eq!(poll_until_new(&mut ds, &kernel, 3), None);
    assert!(!ds.is_valid());
    pin.done();
}
