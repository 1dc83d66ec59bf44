//! Log store tests for fermon-store

use embedded_hal_mock::eh1::delay::NoopDelay;
use fermon_core::FmError;

use crate::{
    scan_ring, ConfigRecord, Cursor, LogRecord, LogStore, MemNvm, Nvm, RECORD_SIZE, SEQ_OFFSET,
};

/// Config word plus four record slots
type Nvm4 = MemNvm<{ 4 + 4 * RECORD_SIZE }>;

fn boot(nvm: Nvm4) -> LogStore<Nvm4> {
    let mut store = LogStore::new(nvm);
    store.init(&mut NoopDelay::new()).unwrap();
    store
}

fn reboot(store: LogStore<Nvm4>) -> LogStore<Nvm4> {
    boot(store.into_nvm())
}

fn seqs(store: &LogStore<Nvm4>) -> [u8; 4] {
    let cells = store.nvm().cells();
    core::array::from_fn(|slot| cells[4 + slot * RECORD_SIZE + SEQ_OFFSET])
}

fn sample(weight: i32) -> LogRecord {
    LogRecord {
        weight,
        temperature: 0x0191,
        ethanol: 812,
        bubble: 40_000,
        co2: 17,
        reserved: 0,
        n: 0,
    }
}

fn write(store: &mut LogStore<Nvm4>, weight: i32) -> Result<u16, FmError> {
    store.write_record(&mut sample(weight))
}

#[test]
fn test_scan_ring_cases() {
    assert_eq!(scan_ring([255, 255, 255, 255]), Cursor { slot: 0, seq: 0 });
    assert_eq!(scan_ring([0, 1, 2, 255]), Cursor { slot: 3, seq: 3 });
    assert_eq!(scan_ring([4, 1, 2, 3]), Cursor { slot: 1, seq: 5 });
    // Full ring, no wrap yet
    assert_eq!(scan_ring([0, 1, 2, 3]), Cursor { slot: 0, seq: 4 });
    // Gap left by an abandoned slot
    assert_eq!(scan_ring([10, 11, 7, 8]), Cursor { slot: 2, seq: 12 });
    assert_eq!(scan_ring([0, 1, 5, 6]), Cursor { slot: 2, seq: 2 });
    // 253 -> 0 continues a run
    assert_eq!(scan_ring([252, 253, 0, 1]), Cursor { slot: 0, seq: 2 });
    // A wrapped run starting at 0
    assert_eq!(scan_ring([2, 3, 0, 1]), Cursor { slot: 2, seq: 4 });
    // 254 is outside the domain and treated like an erased slot
    assert_eq!(scan_ring([3, 4, 254, 1]), Cursor { slot: 2, seq: 5 });
    assert_eq!(scan_ring([254, 0, 1, 2]), Cursor { slot: 0, seq: 0 });
}

#[test]
fn test_reboot_scenario() {
    let mut store = boot(Nvm4::new());
    assert_eq!(store.capacity(), 4);
    assert_eq!(store.cursor(), Cursor { slot: 0, seq: 0 });

    for w in 1..=3 {
        write(&mut store, w).unwrap();
    }
    assert_eq!(seqs(&store), [0, 1, 2, 255]);

    let mut store = reboot(store);
    assert_eq!(store.cursor(), Cursor { slot: 3, seq: 3 });

    write(&mut store, 4).unwrap();
    write(&mut store, 5).unwrap();
    assert_eq!(seqs(&store), [4, 1, 2, 3]);

    let store = reboot(store);
    assert_eq!(store.cursor(), Cursor { slot: 1, seq: 5 });
}

#[test]
fn test_recovery_is_idempotent() {
    let mut store = boot(Nvm4::new());
    for w in 0..6 {
        write(&mut store, w).unwrap();
    }
    // Garble slot 2's sequence byte directly
    store.nvm_mut().poke(4 + 2 * RECORD_SIZE + SEQ_OFFSET, 0x37);

    let first = store.recover_next_slot().unwrap();
    let second = store.recover_next_slot().unwrap();
    assert_eq!(first, second);
    let store = reboot(store);
    assert_eq!(store.cursor(), first);
}

#[test]
fn test_recovered_cursor_matches_live_cursor() {
    let mut store = boot(Nvm4::new());
    // Several laps of the 254-value sequence domain
    for w in 0..600 {
        write(&mut store, w).unwrap();
        let live = store.cursor();
        store = reboot(store);
        assert_eq!(store.cursor(), live, "after {} writes", w + 1);
    }
}

#[test]
fn test_round_trip() {
    let mut store = boot(Nvm4::new());
    write(&mut store, 0).unwrap();
    let mut r = sample(-1234);
    r.n = 200;
    let slot = store.write_record(&mut r).unwrap();
    assert_eq!(slot, 1);
    assert_eq!(r.n, 1);

    let back = store.read_record(slot).unwrap();
    assert_eq!(back, LogRecord { n: 1, ..sample(-1234) });
}

#[test]
fn test_rotation_overwrites_oldest() {
    let mut store = boot(Nvm4::new());
    for w in 1..=5 {
        write(&mut store, w).unwrap();
    }
    let slot0 = store.read_record(0).unwrap();
    assert_eq!(slot0.weight, 5);
    assert_eq!(slot0.n, 4);
    assert_eq!(seqs(&store), [4, 1, 2, 3]);
}

#[test]
fn test_replay_oldest_first() {
    let mut store = boot(Nvm4::new());
    for w in 1..=5 {
        write(&mut store, w).unwrap();
    }
    let mut order = [0i32; 4];
    let mut i = 0;
    let count = store
        .replay(|_, r| {
            order[i] = r.weight;
            i += 1;
        })
        .unwrap();
    assert_eq!(count, 4);
    assert_eq!(order, [2, 3, 4, 5]);
}

#[test]
fn test_replay_skips_unwritten() {
    let mut store = boot(Nvm4::new());
    write(&mut store, 1).unwrap();
    let mut slots = [u16::MAX; 4];
    let mut i = 0;
    let count = store
        .replay(|slot, _| {
            slots[i] = slot;
            i += 1;
        })
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(slots[0], 0);
}

#[test]
fn test_power_cut_reuses_slot() {
    let mut store = boot(Nvm4::new());
    for w in 1..=3 {
        write(&mut store, w).unwrap();
    }
    store.nvm_mut().cut_power_after(8);
    assert_eq!(write(&mut store, 4), Err(FmError::WriteFailed));
    assert_eq!(seqs(&store), [0, 1, 2, 255]);

    let mut store = reboot(store);
    assert_eq!(store.cursor(), Cursor { slot: 3, seq: 3 });
    write(&mut store, 4).unwrap();
    assert_eq!(store.read_record(3).unwrap().weight, 4);
}

#[test]
fn test_power_cut_over_previous_lap() {
    let mut store = boot(Nvm4::new());
    for w in 1..=6 {
        write(&mut store, w).unwrap();
    }
    assert_eq!(seqs(&store), [4, 5, 2, 3]);
    store.nvm_mut().cut_power_after(RECORD_SIZE - 1);
    assert!(write(&mut store, 7).is_err());

    let store = reboot(store);
    assert_eq!(store.cursor(), Cursor { slot: 2, seq: 6 });
}

#[test]
fn test_write_failure_still_advances() {
    let mut store = boot(Nvm4::new());
    store.nvm_mut().fail_programs(1);
    assert_eq!(write(&mut store, 1), Err(FmError::WriteFailed));
    assert_eq!(store.cursor(), Cursor { slot: 1, seq: 1 });
    assert_eq!(write(&mut store, 2), Ok(1));
    assert_eq!(store.stats().write_failures, 1);
    assert_eq!(store.stats().writes, 1);
}

#[test]
fn test_init_retries_then_succeeds() {
    let mut nvm = Nvm4::new();
    nvm.fail_init(5);
    let store = boot(nvm);
    assert!(store.is_ready());
    assert_eq!(store.nvm().init_calls(), 6);
    assert_eq!(store.stats().init_attempts, 6);
}

#[test]
fn test_init_gives_up() {
    let mut nvm = Nvm4::new();
    nvm.fail_init(u32::MAX);
    let mut store = LogStore::new(nvm);
    assert_eq!(store.init(&mut NoopDelay::new()), Err(FmError::InitFailed));
    assert!(!store.is_ready());
    assert_eq!(store.nvm().init_calls(), 200);

    assert_eq!(store.read_config(), Err(FmError::Unavailable));
    assert_eq!(write(&mut store, 1), Err(FmError::Unavailable));
    assert_eq!(store.read_record(0), Err(FmError::Unavailable));
    assert_eq!(store.erase_all(), Err(FmError::Unavailable));
    assert_eq!(store.read_word(0), Err(FmError::Unavailable));
}

#[test]
fn test_tiny_device_fails_init() {
    let mut store = LogStore::new(MemNvm::<16>::new());
    assert_eq!(store.init(&mut NoopDelay::new()), Err(FmError::InitFailed));
}

#[test]
fn test_capacity_is_capped() {
    let mut store = LogStore::new(MemNvm::<2048>::new());
    store.init(&mut NoopDelay::new()).unwrap();
    assert_eq!(store.capacity(), 127);

    let mut big = LogStore::new(MemNvm::<8192>::new());
    big.init(&mut NoopDelay::new()).unwrap();
    assert_eq!(big.capacity(), 253);
}

#[test]
fn test_config_slot() {
    let mut store = boot(Nvm4::new());
    assert_eq!(store.read_config(), Ok(None));

    let cfg = ConfigRecord {
        bubble_level: 40,
        store_interval: 15,
        ..ConfigRecord::default()
    };
    store.write_config(&cfg).unwrap();
    assert_eq!(store.read_config(), Ok(Some(cfg)));

    // Config lives outside the ring
    for w in 0..9 {
        write(&mut store, w).unwrap();
    }
    assert_eq!(store.read_config(), Ok(Some(cfg)));
}

#[test]
fn test_config_write_failure() {
    let mut store = boot(Nvm4::new());
    store.nvm_mut().fail_programs(1);
    assert_eq!(
        store.write_config(&ConfigRecord::default()),
        Err(FmError::WriteFailed)
    );
}

#[test]
fn test_erase_all_resets_everything() {
    let mut store = boot(Nvm4::new());
    store.write_config(&ConfigRecord::default()).unwrap();
    write(&mut store, 1).unwrap();
    write(&mut store, 2).unwrap();

    store.erase_all().unwrap();
    assert_eq!(store.cursor(), Cursor::default());
    assert_eq!(store.read_config(), Ok(None));
    assert!(store.nvm().cells().iter().all(|&b| b == 0xFF));
}

#[test]
fn test_read_bounds() {
    let mut store = boot(Nvm4::new());
    assert_eq!(store.read_record(4), Err(FmError::OutOfRange));
    assert_eq!(store.read_word(68), Err(FmError::OutOfRange));
    assert_eq!(store.read_word(6), Err(FmError::InvalidArgument));

    store.write_config(&ConfigRecord::default()).unwrap();
    assert_eq!(store.read_word(0), Ok([34, 60, 0x91, 0]));
    assert_eq!(store.read_word(64), Ok([0xFF; 4]));
    assert_eq!(store.device_size(), store.nvm().size());
}

#[test]
fn test_failed_recovery_disables_store() {
    let mut store = boot(Nvm4::new());
    for w in [10, 11, 12] {
        write(&mut store, w).unwrap();
    }
    let mut nvm = store.into_nvm();
    nvm.fail_read_at(4 + 3 * RECORD_SIZE);

    let mut store = LogStore::new(nvm);
    assert_eq!(store.init(&mut NoopDelay::new()), Err(FmError::Unavailable));
    assert!(!store.is_ready());
    assert_eq!(store.cursor(), Cursor::default());
    assert_eq!(write(&mut store, 99), Err(FmError::Unavailable));
    assert_eq!(seqs(&store), [0, 1, 2, 255]);

    // A clean retry recovers the same cursor
    store.init(&mut NoopDelay::new()).unwrap();
    assert_eq!(store.read_record(0).unwrap().weight, 10);
    assert_eq!(write(&mut store, 13), Ok(3));
}

#[test]
fn test_read_word_partial_tail() {
    let mut store = LogStore::new(MemNvm::<70>::new());
    store.init(&mut NoopDelay::new()).unwrap();
    assert_eq!(store.read_word(64), Ok([0xFF; 4]));
    assert_eq!(store.read_word(68), Err(FmError::OutOfRange));
    assert_eq!(store.read_word(u32::MAX - 3), Err(FmError::OutOfRange));
}
