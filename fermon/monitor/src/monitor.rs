//! Persistence side of the main loop
//!
//! Boot brings the log store up and settles the runtime configuration; after
//! that, every pass checks the store-interval timer and appends the latest
//! readings when it runs out. A store that is unavailable never stops the
//! loop: failed writes are counted and logged.

use embedded_hal::delay::DelayNs;
use fermon_coop::Task;
use fermon_core::{fm_debug, fm_info, fm_warn, FmResult};
use fermon_kernel::{Kernel, OneShotTimer, TimerHandle};
use fermon_sensors::{AdcChannel, Bubble};
use fermon_store::{ConfigFlags, ConfigRecord, LogStore, Nvm};

use crate::latest::Latest;
use crate::station::Station;

/// Where the running configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read back from the config slot
    Stored,
    /// Config slot erased; defaults in use
    Unconfigured,
    /// Store unavailable; defaults in use
    NoStore,
}

/// Store attempts since boot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub stored: u32,
    pub failed: u32,
}

#[cfg(feature = "defmt")]
impl defmt::Format for MonitorStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "MonitorStats{{stored: {}, failed: {}}}", self.stored, self.failed);
    }
}

/// Owns the log store and the runtime configuration
pub struct Monitor<N: Nvm> {
    store: LogStore<N>,
    config: ConfigRecord,
    source: ConfigSource,
    timer: Option<TimerHandle>,
    stats: MonitorStats,
}

impl<N: Nvm> Monitor<N> {
    /// Bring up the store, load or default the config and arm the store
    /// timer for one full interval.
    pub fn boot<T: OneShotTimer, D: DelayNs>(nvm: N, delay: &mut D, kernel: &Kernel<T>) -> Self {
        let mut store = LogStore::new(nvm);
        let (config, source) = match store.init(delay).and_then(|()| store.read_config()) {
            Ok(Some(config)) => {
                fm_info!("config: level {} interval {}min", config.bubble_level, config.store_interval);
                (config, ConfigSource::Stored)
            }
            Ok(None) => {
                fm_info!("default config");
                (ConfigRecord::default(), ConfigSource::Unconfigured)
            }
            Err(_) => {
                fm_warn!("store unavailable, persistence disabled");
                (ConfigRecord::default(), ConfigSource::NoStore)
            }
        };

        let timer = match kernel.acquire_timer() {
            Ok(t) => {
                if kernel.set_timer(t, config.store_interval_ticks().ticks()).is_err() {
                    fm_warn!("store timer rejected");
                }
                Some(t)
            }
            Err(_) => {
                fm_warn!("no timer for the store interval, logging disabled");
                None
            }
        };

        Self {
            store,
            config,
            source,
            timer,
            stats: MonitorStats::default(),
        }
    }

    /// Push the configured threshold and polarity into the bubble task.
    pub fn configure_bubble<A: AdcChannel, H: embedded_hal::digital::InputPin>(
        &self,
        bubble: &mut Bubble<A, H>,
    ) {
        bubble.set_invert(self.config.flags.contains(ConfigFlags::BUBBLE_INVERT));
        bubble.apply(self.config.threshold());
    }

    /// One main-loop pass of the persistence logic.
    ///
    /// Returns the store result when a record was due, `None` otherwise.
    pub fn service<T: OneShotTimer>(
        &mut self,
        kernel: &Kernel<T>,
        latest: &mut Latest,
    ) -> Option<FmResult<u16>> {
        if let Some(level) = latest.threshold() {
            self.config.set_threshold_level(level);
        }

        let timer = self.timer?;
        let interval = self.config.store_interval_ticks().ticks();
        // The interval may have been shortened since the timer was armed
        if kernel.timer_remaining(timer) > interval && kernel.set_timer(timer, interval).is_err() {
            fm_warn!("store timer rejected");
        }
        if !kernel.timer_elapsed(timer) {
            return None;
        }
        if kernel.set_timer(timer, interval).is_err() {
            fm_warn!("store timer rejected, storing every pass");
        }

        let mut record = latest.record();
        let result = self.store.write_record(&mut record);
        match result {
            Ok(slot) => {
                self.stats.stored += 1;
                fm_debug!("stored record {} in slot {}", record.n, slot);
            }
            Err(_) => {
                self.stats.failed += 1;
                fm_warn!("store failed, {} failures", self.stats.failed);
            }
        }
        latest.clear_fresh();
        Some(result)
    }

    pub fn config(&self) -> &ConfigRecord {
        &self.config
    }

    pub fn config_source(&self) -> ConfigSource {
        self.source
    }

    /// Minutes between records; 0 behaves as 1. Takes effect on the next pass.
    pub fn set_store_interval(&mut self, minutes: u8) {
        self.config.store_interval = minutes;
    }

    pub fn set_flags(&mut self, flags: ConfigFlags) {
        self.config.flags = flags;
    }

    /// Persist the running configuration.
    pub fn save_config(&mut self) -> FmResult<()> {
        self.store.write_config(&self.config)
    }

    /// Erase the whole store, config included.
    pub fn erase(&mut self) -> FmResult<()> {
        self.store.erase_all()
    }

    /// Sequence number the next stored record will carry
    pub fn next_sequence(&self) -> u8 {
        self.store.next_sequence()
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_ready()
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    pub fn store(&self) -> &LogStore<N> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut LogStore<N> {
        &mut self.store
    }

    pub fn store_timer(&self) -> Option<TimerHandle> {
        self.timer
    }
}

impl<'k, T: OneShotTimer, N: Nvm> Task<Station<'k, T>> for Monitor<N> {
    fn poll(&mut self, station: &Station<'k, T>) {
        let kernel = station.kernel();
        station.update(|latest| {
            self.service(kernel, latest);
        });
    }

    fn name(&self) -> &'static str {
        "monitor"
    }
}
