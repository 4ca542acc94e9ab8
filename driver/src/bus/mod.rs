//! # Register Access Layer
//!
//! Everything the driver does to a module goes through [`ModuleIo`], which
//! wraps a [`RegisterBus`] with byte-order conversion and bus error
//! accounting. Each failed access counts towards the module's bus error
//! counter, which the status word reports until it decays back to zero.
//!
//! Two flavours of access are offered:
//!
//! - `read`/`write` return the [`BusError`] to the caller
//! - `load`/`store` log and count the error and carry on, for paths that must
//!   not abort half way (connection bookkeeping and the ISR)

pub mod sim;

use alloc::sync::Arc;

use ctr_hw::{map, CTime, Counter, CounterHistory, EventFrame, HwCounterConfig, HwTrigger};

use crate::config::Endian;
use crate::error::BusError;
use crate::MAX_BUS_ERROR_COUNT;

/// Access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
}

impl Width {
    pub const fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
        }
    }
}

/// A module's address space as seen from the host.
///
/// Values cross this interface in bus byte order. Offsets are bytes from the
/// start of the module memory map.
pub trait RegisterBus: Send + Sync {
    fn read(&self, offset: usize, width: Width) -> Result<u32, BusError>;
    fn write(&self, offset: usize, width: Width, value: u32) -> Result<(), BusError>;
}

/// Word access to one module with error accounting.
pub struct ModuleIo {
    bus: Arc<dyn RegisterBus>,
    endian: Endian,
    errors: u32,
}

impl ModuleIo {
    pub fn new(bus: Arc<dyn RegisterBus>, endian: Endian) -> Self {
        Self {
            bus,
            endian,
            errors: 0,
        }
    }

    fn fault(&mut self, e: BusError) {
        self.errors = (self.errors + 1).min(MAX_BUS_ERROR_COUNT);
        log::debug!("ctr: {} ({} recent)", e, self.errors);
    }

    pub fn read(&mut self, offset: usize) -> Result<u32, BusError> {
        match self.bus.read(offset, Width::Word) {
            Ok(raw) => Ok(self.endian.from_bus(raw)),
            Err(e) => {
                self.fault(e);
                Err(e)
            }
        }
    }

    pub fn write(&mut self, offset: usize, value: u32) -> Result<(), BusError> {
        let raw = self.endian.to_bus(value);
        self.bus.write(offset, Width::Word, raw).map_err(|e| {
            self.fault(e);
            e
        })
    }

    /// Read, zero on bus error.
    pub fn load(&mut self, offset: usize) -> u32 {
        self.read(offset).unwrap_or(0)
    }

    /// Write, bus errors are only counted.
    pub fn store(&mut self, offset: usize, value: u32) {
        let _ = self.write(offset, value);
    }

    /// Recent bus error count.
    pub fn bus_errors(&self) -> u32 {
        self.errors
    }

    pub fn clear_bus_errors(&mut self) {
        self.errors = 0;
    }

    /// Age the error count by one and return what is left.
    pub fn decay_bus_errors(&mut self) -> u32 {
        self.errors = self.errors.saturating_sub(1);
        self.errors
    }

    pub fn read_words<const N: usize>(&mut self, offset: usize) -> Result<[u32; N], BusError> {
        let mut words = [0u32; N];
        for (i, w) in words.iter_mut().enumerate() {
            *w = self.read(offset + i * 4)?;
        }
        Ok(words)
    }

    pub fn write_words(&mut self, offset: usize, words: &[u32]) -> Result<(), BusError> {
        for (i, w) in words.iter().enumerate() {
            self.write(offset + i * 4, *w)?;
        }
        Ok(())
    }

    pub fn read_trigger(&mut self, index: usize) -> Result<HwTrigger, BusError> {
        let [frame, trigger] = self.read_words::<2>(map::trigger(index))?;
        Ok(HwTrigger { frame, trigger })
    }

    pub fn write_trigger(&mut self, index: usize, hw: HwTrigger) -> Result<(), BusError> {
        self.write_words(map::trigger(index), &[hw.frame, hw.trigger])
    }

    pub fn read_config(&mut self, index: usize) -> Result<HwCounterConfig, BusError> {
        let [config, delay] = self.read_words::<2>(map::config(index))?;
        Ok(HwCounterConfig { config, delay })
    }

    pub fn write_config(&mut self, index: usize, hw: HwCounterConfig) -> Result<(), BusError> {
        self.write_words(map::config(index), &[hw.config, hw.delay])
    }

    /// Active configuration of a counter.
    pub fn read_counter_config(&mut self, counter: Counter) -> Result<HwCounterConfig, BusError> {
        let [config, delay] = self.read_words::<2>(map::counter(counter).config())?;
        Ok(HwCounterConfig { config, delay })
    }

    pub fn write_counter_config(&mut self, counter: Counter, hw: HwCounterConfig) -> Result<(), BusError> {
        self.write_words(map::counter(counter).config(), &[hw.config, hw.delay])
    }

    pub fn read_ctime(&mut self, offset: usize) -> Result<CTime, BusError> {
        Ok(CTime::from_words(self.read_words::<3>(offset)?))
    }

    pub fn read_history(&mut self, counter: Counter) -> Result<CounterHistory, BusError> {
        let w = self.read_words::<{ CounterHistory::WORDS }>(map::counter(counter).history())?;
        Ok(CounterHistory {
            index: w[0],
            frame: EventFrame(w[1]),
            trigger_time: CTime::from_words([w[2], w[3], w[4]]),
            start_time: CTime::from_words([w[5], w[6], w[7]]),
            on_zero_time: CTime::from_words([w[8], w[9], w[10]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::sim::SimulatedBus;
    use super::*;

    #[test]
    fn test_errors_count_and_decay() {
        let sim = Arc::new(SimulatedBus::new(Endian::Little));
        let mut io = ModuleIo::new(sim.clone(), Endian::Little);

        sim.fail_reads(true);
        assert!(io.read(map::STATUS).is_err());
        assert_eq!(io.load(map::STATUS), 0);
        assert_eq!(io.bus_errors(), 2);

        sim.fail_reads(false);
        assert_eq!(io.decay_bus_errors(), 1);
        assert_eq!(io.decay_bus_errors(), 0);
        assert_eq!(io.decay_bus_errors(), 0);
    }

    #[test]
    fn test_error_count_saturates() {
        let sim = Arc::new(SimulatedBus::new(Endian::Little));
        let mut io = ModuleIo::new(sim.clone(), Endian::Little);

        sim.fail_writes(true);
        for _ in 0..(MAX_BUS_ERROR_COUNT + 20) {
            io.store(map::COMMAND, 1);
        }
        assert_eq!(io.bus_errors(), MAX_BUS_ERROR_COUNT);
    }

    #[test]
    fn test_big_endian_bus() {
        let sim = Arc::new(SimulatedBus::new(Endian::Big));
        let mut io = ModuleIo::new(sim.clone(), Endian::Big);

        io.write(map::INPUT_DELAY, 0x0102_0304).expect("write should succeed");
        assert_eq!(sim.peek(map::INPUT_DELAY), 0x0102_0304);
        assert_eq!(sim.read(map::INPUT_DELAY, Width::Byte), Ok(0x01));
    }

    #[test]
    fn test_history_layout() {
        let sim = Arc::new(SimulatedBus::new(Endian::Little));
        let mut io = ModuleIo::new(sim.clone(), Endian::Little);
        let counter = Counter::new(2).expect("valid counter");
        let history = CounterHistory {
            index: 17,
            frame: EventFrame(0x2100_0005),
            trigger_time: CTime::from_words([1, 2, 3]),
            start_time: CTime::from_words([4, 5, 6]),
            on_zero_time: CTime::from_words([7, 8, 9]),
        };

        sim.load_history(counter, &history);
        assert_eq!(io.read_history(counter), Ok(history));
        assert_eq!(io.load(map::counter(counter).on_zero_time()), 7);
    }
}
