//! # Simulated Module
//!
//! A memory-backed [`RegisterBus`] covering the whole module map. It mimics
//! the behaviour the driver depends on:
//!
//! - the interrupt source register and each counter's lock-history flag are
//!   cleared when read
//! - command register writes are recorded
//! - reads and writes can be made to fail to exercise bus error handling
//!
//! Registers are held in host order and converted to the configured bus byte
//! order at the interface. Test helpers (`peek`, `poke`, `raise`, ...) work in
//! host order and have no side effects.

use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use ctr_hw::{map, CTime, Counter, CounterHistory, HwCounterConfig, HwTrigger, InterruptMask, COUNTERS};

use super::{RegisterBus, Width};
use crate::config::Endian;
use crate::error::BusError;

struct SimState {
    words: Vec<u32>,
    commands: Vec<u32>,
    fail_reads: bool,
    fail_writes: bool,
}

/// Memory-backed module for host testing.
pub struct SimulatedBus {
    endian: Endian,
    state: Mutex<SimState>,
}

impl SimulatedBus {
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            state: Mutex::new(SimState {
                words: vec![0; map::MAP_SIZE / 4],
                commands: Vec::new(),
                fail_reads: false,
                fail_writes: false,
            }),
        }
    }

    fn clears_on_read(offset: usize) -> bool {
        offset == map::INTERRUPT_SOURCE
            || (0..COUNTERS as u32)
                .filter_map(Counter::new)
                .any(|c| map::counter(c).lock_history() == offset)
    }

    /// Make every read fault.
    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// Make every write fault.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn peek(&self, offset: usize) -> u32 {
        self.state.lock().words.get(offset / 4).copied().unwrap_or(0)
    }

    pub fn poke(&self, offset: usize, value: u32) {
        if let Some(w) = self.state.lock().words.get_mut(offset / 4) {
            *w = value;
        }
    }

    /// Latch interrupt sources as the module would.
    pub fn raise(&self, sources: InterruptMask) {
        let current = self.peek(map::INTERRUPT_SOURCE);
        self.poke(map::INTERRUPT_SOURCE, current | sources.bits());
    }

    /// Fill a counter history and bump its lock-history flag, as an on-zero does.
    pub fn load_history(&self, counter: Counter, history: &CounterHistory) {
        let regs = map::counter(counter);
        let base = regs.history();
        self.poke(base, history.index);
        self.poke(base + 4, history.frame.0);
        let times = [history.trigger_time, history.start_time, history.on_zero_time];
        for (i, t) in times.iter().enumerate() {
            for (j, w) in t.to_words().iter().enumerate() {
                self.poke(base + 8 + (i * 3 + j) * 4, *w);
            }
        }
        let locks = self.peek(regs.lock_history());
        self.poke(regs.lock_history(), locks + 1);
    }

    /// Value returned by the next UTC latch.
    pub fn set_time(&self, time: CTime) {
        for (i, w) in time.to_words().iter().enumerate() {
            self.poke(map::READ_TIME + i * 4, *w);
        }
    }

    pub fn trigger(&self, index: usize) -> HwTrigger {
        HwTrigger {
            frame: self.peek(map::trigger(index)),
            trigger: self.peek(map::trigger(index) + 4),
        }
    }

    pub fn config(&self, index: usize) -> HwCounterConfig {
        HwCounterConfig {
            config: self.peek(map::config(index)),
            delay: self.peek(map::config(index) + 4),
        }
    }

    pub fn interrupt_enable(&self) -> InterruptMask {
        InterruptMask::from_bits_truncate(self.peek(map::INTERRUPT_ENABLE))
    }

    /// Every value written to the command register, oldest first.
    pub fn commands(&self) -> Vec<u32> {
        self.state.lock().commands.clone()
    }
}

impl RegisterBus for SimulatedBus {
    fn read(&self, offset: usize, width: Width) -> Result<u32, BusError> {
        let mut state = self.state.lock();
        let index = offset / 4;
        if state.fail_reads || offset % width.bytes() != 0 || index >= state.words.len() {
            return Err(BusError::Read { offset });
        }

        let value = state.words[index];
        if width == Width::Word && Self::clears_on_read(offset) {
            state.words[index] = 0;
        }

        let bytes = self.endian.to_bus(value).to_ne_bytes();
        let lane = offset % 4;
        Ok(match width {
            Width::Word => u32::from_ne_bytes(bytes),
            Width::Half => u16::from_ne_bytes([bytes[lane], bytes[lane + 1]]) as u32,
            Width::Byte => bytes[lane] as u32,
        })
    }

    fn write(&self, offset: usize, width: Width, value: u32) -> Result<(), BusError> {
        let mut state = self.state.lock();
        let index = offset / 4;
        if state.fail_writes || offset % width.bytes() != 0 || index >= state.words.len() {
            return Err(BusError::Write { offset });
        }

        let mut bytes = self.endian.to_bus(state.words[index]).to_ne_bytes();
        let lane = offset % 4;
        match width {
            Width::Word => bytes = value.to_ne_bytes(),
            Width::Half => bytes[lane..lane + 2].copy_from_slice(&(value as u16).to_ne_bytes()),
            Width::Byte => bytes[lane] = value as u8,
        }
        let host = self.endian.from_bus(u32::from_ne_bytes(bytes));
        state.words[index] = host;
        if offset == map::COMMAND {
            state.commands.push(host);
        }
        Ok(())
    }
}
