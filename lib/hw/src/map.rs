//! # Module Memory Map
//!
//! Byte offsets of the registers and tables in one module's address space.
//! Every register is a 32-bit word.
//!
//! ```text
//! 0x0000  InterruptSource   (clear on read)
//! 0x0004  InterruptEnable
//! 0x0008  HptdcJtag
//! 0x000C  InputDelay
//! 0x0010  CableId
//! 0x0014  VhdlVersion
//! 0x0018  OutputByte
//! 0x001C  Status
//! 0x0020  Command
//! 0x0024  Pll               8 words
//! 0x0044  ReadTime          CTime
//! 0x0050  SetTime
//! 0x0054  Counters          9 x 64 bytes
//! 0x0294  Telegrams         7 x 128 bytes
//! 0x0614  Trigger table     2048 x 8 bytes
//! 0x4614  Config table      2048 x 8 bytes
//! 0x8614  Event history     index + 1024 x 16 bytes
//! 0xC618  Setup, reception errors, IoStat, board id, module stats
//! ```

use crate::{Counter, CTime, COUNTERS, HISTORY_TABLE_SIZE, MACHINES, RAM_TABLE_SIZE, TGM_GROUP_VALUES};

pub const INTERRUPT_SOURCE: usize = 0x0000;
pub const INTERRUPT_ENABLE: usize = 0x0004;
pub const HPTDC_JTAG: usize = 0x0008;
pub const INPUT_DELAY: usize = 0x000C;
pub const CABLE_ID: usize = 0x0010;
pub const VHDL_VERSION: usize = 0x0014;
pub const OUTPUT_BYTE: usize = 0x0018;
pub const STATUS: usize = 0x001C;
pub const COMMAND: usize = 0x0020;
pub const PLL: usize = 0x0024;
pub const READ_TIME: usize = PLL + PLL_WORDS * 4;
pub const SET_TIME: usize = READ_TIME + CTime::WORDS * 4;
pub const COUNTERS_BASE: usize = SET_TIME + 4;
pub const TELEGRAMS: usize = COUNTERS_BASE + COUNTERS * COUNTER_BLOCK;
pub const TRIGGERS: usize = TELEGRAMS + MACHINES * TELEGRAM_BLOCK;
pub const CONFIGS: usize = TRIGGERS + RAM_TABLE_SIZE * 8;
pub const EVENT_HISTORY: usize = CONFIGS + RAM_TABLE_SIZE * 8;
pub const SETUP: usize = EVENT_HISTORY + 4 + HISTORY_TABLE_SIZE * HISTORY_ENTRY;
pub const LAST_RESET: usize = SETUP + 0x04;
pub const PARITY_ERRS: usize = SETUP + 0x08;
pub const SYNC_ERRS: usize = SETUP + 0x0C;
pub const TOTAL_ERRS: usize = SETUP + 0x10;
pub const CODE_VIOL_ERRS: usize = SETUP + 0x14;
pub const QUEUE_ERRS: usize = SETUP + 0x18;
pub const IO_STAT: usize = SETUP + 0x1C;
pub const ID_LSL: usize = SETUP + 0x20;
pub const ID_MSL: usize = SETUP + 0x24;
pub const MOD_STATS: usize = SETUP + 0x28;

/// Total size of the address space in bytes.
pub const MAP_SIZE: usize = MOD_STATS + MOD_STATS_WORDS * 4;

/// Words in the PLL block.
pub const PLL_WORDS: usize = 8;
/// Words in the module statistics block.
pub const MOD_STATS_WORDS: usize = 22;
/// Bytes per counter block: control, history and active configuration.
pub const COUNTER_BLOCK: usize = 64;
/// Bytes per telegram buffer.
pub const TELEGRAM_BLOCK: usize = TGM_GROUP_VALUES * 2;
/// Bytes per event history entry: frame and CTime.
pub const HISTORY_ENTRY: usize = 16;

/// PLL word indices.
pub mod pll {
    pub const ERROR: usize = 0;
    pub const INTEGRATOR: usize = 1;
    pub const DAC: usize = 2;
    pub const LAST_IT_LEN: usize = 3;
    pub const PHASE: usize = 4;
    pub const NUM_AVERAGE: usize = 5;
    pub const KP: usize = 6;
    pub const KI: usize = 7;
}

/// Registers of one counter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRegs {
    base: usize,
}

impl CounterRegs {
    /// Non zero puts the counter under remote control.
    pub const fn lock_config(&self) -> usize {
        self.base
    }

    /// Incremented by the module at on-zero, cleared on read.
    pub const fn lock_history(&self) -> usize {
        self.base + 0x04
    }

    /// Remote command and output mask.
    pub const fn rem_out_mask(&self) -> usize {
        self.base + 0x08
    }

    /// Start of the history: index, frame, then three CTimes.
    pub const fn history(&self) -> usize {
        self.base + 0x0C
    }

    pub const fn history_index(&self) -> usize {
        self.history()
    }

    pub const fn on_zero_time(&self) -> usize {
        self.history() + 8 + 2 * CTime::WORDS * 4
    }

    /// Active configuration, two words.
    pub const fn config(&self) -> usize {
        self.base + 0x38
    }
}

pub const fn counter(c: Counter) -> CounterRegs {
    CounterRegs {
        base: COUNTERS_BASE + c.index() * COUNTER_BLOCK,
    }
}

/// Trigger table entry `index`, frame word first.
pub const fn trigger(index: usize) -> usize {
    TRIGGERS + index * 8
}

/// Configuration table entry `index`, config word first.
pub const fn config(index: usize) -> usize {
    CONFIGS + index * 8
}

/// Telegram buffer for telegram index `index` (machine number minus one).
pub const fn telegram(index: usize) -> usize {
    TELEGRAMS + index * TELEGRAM_BLOCK
}

/// Event history entry `index`.
pub const fn history_entry(index: usize) -> usize {
    EVENT_HISTORY + 4 + index * HISTORY_ENTRY
}
