//! Driver configuration.

use crate::DEFAULT_TIMEOUT;

/// Byte order of the module bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    /// Convert a word as read from the bus to host order.
    pub const fn from_bus(self, raw: u32) -> u32 {
        match self {
            Endian::Little => u32::from_le(raw),
            Endian::Big => u32::from_be(raw),
        }
    }

    /// Convert a host-order word to the bus order.
    pub const fn to_bus(self, value: u32) -> u32 {
        match self {
            Endian::Little => value.to_le(),
            Endian::Big => value.to_be(),
        }
    }
}

/// Install-time settings.
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// Read timeout given to newly opened clients, in 10 ms ticks
    pub default_timeout: u32,
    /// Ticks to let a module settle after a hardware reset
    pub reset_settle_ticks: u32,
    /// Byte order of every module bus
    pub endian: Endian,
    /// Zero both RAM tables when a module is installed
    pub wipe_triggers_on_install: bool,
    /// Log spurious interrupts from the ISR
    pub debug_isr: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            reset_settle_ticks: 2,
            endian: Endian::default(),
            wipe_triggers_on_install: true,
            debug_isr: cfg!(feature = "debug"),
        }
    }
}
