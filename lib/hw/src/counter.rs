//! # Counters
//!
//! Each module has nine counters. Counter 0 is the direct trigger: it only
//! honours the on-zero field of its configuration and is what CTIM
//! connections use. Counters 1..8 are real down-counters with an output.
//!
//! A counter configuration is kept in two forms: [`CounterConfig`] for the
//! driver API and [`HwCounterConfig`], two packed words, for the RAM table and
//! the active counter registers.

use bitflags::bitflags;

use crate::{field, FieldError, InterruptMask, COUNTERS};

/// A counter number in `0..COUNTERS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Counter(u8);

impl Counter {
    /// Counter zero, the direct trigger.
    pub const DIRECT: Counter = Counter(0);

    pub const fn new(n: u32) -> Option<Self> {
        if (n as usize) < COUNTERS {
            Some(Counter(n as u8))
        } else {
            None
        }
    }

    /// Index into per-counter arrays and the interrupt source number.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// True for counters 1..8, which have outputs and can be remote controlled.
    pub const fn is_real(self) -> bool {
        self.0 != 0
    }

    /// The interrupt source raised when this counter reaches zero.
    pub const fn interrupt(self) -> InterruptMask {
        InterruptMask::from_bits_truncate(1 << self.0)
    }

    /// Counters 1..8.
    pub fn real() -> impl Iterator<Item = Counter> {
        (1..COUNTERS as u8).map(Counter)
    }
}

impl TryFrom<u32> for Counter {
    type Error = FieldError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Counter::new(value).ok_or(FieldError { field: "counter", value })
    }
}

impl From<Counter> for u32 {
    fn from(c: Counter) -> u32 {
        c.0 as u32
    }
}

bitflags! {
    /// What a counter does when it reaches zero.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OnZero: u32 {
        /// Make a bus interrupt
        const BUS = 0x01;
        /// Make an output pulse
        const OUT = 0x02;
    }
}

field_enum! {
    /// Counter start source.
    pub enum CounterStart("start") {
        /// Next millisecond tick starts the counter
        Normal = 0,
        /// External start one
        Ext1 = 1,
        /// External start two
        Ext2 = 2,
        /// Output of the previous counter
        Chained = 3,
        /// Output of this counter (divide)
        SelfStart = 4,
        /// Waits for a remote start
        Remote = 5,
        /// Waits for the PPS
        Pps = 6,
        /// Started by previous, stopped by next
        ChainedStop = 7,
    }
}

field_enum! {
    /// Counter operating mode.
    pub enum CounterMode("mode") {
        /// One load, one start, one output
        Normal = 0,
        /// One load, multiple starts and outputs
        Multiple = 1,
        /// Like multiple, terminated by external start two
        Burst = 2,
        /// Multiple bursts
        MultipleBurst = 3,
    }
}

field_enum! {
    /// Counter clock source.
    pub enum CounterClock("clock") {
        /// 1KHz C-Train clock
        OneKhz = 0,
        /// 40MHz divided down, phase locked to 1KHz
        TenMhz = 1,
        /// 40MHz recovered by the PLL
        FortyMhz = 2,
        /// External clock one
        Ext1 = 3,
        /// External clock two
        Ext2 = 4,
        /// Output of the previous counter
        Chained = 5,
    }
}

/// API form of a counter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterConfig {
    pub on_zero: OnZero,
    pub start: CounterStart,
    pub mode: CounterMode,
    pub clock: CounterClock,
    /// Output pulse width in 40MHz ticks, 0 = as fast as possible
    pub pulse_width: u32,
    /// Delay loaded into the counter
    pub delay: u32,
}

impl CounterConfig {
    /// Configuration installed for a CTIM connection on counter 0.
    pub const fn bus_interrupt() -> Self {
        Self {
            on_zero: OnZero::BUS,
            start: CounterStart::Normal,
            mode: CounterMode::Normal,
            clock: CounterClock::OneKhz,
            pulse_width: 0,
            delay: 0,
        }
    }

    pub fn to_hw(&self) -> HwCounterConfig {
        HwCounterConfig {
            config: field::pack(HwCounterConfig::ON_ZERO_MASK, self.on_zero.bits())
                | field::pack(HwCounterConfig::START_MASK, self.start as u32)
                | field::pack(HwCounterConfig::MODE_MASK, self.mode as u32)
                | field::pack(HwCounterConfig::CLOCK_MASK, self.clock as u32)
                | field::pack(HwCounterConfig::PULSE_WIDTH_MASK, self.pulse_width),
            delay: self.delay,
        }
    }
}

/// Packed counter configuration, two 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HwCounterConfig {
    pub config: u32,
    pub delay: u32,
}

impl HwCounterConfig {
    pub const ON_ZERO_MASK: u32 = 0xC000_0000;
    pub const START_MASK: u32 = 0x3800_0000;
    pub const MODE_MASK: u32 = 0x0600_0000;
    pub const CLOCK_MASK: u32 = 0x01C0_0000;
    pub const PULSE_WIDTH_MASK: u32 = 0x003F_FFFF;

    /// Raw on-zero bits, readable without decoding the rest of the word.
    pub const fn on_zero(&self) -> OnZero {
        OnZero::from_bits_truncate(field::unpack(Self::ON_ZERO_MASK, self.config))
    }

    /// Same configuration with the on-zero field replaced.
    pub const fn with_on_zero(self, on_zero: OnZero) -> Self {
        Self {
            config: (self.config & !Self::ON_ZERO_MASK)
                | field::pack(Self::ON_ZERO_MASK, on_zero.bits()),
            delay: self.delay,
        }
    }

    pub fn decode(&self) -> Result<CounterConfig, FieldError> {
        Ok(CounterConfig {
            on_zero: self.on_zero(),
            start: CounterStart::try_from(field::unpack(Self::START_MASK, self.config))?,
            mode: CounterMode::try_from(field::unpack(Self::MODE_MASK, self.config))?,
            clock: CounterClock::try_from(field::unpack(Self::CLOCK_MASK, self.config))?,
            pulse_width: field::unpack(Self::PULSE_WIDTH_MASK, self.config),
            delay: self.delay,
        })
    }
}

bitflags! {
    /// Remote control commands for a counter under host control.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Remote: u32 {
        /// Load the counter
        const LOAD  = 0x01;
        /// Kill the counter no matter what its state
        const STOP  = 0x02;
        /// Start the counter
        const START = 0x04;
        /// Pulse the output, counter not disturbed
        const OUT   = 0x08;
        /// Make a bus interrupt now, counter not disturbed
        const BUS   = 0x10;
        /// Execute the command rather than set the mask
        const EXEC  = 0x20;
    }
}

field_enum! {
    /// Output polarity of a counter.
    pub enum Polarity("polarity") {
        Ttl = 0,
        TtlBar = 1,
    }
}

/// Layout of the counter control word that combines the remote command and
/// the output routing mask.
pub mod control {
    use super::{Polarity, Remote};
    use crate::field;

    pub const REMOTE_MASK: u32 = 0x3F;
    pub const OUT_MASK: u32 = 0x3_FFC0;
    pub const TTL_BAR: u32 = 0x8000_0000;

    /// Word written to execute a remote command.
    pub const fn remote_command(remote: Remote) -> u32 {
        Remote::EXEC.bits() | (remote.bits() & REMOTE_MASK)
    }

    /// Word routing a counter to the outputs in `mask`.
    pub const fn out_mask(mask: u32, polarity: Polarity) -> u32 {
        let bar = match polarity {
            Polarity::Ttl => 0,
            Polarity::TtlBar => TTL_BAR,
        };
        field::pack(OUT_MASK, mask) | bar
    }

    /// Output mask and polarity encoded in a control word.
    pub const fn decode_out_mask(word: u32) -> (u32, Polarity) {
        let polarity = if word & TTL_BAR != 0 {
            Polarity::TtlBar
        } else {
            Polarity::Ttl
        };
        (field::unpack(OUT_MASK, word & !TTL_BAR), polarity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_range() {
        assert!(Counter::new(8).is_some());
        assert!(Counter::new(9).is_none());
        assert!(!Counter::DIRECT.is_real());
        assert_eq!(Counter::real().count(), 8);
        assert_eq!(Counter::try_from(3).map(Counter::index), Ok(3));
    }

    #[test]
    fn test_config_packs_into_masks() {
        let config = CounterConfig {
            on_zero: OnZero::BUS | OnZero::OUT,
            start: CounterStart::ChainedStop,
            mode: CounterMode::Burst,
            clock: CounterClock::Chained,
            pulse_width: 40,
            delay: 1234,
        };
        let hw = config.to_hw();

        assert_eq!(hw.config & HwCounterConfig::ON_ZERO_MASK, 0xC000_0000);
        assert_eq!(hw.config & HwCounterConfig::START_MASK, 0x3800_0000);
        assert_eq!(hw.config & HwCounterConfig::MODE_MASK, 0x0400_0000);
        assert_eq!(hw.config & HwCounterConfig::CLOCK_MASK, 0x0140_0000);
        assert_eq!(hw.config & HwCounterConfig::PULSE_WIDTH_MASK, 40);
        assert_eq!(hw.decode(), Ok(config));
    }

    #[test]
    fn test_bad_clock_is_rejected() {
        let hw = HwCounterConfig {
            config: field::pack(HwCounterConfig::CLOCK_MASK, 7),
            delay: 0,
        };
        assert_eq!(
            hw.decode(),
            Err(FieldError {
                field: "clock",
                value: 7
            })
        );
    }

    #[test]
    fn test_on_zero_replacement_keeps_other_fields() {
        let hw = CounterConfig::bus_interrupt().to_hw();
        let cleared = hw.with_on_zero(OnZero::empty());

        assert!(cleared.on_zero().is_empty());
        assert_eq!(cleared.config & !HwCounterConfig::ON_ZERO_MASK, hw.config & !HwCounterConfig::ON_ZERO_MASK);
    }

    #[test]
    fn test_out_mask_word() {
        let word = control::out_mask(0b10, Polarity::TtlBar);
        assert_eq!(word, 0x80 | control::TTL_BAR);
        assert_eq!(control::decode_out_mask(word), (0b10, Polarity::TtlBar));
        assert_eq!(control::remote_command(Remote::START | Remote::OUT), 0x2C);
    }
}
