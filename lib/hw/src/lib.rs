//! # CTR Hardware Description
//!
//! Types shared by everything that talks to a CTR timing receiver module:
//! counter and trigger configuration, timing frames, timestamps, the
//! status/command/interrupt registers and the module memory map.
//!
//! ## Layout
//!
//! - [`counter`]: counters, counter configuration and its packed form
//! - [`trigger`]: event frames, telegram conditions and the packed trigger
//! - [`time`]: UTC timestamps and the one-deep counter history
//! - [`flags`]: interrupt, status, command and IO status bit words
//! - [`map`]: byte offsets of every register the driver touches
//! - [`pll`]: phase locked loop parameters
//!
//! The packed forms are what the module stores in its RAM tables. Conversion
//! between the API structures and the packed words always returns an owned
//! value; nothing here keeps shared scratch state.

#![no_std]

/// Declares a `#[repr(u32)]` enumeration carried in a hardware or wire word,
/// with `TryFrom<u32>` rejecting unknown values. The first variant is the
/// default.
macro_rules! field_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident($label:literal) {
            $(#[$fmeta:meta])* $first:ident = $first_value:literal,
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[repr(u32)]
        pub enum $name {
            $(#[$fmeta])*
            #[default]
            $first = $first_value,
            $( $(#[$vmeta])* $variant = $value, )*
        }

        impl TryFrom<u32> for $name {
            type Error = $crate::FieldError;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $first_value => Ok(Self::$first),
                    $( $value => Ok(Self::$variant), )*
                    _ => Err($crate::FieldError { field: $label, value }),
                }
            }
        }
    };
}

pub mod counter;
pub mod flags;
pub mod map;
pub mod pll;
pub mod time;
pub mod trigger;

pub use counter::{
    Counter, CounterClock, CounterConfig, CounterMode, CounterStart, HwCounterConfig, OnZero,
    Polarity, Remote,
};
pub use flags::{Command, HardwareType, InterruptMask, IoStatus, Status};
pub use pll::Pll;
pub use time::{CTime, CounterHistory, Time};
pub use trigger::{EventFrame, HwTrigger, Machine, TelegramGroup, Trigger, TriggerCondition};

/// Number of counters, counter 0 is the direct trigger and 1..8 are real.
pub const COUNTERS: usize = 9;

/// Number of hardware interrupt sources.
pub const INTERRUPT_SOURCES: usize = 14;

/// Entries in each of the trigger and configuration RAM tables.
pub const RAM_TABLE_SIZE: usize = 2048;

/// Depth of the incoming event history ring.
pub const HISTORY_TABLE_SIZE: usize = 1024;

/// Number of 16-bit group values in one telegram.
pub const TGM_GROUP_VALUES: usize = 64;

/// Number of machines, hence telegram buffers.
pub const MACHINES: usize = 7;

/// A field value that does not fit the enumeration it encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldError {
    /// Name of the offending field
    pub field: &'static str,
    /// Raw value found
    pub value: u32,
}

impl core::fmt::Display for FieldError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "invalid {} value {}", self.field, self.value)
    }
}

/// Bit-field helpers for the packed hardware words.
///
/// Masks must be non-zero and contiguous.
pub mod field {
    /// Shift `value` into the position described by `mask`.
    pub const fn pack(mask: u32, value: u32) -> u32 {
        (value << mask.trailing_zeros()) & mask
    }

    /// Extract the field described by `mask` from `word`.
    pub const fn unpack(mask: u32, word: u32) -> u32 {
        (word & mask) >> mask.trailing_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::field;

    #[test]
    fn test_field_shift_follows_mask() {
        assert_eq!(field::pack(0xC000_0000, 1), 0x4000_0000);
        assert_eq!(field::pack(0x0000_FFFF, 0x1_2345), 0x2345);
        assert_eq!(field::unpack(0x3800_0000, 0x2800_0000), 5);
        assert_eq!(field::unpack(0x007F_0000, 0xFFFF_FFFF), 0x7F);
    }
}
