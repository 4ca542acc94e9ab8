//! # Triggers
//!
//! A trigger is a timing frame, optionally qualified by a telegram condition,
//! that loads one counter with the configuration stored at the same RAM table
//! index. Only the frame and a packed word reach the hardware; the CTIM
//! equipment number is driver bookkeeping.

use crate::{field, Counter, FieldError};

/// A 32-bit timing frame: `Header:8 | Code:8 | Value:16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventFrame(pub u32);

impl EventFrame {
    /// Value that matches any payload.
    pub const WILD: u16 = 0xFFFF;

    pub const fn new(header: u8, code: u8, value: u16) -> Self {
        Self(((header as u32) << 24) | ((code as u32) << 16) | value as u32)
    }

    pub const fn header(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn code(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn value(self) -> u16 {
        self.0 as u16
    }

    pub const fn is_wild(self) -> bool {
        self.value() == Self::WILD
    }

    /// Same header and code carrying a different payload.
    pub const fn with_value(self, value: u16) -> Self {
        Self((self.0 & 0xFFFF_0000) | value as u32)
    }
}

field_enum! {
    /// Telegram test applied when the frame matches.
    pub enum TriggerCondition("trigger condition") {
        /// Do not check the telegram
        NoCheck = 0,
        /// Telegram group must equal the value
        Equality = 1,
        /// Telegram group AND value must be non zero
        And = 2,
    }
}

field_enum! {
    /// Accelerator whose telegram a trigger condition refers to.
    pub enum Machine("machine") {
        None = 0,
        Lhc = 1,
        Sps = 2,
        Cps = 3,
        Psb = 4,
        Lei = 5,
        Ade = 6,
        Machine777 = 7,
    }
}

impl Machine {
    /// Telegram buffer index, `None` has no telegram.
    pub fn telegram_index(self) -> Option<usize> {
        match self {
            Machine::None => None,
            m => Some(m as usize - 1),
        }
    }
}

/// Telegram position and value tested by a trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelegramGroup {
    /// Serial position in the telegram starting at one
    pub number: u16,
    pub value: u16,
}

/// API form of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Trigger {
    /// CTIM equipment number, 0 for PTIM triggers
    pub ctim: u32,
    pub frame: EventFrame,
    pub condition: TriggerCondition,
    pub machine: Machine,
    pub counter: Counter,
    pub group: TelegramGroup,
}

impl Trigger {
    /// Unconditional trigger on counter 0, used for CTIM connections.
    pub const fn direct(ctim: u32, frame: EventFrame) -> Self {
        Self {
            ctim,
            frame,
            condition: TriggerCondition::NoCheck,
            machine: Machine::None,
            counter: Counter::DIRECT,
            group: TelegramGroup { number: 0, value: 0 },
        }
    }

    pub fn to_hw(&self) -> HwTrigger {
        HwTrigger {
            frame: self.frame.0,
            trigger: field::pack(HwTrigger::CONDITION_MASK, self.condition as u32)
                | field::pack(HwTrigger::MACHINE_MASK, self.machine as u32)
                | field::pack(HwTrigger::COUNTER_MASK, self.counter.into())
                | field::pack(HwTrigger::GROUP_NUMBER_MASK, self.group.number as u32)
                | field::pack(HwTrigger::GROUP_VALUE_MASK, self.group.value as u32),
        }
    }
}

/// Packed trigger as stored in the RAM trigger table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HwTrigger {
    pub frame: u32,
    pub trigger: u32,
}

impl HwTrigger {
    pub const CONDITION_MASK: u32 = 0xC000_0000;
    pub const MACHINE_MASK: u32 = 0x3800_0000;
    pub const COUNTER_MASK: u32 = 0x0780_0000;
    pub const GROUP_NUMBER_MASK: u32 = 0x007F_0000;
    pub const GROUP_VALUE_MASK: u32 = 0x0000_FFFF;

    /// Decode the packed words. `ctim` is not stored in hardware and is
    /// supplied by the caller.
    pub fn decode(&self, ctim: u32) -> Result<Trigger, FieldError> {
        let word = self.trigger;
        Ok(Trigger {
            ctim,
            frame: EventFrame(self.frame),
            condition: TriggerCondition::try_from(field::unpack(Self::CONDITION_MASK, word))?,
            machine: Machine::try_from(field::unpack(Self::MACHINE_MASK, word))?,
            counter: Counter::try_from(field::unpack(Self::COUNTER_MASK, word))?,
            group: TelegramGroup {
                number: field::unpack(Self::GROUP_NUMBER_MASK, word) as u16,
                value: field::unpack(Self::GROUP_VALUE_MASK, word) as u16,
            },
        })
    }
}
