//! UTC timestamps and the one-deep counter history.

use crate::EventFrame;

/// UTC second plus HPTDC ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time {
    pub second: u32,
    /// 25/32 ns ticks, zero if no HPTDC is fitted
    pub ticks_hptdc: u32,
}

/// A time together with the millisecond modulo (C-Train) at that time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CTime {
    pub ctrain: u32,
    pub time: Time,
}

impl CTime {
    /// Number of 32-bit words in the hardware representation.
    pub const WORDS: usize = 3;

    pub const fn from_words(words: [u32; 3]) -> Self {
        Self {
            ctrain: words[0],
            time: Time {
                second: words[1],
                ticks_hptdc: words[2],
            },
        }
    }

    pub const fn to_words(self) -> [u32; 3] {
        [self.ctrain, self.time.second, self.time.ticks_hptdc]
    }
}

/// Last trigger seen by a counter.
///
/// The module increments the counter's lock-history flag at each on-zero and
/// does not overwrite the history while the flag is set. The host clears the
/// flag by reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterHistory {
    /// RAM table index of the loading trigger
    pub index: u32,
    /// Frame that fired, wild cards resolved
    pub frame: EventFrame,
    pub trigger_time: CTime,
    pub start_time: CTime,
    pub on_zero_time: CTime,
}

impl CounterHistory {
    /// Number of 32-bit words in the hardware representation.
    pub const WORDS: usize = 2 + 3 * CTime::WORDS;
}
