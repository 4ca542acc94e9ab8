//! Connections and the event records exchanged with clients.

use ctr_hw::{CTime, EventFrame, FieldError};

/// Kind of object a connection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ConnectionClass {
    /// Hardware interrupt sources, `eqp_num` is a source mask
    #[default]
    Hard = 0,
    /// Incoming timing event
    Ctim = 1,
    /// Local timing object
    Ptim = 2,
}

impl TryFrom<u32> for ConnectionClass {
    type Error = FieldError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectionClass::Hard),
            1 => Ok(ConnectionClass::Ctim),
            2 => Ok(ConnectionClass::Ptim),
            _ => Err(FieldError {
                field: "connection class",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Connection {
    /// Module number, 1 based
    pub module: u32,
    /// What `eqp_num` names
    pub class: ConnectionClass,
    /// CTIM or PTIM equipment number, or an interrupt source mask
    pub eqp_num: u32,
}

impl Connection {
    pub const fn new(module: u32, class: ConnectionClass, eqp_num: u32) -> Self {
        Self {
            module,
            class,
            eqp_num,
        }
    }
}

/// One event delivered to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadBuf {
    pub connection: Connection,
    /// RAM table index of the trigger, 1 based, 0 for hardware sources
    pub trigger_number: u32,
    /// Interrupt source number, 0..8 are counters
    pub interrupt_number: u32,
    /// CTIM equipment number of the trigger
    pub ctim: u32,
    /// Event frame that fired the trigger
    pub frame: EventFrame,
    /// Time the trigger matched
    pub trigger_time: CTime,
    /// Time the counter started
    pub start_time: CTime,
    /// Time the counter reached zero
    pub on_zero_time: CTime,
}

/// Request to simulate an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteBuf {
    /// Trigger number, 0 selects the first trigger of the connection
    pub trigger_number: u32,
    pub connection: Connection,
    /// Frame value used when simulating a CTIM
    pub payload: u32,
}
