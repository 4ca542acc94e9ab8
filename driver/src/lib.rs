//! # CTR Driver Core
//!
//! Host side of the CTR timing receiver: one [`Driver`] owns every installed
//! module and every open client. Clients connect to hardware interrupt
//! sources or to timing objects, the interrupt service routine turns module
//! interrupts into queued events, and clients block in `read` until one
//! arrives.
//!
//! ## Architecture
//!
//! ```text
//! +-----------+    ioctl    +-------------------+
//! |  clients  | ----------> | Driver            |
//! | (minors)  | <---------- |  connect, objects |
//! +-----------+    read     |  isr, file ops    |
//!                           +---------+---------+
//!                                     | ModuleIo
//!                           +---------v---------+
//!                           |  RegisterBus      |
//!                           +-------------------+
//! ```
//!
//! The OS supplies a [`Platform`] (clock, signals, pids) and one
//! [`RegisterBus`] per module. [`bus::sim::SimulatedBus`] and
//! [`VirtualPlatform`] stand in for both on a host.

#![no_std]

extern crate alloc;

pub mod bus;
pub mod client;
pub mod clients;
pub mod config;
pub mod connect;
pub mod driver;
pub mod error;
pub mod event;
pub mod file;
pub mod ioctl;
pub mod isr;
pub mod module;
pub mod objects;
pub mod platform;
pub mod queue;
pub mod sync;
pub mod timer;

pub use bus::{ModuleIo, RegisterBus, Width};
pub use client::{ClientContext, ClientId};
pub use clients::ClientSet;
pub use config::{DriverConfig, Endian};
pub use driver::Driver;
pub use error::{BusError, CtrError, CtrResult};
pub use event::{Connection, ConnectionClass, ReadBuf, WriteBuf};
pub use ioctl::{ControlFunction, UserArg};
pub use isr::IrqReturn;
pub use module::{Action, ModuleContext, SlotOwner, TriggerSlot};
pub use objects::{CtimBinding, PtimBinding};
pub use platform::{Platform, VirtualPlatform};
pub use sync::InterruptControl;

// =============================================================================
// LIMITS
// =============================================================================

/// Open files, and bits in a [`ClientSet`].
pub const CLIENT_CONTEXTS: usize = 16;

/// Modules one driver instance can drive.
pub const MODULE_CONTEXTS: usize = 16;

/// Events held per client before the oldest is dropped.
pub const QUEUE_SIZE: usize = 64;

/// Default read timeout in 10 ms ticks.
pub const DEFAULT_TIMEOUT: u32 = 2000;

pub const CTIM_OBJECTS: usize = 2048;
pub const PTIM_OBJECTS: usize = 2048;

/// Entries returned by a client connection listing.
pub const CONNECTIONS: usize = 512;

/// Bus errors remembered per module.
pub const MAX_BUS_ERROR_COUNT: u32 = 100;

/// Software debug level that turns on ISR logging.
pub const DEBUG_ISR: u32 = 0xFFFF;

pub const DRIVER_VERSION: u32 = 0x0000_0100;
