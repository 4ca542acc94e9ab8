//! # Argument Encoding
//!
//! Ioctl arguments cross the user boundary as byte buffers of little-endian
//! 32-bit words. [`UserArg`] carries the buffer together with how much of it
//! the caller allowed the driver to read and to write; every access is
//! checked against those bounds before anything is decoded.
//!
//! Each argument structure implements [`Wire`] with a fixed `SIZE`.

use alloc::vec::Vec;

use ctr_hw::{
    CTime, Counter, CounterClock, CounterConfig, CounterHistory, CounterMode, CounterStart,
    EventFrame, HardwareType, Machine, OnZero, Pll, Polarity, Remote, TelegramGroup, Trigger,
    TriggerCondition, TGM_GROUP_VALUES,
};

use crate::error::{CtrError, CtrResult};
use crate::event::{Connection, ConnectionClass, ReadBuf, WriteBuf};
use crate::module::{Action, BoardId, EventHistory, HistoryEntry, ReceptionErrors, Version};
use crate::objects::{CtimBinding, PtimBinding};

// =============================================================================
// USER ARGUMENT
// =============================================================================

/// A caller's ioctl argument buffer.
pub struct UserArg<'a> {
    buf: &'a mut [u8],
    readable: usize,
    writable: usize,
}

impl<'a> UserArg<'a> {
    /// Bounds larger than the buffer are clamped to it.
    pub fn new(buf: &'a mut [u8], readable: usize, writable: usize) -> Self {
        let len = buf.len();
        Self {
            buf,
            readable: readable.min(len),
            writable: writable.min(len),
        }
    }

    pub fn read_write(buf: &'a mut [u8]) -> Self {
        let len = buf.len();
        Self::new(buf, len, len)
    }

    pub fn read_only(buf: &'a mut [u8]) -> Self {
        let len = buf.len();
        Self::new(buf, len, 0)
    }

    pub fn readable(&self) -> usize {
        self.readable
    }

    pub fn writable(&self) -> usize {
        self.writable
    }

    /// Require at least `read` readable and `write` writable bytes.
    pub fn check(&self, read: usize, write: usize) -> CtrResult<()> {
        if self.readable < read || self.writable < write {
            return Err(CtrError::InvalidArgument);
        }
        Ok(())
    }

    /// The first word, the scalar argument of most commands.
    pub fn value(&self) -> CtrResult<u32> {
        self.check(4, 0)?;
        WireReader::new(&self.buf[..self.readable]).u32()
    }

    pub fn put_value(&mut self, value: u32) -> CtrResult<()> {
        self.check(0, 4)?;
        WireWriter::new(&mut self.buf[..self.writable]).u32(value);
        Ok(())
    }

    pub fn get<T: Wire>(&self) -> CtrResult<T> {
        self.check(T::SIZE, 0)?;
        T::decode(&mut WireReader::new(&self.buf[..self.readable]))
    }

    pub fn put<T: Wire>(&mut self, value: &T) -> CtrResult<()> {
        self.check(0, T::SIZE)?;
        value.encode(&mut WireWriter::new(&mut self.buf[..self.writable]));
        Ok(())
    }

    /// A count word followed by the items.
    pub fn put_list<T: Wire>(&mut self, items: &[T]) -> CtrResult<()> {
        self.check(0, 4 + items.len() * T::SIZE)?;
        let mut w = WireWriter::new(&mut self.buf[..self.writable]);
        w.u32(items.len() as u32);
        for item in items {
            item.encode(&mut w);
        }
        Ok(())
    }

    /// Readable bytes, for arguments with a variable tail.
    pub fn reader(&self) -> WireReader<'_> {
        WireReader::new(&self.buf[..self.readable])
    }

    /// Writable bytes, after the caller has checked the size it needs.
    pub fn writer(&mut self) -> WireWriter<'_> {
        WireWriter::new(&mut self.buf[..self.writable])
    }
}

// =============================================================================
// READER / WRITER
// =============================================================================

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn u32(&mut self) -> CtrResult<u32> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + 4)
            .ok_or(CtrError::InvalidArgument)?;
        self.pos += 4;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn u16(&mut self) -> CtrResult<u16> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + 2)
            .ok_or(CtrError::InvalidArgument)?;
        self.pos += 2;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn get<T: Wire>(&mut self) -> CtrResult<T> {
        T::decode(self)
    }
}

/// Writes past the end are dropped; callers size-check first.
pub struct WireWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, bytes: &[u8]) {
        if let Some(dst) = self.buf.get_mut(self.pos..self.pos + bytes.len()) {
            dst.copy_from_slice(bytes);
        }
        self.pos += bytes.len();
    }

    pub fn u32(&mut self, value: u32) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn u16(&mut self, value: u16) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn put<T: Wire>(&mut self, value: &T) {
        value.encode(self);
    }
}

/// Fixed-size wire form of an argument structure.
pub trait Wire: Sized {
    const SIZE: usize;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self>;
    fn encode(&self, w: &mut WireWriter<'_>);
}

impl Wire for u32 {
    const SIZE: usize = 4;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        r.u32()
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(*self);
    }
}

// =============================================================================
// EVENTS
// =============================================================================

impl Wire for Connection {
    const SIZE: usize = 12;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(Connection {
            module: r.u32()?,
            class: ConnectionClass::try_from(r.u32()?)?,
            eqp_num: r.u32()?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.module);
        w.u32(self.class as u32);
        w.u32(self.eqp_num);
    }
}

impl Wire for CTime {
    const SIZE: usize = 12;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(CTime::from_words([r.u32()?, r.u32()?, r.u32()?]))
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        for word in self.to_words() {
            w.u32(word);
        }
    }
}

impl Wire for ReadBuf {
    const SIZE: usize = Connection::SIZE + 16 + 3 * CTime::SIZE;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(ReadBuf {
            connection: r.get()?,
            trigger_number: r.u32()?,
            interrupt_number: r.u32()?,
            ctim: r.u32()?,
            frame: EventFrame(r.u32()?),
            trigger_time: r.get()?,
            start_time: r.get()?,
            on_zero_time: r.get()?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.put(&self.connection);
        w.u32(self.trigger_number);
        w.u32(self.interrupt_number);
        w.u32(self.ctim);
        w.u32(self.frame.0);
        w.put(&self.trigger_time);
        w.put(&self.start_time);
        w.put(&self.on_zero_time);
    }
}

impl Wire for WriteBuf {
    const SIZE: usize = 8 + Connection::SIZE;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(WriteBuf {
            trigger_number: r.u32()?,
            connection: r.get()?,
            payload: r.u32()?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.trigger_number);
        w.put(&self.connection);
        w.u32(self.payload);
    }
}

// =============================================================================
// TRIGGERS AND COUNTERS
// =============================================================================

impl Wire for Trigger {
    const SIZE: usize = 24;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        let ctim = r.u32()?;
        let frame = EventFrame(r.u32()?);
        let condition = TriggerCondition::try_from(r.u32()?)?;
        let machine = Machine::try_from(r.u32()?)?;
        let counter = Counter::try_from(r.u32()?)?;
        let group = r.u32()?;
        Ok(Trigger {
            ctim,
            frame,
            condition,
            machine,
            counter,
            group: TelegramGroup {
                number: group as u16,
                value: (group >> 16) as u16,
            },
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.ctim);
        w.u32(self.frame.0);
        w.u32(self.condition as u32);
        w.u32(self.machine as u32);
        w.u32(self.counter.into());
        w.u32(self.group.number as u32 | (self.group.value as u32) << 16);
    }
}

impl Wire for CounterConfig {
    const SIZE: usize = 24;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        let on_zero = r.u32()?;
        Ok(CounterConfig {
            on_zero: OnZero::from_bits(on_zero).ok_or(CtrError::InvalidArgument)?,
            start: CounterStart::try_from(r.u32()?)?,
            mode: CounterMode::try_from(r.u32()?)?,
            clock: CounterClock::try_from(r.u32()?)?,
            pulse_width: r.u32()?,
            delay: r.u32()?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.on_zero.bits());
        w.u32(self.start as u32);
        w.u32(self.mode as u32);
        w.u32(self.clock as u32);
        w.u32(self.pulse_width);
        w.u32(self.delay);
    }
}

impl Wire for Action {
    const SIZE: usize = 12 + Trigger::SIZE + CounterConfig::SIZE;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(Action {
            trigger_number: r.u32()?,
            eqp_num: r.u32()?,
            eqp_class: ConnectionClass::try_from(r.u32()?)?,
            trigger: r.get()?,
            config: r.get()?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.trigger_number);
        w.u32(self.eqp_num);
        w.u32(self.eqp_class as u32);
        w.put(&self.trigger);
        w.put(&self.config);
    }
}

/// Counter selector with a value, used by the remote control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteBuf {
    pub counter: Counter,
    pub remote: u32,
}

impl RemoteBuf {
    pub fn command(&self) -> Remote {
        Remote::from_bits_truncate(self.remote)
    }
}

impl Wire for RemoteBuf {
    const SIZE: usize = 8;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(RemoteBuf {
            counter: Counter::try_from(r.u32()?)?,
            remote: r.u32()?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.counter.into());
        w.u32(self.remote);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterMaskBuf {
    pub counter: Counter,
    pub mask: u32,
    pub polarity: Polarity,
}

impl Wire for CounterMaskBuf {
    const SIZE: usize = 12;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(CounterMaskBuf {
            counter: Counter::try_from(r.u32()?)?,
            mask: r.u32()?,
            polarity: Polarity::try_from(r.u32()?)?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.counter.into());
        w.u32(self.mask);
        w.u32(self.polarity as u32);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterConfigBuf {
    pub counter: Counter,
    pub config: CounterConfig,
}

impl Wire for CounterConfigBuf {
    const SIZE: usize = 4 + CounterConfig::SIZE;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(CounterConfigBuf {
            counter: Counter::try_from(r.u32()?)?,
            config: r.get()?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.counter.into());
        w.put(&self.config);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterHistoryBuf {
    pub counter: Counter,
    pub history: CounterHistory,
}

impl Wire for CounterHistoryBuf {
    const SIZE: usize = 4 + CounterHistory::WORDS * 4;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(CounterHistoryBuf {
            counter: Counter::try_from(r.u32()?)?,
            history: CounterHistory {
                index: r.u32()?,
                frame: EventFrame(r.u32()?),
                trigger_time: r.get()?,
                start_time: r.get()?,
                on_zero_time: r.get()?,
            },
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.counter.into());
        w.u32(self.history.index);
        w.u32(self.history.frame.0);
        w.put(&self.history.trigger_time);
        w.put(&self.history.start_time);
        w.put(&self.history.on_zero_time);
    }
}

// =============================================================================
// OBJECTS
// =============================================================================

impl Wire for CtimBinding {
    const SIZE: usize = 8;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(CtimBinding {
            eqp_num: r.u32()?,
            frame: EventFrame(r.u32()?),
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.eqp_num);
        w.u32(self.frame.0);
    }
}

/// Packed as `eqp_num`, then module / counter / size in one word, then the
/// start index.
impl Wire for PtimBinding {
    const SIZE: usize = 12;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        let eqp_num = r.u32()?;
        let packed = r.u32()?;
        let start_index = r.u32()?;
        Ok(PtimBinding {
            eqp_num,
            module_index: packed as u8,
            counter: Counter::try_from((packed >> 8) & 0xFF)?,
            size: (packed >> 16) as u16,
            start_index: start_index as u16,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        let counter: u32 = self.counter.into();
        w.u32(self.eqp_num);
        w.u32(self.module_index as u32 | counter << 8 | (self.size as u32) << 16);
        w.u32(self.start_index as u32);
    }
}

// =============================================================================
// MODULE INFORMATION
// =============================================================================

impl Wire for Version {
    const SIZE: usize = 12;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(Version {
            vhdl: r.u32()?,
            driver: r.u32()?,
            hardware: HardwareType::try_from(r.u32()?)?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.vhdl);
        w.u32(self.driver);
        w.u32(self.hardware as u32);
    }
}

impl Wire for Pll {
    const SIZE: usize = 32;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        let mut words = [0u32; 8];
        for word in words.iter_mut() {
            *word = r.u32()?;
        }
        Ok(Pll::from_words(words))
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        for word in self.to_words() {
            w.u32(word);
        }
    }
}

impl Wire for ReceptionErrors {
    const SIZE: usize = 24;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(ReceptionErrors {
            last_reset: r.u32()?,
            parity: r.u32()?,
            sync: r.u32()?,
            total: r.u32()?,
            code_violation: r.u32()?,
            queue: r.u32()?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.last_reset);
        w.u32(self.parity);
        w.u32(self.sync);
        w.u32(self.total);
        w.u32(self.code_violation);
        w.u32(self.queue);
    }
}

impl Wire for BoardId {
    const SIZE: usize = 8;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(BoardId {
            lsl: r.u32()?,
            msl: r.u32()?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.lsl);
        w.u32(self.msl);
    }
}

impl Wire for HistoryEntry {
    const SIZE: usize = 4 + CTime::SIZE;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(HistoryEntry {
            frame: EventFrame(r.u32()?),
            time: r.get()?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.frame.0);
        w.put(&self.time);
    }
}

impl EventHistory {
    /// Bytes taken by the index word and the entries.
    pub fn wire_size(&self) -> usize {
        4 + self.entries.len() * HistoryEntry::SIZE
    }

    pub fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.index);
        for entry in &self.entries {
            w.put(entry);
        }
    }
}

/// Machine selector and its telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TgmBuf {
    pub machine: Machine,
    pub groups: [u16; TGM_GROUP_VALUES],
}

impl Wire for TgmBuf {
    const SIZE: usize = 4 + TGM_GROUP_VALUES * 2;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        let machine = Machine::try_from(r.u32()?)?;
        let mut groups = [0u16; TGM_GROUP_VALUES];
        for group in groups.iter_mut() {
            *group = r.u16()?;
        }
        Ok(TgmBuf { machine, groups })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.machine as u32);
        for group in self.groups {
            w.u16(group);
        }
    }
}

/// Header of a raw register transfer; `size` data words follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawIo {
    pub size: u32,
    /// Word offset into the module map
    pub offset: u32,
}

impl RawIo {
    pub fn total_size(&self) -> Option<usize> {
        (self.size as usize).checked_mul(4)?.checked_add(Self::SIZE)
    }
}

impl Wire for RawIo {
    const SIZE: usize = 8;

    fn decode(r: &mut WireReader<'_>) -> CtrResult<Self> {
        Ok(RawIo {
            size: r.u32()?,
            offset: r.u32()?,
        })
    }

    fn encode(&self, w: &mut WireWriter<'_>) {
        w.u32(self.size);
        w.u32(self.offset);
    }
}

/// Encode `pid`, a count and the connections.
pub fn encode_client_connections(w: &mut WireWriter<'_>, pid: u32, connections: &[Connection]) {
    w.u32(pid);
    w.u32(connections.len() as u32);
    for conx in connections {
        w.put(conx);
    }
}

/// Read `n` words following a header.
pub fn read_words(r: &mut WireReader<'_>, n: usize) -> CtrResult<Vec<u32>> {
    (0..n).map(|_| r.u32()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_enforced() {
        let mut buf = [0u8; 12];
        let mut arg = UserArg::new(&mut buf, 8, 4);

        assert_eq!(arg.get::<Connection>(), Err(CtrError::InvalidArgument));
        assert_eq!(arg.put(&Connection::default()), Err(CtrError::InvalidArgument));
        assert!(arg.put_value(7).is_ok());
        assert_eq!(arg.value(), Ok(7));
        assert_eq!(UserArg::new(&mut [0u8; 2], 9, 9).readable(), 2);
    }

    #[test]
    fn test_connection_layout() {
        let mut buf = [0u8; 12];
        buf[0] = 2;
        buf[4] = 1;
        buf[8..12].copy_from_slice(&0x1234u32.to_le_bytes());
        let arg = UserArg::read_only(&mut buf);

        assert_eq!(
            arg.get::<Connection>(),
            Ok(Connection::new(2, ConnectionClass::Ctim, 0x1234))
        );
    }

    #[test]
    fn test_bad_enum_value_rejected() {
        let mut buf = [0u8; 12];
        buf[4] = 3;
        let arg = UserArg::read_only(&mut buf);
        assert_eq!(arg.get::<Connection>(), Err(CtrError::InvalidArgument));
    }

    #[test]
    fn test_structure_sizes() {
        assert_eq!(ReadBuf::SIZE, 64);
        assert_eq!(WriteBuf::SIZE, 20);
        assert_eq!(Action::SIZE, 60);
        assert_eq!(TgmBuf::SIZE, 132);
        assert_eq!(CounterHistoryBuf::SIZE, 48);
    }

    #[test]
    fn test_ptim_binding_packing() {
        let binding = PtimBinding {
            eqp_num: 42,
            module_index: 1,
            counter: Counter::new(3).expect("valid counter"),
            size: 300,
            start_index: 7,
        };
        let mut buf = [0u8; 12];
        let mut arg = UserArg::read_write(&mut buf);
        arg.put(&binding).expect("put");

        assert_eq!(&buf[4..8], &(1u32 | 3 << 8 | 300 << 16).to_le_bytes());
        let arg = UserArg::read_only(&mut buf);
        assert_eq!(arg.get::<PtimBinding>(), Ok(binding));
    }

    #[test]
    fn test_list_needs_room_for_every_item() {
        let items = [
            CtimBinding {
                eqp_num: 1,
                frame: EventFrame(2),
            },
            CtimBinding {
                eqp_num: 3,
                frame: EventFrame(4),
            },
        ];
        let mut small = [0u8; 12];
        assert!(UserArg::read_write(&mut small).put_list(&items).is_err());

        let mut buf = [0u8; 20];
        UserArg::read_write(&mut buf).put_list(&items).expect("list");
        assert_eq!(&buf[0..4], &2u32.to_le_bytes());
        assert_eq!(&buf[12..16], &3u32.to_le_bytes());
    }
}
