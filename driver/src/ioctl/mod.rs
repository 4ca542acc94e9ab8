//! # Control Interface
//!
//! Numbered control commands, the way user space drives everything that is
//! not `read` or `write`. [`Driver::ioctl`] validates the caller and the
//! argument bounds, then forwards to the typed operations on [`Driver`] and
//! [`ModuleContext`](crate::module::ModuleContext).
//!
//! Commands that belong to board programming, diagnostics or a particular
//! bus are recognised but refused with `InvalidArgument`.

pub mod wire;

use alloc::vec;

use core::sync::atomic::Ordering;

use ctr_hw::{CTime, Counter, Machine, Pll};

use crate::client::ClientId;
use crate::driver::Driver;
use crate::error::{CtrError, CtrResult};
use crate::event::Connection;
use crate::module::Action;
use crate::objects::{CtimBinding, PtimBinding};
use crate::platform::Platform;
use crate::DEBUG_ISR;

pub use wire::UserArg;
use wire::{
    encode_client_connections, read_words, CounterConfigBuf, CounterHistoryBuf, CounterMaskBuf,
    RawIo, RemoteBuf, TgmBuf, Wire,
};

macro_rules! control_functions {
    ($( $(#[$meta:meta])* $variant:ident = $value:literal, )*) => {
        /// Control command numbers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum ControlFunction {
            $( $(#[$meta])* $variant = $value, )*
        }

        impl ControlFunction {
            pub const fn name(self) -> &'static str {
                match self {
                    $( ControlFunction::$variant => stringify!($variant), )*
                }
            }
        }

        impl TryFrom<u32> for ControlFunction {
            type Error = CtrError;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok(ControlFunction::$variant), )*
                    _ => Err(CtrError::InvalidArgument),
                }
            }
        }
    };
}

control_functions! {
    SetSwDebug = 0,
    GetSwDebug = 1,
    GetVersion = 2,
    SetTimeout = 3,
    GetTimeout = 4,
    /// Non-zero turns queueing off
    SetQueueFlag = 5,
    GetQueueFlag = 6,
    GetQueueSize = 7,
    /// Read and clear
    GetQueueOverflow = 8,
    GetModuleDescriptor = 9,
    SetModule = 10,
    GetModule = 11,
    GetModuleCount = 12,
    Reset = 13,
    Enable = 14,
    GetStatus = 15,
    GetInputDelay = 16,
    SetInputDelay = 17,
    GetClientList = 18,
    Connect = 19,
    Disconnect = 20,
    GetClientConnections = 21,
    SetUtc = 22,
    GetUtc = 23,
    GetCableId = 24,
    GetAction = 25,
    SetAction = 26,
    CreateCtimObject = 27,
    DestroyCtimObject = 28,
    ListCtimObjects = 29,
    ChangeCtimFrame = 30,
    CreatePtimObject = 31,
    DestroyPtimObject = 32,
    ListPtimObjects = 33,
    GetPtimBinding = 34,
    GetOutMask = 35,
    SetOutMask = 36,
    GetCounterHistory = 37,
    GetRemote = 38,
    SetRemote = 39,
    Remote = 40,
    GetConfig = 41,
    SetConfig = 42,
    GetPll = 43,
    SetPll = 44,
    SetPllAsyncPeriod = 45,
    GetPllAsyncPeriod = 46,
    ReadTelegram = 47,
    ReadEventHistory = 48,
    JtagOpenFile = 49,
    JtagReadByte = 50,
    JtagWriteByte = 51,
    JtagCloseFile = 52,
    HptdcOpen = 53,
    HptdcIo = 54,
    HptdcClose = 55,
    RawRead = 56,
    RawWrite = 57,
    GetReceptionErrors = 58,
    GetIoStatus = 59,
    GetIdentity = 60,
    SetDebugHistory = 61,
    SetBrutalPll = 62,
    GetModuleStats = 63,
    SetCableId = 64,
}

impl<P: Platform> Driver<P> {
    /// Run control command `cmd` for client `id`.
    pub fn ioctl(&self, id: ClientId, cmd: u32, arg: Option<&mut UserArg<'_>>) -> CtrResult<()> {
        if arg.as_ref().is_some_and(|a| a.readable() < 4) {
            return Err(CtrError::InvalidArgument);
        }
        let client = self.clients.get(id.index()).ok_or(CtrError::NoDevice)?;
        let debug = client.state.with(|s| s.in_use.then_some(s.debug));
        let Some(debug) = debug else {
            return Err(CtrError::NotOpen);
        };
        if !self.is_installed() {
            return Err(CtrError::NoDevice);
        }

        let func = ControlFunction::try_from(cmd);
        if debug != 0 {
            match func {
                Ok(f) => log::debug!("ctr: client {} ioctl {}", id.minor(), f.name()),
                Err(_) => log::debug!("ctr: client {} ioctl {} unknown", id.minor(), cmd),
            }
        }
        let func = func?;

        match arg {
            Some(arg) => self.dispatch(id, func, arg),
            None => self.dispatch(id, func, &mut UserArg::new(&mut [], 0, 0)),
        }
    }

    fn dispatch(&self, id: ClientId, func: ControlFunction, arg: &mut UserArg<'_>) -> CtrResult<()> {
        use ControlFunction as F;

        let client = self.open_client(id)?;
        let module_index = client.state.with(|s| s.module);
        let module = self.module(module_index).ok_or(CtrError::NoDevice)?;

        match func {
            // ----- client settings -----
            F::SetSwDebug => {
                let value = arg.value()?;
                let isr = value == DEBUG_ISR;
                client.state.with(|s| s.debug = if isr { 0 } else { value });
                self.debug_isr.store(isr, Ordering::Relaxed);
                Ok(())
            }
            F::GetSwDebug => arg.put_value(client.state.with(|s| s.debug)),
            F::SetTimeout => {
                let value = arg.value()?;
                client.state.with(|s| s.timeout = value);
                Ok(())
            }
            F::GetTimeout => arg.put_value(client.state.with(|s| s.timeout)),
            F::SetQueueFlag => {
                let off = arg.value()? != 0;
                client.state.with(|s| s.queue_off = off);
                Ok(())
            }
            F::GetQueueFlag => arg.put_value(client.state.with(|s| s.queue_off as u32)),
            F::GetQueueSize => arg.put_value(client.state.with(|s| s.queue.len() as u32)),
            F::GetQueueOverflow => {
                arg.check(0, 4)?;
                arg.put_value(client.state.with(|s| s.queue.take_missed()))
            }
            F::SetModule => {
                let number = arg.value()? as usize;
                if number == 0 || number > self.module_count() {
                    return Err(CtrError::InvalidArgument);
                }
                client.state.with(|s| s.module = number - 1);
                Ok(())
            }
            F::GetModule => arg.put_value(module_index as u32 + 1),
            F::GetModuleCount => arg.put_value(self.module_count() as u32),
            F::GetClientList => arg.put_list(&self.client_pids()),

            // ----- connections -----
            F::Connect => self.connect(id, &arg.get::<Connection>()?),
            F::Disconnect => {
                let conx = arg.get::<Connection>()?;
                if conx.eqp_num == 0 {
                    self.disconnect_all(id);
                    Ok(())
                } else {
                    self.disconnect(id, &conx)
                }
            }
            F::GetClientConnections => {
                let pid = arg.value()?;
                let connections = self.client_connections(pid);
                arg.check(4, 8 + connections.len() * Connection::SIZE)?;
                encode_client_connections(&mut arg.writer(), pid, &connections);
                Ok(())
            }

            // ----- module -----
            F::GetVersion => arg.put(&module.version()?),
            F::Reset => self.reset_module(module_index),
            F::Enable => {
                module.enable(arg.value()?);
                Ok(())
            }
            F::GetStatus => {
                arg.check(0, 4)?;
                arg.put_value(module.status()?.bits())
            }
            F::GetInputDelay => {
                arg.check(0, 4)?;
                arg.put_value(module.input_delay()?)
            }
            F::SetInputDelay => module.set_input_delay(arg.value()?),
            F::SetUtc => module.set_utc(arg.value()?),
            F::GetUtc => {
                arg.check(0, CTime::SIZE)?;
                arg.put(&module.utc())
            }
            F::GetCableId => {
                arg.check(0, 4)?;
                arg.put_value(module.cable_id()?)
            }
            F::SetCableId => {
                module.set_cable_id(arg.value()?);
                Ok(())
            }
            F::GetAction => {
                let trigger_number = arg.value()?;
                arg.check(4, Action::SIZE)?;
                arg.put(&module.action(trigger_number)?)
            }
            F::SetAction => module.set_action(&arg.get::<Action>()?),

            // ----- timing objects -----
            F::CreateCtimObject => self.create_ctim(arg.get::<CtimBinding>()?),
            F::DestroyCtimObject => self.destroy_ctim(arg.value()?),
            F::ListCtimObjects => arg.put_list(&self.list_ctim()),
            F::ChangeCtimFrame => self.change_ctim_frame(arg.get::<CtimBinding>()?),
            F::CreatePtimObject => {
                let created = self.create_ptim(arg.get::<PtimBinding>()?)?;
                if arg.writable() >= PtimBinding::SIZE {
                    arg.put(&created)?;
                }
                Ok(())
            }
            F::DestroyPtimObject => self.destroy_ptim(arg.value()?),
            F::ListPtimObjects => arg.put_list(&self.list_ptim()),
            F::GetPtimBinding => {
                let eqp_num = arg.value()?;
                arg.check(4, PtimBinding::SIZE)?;
                arg.put(&self.ptim_binding(eqp_num)?)
            }

            // ----- counters -----
            F::GetOutMask => {
                let counter = Counter::try_from(arg.value()?)?;
                arg.check(4, CounterMaskBuf::SIZE)?;
                let (mask, polarity) = module.out_mask(counter)?;
                arg.put(&CounterMaskBuf {
                    counter,
                    mask,
                    polarity,
                })
            }
            F::SetOutMask => {
                let buf = arg.get::<CounterMaskBuf>()?;
                module.set_out_mask(buf.counter, buf.mask, buf.polarity)
            }
            F::GetCounterHistory => {
                let counter = Counter::try_from(arg.value()?)?;
                arg.check(4, CounterHistoryBuf::SIZE)?;
                let history = module.counter_history(counter)?;
                arg.put(&CounterHistoryBuf { counter, history })
            }
            F::GetRemote => {
                let counter = Counter::try_from(arg.value()?)?;
                arg.check(4, RemoteBuf::SIZE)?;
                let remote = module.remote(counter)? as u32;
                arg.put(&RemoteBuf { counter, remote })
            }
            F::SetRemote => {
                let buf = arg.get::<RemoteBuf>()?;
                module.set_remote(buf.counter, buf.remote != 0)
            }
            F::Remote => {
                let buf = arg.get::<RemoteBuf>()?;
                module.remote_command(buf.counter, buf.command())
            }
            F::GetConfig => {
                let counter = Counter::try_from(arg.value()?)?;
                arg.check(4, CounterConfigBuf::SIZE)?;
                let config = module.counter_config(counter)?;
                arg.put(&CounterConfigBuf { counter, config })
            }
            F::SetConfig => {
                let buf = arg.get::<CounterConfigBuf>()?;
                module.set_counter_config(buf.counter, &buf.config)
            }

            // ----- PLL -----
            F::GetPll => {
                arg.check(0, Pll::SIZE)?;
                arg.put(&module.pll()?)
            }
            F::SetPll => module.set_pll(&arg.get::<Pll>()?),
            F::SetPllAsyncPeriod => module.set_pll_async_period(f32::from_bits(arg.value()?)),
            F::GetPllAsyncPeriod => {
                arg.check(0, 4)?;
                arg.put_value(module.pll_async_period().to_bits())
            }

            // ----- diagnostics -----
            F::ReadTelegram => {
                let machine = arg.value()?;
                arg.check(4, TgmBuf::SIZE)?;
                let machine = Machine::try_from(machine)?;
                let groups = module.telegram(machine)?;
                arg.put(&TgmBuf { machine, groups })
            }
            F::ReadEventHistory => {
                let history = module.event_history()?;
                arg.check(0, history.wire_size())?;
                history.encode(&mut arg.writer());
                Ok(())
            }
            F::RawRead => {
                let header = arg.get::<RawIo>()?;
                let total = header.total_size().ok_or(CtrError::InvalidArgument)?;
                arg.check(RawIo::SIZE, total)?;
                let mut words = vec![0u32; header.size as usize];
                module.raw_read(header.offset, &mut words)?;
                let mut w = arg.writer();
                w.put(&header);
                for word in words {
                    w.u32(word);
                }
                Ok(())
            }
            F::RawWrite => {
                let header = arg.get::<RawIo>()?;
                let total = header.total_size().ok_or(CtrError::InvalidArgument)?;
                arg.check(total, 0)?;
                let mut r = arg.reader();
                r.get::<RawIo>()?;
                let words = read_words(&mut r, header.size as usize)?;
                module.raw_write(header.offset, &words)
            }
            F::GetReceptionErrors => arg.put(&module.reception_errors()?),
            F::GetIoStatus => {
                arg.check(0, 4)?;
                arg.put_value(module.io_status()?.bits())
            }
            F::GetIdentity => arg.put(&module.identity()?),
            F::SetDebugHistory => {
                module.set_debug_history(arg.value()? != 0);
                Ok(())
            }
            F::SetBrutalPll => {
                module.set_brutal_pll(arg.value()? != 0);
                Ok(())
            }

            F::GetModuleDescriptor
            | F::JtagOpenFile
            | F::JtagReadByte
            | F::JtagWriteByte
            | F::JtagCloseFile
            | F::HptdcOpen
            | F::HptdcIo
            | F::HptdcClose
            | F::GetModuleStats => Err(CtrError::InvalidArgument),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::driver;
    use crate::event::ConnectionClass;
    use alloc::vec;
    use alloc::vec::Vec;
    use ctr_hw::EventFrame;

    fn words(ws: &[u32], len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        for (i, w) in ws.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        buf
    }

    fn word(buf: &[u8], i: usize) -> u32 {
        u32::from_le_bytes([buf[i * 4], buf[i * 4 + 1], buf[i * 4 + 2], buf[i * 4 + 3]])
    }

    #[test]
    fn test_caller_checks() {
        let (_sims, driver) = driver(1);
        let mut short = [0u8; 2];
        let a = driver.open(1).expect("open");

        let arg = &mut UserArg::read_write(&mut short);
        assert_eq!(driver.ioctl(a, 3, Some(arg)), Err(CtrError::InvalidArgument));
        assert_eq!(driver.ioctl(ClientId(40), 4, None), Err(CtrError::NoDevice));
        assert_eq!(driver.ioctl(ClientId(5), 4, None), Err(CtrError::NotOpen));

        driver.uninstall();
        assert_eq!(driver.ioctl(a, 4, None), Err(CtrError::NotOpen));
    }

    #[test]
    fn test_excluded_and_unknown_commands() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        for cmd in [9, 49, 52, 55, 63, 65, 70, 84, 1000] {
            let mut buf = [0u8; 64];
            let arg = &mut UserArg::read_write(&mut buf);
            assert_eq!(driver.ioctl(a, cmd, Some(arg)), Err(CtrError::InvalidArgument));
        }
    }

    #[test]
    fn test_timeout_round_trip() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");

        let mut buf = words(&[250], 4);
        driver
            .ioctl(a, ControlFunction::SetTimeout as u32, Some(&mut UserArg::read_only(&mut buf)))
            .expect("set");
        let mut out = [0u8; 4];
        driver
            .ioctl(a, ControlFunction::GetTimeout as u32, Some(&mut UserArg::read_write(&mut out)))
            .expect("get");
        assert_eq!(word(&out, 0), 250);

        let mut ro = [0u8; 4];
        assert_eq!(
            driver.ioctl(a, ControlFunction::GetTimeout as u32, Some(&mut UserArg::read_only(&mut ro))),
            Err(CtrError::InvalidArgument)
        );
    }

    #[test]
    fn test_select_module() {
        let (_sims, driver) = driver(2);
        let a = driver.open(1).expect("open");

        for bad in [0u32, 3] {
            let mut buf = words(&[bad], 4);
            let arg = &mut UserArg::read_only(&mut buf);
            assert_eq!(
                driver.ioctl(a, ControlFunction::SetModule as u32, Some(arg)),
                Err(CtrError::InvalidArgument)
            );
        }
        let mut buf = words(&[2], 4);
        driver
            .ioctl(a, ControlFunction::SetModule as u32, Some(&mut UserArg::read_only(&mut buf)))
            .expect("set module");

        let mut out = [0u8; 4];
        driver
            .ioctl(a, ControlFunction::GetModule as u32, Some(&mut UserArg::read_write(&mut out)))
            .expect("get module");
        assert_eq!(word(&out, 0), 2);
        driver
            .ioctl(a, ControlFunction::GetModuleCount as u32, Some(&mut UserArg::read_write(&mut out)))
            .expect("count");
        assert_eq!(word(&out, 0), 2);
    }

    #[test]
    fn test_sw_debug_switches_isr_logging() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");

        let mut buf = words(&[DEBUG_ISR], 4);
        driver
            .ioctl(a, ControlFunction::SetSwDebug as u32, Some(&mut UserArg::read_write(&mut buf)))
            .expect("set");
        assert!(driver.debug_isr.load(Ordering::Relaxed));
        driver
            .ioctl(a, ControlFunction::GetSwDebug as u32, Some(&mut UserArg::read_write(&mut buf)))
            .expect("get");
        assert_eq!(word(&buf, 0), 0);

        let mut buf = words(&[3], 4);
        driver
            .ioctl(a, ControlFunction::SetSwDebug as u32, Some(&mut UserArg::read_write(&mut buf)))
            .expect("set");
        assert!(!driver.debug_isr.load(Ordering::Relaxed));
    }

    #[test]
    fn test_connect_and_list_connections() {
        let (_sims, driver) = driver(1);
        driver.platform().set_pid(77);
        let a = driver.open(1).expect("open");

        let mut buf = words(&[1, ConnectionClass::Hard as u32, 0x0800], 12);
        driver
            .ioctl(a, ControlFunction::Connect as u32, Some(&mut UserArg::read_only(&mut buf)))
            .expect("connect");

        let mut out = words(&[77], 8 + 12);
        driver
            .ioctl(
                a,
                ControlFunction::GetClientConnections as u32,
                Some(&mut UserArg::read_write(&mut out)),
            )
            .expect("connections");
        assert_eq!(word(&out, 0), 77);
        assert_eq!(word(&out, 1), 1);
        assert_eq!(word(&out, 4), 0x0800);

        let mut all = words(&[1, ConnectionClass::Hard as u32, 0], 12);
        driver
            .ioctl(a, ControlFunction::Disconnect as u32, Some(&mut UserArg::read_only(&mut all)))
            .expect("disconnect all");
        assert!(driver.client_connections(77).is_empty());
    }

    #[test]
    fn test_ctim_objects_through_ioctl() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        let frame = EventFrame::new(0x21, 0x10, EventFrame::WILD);

        let mut buf = words(&[500, frame.0], 8);
        driver
            .ioctl(a, ControlFunction::CreateCtimObject as u32, Some(&mut UserArg::read_only(&mut buf)))
            .expect("create");

        let mut list = [0u8; 12];
        driver
            .ioctl(a, ControlFunction::ListCtimObjects as u32, Some(&mut UserArg::read_write(&mut list)))
            .expect("list");
        assert_eq!(word(&list, 0), 1);
        assert_eq!(word(&list, 1), 500);
        assert_eq!(word(&list, 2), frame.0);

        let mut eqp = words(&[500], 4);
        driver
            .ioctl(a, ControlFunction::DestroyCtimObject as u32, Some(&mut UserArg::read_only(&mut eqp)))
            .expect("destroy");
        assert!(driver.list_ctim().is_empty());
    }

    #[test]
    fn test_create_ptim_returns_start_index() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        driver
            .create_ptim(PtimBinding {
                eqp_num: 1,
                module_index: 0,
                counter: Counter::new(1).expect("valid counter"),
                size: 4,
                start_index: 0,
            })
            .expect("first");

        let mut buf = words(&[2, 2 << 8 | 3 << 16, 0], 12);
        driver
            .ioctl(a, ControlFunction::CreatePtimObject as u32, Some(&mut UserArg::read_write(&mut buf)))
            .expect("create");
        assert_eq!(word(&buf, 2), 4);

        let mut query = words(&[2], 12);
        driver
            .ioctl(a, ControlFunction::GetPtimBinding as u32, Some(&mut UserArg::read_write(&mut query)))
            .expect("binding");
        assert_eq!(word(&query, 1), 2 << 8 | 3 << 16);
        assert_eq!(word(&query, 2), 4);
    }

    #[test]
    fn test_raw_io_bounds() {
        let (sims, driver) = driver(1);
        let a = driver.open(1).expect("open");

        let mut buf = words(&[2, 5, 0xAAAA, 0xBBBB], 16);
        driver
            .ioctl(a, ControlFunction::RawWrite as u32, Some(&mut UserArg::read_only(&mut buf)))
            .expect("write");
        assert_eq!(sims[0].peek(0x14), 0xAAAA);

        let mut short = words(&[2, 5], 12);
        assert_eq!(
            driver.ioctl(a, ControlFunction::RawRead as u32, Some(&mut UserArg::read_write(&mut short))),
            Err(CtrError::InvalidArgument)
        );

        let mut out = words(&[2, 5], 16);
        driver
            .ioctl(a, ControlFunction::RawRead as u32, Some(&mut UserArg::read_write(&mut out)))
            .expect("read");
        assert_eq!(word(&out, 2), 0xAAAA);
        assert_eq!(word(&out, 3), 0xBBBB);
    }

    #[test]
    fn test_pll_async_period_is_stored() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");

        let mut buf = words(&[25.5f32.to_bits()], 4);
        driver
            .ioctl(a, ControlFunction::SetPllAsyncPeriod as u32, Some(&mut UserArg::read_write(&mut buf)))
            .expect("set");
        let mut out = [0u8; 4];
        driver
            .ioctl(a, ControlFunction::GetPllAsyncPeriod as u32, Some(&mut UserArg::read_write(&mut out)))
            .expect("get");
        assert_eq!(f32::from_bits(word(&out, 0)), 25.5);

        let mut bad = words(&[(-1.0f32).to_bits()], 4);
        assert_eq!(
            driver.ioctl(a, ControlFunction::SetPllAsyncPeriod as u32, Some(&mut UserArg::read_only(&mut bad))),
            Err(CtrError::InvalidArgument)
        );
    }

    #[test]
    fn test_queue_overflow_read_and_clear() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        let client = driver.client(a).expect("client");
        for _ in 0..crate::QUEUE_SIZE + 3 {
            client.deliver(crate::event::ReadBuf::default());
        }

        let mut out = [0u8; 4];
        let cmd = ControlFunction::GetQueueOverflow as u32;
        driver.ioctl(a, cmd, Some(&mut UserArg::read_write(&mut out))).expect("overflow");
        assert_eq!(word(&out, 0), 3);
        driver.ioctl(a, cmd, Some(&mut UserArg::read_write(&mut out))).expect("overflow");
        assert_eq!(word(&out, 0), 0);
    }
}
