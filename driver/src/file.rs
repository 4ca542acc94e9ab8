//! # File Operations
//!
//! Each minor device is one client context. `read` blocks until an event is
//! queued, the client's timeout expires, a signal arrives or the driver is
//! uninstalled. `write` injects an event as if the module had interrupted.

use ctr_hw::InterruptMask;

use crate::client::ClientId;
use crate::clients::ClientSet;
use crate::driver::Driver;
use crate::error::{CtrError, CtrResult};
use crate::event::{ConnectionClass, ReadBuf, WriteBuf};
use crate::module::SlotOwner;
use crate::platform::Platform;
use crate::sync::Wake;
use crate::timer::TimerTarget;

impl<P: Platform> Driver<P> {
    /// Open minor device `minor`, 1 based.
    pub fn open(&self, minor: u32) -> CtrResult<ClientId> {
        if !self.is_installed() {
            return Err(CtrError::NoDevice);
        }
        let index = (minor as usize)
            .checked_sub(1)
            .filter(|&i| i < self.clients.len())
            .ok_or(CtrError::BadAddress)?;
        let client = &self.clients[index];
        let pid = self.platform.current_pid();
        let timeout = self.config.default_timeout;

        client.state.with(|s| {
            if s.in_use {
                return Err(CtrError::Busy);
            }
            s.open(pid, timeout);
            client.semaphore.reset();
            Ok(())
        })?;
        Ok(client.id())
    }

    /// Close a client, dropping its connections and any pending read timer.
    ///
    /// Connections go first: the context stays in use until they are gone, so
    /// a new open of the same minor cannot lose its own connections to them.
    pub fn close(&self, id: ClientId) -> CtrResult<()> {
        let client = self.clients.get(id.index()).ok_or(CtrError::NotOpen)?;
        if !client.is_open() {
            return Err(CtrError::NotOpen);
        }
        self.disconnect_all(id);

        client.state.with(|s| {
            if !s.in_use {
                return Err(CtrError::NotOpen);
            }
            if let Some(timer) = s.timer.take() {
                self.timers.with(|t| t.cancel(timer));
            }
            s.in_use = false;
            s.queue.reset();
            client.semaphore.reset();
            Ok(())
        })
    }

    /// Wait for the next event.
    pub fn read(&self, id: ClientId) -> CtrResult<ReadBuf> {
        let client = self.open_client(id)?;

        let (ticket, timed) = client.state.with(|s| {
            if !s.in_use {
                return Err(CtrError::NotOpen);
            }
            if s.queue_off {
                s.queue.reset();
                client.semaphore.reset();
            }
            let ticket = client.semaphore.ticket();
            if let Some(old) = s.timer.take() {
                self.timers.with(|t| t.cancel(old));
            }
            if s.timeout == 0 {
                return Ok((ticket, false));
            }
            let now = self.platform.ticks();
            let timer = self
                .timers
                .with(|t| t.arm(now, s.timeout as u64, TimerTarget::Client(id.index())))
                .ok_or(CtrError::Busy)?;
            s.timer = Some(timer);
            Ok((ticket, true))
        })?;

        let wake = client.semaphore.wait(ticket, &self.platform, || self.tick());
        let timer = client.state.with(|s| s.timer.take());
        if let Some(timer) = timer {
            self.timers.with(|t| t.cancel(timer));
        }

        if !self.is_installed() || wake == Wake::Interrupted {
            return Err(CtrError::Interrupted);
        }
        if timed && timer.is_none() && wake != Wake::Signalled {
            return Err(CtrError::TimedOut);
        }
        client
            .state
            .with(|s| s.queue.pop())
            .ok_or(CtrError::Interrupted)
    }

    /// Simulate an interrupt for the clients of a connection.
    pub fn write(&self, id: ClientId, buf: &WriteBuf) -> CtrResult<()> {
        self.open_client(id)?;
        let module = (buf.connection.module as usize)
            .checked_sub(1)
            .and_then(|i| self.modules.get(i))
            .ok_or(CtrError::InvalidArgument)?;

        module.state.with(|st| {
            let mut event = ReadBuf {
                connection: buf.connection,
                ..ReadBuf::default()
            };

            let targets = match buf.connection.class {
                ConnectionClass::Hard => {
                    let mask = InterruptMask::from_bits_truncate(buf.connection.eqp_num);
                    let mut targets = ClientSet::EMPTY;
                    for source in mask.sources() {
                        targets = targets.union(st.hard_clients[source]);
                        event.interrupt_number = source as u32;
                    }
                    targets
                }
                class => {
                    let owner = SlotOwner::for_class(class, buf.connection.eqp_num)
                        .ok_or(CtrError::InvalidArgument)?;
                    let found = match buf.trigger_number {
                        0 => st.find_slot(owner).map(|i| (i, true)),
                        n if (n as usize) <= st.slots.len() => Some((n as usize - 1, false)),
                        _ => return Err(CtrError::InvalidArgument),
                    };
                    match found {
                        Some((index, payload)) => {
                            let slot = st.slots[index];
                            event.trigger_number = index as u32 + 1;
                            event.ctim = slot.trigger.ctim;
                            event.interrupt_number = slot.trigger.counter.index() as u32;
                            event.frame = if payload {
                                slot.trigger.frame.with_value(buf.payload as u16)
                            } else {
                                slot.trigger.frame
                            };
                            slot.clients
                        }
                        None => ClientSet::EMPTY,
                    }
                }
            };

            if targets.is_empty() {
                return Ok(());
            }
            let now = st.latch_time();
            event.trigger_time = now;
            event.start_time = now;
            event.on_zero_time = now;
            for cx in targets.iter() {
                if let Some(client) = self.clients.get(cx) {
                    client.deliver(event);
                }
            }
            Ok(())
        })
    }

    /// An event is waiting.
    pub fn poll(&self, id: ClientId) -> CtrResult<bool> {
        let client = self.open_client(id)?;
        Ok(client.state.with(|s| !s.queue.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::driver;
    use crate::event::Connection;
    use crate::objects::CtimBinding;
    use ctr_hw::EventFrame;

    #[test]
    fn test_open_rules() {
        let (_sims, driver) = driver(1);
        assert_eq!(driver.open(0), Err(CtrError::BadAddress));
        assert_eq!(driver.open(17), Err(CtrError::BadAddress));

        let a = driver.open(3).expect("open");
        assert_eq!(a.minor(), 3);
        assert_eq!(driver.open(3), Err(CtrError::Busy));
        driver.close(a).expect("close");
        assert_eq!(driver.close(a), Err(CtrError::NotOpen));
        assert_eq!(driver.read(a), Err(CtrError::NotOpen));
    }

    #[test]
    fn test_read_times_out() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        driver.client(a).expect("client").state.with(|s| s.timeout = 10);

        let start = driver.platform().ticks();
        assert_eq!(driver.read(a), Err(CtrError::TimedOut));
        let elapsed = driver.platform().ticks() - start;
        assert!((10..=12).contains(&elapsed));
        assert!(driver.client(a).expect("client").state.with(|s| s.timer.is_none()));
        assert_eq!(driver.timers.with(|t| t.armed()), 0);
    }

    #[test]
    fn test_expired_timer_keeps_queued_event() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        let client = driver.client(a).expect("client");
        client.state.with(|s| {
            s.timeout = 10;
            s.timer = driver
                .timers
                .with(|t| t.arm(driver.platform().ticks(), 1, TimerTarget::Client(a.index())));
        });

        client.deliver(ReadBuf {
            ctim: 77,
            ..ReadBuf::default()
        });
        driver.platform().advance(5);
        driver.tick();
        assert_eq!(client.semaphore.count(), 1);
        assert_eq!(driver.poll(a), Ok(true));

        assert_eq!(driver.read(a).map(|e| e.ctim), Ok(77));
        assert_eq!(driver.timers.with(|t| t.armed()), 0);
    }

    #[test]
    fn test_read_interrupted_by_signal() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        driver.platform().raise_signal();

        assert_eq!(driver.read(a), Err(CtrError::Interrupted));
        assert_eq!(driver.timers.with(|t| t.armed()), 0);
    }

    #[test]
    fn test_write_simulates_ctim() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        driver
            .create_ctim(CtimBinding {
                eqp_num: 3,
                frame: EventFrame::new(0x21, 0x05, EventFrame::WILD),
            })
            .expect("create");
        let conx = Connection::new(1, ConnectionClass::Ctim, 3);
        driver.connect(a, &conx).expect("connect");

        assert_eq!(driver.poll(a), Ok(false));
        driver
            .write(
                a,
                &WriteBuf {
                    trigger_number: 0,
                    connection: conx,
                    payload: 0x1234,
                },
            )
            .expect("write");
        assert_eq!(driver.poll(a), Ok(true));

        let event = driver.read(a).expect("event");
        assert_eq!(event.frame.value(), 0x1234);
        assert_eq!(event.frame.code(), 0x05);
        assert_eq!(event.trigger_number, 1);
    }

    #[test]
    fn test_write_hard_and_bad_module() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        let conx = Connection::new(1, ConnectionClass::Hard, 0x0C00);
        driver.connect(a, &conx).expect("connect");

        let buf = WriteBuf {
            connection: conx,
            ..WriteBuf::default()
        };
        driver.write(a, &buf).expect("write");
        assert_eq!(driver.read(a).map(|e| e.interrupt_number), Ok(11));

        let bad = WriteBuf {
            connection: Connection::new(2, ConnectionClass::Hard, 1),
            ..WriteBuf::default()
        };
        assert_eq!(driver.write(a, &bad), Err(CtrError::InvalidArgument));
        let unmatched = WriteBuf {
            connection: Connection::new(1, ConnectionClass::Ptim, 99),
            ..WriteBuf::default()
        };
        assert_eq!(driver.write(a, &unmatched), Ok(()));
    }

    #[test]
    fn test_queue_off_discards_backlog() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        let client = driver.client(a).expect("client");
        client.deliver(ReadBuf::default());
        client.state.with(|s| {
            s.queue_off = true;
            s.timeout = 3;
        });

        assert_eq!(driver.read(a), Err(CtrError::TimedOut));
        assert_eq!(client.semaphore.count(), 0);
    }
}
