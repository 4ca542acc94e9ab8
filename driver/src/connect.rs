//! # Connection Manager
//!
//! Joins clients to the interrupt sources they care about and keeps the
//! module's interrupt enable register in step with who is listening.
//!
//! | Class  | `eqp_num`        | Joins                                       |
//! |--------|------------------|---------------------------------------------|
//! | `Hard` | source mask      | `hard_clients` of each source in the mask   |
//! | `Ptim` | PTIM object      | every slot of the object, on its own module |
//! | `Ctim` | CTIM object      | its slot on the module, programmed on demand |
//!
//! None of these paths block or allocate beyond the result vectors.

use alloc::vec::Vec;

use ctr_hw::{CounterConfig, InterruptMask, Trigger, INTERRUPT_SOURCES, RAM_TABLE_SIZE};

use crate::client::{ClientContext, ClientId};
use crate::driver::Driver;
use crate::error::{CtrError, CtrResult};
use crate::event::{Connection, ConnectionClass};
use crate::module::{ModuleState, SlotOwner};
use crate::platform::Platform;
use crate::CONNECTIONS;

/// Join every slot of `owner`. Returns the interrupt sources now needed.
fn join_owned(st: &mut ModuleState, owner: SlotOwner, client: usize) -> InterruptMask {
    let mut mask = InterruptMask::empty();
    for index in 0..st.slots.len() {
        if st.slots[index].owner == owner {
            mask |= st.join_slot(index, client);
        }
    }
    mask
}

impl<P: Platform> Driver<P> {
    /// Module a connection refers to, falling back to the client's selected
    /// module when the number is out of range.
    fn target_module(&self, client: &ClientContext, module: u32) -> usize {
        match (module as usize).checked_sub(1) {
            Some(index) if index < self.modules.len() => index,
            _ => client.state.with(|s| s.module),
        }
    }

    pub fn connect(&self, id: ClientId, conx: &Connection) -> CtrResult<()> {
        let client = self.open_client(id)?;
        let cx = id.index();

        match conx.class {
            ConnectionClass::Hard => {
                let mask = InterruptMask::from_bits_truncate(conx.eqp_num);
                if mask.is_empty() {
                    return Err(CtrError::NoSuchConnection);
                }
                let module = &self.modules[self.target_module(client, conx.module)];
                module.state.with(|st| {
                    for source in mask.sources() {
                        st.join_source(source, cx);
                    }
                    st.enable_interrupts(mask);
                });
                Ok(())
            }

            ConnectionClass::Ptim => self.objects.with(|objects| {
                let binding = objects.ptim(conx.eqp_num).ok_or(CtrError::NoSuchConnection)?;
                let module = self
                    .modules
                    .get(binding.module_index as usize)
                    .ok_or(CtrError::NoSuchConnection)?;
                module.state.with(|st| {
                    let mask = join_owned(st, SlotOwner::Ptim(conx.eqp_num), cx);
                    if mask.is_empty() {
                        return Err(CtrError::NoSuchConnection);
                    }
                    st.enable_interrupts(mask);
                    Ok(())
                })
            }),

            ConnectionClass::Ctim => self.objects.with(|objects| {
                let module = &self.modules[self.target_module(client, conx.module)];
                module.state.with(|st| {
                    let owner = SlotOwner::Ctim(conx.eqp_num);
                    if st.find_slot(owner).is_none() {
                        let object = objects.ctim(conx.eqp_num).ok_or(CtrError::NoSuchConnection)?;
                        let index = st.first_free_slot().ok_or(CtrError::NoMemory)?;
                        let slot = &mut st.slots[index];
                        slot.owner = owner;
                        slot.trigger = Trigger::direct(object.eqp_num, object.frame);
                        slot.config = CounterConfig::bus_interrupt();
                        st.write_slot(index);
                    }
                    let mask = join_owned(st, owner, cx);
                    st.enable_interrupts(mask);
                    Ok(())
                })
            }),
        }
    }

    /// Remove a client from one slot or one hardware source.
    pub fn disconnect_one(&self, id: ClientId, module: usize, class: ConnectionClass, index: usize) -> CtrResult<()> {
        let module = self.modules.get(module).ok_or(CtrError::InvalidArgument)?;
        match class {
            ConnectionClass::Hard if index < INTERRUPT_SOURCES => {
                module.state.with(|st| st.leave_source(index, id.index()));
                Ok(())
            }
            ConnectionClass::Ctim | ConnectionClass::Ptim if index < RAM_TABLE_SIZE => {
                module.state.with(|st| st.leave_slot(index, id.index()));
                Ok(())
            }
            _ => Err(CtrError::InvalidArgument),
        }
    }

    /// Remove a client from a connection. A HARD connection drops every
    /// hardware source on the module. Nothing to remove is not an error.
    pub fn disconnect(&self, id: ClientId, conx: &Connection) -> CtrResult<()> {
        let client = self.open_client(id)?;
        let cx = id.index();

        let owner = match SlotOwner::for_class(conx.class, conx.eqp_num) {
            Some(owner) => owner,
            None => {
                let module = &self.modules[self.target_module(client, conx.module)];
                module.state.with(|st| {
                    for source in 0..INTERRUPT_SOURCES {
                        st.leave_source(source, cx);
                    }
                });
                return Ok(());
            }
        };

        let index = match owner {
            SlotOwner::Ptim(eqp) => self
                .objects
                .with(|objects| objects.ptim(eqp).map(|b| b.module_index as usize))
                .filter(|&m| m < self.modules.len())
                .unwrap_or_else(|| self.target_module(client, conx.module)),
            _ => self.target_module(client, conx.module),
        };

        self.modules[index].state.with(|st| {
            for slot in 0..st.slots.len() {
                if st.slots[slot].owner == owner {
                    st.leave_slot(slot, cx);
                }
            }
        });
        Ok(())
    }

    /// Remove a client from everything on every module.
    pub fn disconnect_all(&self, id: ClientId) {
        for module in &self.modules {
            module.state.with(|st| st.leave_all(id.index()));
        }
    }

    /// Connections held by every open client of process `pid`.
    pub fn client_connections(&self, pid: u32) -> Vec<Connection> {
        let mut out = Vec::new();
        for client in &self.clients {
            if !client.state.with(|s| s.in_use && s.pid == pid) {
                continue;
            }
            for module in &self.modules {
                module
                    .state
                    .with(|st| st.connections_of(client.index(), module.number(), &mut out, CONNECTIONS));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::driver;
    use crate::objects::{CtimBinding, PtimBinding};
    use ctr_hw::{Counter, EventFrame, HwCounterConfig, OnZero};

    #[test]
    fn test_hard_connect_enables_sources() {
        let (sims, driver) = driver(1);
        let a = driver.open(1).expect("open");

        let conx = Connection::new(1, ConnectionClass::Hard, 0x0801);
        driver.connect(a, &conx).expect("connect");
        assert_eq!(sims[0].interrupt_enable(), InterruptMask::COUNTER_0 | InterruptMask::PPS);

        let none = Connection::new(1, ConnectionClass::Hard, 0x4000);
        assert_eq!(driver.connect(a, &none), Err(CtrError::NoSuchConnection));

        driver.disconnect(a, &conx).expect("disconnect");
        assert!(sims[0].interrupt_enable().is_empty());
    }

    #[test]
    fn test_ctim_connect_programs_slot_on_demand() {
        let (sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        let b = driver.open(2).expect("open");
        let frame = EventFrame(0x2100_0007);
        driver.create_ctim(CtimBinding { eqp_num: 77, frame }).expect("create");

        let conx = Connection::new(1, ConnectionClass::Ctim, 77);
        driver.connect(a, &conx).expect("connect a");
        driver.connect(b, &conx).expect("connect b");

        assert_eq!(sims[0].trigger(0).frame, frame.0);
        assert!(sims[0].config(0).on_zero().contains(OnZero::BUS));
        assert_eq!(sims[0].interrupt_enable(), InterruptMask::COUNTER_0);
        driver.module(0).expect("module").state.with(|st| {
            assert_eq!(st.slots[0].clients.len(), 2);
            assert_eq!(st.find_slot(SlotOwner::Ctim(77)), Some(0));
            assert_eq!(st.slots[1].owner, SlotOwner::Free);
        });

        driver.disconnect(a, &conx).expect("disconnect a");
        assert_eq!(sims[0].trigger(0).frame, frame.0);
        driver.disconnect(b, &conx).expect("disconnect b");
        assert_eq!(sims[0].trigger(0).frame, 0);
        assert_eq!(sims[0].config(0), HwCounterConfig::default());
        assert!(sims[0].interrupt_enable().is_empty());
    }

    #[test]
    fn test_ctim_connect_errors() {
        let (_sims, driver) = driver(1);
        let a = driver.open(1).expect("open");

        let conx = Connection::new(1, ConnectionClass::Ctim, 5);
        assert_eq!(driver.connect(a, &conx), Err(CtrError::NoSuchConnection));

        driver
            .module(0)
            .expect("module")
            .state
            .with(|st| st.slots.iter_mut().for_each(|s| s.owner = SlotOwner::Ptim(1)));
        driver
            .create_ctim(CtimBinding {
                eqp_num: 5,
                frame: EventFrame(1),
            })
            .expect("create");
        assert_eq!(driver.connect(a, &conx), Err(CtrError::NoMemory));
    }

    #[test]
    fn test_ptim_connect_uses_binding_module() {
        let (sims, driver) = driver(2);
        let a = driver.open(1).expect("open");
        let counter = Counter::new(5).expect("valid counter");
        driver
            .create_ptim(PtimBinding {
                eqp_num: 500,
                module_index: 1,
                counter,
                size: 2,
                start_index: 0,
            })
            .expect("create");

        let conx = Connection::new(1, ConnectionClass::Ptim, 500);
        driver.connect(a, &conx).expect("connect");
        assert!(sims[0].interrupt_enable().is_empty());
        assert_eq!(sims[1].interrupt_enable(), InterruptMask::COUNTER_5);
        assert!(sims[1].config(1).on_zero().contains(OnZero::BUS));

        assert_eq!(driver.destroy_ptim(500), Err(CtrError::Busy));
        driver.disconnect(a, &conx).expect("disconnect");
        assert!(sims[1].interrupt_enable().is_empty());
        assert!(!sims[1].config(1).on_zero().contains(OnZero::BUS));
        driver.destroy_ptim(500).expect("destroy");
    }

    #[test]
    fn test_disconnect_one_source_or_slot() {
        let (sims, driver) = driver(1);
        let a = driver.open(1).expect("open");
        driver
            .connect(a, &Connection::new(1, ConnectionClass::Hard, 0x0801))
            .expect("connect hard");
        driver.create_ctim(CtimBinding { eqp_num: 4, frame: EventFrame(4) }).expect("create");
        driver
            .connect(a, &Connection::new(1, ConnectionClass::Ctim, 4))
            .expect("connect ctim");

        driver.disconnect_one(a, 0, ConnectionClass::Hard, 11).expect("pps");
        assert_eq!(sims[0].interrupt_enable(), InterruptMask::COUNTER_0);

        driver.disconnect_one(a, 0, ConnectionClass::Hard, 0).expect("hard counter 0");
        assert_eq!(sims[0].interrupt_enable(), InterruptMask::COUNTER_0);

        driver.disconnect_one(a, 0, ConnectionClass::Ctim, 0).expect("slot 0");
        assert!(sims[0].interrupt_enable().is_empty());

        assert_eq!(
            driver.disconnect_one(a, 0, ConnectionClass::Hard, INTERRUPT_SOURCES),
            Err(CtrError::InvalidArgument)
        );
        assert_eq!(
            driver.disconnect_one(a, 3, ConnectionClass::Ctim, 0),
            Err(CtrError::InvalidArgument)
        );
    }

    #[test]
    fn test_client_connections_by_pid() {
        let (_sims, driver) = driver(1);
        driver.platform().set_pid(33);
        let a = driver.open(1).expect("open");
        driver.platform().set_pid(34);
        let b = driver.open(2).expect("open");
        driver
            .create_ptim(PtimBinding {
                eqp_num: 9,
                module_index: 0,
                counter: Counter::new(2).expect("valid counter"),
                size: 3,
                start_index: 0,
            })
            .expect("create");

        driver
            .connect(a, &Connection::new(1, ConnectionClass::Ptim, 9))
            .expect("connect");
        driver
            .connect(a, &Connection::new(1, ConnectionClass::Hard, 0x0C00))
            .expect("connect");
        driver
            .connect(b, &Connection::new(1, ConnectionClass::Hard, 0x1))
            .expect("connect");

        assert_eq!(
            driver.client_connections(33),
            [
                Connection::new(1, ConnectionClass::Ptim, 9),
                Connection::new(1, ConnectionClass::Hard, 0x0C00),
            ]
        );
        assert_eq!(driver.client_pids(), [33, 34]);
    }
}
