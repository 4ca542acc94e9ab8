//! # Interrupt Service Routine
//!
//! Runs in interrupt context with the module lock held. Each pending source
//! is turned into one [`ReadBuf`] and pushed to every client listening to it,
//! in ascending source order. Nothing here blocks or allocates.

use ctr_hw::{map, Counter, InterruptMask, Status, RAM_TABLE_SIZE};

use crate::clients::ClientSet;
use crate::driver::Driver;
use crate::event::{Connection, ConnectionClass, ReadBuf};
use crate::platform::Platform;
use core::sync::atomic::Ordering;

/// Whether an interrupt belonged to the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    None,
    Handled,
}

impl<P: Platform> Driver<P> {
    /// Service the interrupt line of module `index`.
    pub fn interrupt(&self, index: usize) -> IrqReturn {
        let Some(module) = self.modules.get(index) else {
            return IrqReturn::None;
        };
        let number = module.number();
        let debug = self.debug_isr.load(Ordering::Relaxed);

        module.state.with(|st| {
            let pending = match st.io.read(map::INTERRUPT_SOURCE) {
                Ok(bits) => InterruptMask::from_bits_truncate(bits),
                Err(_) => return IrqReturn::None,
            };
            if pending.is_empty() {
                return IrqReturn::None;
            }

            for inum in pending.sources() {
                let mut event = ReadBuf {
                    interrupt_number: inum as u32,
                    ..ReadBuf::default()
                };
                let mut targets = ClientSet::EMPTY;
                let mut history = None;

                if let Some(counter) = Counter::new(inum as u32) {
                    let regs = map::counter(counter);
                    let h = st.io.read_history(counter).unwrap_or_default();
                    let remote = st.io.load(regs.lock_config()) != 0;
                    let slot_index = h.index as usize;

                    if !remote && slot_index < RAM_TABLE_SIZE {
                        if st.io.load(regs.lock_history()) > 1 {
                            st.status.remove(Status::NO_LOST_INTERRUPTS);
                        }
                        let slot = st.slots[slot_index];
                        if !slot.clients.is_empty() {
                            targets = slot.clients;
                            event.connection = Connection::new(
                                number,
                                slot.owner.class().unwrap_or_default(),
                                slot.owner.eqp_num(),
                            );
                            event.trigger_number = h.index + 1;
                            event.ctim = slot.trigger.ctim;
                            event.frame = h.frame;
                            event.trigger_time = h.trigger_time;
                            event.start_time = h.start_time;
                            event.on_zero_time = h.on_zero_time;
                        }
                    }
                    history = Some(h);
                }

                let hard = st.hard_clients[inum];
                if targets.is_empty() && !hard.is_empty() {
                    event.connection = Connection::new(number, ConnectionClass::Hard, 1 << inum);
                    event.on_zero_time = match history {
                        Some(h) => h.on_zero_time,
                        None => st.latch_time(),
                    };
                }
                targets = targets.union(hard);

                if targets.is_empty() {
                    if debug {
                        log::warn!(
                            "ctr: spurious interrupt on module {}: source {:#06x}, number {}, history index {:?}",
                            number,
                            pending.bits(),
                            inum,
                            history.map(|h| h.index)
                        );
                    }
                    continue;
                }

                for cx in targets.iter() {
                    if let Some(client) = self.clients.get(cx) {
                        client.deliver(event);
                    }
                }
            }
            IrqReturn::Handled
        })
    }
}
