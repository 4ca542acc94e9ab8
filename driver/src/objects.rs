//! # Timing Objects
//!
//! CTIM objects name an incoming event frame. They take no RAM table space
//! until a client connects, at which point a slot is programmed on the
//! client's module. PTIM objects name a run of slots reserved on one module
//! and counter.
//!
//! Both tables are global to the driver. An object cannot be destroyed (and
//! a CTIM frame cannot change) while any slot still refers to it.

use alloc::vec::Vec;

use ctr_hw::{Counter, CounterConfig, EventFrame, Trigger};

use crate::driver::Driver;
use crate::error::{CtrError, CtrResult};
use crate::module::SlotOwner;
use crate::platform::Platform;
use crate::{CTIM_OBJECTS, PTIM_OBJECTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtimBinding {
    pub eqp_num: u32,
    pub frame: EventFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PtimBinding {
    pub eqp_num: u32,
    /// Module index, 0 based
    pub module_index: u8,
    pub counter: Counter,
    /// Number of slots
    pub size: u16,
    /// First slot, filled in at creation
    pub start_index: u16,
}

impl PtimBinding {
    pub fn slots(&self) -> core::ops::Range<usize> {
        let start = self.start_index as usize;
        start..start + self.size as usize
    }
}

pub struct ObjectTables {
    pub ctim: Vec<CtimBinding>,
    pub ptim: Vec<PtimBinding>,
}

impl ObjectTables {
    pub const fn new() -> Self {
        Self {
            ctim: Vec::new(),
            ptim: Vec::new(),
        }
    }

    pub fn ctim(&self, eqp_num: u32) -> Option<&CtimBinding> {
        self.ctim.iter().find(|o| o.eqp_num == eqp_num)
    }

    pub fn ptim(&self, eqp_num: u32) -> Option<&PtimBinding> {
        self.ptim.iter().find(|o| o.eqp_num == eqp_num)
    }
}

impl Default for ObjectTables {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform> Driver<P> {
    /// Some slot on some module was programmed for CTIM `eqp_num`.
    fn ctim_in_use(&self, eqp_num: u32) -> bool {
        self.modules.iter().any(|m| {
            m.state.with(|st| {
                st.slots
                    .iter()
                    .any(|s| !s.owner.is_free() && s.trigger.ctim == eqp_num)
            })
        })
    }

    // =========================================================================
    // CTIM
    // =========================================================================

    pub fn create_ctim(&self, binding: CtimBinding) -> CtrResult<()> {
        if binding.eqp_num == 0 {
            return Err(CtrError::InvalidArgument);
        }
        self.objects.with(|objects| {
            if objects.ctim(binding.eqp_num).is_some() {
                return Err(CtrError::Busy);
            }
            if objects.ctim.len() >= CTIM_OBJECTS {
                return Err(CtrError::NoMemory);
            }
            objects.ctim.push(binding);
            Ok(())
        })
    }

    pub fn destroy_ctim(&self, eqp_num: u32) -> CtrResult<()> {
        self.objects.with(|objects| {
            let pos = objects
                .ctim
                .iter()
                .position(|o| o.eqp_num == eqp_num)
                .ok_or(CtrError::InvalidArgument)?;
            if self.ctim_in_use(eqp_num) {
                return Err(CtrError::Busy);
            }
            objects.ctim.swap_remove(pos);
            Ok(())
        })
    }

    pub fn change_ctim_frame(&self, binding: CtimBinding) -> CtrResult<()> {
        self.objects.with(|objects| {
            let object = objects
                .ctim
                .iter_mut()
                .find(|o| o.eqp_num == binding.eqp_num)
                .ok_or(CtrError::InvalidArgument)?;
            if self.ctim_in_use(binding.eqp_num) {
                return Err(CtrError::Busy);
            }
            object.frame = binding.frame;
            Ok(())
        })
    }

    pub fn list_ctim(&self) -> Vec<CtimBinding> {
        self.objects.with(|objects| objects.ctim.clone())
    }

    // =========================================================================
    // PTIM
    // =========================================================================

    /// Reserve `binding.size` contiguous slots, first fit, and return the
    /// binding with its start index.
    pub fn create_ptim(&self, binding: PtimBinding) -> CtrResult<PtimBinding> {
        if binding.eqp_num == 0 || binding.size == 0 {
            return Err(CtrError::InvalidArgument);
        }
        self.objects.with(|objects| {
            if objects.ptim(binding.eqp_num).is_some() {
                return Err(CtrError::Busy);
            }
            if objects.ptim.len() >= PTIM_OBJECTS {
                return Err(CtrError::NoMemory);
            }
            let module = self
                .modules
                .get(binding.module_index as usize)
                .ok_or(CtrError::InvalidArgument)?;

            let start = module.state.with(|st| {
                let start = st.free_run(binding.size as usize).ok_or(CtrError::NoMemory)?;
                for index in start..start + binding.size as usize {
                    let slot = &mut st.slots[index];
                    slot.owner = SlotOwner::Ptim(binding.eqp_num);
                    slot.trigger = Trigger {
                        counter: binding.counter,
                        ..Trigger::default()
                    };
                    slot.config = CounterConfig::default();
                    st.write_slot(index);
                }
                Ok::<usize, CtrError>(start)
            })?;

            let created = PtimBinding {
                start_index: start as u16,
                ..binding
            };
            objects.ptim.push(created);
            Ok(created)
        })
    }

    /// Release a PTIM object's slots. Fails while any of them has clients.
    pub fn destroy_ptim(&self, eqp_num: u32) -> CtrResult<()> {
        self.objects.with(|objects| {
            let pos = objects
                .ptim
                .iter()
                .position(|o| o.eqp_num == eqp_num)
                .ok_or(CtrError::InvalidArgument)?;
            let binding = objects.ptim[pos];
            let owner = SlotOwner::Ptim(eqp_num);

            if let Some(module) = self.modules.get(binding.module_index as usize) {
                module.state.with(|st| {
                    if st.slots.iter().any(|s| s.owner == owner && !s.clients.is_empty()) {
                        return Err(CtrError::Busy);
                    }
                    for index in 0..st.slots.len() {
                        if st.slots[index].owner == owner {
                            st.clear_slot(index);
                        }
                    }
                    Ok(())
                })?;
            }

            objects.ptim.swap_remove(pos);
            Ok(())
        })
    }

    pub fn ptim_binding(&self, eqp_num: u32) -> CtrResult<PtimBinding> {
        self.objects
            .with(|objects| objects.ptim(eqp_num).copied())
            .ok_or(CtrError::InvalidArgument)
    }

    pub fn list_ptim(&self) -> Vec<PtimBinding> {
        self.objects.with(|objects| objects.ptim.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::driver;
    use crate::module::Action;
    use crate::event::ConnectionClass;
    use ctr_hw::RAM_TABLE_SIZE;

    fn ptim(eqp_num: u32, size: u16) -> PtimBinding {
        PtimBinding {
            eqp_num,
            module_index: 0,
            counter: Counter::new(1).expect("valid counter"),
            size,
            start_index: 0,
        }
    }

    #[test]
    fn test_ctim_table() {
        let (_sims, driver) = driver(1);
        let binding = CtimBinding {
            eqp_num: 10,
            frame: EventFrame(0x2100_0001),
        };

        driver.create_ctim(binding).expect("create");
        assert_eq!(driver.create_ctim(binding), Err(CtrError::Busy));
        driver
            .change_ctim_frame(CtimBinding {
                frame: EventFrame(0x2100_0002),
                ..binding
            })
            .expect("change frame");
        assert_eq!(driver.list_ctim()[0].frame, EventFrame(0x2100_0002));

        driver.destroy_ctim(10).expect("destroy");
        assert_eq!(driver.destroy_ctim(10), Err(CtrError::InvalidArgument));
        assert!(driver.list_ctim().is_empty());
    }

    #[test]
    fn test_ctim_referenced_by_slot_is_busy() {
        let (_sims, driver) = driver(2);
        let binding = CtimBinding {
            eqp_num: 11,
            frame: EventFrame(0x2100_0003),
        };
        driver.create_ctim(binding).expect("create");

        driver
            .module(1)
            .expect("module")
            .set_action(&Action {
                trigger_number: 9,
                eqp_num: 11,
                eqp_class: ConnectionClass::Ctim,
                trigger: Trigger::direct(11, binding.frame),
                config: CounterConfig::bus_interrupt(),
            })
            .expect("set action");

        assert_eq!(driver.destroy_ctim(11), Err(CtrError::Busy));
        assert_eq!(driver.change_ctim_frame(binding), Err(CtrError::Busy));
        assert_eq!(driver.list_ctim(), [binding]);
    }

    #[test]
    fn test_ptim_first_fit_reuses_freed_run() {
        let (sims, driver) = driver(1);

        assert_eq!(driver.create_ptim(ptim(42, 3)).map(|b| b.start_index), Ok(0));
        assert_eq!(driver.create_ptim(ptim(43, 2)).map(|b| b.start_index), Ok(3));
        driver.destroy_ptim(42).expect("destroy");
        assert_eq!(driver.create_ptim(ptim(44, 3)).map(|b| b.start_index), Ok(0));

        let counter = sims[0].trigger(4).trigger & ctr_hw::HwTrigger::COUNTER_MASK;
        assert_ne!(counter, 0);
        assert_eq!(driver.ptim_binding(43).map(|b| b.slots()), Ok(3..5));
    }

    #[test]
    fn test_ptim_create_errors() {
        let (_sims, driver) = driver(1);

        assert_eq!(driver.create_ptim(ptim(1, 0)), Err(CtrError::InvalidArgument));
        assert_eq!(
            driver.create_ptim(PtimBinding {
                module_index: 1,
                ..ptim(1, 1)
            }),
            Err(CtrError::InvalidArgument)
        );
        assert_eq!(
            driver.create_ptim(ptim(1, RAM_TABLE_SIZE as u16 + 1)),
            Err(CtrError::NoMemory)
        );
        driver.create_ptim(ptim(1, 1)).expect("create");
        assert_eq!(driver.create_ptim(ptim(1, 1)), Err(CtrError::Busy));
        assert_eq!(driver.ptim_binding(2), Err(CtrError::InvalidArgument));
        assert_eq!(driver.destroy_ptim(2), Err(CtrError::InvalidArgument));
    }

    #[test]
    fn test_no_partial_allocation() {
        let (_sims, driver) = driver(1);
        driver.create_ptim(ptim(1, RAM_TABLE_SIZE as u16 - 1)).expect("create");

        assert_eq!(driver.create_ptim(ptim(2, 2)), Err(CtrError::NoMemory));
        let free = driver
            .module(0)
            .expect("module")
            .state
            .with(|st| st.slots.iter().filter(|s| s.owner.is_free()).count());
        assert_eq!(free, 1);
        assert_eq!(driver.list_ptim().len(), 1);
    }
}
