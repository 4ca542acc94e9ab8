//! # Module Contexts
//!
//! One [`ModuleContext`] per installed board. Its [`ModuleState`] holds the
//! driver's shadow of the RAM tables, who is listening to what, and the
//! interrupt enable mirror. All of it is guarded by one [`IrqLock`] shared
//! with the ISR.
//!
//! ## Interrupt enable
//!
//! A source is enabled exactly when someone listens to it: a counter source
//! when a slot loading that counter has clients or the source has hard
//! clients, any other source when it has hard clients. Connecting sets bits,
//! and removing the last listener recomputes the bit from that rule.

use alloc::vec;
use alloc::vec::Vec;

use ctr_hw::counter::control;
use ctr_hw::{
    map, CTime, Command, Counter, CounterConfig, CounterHistory, EventFrame, HardwareType,
    HwCounterConfig, HwTrigger, InterruptMask, IoStatus, Machine, OnZero, Pll, Polarity, Remote,
    Status, Trigger, COUNTERS, HISTORY_TABLE_SIZE, INTERRUPT_SOURCES, RAM_TABLE_SIZE,
    TGM_GROUP_VALUES,
};

use crate::bus::ModuleIo;
use crate::clients::ClientSet;
use crate::error::{BusError, CtrError, CtrResult};
use crate::event::{Connection, ConnectionClass};
use crate::sync::{IrqLock, Semaphore};
use crate::timer::TimerId;
use crate::DRIVER_VERSION;

/// Owner of a RAM table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotOwner {
    #[default]
    Free,
    Ctim(u32),
    Ptim(u32),
}

impl SlotOwner {
    /// Owner for a connection class, hardware sources never own slots.
    pub fn for_class(class: ConnectionClass, eqp_num: u32) -> Option<Self> {
        match class {
            ConnectionClass::Ctim if eqp_num != 0 => Some(SlotOwner::Ctim(eqp_num)),
            ConnectionClass::Ptim if eqp_num != 0 => Some(SlotOwner::Ptim(eqp_num)),
            _ => None,
        }
    }

    pub fn class(self) -> Option<ConnectionClass> {
        match self {
            SlotOwner::Free => None,
            SlotOwner::Ctim(_) => Some(ConnectionClass::Ctim),
            SlotOwner::Ptim(_) => Some(ConnectionClass::Ptim),
        }
    }

    pub fn eqp_num(self) -> u32 {
        match self {
            SlotOwner::Free => 0,
            SlotOwner::Ctim(n) | SlotOwner::Ptim(n) => n,
        }
    }

    pub fn is_free(self) -> bool {
        self == SlotOwner::Free
    }
}

/// Driver shadow of one RAM table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerSlot {
    /// Object the slot is allocated to
    pub owner: SlotOwner,
    /// Clients connected through this slot
    pub clients: ClientSet,
    /// Trigger loaded in the RAM table
    pub trigger: Trigger,
    /// Counter configuration loaded with it
    pub config: CounterConfig,
}

/// Direct view of a RAM table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Action {
    /// Slot number, 1 based
    pub trigger_number: u32,
    /// Owning CTIM or PTIM equipment number, 0 if free
    pub eqp_num: u32,
    /// Class of the owning object
    pub eqp_class: ConnectionClass,
    pub trigger: Trigger,
    pub config: CounterConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    /// UTC build time of the FPGA design
    pub vhdl: u32,
    pub driver: u32,
    pub hardware: HardwareType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceptionErrors {
    /// UTC second of the last reset
    pub last_reset: u32,
    pub parity: u32,
    pub sync: u32,
    pub total: u32,
    pub code_violation: u32,
    pub queue: u32,
}

/// Identity chip value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoardId {
    pub lsl: u32,
    pub msl: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryEntry {
    pub frame: EventFrame,
    pub time: CTime,
}

/// Incoming event history ring, `index` is the next write position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventHistory {
    pub index: u32,
    pub entries: Vec<HistoryEntry>,
}

pub struct ModuleState {
    pub io: ModuleIo,
    /// Mirror of the interrupt enable register
    pub interrupt_enable: InterruptMask,
    /// Shadow of the RAM table
    pub slots: Vec<TriggerSlot>,
    /// Clients connected to each interrupt source directly
    pub hard_clients: [ClientSet; INTERRUPT_SOURCES],
    /// Software status bits
    pub status: Status,
    pub command: Command,
    pub pll: Pll,
    pub pll_async_period_ns: f32,
    pub input_delay: u32,
    /// Software cable id, overrides the hardware value when non zero
    pub cable_id: u32,
    /// Armed reset settle timer
    pub timer: Option<TimerId>,
}

impl ModuleState {
    pub fn new(io: ModuleIo) -> Self {
        Self {
            io,
            interrupt_enable: InterruptMask::empty(),
            slots: vec![TriggerSlot::default(); RAM_TABLE_SIZE],
            hard_clients: [ClientSet::EMPTY; INTERRUPT_SOURCES],
            status: Status::NO_LOST_INTERRUPTS,
            command: Command::empty(),
            pll: Pll::default(),
            pll_async_period_ns: Pll::DEFAULT_ASYNC_PERIOD_NS,
            input_delay: 0,
            cable_id: 0,
            timer: None,
        }
    }

    // =========================================================================
    // INTERRUPT ENABLE
    // =========================================================================

    /// Someone listens to interrupt source `source`.
    pub fn listening(&self, source: usize) -> bool {
        if source >= INTERRUPT_SOURCES {
            return false;
        }
        if !self.hard_clients[source].is_empty() {
            return true;
        }
        source < COUNTERS
            && self
                .slots
                .iter()
                .any(|s| s.trigger.counter.index() == source && !s.clients.is_empty())
    }

    /// Interrupt enable mask implied by the current listeners.
    pub fn required_interrupts(&self) -> InterruptMask {
        (0..INTERRUPT_SOURCES)
            .filter(|&s| self.listening(s))
            .fold(InterruptMask::empty(), |m, s| m | InterruptMask::source(s))
    }

    /// Add sources and push the mirror to the module.
    pub fn enable_interrupts(&mut self, mask: InterruptMask) {
        self.interrupt_enable |= mask;
        self.io.store(map::INTERRUPT_ENABLE, self.interrupt_enable.bits());
    }

    /// Drop `source` from the enable mask if nobody listens any more.
    pub fn refresh_interrupt(&mut self, source: usize) {
        let bit = InterruptMask::source(source);
        if self.interrupt_enable.contains(bit) && !self.listening(source) {
            self.interrupt_enable.remove(bit);
            self.io.store(map::INTERRUPT_ENABLE, self.interrupt_enable.bits());
        }
    }

    // =========================================================================
    // SLOTS
    // =========================================================================

    /// First slot owned by `owner`.
    pub fn find_slot(&self, owner: SlotOwner) -> Option<usize> {
        self.slots.iter().position(|s| s.owner == owner)
    }

    pub fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.owner.is_free())
    }

    /// First run of `size` contiguous free slots.
    pub fn free_run(&self, size: usize) -> Option<usize> {
        if size == 0 {
            return None;
        }
        let mut run = 0;
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.owner.is_free() {
                run += 1;
                if run == size {
                    return Some(i + 1 - size);
                }
            } else {
                run = 0;
            }
        }
        None
    }

    /// Copy the shadow of a slot to the RAM tables.
    pub fn write_slot(&mut self, index: usize) {
        let slot = self.slots[index];
        let _ = self.io.write_trigger(index, slot.trigger.to_hw());
        let _ = self.io.write_config(index, slot.config.to_hw());
    }

    /// Free a slot and zero it in hardware.
    pub fn clear_slot(&mut self, index: usize) {
        self.slots[index] = TriggerSlot::default();
        let _ = self.io.write_trigger(index, HwTrigger::default());
        let _ = self.io.write_config(index, HwCounterConfig::default());
    }

    /// Turn the bus interrupt of a slot's configuration on or off, keeping
    /// the rest of the configuration as the module holds it.
    pub fn set_bus_interrupt(&mut self, index: usize, on: bool) {
        self.slots[index].config.on_zero.set(OnZero::BUS, on);
        let current = self
            .io
            .read_config(index)
            .unwrap_or_else(|_| self.slots[index].config.to_hw());
        let mut on_zero = current.on_zero();
        on_zero.set(OnZero::BUS, on);
        let _ = self.io.write_config(index, current.with_on_zero(on_zero));
    }

    /// Add a client to a slot. Returns the source to enable.
    pub fn join_slot(&mut self, index: usize, client: usize) -> InterruptMask {
        self.slots[index].clients.insert(client);
        self.set_bus_interrupt(index, true);
        self.slots[index].trigger.counter.interrupt()
    }

    /// Remove a client from a slot. A CTIM slot is released with its last
    /// client, a PTIM slot only stops interrupting.
    pub fn leave_slot(&mut self, index: usize, client: usize) -> bool {
        if !self.slots[index].clients.remove(client) {
            return false;
        }
        if self.slots[index].clients.is_empty() {
            let counter = self.slots[index].trigger.counter;
            match self.slots[index].owner {
                SlotOwner::Ctim(_) => self.clear_slot(index),
                SlotOwner::Ptim(_) => self.set_bus_interrupt(index, false),
                SlotOwner::Free => {}
            }
            self.refresh_interrupt(counter.index());
        }
        true
    }

    pub fn join_source(&mut self, source: usize, client: usize) -> InterruptMask {
        self.hard_clients[source].insert(client);
        InterruptMask::source(source)
    }

    pub fn leave_source(&mut self, source: usize, client: usize) -> bool {
        if !self.hard_clients[source].remove(client) {
            return false;
        }
        if self.hard_clients[source].is_empty() {
            self.refresh_interrupt(source);
        }
        true
    }

    /// Remove a client from every slot and source of this module.
    pub fn leave_all(&mut self, client: usize) {
        for index in 0..self.slots.len() {
            if !self.slots[index].owner.is_free() {
                self.leave_slot(index, client);
            }
        }
        for source in 0..INTERRUPT_SOURCES {
            self.leave_source(source, client);
        }
    }

    /// Connections of `client` on this module: distinct slot owners, then one
    /// HARD entry carrying the source mask.
    pub fn connections_of(&self, client: usize, module_number: u32, out: &mut Vec<Connection>, limit: usize) {
        for slot in self.slots.iter().filter(|s| s.clients.contains(client)) {
            let Some(class) = slot.owner.class() else {
                continue;
            };
            let conx = Connection::new(module_number, class, slot.owner.eqp_num());
            if out.len() >= limit {
                return;
            }
            if !out.contains(&conx) {
                out.push(conx);
            }
        }
        let hard = (0..INTERRUPT_SOURCES)
            .filter(|&s| self.hard_clients[s].contains(client))
            .fold(0u32, |m, s| m | (1 << s));
        if hard != 0 && out.len() < limit {
            out.push(Connection::new(module_number, ConnectionClass::Hard, hard));
        }
    }

    // =========================================================================
    // REGISTERS
    // =========================================================================

    /// Latch and read UTC.
    pub fn latch_time(&mut self) -> CTime {
        self.io.store(map::COMMAND, Command::LATCH_UTC.bits());
        self.io.read_ctime(map::READ_TIME).unwrap_or_default()
    }

    /// Check the module answers.
    pub fn ping(&mut self) -> Result<(), BusError> {
        self.io.read(map::VHDL_VERSION)?;
        self.io.read(map::STATUS)?;
        Ok(())
    }

    pub fn write_command(&mut self) {
        self.io.store(map::COMMAND, self.command.bits());
    }

    /// Hardware status plus the software bits. Each call ages the bus error
    /// count by one.
    pub fn read_status(&mut self) -> Result<Status, BusError> {
        self.ping()?;
        let hw = self.io.read(map::STATUS)? & Status::HW_MASK;
        let mut status = Status::from_bits_truncate(hw) | self.status;
        if self.io.decay_bus_errors() == 0 {
            status |= Status::NO_BUS_ERROR;
        }
        Ok(status)
    }

    /// First half of a reset, before the module is given time to settle.
    pub fn start_reset(&mut self) {
        self.io.store(map::COMMAND, Command::RESET.bits());
        self.status = Status::NO_LOST_INTERRUPTS;
        self.io.clear_bus_errors();
    }

    /// Second half of a reset: restore outputs, PLL and interrupts.
    pub fn finish_reset(&mut self) -> Result<(), BusError> {
        self.command.remove(Command::SET_HPTDC);
        self.write_command();

        for counter in Counter::real() {
            let regs = map::counter(counter);
            if self.io.load(regs.rem_out_mask()) == 0 {
                let own = 1 << counter.index();
                self.io.store(regs.rem_out_mask(), control::out_mask(own, Polarity::Ttl));
            }
        }
        self.io.store(map::OUTPUT_BYTE, 0x100);

        if self.pll.kp == 0 {
            self.pll = self.pll.with_defaults();
        }
        let _ = self.io.write_words(map::PLL, &self.pll.to_words());

        let enabled = self.interrupt_enable;
        self.enable_interrupts(enabled);
        self.ping()
    }

    /// Zero both RAM tables.
    pub fn wipe_tables(&mut self) {
        for index in 0..RAM_TABLE_SIZE {
            self.clear_slot(index);
        }
    }
}

/// A real counter, 1..8.
fn real_counter(counter: Counter) -> CtrResult<Counter> {
    if counter.is_real() {
        Ok(counter)
    } else {
        Err(CtrError::InvalidArgument)
    }
}

fn slot_index(trigger_number: u32) -> CtrResult<usize> {
    match trigger_number as usize {
        n @ 1..=RAM_TABLE_SIZE => Ok(n - 1),
        _ => Err(CtrError::InvalidArgument),
    }
}

/// One installed module.
pub struct ModuleContext {
    index: usize,
    pub state: IrqLock<ModuleState>,
    /// Woken by the reset settle timer
    pub semaphore: Semaphore,
}

impl ModuleContext {
    pub fn new(index: usize, io: ModuleIo) -> Self {
        Self {
            index,
            state: IrqLock::new(ModuleState::new(io)),
            semaphore: Semaphore::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Module number as seen by clients, 1 based.
    pub fn number(&self) -> u32 {
        self.index as u32 + 1
    }

    pub fn version(&self) -> CtrResult<Version> {
        self.state.with(|st| {
            let vhdl = st.io.read(map::VHDL_VERSION)?;
            let status = Status::from_bits_truncate(st.io.read(map::STATUS)?);
            Ok(Version {
                vhdl,
                driver: DRIVER_VERSION,
                hardware: status.hardware_type(),
            })
        })
    }

    pub fn status(&self) -> CtrResult<Status> {
        Ok(self.state.with(|st| st.read_status())?)
    }

    /// Enable or disable event reception. `SET_HPTDC` and its complement
    /// switch the HPTDC instead.
    pub fn enable(&self, value: u32) {
        self.state.with(|st| {
            let hptdc = Command::SET_HPTDC.bits();
            if value == hptdc {
                st.command.insert(Command::SET_HPTDC);
            } else if value == !hptdc {
                st.command.remove(Command::SET_HPTDC);
            } else if value != 0 {
                st.command.insert(Command::ENABLE);
                st.command.remove(Command::DISABLE);
            } else {
                st.command.remove(Command::ENABLE);
                st.command.insert(Command::DISABLE);
            }
            st.write_command();
        });
    }

    pub fn set_debug_history(&self, on: bool) {
        self.state.with(|st| {
            st.command.set(Command::DEBUG_HIS_ON, on);
            st.command.set(Command::DEBUG_HIS_OFF, !on);
            st.write_command();
        });
    }

    /// Brutal mode turns the soft UTC PLL off.
    pub fn set_brutal_pll(&self, on: bool) {
        self.state.with(|st| {
            st.command.set(Command::UTC_PLL_OFF, on);
            st.command.set(Command::UTC_PLL_ON, !on);
            st.write_command();
        });
    }

    pub fn input_delay(&self) -> CtrResult<u32> {
        Ok(self.state.with(|st| st.io.read(map::INPUT_DELAY))?)
    }

    pub fn set_input_delay(&self, delay: u32) -> CtrResult<()> {
        self.state.with(|st| {
            st.input_delay = delay;
            Ok(st.io.write(map::INPUT_DELAY, delay)?)
        })
    }

    pub fn utc(&self) -> CTime {
        self.state.with(|st| st.latch_time())
    }

    /// Load the UTC second applied at the next PPS.
    pub fn set_utc(&self, second: u32) -> CtrResult<()> {
        self.state.with(|st| {
            st.ping()?;
            st.io.write(map::SET_TIME, second)?;
            st.io.write(map::COMMAND, Command::SET_UTC.bits())?;
            Ok(())
        })
    }

    pub fn cable_id(&self) -> CtrResult<u32> {
        self.state.with(|st| match st.cable_id {
            0 => Ok(st.io.read(map::CABLE_ID)?),
            id => Ok(id),
        })
    }

    pub fn set_cable_id(&self, id: u32) {
        self.state.with(|st| st.cable_id = id);
    }

    /// Counter is under remote control.
    pub fn remote(&self, counter: Counter) -> CtrResult<bool> {
        let counter = real_counter(counter)?;
        self.state
            .with(|st| Ok(st.io.read(map::counter(counter).lock_config())? != 0))
    }

    pub fn set_remote(&self, counter: Counter, remote: bool) -> CtrResult<()> {
        let counter = real_counter(counter)?;
        self.state
            .with(|st| Ok(st.io.write(map::counter(counter).lock_config(), remote as u32)?))
    }

    /// Execute a remote command on a counter under remote control.
    pub fn remote_command(&self, counter: Counter, remote: Remote) -> CtrResult<()> {
        let counter = real_counter(counter)?;
        self.state.with(|st| {
            let regs = map::counter(counter);
            if st.io.read(regs.lock_config())? == 0 {
                return Err(CtrError::InvalidArgument);
            }
            Ok(st.io.write(regs.rem_out_mask(), control::remote_command(remote))?)
        })
    }

    pub fn out_mask(&self, counter: Counter) -> CtrResult<(u32, Polarity)> {
        let counter = real_counter(counter)?;
        self.state.with(|st| {
            let word = st.io.read(map::counter(counter).rem_out_mask())?;
            Ok(control::decode_out_mask(word))
        })
    }

    /// Route a counter to outputs. An empty mask routes it to its own output.
    pub fn set_out_mask(&self, counter: Counter, mask: u32, polarity: Polarity) -> CtrResult<()> {
        let counter = real_counter(counter)?;
        let mask = if mask == 0 { 1 << counter.index() } else { mask };
        self.state.with(|st| {
            let word = control::out_mask(mask, polarity);
            Ok(st.io.write(map::counter(counter).rem_out_mask(), word)?)
        })
    }

    /// Active configuration of a counter.
    pub fn counter_config(&self, counter: Counter) -> CtrResult<CounterConfig> {
        let hw = self.state.with(|st| st.io.read_counter_config(counter))?;
        Ok(hw.decode()?)
    }

    /// Overwrite the active configuration, only while under remote control.
    pub fn set_counter_config(&self, counter: Counter, config: &CounterConfig) -> CtrResult<()> {
        self.state.with(|st| {
            if st.io.read(map::counter(counter).lock_config())? == 0 {
                return Err(CtrError::InvalidArgument);
            }
            Ok(st.io.write_counter_config(counter, config.to_hw())?)
        })
    }

    pub fn counter_history(&self, counter: Counter) -> CtrResult<CounterHistory> {
        let counter = real_counter(counter)?;
        Ok(self.state.with(|st| st.io.read_history(counter))?)
    }

    pub fn pll(&self) -> CtrResult<Pll> {
        let words = self.state.with(|st| st.io.read_words::<{ map::PLL_WORDS }>(map::PLL))?;
        Ok(Pll::from_words(words))
    }

    pub fn set_pll(&self, pll: &Pll) -> CtrResult<()> {
        self.state.with(|st| {
            st.pll = *pll;
            Ok(st.io.write_words(map::PLL, &pll.to_words())?)
        })
    }

    pub fn pll_async_period(&self) -> f32 {
        self.state.with(|st| st.pll_async_period_ns)
    }

    pub fn set_pll_async_period(&self, period_ns: f32) -> CtrResult<()> {
        if period_ns.is_nan() || period_ns <= 0.0 {
            return Err(CtrError::InvalidArgument);
        }
        self.state.with(|st| st.pll_async_period_ns = period_ns);
        Ok(())
    }

    /// Current telegram of a machine, group values in telegram order.
    pub fn telegram(&self, machine: Machine) -> CtrResult<[u16; TGM_GROUP_VALUES]> {
        let index = machine.telegram_index().ok_or(CtrError::InvalidArgument)?;
        let words = self
            .state
            .with(|st| st.io.read_words::<{ TGM_GROUP_VALUES / 2 }>(map::telegram(index)))?;
        let mut groups = [0u16; TGM_GROUP_VALUES];
        for (i, w) in words.iter().enumerate() {
            groups[2 * i] = (w >> 16) as u16;
            groups[2 * i + 1] = *w as u16;
        }
        Ok(groups)
    }

    pub fn event_history(&self) -> CtrResult<EventHistory> {
        self.state.with(|st| {
            let index = st.io.read(map::EVENT_HISTORY)?;
            let mut entries = Vec::with_capacity(HISTORY_TABLE_SIZE);
            for i in 0..HISTORY_TABLE_SIZE {
                let [frame, ctrain, second, ticks] = st.io.read_words::<4>(map::history_entry(i))?;
                entries.push(HistoryEntry {
                    frame: EventFrame(frame),
                    time: CTime::from_words([ctrain, second, ticks]),
                });
            }
            Ok(EventHistory { index, entries })
        })
    }

    pub fn reception_errors(&self) -> CtrResult<ReceptionErrors> {
        self.state.with(|st| {
            Ok(ReceptionErrors {
                last_reset: st.io.read(map::LAST_RESET)?,
                parity: st.io.read(map::PARITY_ERRS)?,
                sync: st.io.read(map::SYNC_ERRS)?,
                total: st.io.read(map::TOTAL_ERRS)?,
                code_violation: st.io.read(map::CODE_VIOL_ERRS)?,
                queue: st.io.read(map::QUEUE_ERRS)?,
            })
        })
    }

    pub fn io_status(&self) -> CtrResult<IoStatus> {
        let bits = self.state.with(|st| st.io.read(map::IO_STAT))?;
        Ok(IoStatus::from_bits_retain(bits))
    }

    pub fn identity(&self) -> CtrResult<BoardId> {
        self.state.with(|st| {
            Ok(BoardId {
                lsl: st.io.read(map::ID_LSL)?,
                msl: st.io.read(map::ID_MSL)?,
            })
        })
    }

    fn raw_range(offset: u32, len: usize) -> CtrResult<usize> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= map::MAP_SIZE / 4 => Ok(start * 4),
            _ => Err(CtrError::InvalidArgument),
        }
    }

    /// Read `out.len()` words starting at word offset `offset`.
    pub fn raw_read(&self, offset: u32, out: &mut [u32]) -> CtrResult<()> {
        let base = Self::raw_range(offset, out.len())?;
        self.state.with(|st| {
            for (i, w) in out.iter_mut().enumerate() {
                *w = st.io.read(base + i * 4)?;
            }
            Ok(())
        })
    }

    pub fn raw_write(&self, offset: u32, words: &[u32]) -> CtrResult<()> {
        let base = Self::raw_range(offset, words.len())?;
        Ok(self.state.with(|st| st.io.write_words(base, words))?)
    }

    /// Read a RAM table slot back from the module.
    pub fn action(&self, trigger_number: u32) -> CtrResult<Action> {
        let index = slot_index(trigger_number)?;
        self.state.with(|st| {
            let slot = st.slots[index];
            let trigger = st.io.read_trigger(index)?.decode(slot.trigger.ctim)?;
            let config = st.io.read_config(index)?.decode()?;
            Ok(Action {
                trigger_number,
                eqp_num: slot.owner.eqp_num(),
                eqp_class: slot.owner.class().unwrap_or_default(),
                trigger,
                config,
            })
        })
    }

    /// Program a RAM table slot. A free slot is claimed by the action's
    /// owner; an owned slot keeps its owner and counter. The bus interrupt
    /// follows whether the slot has clients.
    pub fn set_action(&self, action: &Action) -> CtrResult<()> {
        let index = slot_index(action.trigger_number)?;
        let owner = SlotOwner::for_class(action.eqp_class, action.eqp_num)
            .ok_or(CtrError::InvalidArgument)?;

        self.state.with(|st| {
            let slot = &mut st.slots[index];
            if !slot.owner.is_free() {
                if slot.owner != owner {
                    log::warn!(
                        "ctr: set action on slot {}: owner {:?} is not {:?}",
                        action.trigger_number,
                        slot.owner,
                        owner
                    );
                    return Err(CtrError::InvalidArgument);
                }
                if slot.trigger.counter != action.trigger.counter {
                    log::warn!(
                        "ctr: set action on slot {}: counter {} is not {}",
                        action.trigger_number,
                        slot.trigger.counter.index(),
                        action.trigger.counter.index()
                    );
                    return Err(CtrError::InvalidArgument);
                }
            }

            slot.owner = owner;
            slot.trigger = action.trigger;
            if let SlotOwner::Ctim(eqp) = owner {
                slot.trigger.ctim = eqp;
            }
            slot.config = action.config;
            let connected = !slot.clients.is_empty();
            slot.config.on_zero.set(OnZero::BUS, connected);
            st.write_slot(index);
            Ok(())
        })
    }
}
