//! # Driver Instance
//!
//! [`Driver`] owns every module and client context for the lifetime of an
//! installation. It is passed explicitly to every entry point; there is no
//! global state.
//!
//! ## Locks
//!
//! Each module, each client, the object tables and the timer queue sit
//! behind their own [`IrqLock`]. They are taken in the order
//!
//! ```text
//! objects -> module -> client -> timers
//! ```
//!
//! The timer queue is innermost: an expiring timer is popped with only the
//! queue held, which is then released before the owning context is touched.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use ctr_hw::map;

use crate::bus::{ModuleIo, RegisterBus};
use crate::client::{ClientContext, ClientId};
use crate::config::DriverConfig;
use crate::error::{CtrError, CtrResult};
use crate::module::ModuleContext;
use crate::objects::ObjectTables;
use crate::platform::Platform;
use crate::sync::{self, IrqLock};
use crate::timer::{TimerQueue, TimerTarget};
use crate::{CLIENT_CONTEXTS, MODULE_CONTEXTS};

pub struct Driver<P: Platform> {
    pub(crate) config: DriverConfig,
    pub(crate) platform: P,
    pub(crate) modules: Vec<ModuleContext>,
    pub(crate) clients: Vec<ClientContext>,
    pub(crate) objects: IrqLock<ObjectTables>,
    pub(crate) timers: IrqLock<TimerQueue>,
    pub(crate) debug_isr: AtomicBool,
    installed: AtomicBool,
}

impl<P: Platform> Driver<P> {
    /// Take ownership of the modules behind `buses`, reset them and get
    /// ready for clients.
    pub fn install(config: DriverConfig, platform: P, buses: Vec<Arc<dyn RegisterBus>>) -> CtrResult<Self> {
        if buses.is_empty() {
            log::warn!("ctr: no modules to install");
            return Err(CtrError::NoDevice);
        }
        if buses.len() > MODULE_CONTEXTS {
            log::warn!(
                "ctr: {} modules found, only {} supported",
                buses.len(),
                MODULE_CONTEXTS
            );
        }

        if let Some(control) = platform.interrupt_control() {
            if !sync::install_interrupt_control(control) {
                log::debug!("ctr: interrupt hooks already installed");
            }
        }

        let modules = buses
            .into_iter()
            .take(MODULE_CONTEXTS)
            .enumerate()
            .map(|(i, bus)| ModuleContext::new(i, ModuleIo::new(bus, config.endian)))
            .collect();
        let clients = (0..CLIENT_CONTEXTS).map(ClientContext::new).collect();

        let driver = Self {
            config,
            platform,
            modules,
            clients,
            objects: IrqLock::new(ObjectTables::new()),
            timers: IrqLock::new(TimerQueue::new()),
            debug_isr: AtomicBool::new(config.debug_isr),
            installed: AtomicBool::new(true),
        };

        for index in 0..driver.modules.len() {
            if let Err(e) = driver.reset_module(index) {
                log::warn!("ctr: module {} reset failed ({}), retrying", index + 1, e);
                if let Err(e) = driver.reset_module(index) {
                    log::warn!("ctr: module {} did not come out of reset: {}", index + 1, e);
                }
            }
            if config.wipe_triggers_on_install {
                driver.modules[index].state.with(|st| st.wipe_tables());
            }
        }

        log::info!("ctr: installed {} module(s)", driver.modules.len());
        Ok(driver)
    }

    /// Silence every module and release every client. Blocked readers wake
    /// with [`CtrError::Interrupted`].
    pub fn uninstall(&self) {
        if !self.installed.swap(false, Ordering::AcqRel) {
            return;
        }

        for module in &self.modules {
            module.state.with(|st| {
                st.interrupt_enable = ctr_hw::InterruptMask::empty();
                st.io.store(map::INTERRUPT_ENABLE, 0);
                if let Some(id) = st.timer.take() {
                    self.timers.with(|t| t.cancel(id));
                }
            });
            module.semaphore.reset();
        }

        for client in &self.clients {
            client.state.with(|s| {
                if let Some(id) = s.timer.take() {
                    self.timers.with(|t| t.cancel(id));
                }
                s.in_use = false;
                client.semaphore.reset();
            });
        }

        log::info!("ctr: uninstalled");
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn module(&self, index: usize) -> Option<&ModuleContext> {
        self.modules.get(index)
    }

    pub fn client(&self, id: ClientId) -> Option<&ClientContext> {
        self.clients.get(id.index())
    }

    /// Client context of an open handle.
    pub(crate) fn open_client(&self, id: ClientId) -> CtrResult<&ClientContext> {
        let client = self.clients.get(id.index()).ok_or(CtrError::NoDevice)?;
        if !client.is_open() {
            return Err(CtrError::NotOpen);
        }
        Ok(client)
    }

    /// Log spurious interrupts.
    pub fn set_debug_isr(&self, on: bool) {
        self.debug_isr.store(on, Ordering::Relaxed);
    }

    /// Process ids of the open clients, in client order.
    pub fn client_pids(&self) -> Vec<u32> {
        self.clients
            .iter()
            .filter_map(|c| c.state.with(|s| s.in_use.then_some(s.pid)))
            .collect()
    }

    // =========================================================================
    // TIMERS
    // =========================================================================

    /// Timers currently waiting to expire.
    pub fn armed_timers(&self) -> usize {
        self.timers.with(|t| t.armed())
    }

    /// Fire every expired timer. Called from the OS clock and from blocking
    /// waits.
    pub fn tick(&self) {
        let now = self.platform.ticks();
        while let Some((id, target)) = self.timers.with(|t| t.pop_expired(now)) {
            match target {
                TimerTarget::Client(index) => {
                    if let Some(client) = self.clients.get(index) {
                        client.state.with(|s| {
                            if s.timer == Some(id) {
                                s.timer = None;
                                client.semaphore.wake();
                            }
                        });
                    }
                }
                TimerTarget::Module(index) => {
                    if let Some(module) = self.modules.get(index) {
                        module.state.with(|st| {
                            if st.timer == Some(id) {
                                st.timer = None;
                                module.semaphore.wake();
                            }
                        });
                    }
                }
            }
        }
    }

    /// Reset one module and restore its outputs, PLL and interrupts.
    pub fn reset_module(&self, index: usize) -> CtrResult<()> {
        let module = self.modules.get(index).ok_or(CtrError::NoDevice)?;
        let settle = self.config.reset_settle_ticks as u64;

        let ticket = module.semaphore.ticket();
        let armed = module.state.with(|st| {
            st.start_reset();
            if let Some(old) = st.timer.take() {
                self.timers.with(|t| t.cancel(old));
            }
            st.timer = self
                .timers
                .with(|t| t.arm(self.platform.ticks(), settle, TimerTarget::Module(index)));
            st.timer.is_some()
        });

        if armed {
            module.semaphore.wait(ticket, &self.platform, || self.tick());
            if let Some(id) = module.state.with(|st| st.timer.take()) {
                self.timers.with(|t| t.cancel(id));
            }
        } else {
            log::debug!("ctr: no timer for module {} reset, not waiting", index + 1);
        }

        module.state.with(|st| st.finish_reset())?;
        Ok(())
    }
}
