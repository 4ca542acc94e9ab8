//! OS services the driver consumes.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::sync::InterruptControl;

/// Clock, scheduling and process information supplied by the host OS.
pub trait Platform: Send + Sync {
    /// Monotonic time in 10 ms ticks.
    fn ticks(&self) -> u64;

    /// Called between polls of a blocking wait.
    fn relax(&self) {
        core::hint::spin_loop();
    }

    /// A signal is pending for the calling process.
    fn signal_pending(&self) -> bool {
        false
    }

    /// Process id of the caller.
    fn current_pid(&self) -> u32 {
        0
    }

    /// Hooks that mask the module interrupt on the local CPU. `None` when
    /// interrupts never preempt the driver, as on a host.
    fn interrupt_control(&self) -> Option<InterruptControl> {
        None
    }
}

/// Deterministic platform whose clock advances one tick per `relax`.
#[derive(Debug)]
pub struct VirtualPlatform {
    ticks: AtomicU64,
    signal: AtomicBool,
    pid: AtomicU32,
}

impl VirtualPlatform {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            signal: AtomicBool::new(false),
            pid: AtomicU32::new(1),
        }
    }

    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }

    /// Deliver a signal to every waiter until cleared.
    pub fn raise_signal(&self) {
        self.signal.store(true, Ordering::SeqCst);
    }

    pub fn clear_signal(&self) {
        self.signal.store(false, Ordering::SeqCst);
    }

    pub fn set_pid(&self, pid: u32) {
        self.pid.store(pid, Ordering::SeqCst);
    }
}

impl Default for VirtualPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for VirtualPlatform {
    fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn relax(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        core::hint::spin_loop();
    }

    fn signal_pending(&self) -> bool {
        self.signal.load(Ordering::SeqCst)
    }

    fn current_pid(&self) -> u32 {
        self.pid.load(Ordering::SeqCst)
    }
}
