//! # Synchronisation
//!
//! [`IrqLock`] is the critical section shared between the ISR and process
//! context. It masks local interrupts through the [`InterruptControl`] hooks
//! the platform hands over at install, then takes a spin lock; it never
//! sleeps. Without hooks (host tests) only the spin lock is taken.
//!
//! [`Semaphore`] is a counting semaphore with the three operations the client
//! and module contexts need: signal, reset and a bounded wait. A reset wakes
//! every waiter that took its ticket before the reset.

use core::sync::atomic::{AtomicU32, Ordering};

use spin::{Mutex, Once};

use crate::platform::Platform;

/// Local interrupt mask of the CPU running the driver.
#[derive(Debug, Clone, Copy)]
pub struct InterruptControl {
    /// Mask interrupts and return whether they were enabled.
    pub disable: fn() -> bool,
    /// Unmask interrupts.
    pub enable: fn(),
}

static INTERRUPTS: Once<InterruptControl> = Once::new();

/// Install the interrupt hooks used by every [`IrqLock`]. The first
/// installation wins; returns false if other hooks were already in place.
pub fn install_interrupt_control(control: InterruptControl) -> bool {
    let mut installed = false;
    INTERRUPTS.call_once(|| {
        installed = true;
        control
    });
    installed
}

/// Run `f` with local interrupts masked, restoring the previous state.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let Some(control) = INTERRUPTS.get() else {
        return f();
    };
    let was_enabled = (control.disable)();
    let result = f();
    if was_enabled {
        (control.enable)();
    }
    result
}

/// Interrupt-masking spin critical section.
pub struct IrqLock<T> {
    inner: Mutex<T>,
}

impl<T> IrqLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Run `f` with exclusive access to the protected value.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        without_interrupts(|| {
            let mut guard = self.inner.lock();
            f(&mut guard)
        })
    }
}

/// Snapshot of a semaphore's reset generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u32);

/// Why a wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// A count was consumed
    Signalled,
    /// The semaphore was reset
    Reset,
    /// The caller has a signal pending
    Interrupted,
}

#[derive(Debug, Default)]
pub struct Semaphore {
    count: AtomicU32,
    generation: AtomicU32,
}

impl Semaphore {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            generation: AtomicU32::new(0),
        }
    }

    pub fn signal(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop all counts and wake current waiters.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Wake current waiters, keeping any counts already signalled.
    pub fn wake(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// Take a ticket before arming anything that may reset the semaphore.
    pub fn ticket(&self) -> Ticket {
        Ticket(self.generation.load(Ordering::Acquire))
    }

    pub fn try_acquire(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .is_ok()
    }

    /// Wait for a count, a reset after `ticket`, or a signal. `poll` runs on
    /// every iteration and is where expired timers get fired.
    pub fn wait<P: Platform + ?Sized>(&self, ticket: Ticket, platform: &P, mut poll: impl FnMut()) -> Wake {
        loop {
            if self.try_acquire() {
                return Wake::Signalled;
            }
            if self.generation.load(Ordering::Acquire) != ticket.0 {
                return Wake::Reset;
            }
            if platform.signal_pending() {
                return Wake::Interrupted;
            }
            poll();
            platform.relax();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::VirtualPlatform;

    #[test]
    fn test_signal_then_wait() {
        let sem = Semaphore::new();
        let platform = VirtualPlatform::new();
        sem.signal();
        sem.signal();

        assert_eq!(sem.wait(sem.ticket(), &platform, || {}), Wake::Signalled);
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn test_reset_wakes_waiter() {
        let sem = Semaphore::new();
        let platform = VirtualPlatform::new();
        let ticket = sem.ticket();
        let mut polls = 0;

        let wake = sem.wait(ticket, &platform, || {
            polls += 1;
            if polls == 3 {
                sem.reset();
            }
        });
        assert_eq!(wake, Wake::Reset);
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn test_wake_keeps_counts() {
        let sem = Semaphore::new();
        let platform = VirtualPlatform::new();
        let ticket = sem.ticket();
        sem.signal();
        sem.wake();

        assert_eq!(sem.count(), 1);
        assert_eq!(sem.wait(ticket, &platform, || {}), Wake::Signalled);
        assert_eq!(sem.wait(ticket, &platform, || {}), Wake::Reset);
    }

    #[test]
    fn test_reset_before_ticket_does_not_wake() {
        let sem = Semaphore::new();
        let platform = VirtualPlatform::new();
        sem.signal();
        sem.reset();

        let ticket = sem.ticket();
        platform.raise_signal();
        assert_eq!(sem.wait(ticket, &platform, || {}), Wake::Interrupted);
    }

    #[test]
    fn test_irq_lock_returns_closure_value() {
        let lock = IrqLock::new(5u32);
        let v = lock.with(|x| {
            *x += 1;
            *x
        });
        assert_eq!(v, 6);
    }
}
