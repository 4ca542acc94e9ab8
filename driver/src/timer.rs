//! One-shot timers.
//!
//! A context that arms a timer keeps the returned [`TimerId`] in an
//! `Option`. Whoever takes the id out of the context owns the timer: the
//! context owner cancels it, the expiry path only acts if the context still
//! holds the id it fired.

use core::num::NonZeroU32;

use crate::{CLIENT_CONTEXTS, MODULE_CONTEXTS};

/// Maximum number of armed timers.
pub const TIMERS: usize = CLIENT_CONTEXTS + MODULE_CONTEXTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(NonZeroU32);

/// What an expiring timer wakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTarget {
    Client(usize),
    Module(usize),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: TimerId,
    deadline: u64,
    target: TimerTarget,
}

pub struct TimerQueue {
    entries: [Option<Entry>; TIMERS],
    next: u32,
}

impl TimerQueue {
    pub const fn new() -> Self {
        Self {
            entries: [None; TIMERS],
            next: 0,
        }
    }

    fn next_id(&mut self) -> TimerId {
        loop {
            self.next = self.next.wrapping_add(1);
            if let Some(id) = NonZeroU32::new(self.next) {
                return TimerId(id);
            }
        }
    }

    /// Arm a timer `ticks` after `now`. `None` when every slot is in use.
    pub fn arm(&mut self, now: u64, ticks: u64, target: TimerTarget) -> Option<TimerId> {
        let free = self.entries.iter().position(Option::is_none)?;
        let id = self.next_id();
        self.entries[free] = Some(Entry {
            id,
            deadline: now.saturating_add(ticks),
            target,
        });
        Some(id)
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.entries.iter_mut().find(|e| matches!(e, Some(entry) if entry.id == id)) {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    /// Remove and return one timer whose deadline has passed.
    pub fn pop_expired(&mut self, now: u64) -> Option<(TimerId, TimerTarget)> {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| matches!(e, Some(entry) if entry.deadline <= now))?;
        slot.take().map(|e| (e.id, e.target))
    }

    pub fn armed(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}
