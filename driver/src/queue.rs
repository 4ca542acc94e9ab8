//! Per-client event ring.
//!
//! Fixed capacity, single producer (the ISR or a simulated write) and single
//! consumer (the owning client). When the ring is full the oldest entry is
//! overwritten and counted as missed.

use crate::event::ReadBuf;
use crate::QUEUE_SIZE;

pub struct EventQueue {
    entries: [ReadBuf; QUEUE_SIZE],
    size: usize,
    wr: usize,
    rd: usize,
    missed: u32,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            entries: [ReadBuf::default(); QUEUE_SIZE],
            size: 0,
            wr: 0,
            rd: 0,
            missed: 0,
        }
    }

    /// Append an event. Returns false if the oldest entry was overwritten,
    /// in which case no new count should be signalled.
    pub fn push(&mut self, event: ReadBuf) -> bool {
        self.entries[self.wr] = event;
        self.wr = (self.wr + 1) % QUEUE_SIZE;
        if self.size < QUEUE_SIZE {
            self.size += 1;
            true
        } else {
            self.missed = self.missed.saturating_add(1);
            self.rd = (self.rd + 1) % QUEUE_SIZE;
            false
        }
    }

    pub fn pop(&mut self) -> Option<ReadBuf> {
        if self.size == 0 {
            return None;
        }
        let event = self.entries[self.rd];
        self.rd = (self.rd + 1) % QUEUE_SIZE;
        self.size -= 1;
        Some(event)
    }

    /// Empty the ring and forget missed events.
    pub fn reset(&mut self) {
        self.size = 0;
        self.wr = 0;
        self.rd = 0;
        self.missed = 0;
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size == QUEUE_SIZE
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Read and clear the missed count.
    pub fn take_missed(&mut self) -> u32 {
        core::mem::take(&mut self.missed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u32) -> ReadBuf {
        ReadBuf {
            trigger_number: n,
            ..ReadBuf::default()
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut q = EventQueue::new();
        assert!(q.push(event(1)));
        assert!(q.push(event(2)));

        assert_eq!(q.pop().map(|e| e.trigger_number), Some(1));
        assert_eq!(q.pop().map(|e| e.trigger_number), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut q = EventQueue::new();
        let extra = 5;
        for n in 1..=(QUEUE_SIZE as u32 + extra) {
            q.push(event(n));
        }

        assert!(q.is_full());
        assert_eq!(q.missed(), extra);
        assert_eq!(q.pop().map(|e| e.trigger_number), Some(extra + 1));
        assert_eq!(q.len(), QUEUE_SIZE - 1);
    }

    #[test]
    fn test_take_missed_clears() {
        let mut q = EventQueue::new();
        for n in 0..=(QUEUE_SIZE as u32) {
            q.push(event(n));
        }
        assert_eq!(q.take_missed(), 1);
        assert_eq!(q.missed(), 0);

        q.reset();
        assert!(q.is_empty());
    }
}
