//! Client contexts, one per open minor device.

use crate::event::ReadBuf;
use crate::queue::EventQueue;
use crate::sync::{IrqLock, Semaphore};
use crate::timer::TimerId;

/// Handle of an open client, the minor device number minus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub usize);

impl ClientId {
    pub const fn index(self) -> usize {
        self.0
    }

    /// Minor device number this client was opened on.
    pub const fn minor(self) -> u32 {
        self.0 as u32 + 1
    }
}

/// Mutable part of a client context.
pub struct ClientState {
    /// Minor device is open
    pub in_use: bool,
    /// Process that opened it
    pub pid: u32,
    /// Selected module index
    pub module: usize,
    /// Read timeout in ticks, 0 waits forever
    pub timeout: u32,
    /// Software debug level, non zero logs each ioctl
    pub debug: u32,
    /// Discard queued events at each read
    pub queue_off: bool,
    /// Pending events, oldest first
    pub queue: EventQueue,
    /// Armed read timer
    pub timer: Option<TimerId>,
}

impl ClientState {
    fn closed() -> Self {
        Self {
            in_use: false,
            pid: 0,
            module: 0,
            timeout: 0,
            debug: 0,
            queue_off: false,
            queue: EventQueue::new(),
            timer: None,
        }
    }

    /// Initialise for a new open.
    pub fn open(&mut self, pid: u32, timeout: u32) {
        *self = Self::closed();
        self.in_use = true;
        self.pid = pid;
        self.timeout = timeout;
    }

    /// Queue an event for this client. Must run inside the client's critical
    /// section so that a concurrent queue reset sees queue and count agree.
    pub fn deliver(&mut self, event: ReadBuf, semaphore: &Semaphore) {
        if self.queue.push(event) {
            semaphore.signal();
        }
    }
}

pub struct ClientContext {
    /// Position in the client table, the minor number minus one
    index: usize,
    pub state: IrqLock<ClientState>,
    /// One count per queued event
    pub semaphore: Semaphore,
}

impl ClientContext {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: IrqLock::new(ClientState::closed()),
            semaphore: Semaphore::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        ClientId(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_open(&self) -> bool {
        self.state.with(|s| s.in_use)
    }

    /// Push an event and wake the reader.
    pub fn deliver(&self, event: ReadBuf) {
        self.state.with(|s| s.deliver(event, &self.semaphore));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QUEUE_SIZE;

    #[test]
    fn test_deliver_signals_until_full() {
        let client = ClientContext::new(0);
        client.state.with(|s| s.open(42, 100));

        for _ in 0..QUEUE_SIZE + 3 {
            client.deliver(ReadBuf::default());
        }
        assert_eq!(client.semaphore.count(), QUEUE_SIZE as u32);
        assert_eq!(client.state.with(|s| s.queue.missed()), 3);
    }

    #[test]
    fn test_open_resets_state() {
        let client = ClientContext::new(4);
        client.deliver(ReadBuf::default());
        client.state.with(|s| s.open(7, 2000));

        assert!(client.is_open());
        assert_eq!(client.id().minor(), 5);
        client.state.with(|s| {
            assert_eq!(s.pid, 7);
            assert_eq!(s.timeout, 2000);
            assert!(s.queue.is_empty());
        });
    }
}
