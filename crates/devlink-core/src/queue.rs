// ── Bounded command queue ──
//
// FIFO shared between producers (any task calling `enqueue`) and the single
// consumer (the executor tick). Offers never block: when the queue is full
// the offered command is dropped and the caller is told so.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use crate::command::Command;

pub struct CommandQueue {
    capacity: usize,
    inner: Mutex<VecDeque<Box<dyn Command>>>,
}

impl CommandQueue {
    /// A queue holding at most `capacity` commands (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        }
    }

    /// Append a command at the tail.
    ///
    /// Returns `false` and drops `command` when the queue is full.
    pub fn enqueue(&self, command: Box<dyn Command>) -> bool {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            warn!(
                command = command.name(),
                capacity = self.capacity,
                "command queue full, dropping command"
            );
            return false;
        }
        trace!(command = command.name(), depth = queue.len() + 1, "command queued");
        queue.push_back(command);
        true
    }

    /// Take the command at the head, if any.
    pub fn poll(&self) -> Option<Box<dyn Command>> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every pending command, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    // A panicking producer cannot leave the deque half-modified, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Box<dyn Command>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
