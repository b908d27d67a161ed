//! Priority-ordered ready queue.
//!
//! Entries are kept in non-increasing priority order from head to tail, and
//! tasks of equal priority keep their insertion order, so popping the head
//! always yields the oldest of the most urgent tasks.

use alloc::collections::VecDeque;

use super::{Pid, Priority, SchedError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEntry {
    pub pid: Pid,
    pub priority: Priority,
}

pub struct ReadyQueue {
    entries: VecDeque<ReadyEntry>,
}

impl ReadyQueue {
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Links `pid` behind every entry of equal or higher priority.
    ///
    /// Grows the queue if needed; callers on interrupt paths reserve
    /// capacity up front with [`ReadyQueue::try_reserve`].
    pub fn insert(&mut self, pid: Pid, priority: Priority) {
        let entry = ReadyEntry { pid, priority };

        // Fast path: most inserts land at the tail.
        match self.entries.back() {
            None => {
                self.entries.push_back(entry);
                return;
            }
            Some(tail) if tail.priority >= priority => {
                self.entries.push_back(entry);
                return;
            }
            Some(_) => {}
        }

        // The tail ranks below us, so the scan always finds a slot.
        match self.entries.iter().position(|e| e.priority < priority) {
            Some(index) => self.entries.insert(index, entry),
            None => panic!("ready queue: no slot for pid {} priority {}", pid, priority),
        }
    }

    /// Unlinks and returns the head.
    pub fn pop_highest(&mut self) -> Option<ReadyEntry> {
        self.entries.pop_front()
    }

    pub fn peek(&self) -> Option<&ReadyEntry> {
        self.entries.front()
    }

    /// Unlinks `pid`; returns whether it was queued.
    pub fn remove(&mut self, pid: Pid) -> bool {
        match self.entries.iter().position(|e| e.pid == pid) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.entries.iter().any(|e| e.pid == pid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Head-to-tail iteration.
    pub fn iter(&self) -> impl Iterator<Item = &ReadyEntry> + '_ {
        self.entries.iter()
    }

    /// Makes room for `additional` more entries without allocating later.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), SchedError> {
        self.entries
            .try_reserve(additional)
            .map_err(|_| SchedError::NoMemory)
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
