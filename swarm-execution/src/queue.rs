//! Strict FIFO admission queue

use std::collections::VecDeque;

use swarm_core::BenchmarkRequest;

use crate::error::EmptyQueueError;
use crate::ledger::CapacityLedger;

/// A queued request and the position it was enqueued at
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    /// Monotonic insertion counter, starting at 0
    pub position: u64,
    pub request: BenchmarkRequest,
}

impl QueueEntry {
    /// Node slots this entry needs
    pub fn slots(&self) -> usize {
        self.request.num_nodes
    }
}

/// Unbounded FIFO of waiting requests.
///
/// Only the head is ever considered for admission. A later entry is never
/// admitted ahead of an earlier one, even when it would fit and the head
/// does not.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    entries: VecDeque<QueueEntry>,
    next_position: u64,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request to the tail and return its position
    pub fn push(&mut self, request: BenchmarkRequest) -> u64 {
        let position = self.next_position;
        self.next_position += 1;
        self.entries.push_back(QueueEntry { position, request });
        position
    }

    pub fn peek(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    pub fn pop(&mut self) -> Result<QueueEntry, EmptyQueueError> {
        self.entries.pop_front().ok_or(EmptyQueueError)
    }

    /// Admit the head if the ledger can reserve its slots.
    ///
    /// On success the slots are reserved and the head is removed. Otherwise
    /// neither the queue nor the ledger changes.
    pub fn try_admit_next(&mut self, ledger: &mut CapacityLedger) -> Option<QueueEntry> {
        let slots = self.peek()?.slots();
        if !ledger.reserve(slots) {
            return None;
        }
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every waiting entry, returning them front to back
    pub fn clear(&mut self) -> Vec<QueueEntry> {
        self.entries.drain(..).collect()
    }

    /// Entries front to back
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }
}
