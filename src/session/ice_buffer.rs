//! FIFO buffer for remote candidates that arrive before the remote
//! description.
//!
//! Candidates must be applied in arrival order, so the buffer preserves
//! insertion order exactly and is drained in one pass once the remote
//! description lands.

use std::collections::VecDeque;

use crate::signaling::IceCandidateRecord;

#[derive(Debug, Default)]
pub struct IceCandidateBuffer {
    queue: VecDeque<IceCandidateRecord>,
}

impl IceCandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: IceCandidateRecord) {
        self.queue.push_back(candidate);
    }

    /// Remove and return all buffered candidates in arrival order.
    pub fn drain(&mut self) -> Vec<IceCandidateRecord> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
