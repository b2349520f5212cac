//! Bounded snapshot buffer.

use crate::snapshot::NetworkSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Oldest-first bounded buffer of captured frames.
///
/// Appending past capacity evicts from the front in O(1). Frame numbers are
/// strictly increasing, so lookups by frame number are a binary search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRing {
    capacity: usize,
    frames: VecDeque<Arc<NetworkSnapshot>>,
    evicted: u64,
}

impl SnapshotRing {
    /// Create an empty ring. A zero capacity is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity),
            evicted: 0,
        }
    }

    /// Append a frame, returning the frame evicted to make room, if any.
    pub fn push(&mut self, snapshot: Arc<NetworkSnapshot>) -> Option<Arc<NetworkSnapshot>> {
        self.frames.push_back(snapshot);
        if self.frames.len() > self.capacity {
            self.evicted += 1;
            self.frames.pop_front()
        } else {
            None
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total frames dropped from the front since the ring was created.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn get(&self, index: usize) -> Option<&Arc<NetworkSnapshot>> {
        self.frames.get(index)
    }

    pub fn first(&self) -> Option<&Arc<NetworkSnapshot>> {
        self.frames.front()
    }

    pub fn last(&self) -> Option<&Arc<NetworkSnapshot>> {
        self.frames.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<NetworkSnapshot>> {
        self.frames.iter()
    }

    /// Buffer index of the frame with this global frame number.
    pub fn position_of(&self, frame_number: u64) -> Option<usize> {
        self.frames
            .binary_search_by_key(&frame_number, |s| s.frame_number)
            .ok()
    }
}
