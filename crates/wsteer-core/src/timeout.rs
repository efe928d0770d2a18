//! # Timeout wheel
//!
//! One ordered queue of monotonic deadlines for the whole core:
//! candidate and measurement TTLs, station-record expiry, and the
//! periodic per-node tick. Entries carry a tagged payload instead of a
//! callback; the core dispatches on the tag when [`TimeoutWheel::poll`]
//! hands expired entries back.

use std::collections::{BTreeMap, HashMap};

use crate::ids::{CandidateId, MeasurementId, NodeId, StaInfoId};

/// What fires when a deadline expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutPayload {
    /// A candidate record's TTL ran out.
    Candidate(CandidateId),
    /// A measurement report's TTL ran out.
    Measurement(MeasurementId),
    /// A station-at-node record expired.
    StaInfo(StaInfoId),
    /// Periodic tick of a local node, or expiry check of a remote one.
    NodeTick(NodeId),
}

/// Priority structure keyed on `(deadline, insertion-seq)`.
///
/// The sequence number keeps same-deadline entries in insertion order
/// and makes keys unique. Re-arming an already-queued payload moves it.
#[derive(Debug, Default)]
pub struct TimeoutWheel {
    queue: BTreeMap<(u64, u64), TimeoutPayload>,
    index: HashMap<TimeoutPayload, (u64, u64)>,
    seq: u64,
}

impl TimeoutWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) `payload` to fire at `deadline` (absolute ms).
    pub fn set(&mut self, payload: TimeoutPayload, deadline: u64) {
        if let Some(key) = self.index.remove(&payload) {
            self.queue.remove(&key);
        }

        let key = (deadline, self.seq);
        self.seq += 1;
        self.queue.insert(key, payload);
        self.index.insert(payload, key);
    }

    /// Disarm `payload`. Returns whether it was queued.
    pub fn cancel(&mut self, payload: TimeoutPayload) -> bool {
        match self.index.remove(&payload) {
            Some(key) => {
                self.queue.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Pop every entry whose deadline is at or before `now`, in
    /// deadline order.
    pub fn poll(&mut self, now: u64) -> Vec<TimeoutPayload> {
        let mut fired = Vec::new();

        while let Some((&key, &payload)) = self.queue.iter().next() {
            if key.0 > now {
                break;
            }
            self.queue.remove(&key);
            self.index.remove(&payload);
            fired.push(payload);
        }

        fired
    }

    /// Earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.keys().next().map(|&(deadline, _)| deadline)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
