//! # Structured steering events
//!
//! Every decision path emits one record describing what happened and
//! the thresholds involved. The agent drains the queue after each core
//! entry point and feeds its log sink and scripted hooks.

use std::collections::VecDeque;

use serde::Serialize;

use crate::ids::MacAddr;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProbeReqAccept,
    ProbeReqDeny,
    AuthReqAccept,
    AuthReqDeny,
    AssocReqAccept,
    AssocReqDeny,
    LoadKickTrigger,
    LoadKickReset,
    LoadKickMinClients,
    LoadKickNoClient,
    LoadKickClient,
    SignalKick,
    /// Scheduled kick after an unanswered BSS transition request.
    BtmKick,
    /// Kick after exhausting the allowed roam scan rounds.
    RoamKick,
    BssTransitionRequest,
    /// A driver-provided neighbor report failed to decode.
    InvalidNr,
}

/// Why a request was denied or flipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventReason {
    LowSignal,
    ConnectDelay,
    BetterCandidate,
    RetryExceeded,
}

/// Current vs. reference value behind a threshold decision.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Threshold {
    pub cur: i64,
    pub reference: i64,
}

/// One emitted event record.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EventReason>,
    /// Local node the decision ran on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_local: Option<String>,
    /// Node the station is currently on, when different.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_cur: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sta: Option<MacAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sta_other: Option<MacAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_other: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,
    /// Bitmask of selection reasons (see `candidates::select_reason`).
    #[serde(skip_serializing_if = "is_zero")]
    pub select_reasons: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub count: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Event {
            kind,
            reason: None,
            node_local: None,
            node_cur: None,
            sta: None,
            sta_other: None,
            candidate: None,
            candidate_other: None,
            threshold: None,
            select_reasons: 0,
            count: 0,
        }
    }

    pub fn with_threshold(mut self, cur: i64, reference: i64) -> Self {
        self.threshold = Some(Threshold { cur, reference });
        self
    }
}

/// FIFO of pending events, drained by the embedding daemon.
#[derive(Debug, Default)]
pub struct EventQueue {
    queue: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.queue.drain(..)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
