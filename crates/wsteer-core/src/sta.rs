//! # Stations
//!
//! A station is a global per-MAC record; its relation to each AP that
//! has ever seen it lives in a separate `StaInfo` record carrying the
//! signal history, admission counters, kick bookkeeping, and the roam
//! and scan sub-state for that (STA, AP) pair.

use std::collections::VecDeque;

use serde::Serialize;

use crate::ids::{CandidateId, MacAddr, MeasurementId, NodeId, StaId, StaInfoId};

/// Admission-relevant 802.11 management event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Probe = 0,
    Auth = 1,
    Assoc = 2,
}

impl EventType {
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Beacon-measurement request modes (802.11k).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BeaconMode {
    Passive = 0,
    Active = 1,
    Table = 2,
}

/// Station capabilities as reported by the driver on association.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StaCaps {
    pub beacon_passive: bool,
    pub beacon_active: bool,
    pub beacon_table: bool,
    pub bss_transition: bool,
    pub mbo: bool,
}

impl StaCaps {
    pub fn supports_beacon_mode(&self, mode: BeaconMode) -> bool {
        match mode {
            BeaconMode::Passive => self.beacon_passive,
            BeaconMode::Active => self.beacon_active,
            BeaconMode::Table => self.beacon_table,
        }
    }
}

/// Connection state of a station on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    NotConnected,
    Connected,
    Disconnected,
}

/// Per-event-type admission counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EventStats {
    pub requests: u32,
    /// Consecutive blocks; reset on acceptance or after `sta_block_timeout`.
    pub blocked_cur: u32,
    pub blocked_total: u32,
    pub blocked_last_time: u64,
}

/// Roam state machine phases for one (STA, AP) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoamState {
    Idle,
    /// Looking for a scan opportunity; queueing beacon jobs.
    Searching,
    /// A scan cycle is running.
    Scan,
    /// A better candidate was found; BTM pending.
    ScanDone,
}

/// Scan coordinator state for one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Scanning,
}

/// One queued beacon-measurement job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanJob {
    pub mode: BeaconMode,
    pub op_class: u8,
    pub channel: u8,
    /// Bitmask of requester ids that want this job.
    pub request_sources: u32,
}

/// Per-station scan queue and cycle timestamps.
#[derive(Debug, Clone)]
pub struct StaScan {
    pub state: ScanState,
    pub queue: VecDeque<ScanJob>,
    pub start: u64,
    pub end: u64,
    pub last_request: u64,
}

impl Default for StaScan {
    fn default() -> Self {
        StaScan {
            state: ScanState::Idle,
            queue: VecDeque::new(),
            start: 0,
            end: 0,
            last_request: 0,
        }
    }
}

/// Response to a BSS Transition Management request.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BtmResponse {
    /// 0 = accepted; anything else is a rejection.
    pub status_code: u8,
    pub timestamp: u64,
}

/// Global per-MAC station record.
#[derive(Debug, Clone)]
pub struct Sta {
    pub addr: MacAddr,
    pub seen_2ghz: bool,
    pub seen_5ghz: bool,
    pub caps: StaCaps,

    pub(crate) infos: Vec<StaInfoId>,
    pub(crate) measurements: Vec<MeasurementId>,
    pub(crate) candidates: Vec<CandidateId>,
}

impl Sta {
    pub fn new(addr: MacAddr) -> Self {
        Sta {
            addr,
            seen_2ghz: false,
            seen_5ghz: false,
            caps: StaCaps::default(),
            infos: Vec::new(),
            measurements: Vec::new(),
            candidates: Vec::new(),
        }
    }

    /// Record on which band the station was sighted.
    pub fn note_band(&mut self, freq: u32) {
        if freq > crate::node::FREQ_5GHZ_MIN {
            self.seen_5ghz = true;
        } else {
            self.seen_2ghz = true;
        }
    }

    pub fn info_ids(&self) -> &[StaInfoId] {
        &self.infos
    }
}

/// The relation between one station and one node.
#[derive(Debug, Clone)]
pub struct StaInfo {
    pub sta: StaId,
    pub node: NodeId,

    /// Last observed signal in dBm.
    pub signal: i32,
    pub connected: ConnectionState,
    pub created: u64,
    pub seen: u64,
    pub connected_since: u64,
    pub last_connected: u64,

    pub stats: [EventStats; EventType::COUNT],

    /// Absolute deadline of a scheduled kick; 0 = none pending.
    pub kick_time: u64,
    pub kick_count: u32,
    /// When this station was last kicked by the roam machinery.
    pub roam_kick: u64,
    /// When a BSS transition request was last issued.
    pub last_steer: u64,

    /// Consecutive update ticks spent below `min_snr`.
    pub below_min_snr: u32,

    pub btm_response: Option<BtmResponse>,

    pub roam_state: RoamState,
    pub roam_tries: u32,
    pub roam_event: u64,
    pub roam_scan_start: u64,
    pub roam_scan_finished: bool,

    pub scan: StaScan,
}

impl StaInfo {
    pub fn new(sta: StaId, node: NodeId, now: u64) -> Self {
        StaInfo {
            sta,
            node,
            signal: 0,
            connected: ConnectionState::NotConnected,
            created: now,
            seen: now,
            connected_since: 0,
            last_connected: 0,
            stats: [EventStats::default(); EventType::COUNT],
            kick_time: 0,
            kick_count: 0,
            roam_kick: 0,
            last_steer: 0,
            below_min_snr: 0,
            btm_response: None,
            roam_state: RoamState::Idle,
            roam_tries: 0,
            roam_event: 0,
            roam_scan_start: 0,
            roam_scan_finished: false,
            scan: StaScan::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected == ConnectionState::Connected
    }

    pub fn stats(&self, ev: EventType) -> &EventStats {
        &self.stats[ev.index()]
    }

    pub fn stats_mut(&mut self, ev: EventType) -> &mut EventStats {
        &mut self.stats[ev.index()]
    }
}
