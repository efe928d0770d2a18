//! # AP nodes
//!
//! One record per access point known to the cluster: the radios of this
//! host (local) and everything learned over gossip (remote). Nodes are
//! keyed by a stable string of the form `host#interface`.

use crate::ids::{CandidateId, MacAddr, MeasurementId, StaInfoId};
use crate::neighbor;

/// Default noise floor assumed when the driver reports none.
pub const DEFAULT_NOISE_FLOOR: i32 = -95;

/// Frequencies above this are treated as the 5 GHz band.
pub const FREQ_5GHZ_MIN: u32 = 4000;

/// Whether a node is driven by the local radio or learned from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Local,
    Remote,
}

/// An RRM neighbor-report template as handed out by the driver:
/// printable BSSID, SSID, and the decoded report frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NrTemplate {
    pub bssid: String,
    pub ssid: String,
    pub frame: Vec<u8>,
}

impl NrTemplate {
    /// Decode a driver-provided template from its hex form.
    pub fn from_hex(bssid: &str, ssid: &str, hex: &str) -> Option<Self> {
        let frame = neighbor::parse_hex(hex).ok()?;
        if !neighbor::nr_valid(&frame) {
            return None;
        }
        Some(NrTemplate {
            bssid: bssid.to_string(),
            ssid: ssid.to_string(),
            frame,
        })
    }

    pub fn op_class(&self) -> u8 {
        neighbor::nr_op_class(&self.frame).unwrap_or(0)
    }

    pub fn channel(&self) -> u8 {
        neighbor::nr_channel(&self.frame).unwrap_or(0)
    }

    /// The template frame with the candidate-preference subelement set,
    /// trimmed back to its exact length.
    pub fn frame_with_preference(&self, preference: u8) -> Option<Vec<u8>> {
        let mut buf = self.frame.clone();
        // Slack for one preference subelement; an existing one is
        // replaced in place.
        buf.resize(buf.len() + 3, 0);

        neighbor::nr_set_subelement(&mut buf, neighbor::NR_SUBELEMENT_PREFERENCE, &[preference])
            .ok()?;

        let len = neighbor::nr_len(&buf).ok()?;
        buf.truncate(len);
        Some(buf)
    }
}

/// An access point participating in the cluster.
#[derive(Debug, Clone)]
pub struct Node {
    /// Stable key, `host#interface`.
    pub key: String,
    pub node_type: NodeType,
    pub bssid: MacAddr,
    pub ssid: String,
    /// Operating frequency in MHz.
    pub freq: u32,
    pub channel: u8,
    pub op_class: u8,
    /// Noise floor in dBm; 0 when the driver has not reported one.
    pub noise: i32,
    /// Currently associated stations.
    pub n_assoc: u32,
    /// Association cap; 0 = unlimited.
    pub max_assoc: u32,
    /// Channel utilization 0..=100.
    pub load: u8,
    pub rrm_nr: Option<NrTemplate>,
    pub disabled: bool,
    pub created: u64,
    /// Last driver or gossip refresh.
    pub last_update: u64,

    /// Ticks spent above the load-kick threshold (local nodes).
    pub load_thr_count: u32,
    /// Last band-steering sweep over this node's stations.
    pub last_band_steer: u64,

    pub(crate) sta_info: Vec<StaInfoId>,
    pub(crate) measurements: Vec<MeasurementId>,
    pub(crate) candidates: Vec<CandidateId>,
}

impl Node {
    pub fn new(key: String, node_type: NodeType, now: u64) -> Self {
        Node {
            key,
            node_type,
            bssid: MacAddr::default(),
            ssid: String::new(),
            freq: 0,
            channel: 0,
            op_class: 0,
            noise: 0,
            n_assoc: 0,
            max_assoc: 0,
            load: 0,
            rrm_nr: None,
            disabled: false,
            created: now,
            last_update: now,
            load_thr_count: 0,
            last_band_steer: 0,
            sta_info: Vec::new(),
            measurements: Vec::new(),
            candidates: Vec::new(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.node_type == NodeType::Local
    }

    pub fn is_5ghz(&self) -> bool {
        self.freq > FREQ_5GHZ_MIN
    }

    fn noise_floor(&self) -> i32 {
        if self.noise != 0 {
            self.noise
        } else {
            DEFAULT_NOISE_FLOOR
        }
    }

    /// Convert an SNR threshold to an absolute signal level at this
    /// node's noise floor. Negative inputs are already dBm and pass
    /// through.
    pub fn snr_to_signal(&self, snr: i32) -> i32 {
        if snr < 0 {
            return snr;
        }
        self.noise_floor() + snr
    }

    /// Inverse of [`Node::snr_to_signal`] for measured signal levels.
    pub fn signal_to_snr(&self, signal: i32) -> i32 {
        signal - self.noise_floor()
    }

    /// Sighting records of stations this node has seen.
    pub fn sta_info_ids(&self) -> &[StaInfoId] {
        &self.sta_info
    }
}
