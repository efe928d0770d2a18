//! # Gossip messages
//!
//! Peer APs exchange periodic host updates: a summary of every local
//! node plus the stations it has recently seen. Delivery is best-effort
//! multicast; the receiving core treats everything as aged hints.

use serde::{Deserialize, Serialize};

use crate::ids::MacAddr;

/// One station as seen by a peer's node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaSummary {
    pub addr: MacAddr,
    pub signal: i32,
    /// Age of the sighting at send time, in ms.
    pub seen_ms_ago: u64,
    pub connected: bool,
}

/// One node of a peer host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    /// The node's key on its own host (interface part).
    pub name: String,
    pub bssid: MacAddr,
    pub ssid: String,
    pub freq: u32,
    pub channel: u8,
    pub op_class: u8,
    pub noise: i32,
    pub n_assoc: u32,
    pub max_assoc: u32,
    pub load: u8,
    /// RRM neighbor-report template: (bssid, ssid, hex frame).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrm_nr: Option<(String, String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stations: Vec<StaSummary>,
}

/// A full gossip frame from one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostUpdate {
    /// Stable host identifier (hostname or primary MAC).
    pub host: String,
    pub nodes: Vec<NodeSummary>,
}
