//! # Status snapshots
//!
//! Read-only views of the registry for the operator socket and the
//! `--dump-after` development mode.

use serde::Serialize;

use crate::ids::MacAddr;
use crate::node::NodeType;
use crate::registry::Registry;
use crate::sta::{ConnectionState, EventStats, RoamState, ScanState, StaCaps};

#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub key: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub bssid: MacAddr,
    pub ssid: String,
    pub freq: u32,
    pub channel: u8,
    pub op_class: u8,
    pub noise: i32,
    pub load: u8,
    pub n_assoc: u32,
    pub max_assoc: u32,
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaLinkStatus {
    pub node: String,
    pub signal: i32,
    pub connected: ConnectionState,
    pub seen_ms_ago: u64,
    pub roam_state: RoamState,
    pub scan_state: ScanState,
    pub kick_count: u32,
    /// Per-event-type counters, indexed probe/auth/assoc.
    pub stats: [EventStats; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct StaStatus {
    pub addr: MacAddr,
    pub seen_2ghz: bool,
    pub seen_5ghz: bool,
    pub caps: StaCaps,
    pub links: Vec<StaLinkStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub now: u64,
    pub nodes: Vec<NodeStatus>,
    pub stations: Vec<StaStatus>,
}

pub(crate) fn snapshot(reg: &Registry, now: u64) -> StatusReport {
    let nodes = reg
        .node_ids()
        .into_iter()
        .map(|id| {
            let n = reg.node(id);
            NodeStatus {
                key: n.key.clone(),
                node_type: n.node_type,
                bssid: n.bssid,
                ssid: n.ssid.clone(),
                freq: n.freq,
                channel: n.channel,
                op_class: n.op_class,
                noise: n.noise,
                load: n.load,
                n_assoc: n.n_assoc,
                max_assoc: n.max_assoc,
                disabled: n.disabled,
            }
        })
        .collect();

    let stations = reg
        .sta_ids()
        .into_iter()
        .map(|id| {
            let sta = reg.sta(id);
            let links = sta
                .info_ids()
                .iter()
                .map(|&si_id| {
                    let si = reg.sta_info(si_id);
                    StaLinkStatus {
                        node: reg.node(si.node).key.clone(),
                        signal: si.signal,
                        connected: si.connected,
                        seen_ms_ago: now.saturating_sub(si.seen),
                        roam_state: si.roam_state,
                        scan_state: si.scan.state,
                        kick_count: si.kick_count,
                        stats: si.stats,
                    }
                })
                .collect();

            StaStatus {
                addr: sta.addr,
                seen_2ghz: sta.seen_2ghz,
                seen_5ghz: sta.seen_5ghz,
                caps: sta.caps,
                links,
            }
        })
        .collect();

    StatusReport {
        now,
        nodes,
        stations,
    }
}
