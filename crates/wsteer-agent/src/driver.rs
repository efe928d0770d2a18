//! Driver socket protocol: newline-delimited JSON over a unix socket to
//! the radio helper. Inbound frames are events (management requests,
//! connection changes, beacon reports); outbound frames are the core's
//! `DriverCommand`s plus accept/deny replies to admission requests.

use serde::{Deserialize, Serialize};
use wsteer_core::ids::MacAddr;
use wsteer_core::sta::StaCaps;

/// One inbound frame from the radio helper.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DriverEvent {
    /// A local BSS came up.
    NodeAdded {
        node: String,
        ssid: String,
        bssid: MacAddr,
        freq: u32,
        channel: u8,
        #[serde(default)]
        max_assoc: u32,
    },
    /// A local BSS went away.
    NodeRemoved { node: String },
    /// Periodic channel survey refresh.
    NodeUpdate { node: String, load: u8, noise: i32 },
    /// The helper's RRM neighbor-report template for a BSS.
    NrTemplate {
        node: String,
        bssid: String,
        ssid: String,
        frame: String,
    },

    /// Management-frame admission requests; each expects a reply
    /// carrying the same `id`.
    Probe {
        id: u64,
        node: String,
        sta: MacAddr,
        freq: u32,
        signal: i32,
    },
    Auth {
        id: u64,
        node: String,
        sta: MacAddr,
        freq: u32,
        signal: i32,
    },
    Assoc {
        id: u64,
        node: String,
        sta: MacAddr,
        freq: u32,
        signal: i32,
    },

    Connected {
        node: String,
        sta: MacAddr,
        signal: i32,
        #[serde(default)]
        caps: StaCaps,
    },
    Disconnected { node: String, sta: MacAddr },
    /// Periodic per-station signal refresh.
    Signal {
        node: String,
        sta: MacAddr,
        signal: i32,
    },

    /// 802.11k beacon report from a station.
    BeaconReport {
        sta: MacAddr,
        bssid: MacAddr,
        rcpi: u8,
        rsni: u8,
    },
    /// 802.11v BSS transition response.
    BtmResponse {
        node: String,
        sta: MacAddr,
        status_code: u8,
    },
    /// A station asked for a neighbor report; expects a reply with the
    /// ranked neighbor frames.
    NeighborQuery { id: u64, node: String },
}

/// Replies to driver requests, matched up via `reply_to`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DriverReply {
    Admission { reply_to: u64, accept: bool },
    /// Hex-encoded neighbor-report frames, best candidate first.
    Neighbors {
        reply_to: u64,
        neighbors: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_event_parses() {
        let json = r#"{"event":"probe","id":7,"node":"a#wlan0","sta":"02:00:00:00:00:01","freq":2412,"signal":-61}"#;
        let ev: DriverEvent = serde_json::from_str(json).unwrap();
        match ev {
            DriverEvent::Probe { id, signal, .. } => {
                assert_eq!(id, 7);
                assert_eq!(signal, -61);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn connected_event_defaults_caps() {
        let json =
            r#"{"event":"connected","node":"a#wlan0","sta":"02:00:00:00:00:01","signal":-55}"#;
        let ev: DriverEvent = serde_json::from_str(json).unwrap();
        match ev {
            DriverEvent::Connected { caps, .. } => assert_eq!(caps, StaCaps::default()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn caps_parse_partially() {
        let json = r#"{"event":"connected","node":"a#wlan0","sta":"02:00:00:00:00:01",
                       "signal":-55,"caps":{"beacon_passive":true,"bss_transition":true}}"#;
        let ev: DriverEvent = serde_json::from_str(json).unwrap();
        match ev {
            DriverEvent::Connected { caps, .. } => {
                assert!(caps.beacon_passive && caps.bss_transition);
                assert!(!caps.beacon_table);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn reply_shapes() {
        let reply = DriverReply::Admission {
            reply_to: 7,
            accept: false,
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["reply_to"], 7);
        assert_eq!(json["accept"], false);

        let reply = DriverReply::Neighbors {
            reply_to: 9,
            neighbors: vec!["AA01".into()],
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["neighbors"][0], "AA01");
    }
}
