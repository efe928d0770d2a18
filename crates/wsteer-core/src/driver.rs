//! # Driver command queue
//!
//! The core never performs I/O. Radio-side actions are queued as
//! `DriverCommand` values and drained by the embedding daemon after
//! each core entry point, which makes every suspension point of the
//! event loop explicit and keeps the core deterministic under test.

use std::collections::VecDeque;

use serde::Serialize;

use crate::ids::MacAddr;
use crate::sta::BeaconMode;

/// An action for the local radio driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DriverCommand {
    /// Send an 802.11k beacon-measurement request to a station.
    BeaconRequest {
        node: String,
        sta: MacAddr,
        mode: BeaconMode,
        op_class: u8,
        channel: u8,
    },
    /// Send an 802.11v BSS Transition Management request.
    BssTransitionRequest {
        node: String,
        sta: MacAddr,
        dialog_token: u8,
        disassoc_imminent: bool,
        abridged: bool,
        validity_period: u8,
        /// Key of the suggested target node.
        target: String,
        /// Neighbor-report frame for the target, preference included.
        #[serde(with = "hex_frame")]
        neighbor_report: Vec<u8>,
    },
    /// Forcibly disassociate a station.
    KickClient {
        node: String,
        sta: MacAddr,
        reason_code: u32,
    },
    /// Announce an upcoming disassociation to a station.
    NotifyClientDisassoc { node: String, sta: MacAddr },
}

/// Pending commands, drained by the embedding daemon.
#[derive(Debug, Default)]
pub struct CommandQueue {
    queue: VecDeque<DriverCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: DriverCommand) {
        self.queue.push_back(command);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = DriverCommand> + '_ {
        self.queue.drain(..)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Serialize neighbor-report frames as hex strings on the driver socket.
mod hex_frame {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(frame: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&crate::neighbor::dump_hex(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_serialize_tagged() {
        let cmd = DriverCommand::KickClient {
            node: "a#wlan0".into(),
            sta: MacAddr::new([2, 0, 0, 0, 0, 1]),
            reason_code: 5,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["cmd"], "kick_client");
        assert_eq!(json["reason_code"], 5);
    }

    #[test]
    fn neighbor_report_serializes_as_hex() {
        let cmd = DriverCommand::BssTransitionRequest {
            node: "a#wlan0".into(),
            sta: MacAddr::new([2, 0, 0, 0, 0, 1]),
            dialog_token: 1,
            disassoc_imminent: false,
            abridged: false,
            validity_period: 100,
            target: "b#wlan0".into(),
            neighbor_report: vec![0xaa, 0x01],
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["neighbor_report"], "AA01");
    }
}
