//! # Scan coordinator
//!
//! Per-station queue of 802.11k beacon-measurement jobs. Multiple
//! logical requesters share one radio: jobs are deduplicated by
//! (mode, op-class, channel) and tagged with the requesters that asked,
//! so each requester is notified exactly once per scan cycle, when its
//! last remaining job is dispatched.

use crate::config::SteerConfig;
use crate::driver::{CommandQueue, DriverCommand};
use crate::ids::{NodeId, RequesterId, StaInfoId};
use crate::registry::Registry;
use crate::sta::{BeaconMode, ScanJob, ScanState, StaCaps};

/// 802.11 global operating classes used for beacon requests.
pub const OP_CLASS_2G_1_13: u8 = 81;
pub const OP_CLASS_5G_36_48: u8 = 115;
pub const OP_CLASS_5G_52_64: u8 = 118;
pub const OP_CLASS_5G_100_144: u8 = 121;
pub const OP_CLASS_5G_149_169: u8 = 125;

/// Hard cap on registered requesters (bitmask width).
pub const MAX_REQUESTERS: usize = 32;

/// Registered scan requesters; registration hands out bitmask ids.
#[derive(Debug, Default)]
pub struct ScanRequesters {
    names: Vec<&'static str>,
}

impl ScanRequesters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str) -> Option<RequesterId> {
        if self.names.len() >= MAX_REQUESTERS {
            return None;
        }
        self.names.push(name);
        Some(RequesterId((self.names.len() - 1) as u8))
    }

    pub fn name(&self, id: RequesterId) -> Option<&'static str> {
        self.names.get(id.0 as usize).copied()
    }
}

/// Operating class covering a node's channel.
pub fn node_op_class(freq: u32, channel: u8) -> u8 {
    if freq < 3000 {
        return OP_CLASS_2G_1_13;
    }
    match channel {
        0..=48 => OP_CLASS_5G_36_48,
        49..=64 => OP_CLASS_5G_52_64,
        65..=144 => OP_CLASS_5G_100_144,
        _ => OP_CLASS_5G_149_169,
    }
}

/// Upsert a job; an existing (mode, op-class, channel) entry absorbs
/// the new requester into its source mask.
pub fn list_add(
    reg: &mut Registry,
    si_id: StaInfoId,
    mode: BeaconMode,
    op_class: u8,
    channel: u8,
    requester: RequesterId,
) -> bool {
    let scan = &mut reg.sta_info_mut(si_id).scan;

    if let Some(job) = scan
        .queue
        .iter_mut()
        .find(|j| j.mode == mode && j.op_class == op_class && j.channel == channel)
    {
        job.request_sources |= requester.mask();
        return true;
    }

    scan.queue.push_back(ScanJob {
        mode,
        op_class,
        channel,
        request_sources: requester.mask(),
    });
    true
}

/// Queue the jobs needed to hear `node`, respecting the station's
/// measurement capabilities. 5 GHz channels are scanned passively;
/// active probing is restricted to 2.4 GHz by common client firmware
/// regardless of what the capability bits claim.
fn list_add_node(
    reg: &mut Registry,
    si_id: StaInfoId,
    caps: StaCaps,
    node: NodeId,
    requester: RequesterId,
) -> bool {
    let (freq, channel) = {
        let n = reg.node(node);
        (n.freq, n.channel)
    };

    if freq < 3000 {
        if caps.supports_beacon_mode(BeaconMode::Active)
            || caps.supports_beacon_mode(BeaconMode::Passive)
        {
            return list_add(
                reg,
                si_id,
                BeaconMode::Active,
                OP_CLASS_2G_1_13,
                channel,
                requester,
            );
        }
    } else if caps.supports_beacon_mode(BeaconMode::Passive) {
        return list_add(
            reg,
            si_id,
            BeaconMode::Passive,
            node_op_class(freq, channel),
            channel,
            requester,
        );
    }

    false
}

/// Queue a measurement-table lookup if the station supports it.
pub fn list_add_table(reg: &mut Registry, si_id: StaInfoId, requester: RequesterId) -> bool {
    let sta_id = reg.sta_info(si_id).sta;
    if !reg.sta(sta_id).caps.supports_beacon_mode(BeaconMode::Table) {
        return false;
    }
    list_add(reg, si_id, BeaconMode::Table, 0, 0, requester)
}

/// Queue scans of up to `count` remote neighbors of the station's node.
pub fn list_add_remote(
    reg: &mut Registry,
    si_id: StaInfoId,
    count: usize,
    requester: RequesterId,
) -> bool {
    let (node_id, sta_id) = {
        let si = reg.sta_info(si_id);
        (si.node, si.sta)
    };
    let caps = reg.sta(sta_id).caps;

    let mut neighbors = Vec::new();
    let mut last = None;
    for _ in 0..count {
        match reg.next_neighbor(node_id, last) {
            Some(id) => {
                neighbors.push(id);
                last = Some(id);
            }
            None => break,
        }
    }

    let mut inserted = false;
    for neighbor in neighbors {
        if list_add_node(reg, si_id, caps, neighbor, requester) {
            inserted = true;
        }
    }
    inserted
}

/// Whether the post-scan cooldown still blocks a new cycle.
pub fn timeout_active(reg: &Registry, cfg: &SteerConfig, now: u64, si_id: StaInfoId) -> bool {
    let scan = &reg.sta_info(si_id).scan;
    scan.end != 0 && now.saturating_sub(scan.end) < cfg.scan_timeout
}

/// Start a scan cycle. Fails when one is already running, the cooldown
/// is active, or the queue is empty.
pub fn start(reg: &mut Registry, cfg: &SteerConfig, now: u64, si_id: StaInfoId) -> bool {
    if reg.sta_info(si_id).scan.state != ScanState::Idle {
        return true;
    }
    if timeout_active(reg, cfg, now, si_id) {
        return false;
    }
    if reg.sta_info(si_id).scan.queue.is_empty() {
        return false;
    }

    let scan = &mut reg.sta_info_mut(si_id).scan;
    scan.state = ScanState::Scanning;
    scan.start = now;
    scan.end = 0;
    // First job goes out one pacing interval from now.
    scan.last_request = now;
    true
}

/// End the cycle: clear the queue and remember when it finished.
pub fn stop(reg: &mut Registry, now: u64, si_id: StaInfoId) {
    let scan = &mut reg.sta_info_mut(si_id).scan;
    scan.queue.clear();

    if scan.state == ScanState::Idle {
        return;
    }
    scan.state = ScanState::Idle;
    scan.end = now;
}

/// Withdraw one requester: strip its bit everywhere and drop jobs that
/// nobody wants anymore.
pub fn cancel(reg: &mut Registry, si_id: StaInfoId, requester: RequesterId) {
    let scan = &mut reg.sta_info_mut(si_id).scan;
    for job in scan.queue.iter_mut() {
        job.request_sources &= !requester.mask();
    }
    scan.queue.retain(|j| j.request_sources != 0);
}

/// Dispatch the next queued job to the driver.
///
/// Returns the requesters whose last remaining job this was; the caller
/// delivers their completion notifications. Stops the cycle when the
/// queue runs dry.
pub fn next(
    reg: &mut Registry,
    commands: &mut CommandQueue,
    now: u64,
    si_id: StaInfoId,
) -> Vec<RequesterId> {
    let (node_id, sta_id) = {
        let si = reg.sta_info(si_id);
        (si.node, si.sta)
    };

    let Some(job) = reg.sta_info_mut(si_id).scan.queue.pop_front() else {
        stop(reg, now, si_id);
        return Vec::new();
    };

    let node_key = reg.node(node_id).key.clone();
    let sta_addr = reg.sta(sta_id).addr;
    commands.push(DriverCommand::BeaconRequest {
        node: node_key,
        sta: sta_addr,
        mode: job.mode,
        op_class: job.op_class,
        channel: job.channel,
    });
    reg.sta_info_mut(si_id).scan.last_request = now;

    // A requester is done when none of the remaining jobs carry its bit.
    let mut finished = job.request_sources;
    for remaining in reg.sta_info(si_id).scan.queue.iter() {
        finished &= !remaining.request_sources;
    }

    if reg.sta_info(si_id).scan.queue.is_empty() {
        stop(reg, now, si_id);
    }

    (0..MAX_REQUESTERS as u8)
        .filter(|bit| finished & (1 << bit) != 0)
        .map(RequesterId)
        .collect()
}

/// Deliver completion notifications from [`next`]. The roam machinery
/// consumes its notification as the per-station `roam_scan_finished`
/// flag; other requesters only show up in the trace log.
pub fn deliver_notifications(
    reg: &mut Registry,
    si_id: StaInfoId,
    notified: &[RequesterId],
    roam_requester: RequesterId,
) {
    for requester in notified {
        tracing::trace!(sta_info = si_id.0, requester = requester.0, "scan cycle finished");
        if *requester == roam_requester {
            reg.sta_info_mut(si_id).roam_scan_finished = true;
        }
    }
}
