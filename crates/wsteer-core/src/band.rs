//! # Band steering
//!
//! Periodic sweep over the stations of each 2.4 GHz node: a
//! dual-band-capable station with decent signal is nudged toward a
//! co-located 5 GHz BSS. When the station's 5 GHz sighting is stale,
//! the sweep requests a measurement first instead of steering blind;
//! the scan coordinator merges these jobs with any roam-scan work.

use crate::config::SteerConfig;
use crate::driver::CommandQueue;
use crate::event::EventQueue;
use crate::ids::{NodeId, RequesterId, StaInfoId};
use crate::policy;
use crate::registry::Registry;
use crate::roam;
use crate::scan;
use crate::sta::BeaconMode;

/// A co-located 5 GHz target for stations on this node, if any.
fn find_target(reg: &Registry, node_id: NodeId) -> Option<NodeId> {
    let ssid = &reg.node(node_id).ssid;

    reg.local_node_ids().into_iter().find(|&id| {
        let node = reg.node(id);
        id != node_id
            && node.is_5ghz()
            && !node.disabled
            && node.ssid == *ssid
            && policy::below_max_assoc(node)
    })
}

/// Whether the station's sighting on `target` is recent and strong
/// enough to steer on.
fn usable_sighting(
    reg: &Registry,
    cfg: &SteerConfig,
    now: u64,
    si_id: StaInfoId,
    target: NodeId,
) -> Option<StaInfoId> {
    let sta = reg.sta_info(si_id).sta;
    let on_target = reg.find_sta_info(sta, target)?;

    let seen = reg.sta_info(on_target).seen;
    if now.saturating_sub(seen) > cfg.seen_policy_timeout {
        return None;
    }
    if !policy::over_min_signal(cfg, reg.node(target), reg.sta_info(on_target).signal) {
        return None;
    }

    Some(on_target)
}

/// Ask the station to measure the target's channel.
fn request_measurement(
    reg: &mut Registry,
    cfg: &SteerConfig,
    now: u64,
    si_id: StaInfoId,
    target: NodeId,
    requester: RequesterId,
) {
    let sta = reg.sta_info(si_id).sta;
    let caps = reg.sta(sta).caps;
    let (freq, channel) = {
        let node = reg.node(target);
        (node.freq, node.channel)
    };

    let mut queued = scan::list_add_table(reg, si_id, requester);
    if caps.supports_beacon_mode(BeaconMode::Passive) {
        queued |= scan::list_add(
            reg,
            si_id,
            BeaconMode::Passive,
            scan::node_op_class(freq, channel),
            channel,
            requester,
        );
    }

    if queued {
        scan::start(reg, cfg, now, si_id);
    }
}

/// One band-steering sweep of a local node, rate-limited to
/// `band_steering_interval`.
pub fn band_steer_check(
    reg: &mut Registry,
    cfg: &SteerConfig,
    now: u64,
    events: &mut EventQueue,
    commands: &mut CommandQueue,
    node_id: NodeId,
    requester: RequesterId,
) {
    if cfg.band_steering_interval == 0 {
        return;
    }
    // Stations on 5 GHz already sit where we want them.
    if reg.node(node_id).is_5ghz() {
        return;
    }
    if now.saturating_sub(reg.node(node_id).last_band_steer) < cfg.band_steering_interval {
        return;
    }
    reg.node_mut(node_id).last_band_steer = now;

    let Some(target) = find_target(reg, node_id) else {
        return;
    };

    let min_signal = if cfg.band_steering_min_snr != 0 {
        Some(reg.node(node_id).snr_to_signal(cfg.band_steering_min_snr))
    } else {
        None
    };

    for si_id in reg.node(node_id).sta_info.clone() {
        if !reg.sta_info(si_id).is_connected() {
            continue;
        }
        let sta = reg.sta_info(si_id).sta;
        if !reg.sta(sta).seen_5ghz {
            continue;
        }
        // Weak stations are better served by the roam machinery.
        if let Some(min_signal) = min_signal {
            if reg.sta_info(si_id).signal < min_signal {
                continue;
            }
        }
        if !policy::can_perform_steer(cfg, now, reg, si_id) {
            continue;
        }

        if usable_sighting(reg, cfg, now, si_id, target).is_some() {
            roam::issue_transition(reg, cfg, now, events, commands, si_id, target, false);
        } else {
            request_measurement(reg, cfg, now, si_id, target, requester);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverCommand;
    use crate::ids::MacAddr;
    use crate::node::{Node, NodeType};
    use crate::sta::{ConnectionState, StaCaps};

    struct Fixture {
        reg: Registry,
        cfg: SteerConfig,
        events: EventQueue,
        commands: CommandQueue,
        node_2g: NodeId,
        node_5g: NodeId,
    }

    fn fixture() -> Fixture {
        let mut reg = Registry::new();

        let mut node_2g = Node::new("a#wlan0".into(), NodeType::Local, 0);
        node_2g.ssid = "net".into();
        node_2g.freq = 2412;
        node_2g.channel = 6;
        let node_2g = reg.insert_node(node_2g);

        let mut node_5g = Node::new("a#wlan1".into(), NodeType::Local, 0);
        node_5g.ssid = "net".into();
        node_5g.freq = 5180;
        node_5g.channel = 36;
        let node_5g = reg.insert_node(node_5g);

        Fixture {
            reg,
            cfg: SteerConfig {
                band_steering_interval: 60_000,
                band_steering_min_snr: 20, // -75 dBm
                ..SteerConfig::default()
            },
            events: EventQueue::new(),
            commands: CommandQueue::new(),
            node_2g,
            node_5g,
        }
    }

    fn dual_band_sta(f: &mut Fixture, last: u8, signal: i32) -> StaInfoId {
        let sta = f.reg.sta_get_or_create(MacAddr::new([2, 0, 0, 0, 0, last]));
        {
            let sta = f.reg.sta_mut(sta);
            sta.seen_5ghz = true;
            sta.seen_2ghz = true;
            sta.caps = StaCaps {
                beacon_passive: true,
                bss_transition: true,
                ..StaCaps::default()
            };
        }
        let si = f.reg.sta_info_get_or_create(sta, f.node_2g, 0);
        f.reg.sta_info_mut(si).connected = ConnectionState::Connected;
        f.reg.sta_info_mut(si).signal = signal;
        si
    }

    fn sweep(f: &mut Fixture, now: u64) {
        band_steer_check(
            &mut f.reg,
            &f.cfg,
            now,
            &mut f.events,
            &mut f.commands,
            f.node_2g,
            RequesterId(1),
        );
    }

    #[test]
    fn fresh_5ghz_sighting_triggers_transition() {
        let mut f = fixture();
        let now = 1_000_000;
        let si = dual_band_sta(&mut f, 1, -60);

        let sta = f.reg.sta_info(si).sta;
        let si_5g = f.reg.sta_info_get_or_create(sta, f.node_5g, now);
        f.reg.sta_info_mut(si_5g).signal = -55;
        f.reg.sta_info_mut(si_5g).seen = now;

        sweep(&mut f, now);

        let cmds: Vec<_> = f.commands.drain().collect();
        assert!(cmds.iter().any(|c| matches!(
            c,
            DriverCommand::BssTransitionRequest { target, .. } if target == "a#wlan1"
        )));
        // Gentle steer: no forced kick behind it.
        assert_eq!(f.reg.sta_info(si).kick_time, 0);
        assert_eq!(f.reg.sta_info(si).last_steer, now);
    }

    #[test]
    fn stale_sighting_requests_measurement_instead() {
        let mut f = fixture();
        let now = 1_000_000;
        let si = dual_band_sta(&mut f, 1, -60);

        sweep(&mut f, now);

        // No steer yet; the station is asked to measure channel 36 first.
        assert!(f.commands.is_empty());
        let scan = &f.reg.sta_info(si).scan;
        assert_eq!(scan.state, crate::sta::ScanState::Scanning);
        assert!(scan
            .queue
            .iter()
            .any(|j| j.mode == BeaconMode::Passive && j.channel == 36));
    }

    #[test]
    fn weak_stations_are_left_to_roam_machinery() {
        let mut f = fixture();
        let now = 1_000_000;
        dual_band_sta(&mut f, 1, -85);

        sweep(&mut f, now);
        assert!(f.commands.is_empty());
    }

    #[test]
    fn sweep_rate_limited_per_node() {
        let mut f = fixture();
        let now = 1_000_000;
        let si = dual_band_sta(&mut f, 1, -60);
        let sta = f.reg.sta_info(si).sta;
        let si_5g = f.reg.sta_info_get_or_create(sta, f.node_5g, now);
        f.reg.sta_info_mut(si_5g).signal = -55;
        f.reg.sta_info_mut(si_5g).seen = now;

        sweep(&mut f, now);
        assert_eq!(f.commands.drain().count(), 1);

        // Within the interval nothing happens, even for new sightings.
        f.reg.sta_info_mut(si).last_steer = 0;
        f.reg.sta_info_mut(si_5g).seen = now + 1_000;
        sweep(&mut f, now + 1_000);
        assert_eq!(f.commands.drain().count(), 0);
    }

    #[test]
    fn single_band_station_is_ignored() {
        let mut f = fixture();
        let now = 1_000_000;
        let si = dual_band_sta(&mut f, 1, -60);
        let sta = f.reg.sta_info(si).sta;
        f.reg.sta_mut(sta).seen_5ghz = false;

        sweep(&mut f, now);
        assert!(f.commands.is_empty());
        assert!(f.reg.sta_info(si).scan.queue.is_empty());
    }
}
