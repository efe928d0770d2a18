//! # Per-node update tick
//!
//! Runs once per `local_sta_update` for every local node: execute
//! scheduled kicks, evict stations stuck below the minimum SNR, drive
//! the roam machinery, run the load-kick state machine, and pace
//! outstanding beacon-request queues. At most one station is kicked
//! per node per tick.

use crate::candidates::{self, select_reason, CandidateEntry};
use crate::config::SteerConfig;
use crate::driver::{CommandQueue, DriverCommand};
use crate::event::{Event, EventKind, EventQueue};
use crate::ids::{NodeId, RequesterId, StaInfoId};
use crate::policy;
use crate::registry::Registry;
use crate::roam;
use crate::scan;
use crate::sta::ScanState;

fn div_round_up(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}

fn push_kick(
    reg: &Registry,
    commands: &mut CommandQueue,
    cfg: &SteerConfig,
    si_id: StaInfoId,
) {
    let si = reg.sta_info(si_id);
    commands.push(DriverCommand::KickClient {
        node: reg.node(si.node).key.clone(),
        sta: reg.sta(si.sta).addr,
        reason_code: cfg.load_kick_reason_code,
    });
}

/// Execute kicks scheduled by the roam machinery (`kick_time`).
fn run_pending_kicks(
    reg: &mut Registry,
    cfg: &SteerConfig,
    now: u64,
    events: &mut EventQueue,
    commands: &mut CommandQueue,
    node_id: NodeId,
) {
    for si_id in reg.node(node_id).sta_info.clone() {
        let due = {
            let si = reg.sta_info(si_id);
            si.kick_time != 0 && si.kick_time <= now
        };
        if !due {
            continue;
        }

        let connected = reg.sta_info(si_id).is_connected();
        {
            let si = reg.sta_info_mut(si_id);
            si.kick_time = 0;
            si.roam_kick = now;
        }

        // The station may already have followed the transition request.
        if !connected {
            continue;
        }

        let count = {
            let si = reg.sta_info_mut(si_id);
            si.kick_count += 1;
            si.kick_count
        };

        let mut ev = Event::new(EventKind::BtmKick);
        ev.sta = Some(reg.sta(reg.sta_info(si_id).sta).addr);
        ev.node_local = Some(reg.node(node_id).key.clone());
        ev.count = count;
        events.push(ev);

        push_kick(reg, commands, cfg, si_id);
    }
}

/// Kick stations that sat below `min_snr` for `min_snr_kick_delay`.
fn snr_kick(
    reg: &mut Registry,
    cfg: &SteerConfig,
    events: &mut EventQueue,
    commands: &mut CommandQueue,
    node_id: NodeId,
) {
    if cfg.min_snr == 0 {
        return;
    }

    let min_count = div_round_up(cfg.min_snr_kick_delay, cfg.local_sta_update) as u32;
    let min_signal = reg.node(node_id).snr_to_signal(cfg.min_snr);

    for si_id in reg.node(node_id).sta_info.clone() {
        if !reg.sta_info(si_id).is_connected() {
            continue;
        }

        if reg.sta_info(si_id).signal >= min_signal {
            reg.sta_info_mut(si_id).below_min_snr = 0;
            continue;
        }

        let streak = {
            let si = reg.sta_info_mut(si_id);
            si.below_min_snr += 1;
            si.below_min_snr
        };
        if streak <= min_count {
            continue;
        }

        let (count, signal) = {
            let si = reg.sta_info_mut(si_id);
            si.kick_count += 1;
            (si.kick_count, si.signal)
        };

        let mut ev = Event::new(EventKind::SignalKick);
        ev.sta = Some(reg.sta(reg.sta_info(si_id).sta).addr);
        ev.node_local = Some(reg.node(node_id).key.clone());
        ev = ev.with_threshold(signal as i64, min_signal as i64);
        ev.count = count;
        events.push(ev);

        push_kick(reg, commands, cfg, si_id);
        return;
    }
}

/// Drive the roam machinery for every station on the node. Returns
/// true when a station was kicked.
fn roam_check(
    reg: &mut Registry,
    cfg: &SteerConfig,
    now: u64,
    events: &mut EventQueue,
    commands: &mut CommandQueue,
    node_id: NodeId,
    requester: RequesterId,
) -> bool {
    let min_snr = if cfg.roam_scan_snr != 0 {
        cfg.roam_scan_snr
    } else if cfg.roam_trigger_snr != 0 {
        cfg.roam_trigger_snr
    } else {
        return false;
    };
    let min_signal = reg.node(node_id).snr_to_signal(min_snr);

    for si_id in reg.node(node_id).sta_info.clone() {
        let signal = reg.sta_info(si_id).signal;
        if !policy::can_perform_steer(cfg, now, reg, si_id) || signal >= min_signal {
            roam::reset(reg, now, si_id, requester);
            continue;
        }

        roam::activate(reg, now, si_id, requester);

        // One kick per tick per node; the rest wait their turn.
        if roam::trigger_sm(reg, cfg, now, events, commands, si_id, requester) {
            return true;
        }
    }

    false
}

/// Pick the station that should go first when load forces an eviction:
/// fewest past kicks, then the strongest signal (a strong station will
/// reassociate well elsewhere).
fn is_more_kickable(reg: &Registry, current: Option<StaInfoId>, new: StaInfoId) -> bool {
    let Some(current) = current else {
        return true;
    };

    let cur = reg.sta_info(current);
    let candidate = reg.sta_info(new);

    if candidate.kick_count != cur.kick_count {
        return candidate.kick_count < cur.kick_count;
    }
    candidate.signal > cur.signal
}

/// Load-kick state machine: count ticks above the threshold, then evict
/// one station, preferring one that has somewhere better to go.
fn load_kick(
    reg: &mut Registry,
    cfg: &SteerConfig,
    now: u64,
    events: &mut EventQueue,
    commands: &mut CommandQueue,
    node_id: NodeId,
) {
    if !cfg.load_kick_enabled || cfg.load_kick_threshold == 0 || cfg.load_kick_delay == 0 {
        return;
    }

    let min_count = div_round_up(cfg.load_kick_delay, cfg.local_sta_update) as u32;
    let node_key = reg.node(node_id).key.clone();
    let load = reg.node(node_id).load;

    let mut ev = Event::new(EventKind::LoadKickReset);
    ev.node_local = Some(node_key.clone());

    if load < cfg.load_kick_threshold {
        if reg.node(node_id).load_thr_count == 0 {
            return;
        }
        reg.node_mut(node_id).load_thr_count = 0;

        ev = ev.with_threshold(load as i64, cfg.load_kick_threshold as i64);
        events.push(ev);
        return;
    }

    reg.node_mut(node_id).load_thr_count += 1;
    let count = reg.node(node_id).load_thr_count;

    if count <= min_count {
        // Announce once when the threshold is first crossed.
        if count > 1 {
            return;
        }
        ev.kind = EventKind::LoadKickTrigger;
        ev = ev.with_threshold(load as i64, cfg.load_kick_threshold as i64);
        events.push(ev);
        return;
    }

    reg.node_mut(node_id).load_thr_count = 0;

    let n_assoc = reg.node(node_id).n_assoc;
    if n_assoc < cfg.load_kick_min_clients {
        ev.kind = EventKind::LoadKickMinClients;
        ev = ev.with_threshold(n_assoc as i64, cfg.load_kick_min_clients as i64);
        events.push(ev);
        return;
    }

    let mut kick_any: Option<StaInfoId> = None;
    let mut kick_backed: Option<StaInfoId> = None;
    let mut backing: Option<CandidateEntry> = None;

    for si_id in reg.node(node_id).sta_info.clone() {
        if !reg.sta_info(si_id).is_connected() {
            continue;
        }

        if is_more_kickable(reg, kick_any, si_id) {
            kick_any = Some(si_id);
        }

        let Some(candidate) =
            candidates::find_better_candidate(reg, cfg, now, si_id, select_reason::LOAD, 0)
        else {
            continue;
        };

        if is_more_kickable(reg, kick_backed, si_id) {
            kick_backed = Some(si_id);
            backing = Some(candidate);
        }
    }

    let Some(victim) = kick_backed.or(kick_any) else {
        ev.kind = EventKind::LoadKickNoClient;
        events.push(ev);
        return;
    };

    let count = {
        let si = reg.sta_info_mut(victim);
        si.kick_count += 1;
        si.kick_count
    };

    ev.kind = EventKind::LoadKickClient;
    ev.sta = Some(reg.sta(reg.sta_info(victim).sta).addr);
    ev.candidate = backing.map(|c| reg.node(c.node).key.clone());
    ev.count = count;
    events.push(ev);

    push_kick(reg, commands, cfg, victim);
}

/// Dispatch the next beacon request of every station whose scan cycle
/// is due for its next job.
fn pace_scans(
    reg: &mut Registry,
    cfg: &SteerConfig,
    now: u64,
    commands: &mut CommandQueue,
    node_id: NodeId,
    requester: RequesterId,
) {
    for si_id in reg.node(node_id).sta_info.clone() {
        let due = {
            let scan = &reg.sta_info(si_id).scan;
            scan.state == ScanState::Scanning
                && now.saturating_sub(scan.last_request) >= cfg.scan_interval
        };
        if !due {
            continue;
        }

        let notified = scan::next(reg, commands, now, si_id);
        scan::deliver_notifications(reg, si_id, &notified, requester);
    }
}

/// One full update tick of a local node.
pub fn local_node_tick(
    reg: &mut Registry,
    cfg: &SteerConfig,
    now: u64,
    events: &mut EventQueue,
    commands: &mut CommandQueue,
    node_id: NodeId,
    roam_requester: RequesterId,
    band_requester: RequesterId,
) {
    run_pending_kicks(reg, cfg, now, events, commands, node_id);
    snr_kick(reg, cfg, events, commands, node_id);
    crate::band::band_steer_check(reg, cfg, now, events, commands, node_id, band_requester);
    roam_check(reg, cfg, now, events, commands, node_id, roam_requester);
    load_kick(reg, cfg, now, events, commands, node_id);
    pace_scans(reg, cfg, now, commands, node_id, roam_requester);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MacAddr;
    use crate::node::{Node, NodeType};
    use crate::sta::ConnectionState;

    struct Fixture {
        reg: Registry,
        cfg: SteerConfig,
        events: EventQueue,
        commands: CommandQueue,
        node: NodeId,
    }

    fn fixture(cfg: SteerConfig) -> Fixture {
        let mut reg = Registry::new();
        let mut node = Node::new("a#w0".to_string(), NodeType::Local, 0);
        node.ssid = "net".into();
        node.freq = 2412;
        node.channel = 6;
        let node = reg.insert_node(node);

        Fixture {
            reg,
            cfg,
            events: EventQueue::new(),
            commands: CommandQueue::new(),
            node,
        }
    }

    fn connect_sta(f: &mut Fixture, last_octet: u8, signal: i32) -> StaInfoId {
        let sta = f.reg.sta_get_or_create(MacAddr::new([2, 0, 0, 0, 0, last_octet]));
        let si = f.reg.sta_info_get_or_create(sta, f.node, 0);
        f.reg.sta_info_mut(si).connected = ConnectionState::Connected;
        f.reg.sta_info_mut(si).signal = signal;
        f.reg.refresh_n_assoc(f.node);
        si
    }

    fn tick(f: &mut Fixture, now: u64) {
        local_node_tick(
            &mut f.reg,
            &f.cfg,
            now,
            &mut f.events,
            &mut f.commands,
            f.node,
            RequesterId(0),
            RequesterId(1),
        );
    }

    fn kick_count(f: &mut Fixture) -> usize {
        f.commands
            .drain()
            .filter(|c| matches!(c, DriverCommand::KickClient { .. }))
            .count()
    }

    #[test]
    fn snr_kick_requires_persistent_weakness() {
        let cfg = SteerConfig {
            min_snr: 20, // -75 dBm
            min_snr_kick_delay: 3_000,
            ..SteerConfig::default()
        };
        let mut f = fixture(cfg);
        let si = connect_sta(&mut f, 1, -80);

        // Streak must exceed 3000 / 1000 = 3 ticks.
        for t in 1..=3u64 {
            tick(&mut f, t * 1_000);
            assert_eq!(kick_count(&mut f), 0, "tick {t}");
        }
        tick(&mut f, 4_000);
        assert_eq!(kick_count(&mut f), 1);
        assert_eq!(f.reg.sta_info(si).kick_count, 1);

        let kinds: Vec<_> = f.events.drain().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::SignalKick));
    }

    #[test]
    fn snr_streak_resets_on_recovery() {
        let cfg = SteerConfig {
            min_snr: 20,
            min_snr_kick_delay: 3_000,
            ..SteerConfig::default()
        };
        let mut f = fixture(cfg);
        let si = connect_sta(&mut f, 1, -80);

        tick(&mut f, 1_000);
        tick(&mut f, 2_000);
        assert_eq!(f.reg.sta_info(si).below_min_snr, 2);

        f.reg.sta_info_mut(si).signal = -60;
        tick(&mut f, 3_000);
        assert_eq!(f.reg.sta_info(si).below_min_snr, 0);
    }

    #[test]
    fn load_kick_full_sequence() {
        let cfg = SteerConfig {
            load_kick_enabled: true,
            load_kick_threshold: 75,
            load_kick_delay: 10_000,
            load_kick_min_clients: 2,
            ..SteerConfig::default()
        };
        let mut f = fixture(cfg);
        f.reg.node_mut(f.node).load = 80;

        let strong = connect_sta(&mut f, 1, -50);
        let _weak = connect_sta(&mut f, 2, -70);

        // Tick 1 announces the armed threshold.
        tick(&mut f, 1_000);
        let kinds: Vec<_> = f.events.drain().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::LoadKickTrigger));
        assert_eq!(kick_count(&mut f), 0);

        // Ticks 2..=10 count silently.
        for t in 2..=10u64 {
            tick(&mut f, t * 1_000);
            assert_eq!(kick_count(&mut f), 0, "tick {t}");
        }

        // Tick 11 kicks the strongest-signal station.
        tick(&mut f, 11_000);
        assert_eq!(kick_count(&mut f), 1);
        assert_eq!(f.reg.sta_info(strong).kick_count, 1);
        let kinds: Vec<_> = f.events.drain().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::LoadKickClient));

        // The counter rearmed: the next tick does not kick again.
        tick(&mut f, 12_000);
        assert_eq!(kick_count(&mut f), 0);
    }

    #[test]
    fn load_kick_reset_below_threshold() {
        let cfg = SteerConfig {
            load_kick_enabled: true,
            ..SteerConfig::default()
        };
        let mut f = fixture(cfg);
        f.reg.node_mut(f.node).load = 80;
        connect_sta(&mut f, 1, -50);

        tick(&mut f, 1_000);
        tick(&mut f, 2_000);
        assert_eq!(f.reg.node(f.node).load_thr_count, 2);

        f.reg.node_mut(f.node).load = 60;
        tick(&mut f, 3_000);
        assert_eq!(f.reg.node(f.node).load_thr_count, 0);
        let kinds: Vec<_> = f.events.drain().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::LoadKickReset));
    }

    #[test]
    fn load_kick_respects_min_clients() {
        let cfg = SteerConfig {
            load_kick_enabled: true,
            load_kick_delay: 2_000,
            load_kick_min_clients: 5,
            ..SteerConfig::default()
        };
        let mut f = fixture(cfg);
        f.reg.node_mut(f.node).load = 90;
        connect_sta(&mut f, 1, -50);

        for t in 1..=3u64 {
            tick(&mut f, t * 1_000);
        }
        assert_eq!(kick_count(&mut f), 0);
        let kinds: Vec<_> = f.events.drain().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::LoadKickMinClients));
    }

    #[test]
    fn load_kick_prefers_candidate_backed_station() {
        let cfg = SteerConfig {
            load_kick_enabled: true,
            load_kick_delay: 2_000,
            load_kick_min_clients: 1,
            signal_diff_threshold: 5,
            ..SteerConfig::default()
        };
        let mut f = fixture(cfg);
        f.reg.node_mut(f.node).load = 90;

        // `strong` would win on signal alone; `backed` has an escape
        // route off the overloaded node.
        let strong = connect_sta(&mut f, 1, -40);
        let backed = connect_sta(&mut f, 2, -70);

        let mut other = Node::new("b#w0".to_string(), NodeType::Remote, 0);
        other.ssid = "net".into();
        other.freq = 5745;
        other.channel = 149;
        other.load = 10;
        let other = f.reg.insert_node(other);

        let backed_sta = f.reg.sta_info(backed).sta;
        let si_other = f.reg.sta_info_get_or_create(backed_sta, other, 0);
        f.reg.sta_info_mut(si_other).signal = -55;

        // Keep n_assoc above the kick floor on the loaded node only.
        f.reg.refresh_n_assoc(f.node);

        for t in 1..=3u64 {
            f.reg.sta_info_mut(si_other).seen = t * 1_000;
            tick(&mut f, t * 1_000);
        }

        assert_eq!(f.reg.sta_info(backed).kick_count, 1);
        assert_eq!(f.reg.sta_info(strong).kick_count, 0);
    }

    #[test]
    fn pending_kick_executes_once_due() {
        let cfg = SteerConfig::default();
        let mut f = fixture(cfg);
        let si = connect_sta(&mut f, 1, -60);
        f.reg.sta_info_mut(si).kick_time = 5_000;

        tick(&mut f, 4_000);
        assert_eq!(kick_count(&mut f), 0);

        tick(&mut f, 5_000);
        assert_eq!(kick_count(&mut f), 1);
        assert_eq!(f.reg.sta_info(si).kick_time, 0);
        assert_eq!(f.reg.sta_info(si).roam_kick, 5_000);
        let kinds: Vec<_> = f.events.drain().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::BtmKick));
    }

    #[test]
    fn pending_kick_skipped_after_disconnect() {
        let cfg = SteerConfig::default();
        let mut f = fixture(cfg);
        let si = connect_sta(&mut f, 1, -60);
        f.reg.sta_info_mut(si).kick_time = 5_000;
        f.reg.sta_info_mut(si).connected = ConnectionState::Disconnected;

        tick(&mut f, 5_000);
        assert_eq!(kick_count(&mut f), 0);
        assert_eq!(f.reg.sta_info(si).kick_time, 0);
    }
}
