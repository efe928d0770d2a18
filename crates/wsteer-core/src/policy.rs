//! # Steering policy
//!
//! The comparison predicates shared by the candidate-list builder, the
//! admission decision for probe/auth/assoc requests, and the
//! eligibility gate of the roam machinery.

use crate::candidates::{self, select_reason};
use crate::config::SteerConfig;
use crate::event::{Event, EventKind, EventQueue, EventReason};
use crate::ids::StaInfoId;
use crate::node::Node;
use crate::registry::Registry;
use crate::sta::{ConnectionState, EventType};

// ─── Node comparison predicates ─────────────────────────────────────────────

/// Whether the node still has association capacity.
pub fn below_max_assoc(node: &Node) -> bool {
    node.max_assoc == 0 || node.n_assoc < node.max_assoc
}

/// Whether `signal` clears the configured minimum thresholds at `node`.
pub fn over_min_signal(cfg: &SteerConfig, node: &Node, signal: i32) -> bool {
    if cfg.min_snr != 0 && signal < node.snr_to_signal(cfg.min_snr) {
        return false;
    }
    if cfg.roam_trigger_snr != 0 && signal < node.snr_to_signal(cfg.roam_trigger_snr) {
        return false;
    }
    true
}

/// Association-count comparison with band-steering and load-balancing
/// bias: 5 GHz gets a head start of `band_steering_threshold`
/// associations, and a move must beat `load_balancing_threshold` slack.
pub fn below_assoc_threshold(cfg: &SteerConfig, node_cur: &Node, node_new: &Node) -> bool {
    let mut n_cur = node_cur.n_assoc as i64;
    let mut n_new = node_new.n_assoc as i64;

    if node_cur.is_5ghz() && !node_new.is_5ghz() {
        n_new += cfg.band_steering_threshold as i64;
    } else if !node_cur.is_5ghz() && node_new.is_5ghz() {
        n_cur += cfg.band_steering_threshold as i64;
    }

    n_new += cfg.load_balancing_threshold as i64;

    n_new <= n_cur
}

/// Whether the new signal beats the current one by more than the
/// configured margin. A zero margin disables the criterion.
pub fn better_signal_strength(cfg: &SteerConfig, signal_cur: i32, signal_new: i32) -> bool {
    if cfg.signal_diff_threshold == 0 {
        return false;
    }
    signal_new - signal_cur > cfg.signal_diff_threshold
}

/// Whether the node sits above the load-kick limits.
pub fn over_load_limit(cfg: &SteerConfig, node: &Node) -> bool {
    node.n_assoc >= cfg.load_kick_min_clients && node.load > cfg.load_kick_threshold
}

/// Whether moving from `node_cur` to `node_new` escapes an overloaded
/// node.
pub fn has_better_load(cfg: &SteerConfig, node_cur: &Node, node_new: &Node) -> bool {
    over_load_limit(cfg, node_cur) && !over_load_limit(cfg, node_new)
}

/// Reasons why `node_new` would serve the station better than
/// `node_cur`, as a [`select_reason`] bitmask. Zero means the node is
/// not a viable candidate at all.
pub fn is_better_candidate(
    cfg: &SteerConfig,
    node_cur: &Node,
    signal_cur: i32,
    node_new: &Node,
    signal_new: i32,
) -> u32 {
    let mut reasons = 0;

    if !below_max_assoc(node_new) {
        return 0;
    }
    if !over_min_signal(cfg, node_new, signal_new) {
        return 0;
    }

    if below_assoc_threshold(cfg, node_cur, node_new)
        && !below_assoc_threshold(cfg, node_new, node_cur)
    {
        reasons |= select_reason::NUM_ASSOC;
    }

    if better_signal_strength(cfg, signal_cur, signal_new) {
        reasons |= select_reason::SIGNAL;
    }

    if has_better_load(cfg, node_cur, node_new) && !has_better_load(cfg, node_new, node_cur) {
        reasons |= select_reason::LOAD;
    }

    reasons
}

/// Whether a foreign sighting record may enter the candidate list for
/// the given reference record.
pub fn node_selectable_by_sta_info(
    cfg: &SteerConfig,
    reg: &Registry,
    now: u64,
    reference: StaInfoId,
    foreign: StaInfoId,
    signal_max_age: u64,
) -> bool {
    let si_ref = reg.sta_info(reference);
    let si_new = reg.sta_info(foreign);
    let node_ref = reg.node(si_ref.node);
    let node_new = reg.node(si_new.node);

    if node_new.ssid != node_ref.ssid || node_new.disabled {
        return false;
    }

    let age = now.saturating_sub(si_new.seen);
    if signal_max_age != 0 && signal_max_age < age {
        return false;
    }
    if cfg.seen_policy_timeout < age {
        return false;
    }

    below_max_assoc(node_new) && over_min_signal(cfg, node_new, si_new.signal)
}

// ─── Steering eligibility ───────────────────────────────────────────────────

/// Whether the roam machinery may act on this station at all.
pub fn can_perform_steer(cfg: &SteerConfig, now: u64, reg: &Registry, si_id: StaInfoId) -> bool {
    let si = reg.sta_info(si_id);

    if si.connected != ConnectionState::Connected {
        return false;
    }

    // A kick is already scheduled.
    if si.kick_time != 0 {
        return false;
    }

    // The station recently refused a BSS transition.
    if let Some(resp) = si.btm_response {
        if resp.status_code != 0 && now.saturating_sub(resp.timestamp) < cfg.steer_reject_timeout {
            return false;
        }
    }

    if now.saturating_sub(si.roam_kick) < cfg.steer_trigger_interval {
        return false;
    }
    if now.saturating_sub(si.last_steer) < cfg.steer_trigger_interval {
        return false;
    }
    if now.saturating_sub(si.connected_since) < cfg.steer_trigger_interval {
        return false;
    }

    true
}

// ─── Admission ──────────────────────────────────────────────────────────────

fn event_kind(ev_type: EventType, accept: bool) -> EventKind {
    match (ev_type, accept) {
        (EventType::Probe, true) => EventKind::ProbeReqAccept,
        (EventType::Probe, false) => EventKind::ProbeReqDeny,
        (EventType::Auth, true) => EventKind::AuthReqAccept,
        (EventType::Auth, false) => EventKind::AuthReqDeny,
        (EventType::Assoc, true) => EventKind::AssocReqAccept,
        (EventType::Assoc, false) => EventKind::AssocReqDeny,
    }
}

/// Decide whether to accept a probe/auth/assoc request, maintain the
/// per-event-type blocked counters, and emit the decision event.
pub fn check_request(
    reg: &mut Registry,
    cfg: &SteerConfig,
    now: u64,
    events: &mut EventQueue,
    si_id: StaInfoId,
    ev_type: EventType,
) -> bool {
    // The consecutive-block streak expires after sta_block_timeout.
    {
        let si = reg.sta_info_mut(si_id);
        let stats = si.stats_mut(ev_type);
        if stats.blocked_cur > 0 && now.saturating_sub(stats.blocked_last_time) > cfg.sta_block_timeout
        {
            stats.blocked_cur = 0;
        }
    }

    let (node_id, signal, created, sta_id) = {
        let si = reg.sta_info(si_id);
        (si.node, si.signal, si.created, si.sta)
    };
    let sta_addr = reg.sta(sta_id).addr;
    let node_key = reg.node(node_id).key.clone();

    let mut accept = true;
    let mut reason = None;
    let mut threshold = None;
    let mut select_reasons = 0;
    let mut candidate_key = None;

    'decide: {
        if ev_type == EventType::Auth {
            // Auth is policed at association time.
            break 'decide;
        }

        if ev_type == EventType::Probe && !cfg.probe_steering {
            break 'decide;
        }

        if ev_type == EventType::Assoc {
            // Block assoc below min_snr even with assoc steering off;
            // accepting here would start an assoc/kick loop.
            if cfg.min_snr != 0 {
                let min_signal = reg.node(node_id).snr_to_signal(cfg.min_snr);
                if signal < min_signal {
                    accept = false;
                    reason = Some(EventReason::LowSignal);
                    threshold = Some((signal as i64, min_signal as i64));
                    break 'decide;
                }
            }
            if !cfg.assoc_steering {
                break 'decide;
            }
        }

        let min_signal = reg.node(node_id).snr_to_signal(cfg.min_connect_snr);
        if signal < min_signal {
            accept = false;
            reason = Some(EventReason::LowSignal);
            threshold = Some((signal as i64, min_signal as i64));
            break 'decide;
        }

        let age = now.saturating_sub(created);
        if age < cfg.initial_connect_delay {
            accept = false;
            reason = Some(EventReason::ConnectDelay);
            threshold = Some((age as i64, cfg.initial_connect_delay as i64));
            break 'decide;
        }

        if let Some(better) =
            candidates::find_better_candidate(reg, cfg, now, si_id, select_reason::ALL, 0)
        {
            accept = false;
            reason = Some(EventReason::BetterCandidate);
            select_reasons = better.reasons;
            candidate_key = Some(reg.node(better.node).key.clone());
        }
    }

    // Retry-band regime: a station denied max_retry_band times in a row
    // is let through so it cannot be locked out of the network.
    if !accept {
        let blocked_cur = reg.sta_info(si_id).stats(ev_type).blocked_cur;
        if blocked_cur >= cfg.max_retry_band {
            accept = true;
            reason = Some(EventReason::RetryExceeded);
            threshold = Some((blocked_cur as i64, cfg.max_retry_band as i64));
        }
    }

    {
        let si = reg.sta_info_mut(si_id);
        let stats = si.stats_mut(ev_type);
        stats.requests += 1;
        if accept {
            stats.blocked_cur = 0;
        } else {
            stats.blocked_cur += 1;
            stats.blocked_total += 1;
            stats.blocked_last_time = now;
        }
    }

    let mut ev = Event::new(event_kind(ev_type, accept));
    ev.reason = reason;
    ev.sta = Some(sta_addr);
    ev.node_local = Some(node_key.clone());
    if reason == Some(EventReason::BetterCandidate) {
        ev.node_cur = Some(node_key);
        ev.candidate = candidate_key;
        ev.select_reasons = select_reasons;
    }
    if let Some((cur, reference)) = threshold {
        ev = ev.with_threshold(cur, reference);
    }
    events.push(ev);

    accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MacAddr;
    use crate::node::NodeType;
    use crate::sta::BtmResponse;

    fn add_node(reg: &mut Registry, key: &str, freq: u32) -> crate::ids::NodeId {
        let mut n = Node::new(key.to_string(), NodeType::Local, 0);
        n.ssid = "net".to_string();
        n.freq = freq;
        reg.insert_node(n)
    }

    fn cfg() -> SteerConfig {
        SteerConfig::default()
    }

    #[test]
    fn assoc_bias_favors_5ghz() {
        let mut reg = Registry::new();
        let n2 = add_node(&mut reg, "a#w0", 2412);
        let n5 = add_node(&mut reg, "b#w0", 5180);
        let cfg = cfg();

        // Equal counts: the 5 GHz node wins the comparison from 2.4.
        assert!(below_assoc_threshold(
            &cfg,
            reg.node(n2),
            reg.node(n5)
        ));
        assert!(!below_assoc_threshold(
            &cfg,
            reg.node(n5),
            reg.node(n2)
        ));
    }

    #[test]
    fn signal_margin_disabled_at_zero() {
        let cfg = cfg();
        assert!(!better_signal_strength(&cfg, -80, -20));

        let cfg = SteerConfig {
            signal_diff_threshold: 5,
            ..cfg
        };
        assert!(better_signal_strength(&cfg, -70, -60));
        assert!(!better_signal_strength(&cfg, -70, -66));
    }

    #[test]
    fn load_reason_requires_escape_from_overload() {
        let mut reg = Registry::new();
        let cur = add_node(&mut reg, "a#w0", 2412);
        let other = add_node(&mut reg, "b#w0", 2412);
        let cfg = cfg();

        reg.node_mut(cur).load = 90;
        reg.node_mut(cur).n_assoc = 12;
        reg.node_mut(other).load = 10;

        assert!(has_better_load(&cfg, reg.node(cur), reg.node(other)));
        assert!(!has_better_load(&cfg, reg.node(other), reg.node(cur)));

        // Below min clients the node does not count as overloaded.
        reg.node_mut(cur).n_assoc = 2;
        assert!(!has_better_load(&cfg, reg.node(cur), reg.node(other)));
    }

    #[test]
    fn steer_eligibility_gates() {
        let mut reg = Registry::new();
        let node = add_node(&mut reg, "a#w0", 2412);
        let sta = reg.sta_get_or_create(MacAddr::new([2, 0, 0, 0, 0, 1]));
        let si = reg.sta_info_get_or_create(sta, node, 0);
        let cfg = cfg();
        let now = 500_000;

        assert!(!can_perform_steer(&cfg, now, &reg, si), "not connected");

        reg.sta_info_mut(si).connected = ConnectionState::Connected;
        reg.sta_info_mut(si).connected_since = 100_000;
        assert!(can_perform_steer(&cfg, now, &reg, si));

        reg.sta_info_mut(si).kick_time = now + 1_000;
        assert!(!can_perform_steer(&cfg, now, &reg, si), "kick pending");
        reg.sta_info_mut(si).kick_time = 0;

        reg.sta_info_mut(si).btm_response = Some(BtmResponse {
            status_code: 7,
            timestamp: now - 10_000,
        });
        assert!(!can_perform_steer(&cfg, now, &reg, si), "recent BTM reject");

        reg.sta_info_mut(si).btm_response = Some(BtmResponse {
            status_code: 0,
            timestamp: now - 10_000,
        });
        assert!(can_perform_steer(&cfg, now, &reg, si), "accepted BTM is fine");

        reg.sta_info_mut(si).last_steer = now - 30_000;
        assert!(!can_perform_steer(&cfg, now, &reg, si), "steered recently");

        reg.sta_info_mut(si).last_steer = 0;
        reg.sta_info_mut(si).connected_since = now - 10_000;
        assert!(!can_perform_steer(&cfg, now, &reg, si), "connected too recently");
    }

    #[test]
    fn auth_is_always_accepted() {
        let mut reg = Registry::new();
        let node = add_node(&mut reg, "a#w0", 2412);
        let sta = reg.sta_get_or_create(MacAddr::new([2, 0, 0, 0, 0, 1]));
        let si = reg.sta_info_get_or_create(sta, node, 0);
        reg.sta_info_mut(si).signal = -90;

        let cfg = SteerConfig {
            min_connect_snr: 30,
            ..cfg()
        };
        let mut events = EventQueue::new();

        assert!(check_request(&mut reg, &cfg, 0, &mut events, si, EventType::Auth));
        let ev: Vec<_> = events.drain().collect();
        assert_eq!(ev[0].kind, EventKind::AuthReqAccept);
    }

    #[test]
    fn assoc_below_min_snr_denied_even_without_assoc_steering() {
        let mut reg = Registry::new();
        let node = add_node(&mut reg, "a#w0", 2412);
        let sta = reg.sta_get_or_create(MacAddr::new([2, 0, 0, 0, 0, 1]));
        let si = reg.sta_info_get_or_create(sta, node, 0);
        reg.sta_info_mut(si).signal = -90;

        let cfg = SteerConfig {
            min_snr: 20, // threshold -75 dBm at default noise floor
            assoc_steering: false,
            ..cfg()
        };
        let mut events = EventQueue::new();

        assert!(!check_request(&mut reg, &cfg, 0, &mut events, si, EventType::Assoc));
        let ev: Vec<_> = events.drain().collect();
        assert_eq!(ev[0].kind, EventKind::AssocReqDeny);
        assert_eq!(ev[0].reason, Some(EventReason::LowSignal));
        assert_eq!(ev[0].threshold.unwrap().reference, -75);
    }

    #[test]
    fn retry_band_flips_to_accept_and_resets() {
        let mut reg = Registry::new();
        let node = add_node(&mut reg, "a#w0", 2412);
        let sta = reg.sta_get_or_create(MacAddr::new([2, 0, 0, 0, 0, 1]));
        let si = reg.sta_info_get_or_create(sta, node, 0);
        reg.sta_info_mut(si).signal = -90;

        let cfg = SteerConfig {
            min_connect_snr: 30,
            probe_steering: true,
            max_retry_band: 5,
            ..cfg()
        };
        let mut events = EventQueue::new();

        for i in 1..=5 {
            assert!(!check_request(&mut reg, &cfg, 100, &mut events, si, EventType::Probe));
            assert_eq!(reg.sta_info(si).stats(EventType::Probe).blocked_cur, i);
        }

        // Sixth attempt flips to accept with RetryExceeded.
        assert!(check_request(&mut reg, &cfg, 200, &mut events, si, EventType::Probe));
        let last = events.drain().last().unwrap();
        assert_eq!(last.kind, EventKind::ProbeReqAccept);
        assert_eq!(last.reason, Some(EventReason::RetryExceeded));
        assert_eq!(reg.sta_info(si).stats(EventType::Probe).blocked_cur, 0);
        assert_eq!(reg.sta_info(si).stats(EventType::Probe).blocked_total, 5);
    }

    #[test]
    fn block_streak_expires_after_block_timeout() {
        let mut reg = Registry::new();
        let node = add_node(&mut reg, "a#w0", 2412);
        let sta = reg.sta_get_or_create(MacAddr::new([2, 0, 0, 0, 0, 1]));
        let si = reg.sta_info_get_or_create(sta, node, 0);
        reg.sta_info_mut(si).signal = -90;

        let cfg = SteerConfig {
            min_connect_snr: 30,
            probe_steering: true,
            ..cfg()
        };
        let mut events = EventQueue::new();

        check_request(&mut reg, &cfg, 1_000, &mut events, si, EventType::Probe);
        assert_eq!(reg.sta_info(si).stats(EventType::Probe).blocked_cur, 1);

        // Well past sta_block_timeout the streak restarts at one.
        check_request(&mut reg, &cfg, 100_000, &mut events, si, EventType::Probe);
        assert_eq!(reg.sta_info(si).stats(EventType::Probe).blocked_cur, 1);
        assert_eq!(reg.sta_info(si).stats(EventType::Probe).blocked_total, 2);
    }
}
