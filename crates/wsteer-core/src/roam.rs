//! # Roam state machine
//!
//! Per-(STA, AP) machine that moves weak stations toward a better AP:
//!
//! ```text
//!   Idle ──eligible──▶ Searching ──scan started──▶ Scan
//!                          ▲                        │
//!                          │ no candidate           │ better candidate
//!                          │ (or expired)           ▼
//!                          └──────────────────── ScanDone ──BTM──▶ Idle
//! ```
//!
//! A scan round that ends without a candidate while the signal sits at
//! or below the trigger threshold burns one of `roam_scan_tries`;
//! exhausting them kicks the station outright.

use crate::candidates::{self, select_reason, CandidateEntry, MAX_PREFERENCE};
use crate::config::SteerConfig;
use crate::driver::{CommandQueue, DriverCommand};
use crate::event::{Event, EventKind, EventQueue};
use crate::ids::{NodeId, RequesterId, StaId, StaInfoId};
use crate::registry::Registry;
use crate::scan;
use crate::sta::RoamState;

/// Dialog token used for steering BSS transition requests.
pub const ROAM_DIALOG_TOKEN: u8 = 1;

/// Validity period (in beacon intervals) advertised with the request.
pub const ROAM_VALIDITY_PERIOD: u8 = 100;

/// How many remote neighbors a roam scan covers per round.
const ROAM_SCAN_NEIGHBORS: usize = 5;

fn set_state(
    reg: &mut Registry,
    now: u64,
    si_id: StaInfoId,
    state: RoamState,
    requester: RequesterId,
) {
    // Leaving the scanning path withdraws our queued jobs.
    if state != RoamState::Scan {
        scan::cancel(reg, si_id, requester);
    }

    let si = reg.sta_info_mut(si_id);
    if si.roam_state != state {
        tracing::debug!(sta_info = si_id.0, ?state, "roam state transition");
    }
    si.roam_state = state;
    si.roam_event = now;
}

/// Reset the machine to Idle, e.g. when the station stopped being
/// eligible for steering.
pub fn reset(reg: &mut Registry, now: u64, si_id: StaInfoId, requester: RequesterId) {
    if reg.sta_info(si_id).roam_state == RoamState::Idle {
        return;
    }
    set_state(reg, now, si_id, RoamState::Idle, requester);
    reg.sta_info_mut(si_id).roam_tries = 0;
}

/// Arm the machine for an eligible weak station.
pub fn activate(reg: &mut Registry, now: u64, si_id: StaInfoId, requester: RequesterId) {
    if reg.sta_info(si_id).roam_state == RoamState::Idle {
        set_state(reg, now, si_id, RoamState::Searching, requester);
    }
}

/// Look for a better node using only observations from the current
/// scan round (bounded by twice the beacon-request pacing).
fn found_better_node(
    reg: &Registry,
    cfg: &SteerConfig,
    now: u64,
    si_id: StaInfoId,
) -> Option<CandidateEntry> {
    let mut max_age = 2 * cfg.scan_interval;
    let since_start = now.saturating_sub(reg.sta_info(si_id).roam_scan_start);
    if max_age > since_start {
        max_age = since_start;
    }

    candidates::find_better_candidate(reg, cfg, now, si_id, select_reason::SIGNAL, max_age)
}

/// Score gate: the candidate must reach `candidate_acceptance_factor`
/// percent of the current node's own candidate score. Unscored pairs
/// pass; the signal criteria already vetted them.
fn acceptance_ok(
    reg: &Registry,
    cfg: &SteerConfig,
    sta: StaId,
    current: NodeId,
    target: NodeId,
) -> bool {
    let score_of = |node| {
        reg.find_candidate(sta, node)
            .map(|id| reg.candidate(id).score)
    };

    match (score_of(current), score_of(target)) {
        (Some(cur), Some(tgt)) if cur > 0 => {
            tgt as u64 * 100 >= cur as u64 * cfg.candidate_acceptance_factor as u64
        }
        _ => true,
    }
}

/// Send a BSS transition request (or a plain disassociation notice for
/// stations without 802.11v) pointing at `target`. `schedule_kick`
/// arms the follow-up kick for stations that ignore the suggestion.
pub(crate) fn issue_transition(
    reg: &mut Registry,
    cfg: &SteerConfig,
    now: u64,
    events: &mut EventQueue,
    commands: &mut CommandQueue,
    si_id: StaInfoId,
    target: NodeId,
    schedule_kick: bool,
) {
    let (sta_id, node_id) = {
        let si = reg.sta_info(si_id);
        (si.sta, si.node)
    };
    let sta_addr = reg.sta(sta_id).addr;
    let supports_btm = reg.sta(sta_id).caps.bss_transition;
    let node_key = reg.node(node_id).key.clone();
    let target_key = reg.node(target).key.clone();

    if supports_btm {
        let neighbor_report = reg
            .node(target)
            .rrm_nr
            .as_ref()
            .and_then(|tpl| tpl.frame_with_preference(MAX_PREFERENCE))
            .unwrap_or_default();

        commands.push(DriverCommand::BssTransitionRequest {
            node: node_key.clone(),
            sta: sta_addr,
            dialog_token: ROAM_DIALOG_TOKEN,
            disassoc_imminent: false,
            abridged: false,
            validity_period: ROAM_VALIDITY_PERIOD,
            target: target_key.clone(),
            neighbor_report,
        });
    } else {
        // No 802.11v support: announce and rely on the scheduled kick.
        commands.push(DriverCommand::NotifyClientDisassoc {
            node: node_key.clone(),
            sta: sta_addr,
        });
    }

    let mut ev = Event::new(EventKind::BssTransitionRequest);
    ev.sta = Some(sta_addr);
    ev.node_local = Some(node_key);
    ev.candidate = Some(target_key);
    events.push(ev);

    let si = reg.sta_info_mut(si_id);
    if schedule_kick && cfg.roam_kick_delay != 0 {
        si.kick_time = now + cfg.roam_kick_delay;
    }
    si.last_steer = now;
}

fn kick_out(
    reg: &mut Registry,
    cfg: &SteerConfig,
    now: u64,
    events: &mut EventQueue,
    commands: &mut CommandQueue,
    si_id: StaInfoId,
) {
    let (sta_id, node_id) = {
        let si = reg.sta_info(si_id);
        (si.sta, si.node)
    };
    let sta_addr = reg.sta(sta_id).addr;
    let node_key = reg.node(node_id).key.clone();

    let count = {
        let si = reg.sta_info_mut(si_id);
        si.kick_count += 1;
        si.roam_kick = now;
        si.kick_count
    };

    let mut ev = Event::new(EventKind::RoamKick);
    ev.sta = Some(sta_addr);
    ev.node_local = Some(node_key.clone());
    ev.count = count;
    events.push(ev);

    commands.push(DriverCommand::KickClient {
        node: node_key,
        sta: sta_addr,
        reason_code: cfg.load_kick_reason_code,
    });
}

/// Advance the machine one step. Returns true when a station was
/// kicked; the caller stops its per-tick sweep then.
pub fn trigger_sm(
    reg: &mut Registry,
    cfg: &SteerConfig,
    now: u64,
    events: &mut EventQueue,
    commands: &mut CommandQueue,
    si_id: StaInfoId,
    requester: RequesterId,
) -> bool {
    match reg.sta_info(si_id).roam_state {
        RoamState::Idle => {}

        RoamState::Searching => {
            // A fresh report may already name a target, e.g. while the
            // post-scan cooldown blocks the next cycle.
            if found_better_node(reg, cfg, now, si_id).is_some() {
                set_state(reg, now, si_id, RoamState::ScanDone, requester);
                return false;
            }

            let inserted = scan::list_add_table(reg, si_id, requester)
                || scan::list_add_remote(reg, si_id, ROAM_SCAN_NEIGHBORS, requester);
            if !inserted {
                return false;
            }

            if scan::start(reg, cfg, now, si_id) {
                set_state(reg, now, si_id, RoamState::Scan, requester);
                let si = reg.sta_info_mut(si_id);
                si.roam_scan_start = now;
                si.roam_scan_finished = false;
            }
        }

        RoamState::Scan => {
            // A usable report may arrive before the cycle finishes.
            if found_better_node(reg, cfg, now, si_id).is_some() {
                set_state(reg, now, si_id, RoamState::ScanDone, requester);
                return false;
            }

            if reg.sta_info(si_id).roam_scan_finished {
                reg.sta_info_mut(si_id).roam_scan_finished = false;

                let (signal, node_id) = {
                    let si = reg.sta_info(si_id);
                    (si.signal, si.node)
                };
                let trigger_signal = reg.node(node_id).snr_to_signal(cfg.roam_trigger_snr);

                if cfg.roam_trigger_snr != 0 && signal <= trigger_signal {
                    reg.sta_info_mut(si_id).roam_tries += 1;
                }

                if cfg.roam_scan_tries != 0
                    && reg.sta_info(si_id).roam_tries >= cfg.roam_scan_tries
                {
                    kick_out(reg, cfg, now, events, commands, si_id);
                    reset(reg, now, si_id, requester);
                    return true;
                }

                set_state(reg, now, si_id, RoamState::Searching, requester);
            }
        }

        RoamState::ScanDone => match found_better_node(reg, cfg, now, si_id) {
            Some(candidate) => {
                let (sta_id, node_id) = {
                    let si = reg.sta_info(si_id);
                    (si.sta, si.node)
                };

                if !acceptance_ok(reg, cfg, sta_id, node_id, candidate.node) {
                    set_state(reg, now, si_id, RoamState::Searching, requester);
                    return false;
                }

                issue_transition(reg, cfg, now, events, commands, si_id, candidate.node, true);
                set_state(reg, now, si_id, RoamState::Idle, requester);
                reg.sta_info_mut(si_id).roam_tries = 0;
            }
            // The candidate expired while we deliberated.
            None => set_state(reg, now, si_id, RoamState::Searching, requester),
        },
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MacAddr;
    use crate::node::{Node, NodeType, NrTemplate};
    use crate::sta::{ConnectionState, StaCaps};

    struct Fixture {
        reg: Registry,
        cfg: SteerConfig,
        events: EventQueue,
        commands: CommandQueue,
        si: StaInfoId,
        better: NodeId,
        requester: RequesterId,
    }

    fn fixture() -> Fixture {
        let mut reg = Registry::new();

        let mut cur = Node::new("a#w0".to_string(), NodeType::Local, 0);
        cur.ssid = "net".into();
        cur.freq = 2412;
        cur.channel = 6;
        let cur = reg.insert_node(cur);

        let mut other = Node::new("b#w0".to_string(), NodeType::Remote, 0);
        other.ssid = "net".into();
        other.freq = 5745;
        other.channel = 149;
        other.rrm_nr =
            NrTemplate::from_hex("02:00:00:00:00:02", "net", "0200000000028f000000769509");
        let better = reg.insert_node(other);

        let sta = reg.sta_get_or_create(MacAddr::new([2, 0, 0, 0, 0, 1]));
        reg.sta_mut(sta).caps = StaCaps {
            beacon_passive: true,
            beacon_active: true,
            beacon_table: false,
            bss_transition: true,
            mbo: false,
        };

        let si = reg.sta_info_get_or_create(sta, cur, 0);
        reg.sta_info_mut(si).connected = ConnectionState::Connected;
        reg.sta_info_mut(si).signal = -80;
        reg.sta_info_mut(si).seen = 0;

        Fixture {
            reg,
            cfg: SteerConfig {
                roam_scan_snr: 25,
                roam_trigger_snr: 15,
                signal_diff_threshold: 5,
                ..SteerConfig::default()
            },
            events: EventQueue::new(),
            commands: CommandQueue::new(),
            si,
            better,
            requester: RequesterId(0),
        }
    }

    fn step(f: &mut Fixture, now: u64) -> bool {
        trigger_sm(
            &mut f.reg,
            &f.cfg,
            now,
            &mut f.events,
            &mut f.commands,
            f.si,
            f.requester,
        )
    }

    fn seen_on_better(f: &mut Fixture, now: u64, signal: i32) {
        let sta = f.reg.sta_info(f.si).sta;
        let si_b = f.reg.sta_info_get_or_create(sta, f.better, now);
        f.reg.sta_info_mut(si_b).signal = signal;
        f.reg.sta_info_mut(si_b).seen = now;
    }

    #[test]
    fn full_roam_cycle_issues_btm() {
        let mut f = fixture();
        let now = 1_000_000;

        activate(&mut f.reg, now, f.si, f.requester);
        assert_eq!(f.reg.sta_info(f.si).roam_state, RoamState::Searching);

        // Searching queues remote jobs and starts the scan.
        assert!(!step(&mut f, now));
        assert_eq!(f.reg.sta_info(f.si).roam_state, RoamState::Scan);

        // A strong sighting of the 5 GHz neighbor arrives.
        seen_on_better(&mut f, now + 100, -60);
        assert!(!step(&mut f, now + 200));
        assert_eq!(f.reg.sta_info(f.si).roam_state, RoamState::ScanDone);

        assert!(!step(&mut f, now + 300));
        assert_eq!(f.reg.sta_info(f.si).roam_state, RoamState::Idle);

        let si = f.reg.sta_info(f.si);
        assert_eq!(si.last_steer, now + 300);
        assert_eq!(si.kick_time, now + 300 + f.cfg.roam_kick_delay);

        let cmds: Vec<_> = f.commands.drain().collect();
        let btm = cmds
            .iter()
            .find_map(|c| match c {
                DriverCommand::BssTransitionRequest {
                    target,
                    dialog_token,
                    validity_period,
                    neighbor_report,
                    ..
                } => Some((target.clone(), *dialog_token, *validity_period, neighbor_report.len())),
                _ => None,
            })
            .expect("BTM command issued");
        assert_eq!(btm.0, "b#w0");
        assert_eq!(btm.1, ROAM_DIALOG_TOKEN);
        assert_eq!(btm.2, ROAM_VALIDITY_PERIOD);
        // 13-byte prefix plus the preference subelement.
        assert_eq!(btm.3, 16);
    }

    #[test]
    fn exhausted_scan_tries_kick_the_station() {
        let mut f = fixture();
        let mut now = 1_000_000;

        activate(&mut f.reg, now, f.si, f.requester);

        for round in 0..f.cfg.roam_scan_tries {
            // Searching: start the scan round.
            assert!(!step(&mut f, now), "round {round} start");
            assert_eq!(f.reg.sta_info(f.si).roam_state, RoamState::Scan);

            // The single queued job is dispatched; the round ends with
            // nothing heard.
            let notified = crate::scan::next(&mut f.reg, &mut f.commands, now + 50, f.si);
            crate::scan::deliver_notifications(&mut f.reg, f.si, &notified, f.requester);
            assert!(f.reg.sta_info(f.si).roam_scan_finished);

            let kicked = step(&mut f, now + 100);

            if round + 1 < f.cfg.roam_scan_tries {
                assert!(!kicked);
                assert_eq!(f.reg.sta_info(f.si).roam_state, RoamState::Searching);
                // Past the post-scan cooldown for the next round.
                now += f.cfg.scan_timeout + 200;
            } else {
                assert!(kicked, "third dry round kicks");
                assert_eq!(f.reg.sta_info(f.si).roam_state, RoamState::Idle);
            }
        }

        let cmds: Vec<_> = f.commands.drain().collect();
        assert!(cmds
            .iter()
            .any(|c| matches!(c, DriverCommand::KickClient { .. })));
        assert_eq!(f.reg.sta_info(f.si).kick_count, 1);
    }

    #[test]
    fn expired_candidate_falls_back_to_searching() {
        let mut f = fixture();
        let now = 1_000_000;

        f.reg.sta_info_mut(f.si).roam_state = RoamState::ScanDone;
        f.reg.sta_info_mut(f.si).roam_scan_start = now;

        assert!(!step(&mut f, now));
        assert_eq!(f.reg.sta_info(f.si).roam_state, RoamState::Searching);
        assert!(f.commands.is_empty());
    }

    #[test]
    fn sta_without_btm_support_gets_disassoc_notice() {
        let mut f = fixture();
        let now = 1_000_000;
        let sta = f.reg.sta_info(f.si).sta;
        f.reg.sta_mut(sta).caps.bss_transition = false;

        f.reg.sta_info_mut(f.si).roam_state = RoamState::ScanDone;
        f.reg.sta_info_mut(f.si).roam_scan_start = now - 1_000;
        seen_on_better(&mut f, now, -60);

        assert!(!step(&mut f, now));
        let cmds: Vec<_> = f.commands.drain().collect();
        assert!(cmds
            .iter()
            .any(|c| matches!(c, DriverCommand::NotifyClientDisassoc { .. })));
    }
}
