//! # Throughput estimation and candidate scoring
//!
//! Scores start from an SNR- and load-derated throughput estimate,
//! penalized by the age of the backing observation. The result is a
//! nonnegative 16-bit score; 0 disqualifies a candidate outright.

use crate::config::SteerConfig;
use crate::ids::StaInfoId;
use crate::measurement::{CandidateSource, CANDIDATE_TTL};
use crate::node::Node;
use crate::registry::Registry;
use crate::timeout::{TimeoutPayload, TimeoutWheel};

/// SNR at which a link is assumed to reach full rate.
const FULL_SNR: i32 = 40;

/// Baseline throughput estimate in Mbit/s.
const BASE_THROUGHPUT: f64 = 400.0;

/// Rate derating applied to 2.4 GHz nodes.
const BAND_PENALTY_2GHZ: f64 = 0.6;

/// Estimated station throughput on `node` at the given SNR.
pub fn estimate_throughput(node: &Node, snr: i32) -> u16 {
    let mut tpt = BASE_THROUGHPUT;

    if snr < FULL_SNR {
        tpt *= snr.max(0) as f64 / FULL_SNR as f64;
    }

    tpt *= (100 - node.load.min(100)) as f64 / 100.0;

    if !node.is_5ghz() {
        tpt *= BAND_PENALTY_2GHZ;
    }

    tpt as u16
}

/// Age-penalty factor in 0.0..=1.0.
///
/// Flat at 1.0 up to half the policy window, then decays to 0 at 1.5
/// windows: `clamp(0, 1, 2 − 4^((age − T/2) / T))`.
pub fn age_penalty(age: u64, policy_timeout: u64) -> f64 {
    if policy_timeout == 0 {
        return 1.0;
    }

    let t = policy_timeout as f64;
    let x = (age as f64 - t / 2.0) / t;
    (2.0 - 4f64.powf(x)).clamp(0.0, 1.0)
}

/// Final score of one candidate for a station whose reference node is
/// `current_node` (the node the request arrived on or the STA is
/// connected to).
fn score_candidate(
    cfg: &SteerConfig,
    now: u64,
    connected_to_candidate: bool,
    candidate_node: &Node,
    signal: i32,
    estimated_throughput: u16,
    information_timestamp: u64,
) -> u16 {
    // Full nodes are out, unless the STA already sits there.
    if !connected_to_candidate
        && candidate_node.max_assoc != 0
        && candidate_node.n_assoc >= candidate_node.max_assoc
    {
        return 0;
    }

    if cfg.min_snr != 0 && signal < candidate_node.snr_to_signal(cfg.min_snr) {
        return 0;
    }

    let age = now.saturating_sub(information_timestamp);
    let penalty = age_penalty(age, cfg.seen_policy_timeout);

    (estimated_throughput as f64 * penalty) as u16
}

/// Scoring pass for one station: refresh the candidate record of every
/// node the STA has been seen on, re-arming each record's TTL.
pub fn refresh_candidates(
    reg: &mut Registry,
    wheel: &mut TimeoutWheel,
    cfg: &SteerConfig,
    now: u64,
    reference: StaInfoId,
) {
    let (sta_id, ref_node, connected) = {
        let si = reg.sta_info(reference);
        (si.sta, si.node, si.is_connected())
    };
    let ref_ssid = reg.node(ref_node).ssid.clone();

    for info_id in reg.sta(sta_id).infos.to_vec() {
        let (seen_node, signal, seen) = {
            let info = reg.sta_info(info_id);
            (info.node, info.signal, info.seen)
        };

        // A connected STA is only steered within its SSID.
        if connected && reg.node(seen_node).ssid != ref_ssid {
            continue;
        }

        let (snr, tpt) = {
            let node = reg.node(seen_node);
            let snr = node.signal_to_snr(signal);
            (snr, estimate_throughput(node, snr))
        };

        let cid = reg.candidate_get_or_create(sta_id, seen_node, now);
        wheel.set(TimeoutPayload::Candidate(cid), now + CANDIDATE_TTL);

        {
            let c = reg.candidate_mut(cid);
            c.signal = signal;
            c.snr = snr;
            c.estimated_throughput = tpt;
            c.update_information(CandidateSource::StaInfo, seen);
        }

        let info_ts = reg.candidate(cid).information_timestamp;
        let score = score_candidate(
            cfg,
            now,
            connected && seen_node == ref_node,
            reg.node(seen_node),
            signal,
            tpt,
            info_ts,
        );
        reg.candidate_mut(cid).score = score;
    }
}
