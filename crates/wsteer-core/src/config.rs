//! # Steering tunables
//!
//! Every knob the decision core recognizes, with the stock defaults.
//! All fields carry `#[serde(default = ...)]` so a partial TOML file
//! only overrides what it names.

use serde::{Deserialize, Serialize};

/// Runtime configuration of the steering core.
///
/// Timing values are milliseconds, signal thresholds are SNR in dB
/// unless a field says dBm, `load` values are 0..=100.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SteerConfig {
    // ─── Timing (ms) ───
    /// Interval of the per-local-node update tick.
    pub local_sta_update: u64,
    /// Idle expiry of a station record on a local node.
    pub local_sta_timeout: u64,
    /// Window after which the consecutive-block counter resets.
    pub sta_block_timeout: u64,
    /// Maximum age of a sighting considered by steering policy.
    pub seen_policy_timeout: u64,
    /// Expiry of stored beacon-measurement reports.
    pub measurement_report_timeout: u64,
    /// Interval between gossip updates to peer APs.
    pub remote_update_interval: u64,
    /// Silence after which a remote node is dropped.
    pub remote_node_timeout: u64,
    /// Grace period before steering a freshly-seen station.
    pub initial_connect_delay: u64,
    /// Cooldown between two scan cycles on one station.
    pub scan_timeout: u64,
    /// Pacing of beacon requests within a scan cycle.
    pub scan_interval: u64,
    /// Minimum spacing between steering attempts per station.
    pub steer_trigger_interval: u64,
    /// Back-off after a station rejected a BSS transition.
    pub steer_reject_timeout: u64,
    /// Delay between a BSS transition request and the follow-up kick.
    pub roam_kick_delay: u64,
    /// How long a station may sit below `min_snr` before being kicked.
    pub min_snr_kick_delay: u64,
    /// How long a node may sit above the load threshold before a kick.
    pub load_kick_delay: u64,
    /// Minimum spacing between band-steering attempts.
    pub band_steering_interval: u64,

    // ─── SNR / signal (dB) ───
    /// Below this SNR a connected station is eventually kicked. 0 = off.
    pub min_snr: i32,
    /// Minimum SNR to accept a connection attempt. 0 = off.
    pub min_connect_snr: i32,
    /// Required signal advantage of a better candidate. 0 = off.
    pub signal_diff_threshold: i32,
    /// Below this SNR the roam scan machinery starts. 0 = off.
    pub roam_scan_snr: i32,
    /// Below this SNR a roam (BTM or kick) is actually triggered. 0 = off.
    pub roam_trigger_snr: i32,
    /// Minimum SNR for band-steering moves. 0 = off.
    pub band_steering_min_snr: i32,

    // ─── Counts ───
    /// Consecutive denies after which a request is let through.
    pub max_retry_band: u32,
    /// Cap on neighbor-report entries handed to stations.
    pub max_neighbor_reports: usize,
    /// Roam scan rounds before giving up and kicking. 0 = never kick.
    pub roam_scan_tries: u32,
    /// Load kicks only happen with at least this many clients.
    pub load_kick_min_clients: u32,
    /// Association bias in favor of 5 GHz nodes.
    pub band_steering_threshold: u32,
    /// Association slack added to a candidate when comparing counts.
    pub load_balancing_threshold: u32,

    // ─── Load (0..=100) ───
    /// Channel-utilization level that arms the load-kick machinery.
    pub load_kick_threshold: u8,

    // ─── Factors (percent) ───
    /// Required candidate score relative to the current node (percent).
    pub candidate_acceptance_factor: u32,

    // ─── Flags ───
    /// Steer at association time (deny assoc requests).
    pub assoc_steering: bool,
    /// Steer at probe time (deny probe requests).
    pub probe_steering: bool,
    /// Enable the load-kick sweep.
    pub load_kick_enabled: bool,
    /// Use IPv6 multicast for the gossip transport.
    pub ipv6: bool,
    /// Operate standalone, without remote nodes.
    pub local_mode: bool,

    // ─── Codes ───
    /// 802.11 reason code sent with load kicks.
    pub load_kick_reason_code: u32,
}

impl Default for SteerConfig {
    fn default() -> Self {
        SteerConfig {
            local_sta_update: 1_000,
            local_sta_timeout: 120_000,
            sta_block_timeout: 30_000,
            seen_policy_timeout: 30_000,
            measurement_report_timeout: 120_000,
            remote_update_interval: 1_000,
            remote_node_timeout: 120_000,
            initial_connect_delay: 0,
            scan_timeout: 10_000,
            scan_interval: 10_000,
            steer_trigger_interval: 60_000,
            steer_reject_timeout: 60_000,
            roam_kick_delay: 10_000,
            min_snr_kick_delay: 5_000,
            load_kick_delay: 10_000,
            band_steering_interval: 120_000,

            min_snr: 0,
            min_connect_snr: 0,
            signal_diff_threshold: 0,
            roam_scan_snr: 0,
            roam_trigger_snr: 0,
            band_steering_min_snr: 0,

            max_retry_band: 5,
            max_neighbor_reports: 8,
            roam_scan_tries: 3,
            load_kick_min_clients: 10,
            band_steering_threshold: 5,
            load_balancing_threshold: 5,

            load_kick_threshold: 75,

            candidate_acceptance_factor: 100,

            assoc_steering: false,
            probe_steering: false,
            load_kick_enabled: false,
            ipv6: false,
            local_mode: false,

            load_kick_reason_code: 5, // WLAN_REASON_DISASSOC_AP_BUSY
        }
    }
}

/// Configuration invariants checked once at startup; violations are the
/// only fatal error path of the daemon.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("local_sta_update must be nonzero")]
    ZeroUpdateInterval,
    #[error("load_kick_threshold must be at most 100, got {0}")]
    LoadThresholdRange(u8),
    #[error("candidate_acceptance_factor must be nonzero")]
    ZeroAcceptanceFactor,
}

impl SteerConfig {
    /// Validate startup invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_sta_update == 0 {
            return Err(ConfigError::ZeroUpdateInterval);
        }
        if self.load_kick_threshold > 100 {
            return Err(ConfigError::LoadThresholdRange(self.load_kick_threshold));
        }
        if self.candidate_acceptance_factor == 0 {
            return Err(ConfigError::ZeroAcceptanceFactor);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SteerConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg: SteerConfig =
            toml::from_str("min_snr = 15\nload_kick_enabled = true\n").unwrap();
        assert_eq!(cfg.min_snr, 15);
        assert!(cfg.load_kick_enabled);
        assert_eq!(cfg.max_retry_band, 5);
        assert_eq!(cfg.load_kick_threshold, 75);
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(toml::from_str::<SteerConfig>("no_such_knob = 1\n").is_err());
    }

    #[test]
    fn out_of_range_load_threshold_fails_validation() {
        let cfg = SteerConfig {
            load_kick_threshold: 150,
            ..SteerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
