//! Daemon configuration: the core tunables plus the agent's own socket
//! paths and gossip settings, loaded from one TOML file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use wsteer_core::SteerConfig;

/// Gossip transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GossipConfig {
    /// UDP port shared by all cluster members.
    pub port: u16,
    /// IPv6 multicast group (used when the core's `ipv6` flag is set).
    pub group: String,
}

impl Default for GossipConfig {
    fn default() -> Self {
        GossipConfig {
            port: 16720,
            group: "ff02::4150".into(),
        }
    }
}

/// Full daemon configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Host identifier used in gossip frames; defaults to the hostname.
    pub host: Option<String>,
    /// Unix socket of the radio driver helper.
    pub driver_socket: Option<PathBuf>,
    /// Unix socket for operator requests.
    pub control_socket: Option<PathBuf>,
    /// Event kinds reported at info level; unset means all of them.
    pub event_log: Option<Vec<String>>,
    pub gossip: GossipConfig,
    /// Steering tunables, passed through to the core.
    pub core: SteerConfig,
}

impl AgentConfig {
    /// Load from a TOML file; a missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(AgentConfig::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: AgentConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.core.validate().context("invalid steering config")?;
        Ok(config)
    }
}
