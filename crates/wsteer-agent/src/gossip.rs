//! Gossip transport: periodic host updates over UDP. IPv4 mode uses
//! subnet broadcast; the core's `ipv6` flag switches to link-local
//! multicast. Frames are single JSON datagrams; loss is acceptable,
//! peers age out via `remote_node_timeout`.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::Context;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use wsteer_core::remote::HostUpdate;

use crate::config::GossipConfig;

pub struct Gossip {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Gossip {
    pub async fn bind(cfg: &GossipConfig, ipv6: bool) -> anyhow::Result<Self> {
        if ipv6 {
            let group: Ipv6Addr = cfg
                .group
                .parse()
                .with_context(|| format!("invalid multicast group {}", cfg.group))?;

            let socket = UdpSocket::bind(("::", cfg.port))
                .await
                .context("binding gossip socket")?;
            socket
                .join_multicast_v6(&group, 0)
                .context("joining gossip multicast group")?;
            socket.set_multicast_loop_v6(false)?;

            Ok(Gossip {
                socket,
                target: SocketAddr::from((group, cfg.port)),
            })
        } else {
            let socket = UdpSocket::bind(("0.0.0.0", cfg.port))
                .await
                .context("binding gossip socket")?;
            socket.set_broadcast(true)?;

            Ok(Gossip {
                socket,
                target: SocketAddr::from((Ipv4Addr::BROADCAST, cfg.port)),
            })
        }
    }

    /// Broadcast the local summary to the cluster.
    pub async fn send(&self, update: &HostUpdate) {
        let frame = match serde_json::to_vec(update) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(%err, "failed to encode gossip frame");
                return;
            }
        };

        if let Err(err) = self.socket.send_to(&frame, self.target).await {
            tracing::debug!(%err, "gossip send failed");
        }
    }

    /// Receive one peer frame into `buf`; malformed datagrams are
    /// dropped.
    pub async fn recv(&self, buf: &mut BytesMut) -> Option<HostUpdate> {
        buf.clear();
        let (len, peer) = match self.socket.recv_buf_from(buf).await {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(%err, "gossip recv failed");
                return None;
            }
        };

        match serde_json::from_slice::<HostUpdate>(&buf[..len]) {
            Ok(update) => Some(update),
            Err(err) => {
                tracing::debug!(%peer, %err, "dropping malformed gossip frame");
                None
            }
        }
    }
}
