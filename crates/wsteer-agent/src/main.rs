//! wsteer agent
//!
//! The steering daemon running on each AP:
//!
//! - Feeds driver events (admission requests, connections, beacon
//!   reports) into the decision core and executes its commands
//! - Exchanges host updates with peer APs over UDP gossip
//! - Serves operator status requests on a unix socket
//! - In `--dump-after` mode, prints the learned cluster state and exits
//!
//! Everything runs on one current-thread runtime; the core is touched
//! from a single task only.

mod config;
mod control;
mod driver;
mod event_log;
mod gossip;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bytes::{BufMut, BytesMut};
use clap::Parser;
use quanta::Clock;
use rand::RngExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing_subscriber::EnvFilter;
use wsteer_core::remote::HostUpdate;
use wsteer_core::sta::EventType;
use wsteer_core::SteerCore;

use wsteer_core::candidates::ReferenceRating;

use crate::config::AgentConfig;
use crate::driver::{DriverEvent, DriverReply};
use crate::event_log::EventLogMask;
use crate::gossip::Gossip;

/// wsteer client-steering daemon.
#[derive(Parser, Debug)]
#[command(name = "wsteer-agent", about = "Cooperative Wi-Fi client steering daemon")]
struct Cli {
    /// Configuration file (TOML).
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Unix socket of the radio driver helper.
    #[arg(long)]
    driver_socket: Option<PathBuf>,

    /// Unix socket for operator requests.
    #[arg(long)]
    control_socket: Option<PathBuf>,

    /// Host identifier used in gossip frames.
    #[arg(long)]
    hostname: Option<String>,

    /// Wait this many seconds, print the learned cluster state as JSON
    /// and exit.
    #[arg(long)]
    dump_after: Option<u64>,
}

struct DriverLink {
    lines: tokio::io::Lines<BufReader<tokio::net::unix::OwnedReadHalf>>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl DriverLink {
    async fn connect(path: &std::path::Path) -> std::io::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        let (read, writer) = stream.into_split();
        Ok(DriverLink {
            lines: BufReader::new(read).lines(),
            writer,
        })
    }

    async fn send<T: serde::Serialize>(&mut self, value: &T) -> std::io::Result<()> {
        let mut frame = BytesMut::with_capacity(256);
        frame.extend_from_slice(&serde_json::to_vec(value).expect("serializable frame"));
        frame.put_u8(b'\n');
        self.writer.write_all(&frame).await
    }
}

async fn driver_next(link: &mut Option<DriverLink>) -> Option<String> {
    match link {
        Some(l) => l.lines.next_line().await.ok().flatten(),
        None => std::future::pending().await,
    }
}

async fn gossip_recv(transport: &Option<Gossip>, buf: &mut BytesMut) -> Option<HostUpdate> {
    match transport {
        Some(g) => g.recv(buf).await,
        None => std::future::pending().await,
    }
}

async fn control_accept(listener: &Option<UnixListener>) -> std::io::Result<UnixStream> {
    match listener {
        Some(l) => l.accept().await.map(|(stream, _)| stream),
        None => std::future::pending().await,
    }
}

/// Feed one driver event into the core; requests produce a reply frame.
fn handle_driver_event(core: &mut SteerCore, event: DriverEvent) -> Option<DriverReply> {
    match event {
        DriverEvent::NodeAdded {
            node,
            ssid,
            bssid,
            freq,
            channel,
            max_assoc,
        } => {
            core.add_local_node(&node, &ssid, bssid, freq, channel, max_assoc);
            None
        }
        DriverEvent::NodeRemoved { node } => {
            core.remove_node(&node);
            None
        }
        DriverEvent::NodeUpdate { node, load, noise } => {
            core.update_local_node(&node, load, noise);
            None
        }
        DriverEvent::NrTemplate {
            node,
            bssid,
            ssid,
            frame,
        } => {
            core.set_node_nr_template(&node, &bssid, &ssid, &frame);
            None
        }
        DriverEvent::Probe {
            id,
            node,
            sta,
            freq,
            signal,
        } => Some(DriverReply::Admission {
            reply_to: id,
            accept: core.handle_sta_event(&node, sta, EventType::Probe, freq, signal),
        }),
        DriverEvent::Auth {
            id,
            node,
            sta,
            freq,
            signal,
        } => Some(DriverReply::Admission {
            reply_to: id,
            accept: core.handle_sta_event(&node, sta, EventType::Auth, freq, signal),
        }),
        DriverEvent::Assoc {
            id,
            node,
            sta,
            freq,
            signal,
        } => Some(DriverReply::Admission {
            reply_to: id,
            accept: core.handle_sta_event(&node, sta, EventType::Assoc, freq, signal),
        }),
        DriverEvent::Connected {
            node,
            sta,
            signal,
            caps,
        } => {
            core.sta_connected(&node, sta, signal, caps);
            None
        }
        DriverEvent::Disconnected { node, sta } => {
            core.sta_disconnected(&node, sta);
            None
        }
        DriverEvent::Signal { node, sta, signal } => {
            core.update_sta_signal(&node, sta, signal);
            None
        }
        DriverEvent::BeaconReport {
            sta,
            bssid,
            rcpi,
            rsni,
        } => {
            core.handle_measurement(sta, bssid, rcpi, rsni);
            None
        }
        DriverEvent::BtmResponse {
            node,
            sta,
            status_code,
        } => {
            core.handle_btm_response(&node, sta, status_code);
            None
        }
        DriverEvent::NeighborQuery { id, node } => Some(DriverReply::Neighbors {
            reply_to: id,
            neighbors: core.neighbor_list_for_node(&node, ReferenceRating::Regular),
        }),
    }
}

/// Push pending commands to the driver and pending events to the log.
async fn flush_outputs(core: &mut SteerCore, link: &mut Option<DriverLink>, mask: &EventLogMask) {
    let commands: Vec<_> = core.commands.drain().collect();
    for command in commands {
        match link {
            Some(l) => {
                if let Err(err) = l.send(&command).await {
                    tracing::warn!(%err, "driver write failed, dropping link");
                    *link = None;
                }
            }
            None => tracing::debug!(?command, "no driver link, dropping command"),
        }
    }

    let events: Vec<_> = core.events.drain().collect();
    for event in events {
        mask.log(&event);
    }
}

async fn serve_control(core: &SteerCore, stream: UnixStream) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let line = match tokio::time::timeout(Duration::from_secs(1), lines.next_line()).await {
        Ok(Ok(Some(line))) => line,
        _ => return,
    };

    let mut response = control::handle_request(core, &line);
    response.push('\n');
    let _ = write.write_all(response.as_bytes()).await;
}

fn default_hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "wsteer".to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AgentConfig::load(cli.config.as_deref())?;
    if cli.driver_socket.is_some() {
        config.driver_socket = cli.driver_socket.clone();
    }
    if cli.control_socket.is_some() {
        config.control_socket = cli.control_socket.clone();
    }
    config.core.validate().context("invalid steering config")?;

    let host = cli
        .hostname
        .or_else(|| config.host.clone())
        .unwrap_or_else(default_hostname);

    tracing::info!(
        host = %host,
        local_mode = config.core.local_mode,
        "wsteer-agent starting"
    );

    let clock = Clock::new();
    let origin = clock.now();
    let now_ms = |clock: &Clock| clock.now().duration_since(origin).as_millis() as u64;

    let mut core = SteerCore::new(config.core.clone());
    let mask = EventLogMask::new(config.event_log.clone());

    // ── Gossip transport ────────────────────────────────────────────
    let transport = if config.core.local_mode {
        None
    } else {
        Some(Gossip::bind(&config.gossip, config.core.ipv6).await?)
    };
    let mut gossip_buf = BytesMut::with_capacity(64 * 1024);

    // Spread the first updates so cluster members do not burst in sync.
    let jitter = Duration::from_millis(rand::rng().random_range(0..500));
    let mut gossip_interval = tokio::time::interval_at(
        tokio::time::Instant::now() + jitter,
        Duration::from_millis(config.core.remote_update_interval.max(100)),
    );

    // ── Operator socket ─────────────────────────────────────────────
    let control_listener = match &config.control_socket {
        Some(path) => {
            let _ = std::fs::remove_file(path);
            Some(UnixListener::bind(path).with_context(|| {
                format!("binding control socket {}", path.display())
            })?)
        }
        None => None,
    };

    // ── Driver link ─────────────────────────────────────────────────
    let mut driver_link = match &config.driver_socket {
        Some(path) => match DriverLink::connect(path).await {
            Ok(link) => {
                tracing::info!(socket = %path.display(), "driver connected");
                Some(link)
            }
            Err(err) => {
                tracing::warn!(%err, "driver not reachable yet, will retry");
                None
            }
        },
        None => None,
    };
    let mut next_driver_retry = 0u64;

    let dump_deadline = cli.dump_after.map(|secs| secs * 1_000);

    loop {
        let now = now_ms(&clock);
        core.advance(now);
        flush_outputs(&mut core, &mut driver_link, &mask).await;

        if let Some(deadline) = dump_deadline {
            if now >= deadline {
                println!("{}", serde_json::to_string_pretty(&core.status())?);
                return Ok(());
            }
        }

        // Reconnect the driver with a 5 s backoff.
        if driver_link.is_none() && now >= next_driver_retry {
            if let Some(path) = &config.driver_socket {
                match DriverLink::connect(path).await {
                    Ok(link) => {
                        tracing::info!(socket = %path.display(), "driver connected");
                        driver_link = Some(link);
                    }
                    Err(_) => next_driver_retry = now + 5_000,
                }
            }
        }

        let sleep_for = core
            .next_deadline()
            .map(|deadline| Duration::from_millis(deadline.saturating_sub(now)))
            .unwrap_or(Duration::from_secs(1))
            .min(Duration::from_secs(1));

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }

            line = driver_next(&mut driver_link) => {
                core.advance(now_ms(&clock));
                match line {
                    Some(line) => match serde_json::from_str::<DriverEvent>(&line) {
                        Ok(event) => {
                            if let Some(reply) = handle_driver_event(&mut core, event) {
                                if let Some(link) = &mut driver_link {
                                    if let Err(err) = link.send(&reply).await {
                                        tracing::warn!(%err, "driver write failed");
                                        driver_link = None;
                                    }
                                }
                            }
                        }
                        Err(err) => tracing::warn!(%err, line, "bad driver frame"),
                    },
                    None => {
                        tracing::warn!("driver link closed");
                        driver_link = None;
                        next_driver_retry = now_ms(&clock) + 5_000;
                    }
                }
            }

            update = gossip_recv(&transport, &mut gossip_buf) => {
                if let Some(update) = update {
                    if update.host != host {
                        core.advance(now_ms(&clock));
                        core.apply_host_update(&update);
                    }
                }
            }

            _ = gossip_interval.tick(), if transport.is_some() => {
                if let Some(transport) = &transport {
                    transport.send(&core.local_summary(&host)).await;
                }
            }

            stream = control_accept(&control_listener) => {
                if let Ok(stream) = stream {
                    serve_control(&core, stream).await;
                }
            }

            _ = tokio::time::sleep(sleep_for) => {}
        }
    }

    flush_outputs(&mut core, &mut driver_link, &mask).await;
    tracing::info!("wsteer-agent stopped");
    Ok(())
}
