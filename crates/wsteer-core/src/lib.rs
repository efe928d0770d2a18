//! # wsteer-core
//!
//! Decision core of the wsteer cooperative client-steering daemon.
//!
//! Pure and synchronous: the embedding daemon feeds it driver events,
//! gossip updates, and a monotonic millisecond clock; the core answers
//! through its admission return values and the drained event and
//! driver-command queues. No I/O happens here.
//!
//! ## Crate structure
//!
//! - [`element`] — 802.11 tagged element-list codec
//! - [`neighbor`] — Neighbor-report frames and hex helpers
//! - [`timeout`] — Deadline wheel with tagged payloads
//! - [`ids`] — Typed record handles and MAC addresses
//! - [`node`] / [`sta`] — AP and station data model
//! - [`registry`] — Record stores with paired cross-links
//! - [`measurement`] — Beacon reports and derived candidates
//! - [`score`] — Throughput estimation and age-penalty scoring
//! - [`candidates`] — Candidate list building and ranking
//! - [`policy`] — Admission policy and comparison predicates
//! - [`scan`] — Requester-tagged beacon-scan coordinator
//! - [`roam`] — Per-station roam state machine
//! - [`band`] — Band-steering sweep toward 5 GHz
//! - [`kick`] — Per-node update tick (SNR and load kicks)
//! - [`event`] — Structured event records
//! - [`driver`] — Driver command queue
//! - [`remote`] — Gossip message types
//! - [`config`] — Tunables
//! - [`crate::core`] — The [`SteerCore`] context tying it together

pub mod band;
pub mod candidates;
pub mod config;
pub mod core;
pub mod driver;
pub mod element;
pub mod event;
pub mod ids;
pub mod kick;
pub mod measurement;
pub mod neighbor;
pub mod node;
pub mod policy;
pub mod registry;
pub mod remote;
pub mod roam;
pub mod scan;
pub mod score;
pub mod sta;
pub mod status;
pub mod timeout;

pub use config::SteerConfig;
pub use core::SteerCore;
pub use ids::MacAddr;
