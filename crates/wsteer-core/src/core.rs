//! # Core context
//!
//! One value owns everything the decision core needs: the tunables, the
//! registry, the timeout wheel, the scan-requester table, and the
//! outbound event and command queues. The embedding daemon samples the
//! monotonic clock once per loop iteration, calls [`SteerCore::advance`]
//! and the relevant handlers, then drains `events` and `commands`.

use crate::candidates::{CandidateList, ReferenceRating};
use crate::config::SteerConfig;
use crate::driver::CommandQueue;
use crate::event::{Event, EventKind, EventQueue};
use crate::ids::{MacAddr, NodeId, RequesterId, StaId, StaInfoId};
use crate::measurement::CandidateSource;
use crate::neighbor;
use crate::node::{Node, NodeType, NrTemplate};
use crate::policy;
use crate::registry::Registry;
use crate::remote::{HostUpdate, NodeSummary, StaSummary};
use crate::roam;
use crate::scan::{self, ScanRequesters};
use crate::score;
use crate::sta::{ConnectionState, EventType, ScanState, StaCaps};
use crate::status::{self, StatusReport};
use crate::timeout::{TimeoutPayload, TimeoutWheel};

/// The steering core: every registry, queue, and timer in one place.
pub struct SteerCore {
    pub config: SteerConfig,
    pub registry: Registry,
    pub events: EventQueue,
    pub commands: CommandQueue,

    wheel: TimeoutWheel,
    requesters: ScanRequesters,
    roam_requester: RequesterId,
    band_requester: RequesterId,
    now: u64,
}

impl SteerCore {
    pub fn new(config: SteerConfig) -> Self {
        let mut requesters = ScanRequesters::new();
        let roam_requester = requesters
            .register("roaming")
            .expect("fresh requester table has room");
        let band_requester = requesters
            .register("band_steering")
            .expect("fresh requester table has room");

        SteerCore {
            config,
            registry: Registry::new(),
            events: EventQueue::new(),
            commands: CommandQueue::new(),
            wheel: TimeoutWheel::new(),
            requesters,
            roam_requester,
            band_requester,
            now: 0,
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Earliest pending deadline; the daemon sleeps until then.
    pub fn next_deadline(&self) -> Option<u64> {
        self.wheel.next_deadline()
    }

    /// Register an additional scan requester (e.g. a control surface).
    pub fn register_scan_requester(&mut self, name: &'static str) -> Option<RequesterId> {
        self.requesters.register(name)
    }

    // ─── Clock & timers ─────────────────────────────────────────────────

    /// Move the clock forward and fire everything that came due.
    pub fn advance(&mut self, now: u64) {
        self.now = now;

        for payload in self.wheel.poll(now) {
            match payload {
                TimeoutPayload::Candidate(id) => {
                    self.registry.remove_candidate(id);
                }
                TimeoutPayload::Measurement(id) => {
                    self.registry.remove_measurement(id);
                }
                TimeoutPayload::StaInfo(id) => self.expire_sta_info(id),
                TimeoutPayload::NodeTick(id) => self.node_tick(id),
            }
        }
    }

    fn node_tick(&mut self, node_id: NodeId) {
        if self.registry.node(node_id).is_local() {
            crate::kick::local_node_tick(
                &mut self.registry,
                &self.config,
                self.now,
                &mut self.events,
                &mut self.commands,
                node_id,
                self.roam_requester,
                self.band_requester,
            );
            self.wheel.set(
                TimeoutPayload::NodeTick(node_id),
                self.now + self.config.local_sta_update,
            );
            return;
        }

        // Remote node: drop after a silent remote_node_timeout.
        let last_update = self.registry.node(node_id).last_update;
        if self.now.saturating_sub(last_update) >= self.config.remote_node_timeout {
            tracing::info!(node = %self.registry.node(node_id).key, "remote node timed out");
            self.remove_node_internal(node_id);
        } else {
            self.wheel.set(
                TimeoutPayload::NodeTick(node_id),
                last_update + self.config.remote_node_timeout,
            );
        }
    }

    fn expire_sta_info(&mut self, id: StaInfoId) {
        self.wheel.cancel(TimeoutPayload::StaInfo(id));
        let info = self.registry.remove_sta_info(id);
        if self.registry.node(info.node).is_local() {
            self.registry.refresh_n_assoc(info.node);
        }

        // A station without any sighting record is gone.
        if self.registry.sta(info.sta).info_ids().is_empty() {
            self.remove_sta_internal(info.sta);
        }
    }

    fn remove_sta_internal(&mut self, sta: StaId) {
        for &m in &self.registry.sta(sta).measurements {
            self.wheel.cancel(TimeoutPayload::Measurement(m));
        }
        for &c in &self.registry.sta(sta).candidates {
            self.wheel.cancel(TimeoutPayload::Candidate(c));
        }
        for &si in self.registry.sta(sta).info_ids() {
            self.wheel.cancel(TimeoutPayload::StaInfo(si));
        }
        self.registry.remove_sta(sta);
    }

    fn remove_node_internal(&mut self, node: NodeId) {
        self.wheel.cancel(TimeoutPayload::NodeTick(node));
        for &m in &self.registry.node(node).measurements {
            self.wheel.cancel(TimeoutPayload::Measurement(m));
        }
        for &c in &self.registry.node(node).candidates {
            self.wheel.cancel(TimeoutPayload::Candidate(c));
        }
        let orphan_check: Vec<StaId> = self
            .registry
            .node(node)
            .sta_info_ids()
            .iter()
            .map(|&si| {
                self.wheel.cancel(TimeoutPayload::StaInfo(si));
                self.registry.sta_info(si).sta
            })
            .collect();

        self.registry.remove_node(node);

        for sta in orphan_check {
            if self.registry.sta(sta).info_ids().is_empty() {
                self.remove_sta_internal(sta);
            }
        }
    }

    /// Arm or disarm a sighting record's expiry depending on whether
    /// the station is connected there.
    fn touch_sta_info(&mut self, id: StaInfoId) {
        if self.registry.sta_info(id).is_connected() {
            self.wheel.cancel(TimeoutPayload::StaInfo(id));
        } else {
            self.wheel.set(
                TimeoutPayload::StaInfo(id),
                self.now + self.config.local_sta_timeout,
            );
        }
    }

    // ─── Local node management (driver side) ────────────────────────────

    pub fn add_local_node(
        &mut self,
        key: &str,
        ssid: &str,
        bssid: MacAddr,
        freq: u32,
        channel: u8,
        max_assoc: u32,
    ) -> NodeId {
        let mut node = Node::new(key.to_string(), NodeType::Local, self.now);
        node.ssid = ssid.to_string();
        node.bssid = bssid;
        node.freq = freq;
        node.channel = channel;
        node.max_assoc = max_assoc;
        node.op_class = scan::node_op_class(freq, channel);

        let id = self.registry.insert_node(node);
        self.wheel.set(
            TimeoutPayload::NodeTick(id),
            self.now + self.config.local_sta_update,
        );
        tracing::info!(node = key, ssid, freq, "local node added");
        id
    }

    /// Periodic driver refresh of channel survey data.
    pub fn update_local_node(&mut self, key: &str, load: u8, noise: i32) {
        let Some(id) = self.registry.node_by_key(key) else {
            return;
        };
        let node = self.registry.node_mut(id);
        node.load = load.min(100);
        node.noise = noise;
        node.last_update = self.now;
    }

    /// Install the driver-reported RRM neighbor-report template.
    pub fn set_node_nr_template(&mut self, key: &str, bssid: &str, ssid: &str, hex: &str) -> bool {
        let Some(id) = self.registry.node_by_key(key) else {
            return false;
        };

        match NrTemplate::from_hex(bssid, ssid, hex) {
            Some(tpl) => {
                let node = self.registry.node_mut(id);
                node.op_class = tpl.op_class();
                node.channel = tpl.channel();
                node.rrm_nr = Some(tpl);
                true
            }
            None => {
                let mut ev = Event::new(EventKind::InvalidNr);
                ev.node_local = Some(key.to_string());
                self.events.push(ev);
                false
            }
        }
    }

    pub fn remove_node(&mut self, key: &str) {
        if let Some(id) = self.registry.node_by_key(key) {
            self.remove_node_internal(id);
        }
    }

    // ─── Station events (driver side) ───────────────────────────────────

    /// Admission decision for a probe/auth/assoc request.
    pub fn handle_sta_event(
        &mut self,
        node_key: &str,
        addr: MacAddr,
        ev_type: EventType,
        freq: u32,
        signal: i32,
    ) -> bool {
        let Some(node_id) = self.registry.node_by_key(node_key) else {
            return true;
        };

        let sta_id = self.registry.sta_get_or_create(addr);
        self.registry.sta_mut(sta_id).note_band(freq);

        let si_id = self.registry.sta_info_get_or_create(sta_id, node_id, self.now);
        {
            let si = self.registry.sta_info_mut(si_id);
            si.signal = signal;
            si.seen = self.now;
        }
        self.touch_sta_info(si_id);

        policy::check_request(
            &mut self.registry,
            &self.config,
            self.now,
            &mut self.events,
            si_id,
            ev_type,
        )
    }

    /// A station completed association on a local node.
    pub fn sta_connected(&mut self, node_key: &str, addr: MacAddr, signal: i32, caps: StaCaps) {
        let Some(node_id) = self.registry.node_by_key(node_key) else {
            return;
        };

        let sta_id = self.registry.sta_get_or_create(addr);
        let freq = self.registry.node(node_id).freq;
        {
            let sta = self.registry.sta_mut(sta_id);
            sta.caps = caps;
            sta.note_band(freq);
        }

        // A station is connected to exactly one local node at a time.
        for other in self.registry.sta(sta_id).info_ids().to_vec() {
            let other_node = self.registry.sta_info(other).node;
            if other_node == node_id || !self.registry.node(other_node).is_local() {
                continue;
            }
            if self.registry.sta_info(other).is_connected() {
                self.mark_disconnected(other);
            }
        }

        let si_id = self.registry.sta_info_get_or_create(sta_id, node_id, self.now);
        {
            let si = self.registry.sta_info_mut(si_id);
            si.connected = ConnectionState::Connected;
            si.connected_since = self.now;
            si.seen = self.now;
            si.signal = signal;
            si.below_min_snr = 0;
        }
        self.touch_sta_info(si_id);
        self.registry.refresh_n_assoc(node_id);

        tracing::debug!(sta = %addr, node = node_key, signal, "station connected");
    }

    fn mark_disconnected(&mut self, si_id: StaInfoId) {
        {
            let si = self.registry.sta_info_mut(si_id);
            si.connected = ConnectionState::Disconnected;
            si.last_connected = self.now;
            si.kick_time = 0;
        }
        scan::stop(&mut self.registry, self.now, si_id);
        roam::reset(&mut self.registry, self.now, si_id, self.roam_requester);
        self.touch_sta_info(si_id);

        let node_id = self.registry.sta_info(si_id).node;
        self.registry.refresh_n_assoc(node_id);
    }

    pub fn sta_disconnected(&mut self, node_key: &str, addr: MacAddr) {
        let Some(si_id) = self.find_sta_info(node_key, addr) else {
            return;
        };
        self.mark_disconnected(si_id);
        tracing::debug!(sta = %addr, node = node_key, "station disconnected");
    }

    /// Periodic signal refresh for a connected station.
    pub fn update_sta_signal(&mut self, node_key: &str, addr: MacAddr, signal: i32) {
        let Some(si_id) = self.find_sta_info(node_key, addr) else {
            return;
        };
        let si = self.registry.sta_info_mut(si_id);
        si.signal = signal;
        si.seen = self.now;
    }

    fn find_sta_info(&self, node_key: &str, addr: MacAddr) -> Option<StaInfoId> {
        let node_id = self.registry.node_by_key(node_key)?;
        let sta_id = self.registry.sta_by_addr(addr)?;
        self.registry.find_sta_info(sta_id, node_id)
    }

    /// An 802.11k beacon report arrived from a station.
    pub fn handle_measurement(&mut self, addr: MacAddr, bssid: MacAddr, rcpi: u8, rsni: u8) {
        let Some(sta_id) = self.registry.sta_by_addr(addr) else {
            return;
        };
        let Some(node_id) = self.registry.node_by_bssid(bssid) else {
            tracing::debug!(sta = %addr, %bssid, "beacon report for unknown BSSID");
            return;
        };

        let mid = self
            .registry
            .measurement_upsert(sta_id, node_id, rcpi, rsni, self.now);
        self.wheel.set(
            TimeoutPayload::Measurement(mid),
            self.now + self.config.measurement_report_timeout,
        );

        // The report is also a sighting of the station by that node.
        let rssi = self.registry.measurement(mid).rssi();
        let si_id = self.registry.sta_info_get_or_create(sta_id, node_id, self.now);
        {
            let si = self.registry.sta_info_mut(si_id);
            si.signal = rssi;
            si.seen = self.now;
        }
        self.touch_sta_info(si_id);

        // Re-score from the station's current point of view.
        let reference = self.connected_sta_info(sta_id).unwrap_or(si_id);
        score::refresh_candidates(
            &mut self.registry,
            &mut self.wheel,
            &self.config,
            self.now,
            reference,
        );
        if let Some(cid) = self.registry.find_candidate(sta_id, node_id) {
            self.registry
                .candidate_mut(cid)
                .update_information(CandidateSource::Measurement, self.now);
        }

        // Keep the scan pipeline moving while a cycle is running.
        if let Some(scanning) = self.connected_sta_info(sta_id) {
            if self.registry.sta_info(scanning).scan.state == ScanState::Scanning {
                let notified = scan::next(&mut self.registry, &mut self.commands, self.now, scanning);
                scan::deliver_notifications(
                    &mut self.registry,
                    scanning,
                    &notified,
                    self.roam_requester,
                );
            }
        }
    }

    fn connected_sta_info(&self, sta: StaId) -> Option<StaInfoId> {
        self.registry
            .sta(sta)
            .info_ids()
            .iter()
            .copied()
            .find(|&si| {
                self.registry.sta_info(si).is_connected()
                    && self.registry.node(self.registry.sta_info(si).node).is_local()
            })
    }

    /// A station answered a BSS transition request.
    pub fn handle_btm_response(&mut self, node_key: &str, addr: MacAddr, status_code: u8) {
        let Some(si_id) = self.find_sta_info(node_key, addr) else {
            return;
        };

        self.registry.sta_info_mut(si_id).btm_response = Some(crate::sta::BtmResponse {
            status_code,
            timestamp: self.now,
        });

        if status_code != 0 {
            tracing::debug!(sta = %addr, status_code, "BSS transition rejected");
            // The scheduled kick would defeat the reject back-off.
            self.registry.sta_info_mut(si_id).kick_time = 0;
        }
    }

    // ─── Gossip ─────────────────────────────────────────────────────────

    /// Fold a peer's update into the registry.
    pub fn apply_host_update(&mut self, update: &HostUpdate) {
        if self.config.local_mode {
            return;
        }

        for summary in &update.nodes {
            let key = format!("{}#{}", update.host, summary.name);
            let node_id = match self.registry.node_by_key(&key) {
                Some(id) => id,
                None => {
                    tracing::info!(node = %key, "remote node discovered");
                    self.registry
                        .insert_node(Node::new(key.clone(), NodeType::Remote, self.now))
                }
            };

            {
                let node = self.registry.node_mut(node_id);
                node.bssid = summary.bssid;
                node.ssid = summary.ssid.clone();
                node.freq = summary.freq;
                node.channel = summary.channel;
                node.op_class = summary.op_class;
                node.noise = summary.noise;
                node.n_assoc = summary.n_assoc;
                node.max_assoc = summary.max_assoc;
                node.load = summary.load.min(100);
                node.last_update = self.now;
            }

            if let Some((bssid, ssid, hex)) = &summary.rrm_nr {
                match NrTemplate::from_hex(bssid, ssid, hex) {
                    Some(tpl) => self.registry.node_mut(node_id).rrm_nr = Some(tpl),
                    None => {
                        let mut ev = Event::new(EventKind::InvalidNr);
                        ev.node_local = Some(key.clone());
                        self.events.push(ev);
                    }
                }
            }

            self.wheel.set(
                TimeoutPayload::NodeTick(node_id),
                self.now + self.config.remote_node_timeout,
            );

            for sta in &summary.stations {
                let sta_id = self.registry.sta_get_or_create(sta.addr);
                self.registry.sta_mut(sta_id).note_band(summary.freq);

                let si_id = self
                    .registry
                    .sta_info_get_or_create(sta_id, node_id, self.now);
                {
                    let si = self.registry.sta_info_mut(si_id);
                    si.signal = sta.signal;
                    si.seen = self.now.saturating_sub(sta.seen_ms_ago);
                    si.connected = if sta.connected {
                        ConnectionState::Connected
                    } else {
                        ConnectionState::NotConnected
                    };
                }
                self.touch_sta_info(si_id);
            }
        }
    }

    /// Summary of the local nodes for the outbound gossip frame.
    pub fn local_summary(&self, host: &str) -> HostUpdate {
        let nodes = self
            .registry
            .local_node_ids()
            .into_iter()
            .map(|id| {
                let node = self.registry.node(id);
                let stations = node
                    .sta_info_ids()
                    .iter()
                    .map(|&si| {
                        let info = self.registry.sta_info(si);
                        StaSummary {
                            addr: self.registry.sta(info.sta).addr,
                            signal: info.signal,
                            seen_ms_ago: self.now.saturating_sub(info.seen),
                            connected: info.is_connected(),
                        }
                    })
                    .collect();

                NodeSummary {
                    name: node.key.clone(),
                    bssid: node.bssid,
                    ssid: node.ssid.clone(),
                    freq: node.freq,
                    channel: node.channel,
                    op_class: node.op_class,
                    noise: node.noise,
                    n_assoc: node.n_assoc,
                    max_assoc: node.max_assoc,
                    load: node.load,
                    rrm_nr: node.rrm_nr.as_ref().map(|tpl| {
                        (
                            tpl.bssid.clone(),
                            tpl.ssid.clone(),
                            neighbor::dump_hex(&tpl.frame),
                        )
                    }),
                    stations,
                }
            })
            .collect();

        HostUpdate {
            host: host.to_string(),
            nodes,
        }
    }

    // ─── RRM ────────────────────────────────────────────────────────────

    /// Ranked neighbor-report frames (hex) for a node, e.g. to answer a
    /// station's neighbor-report query.
    pub fn neighbor_list_for_node(&self, node_key: &str, rating: ReferenceRating) -> Vec<String> {
        let Some(node_id) = self.registry.node_by_key(node_key) else {
            return Vec::new();
        };

        let list = CandidateList::build_for_node(
            &self.registry,
            node_id,
            rating,
            self.config.max_neighbor_reports,
        );

        list.entries()
            .iter()
            .filter_map(|entry| {
                let frame = self
                    .registry
                    .node(entry.node)
                    .rrm_nr
                    .as_ref()?
                    .frame_with_preference(entry.priority)?;
                Some(neighbor::dump_hex(&frame))
            })
            .collect()
    }

    // ─── Status ─────────────────────────────────────────────────────────

    pub fn status(&self) -> StatusReport {
        status::snapshot(&self.registry, self.now)
    }
}
