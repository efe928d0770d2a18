//! # Node & station registry
//!
//! All long-lived records live here: nodes in slab arenas with a
//! key-ordered index, stations indexed by MAC, and the dependent
//! (STA, AP) records (`StaInfo`, `Measurement`, `Candidate`). Each
//! dependent record is linked from both its station and its node;
//! every removal unlinks both sides before the record is dropped, so
//! the two views can never disagree.

use std::collections::BTreeMap;

use slab::Slab;

use crate::ids::{CandidateId, MacAddr, MeasurementId, NodeId, StaId, StaInfoId};
use crate::measurement::{Candidate, Measurement};
use crate::node::{Node, NodeType};
use crate::sta::{Sta, StaInfo};

#[derive(Debug, Default)]
pub struct Registry {
    nodes: Slab<Node>,
    nodes_by_key: BTreeMap<String, NodeId>,

    stas: Slab<Sta>,
    stas_by_addr: BTreeMap<MacAddr, StaId>,

    sta_infos: Slab<StaInfo>,
    measurements: Slab<Measurement>,
    candidates: Slab<Candidate>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Nodes ──────────────────────────────────────────────────────────

    /// Insert a node; replaces nothing, the key must be new.
    pub fn insert_node(&mut self, node: Node) -> NodeId {
        debug_assert!(!self.nodes_by_key.contains_key(&node.key));
        let key = node.key.clone();
        let id = NodeId(self.nodes.insert(node));
        self.nodes_by_key.insert(key, id);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn node_by_key(&self, key: &str) -> Option<NodeId> {
        self.nodes_by_key.get(key).copied()
    }

    pub fn node_by_bssid(&self, bssid: MacAddr) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, n)| n.bssid == bssid)
            .map(|(id, _)| NodeId(id))
    }

    /// All nodes in key order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes_by_key.values().copied().collect()
    }

    pub fn local_node_ids(&self) -> Vec<NodeId> {
        self.nodes_by_key
            .values()
            .copied()
            .filter(|&id| self.node(id).is_local())
            .collect()
    }

    /// Remove a node and every dependent record.
    pub fn remove_node(&mut self, id: NodeId) -> Node {
        for si in self.nodes[id.0].sta_info.clone() {
            self.remove_sta_info(si);
        }
        for m in self.nodes[id.0].measurements.clone() {
            self.remove_measurement(m);
        }
        for c in self.nodes[id.0].candidates.clone() {
            self.remove_candidate(c);
        }

        let node = self.nodes.remove(id.0);
        self.nodes_by_key.remove(&node.key);
        node
    }

    /// Next remote neighbor of `reference` in key order, starting after
    /// `last` (`None` starts from the beginning). Only enabled nodes
    /// sharing the reference SSID qualify.
    pub fn next_neighbor(&self, reference: NodeId, last: Option<NodeId>) -> Option<NodeId> {
        let ref_ssid = &self.node(reference).ssid;
        let last_key = last.map(|id| self.node(id).key.clone());

        let range: Box<dyn Iterator<Item = (&String, &NodeId)> + '_> = match last_key {
            Some(key) => Box::new(
                self.nodes_by_key
                    .range((std::ops::Bound::Excluded(key), std::ops::Bound::Unbounded)),
            ),
            None => Box::new(self.nodes_by_key.iter()),
        };

        for (_, &id) in range {
            let node = self.node(id);
            if node.node_type != NodeType::Remote || node.disabled {
                continue;
            }
            if node.ssid != *ref_ssid {
                continue;
            }
            return Some(id);
        }

        None
    }

    /// Recompute `n_assoc` from the connected station records.
    pub fn refresh_n_assoc(&mut self, id: NodeId) {
        let count = self.nodes[id.0]
            .sta_info
            .iter()
            .filter(|&&si| self.sta_infos[si.0].is_connected())
            .count() as u32;
        self.nodes[id.0].n_assoc = count;
    }

    // ─── Stations ───────────────────────────────────────────────────────

    pub fn sta_by_addr(&self, addr: MacAddr) -> Option<StaId> {
        self.stas_by_addr.get(&addr).copied()
    }

    pub fn sta_get_or_create(&mut self, addr: MacAddr) -> StaId {
        if let Some(id) = self.stas_by_addr.get(&addr) {
            return *id;
        }
        let id = StaId(self.stas.insert(Sta::new(addr)));
        self.stas_by_addr.insert(addr, id);
        id
    }

    pub fn sta(&self, id: StaId) -> &Sta {
        &self.stas[id.0]
    }

    pub fn sta_mut(&mut self, id: StaId) -> &mut Sta {
        &mut self.stas[id.0]
    }

    pub fn sta_ids(&self) -> Vec<StaId> {
        self.stas_by_addr.values().copied().collect()
    }

    /// Remove a station and every dependent record.
    pub fn remove_sta(&mut self, id: StaId) -> Sta {
        for si in self.stas[id.0].infos.clone() {
            self.remove_sta_info(si);
        }
        for m in self.stas[id.0].measurements.clone() {
            self.remove_measurement(m);
        }
        for c in self.stas[id.0].candidates.clone() {
            self.remove_candidate(c);
        }

        let sta = self.stas.remove(id.0);
        self.stas_by_addr.remove(&sta.addr);
        sta
    }

    // ─── Station-at-node records ────────────────────────────────────────

    pub fn sta_info(&self, id: StaInfoId) -> &StaInfo {
        &self.sta_infos[id.0]
    }

    pub fn sta_info_mut(&mut self, id: StaInfoId) -> &mut StaInfo {
        &mut self.sta_infos[id.0]
    }

    pub fn find_sta_info(&self, sta: StaId, node: NodeId) -> Option<StaInfoId> {
        self.stas[sta.0]
            .infos
            .iter()
            .copied()
            .find(|&si| self.sta_infos[si.0].node == node)
    }

    /// Existing record for the pair, or a fresh one linked on both sides.
    pub fn sta_info_get_or_create(&mut self, sta: StaId, node: NodeId, now: u64) -> StaInfoId {
        if let Some(id) = self.find_sta_info(sta, node) {
            return id;
        }

        let id = StaInfoId(self.sta_infos.insert(StaInfo::new(sta, node, now)));
        self.stas[sta.0].infos.push(id);
        self.nodes[node.0].sta_info.push(id);
        id
    }

    pub fn remove_sta_info(&mut self, id: StaInfoId) -> StaInfo {
        let info = self.sta_infos.remove(id.0);
        self.stas[info.sta.0].infos.retain(|&si| si != id);
        self.nodes[info.node.0].sta_info.retain(|&si| si != id);
        info
    }

    // ─── Measurements ───────────────────────────────────────────────────

    pub fn measurement(&self, id: MeasurementId) -> &Measurement {
        &self.measurements[id.0]
    }

    pub fn measurement_mut(&mut self, id: MeasurementId) -> &mut Measurement {
        &mut self.measurements[id.0]
    }

    pub fn find_measurement(&self, sta: StaId, node: NodeId) -> Option<MeasurementId> {
        self.stas[sta.0]
            .measurements
            .iter()
            .copied()
            .find(|&m| self.measurements[m.0].node == node)
    }

    /// Upsert the measurement for the pair.
    pub fn measurement_upsert(
        &mut self,
        sta: StaId,
        node: NodeId,
        rcpi: u8,
        rsni: u8,
        now: u64,
    ) -> MeasurementId {
        if let Some(id) = self.find_measurement(sta, node) {
            let m = &mut self.measurements[id.0];
            m.rcpi = rcpi;
            m.rsni = rsni;
            m.timestamp = now;
            return id;
        }

        let id = MeasurementId(self.measurements.insert(Measurement {
            sta,
            node,
            timestamp: now,
            rcpi,
            rsni,
        }));
        self.stas[sta.0].measurements.push(id);
        self.nodes[node.0].measurements.push(id);
        id
    }

    pub fn remove_measurement(&mut self, id: MeasurementId) -> Measurement {
        let m = self.measurements.remove(id.0);
        self.stas[m.sta.0].measurements.retain(|&x| x != id);
        self.nodes[m.node.0].measurements.retain(|&x| x != id);
        m
    }

    // ─── Candidates ─────────────────────────────────────────────────────

    pub fn candidate(&self, id: CandidateId) -> &Candidate {
        &self.candidates[id.0]
    }

    pub fn candidate_mut(&mut self, id: CandidateId) -> &mut Candidate {
        &mut self.candidates[id.0]
    }

    pub fn find_candidate(&self, sta: StaId, node: NodeId) -> Option<CandidateId> {
        self.stas[sta.0]
            .candidates
            .iter()
            .copied()
            .find(|&c| self.candidates[c.0].node == node)
    }

    pub fn candidate_get_or_create(&mut self, sta: StaId, node: NodeId, now: u64) -> CandidateId {
        if let Some(id) = self.find_candidate(sta, node) {
            self.candidates[id.0].timestamp = now;
            return id;
        }

        let id = CandidateId(self.candidates.insert(Candidate::new(sta, node, now)));
        self.stas[sta.0].candidates.push(id);
        self.nodes[node.0].candidates.push(id);
        id
    }

    pub fn remove_candidate(&mut self, id: CandidateId) -> Candidate {
        let c = self.candidates.remove(id.0);
        self.stas[c.sta.0].candidates.retain(|&x| x != id);
        self.nodes[c.node.0].candidates.retain(|&x| x != id);
        c
    }

    /// Candidates of a station, unordered.
    pub fn sta_candidates(&self, sta: StaId) -> &[CandidateId] {
        &self.stas[sta.0].candidates
    }
}
