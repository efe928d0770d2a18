//! # Candidate list builder
//!
//! Transient, bounded, ordered lists of steering targets. Two entry
//! points: seeded from the node table when answering a neighbor-report
//! query, or from a station's sighting records when picking a roam
//! target. Both end with the same load-classification and priority
//! passes.

use crate::config::SteerConfig;
use crate::ids::{NodeId, StaInfoId};
use crate::policy;
use crate::registry::Registry;

/// Selection-reason bits carried per candidate.
pub mod select_reason {
    /// The candidate has meaningfully fewer associations.
    pub const NUM_ASSOC: u32 = 1 << 0;
    /// The candidate hears the station meaningfully better.
    pub const SIGNAL: u32 = 1 << 1;
    /// The current node is overloaded and the candidate is not.
    pub const LOAD: u32 = 1 << 2;

    pub const ALL: u32 = NUM_ASSOC | SIGNAL | LOAD;
}

/// Highest / lowest BSS-transition candidate preference values.
pub const MAX_PREFERENCE: u8 = 255;
pub const MIN_PREFERENCE: u8 = 0;

/// How the reference node itself is treated while building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceRating {
    /// Leave the reference node out entirely.
    Exclude,
    /// Include it with minimum preference.
    Forbid,
    /// No special treatment.
    Regular,
    /// Include it with maximum preference.
    Prefer,
}

/// One list entry.
#[derive(Debug, Clone)]
pub struct CandidateEntry {
    pub node: NodeId,
    pub signal: i32,
    /// Bitmask over [`select_reason`].
    pub reasons: u32,
    pub priority: u8,
}

/// Bounded ordered candidate sequence; `max_length == 0` is unbounded.
#[derive(Debug, Default)]
pub struct CandidateList {
    entries: Vec<CandidateEntry>,
    max_length: usize,
}

fn classify_load(load: u8) -> u8 {
    (load / 10) * 10
}

impl CandidateList {
    pub fn new(max_length: usize) -> Self {
        CandidateList {
            entries: Vec::new(),
            max_length,
        }
    }

    pub fn entries(&self) -> &[CandidateEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.iter().any(|e| e.node == node)
    }

    fn can_insert(&self) -> bool {
        self.max_length == 0 || self.entries.len() < self.max_length
    }

    /// Append a node unless it is present or the list is full.
    fn add_node(&mut self, node: NodeId, signal: i32, reasons: u32) -> bool {
        if !self.can_insert() || self.contains(node) {
            return false;
        }
        self.entries.push(CandidateEntry {
            node,
            signal,
            reasons,
            priority: 0,
        });
        true
    }

    /// Append a node, displacing the worst-signal entry when the list
    /// is full and the newcomer hears better.
    fn add_better_node(&mut self, node: NodeId, signal: i32, reasons: u32) -> bool {
        if self.contains(node) {
            return false;
        }

        if self.add_node(node, signal, reasons) {
            return true;
        }

        let worst = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.signal)
            .map(|(i, e)| (i, e.signal));

        match worst {
            Some((idx, worst_signal)) if worst_signal < signal => {
                self.entries.remove(idx);
                self.add_node(node, signal, reasons)
            }
            _ => false,
        }
    }

    fn add_local_nodes(&mut self, reg: &Registry, node_ref: NodeId, rating: ReferenceRating) {
        let ref_ssid = reg.node(node_ref).ssid.clone();

        for id in reg.local_node_ids() {
            if id == node_ref && rating == ReferenceRating::Exclude {
                continue;
            }
            if reg.node(id).ssid != ref_ssid || reg.node(id).disabled {
                continue;
            }
            self.add_node(id, 0, 0);
        }
    }

    fn add_remote_nodes(&mut self, reg: &Registry, node_ref: NodeId) {
        let mut last = None;
        while self.can_insert() {
            let Some(id) = reg.next_neighbor(node_ref, last) else {
                break;
            };
            self.add_node(id, 0, 0);
            last = Some(id);
        }
    }

    /// Sort by classified load ascending; within a class, 5 GHz wins.
    fn sort_by_load(&mut self, reg: &Registry) {
        self.entries.sort_by_key(|e| {
            let node = reg.node(e.node);
            (classify_load(node.load), !node.is_5ghz())
        });
    }

    /// Walk the load-sorted list assigning preferences: start at 255,
    /// step down whenever the load class increases. The reference node
    /// is pinned to 255 (`Prefer`) or 0 (`Forbid`).
    fn assign_priorities(&mut self, reg: &Registry, node_ref: NodeId, rating: ReferenceRating) {
        let mut pref = MAX_PREFERENCE;
        if rating == ReferenceRating::Prefer {
            pref -= 1;
        }

        let mut last_class: Option<u8> = None;
        for entry in &mut self.entries {
            let class = classify_load(reg.node(entry.node).load);
            if let Some(last) = last_class {
                if last < class {
                    pref = pref.saturating_sub(1);
                }
            }
            entry.priority = pref;
            last_class = Some(class);

            if entry.node == node_ref {
                match rating {
                    ReferenceRating::Prefer => entry.priority = MAX_PREFERENCE,
                    ReferenceRating::Forbid => entry.priority = MIN_PREFERENCE,
                    _ => {}
                }
            }
        }
    }

    fn sort_by_priority(&mut self) {
        self.entries.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Ranked neighbor list for a reference node: local same-SSID nodes
    /// first, then remote neighbors until the cap.
    pub fn build_for_node(
        reg: &Registry,
        node_ref: NodeId,
        rating: ReferenceRating,
        max_length: usize,
    ) -> Self {
        let mut list = CandidateList::new(max_length);

        list.add_local_nodes(reg, node_ref, rating);
        list.add_remote_nodes(reg, node_ref);

        list.sort_by_load(reg);
        list.assign_priorities(reg, node_ref, rating);
        list.sort_by_priority();

        list
    }

    /// Ranked roam targets for a station, built from its sighting
    /// records and filtered by the admission policy predicates.
    pub fn build_for_sta(
        reg: &Registry,
        cfg: &SteerConfig,
        now: u64,
        reference: StaInfoId,
        rating: ReferenceRating,
        required_criteria: u32,
        signal_max_age: u64,
        max_length: usize,
    ) -> Self {
        let mut list = CandidateList::new(max_length);

        let si_ref = reg.sta_info(reference);
        let (ref_node, ref_signal, sta_id) = (si_ref.node, si_ref.signal, si_ref.sta);

        for foreign_id in reg.sta(sta_id).info_ids() {
            let foreign = reg.sta_info(*foreign_id);

            if rating == ReferenceRating::Exclude && foreign.node == ref_node {
                continue;
            }
            if !policy::node_selectable_by_sta_info(cfg, reg, now, reference, *foreign_id, signal_max_age)
            {
                continue;
            }

            let reasons = policy::is_better_candidate(
                cfg,
                reg.node(ref_node),
                ref_signal,
                reg.node(foreign.node),
                foreign.signal,
            );
            if reasons == 0 || (required_criteria != 0 && reasons & required_criteria == 0) {
                continue;
            }

            list.add_better_node(foreign.node, foreign.signal, reasons);
        }

        list.sort_by_load(reg);
        list.assign_priorities(reg, ref_node, rating);
        list.sort_by_priority();

        list
    }
}

/// Best steering target for a station, excluding the node it is on.
pub fn find_better_candidate(
    reg: &Registry,
    cfg: &SteerConfig,
    now: u64,
    reference: StaInfoId,
    required_criteria: u32,
    signal_max_age: u64,
) -> Option<CandidateEntry> {
    let list = CandidateList::build_for_sta(
        reg,
        cfg,
        now,
        reference,
        ReferenceRating::Exclude,
        required_criteria,
        signal_max_age,
        1,
    );
    list.entries().first().cloned()
}
