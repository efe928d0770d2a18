//! # Measurement reports and roam candidates
//!
//! A measurement is a raw 802.11k beacon-report observation from a
//! station about one AP. A candidate is the derived per-(STA, AP)
//! record the scoring pass keeps fresh; it carries the throughput
//! estimate and final score used for ranking.

use serde::Serialize;

use crate::ids::{NodeId, StaId};

/// Candidate records expire this long after their last refresh.
pub const CANDIDATE_TTL: u64 = 10_000;

/// RCPI (802.11k) to RSSI in dBm.
pub fn rcpi_to_rssi(rcpi: u8) -> i32 {
    (rcpi as i32) / 2 - 110
}

/// A beacon-report observation.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub sta: StaId,
    pub node: NodeId,
    pub timestamp: u64,
    pub rcpi: u8,
    pub rsni: u8,
}

impl Measurement {
    pub fn rssi(&self) -> i32 {
        rcpi_to_rssi(self.rcpi)
    }
}

/// Where a candidate's signal information came from, ordered by
/// freshness preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Unknown,
    StaInfo,
    Measurement,
}

/// Derived roam-candidate record for one (STA, AP) pair.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub sta: StaId,
    pub node: NodeId,
    /// Last refresh by the scoring pass; the TTL re-arms from here.
    pub timestamp: u64,
    pub signal: i32,
    pub snr: i32,
    pub estimated_throughput: u16,
    pub score: u16,
    pub information_source: CandidateSource,
    /// Observation time backing the current signal; feeds the age penalty.
    pub information_timestamp: u64,
    pub priority: u8,
}

impl Candidate {
    pub fn new(sta: StaId, node: NodeId, now: u64) -> Self {
        Candidate {
            sta,
            node,
            timestamp: now,
            signal: 0,
            snr: 0,
            estimated_throughput: 0,
            score: 0,
            information_source: CandidateSource::Unknown,
            information_timestamp: 0,
            priority: 0,
        }
    }

    /// Adopt a new observation unless a fresher higher-ranked source is
    /// already recorded.
    pub fn update_information(&mut self, source: CandidateSource, timestamp: u64) {
        if self.information_source > source && self.information_timestamp > timestamp {
            return;
        }
        self.information_source = source;
        self.information_timestamp = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rcpi_conversion() {
        assert_eq!(rcpi_to_rssi(0), -110);
        assert_eq!(rcpi_to_rssi(90), -65);
        assert_eq!(rcpi_to_rssi(220), 0);
    }

    #[test]
    fn information_ranking() {
        let mut c = Candidate::new(StaId(0), NodeId(0), 0);

        c.update_information(CandidateSource::StaInfo, 100);
        assert_eq!(c.information_source, CandidateSource::StaInfo);

        c.update_information(CandidateSource::Measurement, 150);
        assert_eq!(c.information_source, CandidateSource::Measurement);
        assert_eq!(c.information_timestamp, 150);

        // An older sta_info sighting does not displace a fresher measurement.
        c.update_information(CandidateSource::StaInfo, 120);
        assert_eq!(c.information_source, CandidateSource::Measurement);
        assert_eq!(c.information_timestamp, 150);

        // A newer sta_info sighting does.
        c.update_information(CandidateSource::StaInfo, 200);
        assert_eq!(c.information_source, CandidateSource::StaInfo);
        assert_eq!(c.information_timestamp, 200);
    }
}
