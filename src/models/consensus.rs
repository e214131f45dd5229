use serde::{Deserialize, Serialize};

use super::{LineCoords, StatefulWord};

/// Reliability assigned to a position with fewer than two candidates
pub const SINGLE_CANDIDATE_RELIABILITY: f64 = -0.25;

/// Reliability assigned to two disagreeing candidates
pub const LOW_SUPPORT_RELIABILITY: f64 = -0.5;

/// Ranked candidates for one word position of a line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusWordSlot {
    pub position: usize,
    /// Most frequent text first; ties keep first-seen order
    pub candidates: Vec<StatefulWord>,
    /// Unclamped; may hold a negative sentinel
    pub reliability: f64,
}

impl ConsensusWordSlot {
    /// The rank-0 candidate
    pub fn consensus(&self) -> Option<&StatefulWord> {
        self.candidates.first()
    }

    /// Reliability clamped to [0, 1]
    pub fn clamped_reliability(&self) -> f64 {
        self.reliability.clamp(0.0, 1.0)
    }
}

/// Merged, ranked and scored output for one line group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusLine {
    pub subject_id: u64,
    pub group_index: usize,
    pub mean_coords: LineCoords,
    pub slots: Vec<ConsensusWordSlot>,
    /// Mean clamped slot reliability, 0.0 for a line without slots
    pub reliability: f64,
    pub transcription_ids: Vec<u64>,
}

impl ConsensusLine {
    /// Rank-0 text of every slot
    pub fn consensus_words(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter_map(|s| s.consensus())
            .map(|w| w.text.as_str())
            .collect()
    }

    pub fn consensus_sentence(&self) -> String {
        self.consensus_words().join(" ")
    }

    /// Candidate count per slot
    pub fn candidate_counts(&self) -> Vec<usize> {
        self.slots.iter().map(|s| s.candidates.len()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TagStates;

    fn word(text: &str) -> StatefulWord {
        StatefulWord {
            text: text.to_string(),
            span: (0, text.len()),
            tag_states: TagStates::new(),
            transcription_id: 0,
            source_sentence: Default::default(),
        }
    }

    #[test]
    fn test_clamped_reliability() {
        let slot = ConsensusWordSlot {
            position: 0,
            candidates: vec![word("ship")],
            reliability: SINGLE_CANDIDATE_RELIABILITY,
        };
        assert_eq!(slot.clamped_reliability(), 0.0);
        assert_eq!(slot.reliability, -0.25);
    }

    #[test]
    fn test_consensus_sentence() {
        let line = ConsensusLine {
            subject_id: 1,
            group_index: 0,
            mean_coords: LineCoords::new(0.0, 0.0, 0.0, 0.0),
            slots: vec![
                ConsensusWordSlot {
                    position: 0,
                    candidates: vec![word("send"), word("sand")],
                    reliability: LOW_SUPPORT_RELIABILITY,
                },
                ConsensusWordSlot {
                    position: 1,
                    candidates: vec![word("arms")],
                    reliability: SINGLE_CANDIDATE_RELIABILITY,
                },
            ],
            reliability: 0.0,
            transcription_ids: vec![3, 4],
        };

        assert_eq!(line.consensus_sentence(), "send arms");
        assert_eq!(line.candidate_counts(), vec![2, 1]);
    }
}
