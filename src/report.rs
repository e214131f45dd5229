use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{
    ConsensusLine, RawLineObservation, LOW_SUPPORT_RELIABILITY, SINGLE_CANDIDATE_RELIABILITY,
};

/// Number of equal-width bins over [0, 1]
pub const HISTOGRAM_BINS: usize = 10;

/// Distribution of reliability scores over a set of consensus lines
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReliabilitySummary {
    pub line_count: usize,
    pub subject_count: usize,
    pub slot_count: usize,
    /// Positions with at least two candidates and a positive share
    pub majority_slots: usize,
    pub single_candidate_slots: usize,
    pub low_support_slots: usize,
    /// Sentence reliabilities per bin; 1.0 lands in the last bin
    pub histogram: [usize; HISTOGRAM_BINS],
    pub mean_line_reliability: f64,
    /// Mean over subjects of each subject's mean line reliability
    pub mean_subject_reliability: f64,
}

impl ReliabilitySummary {
    pub fn from_lines(lines: &[ConsensusLine]) -> Self {
        let mut summary = Self {
            line_count: lines.len(),
            subject_count: 0,
            slot_count: 0,
            majority_slots: 0,
            single_candidate_slots: 0,
            low_support_slots: 0,
            histogram: [0; HISTOGRAM_BINS],
            mean_line_reliability: 0.0,
            mean_subject_reliability: 0.0,
        };
        let mut per_subject: BTreeMap<u64, (f64, usize)> = BTreeMap::new();

        for line in lines {
            for slot in &line.slots {
                summary.slot_count += 1;
                if slot.reliability == SINGLE_CANDIDATE_RELIABILITY {
                    summary.single_candidate_slots += 1;
                } else if slot.reliability == LOW_SUPPORT_RELIABILITY {
                    summary.low_support_slots += 1;
                } else if slot.reliability > 0.0 {
                    summary.majority_slots += 1;
                }
            }

            summary.histogram[histogram_bin(line.reliability)] += 1;

            let entry = per_subject.entry(line.subject_id).or_insert((0.0, 0));
            entry.0 += line.reliability;
            entry.1 += 1;
        }

        summary.subject_count = per_subject.len();
        if !lines.is_empty() {
            summary.mean_line_reliability =
                lines.iter().map(|l| l.reliability).sum::<f64>() / lines.len() as f64;
            summary.mean_subject_reliability = per_subject
                .values()
                .map(|(total, count)| total / *count as f64)
                .sum::<f64>()
                / per_subject.len() as f64;
        }

        summary
    }

    /// Lower and upper edge of bin `index`
    pub fn bin_range(index: usize) -> (f64, f64) {
        let width = 1.0 / HISTOGRAM_BINS as f64;
        (index as f64 * width, (index + 1) as f64 * width)
    }
}

/// Lines marked by each transcription of one subject
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectLineCounts {
    pub subject_id: u64,
    pub transcriptions: usize,
    pub min: usize,
    pub max: usize,
    pub mean: f64,
}

/// Per-subject line counts per transcription.
///
/// Transcriptions that marked no lines leave no observations and are not
/// counted.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LineCountSummary {
    pub subjects: Vec<SubjectLineCounts>,
}

impl LineCountSummary {
    pub fn from_observations(observations: &[RawLineObservation]) -> Self {
        let mut counts: BTreeMap<u64, BTreeMap<u64, usize>> = BTreeMap::new();
        for obs in observations {
            *counts
                .entry(obs.subject_id)
                .or_default()
                .entry(obs.transcription_id)
                .or_default() += 1;
        }

        let subjects = counts
            .into_iter()
            .map(|(subject_id, per_transcription)| {
                let lines: Vec<usize> = per_transcription.into_values().collect();
                SubjectLineCounts {
                    subject_id,
                    transcriptions: lines.len(),
                    min: lines.iter().copied().min().unwrap_or(0),
                    max: lines.iter().copied().max().unwrap_or(0),
                    mean: lines.iter().sum::<usize>() as f64 / lines.len().max(1) as f64,
                }
            })
            .collect();

        Self { subjects }
    }

    /// Smallest per-subject minimum
    pub fn min(&self) -> usize {
        self.subjects.iter().map(|s| s.min).min().unwrap_or(0)
    }

    /// Largest per-subject maximum
    pub fn max(&self) -> usize {
        self.subjects.iter().map(|s| s.max).max().unwrap_or(0)
    }

    /// Mean of the per-subject means
    pub fn mean(&self) -> f64 {
        if self.subjects.is_empty() {
            return 0.0;
        }
        self.subjects.iter().map(|s| s.mean).sum::<f64>() / self.subjects.len() as f64
    }
}

fn histogram_bin(reliability: f64) -> usize {
    let clamped = reliability.clamp(0.0, 1.0);
    ((clamped * HISTOGRAM_BINS as f64) as usize).min(HISTOGRAM_BINS - 1)
}
