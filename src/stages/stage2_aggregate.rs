use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::models::{
    ConsensusLine, ConsensusWordSlot, LineGroup, StatefulWord, LOW_SUPPORT_RELIABILITY,
    SINGLE_CANDIDATE_RELIABILITY,
};

use super::stage1_extract_tags::{annotate_sentences, AnnotatedSentence};

/// Word slots and overall reliability for one merged line
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSentence {
    pub slots: Vec<ConsensusWordSlot>,
    /// Mean clamped slot reliability, 0.0 without slots
    pub reliability: f64,
}

/// Reliability of one word position from the texts transcribed there.
///
/// Fewer than two candidates, or two that disagree, get negative sentinels;
/// otherwise the share of candidates matching the most frequent text.
pub fn word_reliability(texts: &[&str]) -> f64 {
    let total = texts.len();
    if total < 2 {
        return SINGLE_CANDIDATE_RELIABILITY;
    }

    let distinct: HashSet<&str> = texts.iter().copied().collect();
    if total < 3 && distinct.len() > 1 {
        return LOW_SUPPORT_RELIABILITY;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for &text in texts {
        *counts.entry(text).or_default() += 1;
    }
    let most_common = counts.values().copied().max().unwrap_or(0);

    most_common as f64 / total as f64
}

/// Order candidates by descending text frequency; the sort is stable so
/// ties keep first-seen order.
pub fn rank_candidates(mut candidates: Vec<StatefulWord>) -> Vec<StatefulWord> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for candidate in &candidates {
        *counts.entry(candidate.text.clone()).or_default() += 1;
    }
    candidates.sort_by_key(|c| Reverse(counts.get(&c.text).copied().unwrap_or(0)));
    candidates
}

/// Merge the sentences of one line group position by position.
///
/// Positions are raw word indices; shorter sentences contribute nothing to
/// later positions.
pub fn aggregate_sentences(sentences: &[AnnotatedSentence]) -> AggregatedSentence {
    let width = sentences.iter().map(|s| s.words.len()).max().unwrap_or(0);

    let slots: Vec<ConsensusWordSlot> = (0..width)
        .map(|position| {
            let candidates: Vec<StatefulWord> = sentences
                .iter()
                .filter_map(|s| s.words.get(position).cloned())
                .collect();
            let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
            let reliability = word_reliability(&texts);

            ConsensusWordSlot {
                position,
                candidates: rank_candidates(candidates),
                reliability,
            }
        })
        .collect();

    let reliability = if slots.is_empty() {
        0.0
    } else {
        slots.iter().map(|s| s.clamped_reliability()).sum::<f64>() / slots.len() as f64
    };

    AggregatedSentence { slots, reliability }
}

/// Build the consensus line for one group
pub fn build_consensus_line(group: &LineGroup) -> ConsensusLine {
    let sentences = annotate_sentences(group);
    let aggregated = aggregate_sentences(&sentences);

    debug!(
        "Subject {} line {}: {} sentences, {} positions, reliability {:.3}",
        group.subject_id,
        group.group_index,
        sentences.len(),
        aggregated.slots.len(),
        aggregated.reliability
    );

    ConsensusLine {
        subject_id: group.subject_id,
        group_index: group.group_index,
        mean_coords: group.mean_coords(),
        slots: aggregated.slots,
        reliability: aggregated.reliability,
        transcription_ids: group.transcription_ids(),
    }
}

/// Perform Stage 2: one consensus line per group, in group order
pub fn execute_aggregation(groups: &[LineGroup]) -> Vec<ConsensusLine> {
    let lines: Vec<ConsensusLine> = groups.iter().map(build_consensus_line).collect();

    info!("Stage 2: built {} consensus lines", lines.len());

    lines
}
