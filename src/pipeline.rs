use std::collections::BTreeMap;

use anyhow::Context;
use tokio::task::JoinSet;
use tracing::info;

use crate::cache::{group_lines_cached, GroupingCache};
use crate::error::Result;
use crate::models::{ConsensusLine, LineGroup, RawLineObservation};
use crate::stages::{
    build_consensus_line, execute_aggregation, execute_filter, FilterConfig, FilterResult,
    GroupingResult, LineMatchConfig,
};

/// Configuration for stages 0 to 3
#[derive(Debug, Clone, Default)]
pub struct ConsensusConfig {
    pub line_match: LineMatchConfig,
    pub filter: FilterConfig,
}

/// Output of a consensus run
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub subject_count: usize,
    pub group_count: usize,
    pub observation_count: usize,
    /// Every consensus line before filtering, ordered by (subject, group)
    pub consensus: Vec<ConsensusLine>,
    pub filtered: FilterResult,
}

impl PipelineResult {
    fn new(grouping: &GroupingResult, consensus: Vec<ConsensusLine>, config: &FilterConfig) -> Self {
        let filtered = execute_filter(consensus.clone(), config);
        Self {
            subject_count: grouping.subject_count,
            group_count: grouping.groups.len(),
            observation_count: grouping.observation_count,
            consensus,
            filtered,
        }
    }
}

/// Run stages 0 to 3 on one thread.
///
/// Observations must be sorted by (subject, y1, y2, x1, x2).
pub fn run_pipeline(
    observations: &[RawLineObservation],
    config: &ConsensusConfig,
    cache: &dyn GroupingCache,
) -> Result<PipelineResult> {
    let grouping = group_lines_cached(cache, observations, &config.line_match)?;
    let consensus = execute_aggregation(&grouping.groups);
    Ok(PipelineResult::new(&grouping, consensus, &config.filter))
}

/// Run stages 0 to 3 with stages 1 and 2 spread across subjects.
///
/// Grouping runs first on the caller's task; each subject's groups are then
/// aggregated on a blocking worker. Filtering needs the whole stream in
/// order, so it runs once all workers have finished.
pub async fn run_pipeline_parallel(
    observations: &[RawLineObservation],
    config: &ConsensusConfig,
    cache: &dyn GroupingCache,
) -> anyhow::Result<PipelineResult> {
    let grouping = group_lines_cached(cache, observations, &config.line_match)?;
    let consensus = build_consensus_parallel(grouping.groups.clone()).await?;
    Ok(PipelineResult::new(&grouping, consensus, &config.filter))
}

/// Build consensus lines with one blocking worker per subject
pub async fn build_consensus_parallel(groups: Vec<LineGroup>) -> anyhow::Result<Vec<ConsensusLine>> {
    let mut by_subject: BTreeMap<u64, Vec<LineGroup>> = BTreeMap::new();
    for group in groups {
        by_subject.entry(group.subject_id).or_default().push(group);
    }

    let worker_count = by_subject.len();
    let mut workers = JoinSet::new();
    for (_, subject_groups) in by_subject {
        workers.spawn_blocking(move || {
            subject_groups
                .iter()
                .map(build_consensus_line)
                .collect::<Vec<ConsensusLine>>()
        });
    }

    let mut lines = Vec::new();
    while let Some(joined) = workers.join_next().await {
        lines.extend(joined.context("Consensus worker failed")?);
    }
    lines.sort_by_key(|l| (l.subject_id, l.group_index));

    info!(
        "Stage 2: built {} consensus lines on {} subject workers",
        lines.len(),
        worker_count
    );

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoCache;
    use crate::error::ConsensusError;
    use crate::io::sort_observations;
    use crate::models::LineCoords;

    fn obs(subject_id: u64, transcription_id: u64, y: f64, text: &str) -> RawLineObservation {
        RawLineObservation::new(
            subject_id,
            transcription_id,
            LineCoords::new(10.0, y, 400.0, y),
            text,
        )
    }

    fn page() -> Vec<RawLineObservation> {
        let mut observations = vec![
            obs(1, 0, 100.0, "send ten men"),
            obs(1, 1, 102.0, "send ten men"),
            obs(1, 2, 140.0, "send [unclear]tea[/unclear] men"),
            obs(1, 0, 500.0, "at once now"),
            obs(1, 1, 505.0, "at once"),
            obs(2, 3, 60.0, "at once now"),
            obs(2, 4, 62.0, "at once now"),
            obs(2, 3, 300.0, "signed grant"),
        ];
        sort_observations(&mut observations);
        observations
    }

    #[test]
    fn test_end_to_end() {
        let result = run_pipeline(&page(), &ConsensusConfig::default(), &NoCache).unwrap();

        assert_eq!(result.subject_count, 2);
        assert_eq!(result.observation_count, 8);
        assert_eq!(result.group_count, 4);

        let first = &result.consensus[0];
        assert_eq!((first.subject_id, first.group_index), (1, 0));
        assert_eq!(first.consensus_sentence(), "send ten men");
        assert!((first.reliability - (1.0 + 2.0 / 3.0 + 1.0) / 3.0).abs() < 1e-9);

        let second = &result.consensus[1];
        assert_eq!(second.group_index, 1);
        assert_eq!(second.slots[2].reliability, -0.25);

        // subject 2 opens with the last emitted line of subject 1
        let emitted: Vec<(u64, usize, String)> = result
            .filtered
            .lines
            .iter()
            .map(|l| (l.line.subject_id, l.line.group_index, l.clean_sentence()))
            .collect();
        assert_eq!(
            emitted,
            vec![
                (1, 0, "send ten men".to_string()),
                (1, 1, "at once now".to_string()),
                (2, 1, "signed grant".to_string()),
            ]
        );
        assert_eq!(result.filtered.lines_suppressed, 1);
    }

    #[test]
    fn test_unsorted_input_fails_fast() {
        let observations = vec![obs(1, 0, 300.0, "b"), obs(1, 1, 100.0, "a")];
        let err = run_pipeline(&observations, &ConsensusConfig::default(), &NoCache).unwrap_err();
        assert!(matches!(err, ConsensusError::UnsortedObservations { .. }));
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let observations = page();
        let config = ConsensusConfig::default();

        let sequential = run_pipeline(&observations, &config, &NoCache).unwrap();
        let parallel = run_pipeline_parallel(&observations, &config, &NoCache)
            .await
            .unwrap();

        assert_eq!(parallel.consensus, sequential.consensus);
        assert_eq!(parallel.filtered.lines, sequential.filtered.lines);
        assert_eq!(parallel.filtered.lines_suppressed, sequential.filtered.lines_suppressed);
    }
}
