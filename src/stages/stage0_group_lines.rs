use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::{ConsensusError, Result};
use crate::models::{LineCoords, LineGroup, RawLineObservation};

/// Configuration for spatial line matching
#[derive(Debug, Clone, PartialEq)]
pub struct LineMatchConfig {
    /// Maximum pixel distance between y endpoints of the same line
    pub y_tolerance: f64,
    /// Maximum pixel distance between x endpoints, when set
    pub x_tolerance: Option<f64>,
    /// Fold a group into its predecessor when their mean y differ by less than this
    pub merge_mean_y_threshold: Option<f64>,
}

impl Default for LineMatchConfig {
    fn default() -> Self {
        Self {
            y_tolerance: 40.0,
            x_tolerance: None,
            merge_mean_y_threshold: None,
        }
    }
}

impl LineMatchConfig {
    /// Same line iff both y endpoints are within tolerance and, when an x
    /// tolerance is configured, both x endpoints are as well.
    pub fn same_line(&self, reference: &LineCoords, candidate: &LineCoords) -> bool {
        let y_within = (candidate.y1 - reference.y1).abs() <= self.y_tolerance
            && (candidate.y2 - reference.y2).abs() <= self.y_tolerance;
        let x_within = match self.x_tolerance {
            Some(tolerance) => {
                (candidate.x1 - reference.x1).abs() <= tolerance
                    && (candidate.x2 - reference.x2).abs() <= tolerance
            }
            None => true,
        };
        y_within && x_within
    }

    fn validate(&self) -> Result<()> {
        let check = |name: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConsensusError::InvalidTolerance(format!(
                    "{} must be a non-negative finite number, got {}",
                    name, value
                )))
            }
        };
        check("y_tolerance", self.y_tolerance)?;
        if let Some(x) = self.x_tolerance {
            check("x_tolerance", x)?;
        }
        if let Some(threshold) = self.merge_mean_y_threshold {
            check("merge_mean_y_threshold", threshold)?;
        }
        Ok(())
    }
}

/// Line-matching accumulator carried from one observation to the next
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchState {
    pub subject_id: u64,
    /// Coordinates of the observation that opened the current group
    pub reference: LineCoords,
    pub group_index: usize,
}

/// Advance the matcher by one observation.
///
/// A new subject resets to group 0; otherwise the observation joins the
/// current group or opens the next one and becomes its reference.
pub fn match_line(
    state: Option<MatchState>,
    observation: &RawLineObservation,
    config: &LineMatchConfig,
) -> MatchState {
    match state {
        Some(current) if current.subject_id == observation.subject_id => {
            if config.same_line(&current.reference, &observation.coords) {
                current
            } else {
                MatchState {
                    subject_id: observation.subject_id,
                    reference: observation.coords,
                    group_index: current.group_index + 1,
                }
            }
        }
        _ => MatchState {
            subject_id: observation.subject_id,
            reference: observation.coords,
            group_index: 0,
        },
    }
}

/// Fail unless observations are sorted by (subject, y1, y2, x1, x2)
pub fn check_sorted(observations: &[RawLineObservation]) -> Result<()> {
    for (i, pair) in observations.windows(2).enumerate() {
        if pair[1].sort_cmp(&pair[0]).is_lt() {
            return Err(ConsensusError::UnsortedObservations {
                index: i + 1,
                subject_id: pair[1].subject_id,
            });
        }
    }
    Ok(())
}

/// Group index for every observation, in input order
pub fn assign_group_indices(
    observations: &[RawLineObservation],
    config: &LineMatchConfig,
) -> Result<Vec<usize>> {
    config.validate()?;
    check_sorted(observations)?;

    let (_, indices) = observations.iter().fold(
        (None, Vec::with_capacity(observations.len())),
        |(state, mut indices), observation| {
            let next = match_line(state, observation, config);
            indices.push(next.group_index);
            (Some(next), indices)
        },
    );

    Ok(indices)
}

/// Result of Stage 0 line grouping
#[derive(Debug, Clone)]
pub struct GroupingResult {
    /// Groups ordered by subject, then group index
    pub groups: Vec<LineGroup>,
    pub subject_count: usize,
    pub observation_count: usize,
}

/// Perform Stage 0: cluster line observations into physical-line groups
pub fn group_lines(
    observations: &[RawLineObservation],
    config: &LineMatchConfig,
) -> Result<GroupingResult> {
    let indices = assign_group_indices(observations, config)?;

    let mut grouped: BTreeMap<(u64, usize), Vec<RawLineObservation>> = BTreeMap::new();
    for (observation, group_index) in observations.iter().zip(indices) {
        grouped
            .entry((observation.subject_id, group_index))
            .or_default()
            .push(observation.clone());
    }

    let mut groups: Vec<LineGroup> = grouped
        .into_iter()
        .map(|((subject_id, group_index), members)| LineGroup {
            subject_id,
            group_index,
            members,
        })
        .collect();

    if let Some(threshold) = config.merge_mean_y_threshold {
        let before = groups.len();
        groups = merge_adjacent_groups(groups, threshold);
        debug!(
            "Merged {} adjacent line groups (mean y threshold {})",
            before - groups.len(),
            threshold
        );
    }

    let mut subject_count = 0;
    let mut last_subject = None;
    for group in &groups {
        if last_subject != Some(group.subject_id) {
            subject_count += 1;
            last_subject = Some(group.subject_id);
        }
    }

    info!(
        "Stage 0: {} observations grouped into {} lines across {} subjects",
        observations.len(),
        groups.len(),
        subject_count
    );

    Ok(GroupingResult {
        groups,
        subject_count,
        observation_count: observations.len(),
    })
}

/// Fold each group into its predecessor when their mean y differ by less
/// than `threshold`. Comparison is always against the predecessor's own
/// mean, never a merged one; indices are renumbered from 0 per subject.
pub fn merge_adjacent_groups(groups: Vec<LineGroup>, threshold: f64) -> Vec<LineGroup> {
    let mut merged: Vec<LineGroup> = Vec::with_capacity(groups.len());
    let mut previous: Option<(u64, f64)> = None;
    let mut next_index = 0;

    for group in groups {
        let mean_y = group.mean_y();
        let close_to_previous = matches!(
            previous,
            Some((subject, y)) if subject == group.subject_id && (y - mean_y).abs() < threshold
        );
        if previous.map(|(subject, _)| subject) != Some(group.subject_id) {
            next_index = 0;
        }
        previous = Some((group.subject_id, mean_y));

        match merged.last_mut() {
            Some(last) if close_to_previous => last.members.extend(group.members),
            _ => {
                merged.push(LineGroup {
                    subject_id: group.subject_id,
                    group_index: next_index,
                    members: group.members,
                });
                next_index += 1;
            }
        }
    }

    merged
}
