use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Pixel endpoints of a transcriber-drawn line segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineCoords {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl LineCoords {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Ordering used for grouping: y1, then y2, then x1, then x2
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        self.y1
            .total_cmp(&other.y1)
            .then(self.y2.total_cmp(&other.y2))
            .then(self.x1.total_cmp(&other.x1))
            .then(self.x2.total_cmp(&other.x2))
    }
}

/// One transcriber's line segment plus the text typed for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLineObservation {
    /// Page (subject) the line was drawn on
    pub subject_id: u64,
    /// Transcription (classification record) the line belongs to
    pub transcription_id: u64,
    /// Segment endpoints
    pub coords: LineCoords,
    /// Whitespace-split transcribed text, markup tokens included
    pub tokens: Vec<String>,
}

impl RawLineObservation {
    pub fn new(subject_id: u64, transcription_id: u64, coords: LineCoords, text: &str) -> Self {
        Self {
            subject_id,
            transcription_id,
            coords,
            tokens: text.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Global ordering key: subject first, then coordinates
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        self.subject_id
            .cmp(&other.subject_id)
            .then_with(|| self.coords.sort_cmp(&other.coords))
    }
}

/// Observations across transcriptions judged to be the same physical line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineGroup {
    pub subject_id: u64,
    /// Sequential per subject, starting at 0
    pub group_index: usize,
    pub members: Vec<RawLineObservation>,
}

impl LineGroup {
    /// Mean of every member's coordinates
    pub fn mean_coords(&self) -> LineCoords {
        if self.members.is_empty() {
            return LineCoords::new(0.0, 0.0, 0.0, 0.0);
        }
        let n = self.members.len() as f64;
        let sum = self.members.iter().fold((0.0, 0.0, 0.0, 0.0), |acc, m| {
            (
                acc.0 + m.coords.x1,
                acc.1 + m.coords.y1,
                acc.2 + m.coords.x2,
                acc.3 + m.coords.y2,
            )
        });
        LineCoords::new(sum.0 / n, sum.1 / n, sum.2 / n, sum.3 / n)
    }

    /// Midpoint of the mean y endpoints
    pub fn mean_y(&self) -> f64 {
        let mean = self.mean_coords();
        0.5 * (mean.y1 + mean.y2)
    }

    pub fn transcription_ids(&self) -> Vec<u64> {
        self.members.iter().map(|m| m.transcription_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_tokens_split_on_whitespace() {
        let obs = RawLineObservation::new(
            7,
            1,
            LineCoords::new(0.0, 10.0, 100.0, 12.0),
            "  send  [unclear]ten[/unclear] men ",
        );
        assert_eq!(obs.tokens, vec!["send", "[unclear]ten[/unclear]", "men"]);
    }

    #[test]
    fn test_sort_cmp_orders_by_subject_then_y() {
        let a = RawLineObservation::new(1, 0, LineCoords::new(50.0, 200.0, 60.0, 200.0), "a");
        let b = RawLineObservation::new(1, 0, LineCoords::new(0.0, 100.0, 60.0, 300.0), "b");
        let c = RawLineObservation::new(2, 0, LineCoords::new(0.0, 0.0, 0.0, 0.0), "c");

        assert_eq!(b.sort_cmp(&a), Ordering::Less);
        assert_eq!(a.sort_cmp(&c), Ordering::Less);
    }

    #[test]
    fn test_group_mean_coords() {
        let group = LineGroup {
            subject_id: 1,
            group_index: 0,
            members: vec![
                RawLineObservation::new(1, 0, LineCoords::new(10.0, 100.0, 200.0, 104.0), "x"),
                RawLineObservation::new(1, 1, LineCoords::new(20.0, 102.0, 220.0, 106.0), "x"),
            ],
        };

        let mean = group.mean_coords();
        assert!((mean.x1 - 15.0).abs() < 1e-9);
        assert!((mean.y1 - 101.0).abs() < 1e-9);
        assert!((mean.x2 - 210.0).abs() < 1e-9);
        assert!((mean.y2 - 105.0).abs() < 1e-9);
        assert!((group.mean_y() - 103.0).abs() < 1e-9);
        assert_eq!(group.transcription_ids(), vec![0, 1]);
    }
}
