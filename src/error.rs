//! Error types for the consensus stages

use thiserror::Error;

/// Errors raised by the core consensus stages
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error(
        "Observations are not sorted by (subject, y1, y2, x1, x2): index {index} (subject {subject_id}) precedes its predecessor"
    )]
    UnsortedObservations { index: usize, subject_id: u64 },

    #[error("Invalid tolerance: {0}")]
    InvalidTolerance(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
