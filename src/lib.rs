pub mod cache;
pub mod error;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod stages;

pub use cache::{group_lines_cached, GroupingCache, JsonFileCache, NoCache};
pub use error::{ConsensusError, Result};
pub use io::{
    read_classifications, read_subjects, sort_observations, IngestConfig, RunSummary, SubjectIndex,
};
pub use models::{ConsensusLine, LineCoords, LineGroup, RawLineObservation, StatefulWord};
pub use pipeline::{run_pipeline, run_pipeline_parallel, ConsensusConfig, PipelineResult};
pub use report::{LineCountSummary, ReliabilitySummary};
pub use stages::{
    execute_render, FilterConfig, LineMatchConfig, RenderConfig, RenderTargets,
};
