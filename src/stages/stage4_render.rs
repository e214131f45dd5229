use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::io::{write_file, write_linewise, write_subjectwise, ConsensusExport, RunSummary, SubjectIndex};

use super::FilterResult;

/// Configuration for Stage 4 rendering
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Whether to generate the per-line delimited export
    pub generate_linewise: bool,
    /// Whether to generate the per-subject concatenated export
    pub generate_subjectwise: bool,
    /// Whether to generate the JSON export
    pub generate_json: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            generate_linewise: true,
            generate_subjectwise: true,
            generate_json: true,
        }
    }
}

/// Destination paths for each export
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderTargets<'a> {
    pub linewise: Option<&'a Path>,
    pub subjectwise: Option<&'a Path>,
    pub json: Option<&'a Path>,
}

/// Result of Stage 4 rendering
#[derive(Debug, Default)]
pub struct RenderResult {
    pub linewise_path: Option<PathBuf>,
    pub subjectwise_path: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
}

/// Execute Stage 4: write the filtered consensus lines.
///
/// Produces up to three views:
/// 1. Linewise export: one delimited row per emitted line
/// 2. Subject-wise export: one row per subject with its lines concatenated
/// 3. JSON export: run metadata plus every slot, candidate and score
pub fn execute_render(
    filtered: &FilterResult,
    subjects: &SubjectIndex,
    summary: RunSummary,
    targets: RenderTargets<'_>,
    config: &RenderConfig,
) -> Result<RenderResult> {
    let mut result = RenderResult::default();

    if config.generate_linewise {
        if let Some(path) = targets.linewise {
            info!("Writing linewise consensus to {:?}", path);
            write_file(path, |w| write_linewise(w, &filtered.lines, subjects))?;
            result.linewise_path = Some(path.to_path_buf());
        }
    }

    if config.generate_subjectwise {
        if let Some(path) = targets.subjectwise {
            info!("Writing subject-wise consensus to {:?}", path);
            write_file(path, |w| write_subjectwise(w, &filtered.lines, subjects))?;
            result.subjectwise_path = Some(path.to_path_buf());
        }
    }

    if config.generate_json {
        if let Some(path) = targets.json {
            info!("Writing JSON consensus to {:?}", path);
            ConsensusExport::from_lines(&filtered.lines, subjects, summary).write_json(path)?;
            result.json_path = Some(path.to_path_buf());
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_config_default() {
        let config = RenderConfig::default();
        assert!(config.generate_linewise);
        assert!(config.generate_subjectwise);
        assert!(config.generate_json);
    }

    #[test]
    fn test_render_skips_disabled_and_untargeted_views() {
        let dir = tempfile::tempdir().unwrap();
        let linewise = dir.path().join("lines.csv");
        let json = dir.path().join("consensus.json");
        let config = RenderConfig {
            generate_json: false,
            ..Default::default()
        };
        let summary = RunSummary {
            y_tolerance: 40.0,
            x_tolerance: None,
            lines_suppressed: 0,
            words_collapsed: 0,
        };

        let result = execute_render(
            &FilterResult::default(),
            &SubjectIndex::new(),
            summary,
            RenderTargets {
                linewise: Some(&linewise),
                subjectwise: None,
                json: Some(&json),
            },
            &config,
        )
        .unwrap();

        assert_eq!(result.linewise_path.as_deref(), Some(linewise.as_path()));
        assert!(result.subjectwise_path.is_none());
        assert!(result.json_path.is_none());
        assert!(linewise.exists());
        assert!(!json.exists());
    }
}
