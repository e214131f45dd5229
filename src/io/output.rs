use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{ConsensusWordSlot, LineCoords};
use crate::stages::FilteredLine;

use super::{SubjectIndex, SubjectInfo};

/// Line break sequence between lines of the subject-wise export
const LINE_BREAK: &str = "<br />";

/// Machine-readable output format
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusExport {
    pub metadata: ExportMetadata,
    pub subjects: Vec<SubjectExport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportMetadata {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub y_tolerance: f64,
    pub x_tolerance: Option<f64>,
    pub subject_count: usize,
    pub lines_emitted: usize,
    pub lines_suppressed: usize,
    pub words_collapsed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectExport {
    pub subject_id: u64,
    pub catalogue_id: Option<String>,
    pub url: Option<String>,
    /// Mean reliability of the subject's emitted lines
    pub reliability: f64,
    pub lines: Vec<LineExport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineExport {
    pub group_index: usize,
    pub sentence: String,
    pub reliability: f64,
    pub mean_coords: LineCoords,
    pub transcription_ids: Vec<u64>,
    pub slots: Vec<ConsensusWordSlot>,
}

/// Run-level counts carried into the export metadata
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub y_tolerance: f64,
    pub x_tolerance: Option<f64>,
    pub lines_suppressed: usize,
    pub words_collapsed: usize,
}

impl ConsensusExport {
    /// Group emitted lines by subject, keeping stream order
    pub fn from_lines(lines: &[FilteredLine], subjects: &SubjectIndex, summary: RunSummary) -> Self {
        let mut exports: Vec<SubjectExport> = Vec::new();

        for filtered in lines {
            let line = &filtered.line;
            let line_export = LineExport {
                group_index: line.group_index,
                sentence: filtered.clean_sentence(),
                reliability: line.reliability,
                mean_coords: line.mean_coords,
                transcription_ids: line.transcription_ids.clone(),
                slots: line.slots.clone(),
            };

            match exports.last_mut() {
                Some(current) if current.subject_id == line.subject_id => {
                    current.lines.push(line_export)
                }
                _ => {
                    let info = subjects.get(&line.subject_id);
                    exports.push(SubjectExport {
                        subject_id: line.subject_id,
                        catalogue_id: info.map(|i| i.catalogue_id.clone()),
                        url: info.map(|i| i.url.clone()),
                        reliability: 0.0,
                        lines: vec![line_export],
                    });
                }
            }
        }

        for subject in &mut exports {
            subject.reliability = subject.lines.iter().map(|l| l.reliability).sum::<f64>()
                / subject.lines.len().max(1) as f64;
        }

        Self {
            metadata: ExportMetadata {
                run_id: Uuid::new_v4(),
                generated_at: Utc::now(),
                y_tolerance: summary.y_tolerance,
                x_tolerance: summary.x_tolerance,
                subject_count: exports.len(),
                lines_emitted: lines.len(),
                lines_suppressed: summary.lines_suppressed,
                words_collapsed: summary.words_collapsed,
            },
            subjects: exports,
        }
    }

    /// Write to a JSON file
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write JSON")?;
        Ok(())
    }
}

/// One `@@`-delimited row per emitted line:
/// subject, catalogue id, group index, quoted sentence, candidate counts, url
pub fn format_linewise_row(line: &FilteredLine, subject: Option<&SubjectInfo>) -> String {
    let (catalogue_id, url) = subject_fields(subject);
    format!(
        "{}@@{}@@{}@@\"{}\"@@{:?}@@{}",
        line.line.subject_id,
        catalogue_id,
        line.line.group_index,
        line.clean_sentence(),
        line.line.candidate_counts(),
        url
    )
}

pub fn write_linewise<W: Write>(
    writer: &mut W,
    lines: &[FilteredLine],
    subjects: &SubjectIndex,
) -> Result<()> {
    for line in lines {
        let row = format_linewise_row(line, subjects.get(&line.line.subject_id));
        writeln!(writer, "{}", row).context("Failed to write linewise row")?;
    }
    Ok(())
}

/// One row per subject: subject, catalogue id, url and the quoted
/// concatenation of its lines, each followed by a `<br />` break
pub fn write_subjectwise<W: Write>(
    writer: &mut W,
    lines: &[FilteredLine],
    subjects: &SubjectIndex,
) -> Result<()> {
    let mut current_subject: Option<u64> = None;

    for line in lines {
        let subject_id = line.line.subject_id;
        if current_subject != Some(subject_id) {
            if current_subject.is_some() {
                writeln!(writer, "\"")?;
            }
            let (catalogue_id, url) = subject_fields(subjects.get(&subject_id));
            write!(writer, "{}@@{}@@{}@@\"", subject_id, catalogue_id, url)?;
            current_subject = Some(subject_id);
        }
        write!(writer, "{}{}", line.clean_sentence(), LINE_BREAK)?;
    }

    if current_subject.is_some() {
        writeln!(writer, "\"")?;
    }

    Ok(())
}

/// Write an export to `path` through `write`
pub fn write_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut std::io::BufWriter<std::fs::File>) -> Result<()>,
{
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    let mut writer = std::io::BufWriter::new(file);
    write(&mut writer)?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush file: {:?}", path))?;
    Ok(())
}

fn subject_fields(subject: Option<&SubjectInfo>) -> (&str, &str) {
    subject
        .map(|s| (s.catalogue_id.as_str(), s.url.as_str()))
        .unwrap_or(("", ""))
}
