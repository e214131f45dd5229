use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::models::{AnnotationTask, ClassificationMetadata, LineCoords, RawLineObservation};

/// Configuration for reading a classification export
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Skip classifications started before this instant
    pub live_since: Option<DateTime<Utc>>,
    /// Task whose answer identifies the page type
    pub type_task: String,
    /// Required prefix of the page type answer; `None` accepts every page
    pub type_prefix: Option<String>,
    /// Tasks starting with this prefix carry marked lines
    pub line_task_prefix: String,
    /// Subject metadata key holding the external catalogue id
    pub catalogue_key: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            live_since: None,
            type_task: "T1".to_string(),
            type_prefix: Some("Telegram".to_string()),
            line_task_prefix: "T12".to_string(),
            catalogue_key: "hdl_id".to_string(),
        }
    }
}

/// Result of reading a classification export
#[derive(Debug, Clone)]
pub struct IngestResult {
    /// Observations in file order, not yet sorted
    pub observations: Vec<RawLineObservation>,
    pub records_read: usize,
    pub records_accepted: usize,
}

#[derive(Debug, Deserialize)]
struct ClassificationRow {
    subject_ids: String,
    annotations: String,
    #[serde(default)]
    metadata: Option<String>,
}

/// Read a classification export CSV file
pub fn read_classifications(path: &Path, config: &IngestConfig) -> Result<IngestResult> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open classification export: {:?}", path))?;
    parse_classifications(file, config)
}

/// Parse a classification export from any reader.
///
/// The transcription id of each observation is its record's row index.
pub fn parse_classifications<R: Read>(reader: R, config: &IngestConfig) -> Result<IngestResult> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut observations = Vec::new();
    let mut records_read = 0;
    let mut records_accepted = 0;

    for (index, row) in csv_reader.deserialize::<ClassificationRow>().enumerate() {
        let row = row.with_context(|| format!("Failed to read classification record {}", index))?;
        records_read += 1;

        if !is_live(&row, config, index) {
            debug!("Skipping record {}: started before live date", index);
            continue;
        }

        let subject_id: u64 = row
            .subject_ids
            .trim()
            .parse()
            .with_context(|| format!("Invalid subject id {:?} in record {}", row.subject_ids, index))?;
        let tasks: Vec<AnnotationTask> = serde_json::from_str(&row.annotations)
            .with_context(|| format!("Failed to parse annotations of record {}", index))?;

        match record_lines(&tasks, subject_id, index as u64, config) {
            Some(lines) => {
                records_accepted += 1;
                observations.extend(lines);
            }
            None => debug!("Skipping record {}: not a matching page type", index),
        }
    }

    info!(
        "Read {} classification records, accepted {}, {} line observations",
        records_read,
        records_accepted,
        observations.len()
    );

    Ok(IngestResult {
        observations,
        records_read,
        records_accepted,
    })
}

fn is_live(row: &ClassificationRow, config: &IngestConfig, index: usize) -> bool {
    let (Some(live_since), Some(raw)) = (config.live_since, row.metadata.as_deref()) else {
        return true;
    };

    let started_at = serde_json::from_str::<ClassificationMetadata>(raw)
        .ok()
        .and_then(|m| m.started_at);
    match started_at.as_deref().map(DateTime::parse_from_rfc3339) {
        Some(Ok(started)) => started.with_timezone(&Utc) >= live_since,
        Some(Err(e)) => {
            warn!("Record {}: unparseable started_at ({}), keeping it", index, e);
            true
        }
        None => true,
    }
}

/// Marked lines of one record, or `None` when its page type is rejected
fn record_lines(
    tasks: &[AnnotationTask],
    subject_id: u64,
    transcription_id: u64,
    config: &IngestConfig,
) -> Option<Vec<RawLineObservation>> {
    let mut lines = Vec::new();

    for task in tasks {
        if task.task == config.type_task {
            if let Some(prefix) = &config.type_prefix {
                if !task.answer().is_some_and(|a| a.starts_with(prefix.as_str())) {
                    return None;
                }
            }
        }

        if task.task.starts_with(&config.line_task_prefix) {
            for marked in task.marked_lines() {
                lines.push(RawLineObservation::new(
                    subject_id,
                    transcription_id,
                    LineCoords::new(marked.x1, marked.y1, marked.x2, marked.y2),
                    marked.text(),
                ));
            }
        }
    }

    Some(lines)
}

/// Sort observations by (subject, y1, y2, x1, x2) as line grouping requires
pub fn sort_observations(observations: &mut [RawLineObservation]) {
    observations.sort_by(|a, b| a.sort_cmp(b));
}

/// External catalogue entry for a subject
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectInfo {
    pub subject_id: u64,
    pub catalogue_id: String,
    pub url: String,
}

pub type SubjectIndex = HashMap<u64, SubjectInfo>;

#[derive(Debug, Deserialize)]
struct SubjectRow {
    subject_id: u64,
    #[serde(default)]
    locations: Option<String>,
    #[serde(default)]
    metadata: Option<String>,
}

/// Read a subject manifest CSV file
pub fn read_subjects(path: &Path, catalogue_key: &str) -> Result<SubjectIndex> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open subject manifest: {:?}", path))?;
    parse_subjects(file, catalogue_key)
}

/// Parse a subject manifest; rows without a catalogue id are skipped
pub fn parse_subjects<R: Read>(reader: R, catalogue_key: &str) -> Result<SubjectIndex> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut subjects = SubjectIndex::new();

    for (index, row) in csv_reader.deserialize::<SubjectRow>().enumerate() {
        let row = row.with_context(|| format!("Failed to read subject record {}", index))?;

        let metadata: serde_json::Value = match row.metadata.as_deref() {
            Some(raw) => serde_json::from_str(raw)
                .with_context(|| format!("Failed to parse metadata of subject {}", row.subject_id))?,
            None => serde_json::Value::Null,
        };
        let catalogue_id = match metadata.get(catalogue_key) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => continue,
            Some(other) => other.to_string(),
        };

        let locations: serde_json::Value = match row.locations.as_deref() {
            Some(raw) => serde_json::from_str(raw)
                .with_context(|| format!("Failed to parse locations of subject {}", row.subject_id))?,
            None => serde_json::Value::Null,
        };
        let url = locations
            .get("0")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        subjects.insert(
            row.subject_id,
            SubjectInfo {
                subject_id: row.subject_id,
                catalogue_id,
                url,
            },
        );
    }

    info!("Read {} subjects with catalogue ids", subjects.len());

    Ok(subjects)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"classification_id,subject_ids,metadata,annotations
1,42,"{""started_at"":""2016-07-01T10:00:00Z""}","[{""task"":""T1"",""value"":""Telegram (received)""},{""task"":""T12"",""value"":[{""x1"":10,""y1"":100,""x2"":400,""y2"":102,""details"":[{""value"":""send ten men""}]},{""x1"":12,""y1"":160,""x2"":380,""y2"":161,""details"":[{""value"":""at once""}]}]}]"
2,42,"{""started_at"":""2016-06-01T10:00:00Z""}","[{""task"":""T1"",""value"":""Telegram (sent)""},{""task"":""T12"",""value"":[{""x1"":10,""y1"":100,""x2"":400,""y2"":102,""details"":[{""value"":""early test""}]}]}]"
3,43,"{""started_at"":""2016-07-02T10:00:00Z""}","[{""task"":""T1"",""value"":""Letter""},{""task"":""T12"",""value"":[{""x1"":1,""y1"":1,""x2"":2,""y2"":2,""details"":[{""value"":""dear sir""}]}]}]"
4,41,"{""started_at"":""2016-07-03T10:00:00Z""}","[{""task"":""T12"",""value"":[{""x1"":5,""y1"":50,""x2"":300,""y2"":52,""details"":[{""value"":""no type task""}]}]}]"
"#;

    fn live_config() -> IngestConfig {
        IngestConfig {
            live_since: Some(
                DateTime::parse_from_rfc3339("2016-06-20T00:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_classifications() {
        let result = parse_classifications(EXPORT.as_bytes(), &live_config()).unwrap();

        assert_eq!(result.records_read, 4);
        assert_eq!(result.records_accepted, 2);
        assert_eq!(result.observations.len(), 3);

        let first = &result.observations[0];
        assert_eq!(first.subject_id, 42);
        assert_eq!(first.transcription_id, 0);
        assert_eq!(first.tokens, vec!["send", "ten", "men"]);
        assert_eq!(first.coords.y2, 102.0);

        assert_eq!(result.observations[2].subject_id, 41);
        assert_eq!(result.observations[2].transcription_id, 3);
    }

    #[test]
    fn test_without_live_date_keeps_early_records() {
        let result = parse_classifications(EXPORT.as_bytes(), &IngestConfig::default()).unwrap();
        assert_eq!(result.records_accepted, 3);
    }

    #[test]
    fn test_without_type_prefix_keeps_every_page() {
        let config = IngestConfig {
            type_prefix: None,
            ..live_config()
        };
        let result = parse_classifications(EXPORT.as_bytes(), &config).unwrap();
        assert_eq!(result.records_accepted, 3);
    }

    #[test]
    fn test_sort_observations() {
        let mut result = parse_classifications(EXPORT.as_bytes(), &live_config()).unwrap();
        sort_observations(&mut result.observations);

        let keys: Vec<(u64, f64)> = result
            .observations
            .iter()
            .map(|o| (o.subject_id, o.coords.y1))
            .collect();
        assert_eq!(keys, vec![(41, 50.0), (42, 100.0), (42, 160.0)]);
    }

    #[test]
    fn test_parse_subjects() {
        let manifest = r#"subject_id,locations,metadata
42,"{""0"":""https://example.org/42.jpg""}","{""hdl_id"":""mssEC_01_001""}"
43,"{""0"":""https://example.org/43.jpg""}","{""other"":1}"
44,"{""0"":""https://example.org/44.jpg""}","{""hdl_id"":7}"
"#;

        let subjects = parse_subjects(manifest.as_bytes(), "hdl_id").unwrap();

        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[&42].catalogue_id, "mssEC_01_001");
        assert_eq!(subjects[&42].url, "https://example.org/42.jpg");
        assert!(!subjects.contains_key(&43));
        assert_eq!(subjects[&44].catalogue_id, "7");
    }
}
