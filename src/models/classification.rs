use serde::{Deserialize, Serialize};

/// One task entry in a classification's `annotations` column
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnnotationTask {
    /// Task identifier, e.g. `T1` or `T12`
    pub task: String,
    /// Free-form task value: a string answer or a list of marked lines
    #[serde(default)]
    pub value: serde_json::Value,
}

impl AnnotationTask {
    /// The value as a string answer, if it is one
    pub fn answer(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// The value as a list of marked lines; other shapes yield an empty list
    pub fn marked_lines(&self) -> Vec<MarkedLine> {
        serde_json::from_value(self.value.clone()).unwrap_or_default()
    }
}

/// A line segment drawn on the page image with its transcribed text
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarkedLine {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    #[serde(default)]
    pub details: Vec<MarkedLineDetail>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarkedLineDetail {
    #[serde(default)]
    pub value: Option<String>,
}

impl MarkedLine {
    /// Text of the first detail entry
    pub fn text(&self) -> &str {
        self.details
            .first()
            .and_then(|d| d.value.as_deref())
            .unwrap_or("")
    }
}

/// Contents of a classification's `metadata` column
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassificationMetadata {
    #[serde(default)]
    pub started_at: Option<String>,
}
