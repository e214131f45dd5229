use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Inline annotation kinds recognised in transcribed text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    /// Transcriber could not read the enclosed text
    Unclear,
    /// Text inserted above or beside the line by the original writer
    Insertion,
    /// Text struck through in the original
    Deletion,
}

impl TagKind {
    pub const ALL: [TagKind; 3] = [TagKind::Unclear, TagKind::Insertion, TagKind::Deletion];

    pub fn name(&self) -> &'static str {
        match self {
            TagKind::Unclear => "unclear",
            TagKind::Insertion => "insertion",
            TagKind::Deletion => "deletion",
        }
    }

    pub fn open_marker(&self) -> String {
        format!("[{}]", self.name())
    }

    pub fn close_marker(&self) -> String {
        format!("[/{}]", self.name())
    }
}

/// Character range of tagged content in a space-joined sentence.
/// Covers only the content between the markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSpan {
    pub kind: TagKind,
    pub start: usize,
    pub end: usize,
}

impl TagSpan {
    /// Whether `[start, end)` lies inside this span
    pub fn covers(&self, start: usize, end: usize) -> bool {
        self.start <= start && end <= self.end
    }
}

/// Tag spans recorded for one sentence, grouped by kind
pub type TagStates = BTreeMap<TagKind, Vec<TagSpan>>;

/// A content-bearing word with the tag context of the sentence it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatefulWord {
    /// Text with markup markers stripped
    pub text: String,
    /// Character span of the token, markers included, in the joined sentence
    pub span: (usize, usize),
    /// Every tag span found in the source sentence
    pub tag_states: TagStates,
    /// Transcription that produced the source sentence
    pub transcription_id: u64,
    /// Raw tokens of the source sentence, shared by all of its words
    #[serde(skip)]
    pub source_sentence: Arc<Vec<String>>,
}

impl StatefulWord {
    /// Tag kinds whose spans cover this word
    pub fn active_tags(&self) -> Vec<TagKind> {
        self.tag_states
            .iter()
            .filter(|(_, spans)| {
                spans
                    .iter()
                    .any(|s| s.start < self.span.1 && self.span.0 < s.end)
            })
            .map(|(kind, _)| *kind)
            .collect()
    }
}
