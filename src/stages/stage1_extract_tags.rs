use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::models::{LineGroup, StatefulWord, TagKind, TagSpan, TagStates};

/// An opening and closing marker of the same name with only whitespace between
static EMPTY_TAG_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^/\[\]]+)\]\s*\[/([^\[\]]+)\]").expect("Invalid empty tag pair regex")
});

static LEADING_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[^\[\]]+\]").expect("Invalid leading marker regex"));

static TRAILING_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]]+\]$").expect("Invalid trailing marker regex"));

/// One non-nesting pattern per recognised kind
static TAG_PATTERNS: Lazy<Vec<(TagKind, Regex)>> = Lazy::new(|| {
    TagKind::ALL
        .iter()
        .map(|kind| {
            let pattern = format!(
                "{}.+?{}",
                regex::escape(&kind.open_marker()),
                regex::escape(&kind.close_marker())
            );
            (*kind, Regex::new(&pattern).expect("Invalid tag span regex"))
        })
        .collect()
});

/// One sentence after tag extraction
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSentence {
    pub transcription_id: u64,
    /// Space-joined sentence with empty tag pairs removed
    pub joined: String,
    pub tag_states: TagStates,
    /// Content-bearing words in order
    pub words: Vec<StatefulWord>,
}

/// Remove empty tag pairs until none remain; removal can expose new pairs
pub fn remove_empty_tag_pairs(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = EMPTY_TAG_PAIR
            .replace_all(&current, |caps: &Captures| {
                if caps[1] == caps[2] {
                    String::new()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();
        if next.len() == current.len() {
            return current;
        }
        current = next;
    }
}

/// Record a span for every marker pair of every kind.
///
/// Kinds are scanned independently, so overlapping or interleaved markup
/// yields independent spans. Offsets are in characters.
pub fn scan_tag_spans(text: &str) -> TagStates {
    let mut tag_states = TagStates::new();

    for (kind, pattern) in TAG_PATTERNS.iter() {
        let open_len = kind.open_marker().len();
        let close_len = kind.close_marker().len();
        for found in pattern.find_iter(text) {
            tag_states.entry(*kind).or_default().push(TagSpan {
                kind: *kind,
                start: char_offset(text, found.start() + open_len),
                end: char_offset(text, found.end() - close_len),
            });
        }
    }

    tag_states
}

/// Strip marker substrings from both ends of a token
pub fn strip_markers(token: &str) -> &str {
    let mut text = token;
    loop {
        let before = text.len();
        if let Some(found) = LEADING_MARKER.find(text) {
            text = &text[found.end()..];
        }
        if let Some(found) = TRAILING_MARKER.find(text) {
            text = &text[..found.start()];
        }
        if text.len() == before {
            return text;
        }
    }
}

/// Extract tag spans from one sentence and build its stateful words.
///
/// Tokens that are nothing but markers are dropped and take no position.
/// Word spans and tag spans both address `joined`, the sentence after
/// empty tag pairs are removed.
pub fn extract_tags(tokens: &[String], transcription_id: u64) -> AnnotatedSentence {
    let joined = remove_empty_tag_pairs(&tokens.join(" "));
    let tag_states = scan_tag_spans(&joined);
    let source_sentence = Arc::new(tokens.to_vec());

    let words = token_spans(&joined)
        .into_iter()
        .filter_map(|(token, span)| {
            let text = strip_markers(token);
            (!text.is_empty()).then(|| StatefulWord {
                text: text.to_string(),
                span,
                tag_states: tag_states.clone(),
                transcription_id,
                source_sentence: Arc::clone(&source_sentence),
            })
        })
        .collect();

    AnnotatedSentence {
        transcription_id,
        joined,
        tag_states,
        words,
    }
}

/// Whitespace-separated tokens of `text` with their character ranges
fn token_spans(text: &str) -> Vec<(&str, (usize, usize))> {
    let mut spans = Vec::new();
    let mut open: Option<(usize, usize)> = None;
    let mut char_count = 0;

    for (char_index, (byte_index, c)) in text.char_indices().enumerate() {
        match (c.is_whitespace(), open) {
            (true, Some((byte_start, char_start))) => {
                spans.push((&text[byte_start..byte_index], (char_start, char_index)));
                open = None;
            }
            (false, None) => open = Some((byte_index, char_index)),
            _ => {}
        }
        char_count = char_index + 1;
    }
    if let Some((byte_start, char_start)) = open {
        spans.push((&text[byte_start..], (char_start, char_count)));
    }

    spans
}

/// Extract tags from every member of a line group, one sentence each
pub fn annotate_sentences(group: &LineGroup) -> Vec<AnnotatedSentence> {
    group
        .members
        .iter()
        .map(|member| extract_tags(&member.tokens, member.transcription_id))
        .collect()
}

fn char_offset(text: &str, byte_offset: usize) -> usize {
    text[..byte_offset].chars().count()
}
