use tracing::{debug, info};

use crate::models::ConsensusLine;

/// Configuration for Stage 3 duplicate suppression
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    /// Collapse immediately repeated words within a line
    pub collapse_repeated_words: bool,
    /// Drop lines whose words duplicate the last emitted line
    pub suppress_repeated_lines: bool,
    /// Forget the last emitted line at each subject boundary
    pub reset_per_subject: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            collapse_repeated_words: true,
            suppress_repeated_lines: true,
            reset_per_subject: false,
        }
    }
}

/// A consensus line that survived filtering, with its cleaned text
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredLine {
    pub line: ConsensusLine,
    pub clean_words: Vec<String>,
}

impl FilteredLine {
    pub fn clean_sentence(&self) -> String {
        self.clean_words.join(" ")
    }
}

/// Result of Stage 3 filtering
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    /// Emitted lines in input order
    pub lines: Vec<FilteredLine>,
    pub words_collapsed: usize,
    pub lines_suppressed: usize,
}

/// Filter accumulator threaded through the output stream
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    /// Subject and cleaned words of the last emitted line
    last_emitted: Option<(u64, Vec<String>)>,
}

/// Collapse each `W W` pair (W at least two characters) to a single `W`.
///
/// One left-to-right pass over non-overlapping pairs: `W W W` becomes
/// `W W`. Returns the cleaned words and the number of pairs collapsed.
pub fn collapse_repeated_words(words: &[&str]) -> (Vec<String>, usize) {
    let mut cleaned = Vec::with_capacity(words.len());
    let mut collapsed = 0;
    let mut i = 0;

    while i < words.len() {
        let word = words[i];
        cleaned.push(word.to_string());
        if i + 1 < words.len() && words[i + 1] == word && word.chars().count() >= 2 {
            collapsed += 1;
            i += 2;
        } else {
            i += 1;
        }
    }

    (cleaned, collapsed)
}

/// Whether the words shared with `last` number as many as the longer list
pub fn is_duplicate_line(current: &[String], last: &[String]) -> bool {
    let shared = current.iter().filter(|w| last.contains(w)).count();
    shared == current.len().max(last.len())
}

/// Filter one line. Returns the next state, the line if it is emitted,
/// and the number of word pairs collapsed.
pub fn filter_line(
    state: FilterState,
    line: ConsensusLine,
    config: &FilterConfig,
) -> (FilterState, Option<FilteredLine>, usize) {
    let words = line.consensus_words();
    let (clean_words, collapsed) = if config.collapse_repeated_words {
        collapse_repeated_words(&words)
    } else {
        (words.iter().map(|w| w.to_string()).collect(), 0)
    };

    if collapsed > 0 {
        debug!(
            "Collapsed repeated words in subject {} line {}: \"{}\" => \"{}\"",
            line.subject_id,
            line.group_index,
            words.join(" "),
            clean_words.join(" ")
        );
    }

    let last = match &state.last_emitted {
        Some((subject, _)) if config.reset_per_subject && *subject != line.subject_id => None,
        Some((_, words)) => Some(words),
        None => None,
    };

    if config.suppress_repeated_lines {
        if let Some(last_words) = last {
            if is_duplicate_line(&clean_words, last_words) {
                debug!(
                    "Suppressed duplicate line in subject {} line {}: \"{}\"",
                    line.subject_id,
                    line.group_index,
                    clean_words.join(" ")
                );
                return (state, None, collapsed);
            }
        }
    }

    let next = FilterState {
        last_emitted: Some((line.subject_id, clean_words.clone())),
    };
    (next, Some(FilteredLine { line, clean_words }), collapsed)
}

/// Perform Stage 3: clean the ordered stream of consensus lines.
///
/// The last emitted line is carried across subject boundaries unless
/// `reset_per_subject` is set, so this pass must see the whole stream in
/// (subject, group) order.
pub fn execute_filter(lines: Vec<ConsensusLine>, config: &FilterConfig) -> FilterResult {
    let (_, result) = lines.into_iter().fold(
        (FilterState::default(), FilterResult::default()),
        |(state, mut result), line| {
            let (next, emitted, collapsed) = filter_line(state, line, config);
            result.words_collapsed += collapsed;
            match emitted {
                Some(filtered) => result.lines.push(filtered),
                None => result.lines_suppressed += 1,
            }
            (next, result)
        },
    );

    info!(
        "Stage 3: {} lines emitted, {} suppressed, {} repeated words collapsed",
        result.lines.len(),
        result.lines_suppressed,
        result.words_collapsed
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConsensusWordSlot, LineCoords, StatefulWord, TagStates};

    fn line(subject_id: u64, group_index: usize, text: &str) -> ConsensusLine {
        let slots = text
            .split_whitespace()
            .enumerate()
            .map(|(position, word)| ConsensusWordSlot {
                position,
                candidates: vec![StatefulWord {
                    text: word.to_string(),
                    span: (0, 0),
                    tag_states: TagStates::new(),
                    transcription_id: 0,
                    source_sentence: Default::default(),
                }],
                reliability: 1.0,
            })
            .collect();
        ConsensusLine {
            subject_id,
            group_index,
            mean_coords: LineCoords::new(0.0, 0.0, 0.0, 0.0),
            slots,
            reliability: 1.0,
            transcription_ids: vec![0],
        }
    }

    fn sentences(result: &FilterResult) -> Vec<String> {
        result.lines.iter().map(|l| l.clean_sentence()).collect()
    }

    #[test]
    fn test_collapse_double_word() {
        let (words, collapsed) = collapse_repeated_words(&["the", "the", "cat"]);
        assert_eq!(words.join(" "), "the cat");
        assert_eq!(collapsed, 1);
    }

    #[test]
    fn test_triple_word_collapses_once() {
        let (words, collapsed) = collapse_repeated_words(&["the", "the", "the", "cat"]);
        assert_eq!(words.join(" "), "the the cat");
        assert_eq!(collapsed, 1);
    }

    #[test]
    fn test_collapse_handles_separate_pairs_in_one_pass() {
        let (words, collapsed) = collapse_repeated_words(&["the", "the", "cat", "cat"]);
        assert_eq!(words.join(" "), "the cat");
        assert_eq!(collapsed, 2);
    }

    #[test]
    fn test_single_character_words_are_not_collapsed() {
        let (words, collapsed) = collapse_repeated_words(&["a", "a", "b"]);
        assert_eq!(words.join(" "), "a a b");
        assert_eq!(collapsed, 0);
    }

    #[test]
    fn test_duplicate_line_is_suppressed() {
        let result = execute_filter(
            vec![
                line(1, 0, "send ten men"),
                line(1, 1, "send ten men"),
                line(1, 2, "send men now"),
            ],
            &FilterConfig::default(),
        );

        assert_eq!(sentences(&result), vec!["send ten men", "send men now"]);
        assert_eq!(result.lines_suppressed, 1);
        assert_eq!(result.lines[1].line.group_index, 2);
    }

    #[test]
    fn test_duplicate_after_collapse_is_suppressed() {
        let result = execute_filter(
            vec![line(1, 0, "hold the fort"), line(1, 1, "hold the the fort")],
            &FilterConfig::default(),
        );

        assert_eq!(sentences(&result), vec!["hold the fort"]);
        assert_eq!(result.words_collapsed, 1);
    }

    #[test]
    fn test_last_emitted_line_is_remembered_collapsed() {
        let result = execute_filter(
            vec![line(1, 0, "the the cat"), line(1, 1, "the cat")],
            &FilterConfig::default(),
        );

        assert_eq!(sentences(&result), vec!["the cat"]);
        assert_eq!(result.lines[0].line.consensus_sentence(), "the the cat");
        assert_eq!(result.lines_suppressed, 1);
    }

    #[test]
    fn test_suppressed_line_does_not_replace_last_emitted() {
        let result = execute_filter(
            vec![line(1, 0, "a b c"), line(1, 1, "c b a"), line(1, 2, "a b c")],
            &FilterConfig::default(),
        );
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines_suppressed, 2);
    }

    #[test]
    fn test_partial_overlap_is_retained() {
        let last: Vec<String> = ["send", "ten", "men"].iter().map(|s| s.to_string()).collect();
        let shorter: Vec<String> = ["ten", "men"].iter().map(|s| s.to_string()).collect();
        assert!(!is_duplicate_line(&shorter, &last));
        assert!(is_duplicate_line(&last, &last));
    }

    #[test]
    fn test_state_persists_across_subjects() {
        let lines = vec![line(1, 0, "end of page"), line(2, 0, "end of page")];

        let persisted = execute_filter(lines.clone(), &FilterConfig::default());
        assert_eq!(persisted.lines.len(), 1);

        let config = FilterConfig {
            reset_per_subject: true,
            ..Default::default()
        };
        let reset = execute_filter(lines, &config);
        assert_eq!(reset.lines.len(), 2);
    }

    #[test]
    fn test_filters_can_be_disabled() {
        let config = FilterConfig {
            collapse_repeated_words: false,
            suppress_repeated_lines: false,
            ..Default::default()
        };
        let result = execute_filter(
            vec![line(1, 0, "the the cat"), line(1, 1, "the the cat")],
            &config,
        );

        assert_eq!(sentences(&result), vec!["the the cat", "the the cat"]);
        assert_eq!(result.words_collapsed, 0);
        assert_eq!(result.lines_suppressed, 0);
    }
}
