//! Citation marker resolution
//!
//! Splits answer text on `[[ref:<id>]]` markers into text segments and
//! reference handles. The resolver never fails: markers without a matching
//! reference become orphaned segments. Only a marker with an empty id or a
//! bracket inside it is malformed, and that stays as text.

use super::types::Reference;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[\[ref:([^\[\]]+)\]\]").unwrap())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerSegment {
    Text { text: String },
    /// Marker resolved to `references[reference_index]`
    Citation { reference_index: usize, id: String },
    /// Marker whose id is not in the reference list; rendered as inert text
    Orphaned { id: String, raw: String },
}

impl AnswerSegment {
    fn render(&self) -> String {
        match self {
            AnswerSegment::Text { text } => text.clone(),
            AnswerSegment::Citation { id, .. } => format!("[[ref:{}]]", id),
            AnswerSegment::Orphaned { raw, .. } => raw.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResolvedAnswer {
    pub segments: Vec<AnswerSegment>,
    /// Ids of orphaned markers, first occurrence order, no duplicates
    pub orphaned: Vec<String>,
}

impl ResolvedAnswer {
    /// Reassemble the original answer text
    pub fn render(&self) -> String {
        self.segments.iter().map(AnswerSegment::render).collect()
    }

    pub fn citation_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, AnswerSegment::Citation { .. }))
            .count()
    }
}

fn push_text(segments: &mut Vec<AnswerSegment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(AnswerSegment::Text { text: last }) = segments.last_mut() {
        last.push_str(text);
    } else {
        segments.push(AnswerSegment::Text {
            text: text.to_string(),
        });
    }
}

/// Split `answer` into text and citation segments
pub fn resolve_references(answer: &str, references: &[Reference]) -> ResolvedAnswer {
    let mut resolved = ResolvedAnswer::default();
    let mut cursor = 0;

    for captures in marker_pattern().captures_iter(answer) {
        let (Some(whole), Some(id)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        push_text(&mut resolved.segments, &answer[cursor..whole.start()]);
        cursor = whole.end();

        let id = id.as_str();
        match references.iter().position(|r| r.id == id) {
            Some(reference_index) => resolved.segments.push(AnswerSegment::Citation {
                reference_index,
                id: id.to_string(),
            }),
            None => {
                if !resolved.orphaned.iter().any(|o| o == id) {
                    resolved.orphaned.push(id.to_string());
                }
                resolved.segments.push(AnswerSegment::Orphaned {
                    id: id.to_string(),
                    raw: whole.as_str().to_string(),
                });
            }
        }
    }
    push_text(&mut resolved.segments, &answer[cursor..]);

    resolved
}

/// Ids of markers in `answer` that have no reference
pub fn orphaned_citations(answer: &str, references: &[Reference]) -> Vec<String> {
    resolve_references(answer, references).orphaned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(id: &str) -> Reference {
        Reference {
            id: id.into(),
            paper_name: "a.pdf".into(),
            section_type: "introduction".into(),
            page_num: 1,
            content_snippet: "snippet".into(),
        }
    }

    #[test]
    fn test_splits_text_and_citations() {
        let refs = vec![reference("r1"), reference("r2")];
        let resolved = resolve_references("Alpha [[ref:r2]] beta [[ref:r1]].", &refs);

        assert_eq!(
            resolved.segments,
            vec![
                AnswerSegment::Text { text: "Alpha ".into() },
                AnswerSegment::Citation { reference_index: 1, id: "r2".into() },
                AnswerSegment::Text { text: " beta ".into() },
                AnswerSegment::Citation { reference_index: 0, id: "r1".into() },
                AnswerSegment::Text { text: ".".into() },
            ]
        );
        assert!(resolved.orphaned.is_empty());
        assert_eq!(resolved.citation_count(), 2);
    }

    #[test]
    fn test_unknown_id_is_orphaned_not_dropped() {
        let refs = vec![reference("r1")];
        let answer = "See [[ref:ghost]] and [[ref:ghost]] and [[ref:r1]]";
        let resolved = resolve_references(answer, &refs);

        assert_eq!(resolved.orphaned, vec!["ghost".to_string()]);
        let orphan_segments = resolved
            .segments
            .iter()
            .filter(|s| matches!(s, AnswerSegment::Orphaned { .. }))
            .count();
        assert_eq!(orphan_segments, 2);
        assert_eq!(resolved.render(), answer);
    }

    #[test]
    fn test_malformed_markers_stay_text() {
        let answer = "Broken [[ref:]] and [[ref:a[b]] and [ref:x] and [[ref:ok";
        let resolved = resolve_references(answer, &[reference("x")]);

        assert_eq!(
            resolved.segments,
            vec![AnswerSegment::Text { text: answer.into() }]
        );
    }

    #[test]
    fn test_ids_with_spaces_and_symbols_are_resolved() {
        let refs = vec![reference("ref 1")];
        let answer = "See [[ref:ref 1]] and [[ref:doc#2]].";
        let resolved = resolve_references(answer, &refs);

        assert_eq!(resolved.citation_count(), 1);
        assert_eq!(resolved.orphaned, vec!["doc#2".to_string()]);
        assert_eq!(resolved.render(), answer);
    }

    #[test]
    fn test_item_ids_are_recognised() {
        let id = "4b7f2d0e-8f4e-4a53-9d7c-2a1f7a3c9e11-literature_review-p4-s12";
        let answer = format!("Defined here [[ref:{}]].", id);
        let resolved = resolve_references(&answer, &[reference(id)]);
        assert_eq!(resolved.citation_count(), 1);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let refs = vec![reference("r1")];
        let answer = "[[ref:r1]][[ref:r9]] tail";
        let first = resolve_references(answer, &refs);
        let second = resolve_references(&first.render(), &refs);

        assert_eq!(first, second);
        assert_eq!(first.render(), answer);
    }

    #[test]
    fn test_empty_answer() {
        let resolved = resolve_references("", &[]);
        assert!(resolved.segments.is_empty());
        assert!(resolved.orphaned.is_empty());
    }
}
