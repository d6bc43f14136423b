//! Parsed document records
//!
//! Sections and sentences are produced upstream when a paper is parsed and
//! are read-only here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Characters of section text kept as the planner preview
pub const BRIEF_CONTENT_CHARS: usize = 300;

/// Sentence classification assigned at parse time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DefiningType {
    /// Operational definition
    #[serde(rename = "OD")]
    Od,
    /// Conceptual definition
    #[serde(rename = "CD")]
    Cd,
}

impl DefiningType {
    /// Parse a stored label. Anything other than OD/CD is unclassified.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "OD" => Some(DefiningType::Od),
            "CD" => Some(DefiningType::Cd),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DefiningType::Od => "OD",
            DefiningType::Cd => "CD",
        }
    }
}

/// Aggregate view of one section, used to plan which sections to read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionSummary {
    pub paper_id: Uuid,
    pub paper_name: String,
    pub section_type: String,
    pub page_num: i32,
    pub word_count: i32,
    /// Short preview of the section text
    pub brief_content: String,
    pub od_count: u32,
    pub cd_count: u32,
    pub total_sentences: u32,
}

impl SectionSummary {
    /// od_count + cd_count never exceeds total_sentences
    pub fn counts_consistent(&self) -> bool {
        self.od_count as u64 + self.cd_count as u64 <= self.total_sentences as u64
    }
}

/// One parsed sentence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sentence {
    pub paper_id: Uuid,
    pub section_id: Uuid,
    pub text: String,
    pub defining_type: Option<DefiningType>,
    /// Why the classifier chose the defining type
    pub explanation: Option<String>,
    pub page_num: i32,
    /// Order of the sentence within its section
    pub position: i32,
}

/// Full verbatim text of one section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionContent {
    pub paper_id: Uuid,
    pub section_type: String,
    pub page_num: i32,
    pub text: String,
}

/// Truncate to at most `max_chars` characters on a char boundary
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defining_type_parse() {
        assert_eq!(DefiningType::parse("od"), Some(DefiningType::Od));
        assert_eq!(DefiningType::parse(" CD "), Some(DefiningType::Cd));
        assert_eq!(DefiningType::parse("other"), None);
        assert_eq!(DefiningType::parse(""), None);
    }

    #[test]
    fn test_counts_consistent() {
        let mut summary = SectionSummary {
            paper_id: Uuid::new_v4(),
            paper_name: "a.pdf".into(),
            section_type: "introduction".into(),
            page_num: 1,
            word_count: 120,
            brief_content: String::new(),
            od_count: 2,
            cd_count: 3,
            total_sentences: 5,
        };
        assert!(summary.counts_consistent());
        summary.cd_count = 4;
        assert!(!summary.counts_consistent());
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo wörld", 5), "héllo");
        assert_eq!(preview("short", 50), "short");
    }
}
