//! Data flowing between pipeline stages
//!
//! Everything here lives for a single query execution.

use crate::documents::DefiningType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Extraction strategy for one planned section, and the tag its content
/// block carries into analysis
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Definitions,
    KeySentences,
    FullSection,
}

impl ContentType {
    /// Parse a planner focus_type. Unknown values yield `None`.
    pub fn parse(focus_type: &str) -> Option<Self> {
        match focus_type.trim().to_ascii_lowercase().as_str() {
            "definitions" => Some(ContentType::Definitions),
            "key_sentences" => Some(ContentType::KeySentences),
            "full_section" => Some(ContentType::FullSection),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Definitions => "definitions",
            ContentType::KeySentences => "key_sentences",
            ContentType::FullSection => "full_section",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One section the planner chose, resolved to a paper in the context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectedSection {
    pub paper_id: Uuid,
    pub paper_name: String,
    pub section_type: String,
    pub focus_type: ContentType,
    pub keywords: Option<Vec<String>>,
    pub selection_reason: String,
}

impl SelectedSection {
    /// Short label for logs and progress details
    pub fn label(&self) -> String {
        format!("{} / {}", self.paper_name, self.section_type)
    }
}

/// Ordered plan returned by the section planner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectionPlan {
    pub sections: Vec<SelectedSection>,
    pub analysis_focus: String,
    pub suggested_approach: String,
    /// Non-fatal problems found while validating the plan
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SelectionPlan {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Deterministic identity of one extracted item.
///
/// Rendered as `{paper}-{section}-p{page}-s{order}` so citation markers
/// carrying it can be traced back to the source sentence. The single item
/// of a full-section read renders as `{paper}-{section}-p{page}-full`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentItemId {
    pub paper_id: Uuid,
    pub section_slug: String,
    pub page_num: i32,
    /// Sentence position; `None` for the whole section
    pub order: Option<i32>,
}

impl ContentItemId {
    pub fn new(paper_id: Uuid, section_type: &str, page_num: i32, order: i32) -> Self {
        Self {
            paper_id,
            section_slug: slug(section_type),
            page_num,
            order: Some(order),
        }
    }

    pub fn whole_section(paper_id: Uuid, section_type: &str, page_num: i32) -> Self {
        Self {
            paper_id,
            section_slug: slug(section_type),
            page_num,
            order: None,
        }
    }
}

impl fmt::Display for ContentItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-p{}", self.paper_id, self.section_slug, self.page_num)?;
        match self.order {
            Some(order) => write!(f, "-s{}", order),
            None => f.write_str("-full"),
        }
    }
}

impl FromStr for ContentItemId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A hyphenated uuid is always 36 bytes
        let invalid = || format!("invalid content item id: {}", s);
        if s.len() < 38 || !s.is_char_boundary(36) {
            return Err(invalid());
        }
        let (paper, rest) = s.split_at(36);
        let paper_id = Uuid::parse_str(paper).map_err(|_| invalid())?;
        let rest = rest.strip_prefix('-').ok_or_else(invalid)?;

        let (rest, order): (&str, Option<i32>) = match rest.strip_suffix("-full") {
            Some(rest) => (rest, None),
            None => {
                let (rest, order) = rest.rsplit_once("-s").ok_or_else(invalid)?;
                (rest, Some(order.parse().map_err(|_| invalid())?))
            }
        };
        let (section_slug, page) = rest.rsplit_once("-p").ok_or_else(invalid)?;
        if section_slug.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            paper_id,
            section_slug: section_slug.to_string(),
            page_num: page.parse().map_err(|_| invalid())?,
            order,
        })
    }
}

/// Lowercase, alphanumerics kept, every other run collapsed to '_'
pub fn slug(section_type: &str) -> String {
    let mut out = String::with_capacity(section_type.len());
    let mut pending_sep = false;
    for ch in section_type.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        out.push_str("section");
    }
    out
}

/// One piece of content handed to analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentItem {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub defining_type: Option<DefiningType>,
    pub page_num: i32,
    /// Classification rationale carried over from parsing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Extraction output for one planned section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentBlock {
    pub paper_id: Uuid,
    pub paper_name: String,
    pub section_type: String,
    pub content_type: ContentType,
    /// May be empty; an empty block still records that the section was read
    pub items: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ContentBlock {
    pub fn empty(section: &SelectedSection, content_type: ContentType) -> Self {
        Self {
            paper_id: section.paper_id,
            paper_name: section.paper_name.clone(),
            section_type: section.section_type.clone(),
            content_type,
            items: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Blocks in plan order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelectedContent {
    pub blocks: Vec<ContentBlock>,
}

impl SelectedContent {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.blocks.iter().map(|b| b.items.len()).sum()
    }

    pub fn find_item(&self, id: &str) -> Option<(&ContentBlock, &ContentItem)> {
        self.blocks
            .iter()
            .find_map(|b| b.items.iter().find(|i| i.id == id).map(|i| (b, i)))
    }
}

/// Structured source behind a citation marker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    pub id: String,
    pub paper_name: String,
    pub section_type: String,
    pub page_num: i32,
    pub content_snippet: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceSummary {
    pub total_papers: u32,
    pub papers_used: Vec<String>,
    pub sections_analyzed: u32,
    pub analysis_type: String,
}

/// Final answer from the analysis service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    /// Free text with zero or more `[[ref:<id>]]` markers
    pub answer: String,
    pub references: Vec<Reference>,
    pub source_summary: SourceSummary,
    /// Marker ids that have no entry in `references`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orphaned_citations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parse() {
        assert_eq!(ContentType::parse("definitions"), Some(ContentType::Definitions));
        assert_eq!(ContentType::parse(" Key_Sentences"), Some(ContentType::KeySentences));
        assert_eq!(ContentType::parse("summary"), None);
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Related Work"), "related_work");
        assert_eq!(slug("  Methods & Materials "), "methods_materials");
        assert_eq!(slug("---"), "section");
    }

    #[test]
    fn test_item_id_parses_back() {
        let paper = Uuid::new_v4();
        let id = ContentItemId::new(paper, "Literature Review", 4, 12);
        let rendered = id.to_string();
        assert!(rendered.ends_with("-literature_review-p4-s12"));

        let parsed: ContentItemId = rendered.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_whole_section_id_parses_back() {
        let paper = Uuid::new_v4();
        let id = ContentItemId::whole_section(paper, "Introduction", 1);
        let rendered = id.to_string();
        assert!(rendered.ends_with("-introduction-p1-full"));
        assert_ne!(rendered, ContentItemId::new(paper, "Introduction", 1, 0).to_string());

        let parsed: ContentItemId = rendered.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_item_id_rejects_garbage() {
        assert!("not-an-id".parse::<ContentItemId>().is_err());
        let paper = Uuid::new_v4();
        assert!(format!("{}-methods-px-s1", paper).parse::<ContentItemId>().is_err());
    }
}
