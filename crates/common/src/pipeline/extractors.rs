//! Strategy extractors: one planned section in, one content block out

use super::keywords::{matches_any, QueryKeywords};
use super::types::{ContentBlock, ContentItem, ContentItemId, ContentType, SelectedSection};
use crate::db::DocumentStore;
use crate::documents::Sentence;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Turns one planned section into a content block
#[async_trait]
pub trait SectionExtractor: Send + Sync {
    fn content_type(&self) -> ContentType;

    async fn extract(&self, section: &SelectedSection) -> Result<ContentBlock>;
}

/// Every loaded sentence must belong to the planned paper
fn ensure_same_paper(section: &SelectedSection, sentences: &[Sentence]) -> Result<()> {
    if let Some(foreign) = sentences.iter().find(|s| s.paper_id != section.paper_id) {
        error!(
            assertion = "workspace_isolation",
            expected_paper = %section.paper_id,
            found_paper = %foreign.paper_id,
            section_type = %section.section_type,
            "Storage returned a sentence from outside the requested paper"
        );
        return Err(AppError::WorkspaceIsolationViolation {
            message: format!(
                "sentence from paper {} surfaced while reading {}",
                foreign.paper_id,
                section.label()
            ),
        });
    }
    Ok(())
}

fn to_item(section: &SelectedSection, order: usize, sentence: &Sentence) -> ContentItem {
    ContentItem {
        id: ContentItemId::new(
            section.paper_id,
            &section.section_type,
            sentence.page_num,
            order as i32,
        )
        .to_string(),
        text: sentence.text.clone(),
        defining_type: sentence.defining_type,
        page_num: sentence.page_num,
        explanation: sentence.explanation.clone(),
    }
}

/// Sentences containing any keyword that are classified OD or CD.
///
/// Keyword match runs first, then the type filter. Item order follows the
/// sentence order and ids use the sentence's index in `sentences`.
pub fn select_definitions(
    section: &SelectedSection,
    sentences: &[Sentence],
    keywords: &[String],
) -> Vec<ContentItem> {
    sentences
        .iter()
        .enumerate()
        .filter(|(_, s)| matches_any(&s.text, keywords))
        .filter(|(_, s)| s.defining_type.is_some())
        .map(|(order, s)| to_item(section, order, s))
        .collect()
}

/// Sentences containing any keyword, regardless of classification
pub fn select_key_sentences(
    section: &SelectedSection,
    sentences: &[Sentence],
    keywords: &[String],
) -> Vec<ContentItem> {
    sentences
        .iter()
        .enumerate()
        .filter(|(_, s)| matches_any(&s.text, keywords))
        .map(|(order, s)| to_item(section, order, s))
        .collect()
}

// ============================================================================
// Definitions
// ============================================================================

pub struct DefinitionsExtractor {
    store: Arc<dyn DocumentStore>,
    keywords: QueryKeywords,
}

impl DefinitionsExtractor {
    pub fn new(store: Arc<dyn DocumentStore>, keywords: QueryKeywords) -> Self {
        Self { store, keywords }
    }
}

#[async_trait]
impl SectionExtractor for DefinitionsExtractor {
    fn content_type(&self) -> ContentType {
        ContentType::Definitions
    }

    async fn extract(&self, section: &SelectedSection) -> Result<ContentBlock> {
        let keywords = self.keywords.get().await?;
        let sentences = self
            .store
            .get_sentences(section.paper_id, &section.section_type)
            .await?;
        ensure_same_paper(section, &sentences)?;

        let mut block = ContentBlock::empty(section, ContentType::Definitions);
        block.items = select_definitions(section, &sentences, keywords);
        if keywords.is_empty() {
            block
                .warnings
                .push("no keywords available for definition matching".to_string());
        }

        debug!(
            section = %section.label(),
            sentences = sentences.len(),
            definitions = block.items.len(),
            "Definitions extracted"
        );
        Ok(block)
    }
}

// ============================================================================
// Key sentences
// ============================================================================

pub struct KeywordSentenceExtractor {
    store: Arc<dyn DocumentStore>,
    query_keywords: QueryKeywords,
}

impl KeywordSentenceExtractor {
    pub fn new(store: Arc<dyn DocumentStore>, query_keywords: QueryKeywords) -> Self {
        Self {
            store,
            query_keywords,
        }
    }
}

#[async_trait]
impl SectionExtractor for KeywordSentenceExtractor {
    fn content_type(&self) -> ContentType {
        ContentType::KeySentences
    }

    async fn extract(&self, section: &SelectedSection) -> Result<ContentBlock> {
        // Planner keywords win; the query's own keywords fill in when absent
        let keywords: &[String] = match section.keywords.as_deref() {
            Some(planned) if !planned.is_empty() => planned,
            _ => self.query_keywords.get().await?,
        };

        let sentences = self
            .store
            .get_sentences(section.paper_id, &section.section_type)
            .await?;
        ensure_same_paper(section, &sentences)?;

        let mut block = ContentBlock::empty(section, ContentType::KeySentences);
        block.items = select_key_sentences(section, &sentences, keywords);

        debug!(
            section = %section.label(),
            sentences = sentences.len(),
            matched = block.items.len(),
            "Key sentences extracted"
        );
        Ok(block)
    }
}

// ============================================================================
// Full section
// ============================================================================

pub struct FullSectionExtractor {
    store: Arc<dyn DocumentStore>,
}

impl FullSectionExtractor {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SectionExtractor for FullSectionExtractor {
    fn content_type(&self) -> ContentType {
        ContentType::FullSection
    }

    async fn extract(&self, section: &SelectedSection) -> Result<ContentBlock> {
        let mut block = ContentBlock::empty(section, ContentType::FullSection);

        let Some(content) = self
            .store
            .get_section_content(section.paper_id, &section.section_type)
            .await?
        else {
            warn!(section = %section.label(), "Planned section has no stored text");
            block
                .warnings
                .push(format!("section '{}' has no stored text", section.section_type));
            return Ok(block);
        };

        if content.paper_id != section.paper_id {
            error!(
                assertion = "workspace_isolation",
                expected_paper = %section.paper_id,
                found_paper = %content.paper_id,
                "Storage returned section text from outside the requested paper"
            );
            return Err(AppError::WorkspaceIsolationViolation {
                message: format!(
                    "section text from paper {} surfaced while reading {}",
                    content.paper_id,
                    section.label()
                ),
            });
        }

        block.items.push(ContentItem {
            id: ContentItemId::whole_section(
                section.paper_id,
                &section.section_type,
                content.page_num,
            )
            .to_string(),
            text: content.text,
            defining_type: None,
            page_num: content.page_num,
            explanation: None,
        });
        Ok(block)
    }
}
