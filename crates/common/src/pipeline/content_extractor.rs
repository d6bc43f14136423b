//! Dispatch planned sections to their extractors
//!
//! Sections run concurrently up to a configured bound. Blocks come back
//! tagged with their plan index in completion order; the assembler restores
//! plan order.

use super::extractors::{
    DefinitionsExtractor, FullSectionExtractor, KeywordSentenceExtractor, SectionExtractor,
};
use super::keywords::QueryKeywords;
use super::progress::{bands, ProgressHandle, Stage};
use super::types::{ContentBlock, ContentType, SelectedSection, SelectionPlan};
use crate::config::{PipelineConfig, SectionFailurePolicy};
use crate::db::DocumentStore;
use crate::errors::{AppError, Result};
use crate::metrics;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ContentExtractor {
    definitions: DefinitionsExtractor,
    key_sentences: KeywordSentenceExtractor,
    full_section: FullSectionExtractor,
    max_concurrent: usize,
    failure_policy: SectionFailurePolicy,
}

impl ContentExtractor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        keywords: QueryKeywords,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            definitions: DefinitionsExtractor::new(store.clone(), keywords.clone()),
            key_sentences: KeywordSentenceExtractor::new(store.clone(), keywords),
            full_section: FullSectionExtractor::new(store),
            max_concurrent: config.max_concurrent_sections.max(1),
            failure_policy: config.section_failure,
        }
    }

    fn extractor_for(&self, content_type: ContentType) -> &dyn SectionExtractor {
        match content_type {
            ContentType::Definitions => &self.definitions,
            ContentType::KeySentences => &self.key_sentences,
            ContentType::FullSection => &self.full_section,
        }
    }

    async fn extract_one(&self, section: &SelectedSection) -> Result<ContentBlock> {
        let extractor = self.extractor_for(section.focus_type);
        let block = extractor.extract(section).await?;
        metrics::record_extracted_items(extractor.content_type().as_str(), block.items.len());
        Ok(block)
    }

    /// Extract every planned section.
    ///
    /// Returns `(plan_index, block)` pairs in completion order. Progress
    /// moves through the searching band as sections finish.
    pub async fn extract_all(
        &self,
        plan: &SelectionPlan,
        progress: &ProgressHandle,
    ) -> Result<Vec<(usize, ContentBlock)>> {
        let total = plan.sections.len();
        let mut completed = Vec::with_capacity(total);

        let futures: Vec<BoxFuture<'_, (usize, Result<ContentBlock>)>> = plan
            .sections
            .iter()
            .enumerate()
            .map(|(index, section)| {
                async move { (index, self.extract_one(section).await) }.boxed()
            })
            .collect();

        let mut pending = stream::iter(futures).buffer_unordered(self.max_concurrent);

        while let Some((index, result)) = pending.next().await {
            let section = &plan.sections[index];
            let block = match result {
                Ok(block) => block,
                Err(err) => self.on_failure(section, err)?,
            };
            completed.push((index, block));

            let done = completed.len();
            progress.advance(Stage::Searching, searching_percentage(done, total), |details| {
                details.sections_extracted = done;
                details.current_section = Some(section.label());
                details.message = format!("Extracted {} of {} sections", done, total);
            })?;
        }

        let items: usize = completed.iter().map(|(_, b)| b.items.len()).sum();
        info!(sections = total, items = items, "Content extraction complete");
        Ok(completed)
    }

    fn on_failure(&self, section: &SelectedSection, err: AppError) -> Result<ContentBlock> {
        let skippable = !matches!(
            err,
            AppError::WorkspaceIsolationViolation { .. } | AppError::Cancelled
        );
        if self.failure_policy == SectionFailurePolicy::Skip && skippable {
            warn!(
                section = %section.label(),
                error = %err,
                "Section extraction failed, continuing with an empty block"
            );
            let mut block = ContentBlock::empty(section, section.focus_type);
            block.warnings.push(format!("extraction failed: {}", err));
            return Ok(block);
        }
        Err(err)
    }
}

/// Position inside the searching band after `done` of `total` sections
fn searching_percentage(done: usize, total: usize) -> u8 {
    if total == 0 {
        return bands::SEARCHING_END;
    }
    let span = (bands::SEARCHING_END - bands::PLAN_READY) as usize;
    bands::PLAN_READY + (span * done.min(total) / total) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MockKeywordExtractor;
    use crate::db::InMemoryStore;
    use crate::documents::{DefiningType, SectionContent, SectionSummary, Sentence};
    use crate::pipeline::assembler::ContentAssembler;
    use crate::pipeline::progress::ProgressTracker;
    use crate::pipeline::retry::RetryPolicy;
    use async_trait::async_trait;
    use rand::Rng;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    /// Delays every read by a random amount so sections finish out of order
    struct JitteryStore {
        inner: InMemoryStore,
        fail_section: Option<String>,
    }

    impl JitteryStore {
        async fn jitter(&self) {
            let millis = rand::thread_rng().gen_range(0..15);
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    #[async_trait]
    impl DocumentStore for JitteryStore {
        async fn get_section_summaries(&self, ids: &[Uuid]) -> Result<Vec<SectionSummary>> {
            self.inner.get_section_summaries(ids).await
        }

        async fn get_sentences(&self, paper_id: Uuid, section_type: &str) -> Result<Vec<Sentence>> {
            self.jitter().await;
            if self.fail_section.as_deref() == Some(section_type) {
                return Err(AppError::Internal {
                    message: "disk on fire".into(),
                });
            }
            self.inner.get_sentences(paper_id, section_type).await
        }

        async fn get_section_content(
            &self,
            paper_id: Uuid,
            section_type: &str,
        ) -> Result<Option<SectionContent>> {
            self.jitter().await;
            self.inner.get_section_content(paper_id, section_type).await
        }
    }

    fn fixture(fail_section: Option<&str>) -> (Arc<JitteryStore>, SelectionPlan) {
        let mut store = InMemoryStore::new();
        let paper = store.add_paper("expertise.pdf");
        let section_types = ["abstract", "introduction", "methods", "results", "discussion"];
        for (page, section_type) in section_types.iter().enumerate() {
            store.add_section(
                paper,
                section_type,
                page as i32 + 1,
                &[
                    ("Expertise is defined as skill.", Some(DefiningType::Cd)),
                    ("Filler sentence.", None),
                ],
            );
        }

        let focus = [
            ContentType::Definitions,
            ContentType::KeySentences,
            ContentType::FullSection,
        ];
        let sections = section_types
            .iter()
            .enumerate()
            .map(|(i, section_type)| SelectedSection {
                paper_id: paper,
                paper_name: "expertise.pdf".into(),
                section_type: section_type.to_string(),
                focus_type: focus[i % focus.len()],
                keywords: None,
                selection_reason: String::new(),
            })
            .collect();

        let store = Arc::new(JitteryStore {
            inner: store,
            fail_section: fail_section.map(str::to_string),
        });
        let plan = SelectionPlan {
            sections,
            analysis_focus: "definitions".into(),
            suggested_approach: String::new(),
            warnings: vec![],
        };
        (store, plan)
    }

    fn extractor(store: Arc<JitteryStore>, policy: SectionFailurePolicy) -> ContentExtractor {
        let keywords = QueryKeywords::new(
            "q",
            Arc::new(MockKeywordExtractor::with_keywords(["expertise"])),
            RetryPolicy::none(),
        );
        let config = PipelineConfig {
            max_concurrent_sections: 5,
            section_failure: policy,
            ..PipelineConfig::default()
        };
        ContentExtractor::new(store, keywords, &config)
    }

    #[tokio::test]
    async fn test_plan_order_survives_random_completion() {
        for _ in 0..10 {
            let (store, plan) = fixture(None);
            let tracker = ProgressTracker::new();
            let handle = tracker.begin(Uuid::new_v4(), CancellationToken::new());

            let blocks = extractor(store, SectionFailurePolicy::Abort)
                .extract_all(&plan, &handle)
                .await
                .unwrap();
            let content = ContentAssembler::assemble(&plan, blocks).unwrap();

            let order: Vec<&str> = content.blocks.iter().map(|b| b.section_type.as_str()).collect();
            let expected: Vec<&str> = plan.sections.iter().map(|s| s.section_type.as_str()).collect();
            assert_eq!(order, expected);

            let state = tracker.snapshot();
            assert_eq!(state.percentage, bands::SEARCHING_END);
            assert_eq!(state.details.sections_extracted, plan.sections.len());
        }
    }

    #[tokio::test]
    async fn test_abort_policy_propagates_failure() {
        let (store, plan) = fixture(Some("introduction"));
        let tracker = ProgressTracker::new();
        let handle = tracker.begin(Uuid::new_v4(), CancellationToken::new());

        let result = extractor(store, SectionFailurePolicy::Abort)
            .extract_all(&plan, &handle)
            .await;
        assert!(matches!(result, Err(AppError::Internal { .. })));
    }

    #[tokio::test]
    async fn test_skip_policy_keeps_an_empty_block() {
        let (store, plan) = fixture(Some("introduction"));
        let tracker = ProgressTracker::new();
        let handle = tracker.begin(Uuid::new_v4(), CancellationToken::new());

        let blocks = extractor(store, SectionFailurePolicy::Skip)
            .extract_all(&plan, &handle)
            .await
            .unwrap();
        let content = ContentAssembler::assemble(&plan, blocks).unwrap();

        assert_eq!(content.len(), plan.sections.len());
        let skipped = &content.blocks[1];
        assert_eq!(skipped.section_type, "introduction");
        assert!(skipped.is_empty());
        assert_eq!(skipped.warnings.len(), 1);
    }

    #[test]
    fn test_searching_percentage_stays_in_band() {
        assert_eq!(searching_percentage(0, 4), bands::PLAN_READY);
        assert_eq!(searching_percentage(2, 4), 42);
        assert_eq!(searching_percentage(4, 4), bands::SEARCHING_END);
        assert_eq!(searching_percentage(0, 0), bands::SEARCHING_END);
    }
}
