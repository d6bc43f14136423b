//! Query pipeline: context -> plan -> extract -> assemble -> analyze -> resolve
//!
//! Stages run strictly in sequence, each consuming the previous stage's
//! complete output. Only section extraction fans out.

use super::analysis::analyze;
use super::assembler::ContentAssembler;
use super::content_extractor::ContentExtractor;
use super::context_preparer::prepare_context;
use super::keywords::QueryKeywords;
use super::planning::plan_sections;
use super::progress::{bands, ProgressHandle, Stage};
use super::references::{resolve_references, ResolvedAnswer};
use super::retry::RetryPolicy;
use super::types::{AnalysisResult, SelectedContent, SelectionPlan};
use crate::clients::Services;
use crate::config::PipelineConfig;
use crate::db::DocumentStore;
use crate::errors::{AppError, Result};
use crate::metrics::{self, StageTimer};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Immutable inputs of one execution
#[derive(Clone)]
pub struct QueryContext {
    pub query_id: Uuid,
    pub query: String,
    pub document_ids: Vec<Uuid>,
    pub cancel: CancellationToken,
    pub progress: ProgressHandle,
}

/// Everything produced by a fully answered query
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub plan: SelectionPlan,
    pub content: SelectedContent,
    pub result: AnalysisResult,
    pub resolved: ResolvedAnswer,
}

/// Terminal result of one execution
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Answered(Box<Answer>),
    /// The planner selected nothing; no further calls were made
    NothingRelevant { plan: SelectionPlan },
    /// The documents have no section summaries; the planner was not called
    NoContentAvailable,
}

impl QueryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            QueryOutcome::Answered(_) => "answered",
            QueryOutcome::NothingRelevant { .. } => "nothing_relevant",
            QueryOutcome::NoContentAvailable => "no_content",
        }
    }

    /// Text shown in the conversation
    pub fn message(&self) -> String {
        match self {
            QueryOutcome::Answered(answer) => answer.result.answer.clone(),
            QueryOutcome::NothingRelevant { .. } => {
                "No relevant content was found in the selected documents.".to_string()
            }
            QueryOutcome::NoContentAvailable => {
                "No content is available for the selected documents.".to_string()
            }
        }
    }
}

pub struct QueryPipeline {
    store: Arc<dyn DocumentStore>,
    services: Services,
    retry: RetryPolicy,
    config: PipelineConfig,
}

impl QueryPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        services: Services,
        retry: RetryPolicy,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            services,
            retry,
            config,
        }
    }

    /// Run one execution under its cancellation scope.
    ///
    /// Cancelling the token drops every in-flight call and yields
    /// `AppError::Cancelled`. Other failures move progress to `error`.
    #[instrument(skip(self, ctx), fields(query_id = %ctx.query_id))]
    pub async fn execute(&self, ctx: &QueryContext) -> Result<QueryOutcome> {
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(AppError::Cancelled),
            result = self.run(ctx) => result,
        };

        match &result {
            Ok(outcome) => {
                info!(outcome = outcome.label(), "Query finished");
                metrics::record_query(outcome.label());
            }
            Err(AppError::Cancelled) => {
                info!("Query cancelled");
                metrics::record_query("cancelled");
            }
            Err(err) => {
                warn!(error = %err, "Query failed");
                ctx.progress.fail(err.user_message());
                metrics::record_query("failed");
            }
        }
        result
    }

    async fn run(&self, ctx: &QueryContext) -> Result<QueryOutcome> {
        let progress = &ctx.progress;

        // Context
        progress.advance(Stage::Extracting, bands::EXTRACTING_START, |d| {
            d.message = "Reading section summaries".to_string();
        })?;
        let timer = StageTimer::start("context");
        let context = match prepare_context(self.store.as_ref(), &ctx.document_ids).await {
            Ok(context) => context,
            Err(AppError::EmptyContext { document_count }) => {
                info!(documents = document_count, "No section summaries, skipping planning");
                progress.complete("No content available")?;
                return Ok(QueryOutcome::NoContentAvailable);
            }
            Err(err) => return Err(err),
        };
        timer.finish();
        progress.advance(Stage::Extracting, bands::EXTRACTING_END, |d| {
            d.papers_considered = context.papers.len();
        })?;

        // Plan
        progress.advance(Stage::Searching, bands::SEARCHING_START, |d| {
            d.message = "Selecting relevant sections".to_string();
        })?;
        let timer = StageTimer::start("planning");
        let plan = plan_sections(
            self.services.planner.as_ref(),
            &self.retry,
            &context,
            &ctx.query,
        )
        .await?;
        timer.finish();

        if plan.is_empty() {
            progress.complete("No relevant content found")?;
            return Ok(QueryOutcome::NothingRelevant { plan });
        }
        progress.advance(Stage::Searching, bands::PLAN_READY, |d| {
            d.sections_planned = plan.sections.len();
            d.message = format!("Reading {} sections", plan.sections.len());
        })?;

        // Extract
        let timer = StageTimer::start("extraction");
        let keywords = QueryKeywords::new(
            &ctx.query,
            self.services.keywords.clone(),
            self.retry.clone(),
        );
        let extractor = ContentExtractor::new(self.store.clone(), keywords, &self.config);
        let blocks = extractor.extract_all(&plan, progress).await?;
        let content = ContentAssembler::assemble(&plan, blocks)?;
        timer.finish();

        // Analyze
        progress.advance(Stage::Analyzing, bands::ANALYZING_START, |d| {
            d.current_section = None;
            d.message = format!("Analyzing {} content items", content.item_count());
        })?;
        let timer = StageTimer::start("analysis");
        let result = analyze(
            self.services.analysis.as_ref(),
            &self.retry,
            &ctx.query,
            &plan,
            &content,
            self.config.snippet_chars,
        )
        .await?;
        timer.finish();
        progress.advance(Stage::Analyzing, bands::ANALYZING_END, |_| {})?;

        // Resolve
        progress.advance(Stage::Generating, bands::GENERATING, |d| {
            d.message = "Linking citations".to_string();
        })?;
        let resolved = resolve_references(&result.answer, &result.references);
        progress.complete("Answer ready")?;

        Ok(QueryOutcome::Answered(Box::new(Answer {
            plan,
            content,
            result,
            resolved,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        MockAnalysisService, MockKeywordExtractor, MockPlanner, PlannedSection, PlanningResponse,
    };
    use crate::db::InMemoryStore;
    use crate::documents::DefiningType;
    use crate::pipeline::progress::ProgressTracker;
    use crate::pipeline::types::ContentType;

    struct Harness {
        planner: Arc<MockPlanner>,
        keywords: Arc<MockKeywordExtractor>,
        analysis: Arc<MockAnalysisService>,
        pipeline: QueryPipeline,
        tracker: ProgressTracker,
        paper: Uuid,
    }

    fn harness(planner: MockPlanner) -> Harness {
        let mut store = InMemoryStore::new();
        let paper = store.add_paper("expertise.pdf");
        store.add_section(
            paper,
            "introduction",
            1,
            &[
                (
                    "Adaptive expertise is the ability to flexibly apply knowledge.",
                    Some(DefiningType::Cd),
                ),
                ("We define motivation as drive.", Some(DefiningType::Od)),
                ("Other text with no keyword.", Some(DefiningType::Cd)),
            ],
        );
        store.add_section(paper, "methods", 4, &[("We surveyed 40 nurses.", None)]);

        let planner = Arc::new(planner);
        let keywords = Arc::new(MockKeywordExtractor::with_keywords([
            "adaptive expertise",
            "definition",
        ]));
        let analysis = Arc::new(MockAnalysisService::new());
        let services = Services {
            planner: planner.clone(),
            keywords: keywords.clone(),
            analysis: analysis.clone(),
        };

        Harness {
            planner,
            keywords,
            analysis,
            pipeline: QueryPipeline::new(
                Arc::new(store),
                services,
                RetryPolicy::immediate(3),
                PipelineConfig::default(),
            ),
            tracker: ProgressTracker::new(),
            paper,
        }
    }

    fn context(h: &Harness, document_ids: Vec<Uuid>) -> QueryContext {
        let query_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        QueryContext {
            query_id,
            query: "Compare definitions of adaptive expertise".into(),
            document_ids,
            progress: h.tracker.begin(query_id, cancel.clone()),
            cancel,
        }
    }

    fn planned(section_type: &str, focus_type: &str) -> PlannedSection {
        PlannedSection {
            paper_name: "expertise.pdf".into(),
            section_type: section_type.into(),
            focus_type: focus_type.into(),
            keywords: None,
            selection_reason: "test".into(),
        }
    }

    fn planner_selecting(sections: Vec<PlannedSection>) -> MockPlanner {
        MockPlanner::with_response(PlanningResponse {
            selected_sections: sections,
            analysis_focus: "comparison".into(),
            suggested_approach: "Compare the definitions".into(),
        })
    }

    fn assert_send<T: Send>(_: T) {}

    #[tokio::test]
    async fn test_execution_runs_on_a_spawned_task() {
        let h = harness(planner_selecting(vec![
            planned("introduction", "definitions"),
            planned("methods", "key_sentences"),
        ]));
        let ctx = context(&h, vec![h.paper]);
        assert_send(h.pipeline.execute(&ctx));

        let pipeline = Arc::new(h.pipeline);
        let handle = tokio::spawn(async move { pipeline.execute(&ctx).await });
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, Ok(QueryOutcome::Answered(_))));
    }

    #[tokio::test]
    async fn test_answers_definition_query() {
        let h = harness(planner_selecting(vec![
            planned("introduction", "definitions"),
            planned("methods", "full_section"),
        ]));
        let ctx = context(&h, vec![h.paper]);

        let outcome = h.pipeline.execute(&ctx).await.unwrap();
        let QueryOutcome::Answered(answer) = outcome else {
            panic!("expected an answer");
        };

        assert_eq!(answer.content.len(), 2);
        let definitions = &answer.content.blocks[0];
        assert_eq!(definitions.content_type, ContentType::Definitions);
        assert_eq!(definitions.items.len(), 1);
        assert!(definitions.items[0].text.starts_with("Adaptive expertise"));
        assert_eq!(answer.resolved.citation_count(), 2);
        assert!(answer.result.orphaned_citations.is_empty());
        assert_eq!(h.keywords.calls(), 1);

        let state = h.tracker.snapshot();
        assert_eq!(state.stage, Stage::Completed);
        assert_eq!(state.percentage, 100);
        assert!(!state.is_processing);
    }

    #[tokio::test]
    async fn test_empty_plan_skips_keywords_and_analysis() {
        let h = harness(planner_selecting(vec![]));
        let ctx = context(&h, vec![h.paper]);

        let outcome = h.pipeline.execute(&ctx).await.unwrap();

        assert!(matches!(outcome, QueryOutcome::NothingRelevant { .. }));
        assert_eq!(h.planner.calls(), 1);
        assert_eq!(h.keywords.calls(), 0);
        assert_eq!(h.analysis.calls(), 0);
        assert_eq!(h.tracker.snapshot().stage, Stage::Completed);
    }

    #[tokio::test]
    async fn test_section_without_matches_keeps_its_block() {
        let h = harness(planner_selecting(vec![
            planned("methods", "definitions"),
            planned("introduction", "key_sentences"),
        ]));
        let ctx = context(&h, vec![h.paper]);

        let QueryOutcome::Answered(answer) = h.pipeline.execute(&ctx).await.unwrap() else {
            panic!("expected an answer");
        };

        assert_eq!(answer.content.len(), answer.plan.sections.len());
        assert_eq!(answer.content.blocks[0].section_type, "methods");
        assert!(answer.content.blocks[0].is_empty());
        let request = h.analysis.last_request().await.unwrap();
        assert_eq!(request.selected_content.len(), 2);
    }

    #[tokio::test]
    async fn test_definitions_share_one_keyword_call() {
        let h = harness(planner_selecting(vec![
            planned("introduction", "definitions"),
            planned("methods", "definitions"),
            planned("introduction", "key_sentences"),
        ]));
        let ctx = context(&h, vec![h.paper]);

        h.pipeline.execute(&ctx).await.unwrap();
        assert_eq!(h.keywords.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_summaries_skips_planner() {
        let h = harness(MockPlanner::new());
        let ctx = context(&h, vec![Uuid::new_v4()]);

        let outcome = h.pipeline.execute(&ctx).await.unwrap();
        assert!(matches!(outcome, QueryOutcome::NoContentAvailable));
        assert_eq!(h.planner.calls(), 0);
    }

    #[tokio::test]
    async fn test_schema_error_fails_query_with_details() {
        let h = harness(MockPlanner::with_schema_error());
        let ctx = context(&h, vec![h.paper]);

        let err = h.pipeline.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, AppError::SchemaValidation { .. }));
        assert_eq!(h.planner.calls(), 1);

        let state = h.tracker.snapshot();
        assert_eq!(state.stage, Stage::Error);
        assert_eq!(state.details.papers_considered, 1);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let h = harness(MockPlanner::new());
        let ctx = context(&h, vec![h.paper]);
        ctx.cancel.cancel();

        let err = h.pipeline.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        assert_eq!(h.planner.calls(), 0);
    }
}
