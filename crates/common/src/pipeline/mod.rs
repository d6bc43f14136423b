//! Two-stage query pipeline
//!
//! A query and a set of parsed documents go through:
//! 1. Context preparation (section summaries)
//! 2. Section planning (first external call)
//! 3. Strategy-specific content extraction, concurrently per section
//! 4. Order-preserving assembly
//! 5. Analysis (second external call)
//! 6. Citation resolution
//!
//! Progress is published throughout and each execution owns one
//! cancellation scope.

pub mod analysis;
pub mod assembler;
pub mod content_extractor;
pub mod context_preparer;
pub mod extractors;
pub mod keywords;
pub mod orchestrator;
pub mod planning;
pub mod progress;
pub mod references;
pub mod retry;
pub mod types;

pub use assembler::ContentAssembler;
pub use content_extractor::ContentExtractor;
pub use context_preparer::{prepare_context, PaperContext, PreparedContext};
pub use extractors::{
    DefinitionsExtractor, FullSectionExtractor, KeywordSentenceExtractor, SectionExtractor,
};
pub use keywords::QueryKeywords;
pub use orchestrator::{Answer, QueryContext, QueryOutcome, QueryPipeline};
pub use progress::{ProgressDetails, ProgressHandle, ProgressState, ProgressTracker, Stage};
pub use references::{resolve_references, AnswerSegment, ResolvedAnswer};
pub use retry::{with_retry, RetryPolicy};
pub use types::{
    AnalysisResult, ContentBlock, ContentItem, ContentItemId, ContentType, Reference,
    SelectedContent, SelectedSection, SelectionPlan, SourceSummary,
};
