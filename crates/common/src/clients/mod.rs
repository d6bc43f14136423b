//! External AI service abstraction
//!
//! The pipeline talks to three black-box services:
//! - Section planning (query + section summaries -> selection plan)
//! - Keyword extraction (query -> keywords)
//! - Analysis (query + selected content -> answer with references)
//!
//! Wire payloads are defined here and validated by serde at the boundary;
//! the pipeline converts them into its own tagged types.

mod http;
mod mock;

pub use http::HttpServiceClient;
pub use mock::{MockAnalysisService, MockKeywordExtractor, MockPlanner};

use crate::config::ServicesConfig;
use crate::errors::{AppError, Result};
use crate::pipeline::{ContentItem, ContentType, Reference, SourceSummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const PLANNER_SERVICE: &str = "planner";
pub const KEYWORD_SERVICE: &str = "keywords";
pub const ANALYSIS_SERVICE: &str = "analysis";

// ============================================================================
// Planning
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanningRequest {
    pub query: String,
    pub available_papers: Vec<AvailablePaper>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailablePaper {
    pub file_name: String,
    pub sections: Vec<AvailableSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableSection {
    pub section_type: String,
    pub page_num: i32,
    pub word_count: i32,
    pub brief_content: String,
    pub od_count: u32,
    pub cd_count: u32,
    pub total_sentences: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanningResponse {
    pub selected_sections: Vec<PlannedSection>,
    pub analysis_focus: String,
    pub suggested_approach: String,
}

/// Section entry as the planner returns it; focus_type is free text here
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedSection {
    pub paper_name: String,
    pub section_type: String,
    pub focus_type: String,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    #[serde(default)]
    pub selection_reason: String,
}

// ============================================================================
// Keyword extraction
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordEnvelope {
    pub output: KeywordOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordOutput {
    pub keywords: Vec<String>,
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    pub query: String,
    pub selected_content: Vec<AnalysisContent>,
    pub analysis_focus: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisContent {
    pub paper_name: String,
    pub section_type: String,
    pub content_type: ContentType,
    pub content: Vec<ContentItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResponse {
    pub response: String,
    pub references: Vec<Reference>,
    pub source_summary: SourceSummary,
}

// ============================================================================
// Service traits
// ============================================================================

/// Chooses which sections to read for a query
#[async_trait]
pub trait SectionPlanner: Send + Sync {
    async fn plan(&self, request: &PlanningRequest) -> Result<PlanningResponse>;
}

/// Extracts search keywords from the raw user query
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract_keywords(&self, query: &str) -> Result<Vec<String>>;
}

/// Produces the final answer from selected content
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse>;
}

/// The three collaborators a pipeline needs
#[derive(Clone)]
pub struct Services {
    pub planner: Arc<dyn SectionPlanner>,
    pub keywords: Arc<dyn KeywordExtractor>,
    pub analysis: Arc<dyn AnalysisService>,
}

/// Unwrap the keyword service's envelope list
pub(crate) fn keywords_from_envelopes(envelopes: Vec<KeywordEnvelope>) -> Result<Vec<String>> {
    envelopes
        .into_iter()
        .next()
        .map(|e| e.output.keywords)
        .ok_or_else(|| AppError::SchemaValidation {
            service: KEYWORD_SERVICE.to_string(),
            message: "expected a non-empty list of outputs".to_string(),
        })
}

/// Create service clients based on configuration
pub fn create_services(config: &ServicesConfig) -> Result<Services> {
    match config.provider.as_str() {
        "http" => {
            for (name, url) in [
                (PLANNER_SERVICE, &config.planner_url),
                (KEYWORD_SERVICE, &config.keywords_url),
                (ANALYSIS_SERVICE, &config.analysis_url),
            ] {
                if url.trim().is_empty() {
                    return Err(AppError::Configuration {
                        message: format!("services.{}_url is required for the http provider", name),
                    });
                }
            }
            let client = Arc::new(HttpServiceClient::new(config.clone())?);
            Ok(Services {
                planner: client.clone(),
                keywords: client.clone(),
                analysis: client,
            })
        }
        "mock" => Ok(Services {
            planner: Arc::new(MockPlanner::new()),
            keywords: Arc::new(MockKeywordExtractor::new()),
            analysis: Arc::new(MockAnalysisService::new()),
        }),
        other => Err(AppError::Configuration {
            message: format!("unknown services provider: {}", other),
        }),
    }
}
