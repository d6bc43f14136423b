//! Mock services for local runs and tests
//!
//! Each mock counts its calls, can replay a fixed response and can fail a
//! number of times with a network error before succeeding.

use super::{
    AnalysisRequest, AnalysisResponse, AnalysisService, KeywordExtractor, PlannedSection,
    PlanningRequest, PlanningResponse, SectionPlanner, ANALYSIS_SERVICE, KEYWORD_SERVICE,
    PLANNER_SERVICE,
};
use crate::errors::{AppError, Result};
use crate::pipeline::{Reference, SourceSummary};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tokio::sync::Mutex;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "what", "which", "from", "that", "this", "these", "those",
    "does", "how", "are", "between", "about", "into", "compare", "find",
];

fn query_terms(query: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn network_failure(service: &str) -> AppError {
    AppError::Network {
        service: service.to_string(),
        message: "simulated connection reset".to_string(),
    }
}

/// Consume one pending failure, if any
fn take_failure(pending: &AtomicU32) -> bool {
    pending
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// ============================================================================
// Planner
// ============================================================================

#[derive(Default)]
pub struct MockPlanner {
    fixed: Option<PlanningResponse>,
    schema_error: bool,
    failures: AtomicU32,
    calls: AtomicUsize,
}

impl MockPlanner {
    /// Heuristic planner: definitions where the query asks for them,
    /// otherwise key sentences from sections mentioning query terms
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(response: PlanningResponse) -> Self {
        Self {
            fixed: Some(response),
            ..Self::default()
        }
    }

    /// Every call fails as if the response did not match the plan shape
    pub fn with_schema_error() -> Self {
        Self {
            schema_error: true,
            ..Self::default()
        }
    }

    pub fn failing_times(self, times: u32) -> Self {
        self.failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn heuristic_plan(request: &PlanningRequest) -> PlanningResponse {
        let query = request.query.to_lowercase();
        let wants_definitions = query.contains("defin") || query.contains("what is");
        let terms = query_terms(&request.query);

        let mut selected = Vec::new();
        for paper in &request.available_papers {
            for section in &paper.sections {
                let preview = section.brief_content.to_lowercase();
                if wants_definitions && section.od_count + section.cd_count > 0 {
                    selected.push(PlannedSection {
                        paper_name: paper.file_name.clone(),
                        section_type: section.section_type.clone(),
                        focus_type: "definitions".to_string(),
                        keywords: None,
                        selection_reason: "Section contains classified definitions".to_string(),
                    });
                } else if terms.iter().any(|t| preview.contains(t.as_str())) {
                    selected.push(PlannedSection {
                        paper_name: paper.file_name.clone(),
                        section_type: section.section_type.clone(),
                        focus_type: "key_sentences".to_string(),
                        keywords: Some(terms.clone()),
                        selection_reason: "Preview mentions query terms".to_string(),
                    });
                }
            }
        }

        let analysis_focus = if query.contains("compare") || query.contains(" vs ") {
            "comparison"
        } else if wants_definitions {
            "definitions"
        } else {
            "locate_info"
        };

        PlanningResponse {
            selected_sections: selected,
            analysis_focus: analysis_focus.to_string(),
            suggested_approach: format!("Answer '{}' from the selected sections", request.query),
        }
    }
}

#[async_trait]
impl SectionPlanner for MockPlanner {
    async fn plan(&self, request: &PlanningRequest) -> Result<PlanningResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failures) {
            return Err(network_failure(PLANNER_SERVICE));
        }
        if self.schema_error {
            return Err(AppError::SchemaValidation {
                service: PLANNER_SERVICE.to_string(),
                message: "missing field `analysis_focus`".to_string(),
            });
        }
        Ok(match &self.fixed {
            Some(response) => response.clone(),
            None => Self::heuristic_plan(request),
        })
    }
}

// ============================================================================
// Keyword extractor
// ============================================================================

#[derive(Default)]
pub struct MockKeywordExtractor {
    fixed: Option<Vec<String>>,
    failures: AtomicU32,
    calls: AtomicUsize,
}

impl MockKeywordExtractor {
    /// Returns the longer words of the query
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keywords<S: Into<String>>(keywords: impl IntoIterator<Item = S>) -> Self {
        Self {
            fixed: Some(keywords.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn failing_times(self, times: u32) -> Self {
        self.failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeywordExtractor for MockKeywordExtractor {
    async fn extract_keywords(&self, query: &str) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failures) {
            return Err(network_failure(KEYWORD_SERVICE));
        }
        Ok(match &self.fixed {
            Some(keywords) => keywords.clone(),
            None => query_terms(query),
        })
    }
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Default)]
pub struct MockAnalysisService {
    fixed: Option<AnalysisResponse>,
    failures: AtomicU32,
    calls: AtomicUsize,
    last_request: Mutex<Option<AnalysisRequest>>,
}

impl MockAnalysisService {
    /// Cites the first item of every non-empty block
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(response: AnalysisResponse) -> Self {
        Self {
            fixed: Some(response),
            ..Self::default()
        }
    }

    pub fn failing_times(self, times: u32) -> Self {
        self.failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_request(&self) -> Option<AnalysisRequest> {
        self.last_request.lock().await.clone()
    }

    fn summarize(request: &AnalysisRequest) -> AnalysisResponse {
        let mut lines = Vec::new();
        let mut references = Vec::new();
        let mut papers_used: Vec<String> = Vec::new();

        for block in &request.selected_content {
            let Some(item) = block.content.first() else {
                continue;
            };
            let snippet: String = item.text.chars().take(200).collect();
            lines.push(format!(
                "{} ({}) notes: {} [[ref:{}]]",
                block.paper_name, block.section_type, snippet, item.id
            ));
            references.push(Reference {
                id: item.id.clone(),
                paper_name: block.paper_name.clone(),
                section_type: block.section_type.clone(),
                page_num: item.page_num,
                content_snippet: snippet,
            });
            if !papers_used.contains(&block.paper_name) {
                papers_used.push(block.paper_name.clone());
            }
        }

        let response = if lines.is_empty() {
            format!("The selected sections do not address: {}", request.query)
        } else {
            lines.join("\n")
        };

        let all_papers: BTreeSet<&str> = request
            .selected_content
            .iter()
            .map(|b| b.paper_name.as_str())
            .collect();

        AnalysisResponse {
            response,
            references,
            source_summary: SourceSummary {
                total_papers: all_papers.len() as u32,
                papers_used,
                sections_analyzed: request.selected_content.len() as u32,
                analysis_type: request.analysis_focus.clone(),
            },
        }
    }
}

#[async_trait]
impl AnalysisService for MockAnalysisService {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().await = Some(request.clone());
        if take_failure(&self.failures) {
            return Err(network_failure(ANALYSIS_SERVICE));
        }
        Ok(match &self.fixed {
            Some(response) => response.clone(),
            None => Self::summarize(request),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{AvailablePaper, AvailableSection};

    #[test]
    fn test_query_terms_drop_short_and_stop_words() {
        let terms = query_terms("Compare the definitions of adaptive expertise");
        assert_eq!(terms, vec!["definitions", "adaptive", "expertise"]);
    }

    #[tokio::test]
    async fn test_failing_times_then_success() {
        let extractor = MockKeywordExtractor::with_keywords(["a"]).failing_times(2);
        assert!(extractor.extract_keywords("q").await.is_err());
        assert!(extractor.extract_keywords("q").await.is_err());
        assert_eq!(extractor.extract_keywords("q").await.unwrap(), vec!["a"]);
        assert_eq!(extractor.calls(), 3);
    }

    #[tokio::test]
    async fn test_heuristic_plan_prefers_definitions() {
        let planner = MockPlanner::new();
        let request = PlanningRequest {
            query: "What definitions of expertise exist?".into(),
            available_papers: vec![AvailablePaper {
                file_name: "a.pdf".into(),
                sections: vec![
                    AvailableSection {
                        section_type: "introduction".into(),
                        page_num: 1,
                        word_count: 100,
                        brief_content: "Expertise is...".into(),
                        od_count: 1,
                        cd_count: 0,
                        total_sentences: 4,
                    },
                    AvailableSection {
                        section_type: "results".into(),
                        page_num: 5,
                        word_count: 100,
                        brief_content: "Numbers".into(),
                        od_count: 0,
                        cd_count: 0,
                        total_sentences: 4,
                    },
                ],
            }],
        };

        let plan = planner.plan(&request).await.unwrap();
        assert_eq!(plan.selected_sections.len(), 1);
        assert_eq!(plan.selected_sections[0].focus_type, "definitions");
        assert_eq!(plan.analysis_focus, "definitions");
    }
}
