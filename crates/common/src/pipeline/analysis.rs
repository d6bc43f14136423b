//! Second-stage analysis call

use super::references::orphaned_citations;
use super::retry::{with_retry, RetryPolicy};
use super::types::{AnalysisResult, Reference, SelectedContent, SelectionPlan};
use crate::clients::{AnalysisContent, AnalysisRequest, AnalysisService, ANALYSIS_SERVICE};
use crate::errors::Result;
use crate::metrics;
use tracing::{info, warn};

/// Analysis payload in plan order. Empty blocks are sent as well so the
/// service sees every section that was considered.
pub fn build_request(query: &str, plan: &SelectionPlan, content: &SelectedContent) -> AnalysisRequest {
    AnalysisRequest {
        query: query.to_string(),
        selected_content: content
            .blocks
            .iter()
            .map(|block| AnalysisContent {
                paper_name: block.paper_name.clone(),
                section_type: block.section_type.clone(),
                content_type: block.content_type,
                content: block.items.clone(),
            })
            .collect(),
        analysis_focus: plan.analysis_focus.clone(),
    }
}

/// Fill blank snippets from the extracted item the reference points at
fn fill_snippets(references: &mut [Reference], content: &SelectedContent, max_chars: usize) {
    for reference in references.iter_mut() {
        if !reference.content_snippet.trim().is_empty() {
            continue;
        }
        if let Some((_, item)) = content.find_item(&reference.id) {
            reference.content_snippet = item.text.chars().take(max_chars).collect();
        }
    }
}

/// Request the final answer and check its citation markers
pub async fn analyze(
    service: &dyn AnalysisService,
    retry: &RetryPolicy,
    query: &str,
    plan: &SelectionPlan,
    content: &SelectedContent,
    snippet_chars: usize,
) -> Result<AnalysisResult> {
    let request = build_request(query, plan, content);
    let mut response = with_retry(retry, ANALYSIS_SERVICE, || service.analyze(&request)).await?;
    fill_snippets(&mut response.references, content, snippet_chars);

    let orphaned = orphaned_citations(&response.response, &response.references);
    if !orphaned.is_empty() {
        warn!(
            count = orphaned.len(),
            ids = ?orphaned,
            "Answer cites references that were not returned"
        );
        metrics::record_orphaned_citations(orphaned.len());
    }

    info!(
        references = response.references.len(),
        papers_used = response.source_summary.papers_used.len(),
        sections_analyzed = response.source_summary.sections_analyzed,
        "Analysis complete"
    );

    Ok(AnalysisResult {
        answer: response.response,
        references: response.references,
        source_summary: response.source_summary,
        orphaned_citations: orphaned,
    })
}
