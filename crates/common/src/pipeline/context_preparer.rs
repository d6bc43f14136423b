//! Load section summaries for the documents a query may read

use crate::clients::{AvailablePaper, AvailableSection, PlanningRequest};
use crate::db::DocumentStore;
use crate::documents::SectionSummary;
use crate::errors::{AppError, Result};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{error, info};
use uuid::Uuid;

/// Summaries of one document
#[derive(Debug, Clone, Serialize)]
pub struct PaperContext {
    pub paper_id: Uuid,
    pub paper_name: String,
    pub sections: Vec<SectionSummary>,
}

/// Section summaries grouped by document, in the caller's document order
#[derive(Debug, Clone, Serialize)]
pub struct PreparedContext {
    pub papers: Vec<PaperContext>,
}

impl PreparedContext {
    pub fn section_count(&self) -> usize {
        self.papers.iter().map(|p| p.sections.len()).sum()
    }

    /// Resolve a planner paper name back to a document in this context
    pub fn paper_by_name(&self, name: &str) -> Option<&PaperContext> {
        self.papers
            .iter()
            .find(|p| p.paper_name == name)
            .or_else(|| {
                let wanted = name.trim().to_lowercase();
                self.papers
                    .iter()
                    .find(|p| p.paper_name.to_lowercase() == wanted)
            })
    }

    pub fn to_planning_request(&self, query: &str) -> PlanningRequest {
        PlanningRequest {
            query: query.to_string(),
            available_papers: self
                .papers
                .iter()
                .map(|paper| AvailablePaper {
                    file_name: paper.paper_name.clone(),
                    sections: paper
                        .sections
                        .iter()
                        .map(|s| AvailableSection {
                            section_type: s.section_type.clone(),
                            page_num: s.page_num,
                            word_count: s.word_count,
                            brief_content: s.brief_content.clone(),
                            od_count: s.od_count,
                            cd_count: s.cd_count,
                            total_sentences: s.total_sentences,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Read summaries for `document_ids`.
///
/// Fails with `EmptyContext` when no document has any summary and with
/// `NotFound` when only some do. Summaries for documents that were not
/// requested are an isolation violation.
pub async fn prepare_context(
    store: &dyn DocumentStore,
    document_ids: &[Uuid],
) -> Result<PreparedContext> {
    if document_ids.is_empty() {
        return Err(AppError::Validation {
            message: "at least one document id is required".to_string(),
            field: Some("document_ids".to_string()),
        });
    }

    let mut requested = HashSet::new();
    let ordered: Vec<Uuid> = document_ids
        .iter()
        .copied()
        .filter(|id| requested.insert(*id))
        .collect();

    let summaries = store.get_section_summaries(&ordered).await?;

    if let Some(foreign) = summaries.iter().find(|s| !requested.contains(&s.paper_id)) {
        error!(
            assertion = "workspace_isolation",
            paper_id = %foreign.paper_id,
            "Storage returned a summary for an unrequested document"
        );
        return Err(AppError::WorkspaceIsolationViolation {
            message: format!("summary for unrequested document {}", foreign.paper_id),
        });
    }

    if summaries.is_empty() {
        return Err(AppError::EmptyContext {
            document_count: ordered.len(),
        });
    }

    if let Some(bad) = summaries.iter().find(|s| !s.counts_consistent()) {
        return Err(AppError::Internal {
            message: format!(
                "section {} of {} reports {} OD + {} CD of {} sentences",
                bad.section_type, bad.paper_id, bad.od_count, bad.cd_count, bad.total_sentences
            ),
        });
    }

    let mut papers = Vec::with_capacity(ordered.len());
    for paper_id in ordered {
        let sections: Vec<SectionSummary> = summaries
            .iter()
            .filter(|s| s.paper_id == paper_id)
            .cloned()
            .collect();
        let Some(first) = sections.first() else {
            return Err(AppError::NotFound {
                resource_type: "document summaries".to_string(),
                id: paper_id.to_string(),
            });
        };
        papers.push(PaperContext {
            paper_id,
            paper_name: first.paper_name.clone(),
            sections,
        });
    }

    let context = PreparedContext { papers };
    info!(
        documents = context.papers.len(),
        sections = context.section_count(),
        "Context prepared"
    );
    Ok(context)
}
