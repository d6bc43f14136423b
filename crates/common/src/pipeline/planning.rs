//! First-stage planning call and validation of its response

use super::context_preparer::PreparedContext;
use super::keywords::normalize_keywords;
use super::retry::{with_retry, RetryPolicy};
use super::types::{ContentType, SelectedSection, SelectionPlan};
use crate::clients::{PlanningResponse, SectionPlanner, PLANNER_SERVICE};
use crate::errors::{AppError, Result};
use tracing::{error, info, warn};

/// Ask the planner which sections to read
pub async fn plan_sections(
    planner: &dyn SectionPlanner,
    retry: &RetryPolicy,
    context: &PreparedContext,
    query: &str,
) -> Result<SelectionPlan> {
    let request = context.to_planning_request(query);
    let response = with_retry(retry, PLANNER_SERVICE, || planner.plan(&request)).await?;
    let plan = resolve_plan(response, context)?;

    info!(
        sections = plan.sections.len(),
        analysis_focus = %plan.analysis_focus,
        warnings = plan.warnings.len(),
        "Selection plan received"
    );
    Ok(plan)
}

/// Convert the planner's response into a plan over known documents.
///
/// Paper names must resolve within the context. Unknown focus types fall
/// back to full_section with a warning.
pub fn resolve_plan(response: PlanningResponse, context: &PreparedContext) -> Result<SelectionPlan> {
    let mut warnings = Vec::new();
    let mut sections = Vec::with_capacity(response.selected_sections.len());

    for planned in response.selected_sections {
        let Some(paper) = context.paper_by_name(&planned.paper_name) else {
            error!(
                assertion = "workspace_isolation",
                paper_name = %planned.paper_name,
                "Planner selected a document outside the query context"
            );
            return Err(AppError::WorkspaceIsolationViolation {
                message: format!(
                    "planner selected unknown document '{}'",
                    planned.paper_name
                ),
            });
        };

        let focus_type = match ContentType::parse(&planned.focus_type) {
            Some(focus_type) => focus_type,
            None => {
                warn!(
                    focus_type = %planned.focus_type,
                    paper = %paper.paper_name,
                    section_type = %planned.section_type,
                    "Unknown focus type, reading the full section"
                );
                warnings.push(format!(
                    "unknown focus_type '{}' for {} / {}; using full_section",
                    planned.focus_type, paper.paper_name, planned.section_type
                ));
                ContentType::FullSection
            }
        };

        if !paper
            .sections
            .iter()
            .any(|s| s.section_type == planned.section_type)
        {
            warnings.push(format!(
                "{} has no summarised section '{}'",
                paper.paper_name, planned.section_type
            ));
        }

        let keywords = planned
            .keywords
            .map(normalize_keywords)
            .filter(|k| !k.is_empty());

        sections.push(SelectedSection {
            paper_id: paper.paper_id,
            paper_name: paper.paper_name.clone(),
            section_type: planned.section_type,
            focus_type,
            keywords,
            selection_reason: planned.selection_reason,
        });
    }

    Ok(SelectionPlan {
        sections,
        analysis_focus: response.analysis_focus,
        suggested_approach: response.suggested_approach,
        warnings,
    })
}
