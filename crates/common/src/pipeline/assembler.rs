//! Merge extracted blocks back into plan order

use super::types::{ContentBlock, SelectedContent, SelectionPlan};
use crate::errors::{AppError, Result};

pub struct ContentAssembler;

impl ContentAssembler {
    /// Place every block at its plan index.
    ///
    /// Blocks may arrive in any order. Empty blocks are kept. Each plan
    /// section must be covered by exactly one block for the same paper and
    /// section type.
    pub fn assemble(
        plan: &SelectionPlan,
        blocks: Vec<(usize, ContentBlock)>,
    ) -> Result<SelectedContent> {
        let mut slots: Vec<Option<ContentBlock>> = vec![None; plan.sections.len()];

        for (index, block) in blocks {
            let section = plan.sections.get(index).ok_or_else(|| AppError::Internal {
                message: format!(
                    "content block for plan index {} but the plan has {} sections",
                    index,
                    plan.sections.len()
                ),
            })?;

            if block.paper_id != section.paper_id || block.section_type != section.section_type {
                return Err(AppError::Internal {
                    message: format!(
                        "content block for {} / {} placed at plan index {} ({})",
                        block.paper_name,
                        block.section_type,
                        index,
                        section.label()
                    ),
                });
            }

            let slot = &mut slots[index];
            if slot.is_some() {
                return Err(AppError::Internal {
                    message: format!("duplicate content block for plan index {}", index),
                });
            }
            *slot = Some(block);
        }

        let blocks = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| AppError::Internal {
                    message: format!("no content block for plan index {}", index),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SelectedContent { blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{ContentItem, ContentType, SelectedSection};
    use rand::seq::SliceRandom;
    use uuid::Uuid;

    fn plan(section_types: &[&str]) -> SelectionPlan {
        let paper_id = Uuid::new_v4();
        SelectionPlan {
            sections: section_types
                .iter()
                .map(|t| SelectedSection {
                    paper_id,
                    paper_name: "a.pdf".into(),
                    section_type: t.to_string(),
                    focus_type: ContentType::KeySentences,
                    keywords: None,
                    selection_reason: String::new(),
                })
                .collect(),
            analysis_focus: "locate_info".into(),
            suggested_approach: String::new(),
            warnings: vec![],
        }
    }

    fn blocks_for(plan: &SelectionPlan) -> Vec<(usize, ContentBlock)> {
        plan.sections
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mut block = ContentBlock::empty(s, s.focus_type);
                if i % 2 == 0 {
                    block.items.push(ContentItem {
                        id: format!("item-{}", i),
                        text: "text".into(),
                        defining_type: None,
                        page_num: 1,
                        explanation: None,
                    });
                }
                (i, block)
            })
            .collect()
    }

    #[test]
    fn test_shuffled_completion_keeps_plan_order() {
        let plan = plan(&["abstract", "introduction", "methods", "results", "discussion", "conclusion"]);
        let expected: Vec<String> = plan.sections.iter().map(|s| s.section_type.clone()).collect();
        let mut rng = rand::thread_rng();

        for _ in 0..100 {
            let mut blocks = blocks_for(&plan);
            blocks.shuffle(&mut rng);

            let content = ContentAssembler::assemble(&plan, blocks).unwrap();
            let order: Vec<String> = content.blocks.iter().map(|b| b.section_type.clone()).collect();
            assert_eq!(order, expected);
        }
    }

    #[test]
    fn test_empty_block_is_kept() {
        let plan = plan(&["abstract", "methods"]);
        let mut blocks = blocks_for(&plan);
        blocks.reverse();

        let content = ContentAssembler::assemble(&plan, blocks).unwrap();
        assert_eq!(content.len(), plan.sections.len());
        assert!(content.blocks[1].is_empty());
        assert_eq!(content.blocks[1].content_type, ContentType::KeySentences);
    }

    #[test]
    fn test_missing_block_is_internal_error() {
        let plan = plan(&["abstract", "methods"]);
        let mut blocks = blocks_for(&plan);
        blocks.pop();

        let err = ContentAssembler::assemble(&plan, blocks).unwrap_err();
        assert!(matches!(err, AppError::Internal { .. }));
    }

    #[test]
    fn test_duplicate_or_misplaced_block_rejected() {
        let plan = plan(&["abstract", "methods"]);
        let mut blocks = blocks_for(&plan);
        let first = blocks[0].1.clone();
        blocks.push((0, first.clone()));
        assert!(ContentAssembler::assemble(&plan, blocks).is_err());

        let misplaced = vec![(1, first), (0, blocks_for(&plan)[1].1.clone())];
        assert!(ContentAssembler::assemble(&plan, misplaced).is_err());
    }
}
