//! In-memory document store for local runs and tests

use crate::db::DocumentStore;
use crate::documents::{
    preview, DefiningType, SectionContent, SectionSummary, Sentence, BRIEF_CONTENT_CHARS,
};
use crate::errors::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredSection {
    section_type: String,
    page_num: i32,
    content: String,
    sentences: Vec<Sentence>,
}

#[derive(Debug, Clone)]
struct StoredPaper {
    id: Uuid,
    file_name: String,
    sections: Vec<StoredSection>,
}

/// Papers held in memory, in insertion order
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    papers: Vec<StoredPaper>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a paper and return its id
    pub fn add_paper(&mut self, file_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.papers.push(StoredPaper {
            id,
            file_name: file_name.to_string(),
            sections: Vec::new(),
        });
        id
    }

    /// Add a section built from classified sentence texts.
    ///
    /// The section text is the sentences joined by spaces; positions follow
    /// slice order.
    pub fn add_section(
        &mut self,
        paper_id: Uuid,
        section_type: &str,
        page_num: i32,
        sentences: &[(&str, Option<DefiningType>)],
    ) -> Uuid {
        let section_id = Uuid::new_v4();
        let rows = sentences
            .iter()
            .enumerate()
            .map(|(i, (text, defining_type))| Sentence {
                paper_id,
                section_id,
                text: text.to_string(),
                defining_type: *defining_type,
                explanation: defining_type
                    .map(|t| format!("Classified as {} during parsing", t.as_str())),
                page_num,
                position: i as i32,
            })
            .collect::<Vec<_>>();
        let content = sentences
            .iter()
            .map(|(text, _)| *text)
            .collect::<Vec<_>>()
            .join(" ");

        self.add_section_rows(paper_id, section_type, page_num, &content, rows);
        section_id
    }

    /// Add a section with explicit rows, used to model inconsistent upstream data
    pub fn add_section_rows(
        &mut self,
        paper_id: Uuid,
        section_type: &str,
        page_num: i32,
        content: &str,
        sentences: Vec<Sentence>,
    ) {
        if let Some(paper) = self.papers.iter_mut().find(|p| p.id == paper_id) {
            paper.sections.push(StoredSection {
                section_type: section_type.to_string(),
                page_num,
                content: content.to_string(),
                sentences,
            });
        }
    }

    /// Matching sections by page, insertion order within a page
    fn sections_of(&self, paper_id: Uuid, section_type: &str) -> Vec<&StoredSection> {
        let mut sections: Vec<&StoredSection> = self
            .papers
            .iter()
            .filter(|p| p.id == paper_id)
            .flat_map(|p| p.sections.iter())
            .filter(|s| s.section_type == section_type)
            .collect();
        sections.sort_by_key(|s| s.page_num);
        sections
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_section_summaries(&self, paper_ids: &[Uuid]) -> Result<Vec<SectionSummary>> {
        let summaries = self
            .papers
            .iter()
            .filter(|p| paper_ids.contains(&p.id))
            .flat_map(|paper| {
                paper.sections.iter().map(move |section| {
                    let count = |t: DefiningType| {
                        section
                            .sentences
                            .iter()
                            .filter(|s| s.defining_type == Some(t))
                            .count() as u32
                    };
                    SectionSummary {
                        paper_id: paper.id,
                        paper_name: paper.file_name.clone(),
                        section_type: section.section_type.clone(),
                        page_num: section.page_num,
                        word_count: section.content.split_whitespace().count() as i32,
                        brief_content: preview(&section.content, BRIEF_CONTENT_CHARS),
                        od_count: count(DefiningType::Od),
                        cd_count: count(DefiningType::Cd),
                        total_sentences: section.sentences.len() as u32,
                    }
                })
            })
            .collect();

        Ok(summaries)
    }

    async fn get_sentences(&self, paper_id: Uuid, section_type: &str) -> Result<Vec<Sentence>> {
        let sentences = self
            .sections_of(paper_id, section_type)
            .into_iter()
            .flat_map(|section| {
                let mut rows = section.sentences.clone();
                rows.sort_by_key(|s| s.position);
                rows
            })
            .collect();
        Ok(sentences)
    }

    async fn get_section_content(
        &self,
        paper_id: Uuid,
        section_type: &str,
    ) -> Result<Option<SectionContent>> {
        let sections = self.sections_of(paper_id, section_type);
        let Some(first) = sections.first() else {
            return Ok(None);
        };

        Ok(Some(SectionContent {
            paper_id,
            section_type: first.section_type.clone(),
            page_num: first.page_num,
            text: sections
                .iter()
                .map(|s| s.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_summary_counts() {
        let mut store = InMemoryStore::new();
        let paper = store.add_paper("expertise.pdf");
        store.add_section(
            paper,
            "introduction",
            1,
            &[
                ("Adaptive expertise is flexible.", Some(DefiningType::Cd)),
                ("Motivation is drive.", Some(DefiningType::Od)),
                ("Plain text.", None),
            ],
        );

        let summaries = store.get_section_summaries(&[paper]).await.unwrap();
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.paper_name, "expertise.pdf");
        assert_eq!(summary.od_count, 1);
        assert_eq!(summary.cd_count, 1);
        assert_eq!(summary.total_sentences, 3);
        assert!(summary.counts_consistent());
    }

    #[tokio::test]
    async fn test_unrequested_papers_are_not_returned() {
        let mut store = InMemoryStore::new();
        let wanted = store.add_paper("a.pdf");
        let other = store.add_paper("b.pdf");
        store.add_section(wanted, "abstract", 1, &[("A.", None)]);
        store.add_section(other, "abstract", 1, &[("B.", None)]);

        let summaries = store.get_section_summaries(&[wanted]).await.unwrap();
        assert!(summaries.iter().all(|s| s.paper_id == wanted));
    }

    #[tokio::test]
    async fn test_section_content_missing() {
        let mut store = InMemoryStore::new();
        let paper = store.add_paper("a.pdf");
        let content = store.get_section_content(paper, "methods").await.unwrap();
        assert!(content.is_none());
    }

    #[tokio::test]
    async fn test_sentences_keep_section_order_on_a_shared_page() {
        let mut store = InMemoryStore::new();
        let paper = store.add_paper("a.pdf");
        store.add_section(paper, "introduction", 1, &[("A0", None), ("A1", None)]);
        store.add_section(paper, "introduction", 1, &[("B0", None), ("B1", None)]);

        let texts: Vec<String> = store
            .get_sentences(paper, "introduction")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.text)
            .collect();
        assert_eq!(texts, vec!["A0", "A1", "B0", "B1"]);
    }
}
