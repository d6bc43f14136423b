//! Repository pattern for database operations
//!
//! Read-only access to parsed papers, sections and sentences.

use crate::db::models::*;
use crate::db::{DbPool, DocumentStore};
use crate::documents::{SectionContent, SectionSummary, Sentence, BRIEF_CONTENT_CHARS};
use crate::errors::Result;
use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QueryResult, QuerySelect, RelationTrait, Statement,
};
use sea_orm::sea_query::JoinType;
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        &self.pool.connection
    }
}

fn count(row: &QueryResult, column: &str) -> std::result::Result<u32, DbErr> {
    let value: i64 = row.try_get("", column)?;
    Ok(u32::try_from(value).unwrap_or(u32::MAX))
}

/// Decode one row of the summary aggregate
fn summary_from_row(row: &QueryResult) -> std::result::Result<SectionSummary, DbErr> {
    Ok(SectionSummary {
        paper_id: row.try_get("", "paper_id")?,
        paper_name: row.try_get("", "paper_name")?,
        section_type: row.try_get("", "section_type")?,
        page_num: row.try_get("", "page_num")?,
        word_count: row.try_get("", "word_count")?,
        brief_content: row.try_get("", "brief_content")?,
        od_count: count(row, "od_count")?,
        cd_count: count(row, "cd_count")?,
        total_sentences: count(row, "total_sentences")?,
    })
}

#[async_trait]
impl DocumentStore for Repository {
    async fn get_section_summaries(&self, paper_ids: &[Uuid]) -> Result<Vec<SectionSummary>> {
        if paper_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (0..paper_ids.len())
            .map(|i| format!("${}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            r#"
            SELECT
                p.id AS paper_id,
                p.file_name AS paper_name,
                s.section_type,
                s.page_num,
                s.word_count,
                LEFT(s.content, $1) AS brief_content,
                COUNT(st.id) FILTER (WHERE UPPER(st.defining_type) = 'OD')::BIGINT AS od_count,
                COUNT(st.id) FILTER (WHERE UPPER(st.defining_type) = 'CD')::BIGINT AS cd_count,
                COUNT(st.id)::BIGINT AS total_sentences
            FROM sections s
            JOIN papers p ON p.id = s.paper_id
            LEFT JOIN sentences st ON st.section_id = s.id
            WHERE s.paper_id IN ({})
            GROUP BY p.id, p.file_name, s.id, s.section_type, s.page_num, s.word_count, s.content
            ORDER BY p.id, s.page_num, s.created_at, s.id
            "#,
            placeholders
        );

        let mut values: Vec<sea_orm::Value> = vec![(BRIEF_CONTENT_CHARS as i32).into()];
        values.extend(paper_ids.iter().map(|id| (*id).into()));

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, &sql, values);

        let summaries = self
            .conn()
            .query_all(stmt)
            .await?
            .iter()
            .map(summary_from_row)
            .collect::<std::result::Result<Vec<_>, DbErr>>()?;

        Ok(summaries)
    }

    async fn get_sentences(&self, paper_id: Uuid, section_type: &str) -> Result<Vec<Sentence>> {
        // Filter on the section's paper, not the sentence's denormalised
        // copy, so a mismatched row still surfaces to the isolation check.
        let rows = SentenceEntity::find()
            .join(JoinType::InnerJoin, SentenceRelation::Section.def())
            .filter(SectionColumn::PaperId.eq(paper_id))
            .filter(SectionColumn::SectionType.eq(section_type))
            .order_by_asc(SectionColumn::PageNum)
            .order_by_asc(SectionColumn::CreatedAt)
            .order_by_asc(SectionColumn::Id)
            .order_by_asc(SentenceColumn::Position)
            .all(self.conn())
            .await?;

        Ok(rows.into_iter().map(Sentence::from).collect())
    }

    async fn get_section_content(
        &self,
        paper_id: Uuid,
        section_type: &str,
    ) -> Result<Option<SectionContent>> {
        let sections = SectionEntity::find()
            .filter(SectionColumn::PaperId.eq(paper_id))
            .filter(SectionColumn::SectionType.eq(section_type))
            .order_by_asc(SectionColumn::PageNum)
            .order_by_asc(SectionColumn::CreatedAt)
            .order_by_asc(SectionColumn::Id)
            .all(self.conn())
            .await?;

        let Some(first) = sections.first() else {
            return Ok(None);
        };

        Ok(Some(SectionContent {
            paper_id: first.paper_id,
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
