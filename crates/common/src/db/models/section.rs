//! Section entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub paper_id: Uuid,

    /// Normalised heading, e.g. "introduction", "methods"
    #[sea_orm(column_type = "Text")]
    pub section_type: String,

    pub page_num: i32,

    pub word_count: i32,

    /// Verbatim section text
    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::paper::Entity",
        from = "Column::PaperId",
        to = "super::paper::Column::Id",
        on_delete = "Cascade"
    )]
    Paper,

    #[sea_orm(has_many = "super::sentence::Entity")]
    Sentences,
}

impl Related<super::paper::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Paper.def()
    }
}

impl Related<super::sentence::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sentences.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
