//! Sentence entity with its definition classification

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::documents::{DefiningType, Sentence};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sentences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub section_id: Uuid,

    /// Denormalised for isolation checks
    pub paper_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub text: String,

    /// "OD", "CD" or NULL
    #[sea_orm(column_type = "Text", nullable)]
    pub defining_type: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub explanation: Option<String>,

    pub page_num: i32,

    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::section::Entity",
        from = "Column::SectionId",
        to = "super::section::Column::Id",
        on_delete = "Cascade"
    )]
    Section,
}

impl Related<super::section::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Section.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Sentence {
    fn from(model: Model) -> Self {
        Sentence {
            paper_id: model.paper_id,
            section_id: model.section_id,
            defining_type: model.defining_type.as_deref().and_then(DefiningType::parse),
            text: model.text,
            explanation: model.explanation,
            page_num: model.page_num,
            position: model.position,
        }
    }
}
