//! SeaORM entity models
//!
//! Parsed-paper tables read by the query pipeline

mod paper;
mod section;
mod sentence;

pub use paper::{
    Entity as PaperEntity,
    Model as Paper,
    Column as PaperColumn,
};

pub use section::{
    Entity as SectionEntity,
    Model as Section,
    Column as SectionColumn,
};

pub use sentence::{
    Relation as SentenceRelation,
    Entity as SentenceEntity,
    Model as SentenceRow,
    Column as SentenceColumn,
};
