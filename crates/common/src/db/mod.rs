//! Database layer for PaperLens
//!
//! Provides:
//! - SeaORM entity models for parsed papers
//! - The `DocumentStore` collaborator read by the query pipeline
//! - Repository (PostgreSQL) and in-memory implementations
//! - Connection pool management

pub mod models;
mod memory;
mod repository;

pub use memory::InMemoryStore;
pub use repository::Repository;

use crate::config::DatabaseConfig;
use crate::documents::{SectionContent, SectionSummary, Sentence};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Read access to already-parsed papers
///
/// Callers pass ids that were validated against the workspace; stores
/// return only rows belonging to those ids.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Per-section aggregates for every requested paper
    async fn get_section_summaries(&self, paper_ids: &[Uuid]) -> Result<Vec<SectionSummary>>;

    /// Sentences of one section, in reading order
    async fn get_sentences(&self, paper_id: Uuid, section_type: &str) -> Result<Vec<Sentence>>;

    /// Verbatim section text, `None` when the section does not exist
    async fn get_section_content(
        &self,
        paper_id: Uuid,
        section_type: &str,
    ) -> Result<Option<SectionContent>>;
}

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    pub connection: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let connection = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { connection })
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        use sea_orm::ConnectionTrait;

        self.connection
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}
