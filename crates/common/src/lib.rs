//! PaperLens Common Library
//!
//! Shared code for the PaperLens context engine including:
//! - Parsed document records and the storage collaborator
//! - Planning, keyword and analysis service clients
//! - The two-stage query pipeline and progress tracking
//! - Conversation sessions
//! - Error types, configuration, metrics

pub mod clients;
pub mod config;
pub mod db;
pub mod documents;
pub mod errors;
pub mod metrics;
pub mod pipeline;
pub mod session;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DocumentStore, InMemoryStore, Repository};
pub use errors::{AppError, Result};
pub use pipeline::{QueryOutcome, QueryPipeline};
pub use session::{ConversationSession, SessionRegistry};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
