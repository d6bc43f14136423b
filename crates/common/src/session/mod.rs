//! Conversation sessions
//!
//! A session owns the message list and progress tracker of one
//! conversation and runs at most one query at a time. Each query gets its
//! own cancellation token; cancelling or restarting abandons the in-flight
//! execution and its result is discarded when it eventually returns.

use crate::errors::{AppError, Result};
use crate::pipeline::{
    ProgressHandle, ProgressState, ProgressTracker, QueryContext, QueryOutcome, QueryPipeline,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub query_id: Uuid,
    pub role: Role,
    pub content: String,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<QueryOutcome>,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    fn new(query_id: Uuid, role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            query_id,
            role,
            content,
            is_error: false,
            outcome: None,
            created_at: Utc::now(),
        }
    }

    fn error(query_id: Uuid, content: String) -> Self {
        Self {
            is_error: true,
            ..Self::new(query_id, Role::Assistant, content)
        }
    }
}

struct ActiveQuery {
    query_id: Uuid,
    cancel: CancellationToken,
    progress: ProgressHandle,
}

#[derive(Default)]
struct SessionState {
    messages: Vec<ConversationMessage>,
    active: Option<ActiveQuery>,
}

/// A query running in the background
pub struct PendingQuery {
    pub query_id: Uuid,
    handle: JoinHandle<Result<QueryOutcome>>,
}

impl PendingQuery {
    /// Wait for the execution to finish
    pub async fn wait(self) -> Result<QueryOutcome> {
        self.handle.await.map_err(|e| AppError::Internal {
            message: format!("query task failed: {}", e),
        })?
    }
}

pub struct ConversationSession {
    id: Uuid,
    pipeline: Arc<QueryPipeline>,
    tracker: ProgressTracker,
    state: Arc<Mutex<SessionState>>,
}

impl ConversationSession {
    pub fn new(id: Uuid, pipeline: Arc<QueryPipeline>) -> Self {
        Self {
            id,
            pipeline,
            tracker: ProgressTracker::new(),
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Start a query. Fails with `QueryInProgress` while another runs.
    pub async fn ask(&self, query: &str, document_ids: Vec<Uuid>) -> Result<PendingQuery> {
        let mut state = self.state.lock().await;
        if state.active.is_some() {
            return Err(AppError::QueryInProgress {
                conversation_id: self.id.to_string(),
            });
        }

        let query_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let progress = self.tracker.begin(query_id, cancel.clone());

        state
            .messages
            .push(ConversationMessage::new(query_id, Role::User, query.to_string()));
        state.active = Some(ActiveQuery {
            query_id,
            cancel: cancel.clone(),
            progress: progress.clone(),
        });
        drop(state);

        info!(conversation_id = %self.id, query_id = %query_id, "Query started");

        let ctx = QueryContext {
            query_id,
            query: query.to_string(),
            document_ids,
            cancel,
            progress,
        };
        let pipeline = self.pipeline.clone();
        let shared = self.state.clone();
        let conversation_id = self.id;

        let handle = tokio::spawn(async move {
            let result = pipeline.execute(&ctx).await;
            Self::finish(&shared, conversation_id, query_id, &result).await;
            result
        });

        Ok(PendingQuery { query_id, handle })
    }

    /// Record the result if this execution still owns the conversation
    async fn finish(
        state: &Mutex<SessionState>,
        conversation_id: Uuid,
        query_id: Uuid,
        result: &Result<QueryOutcome>,
    ) {
        let mut state = state.lock().await;
        let owns = state
            .active
            .as_ref()
            .is_some_and(|a| a.query_id == query_id && !a.cancel.is_cancelled());
        if !owns {
            debug!(
                conversation_id = %conversation_id,
                query_id = %query_id,
                "Discarding result of a superseded query"
            );
            return;
        }

        let message = match result {
            Ok(outcome) => ConversationMessage {
                outcome: Some(outcome.clone()),
                ..ConversationMessage::new(query_id, Role::Assistant, outcome.message())
            },
            Err(err) => ConversationMessage::error(query_id, err.user_message()),
        };
        state.messages.push(message);
        state.active = None;
    }

    /// Cancel the running query, if any. Returns whether one was running.
    pub async fn cancel(&self) -> bool {
        let mut state = self.state.lock().await;
        let Some(active) = state.active.take() else {
            return false;
        };

        active.progress.mark_cancelled();
        active.cancel.cancel();
        state.messages.push(ConversationMessage::error(
            active.query_id,
            AppError::Cancelled.user_message(),
        ));

        info!(conversation_id = %self.id, query_id = %active.query_id, "Query cancelled");
        true
    }

    /// Cancel whatever is running and start `query`
    pub async fn restart(&self, query: &str, document_ids: Vec<Uuid>) -> Result<PendingQuery> {
        self.cancel().await;
        self.ask(query, document_ids).await
    }

    pub async fn messages(&self) -> Vec<ConversationMessage> {
        self.state.lock().await.messages.clone()
    }

    pub async fn is_processing(&self) -> bool {
        self.state.lock().await.active.is_some()
    }

    pub fn progress(&self) -> ProgressState {
        self.tracker.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.tracker.subscribe()
    }
}

/// Sessions by conversation id
pub struct SessionRegistry {
    pipeline: Arc<QueryPipeline>,
    sessions: RwLock<HashMap<Uuid, Arc<ConversationSession>>>,
}

impl SessionRegistry {
    pub fn new(pipeline: Arc<QueryPipeline>) -> Self {
        Self {
            pipeline,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, conversation_id: Uuid) -> Option<Arc<ConversationSession>> {
        self.sessions.read().await.get(&conversation_id).cloned()
    }

    pub async fn get_or_create(&self, conversation_id: Uuid) -> Arc<ConversationSession> {
        if let Some(session) = self.get(conversation_id).await {
            return session;
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(conversation_id)
            .or_insert_with(|| {
                Arc::new(ConversationSession::new(conversation_id, self.pipeline.clone()))
            })
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        MockAnalysisService, MockKeywordExtractor, MockPlanner, PlanningRequest, PlanningResponse,
        SectionPlanner, Services,
    };
    use crate::config::PipelineConfig;
    use crate::db::InMemoryStore;
    use crate::documents::DefiningType;
    use crate::pipeline::{RetryPolicy, Stage};
    use async_trait::async_trait;

    const STALLED_QUERY: &str = "First question";

    /// Never answers `STALLED_QUERY`; everything else uses the heuristic planner
    struct StallingPlanner(MockPlanner);

    #[async_trait]
    impl SectionPlanner for StallingPlanner {
        async fn plan(&self, request: &PlanningRequest) -> Result<PlanningResponse> {
            if request.query == STALLED_QUERY {
                std::future::pending::<()>().await;
            }
            self.0.plan(request).await
        }
    }

    fn session() -> (ConversationSession, Uuid) {
        let mut store = InMemoryStore::new();
        let paper = store.add_paper("expertise.pdf");
        store.add_section(
            paper,
            "introduction",
            1,
            &[("Adaptive expertise is defined as flexibility.", Some(DefiningType::Cd))],
        );

        let services = Services {
            planner: Arc::new(StallingPlanner(MockPlanner::new())),
            keywords: Arc::new(MockKeywordExtractor::with_keywords(["adaptive expertise"])),
            analysis: Arc::new(MockAnalysisService::new()),
        };
        let pipeline = QueryPipeline::new(
            Arc::new(store),
            services,
            RetryPolicy::none(),
            PipelineConfig::default(),
        );
        (ConversationSession::new(Uuid::new_v4(), Arc::new(pipeline)), paper)
    }

    #[tokio::test]
    async fn test_second_query_is_rejected_while_busy() {
        let (session, paper) = session();
        let _first = session.ask(STALLED_QUERY, vec![paper]).await.unwrap();

        let err = session
            .ask("Another question", vec![paper])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::QueryInProgress { .. }));
        assert!(session.is_processing().await);
    }

    #[tokio::test]
    async fn test_cancel_abandons_and_discards() {
        let (session, paper) = session();
        let pending = session.ask(STALLED_QUERY, vec![paper]).await.unwrap();

        assert!(session.cancel().await);
        let result = pending.wait().await;
        assert!(matches!(result, Err(AppError::Cancelled)));

        let messages = session.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert!(messages[1].is_error);
        assert!(!session.is_processing().await);

        let state = session.progress();
        assert_eq!(state.stage, Stage::Error);
        assert!(!state.is_processing);
        assert!(!session.cancel().await);
    }

    #[tokio::test]
    async fn test_restart_runs_the_new_query_in_order() {
        let (session, paper) = session();
        let stale = session.ask(STALLED_QUERY, vec![paper]).await.unwrap();

        let current = session
            .restart("What are the definitions of adaptive expertise?", vec![paper])
            .await
            .unwrap();
        let current_id = current.query_id;
        let outcome = current.wait().await.unwrap();
        assert!(matches!(outcome, QueryOutcome::Answered(_)));
        assert!(stale.wait().await.is_err());

        let messages = session.messages().await;
        let roles: Vec<(Role, bool)> = messages.iter().map(|m| (m.role, m.is_error)).collect();
        assert_eq!(
            roles,
            vec![
                (Role::User, false),
                (Role::Assistant, true),
                (Role::User, false),
                (Role::Assistant, false),
            ]
        );
        assert!(messages[3].outcome.is_some());

        let state = session.progress();
        assert_eq!(state.stage, Stage::Completed);
        assert_eq!(state.query_id, Some(current_id));
        assert_eq!(messages[3].query_id, current_id);
    }

    #[tokio::test]
    async fn test_registry_reuses_sessions() {
        let (session, _) = session();
        let registry = SessionRegistry::new(session.pipeline.clone());
        let id = Uuid::new_v4();

        let a = registry.get_or_create(id).await;
        let b = registry.get_or_create(id).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);
        assert!(registry.get(Uuid::new_v4()).await.is_none());
    }
}
