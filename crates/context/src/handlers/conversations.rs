//! Conversation query handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use paperlens_common::{
    errors::{AppError, Result},
    pipeline::{ProgressState, QueryOutcome},
    session::ConversationMessage,
};

/// Submit query request
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,

    /// Parsed papers the query may read
    #[validate(length(min = 1))]
    pub document_ids: Vec<Uuid>,

    /// Cancel a running query instead of rejecting this one
    #[serde(default)]
    pub restart: bool,
}

/// Submit query response
#[derive(Serialize)]
pub struct QueryResponse {
    pub conversation_id: Uuid,
    pub query_id: Uuid,
    pub outcome: QueryOutcome,
    pub processing_time_ms: u64,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub conversation_id: Uuid,
    pub cancelled: bool,
}

#[derive(Serialize)]
pub struct MessagesResponse {
    pub conversation_id: Uuid,
    pub messages: Vec<ConversationMessage>,
}

fn conversation_not_found(id: Uuid) -> AppError {
    AppError::NotFound {
        resource_type: "conversation".to_string(),
        id: id.to_string(),
    }
}

/// Run a query and wait for its outcome
pub async fn submit_query(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let session = state.sessions.get_or_create(conversation_id).await;
    let pending = if request.restart {
        session.restart(&request.query, request.document_ids).await?
    } else {
        session.ask(&request.query, request.document_ids).await?
    };
    let query_id = pending.query_id;

    let outcome = pending.wait().await?;

    tracing::info!(
        conversation_id = %conversation_id,
        query_id = %query_id,
        outcome = outcome.label(),
        "Query answered"
    );

    Ok(Json(QueryResponse {
        conversation_id,
        query_id,
        outcome,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// Current progress of the conversation's query
pub async fn get_progress(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ProgressState>> {
    let session = state
        .sessions
        .get(conversation_id)
        .await
        .ok_or_else(|| conversation_not_found(conversation_id))?;

    Ok(Json(session.progress()))
}

/// Cancel the running query, if any
pub async fn cancel_query(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<CancelResponse>> {
    let session = state
        .sessions
        .get(conversation_id)
        .await
        .ok_or_else(|| conversation_not_found(conversation_id))?;

    Ok(Json(CancelResponse {
        conversation_id,
        cancelled: session.cancel().await,
    }))
}

/// Conversation history in order
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<MessagesResponse>> {
    let session = state
        .sessions
        .get(conversation_id)
        .await
        .ok_or_else(|| conversation_not_found(conversation_id))?;

    Ok(Json(MessagesResponse {
        conversation_id,
        messages: session.messages().await,
    }))
}
