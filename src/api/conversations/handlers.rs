use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};

use crate::api::AppState;
use crate::api::auth::CallerIdentity;
use crate::api::changes::{ChangeType, ResourceType, notify};
use crate::error::ApiError;

pub(crate) async fn list_conversations(
    State(state): State<AppState>,
    _caller: CallerIdentity,
) -> Json<Value> {
    let mut records = state.conversation_repo.list().await;
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let summaries: Vec<Value> = records
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "agent_id": r.agent_id,
                "thread_id": r.thread_id,
                "title": r.title,
                "message_count": r.message_count,
                "updated_at": r.updated_at,
            })
        })
        .collect();

    Json(json!({ "conversations": summaries }))
}

pub(crate) async fn get_conversation(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .conversation_repo
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("conversation not found".to_string()))?;

    Ok(Json(serde_json::to_value(&record).map_err(anyhow::Error::from)?))
}

pub(crate) async fn delete_conversation(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let existed = state
        .conversation_repo
        .delete(&id)
        .await
        .map_err(|e| ApiError::Internal(e.context("failed to delete conversation")))?;

    if !existed {
        return Err(ApiError::NotFound("conversation not found".to_string()));
    }

    notify(&state, ResourceType::Conversation, ChangeType::Deleted, id);
    Ok(Json(json!({ "deleted": true })))
}
